use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Price feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Price feed returned an unusable payload: {0}")]
    BadPayload(String),

    #[error("No quote available for symbol {0}")]
    NoQuote(String),
}
