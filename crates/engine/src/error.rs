use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] database::DbError),

    #[error("Portfolio error: {0}")]
    Portfolio(#[from] portfolio::PortfolioError),
}
