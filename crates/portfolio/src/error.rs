use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Database error: {0}")]
    Database(#[from] database::DbError),
}
