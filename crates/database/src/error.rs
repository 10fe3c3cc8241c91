use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Failed to talk to the database: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("A conflicting row already exists: {0}")]
    Conflict(String),
}

impl DbError {
    /// Maps an insert failure so that unique-constraint violations surface as
    /// `Conflict` rather than a generic connection error. The caller can then
    /// explain "already exists" instead of reporting an internal failure.
    pub fn from_insert(err: sqlx::Error, what: &str) -> DbError {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return DbError::Conflict(what.to_string());
            }
        }
        DbError::ConnectionError(err)
    }
}
