use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open plant store: {0}")]
    Init(#[source] sqlx::Error),

    #[error("Invalid plant record: {0}")]
    Constraint(String),

    #[error("Failed to write to plant store: {0}")]
    Write(#[source] sqlx::Error),

    #[error("Failed to read from plant store: {0}")]
    Read(#[source] sqlx::Error),
}

impl StoreError {
    /// Classify a failed write. Uniqueness violations are the caller's fault,
    /// everything else is storage trouble.
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Constraint(format!("duplicate remote id ({})", db.message()))
            }
            _ => StoreError::Write(err),
        }
    }

    /// Returns `true` if retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Write(_) | StoreError::Read(_))
    }
}
