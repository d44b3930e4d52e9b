#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("{0}")]
    Other(String),
}
