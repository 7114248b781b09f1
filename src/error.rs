use rusqlite::ffi;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("reference error: {0}")]
    Reference(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid ISBN: {0}")]
    InvalidIsbn(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("database connection error: {0}")]
    Connection(tokio_rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenLibrary API error: {0}")]
    OpenLibrary(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, AppError::ConstraintViolation(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, AppError::Reference(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

// SQLite reports every constraint failure as SQLITE_CONSTRAINT; the extended
// code tells a foreign key miss apart from a key collision.
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &err {
            let detail = message.clone().unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return AppError::Reference(detail),
                ffi::SQLITE_CONSTRAINT_UNIQUE
                | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                | ffi::SQLITE_CONSTRAINT_NOTNULL => return AppError::ConstraintViolation(detail),
                _ if failure.code == rusqlite::ErrorCode::ConstraintViolation => {
                    return AppError::ConstraintViolation(detail)
                }
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

impl From<tokio_rusqlite::Error> for AppError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(inner) => inner.into(),
            other => AppError::Connection(other),
        }
    }
}
