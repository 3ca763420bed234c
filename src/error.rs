use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Rule {idrule} not found for site {idsite}")]
    RuleNotFound { idrule: i64, idsite: i64 },

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
}

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
