//! Error types for Mai-Guru

use thiserror::Error;

use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found. Run 'maiguru init' first.")]
    ConfigNotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Auth(AuthError),

    #[error("Request was not authorized")]
    Unauthorized,

    #[error("Your session has expired. Please log in again.")]
    SessionExpired,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Session changed while the request was in flight")]
    Superseded,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
