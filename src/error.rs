//! Error types for mailgate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The session token is unknown, or its connection has logged out.
    #[error("session expired")]
    SessionExpired,

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Message parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Token generation failed: {0}")]
    Entropy(#[source] std::io::Error),
}

impl Error {
    /// Whether the caller should force the user to log in again.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
