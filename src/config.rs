//! IMAP server configuration

use crate::error::{Error, Result};
use std::env;
use url::Url;

/// How the connection to the IMAP server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (`imaps://`, usually port 993).
    Tls,
    /// Plaintext dial followed by STARTTLS (`imap://`).
    StartTls,
    /// Plaintext with no upgrade (`imap+insecure://`).
    Insecure,
}

impl Security {
    const fn default_port(self) -> u16 {
        match self {
            Self::Tls => 993,
            Self::StartTls | Self::Insecure => 143,
        }
    }
}

/// Where and how to reach the backend IMAP server.
///
/// Credentials are not part of the configuration; every user supplies
/// their own at login.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub security: Security,
    /// Skip certificate verification (self-signed bridges, test servers).
    pub accept_invalid_certs: bool,
}

impl ImapConfig {
    /// Parse an `imap://`, `imaps://` or `imap+insecure://` URL.
    ///
    /// The port defaults to 993 for `imaps` and 143 otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is malformed, has no host,
    /// or uses an unrecognized scheme.
    pub fn from_url(imap_url: &str) -> Result<Self> {
        let url = Url::parse(imap_url)
            .map_err(|e| Error::Config(format!("Failed to parse IMAP server URL: {e}")))?;

        let security = match url.scheme() {
            "imap" => Security::StartTls,
            "imaps" => Security::Tls,
            "imap+insecure" => Security::Insecure,
            other => {
                return Err(Error::Config(format!(
                    "Unrecognized IMAP URL scheme: {other}"
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config(format!("IMAP URL has no host: {imap_url}")))?;

        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or_else(|| security.default_port()),
            security,
            accept_invalid_certs: false,
        })
    }

    /// Load the configuration from environment variables
    ///
    /// Reads from `.env` file if present. Optional (with defaults):
    /// - `IMAP_URL` (default: `imap://127.0.0.1:143`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let imap_url = env::var("IMAP_URL").unwrap_or_else(|_| "imap://127.0.0.1:143".to_string());
        let mut config = Self::from_url(&imap_url)?;

        if let Ok(value) = env::var("IMAP_ACCEPT_INVALID_CERTS") {
            config.accept_invalid_certs = value
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_ACCEPT_INVALID_CERTS: {e}")))?;
        }

        Ok(config)
    }

    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
