//! Token-keyed mail access for the web layer
//!
//! [`MailClient`] ties the pieces together: logging in dials the server
//! and registers the session in the pool, and every later call names the
//! session by its token.

use crate::config::ImapConfig;
use crate::connection::{ImapConnection, connect};
use crate::error::Result;
use crate::mailbox::{MailboxInfo, list_mailboxes};
use crate::message::{MessageSummary, PartEntity, fetch_part, list_messages};
use crate::pool::{ConnPool, Connection, SharedConnection};
use tracing::info;

/// Pooled IMAP access for many concurrently logged-in users.
pub struct MailClient {
    config: ImapConfig,
    pool: ConnPool<ImapConnection>,
}

impl MailClient {
    #[must_use]
    pub fn new(config: ImapConfig) -> Self {
        Self::with_pool(config, ConnPool::new())
    }

    #[must_use]
    pub const fn with_pool(config: ImapConfig, pool: ConnPool<ImapConnection>) -> Self {
        Self { config, pool }
    }

    #[must_use]
    pub const fn config(&self) -> &ImapConfig {
        &self.config
    }

    #[must_use]
    pub const fn pool(&self) -> &ConnPool<ImapConnection> {
        &self.pool
    }

    /// Connect, authenticate and return the new session's token
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or LOGIN fails, or no token
    /// could be generated.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let client = connect(&self.config).await?;
        let conn = ImapConnection::login(client, username, password).await?;
        self.pool.register(conn).await
    }

    /// Log the session out; its token expires shortly after.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SessionExpired`] if the token is unknown.
    pub async fn logout(&self, token: &str) -> Result<()> {
        let conn = self.pool.lookup(token)?;
        conn.lock().await.logout().await;
        info!("Session logged out");
        Ok(())
    }

    /// Resolve a token to its connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::SessionExpired`] if the token is unknown.
    pub fn connection(&self, token: &str) -> Result<SharedConnection<ImapConnection>> {
        self.pool.lookup(token)
    }

    /// List all mailboxes, sorted by name
    ///
    /// # Errors
    ///
    /// Returns an error if the token has expired or LIST fails.
    pub async fn list_mailboxes(&self, token: &str) -> Result<Vec<MailboxInfo>> {
        let conn = self.pool.lookup(token)?;
        let mut conn = conn.lock().await;
        list_mailboxes(&mut conn).await
    }

    /// List one page of a mailbox, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the token has expired, or the SELECT or
    /// FETCH fails.
    pub async fn list_messages(
        &self,
        token: &str,
        mailbox: &str,
        page: u32,
    ) -> Result<Vec<MessageSummary>> {
        let conn = self.pool.lookup(token)?;
        let mut conn = conn.lock().await;
        list_messages(&mut conn, mailbox, page).await
    }

    /// Fetch one part of a message by UID
    ///
    /// An empty `path` addresses the whole message.
    ///
    /// # Errors
    ///
    /// Returns an error if the token has expired, the SELECT or FETCH
    /// fails, or the part cannot be parsed.
    pub async fn fetch_part(
        &self,
        token: &str,
        mailbox: &str,
        uid: u32,
        path: &[u32],
    ) -> Result<(MessageSummary, PartEntity)> {
        let conn = self.pool.lookup(token)?;
        let mut conn = conn.lock().await;
        fetch_part(&mut conn, mailbox, uid, path).await
    }
}
