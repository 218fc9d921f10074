//! Token-keyed connection pool
//!
//! Every logged-in user owns one long-lived connection. The pool hands
//! out an opaque token for it at registration and resolves the token back
//! to the connection on later requests. The only way an entry leaves the
//! pool is its logout signal firing, on an explicit logout or when the
//! connection finds the server gone: a watcher task spawned at
//! registration waits for that and evicts the entry. There is no idle
//! expiration; a live connection that never logs out stays resident.

use crate::error::{Error, Result};
use crate::token::{EntropySource, OsEntropy, generate_token};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A pooled connection handle.
///
/// The per-connection mutex only serializes requests made with the same
/// token; it is never held together with the pool lock.
pub type SharedConnection<C> = Arc<tokio::sync::Mutex<C>>;

/// A connection the pool can take custody of.
pub trait Connection: Send + 'static {
    /// A signal that is cancelled once the connection has logged out or
    /// has been closed by the server.
    fn logout_signal(&self) -> CancellationToken;

    /// Log out, firing the logout signal.
    fn logout(&mut self) -> impl Future<Output = ()> + Send;
}

type ConnMap<C> = HashMap<String, SharedConnection<C>>;

/// Concurrency-safe custody of connections keyed by session token.
///
/// Cloning is cheap and every clone refers to the same pool; build one
/// per process and pass it to request handlers.
pub struct ConnPool<C> {
    conns: Arc<Mutex<ConnMap<C>>>,
    entropy: Arc<dyn EntropySource>,
}

impl<C> Clone for ConnPool<C> {
    fn clone(&self) -> Self {
        Self {
            conns: Arc::clone(&self.conns),
            entropy: Arc::clone(&self.entropy),
        }
    }
}

impl<C: Connection> Default for ConnPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> ConnPool<C> {
    /// An empty pool drawing tokens from the OS random number generator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_entropy(OsEntropy)
    }

    /// An empty pool drawing tokens from `entropy`.
    #[must_use]
    pub fn with_entropy(entropy: impl EntropySource) -> Self {
        Self {
            conns: Arc::new(Mutex::new(HashMap::new())),
            entropy: Arc::new(entropy),
        }
    }

    /// Take custody of `conn` and return the token that now refers to it.
    ///
    /// Must be called from within a tokio runtime: the logout watcher is
    /// spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Entropy`] if no token could be generated. The
    /// connection is logged out before the error is returned.
    pub async fn register(&self, conn: C) -> Result<String> {
        let signal = conn.logout_signal();
        let conn = Arc::new(tokio::sync::Mutex::new(conn));

        let drawn = {
            let mut conns = lock(&self.conns);
            self.unused_token(&conns).inspect(|token| {
                conns.insert(token.clone(), Arc::clone(&conn));
            })
        };

        let token = match drawn {
            Ok(token) => token,
            Err(e) => {
                warn!("Token generation failed, logging out connection: {}", e);
                conn.lock().await.logout().await;
                return Err(e);
            }
        };

        let conns = Arc::clone(&self.conns);
        let watched = token.clone();
        tokio::spawn(async move {
            signal.cancelled().await;
            lock(&conns).remove(&watched);
            debug!("Evicted session {}", redact(&watched));
        });

        info!("Registered session {}", redact(&token));
        Ok(token)
    }

    /// Resolve `token` to its connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpired`] if the token was never issued or
    /// its connection has logged out.
    pub fn lookup(&self, token: &str) -> Result<SharedConnection<C>> {
        lock(&self.conns)
            .get(token)
            .cloned()
            .ok_or(Error::SessionExpired)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.conns).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unused_token(&self, conns: &ConnMap<C>) -> Result<String> {
        loop {
            let token = generate_token(self.entropy.as_ref())?;
            if !conns.contains_key(&token) {
                return Ok(token);
            }
            debug!("Token collision, drawing again");
        }
    }
}

fn lock<C>(conns: &Mutex<ConnMap<C>>) -> MutexGuard<'_, ConnMap<C>> {
    conns.lock().unwrap_or_else(PoisonError::into_inner)
}

fn redact(token: &str) -> &str {
    token.get(..6).unwrap_or(token)
}
