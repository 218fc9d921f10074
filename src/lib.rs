//! Pooled IMAP sessions for webmail front-ends
//!
//! Keeps one authenticated IMAP connection per logged-in user, keyed by
//! an opaque session token suitable for a cookie, and translates IMAP
//! body structures into navigable part trees.
//!
//! - [`ConnPool`] maps tokens to connections and evicts them on logout.
//! - [`list_mailboxes`], [`list_messages`] and [`fetch_part`] run on a
//!   pooled [`ImapConnection`].
//! - [`build_tree`] and [`select_text_path`] work on a [`BodyStructure`]
//!   alone.
//!
//! [`MailClient`] bundles all of it behind token-keyed calls.

mod client;
mod config;
mod connection;
mod error;
mod mailbox;
mod message;
mod part;
mod pool;
mod token;

pub use client::MailClient;
pub use config::{ImapConfig, Security};
pub use connection::{ImapClient, ImapConnection, ImapSession, ImapStream, connect};
pub use error::{Error, Result};
pub use mailbox::{MailboxInfo, list_mailboxes, sort_mailboxes};
pub use message::{
    Address, Envelope, MESSAGES_PER_PAGE, MessageSummary, PageWindow, PartEntity, fetch_part,
    list_messages,
};
pub use part::{
    BodyStructure, PartNode, build_tree, format_part_path, parse_part_path, select_text_path,
};
pub use pool::{ConnPool, Connection, SharedConnection};
pub use token::{EntropySource, OsEntropy, TOKEN_BYTES, generate_token};
