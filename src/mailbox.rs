//! Mailbox listing

use crate::connection::{ImapConnection, is_bye};
use crate::error::{Error, Result};
use async_imap::imap_proto::{MailboxDatum, NameAttribute, Response, Status};
use async_imap::types::UnsolicitedResponse;
use serde::Serialize;
use std::fmt;
use tracing::debug;

const LIST_ALL: &str = "LIST \"\" \"*\"";

/// A mailbox as reported by LIST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailboxInfo {
    pub name: String,
    /// Hierarchy delimiter, if the server uses one.
    pub delimiter: Option<String>,
    /// False for `\Noselect` placeholders that only hold children.
    pub selectable: bool,
}

impl MailboxInfo {
    fn from_list(attributes: &[NameAttribute<'_>], delimiter: Option<&str>, name: &str) -> Self {
        Self {
            name: name.to_string(),
            delimiter: delimiter.map(str::to_string),
            selectable: !attributes
                .iter()
                .any(|attr| matches!(attr, NameAttribute::NoSelect)),
        }
    }
}

impl fmt::Display for MailboxInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Sort mailboxes by name, byte-wise ascending.
pub fn sort_mailboxes(mailboxes: &mut [MailboxInfo]) {
    mailboxes.sort_by(|a, b| a.name.cmp(&b.name));
}

/// List every mailbox on the server, sorted by name.
///
/// The LIST replies are only returned once the server completes the
/// command with OK; a NO or BAD after some replies fails the whole call.
///
/// # Errors
///
/// Returns [`Error::Imap`] if the LIST command fails, even if some
/// mailboxes were already received, or if the connection drops.
pub async fn list_mailboxes(conn: &mut ImapConnection) -> Result<Vec<MailboxInfo>> {
    let sent = conn.session().run_command(LIST_ALL).await;
    let tag = conn.check(sent, "Failed to list mailboxes")?;

    let mut mailboxes = Vec::new();
    loop {
        let response = match conn.session().read_response().await {
            Ok(Some(response)) => response,
            Ok(None) => {
                conn.connection_lost(&"server closed the connection during LIST");
                return Err(Error::Imap(
                    "Failed to list mailboxes: connection closed by server".to_string(),
                ));
            }
            Err(e) => {
                conn.connection_lost(&e);
                return Err(Error::Imap(format!("Failed to list mailboxes: {e}")));
            }
        };

        match response.parsed() {
            Response::MailboxData(MailboxDatum::List {
                name_attributes,
                delimiter,
                name,
            }) => mailboxes.push(MailboxInfo::from_list(
                name_attributes,
                delimiter.as_deref(),
                name,
            )),
            Response::MailboxData(MailboxDatum::Exists(n)) => {
                conn.apply_update(&UnsolicitedResponse::Exists(*n));
            }
            Response::Expunge(n) => conn.apply_update(&UnsolicitedResponse::Expunge(*n)),
            Response::Done {
                tag: done,
                status,
                information,
                ..
            } if *done == tag => {
                if *status != Status::Ok {
                    return Err(Error::Imap(format!(
                        "Failed to list mailboxes: {status:?} {}",
                        information.as_deref().unwrap_or_default()
                    )));
                }
                break;
            }
            other if is_bye(other) => {
                conn.connection_lost(&"server said BYE during LIST");
                return Err(Error::Imap(
                    "Failed to list mailboxes: connection closed by server".to_string(),
                ));
            }
            _ => {}
        }
    }

    sort_mailboxes(&mut mailboxes);

    debug!("Listed {} mailboxes", mailboxes.len());
    Ok(mailboxes)
}
