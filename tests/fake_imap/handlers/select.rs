//! SELECT command handler.
//!
//! Opens a folder and responds with its metadata:
//!
//! - `* N EXISTS` gives the number of messages; clients derive page
//!   windows from it.
//! - `* OK [UIDVALIDITY V]` and `* OK [UIDNEXT N]` describe the UID
//!   space.
//!
//! Placeholder (`\Noselect`) folders are refused just like missing ones.
//! Returns the selected folder name, or `None` on failure.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the SELECT command. Returns the selected folder name.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name).filter(|f| f.selectable) else {
        let _ = write_line(stream, &format!("{tag} NO Folder not found\r\n")).await;
        return None;
    };

    let uidnext = folder
        .messages
        .iter()
        .map(|m| m.uid)
        .max()
        .map_or(1, |max| max + 1);

    let lines = [
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n".to_string(),
        format!("* {} EXISTS\r\n", folder.messages.len()),
        "* 0 RECENT\r\n".to_string(),
        "* OK [UIDVALIDITY 1]\r\n".to_string(),
        format!("* OK [UIDNEXT {uidnext}]\r\n"),
        format!("{tag} OK [READ-ONLY] SELECT completed\r\n"),
    ];
    for line in &lines {
        if write_line(stream, line).await.is_err() {
            return None;
        }
    }

    Some(folder_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::{output, pipe};
    use crate::fake_imap::mailbox::MailboxBuilder;

    async fn run(tag: &str, folder_name: &str, mailbox: &Mailbox) -> (String, Option<String>) {
        let (client, mut server) = pipe();
        let selected = handle_select(tag, folder_name, mailbox, &mut server).await;
        (output(client, server).await, selected)
    }

    #[tokio::test]
    async fn selects_existing_folder() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .plain_messages(1, 3)
            .build();

        let (out, selected) = run("A1", "INBOX", &mailbox).await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(out.contains("* 3 EXISTS"));
        assert!(out.contains("UIDVALIDITY"));
        assert!(out.ends_with("A1 OK [READ-ONLY] SELECT completed\r\n"));
    }

    #[tokio::test]
    async fn refuses_missing_folder() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let (out, selected) = run("A1", "NoSuchFolder", &mailbox).await;

        assert!(selected.is_none());
        assert_eq!(out, "A1 NO Folder not found\r\n");
    }

    #[tokio::test]
    async fn refuses_placeholder_folder() {
        let mailbox = MailboxBuilder::new().placeholder("Archive").build();
        let (out, selected) = run("A1", "Archive", &mailbox).await;
        assert!(selected.is_none());
        assert!(out.starts_with("A1 NO"));
    }

    #[tokio::test]
    async fn uidnext_follows_highest_uid() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .plain_messages(5, 6)
            .build();
        let (out, _) = run("A1", "INBOX", &mailbox).await;
        assert!(out.contains("* OK [UIDNEXT 11]"));
    }

    #[tokio::test]
    async fn empty_folder_has_zero_exists() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (out, _) = run("A1", "INBOX", &mailbox).await;
        assert!(out.contains("* 0 EXISTS"));
        assert!(out.contains("* OK [UIDNEXT 1]"));
    }
}
