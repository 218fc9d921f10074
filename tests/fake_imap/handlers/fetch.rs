//! FETCH and UID FETCH command handler.
//!
//! Every response carries UID, ENVELOPE and BODYSTRUCTURE, plus one
//! counted literal per requested body section:
//!
//! ```text
//! * <seq> FETCH (UID <uid> ENVELOPE (...) BODYSTRUCTURE (...) BODY[1.MIME] {<len>}
//! <exactly len bytes>
//!  BODY[1] {<len>}
//! <exactly len bytes>
//! )
//! ```
//!
//! The sequence number is the 1-based index of the message within the
//! folder, per RFC 3501 Section 7.4.2. Sequence sets may use ranges and
//! `*`; messages are returned in folder order whatever the request order.

use crate::fake_imap::io::{write_line, write_literal};
use crate::fake_imap::mailbox::{Folder, Mailbox};
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Section names requested with `BODY.PEEK[...]` or `BODY[...]`, in order.
///
/// Read from the raw command line so the handler stays independent of
/// how `imap-codec` models section specifiers.
pub fn requested_sections(line: &str) -> Vec<String> {
    let upper = line.to_ascii_uppercase();
    let mut sections = Vec::new();
    let mut rest = upper.as_str();
    while let Some(start) = rest.find("BODY") {
        rest = &rest[start + 4..];
        let after = rest.strip_prefix(".PEEK").unwrap_or(rest);
        let Some(inner) = after.strip_prefix('[') else {
            continue;
        };
        let Some(end) = inner.find(']') else {
            break;
        };
        sections.push(inner[..end].to_string());
        rest = &inner[end + 1..];
    }
    sections
}

fn bound(value: &SeqOrUid, largest: u32) -> u32 {
    match value {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => largest,
    }
}

/// Whether `n` falls inside the sequence set, `*` standing for `largest`.
fn contains(sequence_set: &SequenceSet, n: u32, largest: u32) -> bool {
    sequence_set.0.as_ref().iter().any(|seq| match seq {
        Sequence::Single(v) => bound(v, largest) == n,
        Sequence::Range(a, b) => {
            let (a, b) = (bound(a, largest), bound(b, largest));
            (a.min(b)..=a.max(b)).contains(&n)
        }
    })
}

/// 1-based sequence numbers of the messages the set addresses.
fn resolve(sequence_set: &SequenceSet, uid: bool, folder: &Folder) -> Vec<usize> {
    let largest = if uid {
        folder.messages.iter().map(|m| m.uid).max().unwrap_or(0)
    } else {
        u32::try_from(folder.messages.len()).unwrap_or(u32::MAX)
    };

    folder
        .messages
        .iter()
        .enumerate()
        .filter(|(idx, message)| {
            let n = if uid {
                message.uid
            } else {
                u32::try_from(idx + 1).unwrap_or(u32::MAX)
            };
            contains(sequence_set, n, largest)
        })
        .map(|(idx, _)| idx + 1)
        .collect()
}

/// Handle FETCH (`uid == false`) or UID FETCH (`uid == true`).
pub async fn handle_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    uid: bool,
    sections: &[String],
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let _ = write_line(stream, &format!("{tag} BAD No folder selected\r\n")).await;
        return;
    };

    let Some(folder) = mailbox.get_folder(folder_name) else {
        let _ = write_line(stream, &format!("{tag} BAD Folder not found\r\n")).await;
        return;
    };

    for seq in resolve(sequence_set, uid, folder) {
        let message = &folder.messages[seq - 1];
        let head = format!(
            "* {seq} FETCH (UID {} ENVELOPE {} BODYSTRUCTURE {}",
            message.uid, message.envelope, message.body_structure
        );
        if write_line(stream, &head).await.is_err() {
            return;
        }

        for name in sections {
            if write_line(stream, &format!(" BODY[{name}] ")).await.is_err()
                || write_literal(stream, message.section(name)).await.is_err()
            {
                return;
            }
        }

        if write_line(stream, ")\r\n").await.is_err() {
            return;
        }
    }

    let _ = write_line(stream, &format!("{tag} OK FETCH completed\r\n")).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::handlers::testing::{output, pipe};
    use crate::fake_imap::mailbox::{MailboxBuilder, TestMessage};
    use std::num::NonZeroU32;

    fn value(n: u32) -> SeqOrUid {
        SeqOrUid::Value(NonZeroU32::new(n).unwrap())
    }

    fn single(n: u32) -> SequenceSet {
        SequenceSet(vec![Sequence::Single(value(n))].try_into().unwrap())
    }

    fn range(from: SeqOrUid, to: SeqOrUid) -> SequenceSet {
        SequenceSet(vec![Sequence::Range(from, to)].try_into().unwrap())
    }

    fn inbox() -> Mailbox {
        MailboxBuilder::new()
            .folder("INBOX")
            .message(TestMessage::plain(10, "a@example.com", "First", "one"))
            .message(TestMessage::alternative(
                20,
                "b@example.com",
                "Second",
                "plain two",
                "<p>two</p>",
            ))
            .message(TestMessage::plain(30, "c@example.com", "Third", "three"))
            .build()
    }

    async fn run(
        set: &SequenceSet,
        uid: bool,
        sections: &[&str],
        mailbox: &Mailbox,
        selected: Option<&str>,
    ) -> String {
        let sections: Vec<String> = sections.iter().map(ToString::to_string).collect();
        let (client, mut server) = pipe();
        handle_fetch("A1", set, uid, &sections, mailbox, selected, &mut server).await;
        output(client, server).await
    }

    #[test]
    fn finds_peek_sections_in_order() {
        let line = "A5 UID FETCH 7 (ENVELOPE UID BODYSTRUCTURE BODY.PEEK[2.MIME] BODY.PEEK[2])\r\n";
        assert_eq!(requested_sections(line), vec!["2.MIME", "2"]);
    }

    #[test]
    fn bodystructure_is_not_a_section() {
        assert!(requested_sections("A3 FETCH 1:5 (ENVELOPE UID BODYSTRUCTURE)").is_empty());
    }

    #[test]
    fn finds_plain_body_sections() {
        assert_eq!(requested_sections("A1 FETCH 1 (body[header])"), vec!["HEADER"]);
    }

    #[tokio::test]
    async fn uid_fetch_returns_requested_sections() {
        let out = run(&single(20), true, &["2.MIME", "2"], &inbox(), Some("INBOX")).await;

        assert!(out.starts_with("* 2 FETCH (UID 20 ENVELOPE ("));
        assert!(out.contains("BODYSTRUCTURE ((\"TEXT\" \"PLAIN\""));
        assert!(out.contains(" BODY[2] {10}\r\n<p>two</p>"));
        assert!(out.contains(" BODY[2.MIME] {"));
        assert!(out.ends_with(")\r\nA1 OK FETCH completed\r\n"));
    }

    #[tokio::test]
    async fn sequence_range_is_returned_in_folder_order() {
        let out = run(&range(value(3), value(2)), false, &[], &inbox(), Some("INBOX")).await;

        let second = out.find("* 2 FETCH (UID 20").unwrap();
        let third = out.find("* 3 FETCH (UID 30").unwrap();
        assert!(second < third);
        assert!(!out.contains("UID 10"));
    }

    #[tokio::test]
    async fn asterisk_means_last_message() {
        let out = run(
            &range(value(2), SeqOrUid::Asterisk),
            false,
            &[],
            &inbox(),
            Some("INBOX"),
        )
        .await;
        assert!(out.contains("* 3 FETCH (UID 30"));
        assert!(!out.contains("UID 10"));
    }

    #[tokio::test]
    async fn unknown_uid_returns_only_ok() {
        let out = run(&single(99), true, &["HEADER"], &inbox(), Some("INBOX")).await;
        assert_eq!(out, "A1 OK FETCH completed\r\n");
    }

    #[tokio::test]
    async fn missing_section_is_empty_literal() {
        let out = run(&single(10), true, &["3"], &inbox(), Some("INBOX")).await;
        assert!(out.contains(" BODY[3] {0}\r\n)"));
    }

    #[tokio::test]
    async fn requires_selected_folder() {
        let out = run(&single(10), true, &[], &inbox(), None).await;
        assert_eq!(out, "A1 BAD No folder selected\r\n");
    }
}
