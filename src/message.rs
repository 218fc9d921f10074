//! Message listing and part retrieval
//!
//! Messages are listed a page at a time, newest first, and individual
//! parts are fetched by UID and part path without setting `\Seen`.

use crate::connection::ImapConnection;
use crate::error::{Error, Result};
use crate::part::{BodyStructure, PartNode, build_tree, format_part_path, select_text_path};
use async_imap::imap_proto::types::{
    Address as ImapAddress, Envelope as ImapEnvelope, MessageSection, SectionPath,
};
use async_imap::types::Fetch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Messages per page; page 0 holds the most recent ones.
pub const MESSAGES_PER_PAGE: u32 = 50;

/// The sequence-number range one page covers, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub from: u32,
    pub to: u32,
}

impl PageWindow {
    /// The window of `page` in a mailbox of `total` messages, or `None`
    /// if the page lies past the oldest message.
    #[must_use]
    pub fn new(total: u32, page: u32) -> Option<Self> {
        let to = i64::from(total) - i64::from(page) * i64::from(MESSAGES_PER_PAGE);
        if to <= 0 {
            return None;
        }
        let from = (to - i64::from(MESSAGES_PER_PAGE) + 1).max(1);

        Some(Self {
            from: u32::try_from(from).ok()?,
            to: u32::try_from(to).ok()?,
        })
    }

    #[must_use]
    pub fn sequence_set(&self) -> String {
        format!("{}:{}", self.from, self.to)
    }
}

/// A mailbox address from an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    pub name: Option<String>,
    pub address: String,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} <{}>", self.address),
            None => f.write_str(&self.address),
        }
    }
}

/// Envelope metadata of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub date: Option<DateTime<Utc>>,
    pub subject: String,
    pub from: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
}

/// Decode RFC 2047 encoded words by running the value through the
/// header parser.
fn decode_words(raw: &[u8]) -> String {
    let mut line = b"X: ".to_vec();
    line.extend_from_slice(raw);
    mailparse::parse_header(&line).map_or_else(
        |_| String::from_utf8_lossy(raw).into_owned(),
        |(header, _)| header.get_value(),
    )
}

fn lossy(raw: Option<&[u8]>) -> Option<String> {
    raw.map(|r| String::from_utf8_lossy(r).into_owned())
}

fn addresses(list: Option<&Vec<ImapAddress<'_>>>) -> Vec<Address> {
    list.into_iter()
        .flatten()
        .filter_map(|addr| {
            // Group syntax markers have no host.
            let mailbox = lossy(addr.mailbox.as_deref())?;
            let host = lossy(addr.host.as_deref())?;
            Some(Address {
                name: addr
                    .name
                    .as_deref()
                    .map(decode_words)
                    .filter(|n| !n.is_empty()),
                address: format!("{mailbox}@{host}"),
            })
        })
        .collect()
}

impl From<&ImapEnvelope<'_>> for Envelope {
    fn from(env: &ImapEnvelope<'_>) -> Self {
        let date = env
            .date
            .as_deref()
            .and_then(|d| mailparse::dateparse(&String::from_utf8_lossy(d)).ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0));

        Self {
            date,
            subject: env.subject.as_deref().map(decode_words).unwrap_or_default(),
            from: addresses(env.from.as_ref()),
            to: addresses(env.to.as_ref()),
            cc: addresses(env.cc.as_ref()),
            message_id: lossy(env.message_id.as_deref()),
            in_reply_to: lossy(env.in_reply_to.as_deref()),
        }
    }
}

/// What the list and part views know about one message.
///
/// Fetched fresh for every request; nothing here is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    /// Sequence number at fetch time.
    pub seq: u32,
    pub uid: u32,
    pub envelope: Option<Envelope>,
    pub body_structure: Option<BodyStructure>,
}

impl MessageSummary {
    fn from_fetch(fetch: &Fetch) -> Result<Self> {
        let uid = fetch
            .uid
            .ok_or_else(|| Error::Parse(format!("No UID for message {}", fetch.message)))?;

        Ok(Self {
            seq: fetch.message,
            uid,
            envelope: fetch.envelope().map(Envelope::from),
            body_structure: fetch.bodystructure().map(BodyStructure::from),
        })
    }

    /// Path of the part shown by default.
    #[must_use]
    pub fn text_part_path(&self) -> Option<Vec<u32>> {
        self.body_structure.as_ref().and_then(select_text_path)
    }

    /// Dot-joined [`Self::text_part_path`].
    #[must_use]
    pub fn text_part_name(&self) -> Option<String> {
        self.text_part_path().map(|path| format_part_path(&path))
    }

    #[must_use]
    pub fn part_tree(&self) -> Option<PartNode> {
        self.body_structure.as_ref().map(build_tree)
    }
}

/// A fetched message part, parsed into headers and decoded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartEntity {
    pub headers: Vec<(String, String)>,
    /// Lower-cased `type/subtype`.
    pub mime_type: String,
    pub charset: String,
    pub filename: Option<String>,
    /// Body with the transfer encoding removed.
    pub body: Vec<u8>,
    /// Body decoded to text, for `text/*` parts.
    pub text: Option<String>,
}

impl PartEntity {
    /// Build an entity from a raw header block and the content it heads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the header block is malformed or the
    /// body cannot be decoded.
    pub fn parse(header: &[u8], body: &[u8]) -> Result<Self> {
        mailparse::parse_headers(header)
            .map_err(|e| Error::Parse(format!("Failed to read part header: {e}")))?;

        let mut raw = header.to_vec();
        if !(raw.ends_with(b"\r\n\r\n") || raw.ends_with(b"\n\n")) {
            if !raw.is_empty() && !raw.ends_with(b"\n") {
                raw.extend_from_slice(b"\r\n");
            }
            raw.extend_from_slice(b"\r\n");
        }
        raw.extend_from_slice(body);

        let parsed = mailparse::parse_mail(&raw)
            .map_err(|e| Error::Parse(format!("Failed to create message reader: {e}")))?;

        let mime_type = parsed.ctype.mimetype.to_lowercase();
        let text = if mime_type.starts_with("text/") {
            Some(
                parsed
                    .get_body()
                    .map_err(|e| Error::Parse(format!("Failed to decode part: {e}")))?,
            )
        } else {
            None
        };
        let filename = parsed
            .get_content_disposition()
            .params
            .get("filename")
            .or_else(|| parsed.ctype.params.get("name"))
            .cloned();

        Ok(Self {
            headers: parsed
                .headers
                .iter()
                .map(|h| (h.get_key(), h.get_value()))
                .collect(),
            mime_type,
            charset: parsed.ctype.charset.clone(),
            filename,
            body: parsed
                .get_body_raw()
                .map_err(|e| Error::Parse(format!("Failed to decode part: {e}")))?,
            text,
        })
    }

    /// First value of header `name`, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// List one page of `mailbox`, most recent message first.
///
/// A page past the oldest message is empty, not an error.
///
/// # Errors
///
/// Returns an error if the SELECT or FETCH fails, or a message comes
/// back without a UID.
pub async fn list_messages(
    conn: &mut ImapConnection,
    mailbox: &str,
    page: u32,
) -> Result<Vec<MessageSummary>> {
    conn.ensure_selected(mailbox).await?;

    let total = conn.message_count().unwrap_or(0);
    let Some(window) = PageWindow::new(total, page) else {
        debug!("Page {} of {} is past the oldest message", page, mailbox);
        return Ok(vec![]);
    };

    let fetched = match conn
        .session()
        .fetch(window.sequence_set(), "(ENVELOPE UID BODYSTRUCTURE)")
        .await
    {
        Ok(stream) => stream.try_collect::<Vec<Fetch>>().await,
        Err(e) => Err(e),
    };
    let fetches = conn.check(fetched, "Failed to fetch message list")?;

    let mut messages = fetches
        .iter()
        .map(MessageSummary::from_fetch)
        .collect::<Result<Vec<_>>>()?;
    messages.reverse();

    info!(
        "Listed {} messages ({}) in {}",
        messages.len(),
        window.sequence_set(),
        mailbox
    );
    Ok(messages)
}

/// The header and body sections addressing `path`.
///
/// The empty path is the whole message: its header and its text.
fn part_sections(path: &[u32]) -> (SectionPath, SectionPath, String, String) {
    if path.is_empty() {
        (
            SectionPath::Full(MessageSection::Header),
            SectionPath::Full(MessageSection::Text),
            "HEADER".to_string(),
            "TEXT".to_string(),
        )
    } else {
        let name = format_part_path(path);
        (
            SectionPath::Part(path.to_vec(), Some(MessageSection::Mime)),
            SectionPath::Part(path.to_vec(), None),
            format!("{name}.MIME"),
            name,
        )
    }
}

/// A section the FETCH asked for. An empty section is fine; one the
/// server left out (or sent as NIL) is not.
fn required_section<'a>(section: Option<&'a [u8]>, name: &str, uid: u32) -> Result<&'a [u8]> {
    section.ok_or_else(|| Error::Parse(format!("Missing BODY[{name}] for UID {uid}")))
}

/// Fetch message `uid` of `mailbox` along with the part at `path`.
///
/// Both sections are read with `BODY.PEEK`, so the message is not marked
/// as seen.
///
/// # Errors
///
/// Returns an error if the SELECT or FETCH fails, the server returns no
/// such message or leaves out either section, or the part cannot be
/// parsed.
pub async fn fetch_part(
    conn: &mut ImapConnection,
    mailbox: &str,
    uid: u32,
    path: &[u32],
) -> Result<(MessageSummary, PartEntity)> {
    conn.ensure_selected(mailbox).await?;

    let (header_path, body_path, header_name, body_name) = part_sections(path);
    let query = format!(
        "(ENVELOPE UID BODYSTRUCTURE BODY.PEEK[{header_name}] BODY.PEEK[{body_name}])"
    );

    let fetched = match conn.session().uid_fetch(uid.to_string(), &query).await {
        Ok(stream) => stream.try_collect::<Vec<Fetch>>().await,
        Err(e) => Err(e),
    };
    let fetches = conn.check(fetched, "Failed to fetch message")?;

    let fetch = fetches
        .iter()
        .find(|f| f.uid == Some(uid))
        .ok_or_else(|| Error::Parse(format!("Server didn't return message {uid}")))?;

    let header = required_section(fetch.section(&header_path), &header_name, uid)?;
    let body = required_section(fetch.section(&body_path), &body_name, uid)?;

    let part = PartEntity::parse(header, body)?;
    debug!("Fetched part {} of UID {} ({})", body_name, uid, part.mime_type);

    Ok((MessageSummary::from_fetch(fetch)?, part))
}
