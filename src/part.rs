//! MIME part navigation
//!
//! Turns a message's body structure into an addressable [`PartNode`]
//! tree and picks the part shown by default. Part paths are sequences of
//! 1-based indices, written dot-joined (`"1.2"`) exactly as IMAP section
//! specifiers address them, so they can be fed back into a fetch as-is.

use crate::error::{Error, Result};
use async_imap::imap_proto::types::{BodyContentCommon, BodyStructure as ImapBodyStructure};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// The MIME layout of a message as reported by the server.
///
/// Only multipart nodes have `parts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BodyStructure {
    pub mime_type: String,
    pub mime_subtype: String,
    pub disposition: Option<String>,
    pub filename: Option<String>,
    pub parts: Vec<BodyStructure>,
}

impl BodyStructure {
    /// A single-part node, e.g. `leaf("text", "plain")`.
    #[must_use]
    pub fn leaf(mime_type: &str, mime_subtype: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            mime_subtype: mime_subtype.to_string(),
            disposition: None,
            filename: None,
            parts: Vec::new(),
        }
    }

    /// A `multipart/<subtype>` node holding `parts` in order.
    #[must_use]
    pub fn multipart(mime_subtype: &str, parts: Vec<Self>) -> Self {
        Self {
            parts,
            ..Self::leaf("multipart", mime_subtype)
        }
    }

    #[must_use]
    pub fn with_disposition(mut self, disposition: &str) -> Self {
        self.disposition = Some(disposition.to_string());
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("multipart")
    }

    /// Whether the node carries a disposition other than `inline`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.disposition
            .as_deref()
            .is_some_and(|d| !d.is_empty() && !d.eq_ignore_ascii_case("inline"))
    }

    fn is_text(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("text")
    }

    fn from_common(common: &BodyContentCommon<'_>, parts: Vec<Self>) -> Self {
        let disposition = common.disposition.as_ref();
        let filename = disposition
            .and_then(|d| param(d.params.as_deref(), "filename"))
            .or_else(|| param(common.ty.params.as_deref(), "name"));

        Self {
            mime_type: common.ty.ty.to_string(),
            mime_subtype: common.ty.subtype.to_string(),
            disposition: disposition.map(|d| d.ty.to_string()),
            filename,
            parts,
        }
    }
}

fn param(params: Option<&[(Cow<'_, str>, Cow<'_, str>)]>, key: &str) -> Option<String> {
    params?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.to_string())
}

impl From<&ImapBodyStructure<'_>> for BodyStructure {
    fn from(bs: &ImapBodyStructure<'_>) -> Self {
        match bs {
            // An embedded message/rfc822 is a leaf here: only multipart
            // nodes have children.
            ImapBodyStructure::Basic { common, .. }
            | ImapBodyStructure::Text { common, .. }
            | ImapBodyStructure::Message { common, .. } => Self::from_common(common, Vec::new()),
            ImapBodyStructure::Multipart { common, bodies, .. } => {
                Self::from_common(common, bodies.iter().map(Self::from).collect())
            }
        }
    }
}

/// One node of a message's navigable part tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartNode {
    pub path: Vec<u32>,
    /// Lower-cased `type/subtype`.
    pub mime_type: String,
    pub filename: Option<String>,
    pub children: Vec<PartNode>,
}

impl PartNode {
    #[must_use]
    pub fn path_string(&self) -> String {
        format_part_path(&self.path)
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
    }
}

impl fmt::Display for PartNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{filename} ({})", self.mime_type),
            None => f.write_str(&self.mime_type),
        }
    }
}

/// Mirror `bs` as a [`PartNode`] tree.
///
/// A multipart root has the empty path and its children are `[1]`,
/// `[2]`, ...; a single-part root is addressed as `[1]`.
#[must_use]
pub fn build_tree(bs: &BodyStructure) -> PartNode {
    let path = if bs.is_multipart() { Vec::new() } else { vec![1] };
    build_node(bs, path)
}

fn build_node(bs: &BodyStructure, path: Vec<u32>) -> PartNode {
    let children = bs
        .parts
        .iter()
        .zip(1..)
        .map(|(part, num)| {
            let mut child_path = path.clone();
            child_path.push(num);
            build_node(part, child_path)
        })
        .collect();

    PartNode {
        path,
        mime_type: format!("{}/{}", bs.mime_type, bs.mime_subtype).to_lowercase(),
        filename: bs.filename.clone(),
        children,
    }
}

/// Pick the part to display by default.
///
/// Within one multipart level, `text/plain` displaces any earlier
/// candidate while `text/html` is only taken when nothing was chosen yet.
/// A nested multipart that yields a part ends the scan right there, so
/// later siblings are never looked at. Parts with a non-inline
/// disposition are never picked.
#[must_use]
pub fn select_text_path(bs: &BodyStructure) -> Option<Vec<u32>> {
    if bs.is_attachment() {
        return None;
    }
    if bs.is_text() {
        return Some(vec![1]);
    }
    if !bs.is_multipart() {
        return None;
    }

    let mut candidate = None;
    for (part, num) in bs.parts.iter().zip(1..) {
        if part.is_multipart() {
            if let Some(subpath) = select_text_path(part) {
                let mut path = vec![num];
                path.extend(subpath);
                return Some(path);
            }
            continue;
        }
        if !part.is_text() || part.is_attachment() {
            continue;
        }

        match part.mime_subtype.to_ascii_lowercase().as_str() {
            "plain" => candidate = Some(num),
            "html" if candidate.is_none() => candidate = Some(num),
            _ => {}
        }
    }

    candidate.map(|num| vec![num])
}

/// Dot-join a part path: `[1, 2]` becomes `"1.2"`.
#[must_use]
pub fn format_part_path(path: &[u32]) -> String {
    path.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse a dot-joined part path. The empty string is the whole message.
///
/// # Errors
///
/// Returns [`Error::Parse`] if a segment is not a positive integer.
pub fn parse_part_path(s: &str) -> Result<Vec<u32>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split('.')
        .map(|segment| match segment.parse::<u32>() {
            Ok(num) if num > 0 => Ok(num),
            _ => Err(Error::Parse(format!("Invalid part path: {s}"))),
        })
        .collect()
}
