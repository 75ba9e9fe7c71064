//! Message types and header normalization

use crate::session::RawSummary;
use crate::snippet;
use chrono::DateTime;
use mail_parser::MessageParser;
use serde::Serialize;

/// Fallback for an empty address list
pub const UNKNOWN_ADDRESS: &str = "Unknown";

/// Fallback for a missing subject
pub const NO_SUBJECT: &str = "(No subject)";

/// Email message flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags {
    /// Message has been read
    pub seen: bool,
    /// Message has been answered
    pub answered: bool,
    /// Message is flagged/starred
    pub flagged: bool,
    /// Message is marked for deletion
    pub deleted: bool,
    /// Message is a draft
    pub draft: bool,
}

impl MessageFlags {
    /// Parse system flags; keywords are ignored
    pub fn from_imap_flags<S: AsRef<str>>(flags: &[S]) -> Self {
        let mut result = MessageFlags::default();

        for flag in flags {
            match flag.as_ref().to_ascii_lowercase().as_str() {
                "\\seen" => result.seen = true,
                "\\answered" => result.answered = true,
                "\\flagged" => result.flagged = true,
                "\\deleted" => result.deleted = true,
                "\\draft" => result.draft = true,
                _ => {}
            }
        }

        result
    }
}

/// Email address with optional display name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailAddress {
    /// Display name, possibly still RFC 2047 encoded
    pub name: Option<String>,
    /// `mailbox@host`
    pub address: String,
}

impl EmailAddress {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: address.into(),
        }
    }

    /// Format as "Name <address>" or just "address"
    pub fn to_display_string(&self) -> String {
        let name = self
            .name
            .as_deref()
            .map(|n| clean_display_name(&decode_encoded_words(n)))
            .unwrap_or_default();

        if name.is_empty() {
            self.address.clone()
        } else if self.address.is_empty() {
            name
        } else {
            format!("{} <{}>", name, self.address)
        }
    }
}

/// Envelope data from a summary fetch
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Subject line, possibly RFC 2047 encoded
    pub subject: Option<String>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    /// Date header as sent
    pub date: Option<String>,
}

/// Metadata shown in a message list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub uid: u32,
    pub subject: String,
    pub from: String,
    pub to: String,
    /// RFC 3339 when the header parsed, otherwise as sent
    pub date: Option<String>,
    pub seen: bool,
    pub has_attachments: bool,
    /// At most [`snippet::SNIPPET_MAX_CHARS`] characters
    pub snippet: String,
}

impl MessageSummary {
    /// Normalize one fetched summary
    pub fn from_raw(raw: &RawSummary) -> Self {
        let snippet = raw
            .preview
            .as_deref()
            .map(|bytes| snippet::snippet(&String::from_utf8_lossy(bytes)))
            .unwrap_or_default();

        Self {
            uid: raw.uid,
            subject: decode_subject(raw.envelope.subject.as_deref()),
            from: format_address_list(&raw.envelope.from),
            to: format_address_list(&raw.envelope.to),
            date: raw.envelope.date.as_deref().map(normalize_date),
            seen: raw.flags.seen,
            has_attachments: raw
                .structure
                .as_ref()
                .is_some_and(|s| s.has_attachment()),
            snippet,
        }
    }
}

/// Attachment metadata of a parsed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub filename: String,
    pub content_type: String,
    /// Decoded size in bytes
    pub size: usize,
}

/// A fully parsed message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    #[serde(flatten)]
    pub summary: MessageSummary,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
    pub attachments: Vec<AttachmentInfo>,
}

/// Join addresses as "Name <address>" separated by ", "
pub fn format_address_list(addresses: &[EmailAddress]) -> String {
    let parts: Vec<String> = addresses
        .iter()
        .map(EmailAddress::to_display_string)
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        UNKNOWN_ADDRESS.to_string()
    } else {
        parts.join(", ")
    }
}

/// Decode a subject, falling back to [`NO_SUBJECT`]
pub fn decode_subject(raw: Option<&str>) -> String {
    raw.map(decode_encoded_words)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string())
}

/// Decode RFC 2047 encoded words, returning the input unchanged otherwise
pub fn decode_encoded_words(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }

    let header = format!("Subject: {}\r\n\r\n", value.replace(['\r', '\n'], " "));
    MessageParser::default()
        .parse(header.as_bytes())
        .and_then(|message| message.subject().map(str::to_string))
        .unwrap_or_else(|| value.to_string())
}

/// Strip quote characters from a display name
///
/// Double-style quotes of any script are removed wherever they appear;
/// single quotes only when they wrap the name.
pub fn clean_display_name(name: &str) -> String {
    const DOUBLE_QUOTES: &[char] = &[
        '"', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201F}', '\u{00AB}', '\u{00BB}', '\u{300C}',
        '\u{300D}', '\u{300E}', '\u{300F}', '\u{301D}', '\u{301E}', '\u{FF02}',
    ];
    const SINGLE_QUOTES: &[char] = &['\'', '\u{2018}', '\u{2019}'];

    let stripped: String = name.chars().filter(|c| !DOUBLE_QUOTES.contains(c)).collect();
    stripped
        .trim()
        .trim_matches(SINGLE_QUOTES)
        .trim()
        .to_string()
}

/// Normalize a Date header to RFC 3339, keeping it as sent when unparseable
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    // Drop a trailing comment such as "(UTC)"
    let without_comment = match trimmed.rfind('(') {
        Some(idx) if trimmed.ends_with(')') => trimmed[..idx].trim_end(),
        _ => trimmed,
    };

    DateTime::parse_from_rfc2822(without_comment)
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|_| trimmed.to_string())
}
