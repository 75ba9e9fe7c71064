//! Full message parsing

use crate::message::{
    clean_display_name, decode_subject, normalize_date, AttachmentInfo, MessageDetail,
    MessageFlags, MessageSummary, UNKNOWN_ADDRESS,
};
use crate::snippet;
use mail_parser::{Address, HeaderName, MessageParser, MimeHeaders, PartType};
use tracing::warn;

pub const DEFAULT_ATTACHMENT_NAME: &str = "unnamed";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Parse a complete RFC 5322 message into a [`MessageDetail`]
///
/// Unparseable input still yields a detail carrying the UID and flags.
pub fn parse_message(uid: u32, raw: &[u8], flags: MessageFlags) -> MessageDetail {
    let Some(message) = MessageParser::default().parse(raw) else {
        warn!("Message {} could not be parsed, returning empty detail", uid);
        return MessageDetail {
            summary: MessageSummary {
                uid,
                subject: decode_subject(None),
                from: UNKNOWN_ADDRESS.to_string(),
                to: UNKNOWN_ADDRESS.to_string(),
                seen: flags.seen,
                ..Default::default()
            },
            ..Default::default()
        };
    };

    let html_body = message
        .html_bodies()
        .find(|part| matches!(part.body, PartType::Html(_)))
        .and_then(|part| part.text_contents())
        .map(str::to_string);
    let text_body = message
        .text_bodies()
        .find(|part| matches!(part.body, PartType::Text(_)))
        .and_then(|part| part.text_contents())
        .map(str::to_string);

    let attachments: Vec<AttachmentInfo> = message
        .attachments()
        .map(|part| {
            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                    None => ct.ctype().to_string(),
                })
                .map(|ct| ct.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

            AttachmentInfo {
                filename: part
                    .attachment_name()
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(DEFAULT_ATTACHMENT_NAME)
                    .to_string(),
                content_type,
                size: part.len(),
            }
        })
        .collect();

    let preview_source = text_body.as_deref().or(html_body.as_deref()).unwrap_or("");

    MessageDetail {
        summary: MessageSummary {
            uid,
            subject: decode_subject(message.subject()),
            from: format_parsed_addresses(message.from()),
            to: format_parsed_addresses(message.to()),
            date: message.header_raw(HeaderName::Date).map(normalize_date),
            seen: flags.seen,
            has_attachments: !attachments.is_empty(),
            snippet: snippet::snippet(preview_source),
        },
        html_body,
        text_body,
        attachments,
    }
}

fn format_parsed_addresses(address: Option<&Address<'_>>) -> String {
    let parts: Vec<String> = address
        .map(|list| {
            list.iter()
                .filter_map(|addr| {
                    let email = addr.address.as_deref().unwrap_or("").trim();
                    let name = addr.name.as_deref().map(clean_display_name).unwrap_or_default();
                    match (name.is_empty(), email.is_empty()) {
                        (true, true) => None,
                        (true, false) => Some(email.to_string()),
                        (false, true) => Some(name),
                        (false, false) => Some(format!("{} <{}>", name, email)),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if parts.is_empty() {
        UNKNOWN_ADDRESS.to_string()
    } else {
        parts.join(", ")
    }
}
