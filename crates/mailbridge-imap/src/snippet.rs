//! Preview snippet extraction
//!
//! Servers hand back the first bytes of body part 1 in whatever shape the
//! sender produced: raw MIME with boundaries, quoted-printable, base64, HTML.
//! Each step below gets the current text and returns a replacement, or `None`
//! to keep it. Steps must never panic on arbitrary input.

use base64::prelude::*;

/// Maximum snippet length in characters
pub const SNIPPET_MAX_CHARS: usize = 150;

type Step = fn(&str) -> Option<String>;

const STEPS: &[(&str, Step)] = &[
    ("mime-artifacts", strip_mime_artifacts),
    ("quoted-printable", decode_quoted_printable),
    ("base64", decode_base64),
    ("html", strip_html),
    ("placeholders", strip_placeholders),
    ("whitespace", collapse_whitespace),
    ("truncate", truncate),
];

/// Produce a display snippet from a raw body preview
pub fn snippet(raw: &str) -> String {
    STEPS.iter().fold(raw.to_string(), |text, (name, step)| match step(&text) {
        Some(next) => {
            tracing::trace!("snippet step {} applied", name);
            next
        }
        None => text,
    })
}

fn is_boundary_line(line: &str) -> bool {
    let line = line.trim();
    line.len() > 2 && line.starts_with("--") && !line.contains(char::is_whitespace)
}

fn is_header_line(line: &str) -> bool {
    let Some((name, _)) = line.split_once(':') else {
        return false;
    };
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && name.to_ascii_lowercase().starts_with("content-")
}

/// Drop boundary lines and part header blocks, keeping the first part's text
fn strip_mime_artifacts(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let looks_mime = lines
        .iter()
        .any(|l| is_boundary_line(l) || is_header_line(l));
    if !looks_mime {
        return None;
    }

    let mut content: Vec<&str> = Vec::new();
    let mut in_headers = false;
    let mut seen_content = false;

    for (idx, line) in lines.iter().enumerate() {
        if is_boundary_line(line) {
            if seen_content {
                break;
            }
            in_headers = true;
            continue;
        }
        if idx == 0 && is_header_line(line) {
            in_headers = true;
        }
        if in_headers {
            if line.trim().is_empty() {
                in_headers = false;
            }
            continue;
        }
        if !line.trim().is_empty() {
            seen_content = true;
        }
        content.push(line);
    }

    let joined = content.join("\n");
    if joined.trim().is_empty() || joined == text {
        None
    } else {
        Some(joined)
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

fn looks_quoted_printable(bytes: &[u8]) -> bool {
    bytes.windows(3).any(|w| {
        w[0] == b'='
            && ((w[1] == b'\r' && w[2] == b'\n')
                || (hex_value(w[1]).is_some() && hex_value(w[2]).is_some()))
    }) || bytes.ends_with(b"=\n")
        || bytes.windows(2).any(|w| w == b"=\n")
}

/// Decode soft line breaks and `=XX` escapes
fn decode_quoted_printable(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    if !looks_quoted_printable(bytes) {
        return None;
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'=' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match (bytes.get(i + 1), bytes.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(&hi), Some(&lo)) => match (hex_value(hi), hex_value(lo)) {
                (Some(hi), Some(lo)) => {
                    out.push(hi << 4 | lo);
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            },
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }

    let utf8 = String::from_utf8_lossy(&out);
    if utf8.chars().take(50).any(|c| c == char::REPLACEMENT_CHARACTER) {
        // Not UTF-8: treat the bytes as Latin-1
        Some(out.iter().map(|&b| b as char).collect())
    } else {
        Some(utf8.into_owned())
    }
}

fn is_printable(c: char) -> bool {
    !c.is_control() || c.is_whitespace()
}

/// Decode a body that is nothing but base64
fn decode_base64(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.contains([' ', '\t']) {
        return None;
    }

    let compact: String = trimmed.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    if compact.len() <= 20
        || !compact
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
    {
        return None;
    }

    // Previews are cut mid-stream
    let usable = compact.len() - compact.len() % 4;
    let decoded = BASE64_STANDARD.decode(&compact[..usable]).ok()?;

    let valid = match std::str::from_utf8(&decoded) {
        Ok(s) => s,
        Err(e) => std::str::from_utf8(&decoded[..e.valid_up_to()]).ok()?,
    };
    let total = valid.chars().count();
    if total == 0 {
        return None;
    }
    let printable = valid.chars().filter(|c| is_printable(*c)).count();
    if printable * 10 < total * 9 {
        return None;
    }
    Some(valid.to_string())
}

fn looks_like_html(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    ["<html", "<body", "<div", "<p>", "<p ", "<br", "<span", "<table", "<td", "<a ", "<!doctype"]
        .iter()
        .any(|tag| lower.contains(tag))
}

fn skip_block(lower: &str, from: usize, close: &str) -> usize {
    match lower[from..].find(close) {
        Some(pos) => from + pos + close.len(),
        None => lower.len(),
    }
}

/// Remove tags, style and script blocks, and common entities
fn strip_html(text: &str) -> Option<String> {
    if !looks_like_html(text) {
        return None;
    }

    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        let rest = &lower[i..];
        if rest.starts_with("<style") {
            i = skip_block(&lower, i, "</style>");
        } else if rest.starts_with("<script") {
            i = skip_block(&lower, i, "</script>");
        } else if rest.starts_with("<!--") {
            i = skip_block(&lower, i, "-->");
        } else if rest.starts_with('<') {
            i = skip_block(&lower, i, ">");
            out.push(' ');
        } else {
            let Some(c) = text[i..].chars().next() else {
                break;
            };
            out.push(c);
            i += c.len_utf8();
        }
    }

    Some(
        out.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&"),
    )
}

fn is_link_token(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    ["http://", "https://", "www.", "cid:"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

fn is_placeholder(inner: &str) -> bool {
    let lower = inner.trim().to_ascii_lowercase();
    lower.starts_with("image:") || lower.starts_with("cid:") || is_link_token(&lower)
}

/// Remove image and cid placeholders, URLs, and invisible characters
fn strip_placeholders(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        let close = match c {
            '[' => Some(']'),
            '<' => Some('>'),
            '\u{00AD}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => continue,
            _ => None,
        };
        if let Some(close) = close {
            let start = idx + c.len_utf8();
            if let Some(len) = text[start..].find(close) {
                if is_placeholder(&text[start..start + len]) {
                    let end = start + len + close.len_utf8();
                    while chars.peek().is_some_and(|(i, _)| *i < end) {
                        chars.next();
                    }
                    out.push(' ');
                    continue;
                }
            }
        }
        out.push(c);
    }

    let cleaned: Vec<&str> = out
        .split_whitespace()
        .filter(|token| !is_link_token(token.trim_start_matches(['(', '"', '\''])))
        .collect();
    Some(cleaned.join(" "))
}

fn collapse_whitespace(text: &str) -> Option<String> {
    Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn truncate(text: &str) -> Option<String> {
    if text.chars().count() <= SNIPPET_MAX_CHARS {
        return None;
    }
    Some(text.chars().take(SNIPPET_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_collapsed() {
        assert_eq!(snippet("Hello\r\n\r\n  there,\tfriend"), "Hello there, friend");
    }

    #[test]
    fn test_mime_boundary_and_headers_removed() {
        let raw = "--b1_abc\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 7bit\r\n\r\nMeeting moved to 3pm.\r\n--b1_abc\r\nContent-Type: text/html\r\n\r\n<p>Meeting moved</p>";
        assert_eq!(snippet(raw), "Meeting moved to 3pm.");
    }

    #[test]
    fn test_quoted_printable_utf8() {
        assert_eq!(snippet("Gr=C3=BC=C3=9Fe aus M=C3=BCn=\r\nchen"), "Grüße aus München");
    }

    #[test]
    fn test_quoted_printable_latin1_fallback() {
        assert_eq!(snippet("Caf=E9 cr=E8me"), "Café crème");
    }

    #[test]
    fn test_base64_body_decoded() {
        let encoded = BASE64_STANDARD.encode("Your order has shipped and will arrive Monday.");
        assert_eq!(snippet(&encoded), "Your order has shipped and will arrive Monday.");
    }

    #[test]
    fn test_base64_cut_mid_stream() {
        let encoded = BASE64_STANDARD.encode("Weekly report attached for review by the team");
        let cut = &encoded[..encoded.len() - 3];
        assert!(snippet(cut).starts_with("Weekly report attached"));
    }

    #[test]
    fn test_short_token_not_treated_as_base64() {
        assert_eq!(snippet("Thanks"), "Thanks");
    }

    #[test]
    fn test_html_stripped() {
        let raw = "<html><head><style>p{color:red}</style></head><body><p>Hi&nbsp;Ann,</p><div>See you &amp; Bob</div></body></html>";
        assert_eq!(snippet(raw), "Hi Ann, See you & Bob");
    }

    #[test]
    fn test_placeholders_and_urls_removed() {
        let raw = "[image: Logo] Welcome\u{00AD}! Visit https://example.com/x?y=1 or <https://example.com> [cid:part1.abc] www.example.org now";
        assert_eq!(snippet(raw), "Welcome! Visit or now");
    }

    #[test]
    fn test_truncated_to_limit() {
        let long = "word ".repeat(100);
        let out = snippet(&long);
        assert_eq!(out.chars().count(), SNIPPET_MAX_CHARS);
    }

    #[test]
    fn test_never_panics_on_odd_input() {
        let inputs = [
            "",
            "=",
            "==",
            "=\r",
            "=4",
            "<",
            "<style",
            "[",
            "[image:",
            "--",
            "----\r\n",
            "Content-Type:",
            "\u{FFFD}\u{FFFD}=FF=FE",
            "ÄÖÜ<div>ß</div>[cid:é",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAA====",
            "////////////////////////////////",
        ];
        for input in inputs {
            let out = snippet(input);
            assert!(out.chars().count() <= SNIPPET_MAX_CHARS);
        }

        let multibyte = "日本語のメール本文です。".repeat(40);
        assert_eq!(snippet(&multibyte).chars().count(), SNIPPET_MAX_CHARS);
    }
}
