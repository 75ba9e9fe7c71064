//! Protocol session seam
//!
//! Mailbox operations talk to the server only through [`MailSession`], which
//! exposes accumulated, already-decoded protocol results. The async-imap
//! backed implementation lives in `client.rs`.

use crate::message::{Envelope, MessageFlags};
use crate::structure::BodyPart;
use crate::ImapResult;
use async_trait::async_trait;
use mailbridge_auth::ConnectParams;

/// Bytes of the first body part fetched for a summary snippet
pub const PREVIEW_BYTES: u32 = 500;

/// One entry of a LIST response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFolder {
    /// Full mailbox name as reported by the server
    pub name: String,
    /// Hierarchy delimiter, `None` for flat namespaces
    pub delimiter: Option<String>,
    /// Mailbox attributes such as `\Noselect` or `\Sent`
    pub attributes: Vec<String>,
}

/// Status of a folder after SELECT or EXAMINE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the folder
    pub exists: u32,
    pub uid_validity: Option<u32>,
    pub uid_next: Option<u32>,
}

/// Messages addressed by a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchSet {
    /// Inclusive sequence-number range
    Sequence { start: u32, end: u32 },
    /// Explicit UIDs
    Uids(Vec<u32>),
}

impl FetchSet {
    /// Render as an IMAP sequence set
    pub fn to_imap(&self) -> String {
        match self {
            FetchSet::Sequence { start, end } => format!("{}:{}", start, end),
            FetchSet::Uids(uids) => uid_set(uids),
        }
    }
}

/// Metadata fetched for one message of a listing
#[derive(Debug, Clone, Default)]
pub struct RawSummary {
    pub uid: u32,
    pub envelope: Envelope,
    pub flags: MessageFlags,
    /// Server-reported MIME structure
    pub structure: Option<BodyPart>,
    /// Leading bytes of body part 1
    pub preview: Option<Vec<u8>>,
}

/// A complete message as fetched by UID
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub uid: u32,
    pub flags: MessageFlags,
    /// Entire RFC 5322 message
    pub body: Vec<u8>,
}

/// An authenticated session to a mailbox server
#[async_trait]
pub trait MailSession: Send {
    /// List every folder visible to the account
    async fn list_folders(&mut self) -> ImapResult<Vec<RawFolder>>;

    /// Open a folder read-only
    async fn examine(&mut self, folder: &str) -> ImapResult<MailboxStatus>;

    /// Open a folder read-write
    async fn select(&mut self, folder: &str) -> ImapResult<MailboxStatus>;

    /// Fetch UID, flags, envelope, body structure and a preview of part 1
    async fn fetch_summaries(&mut self, set: &FetchSet) -> ImapResult<Vec<RawSummary>>;

    /// Run a UID SEARCH with raw criteria
    async fn uid_search(&mut self, criteria: &str) -> ImapResult<Vec<u32>>;

    /// Fetch the full message and flags for one UID, `None` if the server
    /// returned nothing for it
    async fn fetch_message(&mut self, uid: u32) -> ImapResult<Option<RawMessage>>;

    /// Add flags to every UID in one STORE
    async fn add_flags(&mut self, uids: &[u32], flags: &[&str]) -> ImapResult<()>;

    /// Permanently remove messages flagged `\Deleted`
    async fn expunge(&mut self) -> ImapResult<()>;

    /// Round trip a NOOP; fails once the server has dropped the connection
    async fn noop(&mut self) -> ImapResult<()>;

    /// End the session
    async fn logout(&mut self) -> ImapResult<()>;
}

/// Opens authenticated sessions
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: MailSession + 'static;

    /// Connect to the target and authenticate
    async fn connect(&self, params: &ConnectParams) -> ImapResult<Self::Session>;
}

/// Render UIDs as a compact sequence set, merging consecutive runs
///
/// `[7, 1, 2, 3]` becomes `"1:3,7"`.
pub fn uid_set(uids: &[u32]) -> String {
    let mut sorted = uids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let (mut start, mut end) = (first, first);
    for uid in iter {
        if uid == end + 1 {
            end = uid;
            continue;
        }
        parts.push(render_run(start, end));
        start = uid;
        end = uid;
    }
    parts.push(render_run(start, end));
    parts.join(",")
}

fn render_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}:{}", start, end)
    }
}

/// Quote a user string as an IMAP quoted string
///
/// CR and LF cannot appear in a quoted string and are dropped.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\r' | '\n' => {}
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Build search criteria for one key and a user query
pub fn search_criteria(key: &str, query: &str) -> String {
    if query.is_ascii() {
        format!("{} {}", key, quote(query))
    } else {
        format!("CHARSET UTF-8 {} {}", key, quote(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_set_merges_runs() {
        assert_eq!(uid_set(&[7, 1, 2, 3]), "1:3,7");
        assert_eq!(uid_set(&[5]), "5");
        assert_eq!(uid_set(&[4, 4, 9, 10, 12]), "4,9:10,12");
        assert_eq!(uid_set(&[]), "");
    }

    #[test]
    fn test_fetch_set_rendering() {
        assert_eq!(FetchSet::Sequence { start: 71, end: 120 }.to_imap(), "71:120");
        assert_eq!(FetchSet::Uids(vec![30, 10, 20]).to_imap(), "10,20,30");
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("invoice"), "\"invoice\"");
        assert_eq!(quote("say \"hi\"\\now"), "\"say \\\"hi\\\"\\\\now\"");
        assert_eq!(quote("a\r\nb"), "\"ab\"");
    }

    #[test]
    fn test_search_criteria_charset() {
        assert_eq!(search_criteria("SUBJECT", "invoice"), "SUBJECT \"invoice\"");
        assert_eq!(
            search_criteria("TEXT", "Rechnung über"),
            "CHARSET UTF-8 TEXT \"Rechnung über\""
        );
    }
}
