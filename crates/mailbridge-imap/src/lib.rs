//! IMAP session layer for mailbridge
//!
//! Two halves:
//! - the [`MailSession`] seam and its async-imap implementation
//! - content normalization of what the server returns: folder trees,
//!   envelopes, body structures, snippets and full MIME parses

mod client;
mod error;
mod folder;
mod message;
mod mime;
mod session;
pub mod snippet;
mod structure;

pub use client::{ImapConnector, ImapSession, ImapStream};
pub use error::{ImapError, ImapResult};
pub use folder::{deduplicate_folder_types, flatten_folders, FolderDescriptor, FolderType};
pub use message::{
    decode_subject, format_address_list, normalize_date, AttachmentInfo, EmailAddress, Envelope,
    MessageDetail, MessageFlags, MessageSummary,
};
pub use mime::parse_message;
pub use session::{
    quote, search_criteria, uid_set, Connector, FetchSet, MailSession, MailboxStatus, RawFolder,
    RawMessage, RawSummary, PREVIEW_BYTES,
};
pub use structure::{BodyPart, LeafPart};
