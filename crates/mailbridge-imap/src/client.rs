//! async-imap backed sessions

use crate::message::{EmailAddress, Envelope, MessageFlags};
use crate::session::{
    uid_set, Connector, FetchSet, MailSession, MailboxStatus, RawFolder, RawMessage, RawSummary,
    PREVIEW_BYTES,
};
use crate::structure::BodyPart;
use crate::{ImapError, ImapResult};
use async_imap::types::{Fetch, Flag, Mailbox};
use async_imap::{Authenticator, Client, Session};
use async_native_tls::{TlsConnector, TlsStream};
use async_std::net::TcpStream;
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use futures::TryStreamExt;
use imap_proto::types::{NameAttribute, SectionPath};
use mailbridge_auth::{ConnectAuth, ConnectParams, XOAuth2Token};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

/// Transport under an IMAP session
pub enum ImapStream {
    Tls(TlsStream<TcpStream>),
    Plain(TcpStream),
}

impl AsyncRead for ImapStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ImapStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
            ImapStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ImapStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            ImapStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
            ImapStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ImapStream::Tls(s) => Pin::new(s).poll_flush(cx),
            ImapStream::Plain(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            ImapStream::Tls(s) => Pin::new(s).poll_close(cx),
            ImapStream::Plain(s) => Pin::new(s).poll_close(cx),
        }
    }
}

impl fmt::Debug for ImapStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImapStream::Tls(_) => write!(f, "ImapStream::Tls"),
            ImapStream::Plain(_) => write!(f, "ImapStream::Plain"),
        }
    }
}

/// SASL XOAUTH2 for async-imap
///
/// async-imap base64-encodes the response itself, so the raw auth string is
/// returned here.
struct XOAuth2Authenticator(XOAuth2Token);

impl Authenticator for XOAuth2Authenticator {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        self.0.auth_string()
    }
}

/// Opens TLS or plain TCP sessions and authenticates them
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

impl ImapConnector {
    pub fn new() -> Self {
        Self
    }

    async fn open_stream(&self, params: &ConnectParams) -> ImapResult<ImapStream> {
        let host = params.target.host.as_str();
        let port = params.target.port;

        info!("Connecting to {}:{}", host, port);
        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| ImapError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;

        if !params.target.use_tls {
            warn!("Using unencrypted connection to {}:{}", host, port);
            return Ok(ImapStream::Plain(tcp));
        }

        let tls = TlsConnector::new()
            .connect(host, tcp)
            .await
            .map_err(|e| ImapError::TlsError(e.to_string()))?;
        debug!("TLS connection established");
        Ok(ImapStream::Tls(tls))
    }
}

#[async_trait]
impl Connector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self, params: &ConnectParams) -> ImapResult<ImapSession> {
        let stream = self.open_stream(params).await?;
        let client = Client::new(stream);

        let session = match &params.auth {
            ConnectAuth::Password(password) => {
                info!("Authenticating with LOGIN for {}", params.username);
                client
                    .login(&params.username, password)
                    .await
                    .map_err(|(e, _)| login_error(e))?
            }
            ConnectAuth::XOAuth2(token) => {
                info!("Authenticating with XOAUTH2 for {}", params.username);
                client
                    .authenticate("XOAUTH2", XOAuth2Authenticator(token.clone()))
                    .await
                    .map_err(|(e, _)| login_error(e))?
            }
        };

        info!("Authenticated {}", params.session_key());
        Ok(ImapSession { session })
    }
}

/// An authenticated async-imap session
pub struct ImapSession {
    session: Session<ImapStream>,
}

impl fmt::Debug for ImapSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapSession").finish_non_exhaustive()
    }
}

fn summary_query() -> String {
    format!(
        "(UID FLAGS ENVELOPE BODYSTRUCTURE BODY.PEEK[1]<0.{}>)",
        PREVIEW_BYTES
    )
}

fn mailbox_status(mailbox: &Mailbox) -> MailboxStatus {
    MailboxStatus {
        exists: mailbox.exists,
        uid_validity: mailbox.uid_validity,
        uid_next: mailbox.uid_next,
    }
}

/// Rejections are auth failures; a dropped socket is not
fn login_error(e: async_imap::error::Error) -> ImapError {
    match e {
        async_imap::error::Error::Io(io) => ImapError::ConnectionFailed(io.to_string()),
        other => ImapError::AuthenticationFailed(other.to_string()),
    }
}

fn open_error(folder: &str, e: async_imap::error::Error) -> ImapError {
    match e {
        async_imap::error::Error::No(msg) => ImapError::FolderNotFound(format!("{}: {}", folder, msg)),
        other => other.into(),
    }
}

fn attribute_name(attr: &NameAttribute<'_>) -> String {
    match attr {
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::All => "\\All".to_string(),
        NameAttribute::Archive => "\\Archive".to_string(),
        NameAttribute::Drafts => "\\Drafts".to_string(),
        NameAttribute::Flagged => "\\Flagged".to_string(),
        NameAttribute::Junk => "\\Junk".to_string(),
        NameAttribute::Sent => "\\Sent".to_string(),
        NameAttribute::Trash => "\\Trash".to_string(),
        NameAttribute::Extension(ext) => ext.to_string(),
        other => format!("{:?}", other),
    }
}

fn flags_of(fetch: &Fetch) -> MessageFlags {
    let names: Vec<&str> = fetch
        .flags()
        .filter_map(|flag| match flag {
            Flag::Seen => Some("\\Seen"),
            Flag::Answered => Some("\\Answered"),
            Flag::Flagged => Some("\\Flagged"),
            Flag::Deleted => Some("\\Deleted"),
            Flag::Draft => Some("\\Draft"),
            _ => None,
        })
        .collect();
    MessageFlags::from_imap_flags(&names)
}

fn lossy(bytes: &Option<std::borrow::Cow<'_, [u8]>>) -> Option<String> {
    bytes
        .as_ref()
        .map(|b| String::from_utf8_lossy(b).trim().to_string())
}

fn addresses(list: &Option<Vec<imap_proto::types::Address<'_>>>) -> Vec<EmailAddress> {
    list.as_ref()
        .map(|v| {
            v.iter()
                // Group markers carry no host
                .filter(|a| a.host.is_some())
                .map(|a| {
                    let mailbox = lossy(&a.mailbox).unwrap_or_default();
                    let host = lossy(&a.host).unwrap_or_default();
                    EmailAddress::new(lossy(&a.name), format!("{}@{}", mailbox, host))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn envelope_of(fetch: &Fetch) -> Envelope {
    match fetch.envelope() {
        Some(env) => Envelope {
            subject: lossy(&env.subject),
            from: addresses(&env.from),
            to: addresses(&env.to),
            date: lossy(&env.date),
        },
        None => Envelope::default(),
    }
}

fn summary_of(fetch: &Fetch) -> Option<RawSummary> {
    let Some(uid) = fetch.uid else {
        warn!("FETCH response {} without UID, skipping", fetch.message);
        return None;
    };

    Some(RawSummary {
        uid,
        envelope: envelope_of(fetch),
        flags: flags_of(fetch),
        structure: fetch.bodystructure().map(BodyPart::from),
        preview: fetch
            .section(&SectionPath::Part(vec![1], None))
            .map(<[u8]>::to_vec),
    })
}

#[async_trait]
impl MailSession for ImapSession {
    async fn list_folders(&mut self) -> ImapResult<Vec<RawFolder>> {
        let names: Vec<_> = self
            .session
            .list(Some(""), Some("*"))
            .await?
            .try_collect()
            .await?;

        let folders: Vec<RawFolder> = names
            .iter()
            .map(|name| RawFolder {
                name: name.name().to_string(),
                delimiter: name.delimiter().map(str::to_string),
                attributes: name.attributes().iter().map(attribute_name).collect(),
            })
            .collect();

        debug!("Found {} folders", folders.len());
        Ok(folders)
    }

    async fn examine(&mut self, folder: &str) -> ImapResult<MailboxStatus> {
        let mailbox = self
            .session
            .examine(folder)
            .await
            .map_err(|e| open_error(folder, e))?;
        debug!("Examined {} with {} messages", folder, mailbox.exists);
        Ok(mailbox_status(&mailbox))
    }

    async fn select(&mut self, folder: &str) -> ImapResult<MailboxStatus> {
        let mailbox = self
            .session
            .select(folder)
            .await
            .map_err(|e| open_error(folder, e))?;
        debug!("Selected {} with {} messages", folder, mailbox.exists);
        Ok(mailbox_status(&mailbox))
    }

    async fn fetch_summaries(&mut self, set: &FetchSet) -> ImapResult<Vec<RawSummary>> {
        let query = summary_query();
        let fetches: Vec<Fetch> = match set {
            FetchSet::Sequence { .. } => {
                self.session
                    .fetch(set.to_imap(), &query)
                    .await?
                    .try_collect()
                    .await?
            }
            FetchSet::Uids(_) => {
                self.session
                    .uid_fetch(set.to_imap(), &query)
                    .await?
                    .try_collect()
                    .await?
            }
        };

        let summaries: Vec<RawSummary> = fetches.iter().filter_map(summary_of).collect();
        debug!("Fetched {} summaries for {}", summaries.len(), set.to_imap());
        Ok(summaries)
    }

    async fn uid_search(&mut self, criteria: &str) -> ImapResult<Vec<u32>> {
        let uids = self.session.uid_search(criteria).await?;
        Ok(uids.into_iter().collect())
    }

    async fn fetch_message(&mut self, uid: u32) -> ImapResult<Option<RawMessage>> {
        let fetches: Vec<Fetch> = self
            .session
            .uid_fetch(uid.to_string(), "(UID FLAGS BODY.PEEK[])")
            .await?
            .try_collect()
            .await?;

        // Servers may push unsolicited FETCHes for other messages
        let message = fetches
            .iter()
            .filter(|f| f.uid.map_or(true, |u| u == uid))
            .find_map(|f| {
                f.body().map(|body| RawMessage {
                    uid,
                    flags: flags_of(f),
                    body: body.to_vec(),
                })
            });
        Ok(message)
    }

    async fn add_flags(&mut self, uids: &[u32], flags: &[&str]) -> ImapResult<()> {
        let query = format!("+FLAGS ({})", flags.join(" "));
        let _: Vec<Fetch> = self
            .session
            .uid_store(uid_set(uids), &query)
            .await?
            .try_collect()
            .await?;
        debug!("Stored {} on {} messages", query, uids.len());
        Ok(())
    }

    async fn expunge(&mut self) -> ImapResult<()> {
        let expunged: Vec<_> = self.session.expunge().await?.try_collect().await?;
        debug!("Expunged {} messages", expunged.len());
        Ok(())
    }

    async fn noop(&mut self) -> ImapResult<()> {
        self.session.noop().await?;
        Ok(())
    }

    async fn logout(&mut self) -> ImapResult<()> {
        self.session.logout().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticator_returns_raw_string() {
        let mut auth = XOAuth2Authenticator(XOAuth2Token::new("user@outlook.com", "tok"));
        assert_eq!(
            auth.process(b""),
            "user=user@outlook.com\x01auth=Bearer tok\x01\x01"
        );
    }

    #[test]
    fn test_summary_query_peeks_preview() {
        assert_eq!(
            summary_query(),
            "(UID FLAGS ENVELOPE BODYSTRUCTURE BODY.PEEK[1]<0.500>)"
        );
    }

    #[test]
    fn test_attribute_names() {
        assert_eq!(attribute_name(&NameAttribute::NoSelect), "\\Noselect");
        assert_eq!(attribute_name(&NameAttribute::Junk), "\\Junk");
        assert_eq!(
            attribute_name(&NameAttribute::Extension("\\HasChildren".into())),
            "\\HasChildren"
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_connect_error() {
        let params = ConnectParams {
            target: mailbridge_auth::ServerTarget::new("127.0.0.1", 1, false),
            username: "me".to_string(),
            auth: ConnectAuth::Password("secret".to_string()),
        };
        let err = ImapConnector::new().connect(&params).await.unwrap_err();
        assert!(err.is_connect());
    }
}
