//! In-memory mail server for operation tests

use async_trait::async_trait;
use mailbridge_auth::{AccountConfig, ConnectParams, ServerTarget};
use mailbridge_imap::{
    BodyPart, Connector, EmailAddress, Envelope, FetchSet, ImapError, ImapResult, LeafPart,
    MailSession, MailboxStatus, MessageFlags, RawFolder, RawMessage, RawSummary,
};
use std::sync::{Arc, Mutex, MutexGuard};

pub(crate) struct FakeMessage {
    pub uid: u32,
    pub subject: String,
    pub flags: MessageFlags,
    pub attachment: bool,
}

impl FakeMessage {
    pub fn new(uid: u32, subject: &str) -> Self {
        Self {
            uid,
            subject: subject.to_string(),
            flags: MessageFlags::default(),
            attachment: false,
        }
    }

    fn raw(&self) -> Vec<u8> {
        format!(
            "From: Sender {uid} <sender{uid}@example.com>\r\n\
             To: me@example.com\r\n\
             Subject: {subject}\r\n\
             Date: Tue, 1 Jul 2025 10:52:37 +0200\r\n\
             \r\n\
             Body of message {uid}\r\n",
            uid = self.uid,
            subject = self.subject
        )
        .into_bytes()
    }

    fn summary(&self) -> RawSummary {
        let structure = if self.attachment {
            BodyPart::Leaf(LeafPart {
                content_type: "application/pdf".into(),
                disposition: Some("attachment".into()),
                ..Default::default()
            })
        } else {
            BodyPart::Leaf(LeafPart {
                content_type: "text/plain".into(),
                ..Default::default()
            })
        };

        RawSummary {
            uid: self.uid,
            envelope: Envelope {
                subject: Some(self.subject.clone()),
                from: vec![EmailAddress::new(
                    Some(format!("Sender {}", self.uid)),
                    format!("sender{}@example.com", self.uid),
                )],
                to: vec![EmailAddress::new(None, "me@example.com")],
                date: Some("Tue, 1 Jul 2025 10:52:37 +0200".into()),
            },
            flags: self.flags,
            structure: Some(structure),
            preview: Some(format!("Body of message {}", self.uid).into_bytes()),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeServer {
    pub folders: Vec<(String, Vec<FakeMessage>)>,
    /// Every command received, in order
    pub commands: Vec<String>,
    pub connects: usize,
    pub logouts: usize,
    pub refuse_connect: bool,
    pub fail_subject_search: bool,
    pub fail_fetch: bool,
    /// Fetches never answer
    pub hang_fetch: bool,
    /// Sessions with an id up to this one have been dropped by the server
    pub dropped_upto: usize,
}

impl FakeServer {
    /// A server with one folder holding UIDs `1..=count`
    pub fn with_folder(name: &str, count: u32) -> Self {
        let messages = (1..=count)
            .map(|uid| FakeMessage::new(uid, &format!("Message {}", uid)))
            .collect();
        Self {
            folders: vec![(name.to_string(), messages)],
            ..Default::default()
        }
    }

    pub fn messages(&self, folder: &str) -> &[FakeMessage] {
        self.folders
            .iter()
            .find(|(name, _)| name == folder)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or_default()
    }

    fn messages_mut(&mut self, folder: &str) -> Option<&mut Vec<FakeMessage>> {
        self.folders
            .iter_mut()
            .find(|(name, _)| name == folder)
            .map(|(_, messages)| messages)
    }

    /// Drop every session opened so far
    pub fn drop_sessions(&mut self) {
        self.dropped_upto = self.connects;
    }

    pub fn shared(self) -> SharedServer {
        SharedServer(Arc::new(Mutex::new(self)))
    }
}

#[derive(Clone)]
pub(crate) struct SharedServer(Arc<Mutex<FakeServer>>);

impl SharedServer {
    pub fn lock(&self) -> MutexGuard<'_, FakeServer> {
        self.0.lock().unwrap()
    }
}

pub(crate) struct FakeSession {
    id: usize,
    server: SharedServer,
    selected: Option<String>,
}

impl FakeSession {
    /// Lock the server, failing like a closed socket if it dropped us
    fn server(&self) -> ImapResult<MutexGuard<'_, FakeServer>> {
        let server = self.server.lock();
        if self.id <= server.dropped_upto {
            return Err(ImapError::IoError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection closed by server",
            )));
        }
        Ok(server)
    }

    fn selected(&self) -> ImapResult<String> {
        self.selected
            .clone()
            .ok_or_else(|| ImapError::ServerError("No mailbox selected".into()))
    }

    fn open(&mut self, command: &str, folder: &str) -> ImapResult<MailboxStatus> {
        let status = {
            let mut server = self.server()?;
            server.commands.push(format!("{} {}", command, folder));
            let Some(messages) = server.messages_mut(folder) else {
                return Err(ImapError::FolderNotFound(folder.to_string()));
            };
            MailboxStatus {
                exists: messages.len() as u32,
                uid_validity: Some(1),
                uid_next: messages.last().map(|m| m.uid + 1),
            }
        };
        self.selected = Some(folder.to_string());
        Ok(status)
    }
}

fn quoted(criteria: &str) -> String {
    let start = criteria.find('"').map(|i| i + 1).unwrap_or(0);
    let end = criteria.rfind('"').unwrap_or(criteria.len());
    criteria[start..end.max(start)].to_lowercase()
}

#[async_trait]
impl MailSession for FakeSession {
    async fn list_folders(&mut self) -> ImapResult<Vec<RawFolder>> {
        let mut server = self.server()?;
        server.commands.push("LIST".into());
        Ok(server
            .folders
            .iter()
            .map(|(name, _)| RawFolder {
                name: name.clone(),
                delimiter: Some("/".into()),
                attributes: Vec::new(),
            })
            .collect())
    }

    async fn examine(&mut self, folder: &str) -> ImapResult<MailboxStatus> {
        self.open("EXAMINE", folder)
    }

    async fn select(&mut self, folder: &str) -> ImapResult<MailboxStatus> {
        self.open("SELECT", folder)
    }

    async fn fetch_summaries(&mut self, set: &FetchSet) -> ImapResult<Vec<RawSummary>> {
        let folder = self.selected()?;
        let hang = self.server()?.hang_fetch;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut server = self.server()?;
        server.commands.push(format!("FETCH {}", set.to_imap()));
        if server.fail_fetch {
            return Err(ImapError::IoError(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )));
        }

        let messages = server.messages(&folder);
        let summaries = match set {
            FetchSet::Sequence { start, end } => messages
                .iter()
                .enumerate()
                .filter(|(idx, _)| (*start..=*end).contains(&(*idx as u32 + 1)))
                .map(|(_, m)| m.summary())
                .collect(),
            FetchSet::Uids(uids) => messages
                .iter()
                .filter(|m| uids.contains(&m.uid))
                .map(FakeMessage::summary)
                .collect(),
        };
        Ok(summaries)
    }

    async fn uid_search(&mut self, criteria: &str) -> ImapResult<Vec<u32>> {
        let folder = self.selected()?;
        let mut server = self.server()?;
        server.commands.push(format!("SEARCH {}", criteria));
        if criteria.starts_with("SUBJECT") && server.fail_subject_search {
            return Err(ImapError::ServerError("BAD search not supported".into()));
        }

        let needle = quoted(criteria);
        // Ascending, like a real server
        Ok(server
            .messages(&folder)
            .iter()
            .filter(|m| m.subject.to_lowercase().contains(&needle))
            .map(|m| m.uid)
            .collect())
    }

    async fn fetch_message(&mut self, uid: u32) -> ImapResult<Option<RawMessage>> {
        let folder = self.selected()?;
        let mut server = self.server()?;
        server.commands.push(format!("UID FETCH {} BODY[]", uid));
        Ok(server
            .messages(&folder)
            .iter()
            .find(|m| m.uid == uid)
            .map(|m| RawMessage {
                uid,
                flags: m.flags,
                body: m.raw(),
            }))
    }

    async fn add_flags(&mut self, uids: &[u32], flags: &[&str]) -> ImapResult<()> {
        let folder = self.selected()?;
        let mut server = self.server()?;
        server.commands.push(format!(
            "UID STORE {} +FLAGS ({})",
            mailbridge_imap::uid_set(uids),
            flags.join(" ")
        ));
        let added = MessageFlags::from_imap_flags(flags);
        if let Some(messages) = server.messages_mut(&folder) {
            for message in messages.iter_mut().filter(|m| uids.contains(&m.uid)) {
                message.flags.seen |= added.seen;
                message.flags.deleted |= added.deleted;
            }
        }
        Ok(())
    }

    async fn expunge(&mut self) -> ImapResult<()> {
        let folder = self.selected()?;
        let mut server = self.server()?;
        server.commands.push("EXPUNGE".into());
        if let Some(messages) = server.messages_mut(&folder) {
            messages.retain(|m| !m.flags.deleted);
        }
        Ok(())
    }

    async fn noop(&mut self) -> ImapResult<()> {
        self.server()?.commands.push("NOOP".into());
        Ok(())
    }

    async fn logout(&mut self) -> ImapResult<()> {
        let mut server = self.server()?;
        server.commands.push("LOGOUT".into());
        server.logouts += 1;
        Ok(())
    }
}

pub(crate) struct FakeConnector {
    pub server: SharedServer,
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, _params: &ConnectParams) -> ImapResult<FakeSession> {
        let mut server = self.server.lock();
        server.connects += 1;
        if server.refuse_connect {
            return Err(ImapError::ConnectionFailed("connection refused".into()));
        }
        Ok(FakeSession {
            id: server.connects,
            server: self.server.clone(),
            selected: None,
        })
    }
}

/// Password account pointed at the fake server
pub(crate) fn account() -> AccountConfig {
    AccountConfig::with_password(
        "me@example.com",
        ServerTarget::new("imap.example.com", 993, true),
        "hunter2",
    )
}
