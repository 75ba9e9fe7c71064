//! Mailbox operations
//!
//! Every operation resolves credentials, borrows one pooled session, runs its
//! protocol exchanges, and returns the session on success or discards it on
//! any error.

use crate::pool::{PooledSession, SessionPool};
use crate::{CoreError, CoreResult, PoolConfig};
use mailbridge_auth::{AccountConfig, ConnectParams, CredentialResolver};
use mailbridge_imap::{
    flatten_folders, parse_message, search_criteria, Connector, FetchSet, FolderDescriptor,
    MailSession, MessageDetail, MessageSummary,
};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// One page of message summaries, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<MessageSummary>,
    /// Messages in the folder, or matches for a search
    pub total: u32,
    pub has_more: bool,
}

impl MessagePage {
    fn empty(total: u32, limit: u32, offset: u32) -> Self {
        Self {
            messages: Vec::new(),
            total,
            has_more: u64::from(offset) + u64::from(limit) < u64::from(total),
        }
    }
}

/// Mailbox access for many accounts over one session pool
pub struct Mailbox<C: Connector> {
    connector: Arc<C>,
    resolver: CredentialResolver,
    pool: SessionPool<C::Session>,
}

impl<C: Connector> Mailbox<C> {
    /// Create the service; the pool's sweep task starts on the current runtime
    pub fn new(connector: C, resolver: CredentialResolver, config: PoolConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            resolver,
            pool: SessionPool::new(config),
        }
    }

    pub fn pool(&self) -> &SessionPool<C::Session> {
        &self.pool
    }

    /// Shut the pool down; later operations fail with `PoolClosed`
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Borrow a live session, replacing pooled ones the server has dropped
    async fn lease(&self, account: &AccountConfig) -> CoreResult<PooledSession<C::Session>> {
        let params = self.resolver.resolve(account).await?;
        let key = params.session_key();

        loop {
            let connector = self.connector.clone();
            let connect_params = params.clone();
            let mut lease = self
                .pool
                .acquire(&key, move || connect(connector, connect_params))
                .await?;
            if !lease.is_reused() {
                return Ok(lease);
            }

            let alive = self
                .bounded(async { lease.noop().await.map_err(CoreError::from) })
                .await;
            match alive {
                Ok(()) => return Ok(lease),
                Err(e) => {
                    warn!("Pooled session for {} is gone ({}), replacing it", key, e);
                    lease.discard();
                }
            }
        }
    }

    /// Run protocol exchanges under the operation timeout
    async fn bounded<T>(&self, exchange: impl Future<Output = CoreResult<T>>) -> CoreResult<T> {
        match timeout(self.pool.config().operation_timeout(), exchange).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::OperationTimeout),
        }
    }

    /// Open a dedicated session, log out, and report success
    pub async fn test_connection(&self, account: &AccountConfig) -> CoreResult<bool> {
        let params = self.resolver.resolve(account).await?;
        let mut session = match timeout(
            self.pool.config().connect_timeout(),
            self.connector.connect(&params),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(CoreError::ConnectTimeout),
        };

        let logout = self
            .bounded(async { session.logout().await.map_err(CoreError::from) })
            .await;
        if let Err(e) = logout {
            warn!("Logout after connection test failed: {}", e);
        }
        info!("Connection test succeeded for {}", params.session_key());
        Ok(true)
    }

    /// List all folders, parents before children
    pub async fn list_folders(&self, account: &AccountConfig) -> CoreResult<Vec<FolderDescriptor>> {
        let mut lease = self.lease(account).await?;
        let result = self.bounded(list_folders_on(&mut *lease)).await;
        finish(lease, result, "list folders")
    }

    /// Page through a folder from the newest message backwards
    pub async fn list_messages(
        &self,
        account: &AccountConfig,
        folder: &str,
        limit: u32,
        offset: u32,
    ) -> CoreResult<MessagePage> {
        let mut lease = self.lease(account).await?;
        let result = self
            .bounded(list_messages_on(&mut *lease, folder, limit, offset))
            .await;
        finish(lease, result, "list messages")
    }

    /// Search subjects, falling back to full text if the server rejects it
    pub async fn search_messages(
        &self,
        account: &AccountConfig,
        folder: &str,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> CoreResult<MessagePage> {
        let mut lease = self.lease(account).await?;
        let result = self
            .bounded(search_messages_on(&mut *lease, folder, query, limit, offset))
            .await;
        finish(lease, result, "search messages")
    }

    /// Fetch and parse one message; `None` if the UID no longer exists
    pub async fn get_message(
        &self,
        account: &AccountConfig,
        folder: &str,
        uid: u32,
    ) -> CoreResult<Option<MessageDetail>> {
        let mut lease = self.lease(account).await?;
        let result = self.bounded(get_message_on(&mut *lease, folder, uid)).await;
        finish(lease, result, "get message")
    }

    pub async fn mark_read(&self, account: &AccountConfig, folder: &str, uid: u32) -> CoreResult<bool> {
        let mut lease = self.lease(account).await?;
        let result = self
            .bounded(async {
                lease.select(folder).await?;
                lease.add_flags(&[uid], &["\\Seen"]).await?;
                Ok::<_, CoreError>(true)
            })
            .await;
        finish(lease, result, "mark read")
    }

    /// Flag all UIDs deleted in one STORE, then expunge
    pub async fn delete_messages(
        &self,
        account: &AccountConfig,
        folder: &str,
        uids: &[u32],
    ) -> CoreResult<bool> {
        if uids.is_empty() {
            debug!("Nothing to delete in {}", folder);
            return Ok(true);
        }

        let mut lease = self.lease(account).await?;
        let result = self
            .bounded(async {
                lease.select(folder).await?;
                lease.add_flags(uids, &["\\Deleted"]).await?;
                lease.expunge().await?;
                info!("Deleted {} messages from {}", uids.len(), folder);
                Ok::<_, CoreError>(true)
            })
            .await;
        finish(lease, result, "delete messages")
    }
}

async fn connect<C: Connector>(connector: Arc<C>, params: ConnectParams) -> CoreResult<C::Session> {
    connector.connect(&params).await.map_err(CoreError::from)
}

fn finish<S, T>(lease: PooledSession<S>, result: CoreResult<T>, operation: &str) -> CoreResult<T> {
    match &result {
        Ok(_) => lease.release(),
        Err(e) => {
            error!("Failed to {} for {}: {}", operation, lease.key(), e);
            lease.discard();
        }
    }
    result
}

async fn list_folders_on<S: MailSession + ?Sized>(session: &mut S) -> CoreResult<Vec<FolderDescriptor>> {
    let raw = session.list_folders().await?;
    let folders = flatten_folders(&raw);
    debug!("Listed {} folders", folders.len());
    Ok(folders)
}

fn newest_first(summaries: &mut [MessageSummary]) {
    summaries.sort_by(|a, b| b.uid.cmp(&a.uid));
}

async fn list_messages_on<S: MailSession + ?Sized>(
    session: &mut S,
    folder: &str,
    limit: u32,
    offset: u32,
) -> CoreResult<MessagePage> {
    let total = session.examine(folder).await?.exists;
    if total == 0 || limit == 0 || offset >= total {
        return Ok(MessagePage::empty(total, limit, offset));
    }

    // Sequence numbers count up from the oldest message
    let end = total - offset;
    let start = end.saturating_sub(limit - 1).max(1);
    let raw = session
        .fetch_summaries(&FetchSet::Sequence { start, end })
        .await?;

    let mut messages: Vec<MessageSummary> = raw.iter().map(MessageSummary::from_raw).collect();
    newest_first(&mut messages);
    debug!("Listed {} of {} messages in {}", messages.len(), total, folder);

    Ok(MessagePage {
        messages,
        total,
        has_more: start > 1,
    })
}

async fn search_messages_on<S: MailSession + ?Sized>(
    session: &mut S,
    folder: &str,
    query: &str,
    limit: u32,
    offset: u32,
) -> CoreResult<MessagePage> {
    session.examine(folder).await?;

    let mut uids = match session.uid_search(&search_criteria("SUBJECT", query)).await {
        Ok(uids) => uids,
        Err(e) => {
            warn!("Subject search failed ({}), retrying as full-text search", e);
            session.uid_search(&search_criteria("TEXT", query)).await?
        }
    };
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.dedup();

    let total = u32::try_from(uids.len()).unwrap_or(u32::MAX);
    let from = (offset as usize).min(uids.len());
    let to = from.saturating_add(limit as usize).min(uids.len());
    let page = &uids[from..to];
    if page.is_empty() {
        return Ok(MessagePage::empty(total, limit, offset));
    }

    let raw = session.fetch_summaries(&FetchSet::Uids(page.to_vec())).await?;
    let mut messages: Vec<MessageSummary> = raw.iter().map(MessageSummary::from_raw).collect();
    newest_first(&mut messages);
    debug!("Search in {} matched {}, returning {}", folder, total, messages.len());

    Ok(MessagePage {
        messages,
        total,
        has_more: u64::from(offset) + u64::from(limit) < u64::from(total),
    })
}

async fn get_message_on<S: MailSession + ?Sized>(
    session: &mut S,
    folder: &str,
    uid: u32,
) -> CoreResult<Option<MessageDetail>> {
    session.examine(folder).await?;
    let Some(raw) = session.fetch_message(uid).await? else {
        debug!("Message {} not found in {}", uid, folder);
        return Ok(None);
    };
    Ok(Some(parse_message(raw.uid, &raw.body, raw.flags)))
}
