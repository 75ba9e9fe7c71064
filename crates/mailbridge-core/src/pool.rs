//! Session pool
//!
//! Keeps authenticated sessions per `username@host:port` so repeated
//! operations skip the connect and authenticate round trips. At most
//! `max_sessions_per_key` sessions exist per key; further callers queue and
//! are served in arrival order.
//!
//! Sessions are torn down by dropping them, which closes the socket.

use crate::{CoreError, CoreResult, PoolConfig};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

struct IdleSession<S> {
    session: S,
    created_at: Instant,
    last_used: Instant,
}

/// What a waiter receives
enum Handoff<S> {
    /// A released session, still counted as live
    Session(IdleSession<S>),
    /// Permission to open a new connection in a freed slot
    Slot,
}

struct Bucket<S> {
    /// Most recently used at the back
    idle: VecDeque<IdleSession<S>>,
    /// Sessions lent, idle, or being connected
    live: usize,
    waiters: VecDeque<oneshot::Sender<Handoff<S>>>,
}

impl<S> Default for Bucket<S> {
    fn default() -> Self {
        Self {
            idle: VecDeque::new(),
            live: 0,
            waiters: VecDeque::new(),
        }
    }
}

impl<S> Bucket<S> {
    fn is_empty(&self) -> bool {
        self.live == 0 && self.idle.is_empty() && self.waiters.is_empty()
    }

    /// Move invalid idle sessions out, freeing their slots
    fn evict_invalid(&mut self, now: Instant, config: &PoolConfig, evicted: &mut Vec<S>) {
        let mut kept = VecDeque::with_capacity(self.idle.len());
        for entry in self.idle.drain(..) {
            if is_valid(&entry, now, config) {
                kept.push_back(entry);
            } else {
                evicted.push(entry.session);
                self.live = self.live.saturating_sub(1);
            }
        }
        self.idle = kept;
    }

    /// Give a freed slot to the oldest waiter still listening
    fn pass_slot(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.send(Handoff::Slot).is_ok() {
                return;
            }
        }
        self.live = self.live.saturating_sub(1);
    }
}

fn is_valid<S>(entry: &IdleSession<S>, now: Instant, config: &PoolConfig) -> bool {
    now.duration_since(entry.created_at) <= config.max_age()
        && now.duration_since(entry.last_used) <= config.max_idle()
}

struct PoolState<S> {
    buckets: HashMap<String, Bucket<S>>,
    closed: bool,
}

struct Shared<S> {
    config: PoolConfig,
    state: Mutex<PoolState<S>>,
}

impl<S> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, PoolState<S>> {
        // Pool state stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return a session after successful use
    fn check_in(&self, key: &str, session: S, created_at: Instant) {
        let now = Instant::now();
        let mut state = self.lock();
        let closed = state.closed;
        let Some(bucket) = state.buckets.get_mut(key) else {
            return;
        };

        if closed {
            bucket.live = bucket.live.saturating_sub(1);
            drop(state);
            drop(session);
            debug!("Pool closed, tearing down returned session for {}", key);
            return;
        }

        if now.duration_since(created_at) > self.config.max_age() {
            bucket.pass_slot();
            drop(state);
            drop(session);
            debug!("Session for {} exceeded max age, tearing down", key);
            return;
        }

        let mut entry = IdleSession {
            session,
            created_at,
            last_used: now,
        };
        while let Some(waiter) = bucket.waiters.pop_front() {
            match waiter.send(Handoff::Session(entry)) {
                Ok(()) => {
                    debug!("Handed session for {} to waiter", key);
                    return;
                }
                Err(Handoff::Session(returned)) => entry = returned,
                Err(Handoff::Slot) => return,
            }
        }
        bucket.idle.push_back(entry);
    }

    /// Free the slot of a session that was torn down
    fn free_slot(&self, key: &str) {
        let mut state = self.lock();
        let closed = state.closed;
        if let Some(bucket) = state.buckets.get_mut(key) {
            if closed {
                bucket.live = bucket.live.saturating_sub(1);
            } else {
                bucket.pass_slot();
            }
        }
    }

    /// Put back a handoff its waiter never consumed
    fn reclaim(&self, key: &str, handoff: Handoff<S>) {
        match handoff {
            Handoff::Session(entry) => self.check_in(key, entry.session, entry.created_at),
            Handoff::Slot => self.free_slot(key),
        }
    }

    fn sweep(&self) -> bool {
        let now = Instant::now();
        let mut evicted = Vec::new();
        let closed = {
            let mut state = self.lock();
            for bucket in state.buckets.values_mut() {
                bucket.evict_invalid(now, &self.config, &mut evicted);
            }
            state.buckets.retain(|_, b| !b.is_empty());
            state.closed
        };
        if !evicted.is_empty() {
            info!("Swept {} expired sessions", evicted.len());
        }
        closed
    }
}

/// A lent session
///
/// Call [`release`](Self::release) after successful use or
/// [`discard`](Self::discard) after an error. Dropping the lease without
/// either tears the session down.
pub struct PooledSession<S> {
    shared: Arc<Shared<S>>,
    key: String,
    session: Option<S>,
    created_at: Instant,
    reused: bool,
}

impl<S: std::fmt::Debug> std::fmt::Debug for PooledSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("key", &self.key)
            .field("session", &self.session)
            .field("created_at", &self.created_at)
            .field("reused", &self.reused)
            .finish_non_exhaustive()
    }
}

impl<S> PooledSession<S> {
    fn new(shared: Arc<Shared<S>>, key: &str, session: S, created_at: Instant, reused: bool) -> Self {
        Self {
            shared,
            key: key.to_string(),
            session: Some(session),
            created_at,
            reused,
        }
    }

    /// Pool key this session belongs to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the session sat in the pool before this lease
    ///
    /// The server may have dropped a reused session in the meantime.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Return the session for reuse
    pub fn release(mut self) {
        if let Some(session) = self.session.take() {
            self.shared.check_in(&self.key, session, self.created_at);
        }
    }

    /// Tear the session down and free its slot
    pub fn discard(mut self) {
        if let Some(session) = self.session.take() {
            drop(session);
            self.shared.free_slot(&self.key);
            debug!("Discarded session for {}", self.key);
        }
    }
}

impl<S> Deref for PooledSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        // Only `release`/`discard` take the session, and both consume the lease
        self.session.as_ref().expect("session present until lease is consumed")
    }
}

impl<S> DerefMut for PooledSession<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().expect("session present until lease is consumed")
    }
}

impl<S> Drop for PooledSession<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            warn!("Session for {} dropped without release, tearing down", self.key);
            drop(session);
            self.shared.free_slot(&self.key);
        }
    }
}

/// A slot reserved for a connection in progress
struct SlotReservation<'a, S> {
    shared: &'a Shared<S>,
    key: &'a str,
    armed: bool,
}

impl<S> Drop for SlotReservation<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.free_slot(self.key);
        }
    }
}

/// A queued acquire
struct Waiting<'a, S> {
    shared: &'a Shared<S>,
    key: &'a str,
    rx: Option<oneshot::Receiver<Handoff<S>>>,
}

impl<S> Drop for Waiting<'_, S> {
    fn drop(&mut self) {
        // A handoff may have landed after the waiter gave up
        if let Some(mut rx) = self.rx.take() {
            rx.close();
            if let Ok(handoff) = rx.try_recv() {
                self.shared.reclaim(self.key, handoff);
            }
        }
    }
}

enum Plan<S> {
    Lend(IdleSession<S>),
    Connect,
    Wait(oneshot::Receiver<Handoff<S>>),
}

/// Totals across all keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub live: usize,
    pub idle: usize,
    pub waiting: usize,
}

/// Pool of authenticated sessions keyed by login
pub struct SessionPool<S> {
    shared: Arc<Shared<S>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Send + 'static> SessionPool<S> {
    /// Create a pool and start its sweep task on the current runtime
    pub fn new(config: PoolConfig) -> Self {
        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(PoolState {
                buckets: HashMap::new(),
                closed: false,
            }),
        });

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(sweep_loop(Arc::downgrade(&shared)))),
            Err(_) => {
                warn!("No async runtime, session pool sweep disabled");
                None
            }
        };

        Self {
            shared,
            sweeper: Mutex::new(sweeper),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Borrow a session for `key`, opening one with `connect` if allowed
    pub async fn acquire<F, Fut>(&self, key: &str, connect: F) -> CoreResult<PooledSession<S>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<S>>,
    {
        let now = Instant::now();
        let mut evicted = Vec::new();
        let plan = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(CoreError::PoolClosed);
            }
            let cap = self.shared.config.max_sessions_per_key.max(1);
            let bucket = state.buckets.entry(key.to_string()).or_default();
            bucket.evict_invalid(now, &self.shared.config, &mut evicted);

            if let Some(entry) = bucket.idle.pop_back() {
                Plan::Lend(entry)
            } else if bucket.live < cap {
                bucket.live += 1;
                Plan::Connect
            } else {
                let (tx, rx) = oneshot::channel();
                bucket.waiters.push_back(tx);
                Plan::Wait(rx)
            }
        };
        if !evicted.is_empty() {
            debug!("Evicted {} expired sessions for {}", evicted.len(), key);
            drop(evicted);
        }

        match plan {
            Plan::Lend(entry) => {
                debug!("Reusing pooled session for {}", key);
                Ok(PooledSession::new(
                    self.shared.clone(),
                    key,
                    entry.session,
                    entry.created_at,
                    true,
                ))
            }
            Plan::Connect => self.connect_in_slot(key, connect).await,
            Plan::Wait(rx) => {
                debug!("Session cap reached for {}, waiting", key);
                let mut waiting = Waiting {
                    shared: &self.shared,
                    key,
                    rx: Some(rx),
                };
                let Some(rx) = waiting.rx.as_mut() else {
                    return Err(CoreError::PoolClosed);
                };
                let handoff = match timeout(self.shared.config.acquire_timeout(), rx).await {
                    Ok(Ok(handoff)) => handoff,
                    // Sender dropped: the pool shut down
                    Ok(Err(_)) => return Err(CoreError::PoolClosed),
                    Err(_) => {
                        warn!("Timed out waiting for a session for {}", key);
                        return Err(CoreError::AcquireTimeout);
                    }
                };
                waiting.rx = None;

                match handoff {
                    Handoff::Session(entry) => Ok(PooledSession::new(
                        self.shared.clone(),
                        key,
                        entry.session,
                        entry.created_at,
                        true,
                    )),
                    Handoff::Slot => self.connect_in_slot(key, connect).await,
                }
            }
        }
    }

    /// Connect in a slot already counted as live
    async fn connect_in_slot<F, Fut>(&self, key: &str, connect: F) -> CoreResult<PooledSession<S>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<S>>,
    {
        let mut reservation = SlotReservation {
            shared: &self.shared,
            key,
            armed: true,
        };

        let session = match timeout(self.shared.config.connect_timeout(), connect()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Timed out connecting for {}", key);
                return Err(CoreError::ConnectTimeout);
            }
        };
        reservation.armed = false;

        info!("Opened pooled session for {}", key);
        Ok(PooledSession::new(
            self.shared.clone(),
            key,
            session,
            Instant::now(),
            false,
        ))
    }

    /// Close idle sessions, fail waiters and reject further acquires
    ///
    /// Sessions currently lent are torn down when returned, which mailbox
    /// operations bound by `operation_timeout`.
    pub fn shutdown(&self) {
        let mut closed_sessions = Vec::new();
        {
            let mut state = self.shared.lock();
            state.closed = true;
            for bucket in state.buckets.values_mut() {
                let idle = bucket.idle.len();
                closed_sessions.extend(bucket.idle.drain(..).map(|e| e.session));
                bucket.live = bucket.live.saturating_sub(idle);
                // Dropped senders wake waiters with PoolClosed
                bucket.waiters.clear();
            }
        }
        if let Some(handle) = self.sweeper_handle().take() {
            handle.abort();
        }
        info!("Session pool shut down, closed {} idle sessions", closed_sessions.len());
    }

    /// Snapshot of pool occupancy
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        state.buckets.values().fold(PoolStats::default(), |acc, b| PoolStats {
            live: acc.live + b.live,
            idle: acc.idle + b.idle.len(),
            waiting: acc.waiting + b.waiters.iter().filter(|w| !w.is_closed()).count(),
        })
    }

    /// Run one sweep immediately
    pub fn sweep(&self) {
        self.shared.sweep();
    }

    fn sweeper_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sweeper.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<S> Drop for SessionPool<S> {
    fn drop(&mut self) {
        let handle = self.sweeper.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

async fn sweep_loop<S>(shared: Weak<Shared<S>>) {
    let period = match shared.upgrade() {
        Some(shared) => shared.config.sweep_interval(),
        None => return,
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if shared.sweep() {
            break;
        }
    }
    debug!("Session pool sweep stopped");
}
