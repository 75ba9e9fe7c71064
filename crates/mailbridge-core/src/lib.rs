//! Core logic for mailbridge
//!
//! Pools authenticated sessions per account and runs mailbox operations over
//! them:
//! 1. `pool` lends at most N sessions per `username@host:port`
//! 2. `mailbox` runs one operation per call on a lent session
//! 3. `dispatch` maps a tagged request onto one operation

mod config;
mod dispatch;
mod error;
mod mailbox;
mod pool;
#[cfg(test)]
mod testing;

pub use config::PoolConfig;
pub use dispatch::{dispatch, Request, Response};
pub use error::{CoreError, CoreResult};
pub use mailbox::{Mailbox, MessagePage};
pub use pool::{PoolStats, PooledSession, SessionPool};
