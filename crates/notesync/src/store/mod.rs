//! # Realtime Store
//!
//! The gateway talks to its backing store only through [`RealtimeStore`]: a
//! JSON tree addressed by [`StorePath`], with one-shot reads, persistent
//! subscriptions, writes and token authentication.
//!
//! ## Delivery Model
//!
//! Every completion and every subscription delivery is asynchronous: the
//! implementation schedules it on an [`EventLoop`](crate::event_loop::EventLoop)
//! and it runs when the loop is pumped. Implementations must:
//!
//! - invoke each completion callback at most once
//! - deliver a `Value` subscription's current value once on registration, then
//!   once per change at or below its path
//! - deliver a `ChildAdded` subscription once per existing child in key order,
//!   then once per newly added child
//! - never invoke a handler after [`RealtimeStore::off`] returned for it, even
//!   if the delivery was already queued
//!
//! Writes follow last-write-wins. There are no transactions.
//!
//! ## Implementations
//!
//! - [`memory::MemoryStore`]: in-process tree with shared or isolated
//!   contexts, token table, outage simulation and JSON snapshots.

use crate::error::Result;
use crate::path::StorePath;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod memory;
pub mod push_id;
pub mod tree;

/// Completion for a request that yields a value.
pub type Callback<T> = Box<dyn FnOnce(Result<T>)>;

/// Completion for a write.
pub type Completion = Callback<()>;

/// Persistent subscription handler.
pub type Handler = Box<dyn FnMut(DataSnapshot)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The whole value at the path, on registration and on every change.
    Value,
    /// Each direct child, existing ones first, then each new one.
    ChildAdded,
}

/// Store-assigned identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub(crate) u64);

/// Who the store believes is on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub user_id: String,
    pub display_name: String,
}

/// The value at a path at one moment. `value` is `None` when nothing exists.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
    pub path: StorePath,
    pub value: Option<Value>,
}

impl DataSnapshot {
    pub fn new(path: StorePath, value: Option<Value>) -> Self {
        Self { path, value }
    }

    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Deserialize the value, `Ok(None)` when absent.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match &self.value {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

/// Client handle to a realtime JSON-tree store.
///
/// All methods take `&self`: handles are shared between the gateway and its
/// callers and use interior mutability, matching the single-threaded,
/// callback-driven model.
pub trait RealtimeStore {
    /// One-shot read of the value at `path`.
    fn once(&self, path: &StorePath, on_complete: Callback<DataSnapshot>);

    /// Register a persistent subscription.
    fn on(&self, path: &StorePath, kind: EventKind, handler: Handler) -> ListenerHandle;

    /// Detach a subscription. Returns false if the handle was unknown.
    fn off(&self, handle: ListenerHandle) -> bool;

    /// Replace the value at `path`. `Value::Null` removes it.
    fn set(&self, path: &StorePath, value: Value, on_complete: Completion);

    /// Merge `fields` into the object at `path`.
    fn update(&self, path: &StorePath, fields: Map<String, Value>, on_complete: Completion);

    fn remove(&self, path: &StorePath, on_complete: Completion) {
        self.set(path, Value::Null, on_complete);
    }

    /// Write `value` under a new chronologically ordered child key of `path`.
    /// The key is returned immediately; the completion reports the write.
    fn push(&self, path: &StorePath, value: Value, on_complete: Completion) -> String;

    /// Authenticate this handle with a token.
    fn authenticate(&self, token: &str, on_complete: Callback<AuthInfo>);

    /// Drop this handle's authentication. Synchronous.
    fn unauthenticate(&self);

    fn auth(&self) -> Option<AuthInfo>;
}

/// Completion that ignores the outcome apart from logging failures.
pub fn detached(what: &'static str) -> Completion {
    Box::new(move |result| {
        if let Err(err) = result {
            tracing::warn!(operation = what, error = %err, "Detached store write failed");
        }
    })
}
