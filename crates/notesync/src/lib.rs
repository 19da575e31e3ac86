//! # notesync Architecture
//!
//! notesync is the data side of a note-taking client bound to a realtime JSON
//! store. It signs a user in, keeps their notes, tags and notebooks in sync,
//! and hands view models to a renderer. Nothing in here writes to a terminal
//! or assumes a browser: the CLI and any other front end sit on top.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  View (view/)                                               │
//! │  - Route -> view model -> Renderer                          │
//! │  - Tears down the previous screen before rendering the next │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Gateway (gateway/)                                         │
//! │  - Login/logout, user and note reads, note subscriptions    │
//! │  - Note, tag and notebook writes                            │
//! │  - Registry of every listener it attached                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Store (store/)                                             │
//! │  - RealtimeStore trait                                      │
//! │  - MemoryStore: shared or isolated tree, JSON snapshots     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! Single-threaded and callback-driven. Store completions and subscription
//! deliveries are tasks on an [`event_loop::EventLoop`]; they never run inside
//! the call that requested them. Nothing happens until the loop is pumped, so
//! tests step through asynchronous behaviour deterministically, virtual clock
//! included.
//!
//! ## Module Overview
//!
//! - [`gateway`]: The session/data gateway, entry point for all operations
//! - [`store`]: Realtime store abstraction and the in-memory implementation
//! - [`event_loop`]: Task queue and timers
//! - [`request`]: Timeouts, bounded retry, write joins
//! - [`registry`]: Subscription bookkeeping
//! - [`auth`]: Identity providers
//! - [`credentials`]: Persisted login state
//! - [`view`]: Routing, view models and rendering
//! - [`model`]: User records, notes, sessions
//! - [`path`]: Store paths and the data schema
//! - [`validation`]: Key, tag and notebook name rules
//! - [`config`]: Configuration management
//! - [`error`]: Error types

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod event_loop;
pub mod gateway;
pub mod model;
pub mod path;
pub mod persist;
pub mod registry;
pub mod request;
pub mod store;
pub mod validation;
pub mod view;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use error::{GatewayError, Result};
pub use gateway::{Gateway, NoteFeed};
