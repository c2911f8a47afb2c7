//! # Warren
//!
//! A message-driven host for document databases running in an isolated
//! worker context.
//!
//! A controller drives one or more database instances exclusively through
//! asynchronous structured messages, with no shared memory and no direct
//! calls.
//! Warren supplies both halves of that conversation: the worker-side
//! [`host::DatabaseHost`] that routes envelopes to database operations,
//! and the controller-side [`client::Connection`] that gives callers
//! synchronous-looking async methods over the one-way channel.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Controller (Connection)                  │
//! │   request-id correlation, pending map, live streams      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [envelopes / outbound messages]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Protocol (Envelope, codec)               │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [typed requests]
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Host (DatabaseHost)                     │
//! │   registries, dispatch, live subscriptions, relays       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [named async operations]
//! ┌─────────────────────────────────────────────────────────┐
//! │            Database implementations (opener)             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The transport between controller and host is out of scope: anything
//! that posts JSON payloads in order per client channel works, and the
//! crate's API boundary models it as tokio mpsc channels.

pub mod backend;
pub mod client;
pub mod config;
pub mod host;
pub mod protocol;

pub use backend::{CancelHandle, ChangesFeed, ChangesOptions, Database, DatabaseOpener, FeedEvent};
pub use client::{ClientError, ClientResult, Connection, LiveChanges};
pub use config::Settings;
pub use host::DatabaseHost;
pub use protocol::{DbError, DbResult, Envelope, OutboundMessage};
