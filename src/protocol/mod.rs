//! Wire protocol: envelopes, typed requests, and the error codec.
//!
//! The protocol gives synchronous-looking call semantics over a one-way
//! asynchronous channel. Each inbound [`Envelope`] names an operation, a
//! client, and a request id; each request id receives exactly one terminal
//! [`OutboundMessage`] (`success` or `error`), optionally preceded by
//! `update` events for live subscriptions. `uncaughtError` broadcasts carry
//! no request id at all.

mod envelope;
mod errors;
mod request;

pub use envelope::{methods, ClientId, Envelope, OutboundMessage, RequestId};
pub use errors::{DbError, DbResult};
pub use request::Request;
