//! Async HTTP transport for Shelly smart devices.
//!
//! Shelly hardware spans two wire dialects:
//!
//! - **Gen1** ([`Gen1Client`]) — plain REST over `http://{ip}/...`. Reads are
//!   GETs against endpoints like `/settings` and `/status`; writes are *also*
//!   GETs, carrying the new values as URL-encoded query parameters (vendor
//!   convention). Booleans travel as the literal strings `true` / `false`.
//!
//! - **Gen2 and later** ([`RpcClient`]) — JSON-RPC over `POST http://{ip}/rpc`
//!   with a `{id, method, params}` envelope. A JSON-RPC error object is a
//!   distinct failure mode from an HTTP-level error and is surfaced as its own
//!   [`Error`] variant so callers can tell the two apart.
//!
//! Both clients share a [`TransportConfig`] for reqwest construction (per-host
//! connection pooling, timeouts) and a single retry policy: one automatic
//! retry after a short backoff on connection failure or timeout, never on 4xx
//! responses or RPC-level errors. Every call takes a `CancellationToken`;
//! cancellation aborts in-flight I/O and reports [`Error::Cancelled`].
//!
//! Higher layers (`shelly-core`) own all semantics: which endpoint or method
//! carries a given logical parameter, payload navigation, and type coercion.

pub mod error;
pub mod gen1;
pub mod rpc;
pub mod transport;

pub use error::Error;
pub use gen1::Gen1Client;
pub use rpc::{RpcClient, RpcError};
pub use transport::{RetryPolicy, TransportConfig};
