use thiserror::Error;

use crate::rpc::RpcError;

/// Top-level error type for the `shelly-api` crate.
///
/// Covers every transport-level failure mode across both dialects.
/// `shelly-core` maps these into its per-device error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL construction failed (bad host string).
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-200 HTTP response without a structured error body.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Structured JSON-RPC error from a Gen2+ device.
    ///
    /// Distinct from [`Error::Http`]: the device answered HTTP 200 but
    /// rejected the call. `code` and `message` are surfaced verbatim.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(#[from] RpcError),

    /// Response body was not the JSON we expected; raw body kept for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The call was cancelled before completion.
    ///
    /// Not a failure for fleet accounting -- callers report it separately
    /// from timeouts and connection errors.
    #[error("Request cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if the call never reached the device
    /// (connect failure, DNS error).
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connect())
    }

    /// Returns `true` if the call was in flight past its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Returns `true` if this is a transient error worth one retry:
    /// connection refused or timeout. 4xx responses and RPC errors are not.
    pub fn is_transient(&self) -> bool {
        self.is_connect() || self.is_timeout()
    }
}
