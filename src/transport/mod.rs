//! Native transport seam.
//!
//! The dispatcher never talks to a native library directly. It polls a
//! [`NativeTransport`] for ready events and asks it to fetch the result
//! buffer of a completed asynchronous call. [`loopback::LoopbackTransport`]
//! is an in-memory implementation for tests and the demo host.

pub mod loopback;

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::domain::{KindTag, OperationHandle};

pub use loopback::LoopbackTransport;

/// Which native event source a dispatcher drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportRole {
    /// The regular client event source.
    #[default]
    Client,
    /// The dedicated game-server event source.
    GameServer,
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::GameServer => f.write_str("game_server"),
        }
    }
}

/// One ready event as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Kind tag of the payload.
    pub kind: KindTag,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl RawEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(kind: KindTag, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Result buffer of a completed asynchronous call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResult {
    /// Raw result payload.
    pub payload: Bytes,
    /// Set when the call completed with an I/O failure.
    pub io_failure: bool,
}

/// Why the transport could not produce a call result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallFailure {
    /// No failure recorded.
    #[default]
    None,
    /// The native service went away while the call was in flight.
    TransportGone,
    /// The call failed on the network.
    NetworkFailure,
    /// The handle is unknown or its result was already consumed.
    InvalidHandle,
    /// The result was requested with a kind it does not have.
    MismatchedKind,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::None => "none",
            Self::TransportGone => "transport gone",
            Self::NetworkFailure => "network failure",
            Self::InvalidHandle => "invalid handle",
            Self::MismatchedKind => "mismatched kind",
        };
        f.write_str(text)
    }
}

/// Transport-side failures. The dispatcher absorbs these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No result is available for the handle.
    #[error("no result available for call {0}")]
    ResultUnavailable(OperationHandle),

    /// The stored result has a different kind than requested.
    #[error("call {handle} holds kind {actual}, requested {expected}")]
    KindMismatch {
        /// Handle of the call.
        handle: OperationHandle,
        /// Kind the caller asked for.
        expected: KindTag,
        /// Kind of the stored result.
        actual: KindTag,
    },

    /// Any other failure reported by the native side.
    #[error("native transport error: {0}")]
    Native(String),
}

/// Non-blocking event source plus result store of a native library.
pub trait NativeTransport {
    /// Returns the next ready event, or `None` without waiting.
    fn poll_event(&mut self) -> Option<RawEvent>;

    /// Fetches the result buffer of a completed asynchronous call.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the result cannot be produced.
    fn fetch_async_result(
        &mut self,
        handle: OperationHandle,
        expected_size: usize,
        expected_kind: KindTag,
    ) -> Result<FetchedResult, TransportError>;

    /// Diagnostic reason for the last failed fetch of `handle`.
    fn call_failure_reason(&self, _handle: OperationHandle) -> CallFailure {
        CallFailure::None
    }
}
