//! Opaque identifier for one in-flight asynchronous operation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle correlating an asynchronous native call with its result.
///
/// [`OperationHandle::INVALID`] means "not bound to any operation".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(u64);

impl OperationHandle {
    /// Sentinel for "no operation".
    pub const INVALID: Self = Self(0);

    /// Wraps a raw handle value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `true` unless this is [`OperationHandle::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl Default for OperationHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for OperationHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
