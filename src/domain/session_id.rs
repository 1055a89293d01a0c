//! Dispatch session identifier.
//!
//! Each dispatcher gets a random [`SessionId`] at construction so that log
//! lines and stats from a client transport and a game-server transport
//! can be told apart.

use std::fmt;

use serde::Serialize;

/// Random (UUID v4) identifier of one dispatcher session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Draws a fresh session identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}
