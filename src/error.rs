//! Dispatch error types with stable numeric codes.
//!
//! [`DispatchError`] is the central error type for the library. Only
//! construction-time, bind-time and decode-time conditions are errors;
//! dispatch-time anomalies (a completion nobody listens to, a failed
//! result fetch) are absorbed by the dispatcher and never surface here.

/// Library error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category              |
/// |-----------|-----------------------|
/// | 1000–1999 | Subscriber setup      |
/// | 2000–2999 | Payload decoding      |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The payload shape carries no kind tag.
    #[error("payload shape `{0}` has no registered kind tag")]
    UnknownShapeKind(&'static str),

    /// A call result was bound without ever being given a callback.
    #[error("call result for `{0}` has no callback; supply one at construction or bind time")]
    NoCallbackConfigured(&'static str),

    /// The raw buffer is smaller than the shape it is decoded into.
    #[error("payload `{shape}` needs {expected} bytes, transport handed {actual}")]
    PayloadSizeMismatch {
        /// Name of the shape being decoded.
        shape: &'static str,
        /// Byte size declared by the shape.
        expected: usize,
        /// Byte size of the buffer actually received.
        actual: usize,
    },
}

impl DispatchError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::UnknownShapeKind(_) => 1001,
            Self::NoCallbackConfigured(_) => 1002,
            Self::PayloadSizeMismatch { .. } => 2001,
        }
    }

    /// Returns `true` for errors raised while decoding a delivered payload.
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::PayloadSizeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_ranges() {
        assert_eq!(DispatchError::UnknownShapeKind("A").error_code(), 1001);
        assert_eq!(DispatchError::NoCallbackConfigured("A").error_code(), 1002);
        let mismatch = DispatchError::PayloadSizeMismatch {
            shape: "A",
            expected: 4,
            actual: 2,
        };
        assert_eq!(mismatch.error_code(), 2001);
        assert!(mismatch.is_decode_error());
        assert!(!DispatchError::UnknownShapeKind("A").is_decode_error());
    }

    #[test]
    fn mismatch_message_names_sizes() {
        let err = DispatchError::PayloadSizeMismatch {
            shape: "LobbyEnter",
            expected: 24,
            actual: 8,
        };
        let msg = err.to_string();
        assert!(msg.contains("LobbyEnter"));
        assert!(msg.contains("24"));
        assert!(msg.contains('8'));
    }
}
