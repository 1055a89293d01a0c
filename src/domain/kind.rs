//! Payload shapes and their kind tags.
//!
//! Every payload type implements [`Payload`], which attaches a [`Shape`]
//! descriptor (name, kind tag, fixed byte size) and a decoder. The kind
//! tag is resolved from the shape alone, so subscribers can be built
//! before any transport exists.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Integer tag identifying the structural shape of an event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindTag(i32);

impl KindTag {
    /// Creates a tag from its raw value.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw tag value.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for KindTag {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// Static description of a payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    /// Human-readable shape name, used in errors and logs.
    pub name: &'static str,
    /// Kind tag, or `None` for shapes that were never assigned one.
    pub kind: Option<KindTag>,
    /// Number of bytes the shape occupies on the wire.
    pub size: usize,
}

impl Shape {
    /// Describes a shape with a kind tag.
    #[must_use]
    pub const fn tagged(name: &'static str, kind: i32, size: usize) -> Self {
        Self {
            name,
            kind: Some(KindTag::new(kind)),
            size,
        }
    }

    /// Describes a shape without a kind tag. Such shapes can be decoded
    /// but never subscribed to.
    #[must_use]
    pub const fn untagged(name: &'static str, size: usize) -> Self {
        Self {
            name,
            kind: None,
            size,
        }
    }
}

/// A fixed-size payload shape that can be reconstructed from raw bytes.
pub trait Payload: Sized + 'static {
    /// Layout descriptor for this payload.
    const SHAPE: Shape;

    /// Decodes the payload from exactly `SHAPE.size` bytes.
    ///
    /// Callers go through [`decode_payload`], which guarantees the slice
    /// length, so implementations may read with the `bytes::Buf` getters.
    fn decode(raw: &[u8]) -> Self;
}

/// Resolves the kind tag of a shape.
///
/// # Errors
///
/// Returns [`DispatchError::UnknownShapeKind`] if the shape has no tag.
pub const fn kind_tag_of(shape: &Shape) -> Result<KindTag, DispatchError> {
    match shape.kind {
        Some(kind) => Ok(kind),
        None => Err(DispatchError::UnknownShapeKind(shape.name)),
    }
}

/// Decodes `P` from the prefix of `raw`.
///
/// Buffers larger than the shape are accepted; only the first
/// `P::SHAPE.size` bytes are consumed.
///
/// # Errors
///
/// Returns [`DispatchError::PayloadSizeMismatch`] if `raw` is shorter
/// than the shape.
pub fn decode_payload<P: Payload>(raw: &[u8]) -> Result<P, DispatchError> {
    let expected = P::SHAPE.size;
    let Some(prefix) = raw.get(..expected) else {
        return Err(DispatchError::PayloadSizeMismatch {
            shape: P::SHAPE.name,
            expected,
            actual: raw.len(),
        });
    };
    Ok(P::decode(prefix))
}
