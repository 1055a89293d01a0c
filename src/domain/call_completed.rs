//! The distinguished "asynchronous call completed" record.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::kind::{KindTag, Payload, Shape};
use super::OperationHandle;

/// Kind tag of [`CallCompleted`] events.
pub const CALL_COMPLETED_KIND: KindTag = KindTag::new(703);

/// Posted by the transport when the result of an asynchronous call is
/// ready to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallCompleted {
    /// Handle of the call that finished.
    pub handle: OperationHandle,
}

impl CallCompleted {
    /// Encodes the record the way a transport posts it.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::SHAPE.size);
        buf.put_u64_le(self.handle.get());
        buf.freeze()
    }
}

impl Payload for CallCompleted {
    const SHAPE: Shape = Shape::tagged("CallCompleted", CALL_COMPLETED_KIND.get(), 8);

    fn decode(mut raw: &[u8]) -> Self {
        Self {
            handle: OperationHandle::new(raw.get_u64_le()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::kind::decode_payload;

    #[test]
    fn encodes_little_endian_handle() {
        let record = CallCompleted {
            handle: OperationHandle::new(0x2a),
        };
        assert_eq!(record.to_bytes().as_ref(), &[0x2a, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let record = CallCompleted {
            handle: OperationHandle::new(0x0102_0304_0506_0708),
        };
        let Ok(back) = decode_payload::<CallCompleted>(&record.to_bytes()) else {
            panic!("record should decode");
        };
        assert_eq!(back, record);
    }

    #[test]
    fn truncated_record_is_rejected() {
        assert!(decode_payload::<CallCompleted>(&[1, 2, 3]).is_err());
    }
}
