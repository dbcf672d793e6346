//! Frame type combining header and payload bytes.
//!
//! A `Frame` is the transport-layer packet: a 32-byte binary header
//! followed by payload bytes. This is a pure data holder; CBOR control
//! payloads are encoded and decoded by [`crate::Payload`], and data
//! payloads are AEAD ciphertext the session layer seals and opens.

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    header::FrameHeader,
};

/// Complete protocol frame.
///
/// # Invariants
///
/// - `payload.len()` matches `header.payload_size()`; enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - `payload.len()` never exceeds [`FrameHeader::MAX_PAYLOAD_SIZE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (32 bytes).
    pub header: FrameHeader,
    /// Raw payload bytes (CBOR or ciphertext).
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, setting the header's payload size automatically.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] above the size limit; frames
    /// with a mismatched size claim cannot be constructed.
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }
        header.set_payload_size(payload.len() as u32);
        Ok(Self { header, payload })
    }

    /// Encode into a buffer: `[header (32 bytes)] + [payload]`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Decode from wire format.
    ///
    /// Reads exactly the bytes the header claims; trailing data is
    /// ignored. All validation happens before the payload is copied.
    ///
    /// # Errors
    ///
    /// Header validation errors, or [`ProtocolError::FrameTruncated`] if
    /// the buffer carries fewer payload bytes than the header claims.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;
        let payload_size = header.payload_size() as usize;
        let total = FrameHeader::SIZE + payload_size;

        let Some(payload) = bytes.get(FrameHeader::SIZE..total) else {
            return Err(ProtocolError::FrameTruncated {
                expected: payload_size,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        };
        Ok(Self { header, payload: Bytes::copy_from_slice(payload) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn round_trip() {
        let frame = Frame::new(FrameHeader::new(Opcode::Data), vec![1, 2, 3, 4]).unwrap();
        assert_eq!(frame.header.payload_size(), 4);

        let mut wire = Vec::new();
        frame.encode(&mut wire);
        assert_eq!(wire.len(), frame.encoded_len());

        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(frame, parsed);
    }

    #[test]
    fn empty_payload_round_trip() {
        let frame = Frame::new(FrameHeader::new(Opcode::HandshakeConfirm), Vec::new()).unwrap();
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        assert_eq!(Frame::decode(&wire).unwrap(), frame);
    }

    #[test]
    fn reject_truncated_payload() {
        let frame = Frame::new(FrameHeader::new(Opcode::Data), vec![0u8; 100]).unwrap();
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        let result = Frame::decode(&wire[..wire.len() - 1]);
        assert_eq!(result, Err(ProtocolError::FrameTruncated { expected: 100, actual: 99 }));
    }

    #[test]
    fn reject_oversized_payload() {
        let payload = vec![0u8; FrameHeader::MAX_PAYLOAD_SIZE as usize + 1];
        let result = Frame::new(FrameHeader::new(Opcode::Data), payload);
        assert!(matches!(result, Err(ProtocolError::PayloadTooLarge { .. })));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let frame = Frame::new(FrameHeader::new(Opcode::Data), vec![9u8; 8]).unwrap();
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        wire.extend_from_slice(b"garbage");
        assert_eq!(Frame::decode(&wire).unwrap(), frame);
    }
}
