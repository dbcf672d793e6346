//! Frame header with zero-copy parsing.
//!
//! The header is a fixed 32-byte structure serialized as raw binary
//! (big endian), small enough that a relay routes a frame by reading a
//! single cache line and without deserializing anything.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{ProtocolError, Result},
    opcode::Opcode,
};

/// Per-frame flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags {
    bits: u8,
}

impl FrameFlags {
    /// The counter field is authoritative (unordered transport). When
    /// clear, the receiver tracks the counter locally and the field is
    /// advisory.
    pub const EXPLICIT_COUNTER: u8 = 0b0000_0001;

    /// The frame travels in the responder-originated direction; this is
    /// the direction bit of the 96-bit nonce.
    pub const RECEIVER_ORIGINATED: u8 = 0b0000_0010;

    /// Wrap a raw flag byte.
    pub fn from_byte(bits: u8) -> Self {
        Self { bits }
    }

    /// Raw flag byte.
    pub fn to_byte(self) -> u8 {
        self.bits
    }

    /// Whether the counter field is authoritative.
    pub fn explicit_counter(self) -> bool {
        self.bits & Self::EXPLICIT_COUNTER != 0
    }

    /// Whether the frame is responder-originated.
    pub fn receiver_originated(self) -> bool {
        self.bits & Self::RECEIVER_ORIGINATED != 0
    }

    /// Set or clear a flag bit.
    pub fn with(self, flag: u8, on: bool) -> Self {
        let bits = if on { self.bits | flag } else { self.bits & !flag };
        Self { bits }
    }
}

/// Fixed 32-byte frame header (big-endian network byte order).
///
/// Fields are raw byte arrays to avoid alignment issues; all bit
/// patterns are valid, so casting untrusted bytes cannot cause
/// undefined behavior.
///
/// The `context` field is opcode-dependent: ratchet root-mix generation
/// for pairwise [`Opcode::Data`] frames, room epoch for
/// [`Opcode::RoomData`] frames, zero otherwise.
///
/// # Security
///
/// [`FrameHeader::associated_data`] covers every routing field, so a
/// relay that rewrites sender, direction, counter, or context produces a
/// frame the AEAD rejects. Structural validation here is not
/// authentication.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    flags: u8,
    pub(crate) opcode: [u8; 2],
    sender_id: [u8; 8],
    context: [u8; 4],
    counter: [u8; 4],
    pub(crate) payload_size: [u8; 4],
    reserved: [u8; 4],
}

impl FrameHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 32;

    /// Magic number: "WICK" in ASCII.
    pub const MAGIC: u32 = 0x5749_434B;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MB). Frames are protocol messages and
    /// sealed chunks, never whole files.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a header for the given opcode with all other fields zero.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            opcode: opcode.to_u16().to_be_bytes(),
            sender_id: [0; 8],
            context: [0; 4],
            counter: [0; 4],
            payload_size: [0; 4],
            reserved: [0; 4],
        }
    }

    /// Parse a header from network bytes without copying.
    ///
    /// # Errors
    ///
    /// Fails fast on short buffers, a bad magic number, an unknown
    /// version, or an oversized payload claim, in that order. Nothing is
    /// allocated before validation completes.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }
        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }
        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }
        Ok(header)
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Associated data for the AEAD: every field up to and including the
    /// counter.
    ///
    /// Excludes `payload_size` (derivable from the ciphertext) and the
    /// reserved bytes, so the AAD is fixed before encryption without
    /// knowing the ciphertext length.
    pub fn associated_data(&self) -> [u8; 24] {
        let bytes = self.to_bytes();
        let mut aad = [0u8; 24];
        aad.copy_from_slice(&bytes[..24]);
        aad
    }

    /// Protocol version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Frame flag bits.
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    /// Operation code as raw u16.
    pub fn opcode(&self) -> u16 {
        u16::from_be_bytes(self.opcode)
    }

    /// Operation code as enum. `None` if unrecognized.
    pub fn opcode_enum(&self) -> Option<Opcode> {
        Opcode::from_u16(self.opcode())
    }

    /// Stable sender identifier.
    pub fn sender_id(&self) -> u64 {
        u64::from_be_bytes(self.sender_id)
    }

    /// Opcode-dependent context: ratchet generation or room epoch.
    pub fn context(&self) -> u32 {
        u32::from_be_bytes(self.context)
    }

    /// Nonce counter for ciphertext frames.
    pub fn counter(&self) -> u32 {
        u32::from_be_bytes(self.counter)
    }

    /// Payload size in bytes.
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Update frame flags.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.to_byte();
    }

    /// Update sender identifier.
    pub fn set_sender_id(&mut self, sender_id: u64) {
        self.sender_id = sender_id.to_be_bytes();
    }

    /// Update the context field.
    pub fn set_context(&mut self, context: u32) {
        self.context = context.to_be_bytes();
    }

    /// Update the nonce counter.
    pub fn set_counter(&mut self, counter: u32) {
        self.counter = counter.to_be_bytes();
    }

    /// Update the payload size.
    pub fn set_payload_size(&mut self, size: u32) {
        self.payload_size = size.to_be_bytes();
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("version", &self.version())
            .field("flags", &self.flags())
            .field("opcode", &format!("{:#06x}", self.opcode()))
            .field("sender_id", &self.sender_id())
            .field("context", &self.context())
            .field("counter", &self.counter())
            .field("payload_size", &self.payload_size())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
        assert_eq!(FrameHeader::SIZE, 32);
    }

    #[test]
    fn round_trip() {
        let mut header = FrameHeader::new(Opcode::Data);
        header.set_sender_id(42);
        header.set_context(3);
        header.set_counter(99);
        header.set_payload_size(128);
        header.set_flags(FrameFlags::default().with(FrameFlags::EXPLICIT_COUNTER, true));

        let bytes = header.to_bytes();
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(&header, parsed);
        assert_eq!(parsed.sender_id(), 42);
        assert_eq!(parsed.counter(), 99);
        assert!(parsed.flags().explicit_counter());
        assert!(!parsed.flags().receiver_originated());
    }

    #[test]
    fn associated_data_excludes_payload_size() {
        let mut header = FrameHeader::new(Opcode::Data);
        header.set_counter(7);
        let before = header.associated_data();
        header.set_payload_size(4096);
        assert_eq!(before, header.associated_data());
        header.set_counter(8);
        assert_ne!(before, header.associated_data());
    }

    #[test]
    fn reject_short_buffer() {
        let result = FrameHeader::from_bytes(&[0u8; 16]);
        assert_eq!(result, Err(ProtocolError::FrameTooShort { expected: 32, actual: 16 }));
    }

    #[test]
    fn reject_invalid_magic() {
        let mut bytes = FrameHeader::new(Opcode::Data).to_bytes();
        bytes[0] ^= 0xFF;
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic));
    }

    #[test]
    fn reject_invalid_version() {
        let mut bytes = FrameHeader::new(Opcode::Data).to_bytes();
        bytes[4] = 0x7F;
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::UnsupportedVersion(0x7F)));
    }

    #[test]
    fn reject_oversized_payload_claim() {
        let mut header = FrameHeader::new(Opcode::Data);
        header.set_payload_size(FrameHeader::MAX_PAYLOAD_SIZE + 1);
        let bytes = header.to_bytes();
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn flag_bits_toggle() {
        let flags = FrameFlags::default()
            .with(FrameFlags::RECEIVER_ORIGINATED, true)
            .with(FrameFlags::EXPLICIT_COUNTER, true)
            .with(FrameFlags::EXPLICIT_COUNTER, false);
        assert!(flags.receiver_originated());
        assert!(!flags.explicit_counter());
    }
}
