//! Frame operation codes.

/// Closed set of frame types.
///
/// The opcode in the header determines how the payload bytes are
/// interpreted; CBOR payloads carry no variant tag of their own, so a
/// mismatched opcode/payload pair cannot be expressed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Initiator's opening handshake message (CBOR).
    HandshakeInit,
    /// Responder's handshake reply (CBOR).
    HandshakeResponse,
    /// Initiator's key confirmation (CBOR).
    HandshakeConfirm,
    /// Pairwise session data frame (raw AEAD ciphertext).
    Data,
    /// Signed mid-session rekey announcement (CBOR).
    RekeyAnnounce,
    /// Room roster or epoch mutation (CBOR).
    RoomControl,
    /// Room data frame sealed under a sender key (raw AEAD ciphertext).
    RoomData,
}

impl Opcode {
    /// Wire representation.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::HandshakeInit => 0x0001,
            Self::HandshakeResponse => 0x0002,
            Self::HandshakeConfirm => 0x0003,
            Self::Data => 0x0010,
            Self::RekeyAnnounce => 0x0011,
            Self::RoomControl => 0x0020,
            Self::RoomData => 0x0021,
        }
    }

    /// Parse a wire opcode. `None` if unrecognized.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::HandshakeInit),
            0x0002 => Some(Self::HandshakeResponse),
            0x0003 => Some(Self::HandshakeConfirm),
            0x0010 => Some(Self::Data),
            0x0011 => Some(Self::RekeyAnnounce),
            0x0020 => Some(Self::RoomControl),
            0x0021 => Some(Self::RoomData),
            _ => None,
        }
    }

    /// Whether frames with this opcode carry raw ciphertext rather than
    /// a CBOR payload.
    pub fn is_ciphertext(self) -> bool {
        matches!(self, Self::Data | Self::RoomData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Opcode; 7] = [
        Opcode::HandshakeInit,
        Opcode::HandshakeResponse,
        Opcode::HandshakeConfirm,
        Opcode::Data,
        Opcode::RekeyAnnounce,
        Opcode::RoomControl,
        Opcode::RoomData,
    ];

    #[test]
    fn wire_codes_round_trip() {
        for opcode in ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }

    #[test]
    fn wire_codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for opcode in ALL {
            assert!(seen.insert(opcode.to_u16()));
        }
    }
}
