//! CBOR-encoded control payloads.
//!
//! Frame headers are raw binary for cheap routing; control payloads use
//! CBOR for forward compatibility. The opcode in the header identifies
//! the payload type, so no variant tag is serialized and a mismatched
//! opcode/payload pair cannot be expressed on the wire.
//!
//! Wire payloads hold raw bytes; conversion into `wick-crypto` message
//! types is where field validation happens, so nothing downstream ever
//! sees an unvalidated key or signature length.

use serde::{Deserialize, Serialize};
use wick_crypto::{
    domain,
    handshake::{HandshakeConfirm, HandshakeInit, HandshakeResponse},
    suite::AlgorithmId,
    IdentityKeyPair, IdentityPublicKey,
};

use crate::{
    errors::{ProtocolError, Result},
    frame::Frame,
    header::FrameHeader,
    opcode::Opcode,
};

/// Wire form of the initiator's opening message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeInitPayload {
    /// Handshake version byte.
    pub version: u8,
    /// Initiator's Ed25519 identity key.
    pub initiator_identity: [u8; 32],
    /// Which published prekey was used.
    pub prekey_id: u32,
    /// Initiator's ephemeral X25519 public key.
    pub ephemeral_x25519: [u8; 32],
    /// ML-KEM-768 ciphertext.
    pub kem_ciphertext: Vec<u8>,
    /// Offered suite identifiers, most preferred first.
    pub offered: Vec<u8>,
    /// Identity signature (64 bytes).
    pub signature: Vec<u8>,
}

impl From<&HandshakeInit> for HandshakeInitPayload {
    fn from(message: &HandshakeInit) -> Self {
        Self {
            version: message.version,
            initiator_identity: *message.initiator_identity.as_bytes(),
            prekey_id: message.prekey_id,
            ephemeral_x25519: message.ephemeral_x25519,
            kem_ciphertext: message.kem_ciphertext.clone(),
            offered: message.offered.iter().map(|suite| suite.to_u8()).collect(),
            signature: message.signature.to_vec(),
        }
    }
}

impl HandshakeInitPayload {
    /// Validate fields and convert into the protocol message.
    pub fn into_message(self) -> Result<HandshakeInit> {
        let initiator_identity = IdentityPublicKey::from_bytes(self.initiator_identity)
            .map_err(|_| ProtocolError::InvalidField { field: "initiator_identity" })?;
        let offered = self
            .offered
            .iter()
            .map(|id| AlgorithmId::from_u8(*id))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| ProtocolError::InvalidField { field: "offered" })?;
        let signature = signature_bytes(&self.signature)?;
        Ok(HandshakeInit {
            version: self.version,
            initiator_identity,
            prekey_id: self.prekey_id,
            ephemeral_x25519: self.ephemeral_x25519,
            kem_ciphertext: self.kem_ciphertext,
            offered,
            signature,
        })
    }
}

/// Wire form of the responder's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponsePayload {
    /// Handshake version byte.
    pub version: u8,
    /// Responder's ephemeral X25519 public key.
    pub ephemeral_x25519: [u8; 32],
    /// Selected suite identifier.
    pub chosen: u8,
    /// Identity signature over the transcript (64 bytes).
    pub signature: Vec<u8>,
    /// Responder's key-confirmation tag.
    pub confirm_tag: [u8; 32],
}

impl From<&HandshakeResponse> for HandshakeResponsePayload {
    fn from(message: &HandshakeResponse) -> Self {
        Self {
            version: message.version,
            ephemeral_x25519: message.ephemeral_x25519,
            chosen: message.chosen.to_u8(),
            signature: message.signature.to_vec(),
            confirm_tag: message.confirm_tag,
        }
    }
}

impl HandshakeResponsePayload {
    /// Validate fields and convert into the protocol message.
    pub fn into_message(self) -> Result<HandshakeResponse> {
        let chosen = AlgorithmId::from_u8(self.chosen)
            .map_err(|_| ProtocolError::InvalidField { field: "chosen" })?;
        let signature = signature_bytes(&self.signature)?;
        Ok(HandshakeResponse {
            version: self.version,
            ephemeral_x25519: self.ephemeral_x25519,
            chosen,
            signature,
            confirm_tag: self.confirm_tag,
        })
    }
}

/// Wire form of the initiator's key confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfirmPayload {
    /// Initiator's key-confirmation tag.
    pub confirm_tag: [u8; 32],
}

impl From<&HandshakeConfirm> for HandshakeConfirmPayload {
    fn from(message: &HandshakeConfirm) -> Self {
        Self { confirm_tag: message.confirm_tag }
    }
}

impl HandshakeConfirmPayload {
    /// Convert into the protocol message.
    pub fn into_message(self) -> HandshakeConfirm {
        HandshakeConfirm { confirm_tag: self.confirm_tag }
    }
}

/// Signed mid-session rekey announcement.
///
/// Carries the fresh DH public key (and, on PQ epoch boundaries, an
/// ML-KEM ciphertext) that the peer mixes into its root. The identity
/// signature binds the announcement to the sender's long-term key, so a
/// relay cannot inject a rekey and desynchronize the ratchets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyAnnounce {
    /// Root-mix generation this announcement establishes.
    pub generation: u32,
    /// Sender's fresh X25519 public key.
    pub dh_public: [u8; 32],
    /// ML-KEM-768 ciphertext, present on PQ epoch boundaries.
    pub kem_ciphertext: Option<Vec<u8>>,
    /// Identity signature (64 bytes).
    pub signature: Vec<u8>,
}

impl RekeyAnnounce {
    /// Build and sign an announcement.
    pub fn sign(
        identity: &IdentityKeyPair,
        generation: u32,
        dh_public: [u8; 32],
        kem_ciphertext: Option<Vec<u8>>,
    ) -> Self {
        let mut announce = Self { generation, dh_public, kem_ciphertext, signature: Vec::new() };
        announce.signature =
            identity.sign(domain::REKEY_SIG, &announce.signed_message()).to_vec();
        announce
    }

    /// Verify the announcement against the sender's identity.
    ///
    /// Terminal for the announcement on failure; the rekey is not
    /// applied and the frame is dropped.
    pub fn verify(&self, identity: &IdentityPublicKey) -> Result<()> {
        let signature = signature_bytes(&self.signature)?;
        identity
            .verify(domain::REKEY_SIG, &self.signed_message(), &signature)
            .map_err(|_| ProtocolError::BadSignature)
    }

    fn signed_message(&self) -> Vec<u8> {
        let kem_len = self.kem_ciphertext.as_ref().map_or(0, Vec::len);
        let mut message = Vec::with_capacity(4 + 32 + 1 + kem_len);
        message.extend_from_slice(&self.generation.to_be_bytes());
        message.extend_from_slice(&self.dh_public);
        match &self.kem_ciphertext {
            Some(ciphertext) => {
                message.push(1);
                message.extend_from_slice(ciphertext);
            }
            None => message.push(0),
        }
        message
    }
}

/// Roster mutation kinds.
///
/// Members are identified by the same stable u64 that rides in the
/// frame header's sender field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomAction {
    /// Rotate the room secret without changing membership.
    Rotate,
    /// Add a member.
    Add {
        /// Member being added
        member: u64,
    },
    /// Remove a member.
    Remove {
        /// Member being removed
        member: u64,
    },
}

/// Room roster or epoch mutation.
///
/// Every mutation carries the new epoch so stale sender keys are
/// unambiguously rejected: a member still holding epoch `E` material
/// cannot pass frames off as epoch `E+1` traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomControl {
    /// The mutation being applied.
    pub action: RoomAction,
    /// Epoch in force after the mutation.
    pub epoch: u32,
    /// Full roster after the mutation.
    pub roster: Vec<u64>,
}

/// All CBOR control payloads.
///
/// Data and room-data frames carry raw ciphertext and are deliberately
/// absent: they never pass through a deserializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Initiator's opening message.
    HandshakeInit(HandshakeInitPayload),
    /// Responder's reply.
    HandshakeResponse(HandshakeResponsePayload),
    /// Initiator's key confirmation.
    HandshakeConfirm(HandshakeConfirmPayload),
    /// Signed rekey announcement.
    RekeyAnnounce(RekeyAnnounce),
    /// Room roster or epoch mutation.
    RoomControl(RoomControl),
}

impl Payload {
    /// Opcode this payload travels under.
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::HandshakeInit(_) => Opcode::HandshakeInit,
            Self::HandshakeResponse(_) => Opcode::HandshakeResponse,
            Self::HandshakeConfirm(_) => Opcode::HandshakeConfirm,
            Self::RekeyAnnounce(_) => Opcode::RekeyAnnounce,
            Self::RoomControl(_) => Opcode::RoomControl,
        }
    }

    /// Encode the payload body as CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let result = match self {
            Self::HandshakeInit(inner) => ciborium::into_writer(inner, &mut bytes),
            Self::HandshakeResponse(inner) => ciborium::into_writer(inner, &mut bytes),
            Self::HandshakeConfirm(inner) => ciborium::into_writer(inner, &mut bytes),
            Self::RekeyAnnounce(inner) => ciborium::into_writer(inner, &mut bytes),
            Self::RoomControl(inner) => ciborium::into_writer(inner, &mut bytes),
        };
        result.map_err(|err| ProtocolError::Encode(err.to_string()))?;
        Ok(bytes)
    }

    /// Decode a payload body for a known opcode.
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        fn read<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
            ciborium::from_reader(bytes).map_err(|err| ProtocolError::Decode(err.to_string()))
        }

        if opcode.is_ciphertext() {
            // Ciphertext bodies never pass through a deserializer.
            return Err(ProtocolError::OpcodeMismatch(opcode));
        }
        match opcode {
            Opcode::HandshakeInit => Ok(Self::HandshakeInit(read(bytes)?)),
            Opcode::HandshakeResponse => Ok(Self::HandshakeResponse(read(bytes)?)),
            Opcode::HandshakeConfirm => Ok(Self::HandshakeConfirm(read(bytes)?)),
            Opcode::RekeyAnnounce => Ok(Self::RekeyAnnounce(read(bytes)?)),
            Opcode::RoomControl => Ok(Self::RoomControl(read(bytes)?)),
            Opcode::Data | Opcode::RoomData => Err(ProtocolError::OpcodeMismatch(opcode)),
        }
    }

    /// Wrap the payload in a frame with a fresh header.
    pub fn into_frame(self) -> Result<Frame> {
        let bytes = self.encode()?;
        Frame::new(FrameHeader::new(self.opcode()), bytes)
    }

    /// Extract and decode the payload from a frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn signature_bytes(bytes: &[u8]) -> Result<[u8; 64]> {
    bytes.try_into().map_err(|_| ProtocolError::InvalidField { field: "signature" })
}
