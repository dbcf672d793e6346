//! Room state: roster, epoch, and per-sender frame streams.

use std::collections::{BTreeSet, HashMap};

use rand_core::{CryptoRng, RngCore};
use wick_crypto::{suite::AlgorithmId, Direction, Nonce, NonceState, SymmetricCodec};
use wick_proto::{
    payloads::{RoomAction, RoomControl},
    Frame, FrameFlags, FrameHeader, Opcode,
};

use crate::{error::RoomError, secret::RoomSecret};

/// One member's view of a sender-key room.
///
/// Sender keys are fixed to AES-256-GCM, matching the derivation label;
/// rooms do not negotiate suites.
///
/// # Invariants
///
/// - A roster mutation marks the room as pending rotation; sealing is
///   refused until a new epoch is installed, so no key derived from the
///   old secret protects traffic a removed member could read.
/// - Frames from any epoch other than the current one are rejected.
/// - Each sender's counters are strictly increasing within an epoch and
///   reset when the epoch rotates.
pub struct SenderKeyRoom {
    local_sender: u64,
    epoch: u32,
    secret: RoomSecret,
    roster: BTreeSet<u64>,
    codec: SymmetricCodec,
    outbound: NonceState,
    inbound: HashMap<u64, u32>,
    pending_rotation: bool,
}

impl SenderKeyRoom {
    /// Create a room at epoch zero with a fresh secret.
    pub fn create(
        rng: &mut (impl RngCore + CryptoRng),
        local_sender: u64,
        members: impl IntoIterator<Item = u64>,
    ) -> Self {
        let mut roster: BTreeSet<u64> = members.into_iter().collect();
        roster.insert(local_sender);
        Self::join(local_sender, 0, RoomSecret::generate(rng), roster)
    }

    /// Join an existing room with a secret received over a pairwise
    /// session.
    pub fn join(
        local_sender: u64,
        epoch: u32,
        secret: RoomSecret,
        roster: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            local_sender,
            epoch,
            secret,
            roster: roster.into_iter().collect(),
            codec: SymmetricCodec::new(AlgorithmId::Aes256Gcm),
            outbound: NonceState::new(Direction::Sender),
            inbound: HashMap::new(),
            pending_rotation: false,
        }
    }

    /// Current epoch.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Current roster.
    pub fn roster(&self) -> &BTreeSet<u64> {
        &self.roster
    }

    /// Current secret, for sealed distribution to members.
    pub fn secret(&self) -> &RoomSecret {
        &self.secret
    }

    /// Whether a roster mutation is awaiting rotation.
    pub fn needs_rotation(&self) -> bool {
        self.pending_rotation
    }

    /// Add a member. Takes effect for encryption only after rotation.
    pub fn add_member(&mut self, member: u64) {
        if self.roster.insert(member) {
            self.pending_rotation = true;
        }
    }

    /// Remove a member. Sealing is refused until the epoch rotates.
    pub fn remove_member(&mut self, member: u64) {
        if self.roster.remove(&member) {
            self.inbound.remove(&member);
            self.pending_rotation = true;
        }
    }

    /// Rotate to a new epoch with a fresh secret.
    ///
    /// Returns the control message announcing the rotation; the new
    /// secret itself travels to each surviving member over their
    /// pairwise session.
    pub fn rotate(&mut self, rng: &mut (impl RngCore + CryptoRng)) -> RoomControl {
        self.secret = self.secret.rotate(rng);
        self.epoch += 1;
        self.pending_rotation = false;
        self.outbound = NonceState::new(Direction::Sender);
        self.inbound.clear();
        RoomControl {
            action: RoomAction::Rotate,
            epoch: self.epoch,
            roster: self.roster.iter().copied().collect(),
        }
    }

    /// Install a rotation announced by another member.
    ///
    /// # Errors
    ///
    /// [`RoomError::EpochRegression`] if the announced epoch does not
    /// advance the current one; [`RoomError::UnknownSender`] if the new
    /// roster excludes this member (we were removed).
    pub fn apply_rotation(
        &mut self,
        control: &RoomControl,
        secret: RoomSecret,
    ) -> Result<(), RoomError> {
        if control.epoch <= self.epoch {
            return Err(RoomError::EpochRegression {
                current: self.epoch,
                received: control.epoch,
            });
        }
        if !control.roster.contains(&self.local_sender) {
            return Err(RoomError::UnknownSender { sender: self.local_sender });
        }
        self.secret = secret;
        self.epoch = control.epoch;
        self.roster = control.roster.iter().copied().collect();
        self.outbound = NonceState::new(Direction::Sender);
        self.inbound.clear();
        self.pending_rotation = false;
        Ok(())
    }

    /// Seal one message for fan-out to every member.
    ///
    /// The same frame goes to all members; encryption work is O(1) per
    /// message regardless of room size.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Frame, RoomError> {
        if self.pending_rotation {
            return Err(RoomError::RotationRequired);
        }
        let nonce = self.outbound.reserve()?;

        let mut header = FrameHeader::new(Opcode::RoomData);
        header.set_sender_id(self.local_sender);
        header.set_context(self.epoch);
        header.set_counter(nonce.counter());
        header.set_flags(FrameFlags::default().with(FrameFlags::EXPLICIT_COUNTER, true));

        let key = self.secret.sender_key(self.local_sender);
        let ciphertext =
            self.codec.encrypt(key.as_bytes(), &nonce, &header.associated_data(), plaintext)?;
        Ok(Frame::new(header, ciphertext)?)
    }

    /// Open a frame from another member.
    ///
    /// The sender's counter advances only after the tag verifies, so a
    /// forged frame cannot burn a counter value.
    pub fn open(&mut self, frame: &Frame) -> Result<Vec<u8>, RoomError> {
        if frame.header.opcode_enum() != Some(Opcode::RoomData) {
            return Err(RoomError::UnexpectedFrame);
        }
        let received = frame.header.context();
        if received != self.epoch {
            return Err(RoomError::StaleEpoch { current: self.epoch, received });
        }
        let sender = frame.header.sender_id();
        if !self.roster.contains(&sender) {
            return Err(RoomError::UnknownSender { sender });
        }
        let counter = frame.header.counter();
        let expected = self.inbound.get(&sender).copied().unwrap_or(0);
        if counter < expected {
            return Err(RoomError::Replay { sender, counter });
        }

        let key = self.secret.sender_key(sender);
        let nonce = Nonce::new(Direction::Sender, counter);
        let plaintext = self.codec.decrypt(
            key.as_bytes(),
            &nonce,
            &frame.header.associated_data(),
            &frame.payload,
        )?;
        self.inbound.insert(sender, counter.saturating_add(1));
        Ok(plaintext)
    }
}

impl std::fmt::Debug for SenderKeyRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderKeyRoom")
            .field("local_sender", &self.local_sender)
            .field("epoch", &self.epoch)
            .field("roster", &self.roster)
            .field("pending_rotation", &self.pending_rotation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    const ALICE: u64 = 1;
    const BOB: u64 = 2;
    const CAROL: u64 = 3;

    fn three_member_room() -> (SenderKeyRoom, SenderKeyRoom, SenderKeyRoom) {
        let alice = SenderKeyRoom::create(&mut OsRng, ALICE, [BOB, CAROL]);
        let bob = SenderKeyRoom::join(BOB, 0, alice.secret().clone(), [ALICE, BOB, CAROL]);
        let carol = SenderKeyRoom::join(CAROL, 0, alice.secret().clone(), [ALICE, BOB, CAROL]);
        (alice, bob, carol)
    }

    #[test]
    fn one_seal_fans_out_to_all_members() {
        let (mut alice, mut bob, mut carol) = three_member_room();
        let frame = alice.seal(b"hello room").unwrap();
        assert_eq!(bob.open(&frame).unwrap(), b"hello room");
        assert_eq!(carol.open(&frame).unwrap(), b"hello room");
    }

    #[test]
    fn counters_increase_per_sender() {
        let (mut alice, mut bob, _) = three_member_room();
        let first = alice.seal(b"one").unwrap();
        let second = alice.seal(b"two").unwrap();
        assert_eq!(first.header.counter(), 0);
        assert_eq!(second.header.counter(), 1);
        assert_eq!(bob.open(&first).unwrap(), b"one");
        assert_eq!(bob.open(&second).unwrap(), b"two");
    }

    #[test]
    fn replayed_frame_is_rejected() {
        let (mut alice, mut bob, _) = three_member_room();
        let frame = alice.seal(b"once").unwrap();
        bob.open(&frame).unwrap();
        let result = bob.open(&frame);
        assert_eq!(result, Err(RoomError::Replay { sender: ALICE, counter: 0 }));
    }

    #[test]
    fn unknown_sender_is_rejected() {
        let (mut alice, _, _) = three_member_room();
        let mut frame = alice.seal(b"hi").unwrap();
        frame.header.set_sender_id(99);
        let mut other = SenderKeyRoom::join(BOB, 0, alice.secret().clone(), [ALICE, BOB]);
        let result = other.open(&frame);
        assert_eq!(result, Err(RoomError::UnknownSender { sender: 99 }));
    }

    #[test]
    fn removal_blocks_sending_until_rotation() {
        let (mut alice, _, _) = three_member_room();
        alice.remove_member(BOB);
        assert!(alice.needs_rotation());
        assert_eq!(alice.seal(b"leak?"), Err(RoomError::RotationRequired));
        let control = alice.rotate(&mut OsRng);
        assert_eq!(control.epoch, 1);
        assert!(!control.roster.contains(&BOB));
        assert!(alice.seal(b"safe now").is_ok());
    }

    #[test]
    fn tampered_frame_fails_authentication() {
        let (mut alice, mut bob, _) = three_member_room();
        let mut frame = alice.seal(b"payload").unwrap();
        let mut tampered: Vec<u8> = frame.payload.to_vec();
        tampered[0] ^= 0x01;
        frame.payload = tampered.into();
        assert!(matches!(bob.open(&frame), Err(RoomError::Codec(_))));
        // The failed frame did not burn Alice's counter.
        let clean = alice.seal(b"next").unwrap();
        assert_eq!(clean.header.counter(), 1);
    }

    #[test]
    fn rewritten_header_fails_authentication() {
        // The AAD binds sender and epoch; a relay cannot re-attribute a
        // frame to another member.
        let (mut alice, mut carol, _) = three_member_room();
        let mut frame = alice.seal(b"mine").unwrap();
        frame.header.set_sender_id(BOB);
        assert!(matches!(carol.open(&frame), Err(RoomError::Codec(_))));
    }

    #[test]
    fn rotation_regression_is_rejected() {
        let (mut alice, mut bob, _) = three_member_room();
        let control = alice.rotate(&mut OsRng);
        bob.apply_rotation(&control, alice.secret().clone()).unwrap();
        let result = bob.apply_rotation(&control, alice.secret().clone());
        assert_eq!(result, Err(RoomError::EpochRegression { current: 1, received: 1 }));
    }

    #[test]
    fn removed_member_cannot_apply_the_rotation() {
        let (mut alice, _, _) = three_member_room();
        alice.remove_member(BOB);
        let control = alice.rotate(&mut OsRng);
        let mut bob = SenderKeyRoom::join(BOB, 0, alice.secret().clone(), [ALICE, BOB, CAROL]);
        let result = bob.apply_rotation(&control, alice.secret().clone());
        assert_eq!(result, Err(RoomError::UnknownSender { sender: BOB }));
    }
}
