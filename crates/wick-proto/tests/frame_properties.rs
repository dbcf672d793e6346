//! Property-based tests for frame encoding/decoding.

use bytes::Bytes;
use proptest::prelude::*;
use wick_proto::{Frame, FrameFlags, FrameHeader, Opcode, ProtocolError};

fn arbitrary_opcode() -> impl Strategy<Value = Opcode> {
    prop_oneof![
        Just(Opcode::HandshakeInit),
        Just(Opcode::HandshakeResponse),
        Just(Opcode::HandshakeConfirm),
        Just(Opcode::Data),
        Just(Opcode::RekeyAnnounce),
        Just(Opcode::RoomControl),
        Just(Opcode::RoomData),
    ]
}

fn arbitrary_header() -> impl Strategy<Value = FrameHeader> {
    (arbitrary_opcode(), any::<u8>(), any::<u64>(), any::<u32>(), any::<u32>()).prop_map(
        |(opcode, flags, sender_id, context, counter)| {
            let mut header = FrameHeader::new(opcode);
            header.set_flags(FrameFlags::from_byte(flags));
            header.set_sender_id(sender_id);
            header.set_context(context);
            header.set_counter(counter);
            header
        },
    )
}

fn arbitrary_frame() -> impl Strategy<Value = Frame> {
    (arbitrary_header(), prop::collection::vec(any::<u8>(), 0..1024)).prop_map(
        |(header, payload)| {
            Frame::new(header, payload).unwrap_or_else(|_| unreachable!("payload under limit"))
        },
    )
}

proptest! {
    #[test]
    fn frame_round_trip(frame in arbitrary_frame()) {
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        let parsed = Frame::decode(&wire).expect("should decode");
        prop_assert_eq!(frame, parsed);
    }

    #[test]
    fn header_size_always_matches_payload(frame in arbitrary_frame()) {
        prop_assert_eq!(frame.header.payload_size() as usize, frame.payload.len());
    }

    #[test]
    fn truncated_frames_never_decode(frame in arbitrary_frame(), cut in 1usize..64) {
        prop_assume!(!frame.payload.is_empty());
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        let cut = cut.min(frame.payload.len());
        let result = Frame::decode(&wire[..wire.len() - cut]);
        let truncated = matches!(result, Err(ProtocolError::FrameTruncated { .. }));
        prop_assert!(truncated, "unexpected result: {:?}", result);
    }

    #[test]
    fn corrupted_magic_never_decodes(frame in arbitrary_frame(), bit in 0usize..32) {
        let mut wire = Vec::new();
        frame.encode(&mut wire);
        wire[bit / 8] ^= 1 << (bit % 8);
        // Flipping any bit in the magic word must reject the frame.
        if bit / 8 < 4 {
            prop_assert_eq!(Frame::decode(&wire), Err(ProtocolError::InvalidMagic));
        }
    }

    #[test]
    fn associated_data_is_stable_under_resizing(header in arbitrary_header(), size in 0u32..4096) {
        let mut resized = header;
        resized.set_payload_size(size);
        prop_assert_eq!(header.associated_data(), resized.associated_data());
    }
}

#[test]
fn decode_of_arbitrary_garbage_never_panics() {
    for len in [0usize, 1, 16, 31, 32, 33, 64] {
        let garbage = vec![0xA5u8; len];
        let _ = Frame::decode(&garbage);
    }
}

#[test]
fn payload_bytes_are_opaque() {
    // Data frames carry ciphertext; the decoder must not interpret them.
    let mut header = FrameHeader::new(Opcode::Data);
    header.set_counter(3);
    let ciphertext = Bytes::from_static(&[0xFF, 0x00, 0xAB, 0xCD]);
    let frame = Frame::new(header, ciphertext.clone()).unwrap();
    let mut wire = Vec::new();
    frame.encode(&mut wire);
    assert_eq!(Frame::decode(&wire).unwrap().payload, ciphertext);
}
