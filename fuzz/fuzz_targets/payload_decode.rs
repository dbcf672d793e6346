//! Fuzz target for Payload::decode
//!
//! This fuzzer tests payload deserialization (CBOR decoding) with:
//! - Malformed CBOR data
//! - Type confusion attacks (wrong payload type for opcode)
//! - Oversized strings or collections
//! - Nested structures exceeding depth limits
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wick_proto::{Opcode, Payload};

fuzz_target!(|data: &[u8]| {
    // Try every opcode to exercise every payload schema against the same
    // malformed bytes, including type confusion between schemas.
    let opcodes = [
        Opcode::HandshakeInit,
        Opcode::HandshakeResponse,
        Opcode::HandshakeConfirm,
        Opcode::Data,
        Opcode::RekeyAnnounce,
        Opcode::RoomControl,
        Opcode::RoomData,
    ];

    for opcode in opcodes {
        // This should never panic, only return Err for invalid CBOR
        let _ = Payload::decode(opcode, data);
    }
});
