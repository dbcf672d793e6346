//! Short authentication string derivation and arbitration.
//!
//! Both peers derive the same code from the handshake transcript and
//! compare it out of band, verbally or visually. An active adversary in
//! the middle cannot make both transcripts match, so differing codes
//! reveal the interception. The comparison must involve a human or an
//! authenticated side channel; nothing machine-readable may silently
//! auto-confirm.
//!
//! A mismatch is fatal. The session must stop encrypting and decrypting
//! within [`SAS_DEADLINE`] of the report, and the failure surfaces as a
//! distinct error so callers can warn about probable interception rather
//! than a generic disconnect.

use std::time::Duration;

use thiserror::Error;

use crate::{domain, kdf};

/// Entropy carried by a rendered code, in bits.
///
/// Eight base-32 characters; above the 36-bit floor an active attacker
/// would need to beat to forge a matching code.
pub const SAS_ENTROPY_BITS: u32 = 40;

/// Deadline for terminating the session after a reported mismatch.
pub const SAS_DEADLINE: Duration = Duration::from_millis(100);

/// Crockford base-32: no I, L, O, or U, so codes survive being read
/// aloud or retyped.
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Errors from SAS arbitration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SasError {
    /// The codes differed. Probable active interception; fatal and
    /// non-retryable.
    #[error("short authentication string mismatch; possible active interception")]
    Mismatch,

    /// The verifier already reached a terminal state.
    #[error("short authentication string already resolved")]
    AlreadyResolved,
}

impl SasError {
    /// Whether the session must terminate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Mismatch)
    }
}

/// A derived, human-comparable code.
///
/// Single use: one code per handshake, never reused or re-derived for a
/// resumed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasCode {
    bits: u64,
}

impl SasCode {
    /// Derive the code for a completed handshake transcript.
    ///
    /// Deterministic: both peers compute this independently from their
    /// own transcript and the codes match exactly when the transcripts
    /// do.
    pub fn derive(transcript_hash: &[u8; 32]) -> Self {
        let okm = kdf::derive_key(None, transcript_hash, domain::SAS);
        let mut bits = 0u64;
        for byte in &okm[..5] {
            bits = (bits << 8) | u64::from(*byte);
        }
        Self { bits }
    }

    /// Render as `XXXX-XXXX` in Crockford base-32.
    pub fn display(&self) -> String {
        let mut out = String::with_capacity(9);
        for position in 0..8 {
            if position == 4 {
                out.push('-');
            }
            let shift = 5 * (7 - position);
            let index = ((self.bits >> shift) & 0x1F) as usize;
            out.push(ALPHABET[index] as char);
        }
        out
    }

    /// Raw 40-bit value.
    pub fn bits(&self) -> u64 {
        self.bits
    }
}

/// Verification state for one handshake's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SasState {
    Pending,
    Confirmed,
    Mismatched,
}

/// Arbitrates the confirm/mismatch decision for one session.
///
/// Created once per handshake in the pending state. Until the operator
/// confirms the codes match, [`SasVerifier::allows_traffic`] is false
/// and no application plaintext may flow.
#[derive(Debug)]
pub struct SasVerifier {
    code: SasCode,
    state: SasState,
}

impl SasVerifier {
    /// Derive the code and start in the pending state.
    pub fn new(transcript_hash: &[u8; 32]) -> Self {
        Self { code: SasCode::derive(transcript_hash), state: SasState::Pending }
    }

    /// The code to display to the local operator.
    pub fn code(&self) -> &SasCode {
        &self.code
    }

    /// Operator confirmed the codes match.
    pub fn confirm(&mut self) -> Result<(), SasError> {
        match self.state {
            SasState::Pending => {
                self.state = SasState::Confirmed;
                Ok(())
            }
            SasState::Mismatched => Err(SasError::Mismatch),
            SasState::Confirmed => Err(SasError::AlreadyResolved),
        }
    }

    /// Operator reported differing codes.
    ///
    /// Terminal even after a prior confirm: a late report still kills
    /// the session. Always returns [`SasError::Mismatch`] so the caller
    /// propagates a typed, non-retryable failure.
    pub fn report_mismatch(&mut self) -> SasError {
        self.state = SasState::Mismatched;
        SasError::Mismatch
    }

    /// Whether application traffic may flow.
    pub fn allows_traffic(&self) -> bool {
        self.state == SasState::Confirmed
    }

    /// Whether the verifier reached the mismatch state.
    pub fn is_mismatched(&self) -> bool {
        self.state == SasState::Mismatched
    }
}
