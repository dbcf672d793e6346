//! Cipher suite enumeration and deterministic selection.
//!
//! The framing layer is algorithm-agnostic: every suite is driven with a
//! 96-bit nonce and produces a 128-bit tag, so [`NONCE_LEN`] and
//! [`TAG_LEN`] are fixed constants rather than per-suite lookups.
//!
//! Selection is a pure function of the policy. Unconstrained priority is
//! AEGIS-256, then AES-256-GCM, then ChaCha20-Poly1305. A FIPS-constrained
//! policy excludes AEGIS-256 and deterministically lands on AES-256-GCM.
//! The AEGIS-256 backend is gated behind the `aegis` cargo feature;
//! without it, selection falls back the same way a FIPS policy does.

use thiserror::Error;

/// Nonce length in bytes, identical for every suite (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes, identical for every suite (128 bits).
pub const TAG_LEN: usize = 16;

/// Symmetric key length in bytes, identical for every suite.
pub const KEY_LEN: usize = 32;

/// Errors from cipher suite selection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SuiteError {
    /// The policy combination admits no supported algorithm.
    #[error("unsupported policy: {reason}")]
    UnsupportedPolicy {
        /// Why no algorithm satisfies the policy
        reason: &'static str,
    },

    /// An algorithm identifier on the wire is not part of the closed set.
    #[error("unknown algorithm id: {id:#04x}")]
    UnknownAlgorithm {
        /// Raw wire identifier
        id: u8,
    },
}

/// Closed set of supported AEAD algorithms.
///
/// Dispatch is exhaustively checked at every call site; there is no
/// string-based algorithm naming anywhere in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmId {
    /// AEGIS-256 (fastest with vector instructions; non-FIPS)
    Aegis256,
    /// AES-256-GCM (hardware accelerated where AES-NI is present)
    Aes256Gcm,
    /// ChaCha20-Poly1305 (constant-time in software everywhere)
    ChaCha20Poly1305,
}

impl AlgorithmId {
    /// Wire identifier for this algorithm.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Aegis256 => 0x01,
            Self::Aes256Gcm => 0x02,
            Self::ChaCha20Poly1305 => 0x03,
        }
    }

    /// Parse a wire identifier.
    pub fn from_u8(id: u8) -> Result<Self, SuiteError> {
        match id {
            0x01 => Ok(Self::Aegis256),
            0x02 => Ok(Self::Aes256Gcm),
            0x03 => Ok(Self::ChaCha20Poly1305),
            other => Err(SuiteError::UnknownAlgorithm { id: other }),
        }
    }

    /// Position in the policy preference order; higher is preferred.
    ///
    /// This is the ordering downgrade checks compare against: a peer
    /// proposing a suite ranked below the policy minimum is rejected.
    pub fn rank(self) -> u8 {
        match self {
            Self::Aegis256 => 2,
            Self::Aes256Gcm => 1,
            Self::ChaCha20Poly1305 => 0,
        }
    }

    /// Whether this algorithm is acceptable under a FIPS-constrained policy.
    pub fn fips_approved(self) -> bool {
        matches!(self, Self::Aes256Gcm)
    }
}

/// Deterministic selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuitePolicy {
    /// Restrict selection to FIPS-approved algorithms.
    pub fips: bool,
    /// Weakest suite this endpoint will accept from a peer.
    pub minimum: AlgorithmId,
}

impl Default for SuitePolicy {
    fn default() -> Self {
        Self { fips: false, minimum: AlgorithmId::ChaCha20Poly1305 }
    }
}

impl SuitePolicy {
    /// Select the suite this endpoint proposes.
    ///
    /// Pure function of the policy and compiled features; the same inputs
    /// always produce the same algorithm.
    pub fn select(&self) -> Result<AlgorithmId, SuiteError> {
        let chosen = if self.fips {
            AlgorithmId::Aes256Gcm
        } else if cfg!(feature = "aegis") {
            AlgorithmId::Aegis256
        } else if detect_aes_ni() {
            AlgorithmId::Aes256Gcm
        } else {
            AlgorithmId::ChaCha20Poly1305
        };

        if chosen.rank() < self.minimum.rank() {
            return Err(SuiteError::UnsupportedPolicy {
                reason: "policy minimum excludes every selectable algorithm",
            });
        }
        Ok(chosen)
    }

    /// Whether a peer's proposed suite satisfies this policy.
    ///
    /// A proposal below the minimum is a downgrade attempt and must fail
    /// the handshake.
    pub fn accepts(&self, proposed: AlgorithmId) -> bool {
        if self.fips && !proposed.fips_approved() {
            return false;
        }
        proposed.rank() >= self.minimum.rank()
    }

    /// Preference-ordered list of suites this endpoint supports.
    pub fn preference_order(&self) -> Vec<AlgorithmId> {
        let mut suites = Vec::with_capacity(3);
        if self.fips {
            suites.push(AlgorithmId::Aes256Gcm);
        } else {
            if cfg!(feature = "aegis") {
                suites.push(AlgorithmId::Aegis256);
            }
            if detect_aes_ni() {
                suites.push(AlgorithmId::Aes256Gcm);
                suites.push(AlgorithmId::ChaCha20Poly1305);
            } else {
                suites.push(AlgorithmId::ChaCha20Poly1305);
                suites.push(AlgorithmId::Aes256Gcm);
            }
        }
        suites.retain(|s| s.rank() >= self.minimum.rank());
        suites
    }
}

/// Negotiate the first mutually supported suite.
///
/// Walks `ours` in preference order and returns the first entry the peer
/// also supports.
pub fn negotiate(ours: &[AlgorithmId], theirs: &[AlgorithmId]) -> Option<AlgorithmId> {
    ours.iter().find(|suite| theirs.contains(suite)).copied()
}

/// Detect AES-NI hardware acceleration.
pub fn detect_aes_ni() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("aes")
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}
