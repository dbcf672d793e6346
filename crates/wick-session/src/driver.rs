//! Async handshake driver.
//!
//! The handshake state machines in `wick-crypto` are sans-IO; this
//! module drives them over a caller-provided [`FrameTransport`]. Each
//! receive races against the environment clock, and the whole future is
//! drop-cancellable: the consumed state machines cannot be resumed, so
//! cancelling a handshake leaks no partial session.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::debug;
use wick_crypto::{
    HandshakeInitiator, HandshakeResponder, IdentityKeyPair, IdentityPublicKey, RatchetPolicy,
    SignedPrekeyBundle,
};
use wick_crypto::suite::SuitePolicy;
use wick_proto::{
    payloads::{HandshakeConfirmPayload, HandshakeInitPayload, HandshakeResponsePayload, Payload},
    Frame,
};

use crate::{
    env::{EnvRng, Environment},
    error::SessionError,
    prekey_store::PrekeyStore,
    session::Session,
};

/// How long each handshake receive may block.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Byte transport carrying whole frames.
///
/// Implementations wrap whatever the application uses to move bytes; the
/// driver never sees below the frame layer.
#[async_trait]
pub trait FrameTransport: Send {
    /// Send one frame to the peer.
    async fn send(&mut self, frame: Frame) -> Result<(), SessionError>;

    /// Receive the next frame from the peer.
    async fn recv(&mut self) -> Result<Frame, SessionError>;
}

/// Per-peer session establishment parameters.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Stable sender identifier carried in this side's frame headers.
    pub local_sender: u64,
    /// Cipher suite policy for negotiation.
    pub suite_policy: SuitePolicy,
    /// Ratchet cadence.
    pub ratchet_policy: RatchetPolicy,
}

impl SessionConfig {
    /// Default policies for one sender identifier.
    pub fn new(local_sender: u64) -> Self {
        Self {
            local_sender,
            suite_policy: SuitePolicy::default(),
            ratchet_policy: RatchetPolicy::default(),
        }
    }
}

/// Run the initiator side of the handshake to completion.
///
/// On success the returned session is pending SAS verification; no
/// application traffic flows until [`Session::confirm_sas`].
pub async fn initiate<E: Environment, T: FrameTransport>(
    env: &E,
    transport: &mut T,
    identity: Arc<IdentityKeyPair>,
    peer_identity: IdentityPublicKey,
    bundle: &SignedPrekeyBundle,
    config: &SessionConfig,
) -> Result<Session, SessionError> {
    let mut rng = EnvRng(env);
    let (machine, init) =
        HandshakeInitiator::start(&mut rng, &identity, &peer_identity, bundle, config.suite_policy)?;
    transport.send(Payload::HandshakeInit(HandshakeInitPayload::from(&init)).into_frame()?).await?;

    let frame = recv_with_deadline(env, transport).await?;
    let response = match Payload::from_frame(&frame)? {
        Payload::HandshakeResponse(payload) => payload.into_message()?,
        other => return Err(SessionError::UnexpectedFrame { opcode: other.opcode().to_u16() }),
    };

    let (seed, confirm) = machine.receive_response(&response)?;
    transport
        .send(Payload::HandshakeConfirm(HandshakeConfirmPayload::from(&confirm)).into_frame()?)
        .await?;

    debug!(algorithm = ?seed.algorithm(), "initiator handshake complete");
    Ok(Session::initiator(
        &seed,
        identity,
        peer_identity,
        config.local_sender,
        bundle.public.clone(),
        config.ratchet_policy,
    ))
}

/// Run the responder side of the handshake to completion.
///
/// The prekey referenced by the opening message is looked up in a store
/// snapshot; an uninitialized store fails with the typed
/// [`SessionError::NotReady`] so callers can retry after publication.
pub async fn respond<E: Environment, T: FrameTransport>(
    env: &E,
    transport: &mut T,
    identity: Arc<IdentityKeyPair>,
    store: &PrekeyStore,
    config: &SessionConfig,
) -> Result<Session, SessionError> {
    let frame = recv_with_deadline(env, transport).await?;
    let init = match Payload::from_frame(&frame)? {
        Payload::HandshakeInit(payload) => payload.into_message()?,
        other => return Err(SessionError::UnexpectedFrame { opcode: other.opcode().to_u16() }),
    };

    let snapshot = store.snapshot()?;
    let secrets = snapshot
        .secrets(init.prekey_id)
        .ok_or(SessionError::UnknownPrekey { prekey_id: init.prekey_id })?;
    let peer_identity = init.initiator_identity;

    let mut rng = EnvRng(env);
    let (machine, response) =
        HandshakeResponder::respond(&mut rng, &identity, &secrets, config.suite_policy, &init)?;
    transport
        .send(Payload::HandshakeResponse(HandshakeResponsePayload::from(&response)).into_frame()?)
        .await?;

    let frame = recv_with_deadline(env, transport).await?;
    let confirm = match Payload::from_frame(&frame)? {
        Payload::HandshakeConfirm(payload) => payload.into_message(),
        other => return Err(SessionError::UnexpectedFrame { opcode: other.opcode().to_u16() }),
    };

    let seed = machine.receive_confirm(&confirm)?;
    debug!(algorithm = ?seed.algorithm(), "responder handshake complete");
    Ok(Session::responder(
        &seed,
        identity,
        peer_identity,
        config.local_sender,
        secrets,
        config.ratchet_policy,
    ))
}

async fn recv_with_deadline<E: Environment, T: FrameTransport>(
    env: &E,
    transport: &mut T,
) -> Result<Frame, SessionError> {
    let started = env.now();
    tokio::select! {
        frame = transport.recv() => frame,
        () = env.sleep(HANDSHAKE_TIMEOUT) => {
            Err(SessionError::HandshakeTimeout { elapsed: env.now() - started })
        }
    }
}
