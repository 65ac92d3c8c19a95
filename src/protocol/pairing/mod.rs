//! Pairing and verification state machines carried inside
//! `CryptoPairingMessage` envelopes.

pub mod setup;
pub mod tlv;
pub mod verify;

pub use setup::PairingSm;
pub use verify::VerifierSm;

/// State of an in-progress `PairingSm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// No message sent yet.
    Init,
    /// M1 sent, waiting for the device's M2 (salt + public key).
    AwaitM2,
    /// M2 received; waiting for the caller to supply the PIN shown on the
    /// device before M3 can be built.
    AwaitPin,
    /// M3 sent, waiting for the device's M4 (proof).
    AwaitM4,
    /// M5 sent, waiting for the device's M6 (its identity).
    AwaitM6,
    /// Pairing succeeded; `Credentials` were produced.
    Complete,
    /// Pairing aborted.
    Failed,
}

/// State of an in-progress `VerifierSm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    /// No message sent yet.
    Init,
    /// M1 sent, waiting for the device's M2.
    AwaitM2,
    /// Session keys derived.
    Complete,
    /// Verification aborted.
    Failed,
}

/// Outcome of a single `PairingSm::step`/`submit_pin` call.
#[derive(Debug)]
pub enum PairingStepResult {
    /// Send this `pairingData` payload to the device and await a reply.
    SendData(Vec<u8>),
    /// M2 was processed; call `PairingSm::submit_pin` with the PIN shown on
    /// the device before driving the machine further.
    NeedPin,
    /// Pairing is complete; these are the long-term credentials to persist.
    Complete(crate::types::Credentials),
}

/// Outcome of a single `VerifierSm::step` call.
#[derive(Debug)]
pub enum VerifyStepResult {
    /// Send this `pairingData` payload to the device and await a reply.
    SendData(Vec<u8>),
    /// Verification is complete; these are the per-direction session keys.
    Complete(SessionKeys),
}

/// Per-connection AEAD keys produced by a successful verify exchange.
#[derive(Clone)]
pub struct SessionKeys {
    /// Key used to encrypt frames sent to the device.
    pub write_key: [u8; 32],
    /// Key used to decrypt frames received from the device.
    pub read_key: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Pairing and verification errors.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("SRP verification failed")]
    SrpVerificationFailed,

    #[error("signature verification failed")]
    SignatureVerificationFailed,

    #[error("crypto error: {0}")]
    CryptoError(#[from] crate::protocol::crypto::CryptoError),

    #[error("device returned error: {code}")]
    DeviceError { code: u8 },

    #[error("TLV error: {0}")]
    Tlv(#[from] tlv::TlvError),

    #[error("remote peer id {0:?} does not match stored credentials")]
    UnknownPeer(String),
}
