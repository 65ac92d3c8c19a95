//! Crate-boundary error type

use crate::protocol::crypto::CryptoError;
use crate::protocol::pairing::{PairingError, tlv::TlvError};
use thiserror::Error;

/// Errors surfaced to callers of this crate, and emitted as `Event::Error`
/// where noted.
#[derive(Debug, Error)]
pub enum MrpError {
    /// Socket read/write failure. Fatal to the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame or unknown oneof. Logged, frame dropped, connection
    /// continues.
    #[error("decode error: {0}")]
    Decode(String),

    /// SRP proof mismatch, signature verification failure, or AEAD tag
    /// mismatch. Aborts the in-flight pairing/verify and closes the
    /// connection.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Unexpected sequence number or state in a pairing/verify exchange.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No matching response arrived within the deadline.
    #[error("request timed out")]
    Timeout,

    /// Caller misuse: `send_key_command` before `open` resolves, an unknown
    /// key name, or a client invoked after the reactor has shut down.
    #[error("usage error: {0}")]
    Usage(String),

    /// The connection was closed while a request was outstanding.
    #[error("connection closed")]
    Closed,

    /// Pairing-layer error, converted at the boundary. SRP proof mismatches
    /// and signature verification failures are routed to `Auth` instead;
    /// see the manual `From` impl below.
    #[error(transparent)]
    Pairing(PairingError),

    /// Crypto-layer error, converted at the boundary. AEAD decryption
    /// failures are routed to `Auth` instead; see the manual `From` impl
    /// below.
    #[error(transparent)]
    Crypto(CryptoError),

    /// TLV8 decode/encode error, converted at the boundary.
    #[error(transparent)]
    Tlv(#[from] TlvError),
}

impl From<PairingError> for MrpError {
    /// SRP proof mismatch and signature verification failure are both
    /// authentication failures in the sense of §7's `AuthError`, matching
    /// the `Auth` variant's documented contract; every other pairing-state
    /// error stays `Pairing`.
    fn from(e: PairingError) -> Self {
        match e {
            PairingError::SrpVerificationFailed | PairingError::SignatureVerificationFailed => {
                Self::Auth(e.to_string())
            }
            other => Self::Pairing(other),
        }
    }
}

impl From<CryptoError> for MrpError {
    /// A `DecryptionFailed` is an AEAD tag mismatch, the third case named
    /// in `Auth`'s doc comment; everything else stays `Crypto`.
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::DecryptionFailed(_) => Self::Auth(e.to_string()),
            other => Self::Crypto(other),
        }
    }
}

impl Clone for MrpError {
    /// Pending-callback rejection and event fan-out both need to hand a copy
    /// of the terminal error to multiple consumers; the underlying error
    /// types here are not `Clone` (`io::Error`, `thiserror` sources), so we
    /// collapse to the display string.
    fn clone(&self) -> Self {
        match self {
            Self::Timeout => Self::Timeout,
            Self::Closed => Self::Closed,
            other => Self::Protocol(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srp_and_signature_failures_surface_as_auth() {
        assert!(matches!(
            MrpError::from(PairingError::SrpVerificationFailed),
            MrpError::Auth(_)
        ));
        assert!(matches!(
            MrpError::from(PairingError::SignatureVerificationFailed),
            MrpError::Auth(_)
        ));
    }

    #[test]
    fn other_pairing_errors_stay_pairing() {
        assert!(matches!(
            MrpError::from(PairingError::DeviceError { code: 1 }),
            MrpError::Pairing(_)
        ));
    }

    #[test]
    fn decryption_failure_surfaces_as_auth() {
        assert!(matches!(
            MrpError::from(CryptoError::DecryptionFailed("tag mismatch".to_string())),
            MrpError::Auth(_)
        ));
    }

    #[test]
    fn other_crypto_errors_stay_crypto() {
        assert!(matches!(
            MrpError::from(CryptoError::InvalidPublicKey),
            MrpError::Crypto(_)
        ));
    }
}
