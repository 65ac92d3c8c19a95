//! Pair-Verify: fast X25519/Ed25519 session establishment using
//! `Credentials` from a prior `PairingSm` run. No PIN required.

use super::tlv::{TlvDecoder, TlvEncoder, TlvType};
use super::{PairingError, SessionKeys, VerifyState, VerifyStepResult};
use crate::protocol::crypto::{
    ChaCha20Poly1305Cipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, HkdfSha512, Nonce,
    X25519KeyPair, X25519PublicKey,
};
use crate::types::Credentials;

/// Drives the three-round X25519/Ed25519 exchange (M1..M3) that re-derives
/// per-connection session keys from long-term `Credentials`.
pub struct VerifierSm {
    state: VerifyState,
    credentials: Credentials,
    device_ltpk: Ed25519PublicKey,
    ephemeral_keypair: X25519KeyPair,
    final_keys: Option<SessionKeys>,
}

impl VerifierSm {
    /// # Errors
    ///
    /// Returns an error if the stored device public key is malformed.
    pub fn new(credentials: Credentials) -> Result<Self, PairingError> {
        let device_ltpk = Ed25519PublicKey::from_bytes(&credentials.remote_public_key)?;

        Ok(Self {
            state: VerifyState::Init,
            credentials,
            device_ltpk,
            ephemeral_keypair: X25519KeyPair::generate(),
            final_keys: None,
        })
    }

    /// Current state, mainly useful for logging.
    #[must_use]
    pub fn state(&self) -> VerifyState {
        self.state
    }

    fn start(&mut self) -> Result<Vec<u8>, PairingError> {
        if self.state != VerifyState::Init {
            return Err(PairingError::InvalidState {
                expected: "Init".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        let m1 = TlvEncoder::new()
            .add_state(1)
            .add(
                TlvType::PublicKey,
                self.ephemeral_keypair.public_key().as_bytes(),
            )
            .build();

        self.state = VerifyState::AwaitM2;
        Ok(m1)
    }

    fn process_m2(&mut self, data: &[u8]) -> Result<VerifyStepResult, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        if let Some(error) = tlv.get_error() {
            self.state = VerifyState::Failed;
            return Err(PairingError::DeviceError { code: error });
        }

        let state = tlv.get_state()?;
        if state != 2 {
            return Err(PairingError::InvalidState {
                expected: "2".to_string(),
                actual: state.to_string(),
            });
        }

        let device_ephemeral_bytes = tlv.get_required(TlvType::PublicKey)?;
        let encrypted_data = tlv.get_required(TlvType::EncryptedData)?;
        let device_ephemeral = X25519PublicKey::from_bytes(device_ephemeral_bytes)?;

        let shared = self.ephemeral_keypair.diffie_hellman(&device_ephemeral);

        let exchange_hkdf = HkdfSha512::new(Some(b"Pair-Verify-Encrypt-Salt"), shared.as_bytes());
        let exchange_key = exchange_hkdf.expand_fixed::<32>(b"Pair-Verify-Encrypt-Info")?;
        let cipher = ChaCha20Poly1305Cipher::new(&exchange_key)?;

        let m2_nonce = pairing_nonce(b"PV-Msg02")?;
        let decrypted = cipher.decrypt(&m2_nonce, encrypted_data)?;

        let device_tlv = TlvDecoder::decode(&decrypted)?;
        let device_identifier = device_tlv.get_required(TlvType::Identifier)?;
        let device_signature = device_tlv.get_required(TlvType::Signature)?;

        if device_identifier != self.credentials.remote_peer_id.as_bytes() {
            self.state = VerifyState::Failed;
            return Err(PairingError::UnknownPeer(
                String::from_utf8_lossy(device_identifier).into_owned(),
            ));
        }

        let mut verify_data = Vec::with_capacity(
            device_ephemeral_bytes.len()
                + device_identifier.len()
                + self.ephemeral_keypair.public_key().as_bytes().len(),
        );
        verify_data.extend_from_slice(device_ephemeral_bytes);
        verify_data.extend_from_slice(device_identifier);
        verify_data.extend_from_slice(self.ephemeral_keypair.public_key().as_bytes());

        let signature = Ed25519Signature::from_bytes(device_signature)?;
        self.device_ltpk
            .verify(&verify_data, &signature)
            .map_err(|_| PairingError::SignatureVerificationFailed)?;

        let mut sign_data = Vec::with_capacity(verify_data.len());
        sign_data.extend_from_slice(self.ephemeral_keypair.public_key().as_bytes());
        sign_data.extend_from_slice(self.credentials.pairing_id.as_bytes());
        sign_data.extend_from_slice(device_ephemeral_bytes);

        let our_keypair = Ed25519KeyPair::from_bytes(&self.credentials.local_private_key)?;
        let our_signature = our_keypair.sign(&sign_data);

        let inner_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, self.credentials.pairing_id.as_bytes())
            .add(TlvType::Signature, &our_signature.to_bytes())
            .build();

        let m3_nonce = pairing_nonce(b"PV-Msg03")?;
        let encrypted = cipher.encrypt(&m3_nonce, &inner_tlv)?;

        let m3 = TlvEncoder::new()
            .add_state(3)
            .add(TlvType::EncryptedData, &encrypted)
            .build();

        // Session keys come from the raw ECDH output, independent of the
        // exchange key used to protect M2/M3 themselves.
        let session_hkdf = HkdfSha512::new(Some(b"MRP-Salt"), shared.as_bytes());
        let write_key = session_hkdf.expand_fixed::<32>(b"ClientEncrypt-main")?;
        let read_key = session_hkdf.expand_fixed::<32>(b"ServerEncrypt-main")?;

        self.final_keys = Some(SessionKeys {
            write_key,
            read_key,
        });
        self.state = VerifyState::Complete;

        Ok(VerifyStepResult::SendData(m3))
    }

    /// Drive the state machine with the device's most recent reply. Pass
    /// `None` for the very first call (to obtain M1) and once more after
    /// M3 has been sent, to retrieve the derived session keys.
    pub fn step(&mut self, data: Option<&[u8]>) -> Result<VerifyStepResult, PairingError> {
        match self.state {
            VerifyState::Init => {
                let m1 = self.start()?;
                Ok(VerifyStepResult::SendData(m1))
            }
            VerifyState::AwaitM2 => {
                let data = data.ok_or(PairingError::InvalidState {
                    expected: "data".to_string(),
                    actual: "none".to_string(),
                })?;
                self.process_m2(data)
            }
            VerifyState::Complete => Ok(VerifyStepResult::Complete(
                self.final_keys
                    .clone()
                    .expect("final_keys set alongside state transition to Complete"),
            )),
            VerifyState::Failed => Err(PairingError::InvalidState {
                expected: "not failed".to_string(),
                actual: "Failed".to_string(),
            }),
        }
    }
}

/// Left-pads an 8-byte ASCII pairing-message tag into the 12-byte nonce
/// these exchanges use, matching the counter-then-tag layout observed on
/// the wire.
fn pairing_nonce(tag: &[u8; 8]) -> Result<Nonce, crate::protocol::crypto::CryptoError> {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(tag);
    Nonce::from_bytes(&bytes)
}
