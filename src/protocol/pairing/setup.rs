//! Pair-Setup: PIN-based pairing using SRP-6a, producing long-term
//! `Credentials` for a device seen for the first time.

use super::tlv::{TlvDecoder, TlvEncoder, TlvType, errors, methods};
use super::{PairingError, PairingState, PairingStepResult};
use crate::protocol::crypto::{
    ChaCha20Poly1305Cipher, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, HkdfSha512, Nonce,
    SrpClient, SrpVerifier,
};
use crate::types::Credentials;

/// Drives the four SRP-6a pairing rounds (M1..M6) that establish a
/// long-term trust relationship with a device.
pub struct PairingSm {
    state: PairingState,
    /// Identifier this client presents to the device; persisted as part of
    /// the resulting `Credentials`.
    pairing_id: String,
    pin: Option<String>,
    username: String,
    /// Salt and server public key from M2, held until a PIN arrives.
    pending_m2: Option<(Vec<u8>, Vec<u8>)>,
    srp_client: Option<SrpClient>,
    srp_verifier: Option<SrpVerifier>,
    signing_keypair: Ed25519KeyPair,
    session_key: Option<Vec<u8>>,
}

impl PairingSm {
    /// Begin a new pairing session. `pairing_id` identifies this client to
    /// the device and is stored in the resulting `Credentials`.
    #[must_use]
    pub fn new(pairing_id: String) -> Self {
        Self {
            state: PairingState::Init,
            pairing_id,
            pin: None,
            username: "Pair-Setup".to_string(),
            pending_m2: None,
            srp_client: None,
            srp_verifier: None,
            signing_keypair: Ed25519KeyPair::generate(),
            session_key: None,
        }
    }

    /// Current state, mainly useful for logging.
    #[must_use]
    pub fn state(&self) -> PairingState {
        self.state
    }

    fn start(&mut self) -> Result<Vec<u8>, PairingError> {
        if self.state != PairingState::Init {
            return Err(PairingError::InvalidState {
                expected: "Init".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        let m1 = TlvEncoder::new()
            .add_state(1)
            .add_method(methods::PAIR_SETUP)
            .build();

        self.state = PairingState::AwaitM2;
        Ok(m1)
    }

    fn process_m2(&mut self, data: &[u8]) -> Result<PairingStepResult, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        if let Some(error) = tlv.get_error() {
            self.state = PairingState::Failed;
            return Err(PairingError::DeviceError { code: error });
        }

        let state = tlv.get_state()?;
        if state != 2 {
            return Err(PairingError::InvalidState {
                expected: "2".to_string(),
                actual: state.to_string(),
            });
        }

        let salt = tlv.get_required(TlvType::Salt)?.to_vec();
        let server_public = tlv.get_required(TlvType::PublicKey)?.to_vec();

        self.pending_m2 = Some((salt, server_public));
        self.state = PairingState::AwaitPin;
        Ok(PairingStepResult::NeedPin)
    }

    /// Supply the PIN displayed on the device. Only valid in `AwaitPin`;
    /// produces M3.
    pub fn submit_pin(&mut self, pin: &str) -> Result<PairingStepResult, PairingError> {
        if self.state != PairingState::AwaitPin {
            return Err(PairingError::InvalidState {
                expected: "AwaitPin".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        let (salt, server_public) = self.pending_m2.take().ok_or(PairingError::InvalidState {
            expected: "pending M2".to_string(),
            actual: "none".to_string(),
        })?;

        self.pin = Some(pin.to_string());

        let srp_client = SrpClient::new()?;
        let client_public = srp_client.public_key().to_vec();

        let verifier = srp_client.process_challenge(
            self.username.as_bytes(),
            pin.as_bytes(),
            &salt,
            &server_public,
        )?;

        let m3 = TlvEncoder::new()
            .add_state(3)
            .add(TlvType::PublicKey, &client_public)
            .add(TlvType::Proof, verifier.client_proof())
            .build();

        self.srp_verifier = Some(verifier);
        self.srp_client = Some(srp_client);
        self.state = PairingState::AwaitM4;

        Ok(PairingStepResult::SendData(m3))
    }

    fn process_m4(&mut self, data: &[u8]) -> Result<PairingStepResult, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        if let Some(error) = tlv.get_error() {
            self.state = PairingState::Failed;
            if error == errors::AUTHENTICATION {
                return Err(PairingError::SrpVerificationFailed);
            }
            return Err(PairingError::DeviceError { code: error });
        }

        let state = tlv.get_state()?;
        if state != 4 {
            return Err(PairingError::InvalidState {
                expected: "4".to_string(),
                actual: state.to_string(),
            });
        }

        let server_proof = tlv.get_required(TlvType::Proof)?;
        let verifier = self.srp_verifier.as_ref().ok_or(PairingError::InvalidState {
            expected: "srp_verifier".to_string(),
            actual: "none".to_string(),
        })?;

        let session_key = verifier
            .verify_server(server_proof)
            .map_err(|_| PairingError::SrpVerificationFailed)?
            .as_bytes()
            .to_vec();

        let hkdf_enc = HkdfSha512::new(Some(b"Pair-Setup-Encrypt-Salt"), &session_key);
        let encrypt_key = hkdf_enc.expand_fixed::<32>(b"Pair-Setup-Encrypt-Info")?;

        let hkdf_sign = HkdfSha512::new(Some(b"Pair-Setup-Controller-Sign-Salt"), &session_key);
        let mut sign_data = hkdf_sign.expand(b"Pair-Setup-Controller-Sign-Info", 32)?;
        sign_data.extend_from_slice(self.pairing_id.as_bytes());
        sign_data.extend_from_slice(self.signing_keypair.public_key().as_bytes());

        let signature = self.signing_keypair.sign(&sign_data);

        let signed_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, self.pairing_id.as_bytes())
            .add(
                TlvType::PublicKey,
                self.signing_keypair.public_key().as_bytes(),
            )
            .add(TlvType::Signature, &signature.to_bytes())
            .build();

        let cipher = ChaCha20Poly1305Cipher::new(&encrypt_key)?;
        let nonce = pairing_nonce(b"PS-Msg05")?;
        let encrypted = cipher.encrypt(&nonce, &signed_tlv)?;

        let m5 = TlvEncoder::new()
            .add_state(5)
            .add(TlvType::EncryptedData, &encrypted)
            .build();

        self.session_key = Some(session_key);
        self.state = PairingState::AwaitM6;

        Ok(PairingStepResult::SendData(m5))
    }

    fn process_m6(&mut self, data: &[u8]) -> Result<PairingStepResult, PairingError> {
        let tlv = TlvDecoder::decode(data)?;
        if let Some(error) = tlv.get_error() {
            self.state = PairingState::Failed;
            return Err(PairingError::DeviceError { code: error });
        }

        let state = tlv.get_state()?;
        if state != 6 {
            return Err(PairingError::InvalidState {
                expected: "6".to_string(),
                actual: state.to_string(),
            });
        }

        let encrypted = tlv.get_required(TlvType::EncryptedData)?;
        let session_key = self.session_key.as_ref().ok_or(PairingError::InvalidState {
            expected: "session_key".to_string(),
            actual: "none".to_string(),
        })?;

        let hkdf = HkdfSha512::new(Some(b"Pair-Setup-Encrypt-Salt"), session_key);
        let decrypt_key = hkdf.expand_fixed::<32>(b"Pair-Setup-Encrypt-Info")?;

        let cipher = ChaCha20Poly1305Cipher::new(&decrypt_key)?;
        let nonce = pairing_nonce(b"PS-Msg06")?;
        let decrypted = cipher.decrypt(&nonce, encrypted)?;

        let device_tlv = TlvDecoder::decode(&decrypted)?;
        let device_ltpk = device_tlv.get_required(TlvType::PublicKey)?.to_vec();
        let device_identifier = device_tlv.get_required(TlvType::Identifier)?;
        let device_signature_bytes = device_tlv.get_required(TlvType::Signature)?;

        let hkdf = HkdfSha512::new(Some(b"Pair-Setup-Accessory-Sign-Salt"), session_key);
        let accessory_key = hkdf.expand_fixed::<32>(b"Pair-Setup-Accessory-Sign-Info")?;

        let mut signed_data =
            Vec::with_capacity(accessory_key.len() + device_identifier.len() + device_ltpk.len());
        signed_data.extend_from_slice(&accessory_key);
        signed_data.extend_from_slice(device_identifier);
        signed_data.extend_from_slice(&device_ltpk);

        let public_key = Ed25519PublicKey::from_bytes(&device_ltpk)?;
        let signature = Ed25519Signature::from_bytes(device_signature_bytes)?;
        public_key
            .verify(&signed_data, &signature)
            .map_err(|_| PairingError::SignatureVerificationFailed)?;

        let remote_peer_id = String::from_utf8_lossy(device_identifier).into_owned();

        self.state = PairingState::Complete;

        Ok(PairingStepResult::Complete(Credentials {
            pairing_id: self.pairing_id.clone(),
            local_private_key: self.signing_keypair.secret_bytes(),
            remote_peer_id,
            remote_public_key: device_ltpk.try_into().map_err(|_| {
                PairingError::AuthenticationFailed(
                    "device long-term public key was not 32 bytes".to_string(),
                )
            })?,
        }))
    }

    /// Drive the state machine with the device's most recent reply. Pass
    /// `None` only for the very first call, to obtain M1.
    pub fn step(&mut self, data: Option<&[u8]>) -> Result<PairingStepResult, PairingError> {
        match self.state {
            PairingState::Init => {
                let m1 = self.start()?;
                Ok(PairingStepResult::SendData(m1))
            }
            PairingState::AwaitM2 => {
                let data = data.ok_or(PairingError::InvalidState {
                    expected: "data".to_string(),
                    actual: "none".to_string(),
                })?;
                self.process_m2(data)
            }
            PairingState::AwaitPin => Ok(PairingStepResult::NeedPin),
            PairingState::AwaitM4 => {
                let data = data.ok_or(PairingError::InvalidState {
                    expected: "data".to_string(),
                    actual: "none".to_string(),
                })?;
                self.process_m4(data)
            }
            PairingState::AwaitM6 => {
                let data = data.ok_or(PairingError::InvalidState {
                    expected: "data".to_string(),
                    actual: "none".to_string(),
                })?;
                self.process_m6(data)
            }
            PairingState::Complete => Err(PairingError::InvalidState {
                expected: "not complete".to_string(),
                actual: "Complete".to_string(),
            }),
            PairingState::Failed => Err(PairingError::InvalidState {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_init_and_produces_m1() {
        let mut sm = PairingSm::new("test-client".to_string());
        assert_eq!(sm.state(), PairingState::Init);
        match sm.step(None).unwrap() {
            PairingStepResult::SendData(m1) => {
                let tlv = TlvDecoder::decode(&m1).unwrap();
                assert_eq!(tlv.get_state().unwrap(), 1);
            }
            other => panic!("expected SendData, got {other:?}"),
        }
        assert_eq!(sm.state(), PairingState::AwaitM2);
    }

    #[test]
    fn rejects_m2_with_wrong_state() {
        let mut sm = PairingSm::new("test-client".to_string());
        sm.step(None).unwrap();
        let bad_m2 = TlvEncoder::new().add_state(9).build();
        assert!(matches!(
            sm.process_m2(&bad_m2),
            Err(PairingError::InvalidState { .. })
        ));
    }

    #[test]
    fn device_error_in_m2_fails_the_machine() {
        let mut sm = PairingSm::new("test-client".to_string());
        sm.step(None).unwrap();
        let error_m2 = TlvEncoder::new()
            .add_state(2)
            .add_byte(TlvType::Error, errors::AUTHENTICATION)
            .build();
        assert!(matches!(
            sm.process_m2(&error_m2),
            Err(PairingError::DeviceError { code }) if code == errors::AUTHENTICATION
        ));
        assert_eq!(sm.state, PairingState::Failed);
    }

    #[test]
    fn submit_pin_before_m2_is_an_error() {
        let mut sm = PairingSm::new("test-client".to_string());
        assert!(matches!(
            sm.submit_pin("1234"),
            Err(PairingError::InvalidState { .. })
        ));
    }
}
