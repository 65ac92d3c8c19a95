//! End-to-end check of the verify handshake and encrypted key injection
//! against a hand-built mock device, exercising the same primitives
//! `VerifierSm` uses so a captured trace would look identical.

use mrp_client::codec::{self, CryptoPairingMessage, DeviceInfoMessage, Message, MessageBody};
use mrp_client::protocol::crypto::{
    ChaCha20Poly1305Cipher, Ed25519KeyPair, Ed25519Signature, HkdfSha512, Nonce, X25519KeyPair,
    X25519PublicKey,
};
use mrp_client::protocol::pairing::tlv::{TlvDecoder, TlvEncoder, TlvType};
use mrp_client::{ClientConfig, Credentials, Device, Key, OpenOutcome, ServiceDescriptor, TxtRecord};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn pairing_nonce(tag: &[u8; 8]) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(tag);
    Nonce::from_bytes(&bytes).unwrap()
}

fn descriptor(port: u16) -> ServiceDescriptor {
    ServiceDescriptor {
        display_name: "Mock Apple TV".to_string(),
        addresses: vec!["127.0.0.1".parse().unwrap()],
        port,
        txt: TxtRecord {
            name: "Mock Apple TV".to_string(),
            unique_identifier: "mock-device".to_string(),
        },
    }
}

/// The device side of the wire: plaintext frames until `activate`, then
/// ChaCha20-Poly1305 frames keyed the way `VerifierSm` derives them.
struct MockDevice {
    socket: TcpStream,
    decoder: codec::FrameDecoder,
}

impl MockDevice {
    async fn read_message(&mut self) -> Message {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(payload) = self.decoder.next_frame().unwrap() {
                return Message::decode(&payload).unwrap();
            }
            let n = self.socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed the connection mid-read");
            self.decoder.extend(&buf[..n]);
        }
    }

    async fn read_encrypted(&mut self, cipher: &ChaCha20Poly1305Cipher, counter: u64) -> Message {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(payload) = self.decoder.next_frame().unwrap() {
                let plaintext = cipher.decrypt(&Nonce::from_counter(counter), &payload).unwrap();
                return Message::decode(&plaintext).unwrap();
            }
            let n = self.socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "client closed the connection mid-read");
            self.decoder.extend(&buf[..n]);
        }
    }

    async fn write_message(&mut self, message: &Message) {
        let frame = codec::encode_frame(&message.encode().unwrap());
        self.socket.write_all(&frame).await.unwrap();
    }
}

#[tokio::test]
async fn verify_completes_and_key_press_frames_carry_the_right_usage_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let client_signing_keypair = Ed25519KeyPair::generate();
    let client_ltpk = client_signing_keypair.public_key();
    let device_signing_keypair = Ed25519KeyPair::generate();

    let credentials = Credentials {
        pairing_id: "test-client".to_string(),
        local_private_key: client_signing_keypair.secret_bytes(),
        remote_peer_id: "mock-device".to_string(),
        remote_public_key: *device_signing_keypair.public_key().as_bytes(),
    };

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut device = MockDevice {
            socket,
            decoder: codec::FrameDecoder::new(),
        };

        // Plaintext introduction.
        let intro = device.read_message().await;
        let intro_identifier = intro.identifier;
        match &intro.body {
            MessageBody::DeviceInfo(_) => {}
            other => panic!("expected a deviceInfoMessage, got {other:?}"),
        }
        device
            .write_message(&Message::device_info(
                intro_identifier,
                DeviceInfoMessage {
                    unique_identifier: Some("mock-device".to_string()),
                    name: Some("Mock Apple TV".to_string()),
                    ..Default::default()
                },
            ))
            .await;

        // Verify M1: client's ephemeral X25519 public key.
        let m1 = device.read_message().await;
        let m1_identifier = m1.identifier;
        let m1_payload = match &m1.body {
            MessageBody::CryptoPairing(m) => m.pairing_data.clone().unwrap(),
            other => panic!("expected a cryptoPairingMessage, got {other:?}"),
        };
        let m1_tlv = TlvDecoder::decode(&m1_payload).unwrap();
        assert_eq!(m1_tlv.get_state().unwrap(), 1);
        let client_eph_bytes = m1_tlv.get_required(TlvType::PublicKey).unwrap().to_vec();
        let client_eph = X25519PublicKey::from_bytes(&client_eph_bytes).unwrap();

        // Verify M2: our ephemeral key plus an encrypted, signed identity.
        let device_eph_keypair = X25519KeyPair::generate();
        let device_eph_pub = *device_eph_keypair.public_key().as_bytes();
        let shared = device_eph_keypair.diffie_hellman(&client_eph);

        let exchange_hkdf = HkdfSha512::new(Some(b"Pair-Verify-Encrypt-Salt"), shared.as_bytes());
        let exchange_key = exchange_hkdf.expand_fixed::<32>(b"Pair-Verify-Encrypt-Info").unwrap();
        let exchange_cipher = ChaCha20Poly1305Cipher::new(&exchange_key).unwrap();

        let mut sign_data = Vec::new();
        sign_data.extend_from_slice(&device_eph_pub);
        sign_data.extend_from_slice(b"mock-device");
        sign_data.extend_from_slice(&client_eph_bytes);
        let device_signature = device_signing_keypair.sign(&sign_data);

        let device_tlv = TlvEncoder::new()
            .add(TlvType::Identifier, b"mock-device")
            .add(TlvType::Signature, &device_signature.to_bytes())
            .build();
        let encrypted_m2 = exchange_cipher
            .encrypt(&pairing_nonce(b"PV-Msg02"), &device_tlv)
            .unwrap();

        let m2_payload = TlvEncoder::new()
            .add_state(2)
            .add(TlvType::PublicKey, &device_eph_pub)
            .add(TlvType::EncryptedData, &encrypted_m2)
            .build();
        device
            .write_message(&Message::crypto_pairing(
                m1_identifier,
                CryptoPairingMessage {
                    pairing_data: Some(m2_payload),
                    ..Default::default()
                },
            ))
            .await;

        // Verify M3: client's encrypted, signed identity. Sent fire-and-forget,
        // so it carries no identifier to correlate against.
        let m3 = device.read_message().await;
        let m3_payload = match &m3.body {
            MessageBody::CryptoPairing(m) => m.pairing_data.clone().unwrap(),
            other => panic!("expected a cryptoPairingMessage, got {other:?}"),
        };
        let m3_tlv = TlvDecoder::decode(&m3_payload).unwrap();
        assert_eq!(m3_tlv.get_state().unwrap(), 3);
        let encrypted_m3 = m3_tlv.get_required(TlvType::EncryptedData).unwrap();
        let decrypted_m3 = exchange_cipher
            .decrypt(&pairing_nonce(b"PV-Msg03"), encrypted_m3)
            .unwrap();
        let inner_tlv = TlvDecoder::decode(&decrypted_m3).unwrap();
        assert_eq!(inner_tlv.get_required(TlvType::Identifier).unwrap(), b"test-client");
        let client_signature =
            Ed25519Signature::from_bytes(inner_tlv.get_required(TlvType::Signature).unwrap()).unwrap();

        let mut verify_data = Vec::new();
        verify_data.extend_from_slice(&client_eph_bytes);
        verify_data.extend_from_slice(b"test-client");
        verify_data.extend_from_slice(&device_eph_pub);
        client_ltpk.verify(&verify_data, &client_signature).unwrap();

        // Session keys, derived the same way the client does but read/write
        // swapped: what the client writes, we read.
        let session_hkdf = HkdfSha512::new(Some(b"MRP-Salt"), shared.as_bytes());
        let client_write_key = session_hkdf.expand_fixed::<32>(b"ClientEncrypt-main").unwrap();
        let device_read_cipher = ChaCha20Poly1305Cipher::new(&client_write_key).unwrap();

        // Frames 0 and 1 are the post-verify connection-state announcements.
        let state_frame = device.read_encrypted(&device_read_cipher, 0).await;
        assert!(matches!(state_frame.body, MessageBody::SetConnectionState(_)));
        let config_frame = device.read_encrypted(&device_read_cipher, 1).await;
        assert!(matches!(config_frame.body, MessageBody::ClientUpdatesConfig(_)));

        // Frames 2 and 3: the Menu key's down and up HID events.
        let down = device.read_encrypted(&device_read_cipher, 2).await;
        let up = device.read_encrypted(&device_read_cipher, 3).await;

        let down_bytes = match &down.body {
            MessageBody::SendHidEvent(m) => m.hid_event_data.clone().unwrap(),
            other => panic!("expected a sendHIDEventMessage, got {other:?}"),
        };
        let up_bytes = match &up.body {
            MessageBody::SendHidEvent(m) => m.hid_event_data.clone().unwrap(),
            other => panic!("expected a sendHIDEventMessage, got {other:?}"),
        };

        assert_eq!(&down_bytes[30..36], &[0x01, 0x00, 0x86, 0x00, 0x01, 0x00]);
        assert_eq!(&up_bytes[30..36], &[0x01, 0x00, 0x86, 0x00, 0x00, 0x00]);
    });

    let device = match Device::open(&descriptor(addr.port()), Some(credentials), ClientConfig::default())
        .await
        .unwrap()
    {
        OpenOutcome::Ready(device) => device,
        OpenOutcome::NeedsPin(_) => panic!("credentials were supplied; verify alone should suffice"),
    };

    device.send_key(Key::Menu).await.unwrap();

    server.await.unwrap();
}
