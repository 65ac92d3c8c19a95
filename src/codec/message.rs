//! The `ProtocolMessage` envelope: decoded payload plus request/response
//! correlation identifier.

use prost::Message as _;
use uuid::Uuid;

use crate::MrpError;
use crate::codec::proto;

/// One decoded `ProtocolMessage`.
#[derive(Debug, Clone)]
pub struct Message {
    /// Correlates a response to the request that triggered it. Events
    /// spontaneously emitted by the device carry no identifier.
    pub identifier: Option<Uuid>,
    /// Forwarded into the envelope's `priority` field. Transport does not
    /// reorder on it; outbound frames stay strictly FIFO by submission
    /// order.
    pub priority: Option<i32>,
    pub body: MessageBody,
}

/// The decoded payload of a [`Message`]. Message types this crate doesn't
/// model explicitly still arrive, as `Opaque`, rather than being rejected.
#[derive(Debug, Clone)]
pub enum MessageBody {
    DeviceInfo(proto::DeviceInfoMessage),
    SetConnectionState(proto::SetConnectionStateMessage),
    ClientUpdatesConfig(proto::ClientUpdatesConfigMessage),
    CryptoPairing(proto::CryptoPairingMessage),
    SendHidEvent(proto::SendHidEventMessage),
    SetState(proto::SetStateMessage),
    PlaybackQueueRequest(proto::PlaybackQueueRequestMessage),
    /// A recognized-but-unhandled or genuinely unknown message type. Carries
    /// the raw numeric `type` so callers can still log or branch on it.
    Opaque { type_value: i32 },
}

impl Message {
    #[must_use]
    pub fn device_info(identifier: Option<Uuid>, msg: proto::DeviceInfoMessage) -> Self {
        Self {
            identifier,
            priority: None,
            body: MessageBody::DeviceInfo(msg),
        }
    }

    #[must_use]
    pub fn crypto_pairing(identifier: Option<Uuid>, msg: proto::CryptoPairingMessage) -> Self {
        Self {
            identifier,
            priority: None,
            body: MessageBody::CryptoPairing(msg),
        }
    }

    #[must_use]
    pub fn set_connection_state(
        identifier: Option<Uuid>,
        msg: proto::SetConnectionStateMessage,
    ) -> Self {
        Self {
            identifier,
            priority: None,
            body: MessageBody::SetConnectionState(msg),
        }
    }

    #[must_use]
    pub fn client_updates_config(
        identifier: Option<Uuid>,
        msg: proto::ClientUpdatesConfigMessage,
    ) -> Self {
        Self {
            identifier,
            priority: None,
            body: MessageBody::ClientUpdatesConfig(msg),
        }
    }

    #[must_use]
    pub fn send_hid_event(identifier: Option<Uuid>, msg: proto::SendHidEventMessage) -> Self {
        Self {
            identifier,
            priority: None,
            body: MessageBody::SendHidEvent(msg),
        }
    }

    #[must_use]
    pub fn playback_queue_request(
        identifier: Option<Uuid>,
        msg: proto::PlaybackQueueRequestMessage,
    ) -> Self {
        Self {
            identifier,
            priority: None,
            body: MessageBody::PlaybackQueueRequest(msg),
        }
    }

    /// Stamp a priority onto an already-constructed message.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Encode into the plaintext bytes that go into a frame payload (prior
    /// to encryption, when session keys are active).
    pub fn encode(&self) -> Result<Vec<u8>, MrpError> {
        let mut envelope = proto::ProtocolMessage {
            r#type: self.type_value(),
            identifier: self.identifier.map(|id| id.to_string()),
            priority: self.priority,
            device_info_message: None,
            set_connection_state_message: None,
            client_updates_config_message: None,
            crypto_pairing_message: None,
            send_hid_event_message: None,
            set_state_message: None,
            playback_queue_request_message: None,
        };

        match &self.body {
            MessageBody::DeviceInfo(m) => envelope.device_info_message = Some(m.clone()),
            MessageBody::SetConnectionState(m) => {
                envelope.set_connection_state_message = Some(m.clone());
            }
            MessageBody::ClientUpdatesConfig(m) => {
                envelope.client_updates_config_message = Some(m.clone());
            }
            MessageBody::CryptoPairing(m) => envelope.crypto_pairing_message = Some(m.clone()),
            MessageBody::SendHidEvent(m) => envelope.send_hid_event_message = Some(m.clone()),
            MessageBody::SetState(m) => envelope.set_state_message = Some(m.clone()),
            MessageBody::PlaybackQueueRequest(m) => {
                envelope.playback_queue_request_message = Some(m.clone());
            }
            MessageBody::Opaque { .. } => {
                return Err(MrpError::Usage(
                    "cannot encode an opaque message this crate never constructed".to_string(),
                ));
            }
        }

        Ok(envelope.encode_to_vec())
    }

    /// Decode a plaintext frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self, MrpError> {
        let envelope = proto::ProtocolMessage::decode(payload)
            .map_err(|e| MrpError::Decode(e.to_string()))?;

        let identifier = envelope
            .identifier
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok());
        let priority = envelope.priority;

        let body = if let Some(m) = envelope.device_info_message {
            MessageBody::DeviceInfo(m)
        } else if let Some(m) = envelope.set_connection_state_message {
            MessageBody::SetConnectionState(m)
        } else if let Some(m) = envelope.client_updates_config_message {
            MessageBody::ClientUpdatesConfig(m)
        } else if let Some(m) = envelope.crypto_pairing_message {
            MessageBody::CryptoPairing(m)
        } else if let Some(m) = envelope.send_hid_event_message {
            MessageBody::SendHidEvent(m)
        } else if let Some(m) = envelope.set_state_message {
            MessageBody::SetState(m)
        } else if let Some(m) = envelope.playback_queue_request_message {
            MessageBody::PlaybackQueueRequest(m)
        } else {
            MessageBody::Opaque {
                type_value: envelope.r#type,
            }
        };

        Ok(Self {
            identifier,
            priority,
            body,
        })
    }

    fn type_value(&self) -> i32 {
        use proto::protocol_message::Type;
        match &self.body {
            MessageBody::DeviceInfo(_) => Type::DeviceInfoMessage as i32,
            MessageBody::SetConnectionState(_) => Type::SetConnectionStateMessage as i32,
            MessageBody::ClientUpdatesConfig(_) => Type::ClientUpdatesConfigMessage as i32,
            MessageBody::CryptoPairing(_) => Type::CryptoPairingMessage as i32,
            MessageBody::SendHidEvent(_) => Type::SendHidEventMessage as i32,
            MessageBody::SetState(_) => Type::SetStateMessage as i32,
            MessageBody::PlaybackQueueRequest(_) => Type::PlaybackQueueRequestMessage as i32,
            MessageBody::Opaque { type_value } => *type_value,
        }
    }
}
