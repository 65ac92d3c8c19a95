//! Public façade: lifecycle, pairing/verify orchestration, key commands,
//! and now-playing polling on top of a [`Transport`].

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::MrpError;
use crate::codec::{
    ClientUpdatesConfigMessage, ConnectionState, CryptoPairingMessage, DeviceInfoMessage, Message,
    MessageBody, NowPlayingInfoProto, PlaybackQueueRequestMessage, SendHidEventMessage,
    SetConnectionStateMessage, SetStateMessage, SupportedCommandProto,
};
use crate::config::ClientConfig;
use crate::protocol::pairing::{PairingSm, PairingStepResult, VerifierSm, VerifyStepResult};
use crate::transport::Transport;
use crate::types::{Credentials, Event, Key, NowPlayingInfo, ServiceDescriptor, SupportedCommand, hid_event_bytes};

/// Result of [`Device::open`]: either a ready connection, or one waiting on
/// the PIN shown on the device's screen.
pub enum OpenOutcome {
    Ready(Device),
    NeedsPin(PendingPairing),
}

/// An in-progress pair-setup exchange, parked after M2 until the caller
/// supplies the PIN the device is displaying.
pub struct PendingPairing {
    transport: Transport,
    config: ClientConfig,
    sm: PairingSm,
}

impl PendingPairing {
    /// Continue pairing with the PIN shown on the device, running it through
    /// to completion and then through `VerifierSm`.
    pub async fn submit_pin(mut self, pin: &str) -> Result<Device, MrpError> {
        let m3 = match self.sm.submit_pin(pin)? {
            PairingStepResult::SendData(bytes) => bytes,
            other => return Err(unexpected_pairing_result(&other)),
        };
        let payload = self.round_trip(m3).await?;

        let m5 = match self.sm.step(Some(&payload))? {
            PairingStepResult::SendData(bytes) => bytes,
            other => return Err(unexpected_pairing_result(&other)),
        };
        let payload = self.round_trip(m5).await?;

        let credentials = match self.sm.step(Some(&payload))? {
            PairingStepResult::Complete(credentials) => credentials,
            other => return Err(unexpected_pairing_result(&other)),
        };

        Device::finish_with_credentials(self.transport, self.config, credentials).await
    }

    async fn round_trip(&self, pairing_data: Vec<u8>) -> Result<Vec<u8>, MrpError> {
        let response = self
            .transport
            .send(
                Message::crypto_pairing(
                    None,
                    CryptoPairingMessage {
                        pairing_data: Some(pairing_data),
                        ..Default::default()
                    },
                ),
                0,
                self.config.request_timeout,
            )
            .await?;
        pairing_payload(&response)
    }
}

fn unexpected_pairing_result(result: &PairingStepResult) -> MrpError {
    MrpError::Protocol(format!("unexpected pairing step result: {result:?}"))
}

fn pairing_payload(message: &Message) -> Result<Vec<u8>, MrpError> {
    match &message.body {
        MessageBody::CryptoPairing(m) => m.pairing_data.clone().ok_or_else(|| {
            MrpError::Decode("cryptoPairingMessage carried no pairingData".to_string())
        }),
        other => Err(MrpError::Decode(format!(
            "expected a cryptoPairingMessage, got {other:?}"
        ))),
    }
}

/// A paired, verified connection to one Apple TV.
pub struct Device {
    transport: Transport,
    credentials: Credentials,
    events_tx: broadcast::Sender<Event>,
    poll_handle: JoinHandle<()>,
}

impl Device {
    /// Connect, send the introduction, and either pair or verify depending
    /// on whether `credentials` were supplied.
    pub async fn open(
        descriptor: &ServiceDescriptor,
        credentials: Option<Credentials>,
        config: ClientConfig,
    ) -> Result<OpenOutcome, MrpError> {
        let address = descriptor
            .preferred_address(config.prefer_second_address)
            .ok_or_else(|| MrpError::Usage("service descriptor has no addresses".to_string()))?;
        tracing::info!(name = %descriptor.display_name, %address, "opening device connection");
        let transport =
            Transport::connect(SocketAddr::new(address, descriptor.port), config.connect_timeout)
                .await?;

        let pairing_id = config
            .pairing_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        transport
            .send(introduction(&pairing_id), 0, config.request_timeout)
            .await?;

        match credentials {
            Some(credentials) => {
                tracing::debug!("stored credentials present, running verify");
                Self::finish_with_credentials(transport, config, credentials)
                    .await
                    .map(OpenOutcome::Ready)
            }
            None => {
                tracing::debug!("no stored credentials, starting pair-setup");
                let mut sm = PairingSm::new(pairing_id);
                let m1 = match sm.step(None)? {
                    PairingStepResult::SendData(bytes) => bytes,
                    other => return Err(unexpected_pairing_result(&other)),
                };
                let response = transport
                    .send(
                        Message::crypto_pairing(
                            None,
                            CryptoPairingMessage {
                                pairing_data: Some(m1),
                                ..Default::default()
                            },
                        ),
                        config.request_timeout,
                    )
                    .await?;
                let payload = pairing_payload(&response)?;

                match sm.step(Some(&payload))? {
                    PairingStepResult::NeedPin => {}
                    other => return Err(unexpected_pairing_result(&other)),
                }

                tracing::info!("pairing requires the PIN shown on the device");
                Ok(OpenOutcome::NeedsPin(PendingPairing { transport, config, sm }))
            }
        }
    }

    async fn finish_with_credentials(
        transport: Transport,
        config: ClientConfig,
        credentials: Credentials,
    ) -> Result<Self, MrpError> {
        let mut verifier = VerifierSm::new(credentials.clone())?;

        let m1 = match verifier.step(None)? {
            VerifyStepResult::SendData(bytes) => bytes,
            VerifyStepResult::Complete(_) => {
                return Err(MrpError::Protocol("verify completed before M1 was sent".to_string()));
            }
        };
        let response = transport
            .send(
                Message::crypto_pairing(
                    None,
                    CryptoPairingMessage {
                        pairing_data: Some(m1),
                        ..Default::default()
                    },
                ),
                0,
                config.request_timeout,
            )
            .await?;
        let payload = pairing_payload(&response)?;

        let m3 = match verifier.step(Some(&payload))? {
            VerifyStepResult::SendData(bytes) => bytes,
            VerifyStepResult::Complete(_) => {
                return Err(MrpError::Protocol("verify completed before M3 was sent".to_string()));
            }
        };
        transport
            .send_fire_and_forget(Message::crypto_pairing(
                None,
                CryptoPairingMessage {
                    pairing_data: Some(m3),
                    ..Default::default()
                },
            ))
            .await?;

        let session_keys = match verifier.step(None)? {
            VerifyStepResult::Complete(keys) => keys,
            VerifyStepResult::SendData(_) => {
                return Err(MrpError::Protocol("verify did not complete after M3".to_string()));
            }
        };
        transport.activate_encryption(session_keys).await?;

        transport
            .send_fire_and_forget(Message::set_connection_state(
                None,
                SetConnectionStateMessage {
                    state: Some(ConnectionState::Connected as i32),
                },
            ))
            .await?;
        transport
            .send_fire_and_forget(Message::client_updates_config(
                None,
                ClientUpdatesConfigMessage {
                    now_playing_updates: Some(true),
                    artwork_updates: Some(true),
                    keyboard_updates: Some(true),
                    volume_updates: Some(true),
                    output_device_updates: Some(false),
                },
            ))
            .await?;

        tracing::info!("verify complete, session encryption active");

        let (events_tx, _) = broadcast::channel(64);
        tokio::spawn(forward_events(transport.subscribe(), events_tx.clone()));
        let poll_handle = spawn_polling(
            transport.clone(),
            events_tx.clone(),
            config.now_playing_poll_interval,
        );

        Ok(Self {
            transport,
            credentials,
            events_tx,
            poll_handle,
        })
    }

    /// The long-term credentials this connection authenticated with.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Subscribe to this device's event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Press and release a remote-control key, inserting `key`'s hold delay
    /// (if any) between the two frames.
    pub async fn send_key(&self, key: Key) -> Result<(), MrpError> {
        tracing::debug!(?key, "sending key press");
        let (page, usage) = key.usage();
        self.send_hid_event(page, usage, true).await?;
        if let Some(delay) = key.hold_delay() {
            tokio::time::sleep(delay).await;
        }
        self.send_hid_event(page, usage, false).await
    }

    async fn send_hid_event(&self, page: u16, usage: u16, down: bool) -> Result<(), MrpError> {
        let hid_event_data = hid_event_bytes(page, usage, down).to_vec();
        self.transport
            .send_fire_and_forget(Message::send_hid_event(
                None,
                SendHidEventMessage {
                    hid_event_data: Some(hid_event_data),
                },
            ))
            .await
    }

    /// Close the connection: stops the polling task and the reactor.
    pub async fn close(self) {
        tracing::info!("closing device connection");
        self.poll_handle.abort();
        self.transport.close().await;
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.poll_handle.abort();
    }
}

fn introduction(pairing_id: &str) -> Message {
    Message::device_info(
        None,
        DeviceInfoMessage {
            unique_identifier: Some(pairing_id.to_string()),
            name: Some("mrp-client".to_string()),
            localized_model_name: Some("iPhone".to_string()),
            protocol_version: Some("1".to_string()),
            supports_system_pairing: Some(true),
            allows_pairing: Some(true),
            supports_acl: Some(true),
            supports_shared_queue: Some(true),
            shared_queue_version: Some(1),
            supports_extended_motion: Some(true),
            ..Default::default()
        },
    )
}

async fn forward_events(mut transport_events: broadcast::Receiver<Event>, events_tx: broadcast::Sender<Event>) {
    loop {
        match transport_events.recv().await {
            Ok(event) => {
                if let Event::Message(message) = &event {
                    if let MessageBody::SetState(state) = &message.body {
                        dispatch_set_state(state, &events_tx);
                    }
                }
                let _ = events_tx.send(event);
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn dispatch_set_state(state: &SetStateMessage, events_tx: &broadcast::Sender<Event>) {
    if let Some(info) = &state.now_playing_info {
        let now_playing = if now_playing_is_empty(info) {
            None
        } else {
            Some(convert_now_playing(info))
        };
        let _ = events_tx.send(Event::NowPlaying(now_playing));
    } else {
        let _ = events_tx.send(Event::NowPlaying(None));
    }
    if !state.supported_commands.is_empty() {
        let _ = events_tx.send(Event::SupportedCommands(convert_supported_commands(
            &state.supported_commands,
        )));
    }
    if let Some(queue) = &state.playback_queue {
        let _ = events_tx.send(Event::PlaybackQueue(queue.clone()));
    }
}

fn now_playing_is_empty(info: &NowPlayingInfoProto) -> bool {
    info.title.is_none()
        && info.artist.is_none()
        && info.album.is_none()
        && info.duration.is_none()
        && info.elapsed_time.is_none()
        && info.playback_rate.is_none()
        && info.artwork_data.is_none()
}

fn convert_now_playing(info: &NowPlayingInfoProto) -> NowPlayingInfo {
    NowPlayingInfo {
        title: info.title.clone(),
        artist: info.artist.clone(),
        album: info.album.clone(),
        duration: info.duration,
        elapsed_time: info.elapsed_time,
        playback_rate: info.playback_rate,
        artwork_data: info.artwork_data.clone(),
    }
}

fn convert_supported_commands(commands: &[SupportedCommandProto]) -> Vec<SupportedCommand> {
    commands
        .iter()
        .map(|c| SupportedCommand {
            command: c.command.unwrap_or_default(),
            enabled: c.enabled.unwrap_or_default(),
            can_scrub: c.can_scrub.unwrap_or_default(),
        })
        .collect()
}

/// Poll now-playing state every `interval` while at least one subscriber is
/// listening. `events_tx.receiver_count()` stands in for per-topic
/// subscriber bookkeeping: this crate only exposes one combined event
/// stream, so "any subscriber" is the only signal available.
fn spawn_polling(
    transport: Transport,
    events_tx: broadcast::Sender<Event>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if events_tx.receiver_count() == 0 {
                tracing::trace!("skipping now-playing poll, no subscribers");
                continue;
            }
            let request = PlaybackQueueRequestMessage {
                location: Some(0),
                length: Some(100),
                artwork_width: Some(-1),
                artwork_height: Some(368),
                request_id: Some(Uuid::new_v4().to_string()),
            };
            if transport
                .send_fire_and_forget(Message::playback_queue_request(None, request))
                .await
                .is_err()
            {
                return;
            }
        }
    })
}
