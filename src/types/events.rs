use crate::MrpError;
use crate::codec::Message;
use crate::types::{NowPlayingInfo, SupportedCommand};

/// Observable events emitted by a [`crate::Device`].
#[derive(Debug, Clone)]
pub enum Event {
    /// The TCP connection was established.
    Connect,
    /// The connection closed, whether by request or due to a fatal error.
    Close,
    /// A recoverable or fatal error occurred. Fatal errors are always
    /// followed by a `Close`.
    Error(MrpError),
    /// Wire-level diagnostic detail, useful when tracing a live session.
    Debug(String),
    /// Every decoded inbound message, in arrival order, in addition to any
    /// pending-callback resolution it also triggers.
    Message(Message),
    /// Decoded now-playing metadata; `None` when the device reports nothing
    /// is playing.
    NowPlaying(Option<NowPlayingInfo>),
    /// The device's current command availability.
    SupportedCommands(Vec<SupportedCommand>),
    /// Opaque playback-queue bytes.
    PlaybackQueue(Vec<u8>),
}
