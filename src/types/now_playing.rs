/// Now-playing metadata decoded from a `SetStateMessage`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NowPlayingInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Total duration, in seconds.
    pub duration: Option<f64>,
    /// Elapsed playback time, in seconds, as of `timestamp`.
    pub elapsed_time: Option<f64>,
    /// Playback rate; `0.0` while paused, `1.0` at normal speed.
    pub playback_rate: Option<f64>,
    /// Artwork bytes, when the device included them inline.
    pub artwork_data: Option<Vec<u8>>,
}

/// One entry of the device's advertised command set, decoded from a
/// `SetStateMessage`'s `supportedCommands` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedCommand {
    /// Command identifier, as advertised by the device.
    pub command: i32,
    /// Whether the command can currently be issued.
    pub enabled: bool,
    /// Whether the command supports scrubbing (seek-while-dragging).
    pub can_scrub: bool,
}
