//! Remote-control key commands and their HID-event wire encoding.

use std::time::Duration;

/// A symbolic remote-control key, mapped to an (usage page, usage id) pair
/// sent inside `SendHIDEventMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Menu,
    Select,
    Suspend,
    WakeUp,
    Play,
    Pause,
    Next,
    Previous,
    TopMenu,
    Home,
    /// `Home`, held for one second rather than tapped.
    HomeHold,
    VolumeUp,
    VolumeDown,
}

impl Key {
    /// The (usage page, usage id) pair a device expects for this key.
    #[must_use]
    pub fn usage(self) -> (u16, u16) {
        match self {
            Self::Up => (1, 0x8C),
            Self::Down => (1, 0x8D),
            Self::Left => (1, 0x8B),
            Self::Right => (1, 0x8A),
            Self::Menu => (1, 0x86),
            Self::Select => (1, 0x89),
            Self::Suspend => (1, 0x82),
            Self::WakeUp => (1, 0x83),
            Self::Play => (12, 0xB0),
            Self::Pause => (12, 0xB1),
            Self::Next => (12, 0xB5),
            Self::Previous => (12, 0xB6),
            Self::TopMenu => (12, 0x60),
            Self::Home | Self::HomeHold => (12, 0x40),
            Self::VolumeUp => (12, 0xE9),
            Self::VolumeDown => (12, 0xEA),
        }
    }

    /// Delay to wait between the down and up frames. One second for
    /// `HomeHold`, none for a regular tap.
    #[must_use]
    pub fn hold_delay(self) -> Option<Duration> {
        matches!(self, Self::HomeHold).then(|| Duration::from_secs(1))
    }
}

/// Fixed 8-byte timestamp stub observed in live captures, prepended to
/// every HID event blob regardless of key or direction.
const TIMESTAMP_STUB: [u8; 8] = [0x43, 0x89, 0x22, 0xCF, 0x08, 0x02, 0x00, 0x00];

/// Build the fixed 44-byte `hidEventData` blob for one press or release.
///
/// The `(usagePage, usageId, down)` triple is three little-endian `u16`s
/// spliced at bytes `[30..36]`; everything else is constant padding
/// verified against live captures.
#[must_use]
pub fn hid_event_bytes(usage_page: u16, usage_id: u16, down: bool) -> [u8; 44] {
    let mut blob = [0u8; 44];
    blob[0..8].copy_from_slice(&TIMESTAMP_STUB);
    blob[30..32].copy_from_slice(&usage_page.to_le_bytes());
    blob[32..34].copy_from_slice(&usage_id.to_le_bytes());
    blob[34..36].copy_from_slice(&u16::from(down).to_le_bytes());
    blob
}
