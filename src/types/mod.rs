//! Value types exposed by this crate's public API.

mod credentials;
mod events;
mod key;
mod now_playing;
mod service;

pub use credentials::{Credentials, CredentialsParseError};
pub use events::Event;
pub use key::{Key, hid_event_bytes};
pub use now_playing::{NowPlayingInfo, SupportedCommand};
pub use service::{ServiceDescriptor, TxtRecord};
