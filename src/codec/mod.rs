//! Wire codec: protobuf message envelope plus varint-length-delimited
//! framing. Protobuf schema is compiled at build time by `build.rs`; this
//! crate never parses `.proto` files at runtime.

mod frame;
mod message;
mod proto;

pub use frame::{FrameDecoder, encode_frame};
pub use message::{Message, MessageBody};
pub use proto::{
    ClientUpdatesConfigMessage, ConnectionState, CryptoPairingMessage, DeviceInfoMessage,
    NowPlayingInfoProto, PlaybackQueueRequestMessage, ProtocolMessage, SendHidEventMessage,
    SetConnectionStateMessage, SetStateMessage, SupportedCommandProto,
};
