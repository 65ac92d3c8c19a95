//! # mrp-client
//!
//! A pure Rust client for Apple's MediaRemote Protocol (MRP), the
//! proprietary remote-control protocol spoken by Apple TV.
//!
//! ## Features
//!
//! - SRP-6a pair-setup and Curve25519/Ed25519 pair-verify
//! - ChaCha20-Poly1305 session encryption with HKDF-derived keys
//! - Request/response correlation over a single multiplexed connection
//! - Remote-control key injection and now-playing event subscription
//!
//! This crate does not perform mDNS discovery; callers resolve a
//! [`ServiceDescriptor`] themselves and hand it to [`Device::open`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use mrp_client::{ClientConfig, Device, OpenOutcome, ServiceDescriptor, TxtRecord};
//!
//! # async fn example(descriptor: ServiceDescriptor) -> Result<(), mrp_client::MrpError> {
//! match Device::open(&descriptor, None, ClientConfig::default()).await? {
//!     OpenOutcome::Ready(device) => {
//!         // Already had credentials; verify alone completed the handshake.
//!         let _ = device;
//!     }
//!     OpenOutcome::NeedsPin(pending) => {
//!         let device = pending.submit_pin("1234").await?;
//!         let _ = device;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Client behavior configuration.
pub mod config;
/// Wire codec: protobuf envelope plus varint framing.
pub mod codec;
/// Device façade: lifecycle, pairing/verify orchestration, key commands.
mod device;
/// Crate-boundary error type.
pub mod error;
/// Cryptographic primitives and pairing/verification state machines.
pub mod protocol;
/// Per-direction frame encryption.
mod session_crypto;
/// Connection reactor and its handle.
mod transport;
/// Value types exposed by this crate's public API.
pub mod types;

pub use config::{ClientConfig, ClientConfigBuilder};
pub use device::{Device, OpenOutcome, PendingPairing};
pub use error::MrpError;
pub use protocol::pairing::SessionKeys;
pub use transport::Transport;
pub use types::{
    Credentials, CredentialsParseError, Event, Key, NowPlayingInfo, ServiceDescriptor,
    SupportedCommand, TxtRecord,
};
