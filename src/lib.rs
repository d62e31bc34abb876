//! # packet-pipeline
//!
//! Packet construction, payload transforms and wire framing for real-time
//! multiplayer transports.
//!
//! A packet is a typed payload serialized to bytes, optionally encrypted
//! (AES-256-CBC) and compressed, then framed with a small binary header:
//!
//! ```text
//! [Flags(1)] [MessageType(1)] [Length(4, LE)] [Payload(N)] [Timestamp(8, LE)]?
//! ```
//!
//! ## Quick start
//! ```
//! use packet_pipeline::prelude::*;
//!
//! let key = CryptoBox::generate_key()?;
//! let bytes = PacketBuilder::new()
//!     .with_payload(Payload::Heartbeat(Heartbeat { sequence: 1 }))
//!     .with_encryption_key(key.clone())
//!     .with_compression()
//!     .build()?
//!     .to_bytes(WireFormat::Compact)?;
//!
//! let decoded = PacketParser::new().with_key(key).decode(&bytes)?;
//! assert_eq!(decoded.payload, Payload::Heartbeat(Heartbeat { sequence: 1 }));
//! # Ok::<(), packet_pipeline::error::ProtocolError>(())
//! ```
//!
//! ## Modules
//! - [`core`]: wire format, stream codec, serialization formats
//! - [`protocol`]: payloads, transform pipeline, builder and parser
//! - [`utils`]: crypto, compression, logging
//! - [`config`]: TOML and environment configuration
//! - [`error`]: the crate error type

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use crate::core::packet::{MessageType, Packet, PacketFlags, Timestamp, WireFormat};
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::builder::PacketBuilder;
pub use crate::protocol::parser::{DecodedPacket, PacketParser};

/// Common imports for building and parsing packets
pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::core::codec::PacketCodec;
    pub use crate::core::packet::{MessageType, Packet, PacketFlags, Timestamp, WireFormat};
    pub use crate::core::serialization::{PayloadCodec, SerializationFormat};
    pub use crate::error::{ProtocolError, Result};
    pub use crate::protocol::builder::PacketBuilder;
    pub use crate::protocol::message::*;
    pub use crate::protocol::parser::{DecodedPacket, PacketParser};
    pub use crate::protocol::pipeline::TransformOrder;
    pub use crate::utils::compression::{CompressionAlgorithm, CompressionLevel};
    pub use crate::utils::crypto::{CryptoBox, EncryptionKey};
}
