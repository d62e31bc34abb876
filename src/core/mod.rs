//! # Core Packet Components
//!
//! Packet types, the wire format, stream framing, and the payload codec
//! boundary.
//!
//! ## Components
//! - **Packet**: flags, message type, transformed payload, optional timestamp
//! - **Codec**: Tokio codec for framing over reliable byte streams
//! - **Serialization**: payload codec trait and serialization formats
//!
//! ## Wire Format
//! ```text
//! [Flags(1)] [MessageType(1)] [Length(4)] [Payload(N)] [Timestamp(8)]?
//! ```
//!
//! ## Security
//! - Maximum payload size: 16MB (prevents memory exhaustion)
//! - Length validation before allocation
//! - Unknown flag bits are rejected; unknown message types are passed on

pub mod codec;
pub mod packet;
pub mod serialization;
