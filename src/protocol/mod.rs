//! # Packet Protocol
//!
//! Building outbound packets and decoding inbound ones.
//!
//! ## Components
//! - **Message**: game payload types and the serde payload codec
//! - **Registry**: payload variant to message type mapping
//! - **Pipeline**: compression and encryption, forward and inverse
//! - **Builder**: fluent outbound packet construction
//! - **Parser**: frame parsing, transform reversal and decoding
//!
//! ## Transform order
//! Outbound: serialize, then encrypt and compress in the configured order,
//! then frame. Inbound runs the inverse, with the order taken from the
//! packet flags.

pub mod builder;
pub mod message;
pub mod parser;
pub mod pipeline;
pub mod registry;
