//! Fluent construction of outbound packets.
//!
//! ```
//! use packet_pipeline::protocol::builder::PacketBuilder;
//! use packet_pipeline::protocol::message::{Heartbeat, Payload};
//!
//! let packet = PacketBuilder::new()
//!     .with_payload(Payload::Heartbeat(Heartbeat { sequence: 1 }))
//!     .with_compression()
//!     .build()
//!     .unwrap();
//! assert!(packet.flags.contains(packet_pipeline::core::packet::PacketFlags::COMPRESSED));
//! ```

use crate::config::{PipelineConfig, MAX_PAYLOAD_SIZE};
use crate::core::packet::{MessageType, Packet, Timestamp, WireFormat};
use crate::core::serialization::PayloadCodec;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{Payload, SerdePayloadCodec};
use crate::protocol::pipeline::{TransformOrder, TransformPipeline};
use crate::utils::compression::{CompressionAlgorithm, CompressionLevel};
use crate::utils::crypto::EncryptionKey;
use tracing::debug;

#[derive(Debug, Clone)]
enum Body<P> {
    Typed(P),
    Raw(Vec<u8>),
}

/// Immutable packet builder. Every `with_*` call consumes the builder and
/// returns an updated one; `build` consumes it for good. Clone a configured
/// builder to produce several packets from the same settings.
#[derive(Debug, Clone)]
pub struct PacketBuilder<P = Payload> {
    body: Option<Body<P>>,
    message_type: Option<MessageType>,
    key: Option<EncryptionKey>,
    encrypt: bool,
    compress: bool,
    algorithm: CompressionAlgorithm,
    level: CompressionLevel,
    order: TransformOrder,
    timestamp: bool,
    max_payload_size: usize,
}

impl<P> Default for PacketBuilder<P> {
    fn default() -> Self {
        Self {
            body: None,
            message_type: None,
            key: None,
            encrypt: false,
            compress: false,
            algorithm: CompressionAlgorithm::default(),
            level: CompressionLevel::default(),
            order: TransformOrder::default(),
            timestamp: false,
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl<P> PacketBuilder<P> {
    /// Builder preloaded with the transport and crypto switches of a config.
    /// An encrypting config still needs [`with_encryption_key`](Self::with_encryption_key).
    pub fn from_config(config: &PipelineConfig) -> Self {
        let transport = &config.transport;
        Self {
            encrypt: config.crypto.encryption_enabled,
            compress: transport.compression_enabled,
            algorithm: transport.compression_algorithm,
            level: transport.compression_level,
            order: transport.transform_order,
            timestamp: transport.wire_format == WireFormat::Timestamped,
            max_payload_size: transport.max_payload_size,
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: P) -> Self {
        self.body = Some(Body::Typed(payload));
        self
    }

    /// Send pre-serialized bytes as-is. Requires an explicit message type.
    pub fn with_raw_payload(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(Body::Raw(bytes.into()));
        self
    }

    /// Override the message type derived from the payload
    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Supply the key and enable encryption
    pub fn with_encryption_key(mut self, key: EncryptionKey) -> Self {
        self.key = Some(key);
        self.encrypt = true;
        self
    }

    /// Enable encryption. Building fails unless a key is supplied too.
    pub fn with_encryption(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn without_encryption(mut self) -> Self {
        self.encrypt = false;
        self
    }

    pub fn with_compression(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Enable compression with an explicit algorithm and level
    pub fn with_compression_algorithm(
        mut self,
        algorithm: CompressionAlgorithm,
        level: CompressionLevel,
    ) -> Self {
        self.compress = true;
        self.algorithm = algorithm;
        self.level = level;
        self
    }

    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    pub fn with_transform_order(mut self, order: TransformOrder) -> Self {
        self.order = order;
        self
    }

    /// Stamp the packet with the build time
    pub fn with_timestamp(mut self) -> Self {
        self.timestamp = true;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    fn pipeline(&self) -> TransformPipeline {
        let mut pipeline = TransformPipeline::new()
            .with_encryption(self.encrypt)
            .with_compression(self.compress)
            .with_algorithm(self.algorithm)
            .with_level(self.level)
            .with_order(self.order)
            .with_max_payload_size(self.max_payload_size);
        if let Some(key) = &self.key {
            pipeline = pipeline.with_key(key.clone());
        }
        pipeline
    }

    /// Validate the builder state, then serialize the payload.
    fn prepare<C>(self, codec: &C) -> Result<Prepared>
    where
        C: PayloadCodec<Payload = P>,
    {
        let pipeline = self.pipeline();
        let body = self.body.ok_or(ProtocolError::MissingPayload)?;
        let message_type = match &body {
            Body::Typed(payload) => self
                .message_type
                .or_else(|| codec.message_type_for(payload)),
            Body::Raw(_) => self.message_type,
        }
        .ok_or(ProtocolError::MissingMessageType)?;
        if self.encrypt && self.key.is_none() {
            return Err(ProtocolError::MissingEncryptionKey);
        }

        let bytes = match body {
            Body::Typed(payload) => codec.serialize(&payload)?,
            Body::Raw(bytes) => bytes,
        };
        debug!(?message_type, len = bytes.len(), "Serialized payload");

        Ok(Prepared {
            bytes,
            message_type,
            timestamp: self.timestamp.then(Timestamp::now),
            pipeline,
        })
    }

    /// Build with a caller-supplied payload codec.
    ///
    /// # Errors
    /// - `MissingPayload` if no payload was set
    /// - `MissingMessageType` if a raw payload has no explicit type, or the
    ///   codec has none for the payload
    /// - `MissingEncryptionKey` if encryption is enabled without a key
    /// - codec and transform errors
    pub fn build_with<C>(self, codec: &C) -> Result<Packet>
    where
        C: PayloadCodec<Payload = P>,
    {
        let prepared = self.prepare(codec)?;
        let (payload, flags) = prepared.pipeline.apply(prepared.bytes)?;
        Ok(Packet {
            flags,
            message_type: prepared.message_type,
            payload,
            timestamp: prepared.timestamp,
        })
    }

    /// Async [`build_with`](Self::build_with). Transforms yield between
    /// chunks, so large payloads do not stall the runtime.
    pub async fn build_async_with<C>(self, codec: &C) -> Result<Packet>
    where
        C: PayloadCodec<Payload = P>,
    {
        let prepared = self.prepare(codec)?;
        let (payload, flags) = prepared.pipeline.apply_async(prepared.bytes).await?;
        Ok(Packet {
            flags,
            message_type: prepared.message_type,
            payload,
            timestamp: prepared.timestamp,
        })
    }
}

impl PacketBuilder<Payload> {
    /// Builder for the crate's [`Payload`] union. Builders for other payload
    /// types start from `PacketBuilder::<T>::default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build with the default serde codec.
    pub fn build(self) -> Result<Packet> {
        self.build_with(&SerdePayloadCodec::default())
    }

    pub async fn build_async(self) -> Result<Packet> {
        self.build_async_with(&SerdePayloadCodec::default()).await
    }
}

struct Prepared {
    bytes: Vec<u8>,
    message_type: MessageType,
    timestamp: Option<Timestamp>,
    pipeline: TransformPipeline,
}
