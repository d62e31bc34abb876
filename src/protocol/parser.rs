//! Inbound side: frame parsing, transform reversal and payload decoding.

use crate::config::PipelineConfig;
use crate::core::packet::{MessageType, Packet, PacketFlags, Timestamp, WireFormat};
use crate::core::serialization::PayloadCodec;
use crate::error::Result;
use crate::protocol::message::{Payload, SerdePayloadCodec};
use crate::protocol::pipeline::TransformPipeline;
use crate::utils::compression::CompressionAlgorithm;
use crate::utils::crypto::EncryptionKey;
use tracing::debug;

/// A packet whose payload has been restored to its typed form.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket<P> {
    pub flags: PacketFlags,
    pub message_type: MessageType,
    pub timestamp: Option<Timestamp>,
    pub payload: P,
}

/// Receiver configuration: wire format, compression algorithm, optional key
/// and size limit. Everything else is read from each packet's flags.
#[derive(Debug, Clone, Default)]
pub struct PacketParser {
    format: WireFormat,
    pipeline: TransformPipeline,
}

impl PacketParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig, key: Option<EncryptionKey>) -> Self {
        Self {
            format: config.transport.wire_format,
            pipeline: TransformPipeline::from_config(config, key),
        }
    }

    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_key(mut self, key: EncryptionKey) -> Self {
        self.pipeline = self.pipeline.with_key(key);
        self
    }

    pub fn with_compression_algorithm(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.pipeline = self.pipeline.with_algorithm(algorithm);
        self
    }

    /// Cap on decompressed payload size
    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.pipeline = self.pipeline.with_max_payload_size(max);
        self
    }

    pub fn wire_format(&self) -> WireFormat {
        self.format
    }

    /// Parse one frame without touching the payload
    pub fn parse(&self, bytes: &[u8]) -> Result<Packet> {
        Packet::from_bytes(bytes, self.format)
    }

    /// Undo the packet's transforms, returning the serialized payload bytes
    pub fn open(&self, packet: &Packet) -> Result<Vec<u8>> {
        self.pipeline.reverse(&packet.payload, packet.flags)
    }

    pub async fn open_async(&self, packet: &Packet) -> Result<Vec<u8>> {
        self.pipeline
            .reverse_async(&packet.payload, packet.flags)
            .await
    }

    /// Parse, reverse and decode with a caller-supplied codec.
    ///
    /// # Errors
    /// Framing errors, `MissingEncryptionKey`, transform errors, and
    /// `UnknownMessageType` from the codec.
    pub fn decode_with<C: PayloadCodec>(
        &self,
        bytes: &[u8],
        codec: &C,
    ) -> Result<DecodedPacket<C::Payload>> {
        let packet = self.parse(bytes)?;
        let body = self.open(&packet)?;
        Self::finish(packet, &body, codec)
    }

    pub async fn decode_async_with<C: PayloadCodec>(
        &self,
        bytes: &[u8],
        codec: &C,
    ) -> Result<DecodedPacket<C::Payload>> {
        let packet = self.parse(bytes)?;
        let body = self.open_async(&packet).await?;
        Self::finish(packet, &body, codec)
    }

    /// Decode into the crate's [`Payload`] union with the default codec
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedPacket<Payload>> {
        self.decode_with(bytes, &SerdePayloadCodec::default())
    }

    pub async fn decode_async(&self, bytes: &[u8]) -> Result<DecodedPacket<Payload>> {
        self.decode_async_with(bytes, &SerdePayloadCodec::default())
            .await
    }

    fn finish<C: PayloadCodec>(
        packet: Packet,
        body: &[u8],
        codec: &C,
    ) -> Result<DecodedPacket<C::Payload>> {
        debug!(message_type = ?packet.message_type, len = body.len(), "Decoding payload");
        let payload = codec.deserialize(body, packet.message_type)?;
        Ok(DecodedPacket {
            flags: packet.flags,
            message_type: packet.message_type,
            timestamp: packet.timestamp,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::builder::PacketBuilder;
    use crate::protocol::message::{PlayerPosition, Vec3};
    use crate::protocol::pipeline::TransformOrder;

    fn position() -> Payload {
        Payload::PlayerPosition(PlayerPosition {
            player_id: 11,
            position: Vec3::new(10.0, 0.0, -3.5),
            velocity: Vec3::new(1.0, 0.0, 0.0),
        })
    }

    fn key() -> EncryptionKey {
        EncryptionKey::new([9u8; 32])
    }

    #[test]
    fn test_decode_plain() {
        let bytes = PacketBuilder::new()
            .with_payload(position())
            .build()
            .unwrap()
            .to_bytes(WireFormat::Compact)
            .unwrap();
        let decoded = PacketParser::new().decode(&bytes).unwrap();
        assert_eq!(decoded.payload, position());
        assert_eq!(decoded.message_type, MessageType::PlayerPosition);
    }

    #[test]
    fn test_decode_full_pipeline_timestamped() {
        let packet = PacketBuilder::new()
            .with_payload(position())
            .with_encryption_key(key())
            .with_compression()
            .with_transform_order(TransformOrder::CompressThenEncrypt)
            .with_timestamp()
            .build()
            .unwrap();
        let bytes = packet.to_bytes(WireFormat::Timestamped).unwrap();

        let parser = PacketParser::new()
            .with_wire_format(WireFormat::Timestamped)
            .with_key(key());
        let decoded = parser.decode(&bytes).unwrap();
        assert_eq!(decoded.payload, position());
        assert_eq!(decoded.timestamp, packet.timestamp);
        assert_eq!(decoded.flags, packet.flags);
    }

    #[test]
    fn test_wrong_key_fails() {
        let bytes = PacketBuilder::new()
            .with_payload(position())
            .with_encryption_key(key())
            .build()
            .unwrap()
            .to_bytes(WireFormat::Compact)
            .unwrap();
        let parser = PacketParser::new().with_key(EncryptionKey::new([1u8; 32]));
        assert!(parser.decode(&bytes).is_err());
    }

    #[test]
    fn test_unknown_type_survives_framing_but_not_decoding() {
        let bytes = PacketBuilder::new()
            .with_raw_payload(vec![5, 6])
            .with_message_type(MessageType::Other(250))
            .build()
            .unwrap()
            .to_bytes(WireFormat::Compact)
            .unwrap();
        let parser = PacketParser::new();
        let packet = parser.parse(&bytes).unwrap();
        assert_eq!(packet.message_type, MessageType::Other(250));
        assert!(matches!(
            parser.decode(&bytes),
            Err(ProtocolError::UnknownMessageType(250))
        ));
    }

    #[tokio::test]
    async fn test_decode_async() {
        let bytes = PacketBuilder::new()
            .with_payload(position())
            .with_encryption_key(key())
            .with_compression()
            .build_async()
            .await
            .unwrap()
            .to_bytes(WireFormat::Compact)
            .unwrap();
        let decoded = PacketParser::new()
            .with_key(key())
            .decode_async(&bytes)
            .await
            .unwrap();
        assert_eq!(decoded.payload, position());
    }
}
