//! Payload transforms: compression and encryption in a configurable order.
//!
//! The sender records what it did in [`PacketFlags`]. The receiver derives
//! the inverse sequence from those flags alone, so the only settings both
//! peers must share are the key and the compression algorithm.

use crate::config::{PipelineConfig, MAX_PAYLOAD_SIZE};
use crate::core::packet::PacketFlags;
use crate::error::{ProtocolError, Result};
use crate::utils::compression::{self, CompressionAlgorithm, CompressionLevel};
use crate::utils::crypto::{CryptoBox, EncryptionKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Which transform runs first when both are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOrder {
    /// Encrypt, then compress the ciphertext. Wire-compatible with existing
    /// peers, but ciphertext barely compresses.
    #[default]
    EncryptThenCompress,
    /// Compress, then encrypt. Marked on the wire with
    /// [`PacketFlags::COMPRESS_FIRST`].
    CompressThenEncrypt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Encrypt,
    Compress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InverseStep {
    Decrypt,
    Decompress,
}

impl TransformOrder {
    fn steps(self) -> [Step; 2] {
        match self {
            TransformOrder::EncryptThenCompress => [Step::Encrypt, Step::Compress],
            TransformOrder::CompressThenEncrypt => [Step::Compress, Step::Encrypt],
        }
    }
}

/// Forward and inverse payload transforms for one peer.
///
/// The same pipeline can both apply (sender) and reverse (receiver). For
/// reversal only the key, the compression algorithm and the size limit
/// matter; the enable switches and order are read from the packet flags.
#[derive(Debug, Clone)]
pub struct TransformPipeline {
    crypto: Option<CryptoBox>,
    encrypt: bool,
    compress: bool,
    algorithm: CompressionAlgorithm,
    level: CompressionLevel,
    order: TransformOrder,
    max_payload_size: usize,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self {
            crypto: None,
            encrypt: false,
            compress: false,
            algorithm: CompressionAlgorithm::default(),
            level: CompressionLevel::default(),
            order: TransformOrder::default(),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline matching a config file. Encryption is enabled by config but
    /// the key always comes from the caller.
    pub fn from_config(config: &PipelineConfig, key: Option<EncryptionKey>) -> Self {
        let transport = &config.transport;
        Self {
            crypto: key.map(CryptoBox::from_key),
            encrypt: config.crypto.encryption_enabled,
            compress: transport.compression_enabled,
            algorithm: transport.compression_algorithm,
            level: transport.compression_level,
            order: transport.transform_order,
            max_payload_size: transport.max_payload_size,
        }
    }

    /// Set the key without turning on outbound encryption
    pub fn with_key(mut self, key: EncryptionKey) -> Self {
        self.crypto = Some(CryptoBox::from_key(key));
        self
    }

    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encrypt = enabled;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    pub fn with_algorithm(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_order(mut self, order: TransformOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn algorithm(&self) -> CompressionAlgorithm {
        self.algorithm
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    fn forward_steps(&self) -> Result<Vec<Step>> {
        if self.encrypt && self.crypto.is_none() {
            return Err(ProtocolError::MissingEncryptionKey);
        }
        Ok(self
            .order
            .steps()
            .into_iter()
            .filter(|step| match step {
                Step::Encrypt => self.encrypt,
                Step::Compress => self.compress,
            })
            .collect())
    }

    fn forward_flags(&self) -> PacketFlags {
        let mut flags = PacketFlags::empty();
        flags.set(PacketFlags::ENCRYPTED, self.encrypt);
        flags.set(PacketFlags::COMPRESSED, self.compress);
        if self.encrypt && self.compress && self.order == TransformOrder::CompressThenEncrypt {
            flags.insert(PacketFlags::COMPRESS_FIRST);
        }
        flags
    }

    fn inverse_steps(&self, flags: PacketFlags) -> Result<Vec<InverseStep>> {
        let encrypted = flags.contains(PacketFlags::ENCRYPTED);
        let compressed = flags.contains(PacketFlags::COMPRESSED);

        if flags.contains(PacketFlags::COMPRESS_FIRST) && !(encrypted && compressed) {
            return Err(ProtocolError::InvalidFlags(flags.bits()));
        }
        if encrypted && self.crypto.is_none() {
            return Err(ProtocolError::MissingEncryptionKey);
        }

        let steps = match (encrypted, compressed) {
            (true, true) if flags.contains(PacketFlags::COMPRESS_FIRST) => {
                vec![InverseStep::Decrypt, InverseStep::Decompress]
            }
            (true, true) => vec![InverseStep::Decompress, InverseStep::Decrypt],
            (true, false) => vec![InverseStep::Decrypt],
            (false, true) => vec![InverseStep::Decompress],
            (false, false) => Vec::new(),
        };
        Ok(steps)
    }

    fn crypto(&self) -> Result<&CryptoBox> {
        self.crypto
            .as_ref()
            .ok_or(ProtocolError::MissingEncryptionKey)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(len));
        }
        Ok(())
    }

    /// Run the enabled transforms over `data`, returning the transformed
    /// bytes and the flags that describe them.
    ///
    /// # Errors
    /// - `MissingEncryptionKey` if encryption is enabled without a key
    /// - `OversizedPacket` if the result exceeds `max_payload_size`
    #[instrument(level = "debug", skip(self, data), fields(input_len = data.len()))]
    pub fn apply(&self, data: Vec<u8>) -> Result<(Vec<u8>, PacketFlags)> {
        let steps = self.forward_steps()?;
        let mut bytes = data;
        for step in steps {
            bytes = match step {
                Step::Encrypt => self.crypto()?.encrypt(&bytes, None)?,
                Step::Compress => compression::compress(&bytes, self.algorithm, self.level)?,
            };
            debug!(?step, len = bytes.len(), "Applied transform");
        }
        self.check_size(bytes.len())?;
        Ok((bytes, self.forward_flags()))
    }

    /// Undo the transforms recorded in `flags`.
    ///
    /// # Errors
    /// - `MissingEncryptionKey` if the payload is encrypted and no key is set
    /// - `InvalidFlags` if `COMPRESS_FIRST` is set without both transforms
    /// - decryption and decompression errors from the underlying transforms
    #[instrument(level = "debug", skip(self, data), fields(input_len = data.len()))]
    pub fn reverse(&self, data: &[u8], flags: PacketFlags) -> Result<Vec<u8>> {
        let steps = self.inverse_steps(flags)?;
        let mut bytes = data.to_vec();
        for step in steps {
            bytes = match step {
                InverseStep::Decrypt => self.crypto()?.decrypt(&bytes)?,
                InverseStep::Decompress => compression::decompress_with_limit(
                    &bytes,
                    self.algorithm,
                    self.max_payload_size,
                )?,
            };
            debug!(?step, len = bytes.len(), "Reversed transform");
        }
        Ok(bytes)
    }

    /// Async [`apply`](Self::apply), yielding between chunks of large payloads.
    pub async fn apply_async(&self, data: Vec<u8>) -> Result<(Vec<u8>, PacketFlags)> {
        let steps = self.forward_steps()?;
        let mut bytes = data;
        for step in steps {
            bytes = match step {
                Step::Encrypt => self.crypto()?.encrypt_async(&bytes, None).await?,
                Step::Compress => {
                    compression::compress_async(&bytes, self.algorithm, self.level).await?
                }
            };
            debug!(?step, len = bytes.len(), "Applied transform");
        }
        self.check_size(bytes.len())?;
        Ok((bytes, self.forward_flags()))
    }

    /// Async [`reverse`](Self::reverse).
    pub async fn reverse_async(&self, data: &[u8], flags: PacketFlags) -> Result<Vec<u8>> {
        let steps = self.inverse_steps(flags)?;
        let mut bytes = data.to_vec();
        for step in steps {
            bytes = match step {
                InverseStep::Decrypt => self.crypto()?.decrypt_async(&bytes).await?,
                InverseStep::Decompress => {
                    compression::decompress_async(&bytes, self.algorithm, self.max_payload_size)
                        .await?
                }
            };
            debug!(?step, len = bytes.len(), "Reversed transform");
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn key() -> EncryptionKey {
        EncryptionKey::new([7u8; 32])
    }

    fn text() -> Vec<u8> {
        b"position update ".repeat(200)
    }

    #[test]
    fn test_passthrough_without_transforms() {
        let pipeline = TransformPipeline::new();
        let (bytes, flags) = pipeline.apply(text()).unwrap();
        assert_eq!(bytes, text());
        assert!(flags.is_empty());
        assert_eq!(pipeline.reverse(&bytes, flags).unwrap(), text());
    }

    #[test]
    fn test_both_orders_roundtrip() {
        for order in [
            TransformOrder::EncryptThenCompress,
            TransformOrder::CompressThenEncrypt,
        ] {
            let sender = TransformPipeline::new()
                .with_key(key())
                .with_encryption(true)
                .with_compression(true)
                .with_order(order);
            let (bytes, flags) = sender.apply(text()).unwrap();
            assert!(flags.contains(PacketFlags::ENCRYPTED | PacketFlags::COMPRESSED));
            assert_eq!(
                flags.contains(PacketFlags::COMPRESS_FIRST),
                order == TransformOrder::CompressThenEncrypt
            );

            // Receiver knows only the key; order comes from the flags.
            let receiver = TransformPipeline::new().with_key(key());
            assert_eq!(receiver.reverse(&bytes, flags).unwrap(), text());
        }
    }

    #[test]
    fn test_compress_first_is_smaller_on_redundant_data() {
        let base = TransformPipeline::new()
            .with_key(key())
            .with_encryption(true)
            .with_compression(true);
        let (reference, _) = base.clone().apply(text()).unwrap();
        let (reordered, _) = base
            .with_order(TransformOrder::CompressThenEncrypt)
            .apply(text())
            .unwrap();
        assert!(reordered.len() < reference.len());
    }

    #[test]
    fn test_missing_key_on_either_side() {
        let sender = TransformPipeline::new().with_encryption(true);
        assert!(matches!(
            sender.apply(text()),
            Err(ProtocolError::MissingEncryptionKey)
        ));

        let receiver = TransformPipeline::new();
        assert!(matches!(
            receiver.reverse(&[0u8; 32], PacketFlags::ENCRYPTED),
            Err(ProtocolError::MissingEncryptionKey)
        ));
    }

    #[test]
    fn test_compress_first_without_both_flags_rejected() {
        let receiver = TransformPipeline::new().with_key(key());
        let flags = PacketFlags::COMPRESSED | PacketFlags::COMPRESS_FIRST;
        assert!(matches!(
            receiver.reverse(&[], flags),
            Err(ProtocolError::InvalidFlags(_))
        ));
    }

    #[test]
    fn test_decompression_limit_enforced() {
        let sender = TransformPipeline::new().with_compression(true);
        let (bytes, flags) = sender.apply(vec![0u8; 64 * 1024]).unwrap();

        let receiver = TransformPipeline::new().with_max_payload_size(1024);
        assert!(receiver.reverse(&bytes, flags).is_err());
    }

    #[test]
    fn test_output_over_limit_rejected() {
        let sender = TransformPipeline::new().with_max_payload_size(10);
        assert!(matches!(
            sender.apply(vec![1u8; 11]),
            Err(ProtocolError::OversizedPacket(11))
        ));
    }

    #[test]
    fn test_from_config_reads_transport_section() {
        let config = PipelineConfig::default_with_overrides(|c| {
            c.transport.compression_enabled = true;
            c.transport.compression_algorithm = CompressionAlgorithm::Zstd;
            c.transport.transform_order = TransformOrder::CompressThenEncrypt;
            c.crypto.encryption_enabled = true;
        });
        let pipeline = TransformPipeline::from_config(&config, Some(key()));
        assert_eq!(pipeline.algorithm(), CompressionAlgorithm::Zstd);

        let (_, flags) = pipeline.apply(text()).unwrap();
        assert!(flags.contains(PacketFlags::COMPRESS_FIRST));
    }

    #[tokio::test]
    async fn test_async_matches_sync_inverse() {
        let pipeline = TransformPipeline::new()
            .with_key(key())
            .with_encryption(true)
            .with_compression(true)
            .with_algorithm(CompressionAlgorithm::Brotli);
        let (bytes, flags) = pipeline.apply_async(text()).await.unwrap();
        assert_eq!(pipeline.reverse(&bytes, flags).unwrap(), text());
        assert_eq!(pipeline.reverse_async(&bytes, flags).await.unwrap(), text());
    }
}
