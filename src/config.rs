//! # Configuration
//!
//! Settings for the packet pipeline, grouped by concern.
//!
//! Two peers must agree on the settings that are not carried on the wire:
//! the compression algorithm, the wire format (whether frames carry a
//! trailing timestamp) and the payload serialization format.
//!
//! ## Sources
//! - TOML, from a file (`from_file`) or a string (`from_toml`); missing
//!   sections and keys fall back to the defaults
//! - `PACKET_PIPELINE_*` environment variables layered on the defaults
//!   (`from_env`)
//! - Code, via `Default` or `default_with_overrides`
//!
//! Key material is never part of the configuration. Encryption can be
//! switched on here, but the key is always handed to the builder or parser
//! directly.

use crate::core::packet::WireFormat;
use crate::core::serialization::SerializationConfig;
use crate::error::{ProtocolError, Result};
use crate::protocol::pipeline::TransformOrder;
use crate::utils::compression::{CompressionAlgorithm, CompressionLevel};
use crate::utils::crypto::KDF_ITERATIONS;
use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// Largest payload a frame may carry (16 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Compression is opt-in
pub const ENABLE_COMPRESSION: bool = false;

/// Encryption is opt-in
pub const ENABLE_ENCRYPTION: bool = false;

/// Upper bound on `LoggingConfig::app_name`
const MAX_APP_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub crypto: CryptoConfig,

    #[serde(default)]
    pub serialization: SerializationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid TOML config: {e}")))
    }

    /// Defaults with `PACKET_PIPELINE_*` overrides applied.
    ///
    /// Boolean and numeric variables that fail to parse are ignored; enum
    /// selectors (algorithm, order, wire format) that fail to parse are an
    /// error, since silently falling back would desynchronize peers.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        let transport = &mut config.transport;

        if let Some(enabled) = env_parsed("PACKET_PIPELINE_COMPRESSION") {
            transport.compression_enabled = enabled;
        }
        if let Ok(algorithm) = std::env::var("PACKET_PIPELINE_COMPRESSION_ALGORITHM") {
            transport.compression_algorithm = algorithm.parse()?;
        }
        if let Some(order) = env_choice("PACKET_PIPELINE_TRANSFORM_ORDER")? {
            transport.transform_order = order;
        }
        if let Some(format) = env_choice("PACKET_PIPELINE_WIRE_FORMAT")? {
            transport.wire_format = format;
        }
        if let Some(size) = env_parsed("PACKET_PIPELINE_MAX_PAYLOAD_SIZE") {
            transport.max_payload_size = size;
        }
        if let Some(enabled) = env_parsed("PACKET_PIPELINE_ENCRYPTION") {
            config.crypto.encryption_enabled = enabled;
        }
        if let Some(iterations) = env_parsed("PACKET_PIPELINE_KDF_ITERATIONS") {
            config.crypto.kdf_iterations = iterations;
        }

        Ok(config)
    }

    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// The default configuration rendered as TOML, for use as a template
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("# could not render defaults: {e}\n"))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Cannot render config: {e}")))?;
        std::fs::write(path, content).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot write {}: {e}", path.display()))
        })
    }

    /// Every problem found, one message each. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.transport.validate();
        problems.extend(self.crypto.validate());
        problems.extend(self.logging.validate());
        problems
    }

    /// [`validate`](Self::validate) folded into a single `ConfigError`
    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::ConfigError(format!(
            "{} configuration problem(s): {}",
            problems.len(),
            problems.join("; ")
        )))
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Parse a snake_case enum selector through its serde representation
fn env_choice<T: DeserializeOwned>(name: &str) -> Result<Option<T>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let de: StrDeserializer<'_, ValueError> = raw.trim().into_deserializer();
    T::deserialize(de)
        .map(Some)
        .map_err(|e| ProtocolError::ConfigError(format!("{name}: {e}")))
}

/// Transforms and framing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub compression_enabled: bool,

    /// Must match on both peers
    pub compression_algorithm: CompressionAlgorithm,

    pub compression_level: CompressionLevel,

    /// Only matters when both compression and encryption are enabled. The
    /// receiver reads the order from the packet flags.
    pub transform_order: TransformOrder,

    /// Must match on both peers
    pub wire_format: WireFormat,

    /// Limit on payload bytes, applied after transforms on send and to
    /// decompressed output on receive
    pub max_payload_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            compression_enabled: ENABLE_COMPRESSION,
            compression_algorithm: CompressionAlgorithm::default(),
            compression_level: CompressionLevel::default(),
            transform_order: TransformOrder::default(),
            wire_format: WireFormat::default(),
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.max_payload_size == 0 {
            problems.push("max_payload_size cannot be 0".to_string());
        } else if self.max_payload_size > MAX_PAYLOAD_SIZE {
            problems.push(format!(
                "max_payload_size {} is too large (frame limit: {MAX_PAYLOAD_SIZE})",
                self.max_payload_size
            ));
        }

        if self.compression_enabled && self.compression_algorithm == CompressionAlgorithm::Store {
            problems.push("compression is enabled but the algorithm is 'store'".to_string());
        }

        problems
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub encryption_enabled: bool,

    /// PBKDF2 rounds for password-derived keys
    pub kdf_iterations: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            encryption_enabled: ENABLE_ENCRYPTION,
            kdf_iterations: KDF_ITERATIONS,
        }
    }
}

impl CryptoConfig {
    pub fn validate(&self) -> Vec<String> {
        if self.kdf_iterations < KDF_ITERATIONS {
            vec![format!(
                "kdf_iterations {} is below the minimum of {KDF_ITERATIONS}",
                self.kdf_iterations
            )]
        } else {
            Vec::new()
        }
    }
}

/// Settings for [`init_logging`](crate::utils::logging::init_logging)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub app_name: String,

    /// Default filter level; `RUST_LOG` takes precedence when set
    #[serde(with = "level_name")]
    pub log_level: Level,

    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from(env!("CARGO_PKG_NAME")),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.app_name.trim().is_empty() {
            problems.push("app_name cannot be empty".to_string());
        } else if self.app_name.len() > MAX_APP_NAME_LEN {
            problems.push(format!(
                "app_name is {} characters long (maximum: {MAX_APP_NAME_LEN})",
                self.app_name.len()
            ));
        }
        problems
    }
}

/// `tracing::Level` as a lowercase name
mod level_name {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown log level '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_partial_sections_fill_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [transport]
            compression_enabled = true
            wire_format = "timestamped"

            [logging]
            log_level = "warn"
            "#,
        )
        .unwrap();
        assert!(config.transport.compression_enabled);
        assert_eq!(config.transport.wire_format, WireFormat::Timestamped);
        assert_eq!(config.transport.max_payload_size, MAX_PAYLOAD_SIZE);
        assert_eq!(config.logging.log_level, Level::WARN);
        assert_eq!(config.logging.app_name, "packet-pipeline");
    }

    #[test]
    fn test_enum_values_use_snake_case() {
        let config = PipelineConfig::from_toml(
            r#"
            [transport]
            compression_algorithm = "brotli"
            compression_level = "smallest_size"
            transform_order = "compress_then_encrypt"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.transport.compression_algorithm,
            CompressionAlgorithm::Brotli
        );
        assert_eq!(
            config.transport.compression_level,
            CompressionLevel::SmallestSize
        );
        assert_eq!(
            config.transport.transform_order,
            TransformOrder::CompressThenEncrypt
        );
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let result = PipelineConfig::from_toml("[logging]\nlog_level = \"loud\"");
        assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
    }

    #[test]
    fn test_env_choice_parses_snake_case() {
        std::env::set_var("PACKET_PIPELINE_TEST_ORDER", "compress_then_encrypt");
        let order: Option<TransformOrder> = env_choice("PACKET_PIPELINE_TEST_ORDER").unwrap();
        assert_eq!(order, Some(TransformOrder::CompressThenEncrypt));

        std::env::set_var("PACKET_PIPELINE_TEST_FORMAT", "sideways");
        assert!(env_choice::<WireFormat>("PACKET_PIPELINE_TEST_FORMAT").is_err());

        let missing: Option<WireFormat> = env_choice("PACKET_PIPELINE_TEST_UNSET").unwrap();
        assert_eq!(missing, None);
    }
}
