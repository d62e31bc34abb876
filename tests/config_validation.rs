//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use packet_pipeline::config::{
    CryptoConfig, LoggingConfig, PipelineConfig, TransportConfig, MAX_PAYLOAD_SIZE,
};
use packet_pipeline::core::packet::WireFormat;
use packet_pipeline::core::serialization::SerializationFormat;
use packet_pipeline::protocol::pipeline::TransformOrder;
use packet_pipeline::utils::compression::CompressionAlgorithm;
use packet_pipeline::utils::crypto::KDF_ITERATIONS;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = PipelineConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_defaults_match_reference_behavior() {
    let config = PipelineConfig::default();
    assert!(!config.transport.compression_enabled);
    assert!(!config.crypto.encryption_enabled);
    assert_eq!(config.transport.compression_algorithm, CompressionAlgorithm::Gzip);
    assert_eq!(
        config.transport.transform_order,
        TransformOrder::EncryptThenCompress
    );
    assert_eq!(config.transport.wire_format, WireFormat::Compact);
    assert_eq!(config.transport.max_payload_size, MAX_PAYLOAD_SIZE);
}

#[test]
fn test_zero_payload_size() {
    let config = PipelineConfig::default_with_overrides(|c| c.transport.max_payload_size = 0);
    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be 0")));
}

#[test]
fn test_payload_size_beyond_frame_limit() {
    for size in [MAX_PAYLOAD_SIZE + 1, u32::MAX as usize] {
        let transport = TransportConfig {
            max_payload_size: size,
            ..TransportConfig::default()
        };
        let errors = transport.validate();
        assert!(errors.iter().any(|e| e.contains("too large")), "{size}");
    }

    let at_limit = TransportConfig {
        max_payload_size: MAX_PAYLOAD_SIZE,
        ..TransportConfig::default()
    };
    assert!(at_limit.validate().is_empty());
}

#[test]
fn test_store_with_compression_enabled() {
    let transport = TransportConfig {
        compression_enabled: true,
        compression_algorithm: CompressionAlgorithm::Store,
        ..TransportConfig::default()
    };
    assert_eq!(transport.validate().len(), 1);
}

#[test]
fn test_low_kdf_iterations() {
    let crypto = CryptoConfig {
        kdf_iterations: KDF_ITERATIONS / 10,
        ..CryptoConfig::default()
    };
    let errors = crypto.validate();
    assert!(errors.iter().any(|e| e.contains("below the minimum")));
}

#[test]
fn test_empty_app_name() {
    let logging = LoggingConfig {
        app_name: String::new(),
        ..LoggingConfig::default()
    };
    assert!(!logging.validate().is_empty());
}

#[test]
fn test_validate_strict_joins_errors() {
    let mut config = PipelineConfig::default();
    config.transport.max_payload_size = 0;
    config.logging.app_name = String::new();

    let err = config.validate_strict().expect_err("two problems");
    let msg = err.to_string();
    assert!(msg.contains("cannot be 0"));
    assert!(msg.contains("app_name cannot be empty"));
}

#[test]
fn test_toml_roundtrip_through_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pipeline.toml");

    let config = PipelineConfig::default_with_overrides(|c| {
        c.transport.compression_enabled = true;
        c.transport.compression_algorithm = CompressionAlgorithm::Zstd;
        c.transport.transform_order = TransformOrder::CompressThenEncrypt;
        c.transport.wire_format = WireFormat::Timestamped;
        c.serialization.format = SerializationFormat::MessagePack;
        c.logging.log_level = Level::DEBUG;
    });
    config.save_to_file(&path).expect("save");

    let loaded = PipelineConfig::from_file(&path).expect("load");
    assert!(loaded.transport.compression_enabled);
    assert_eq!(loaded.transport.compression_algorithm, CompressionAlgorithm::Zstd);
    assert_eq!(
        loaded.transport.transform_order,
        TransformOrder::CompressThenEncrypt
    );
    assert_eq!(loaded.transport.wire_format, WireFormat::Timestamped);
    assert_eq!(loaded.serialization.format, SerializationFormat::MessagePack);
    assert_eq!(loaded.logging.log_level, Level::DEBUG);
}

#[test]
fn test_example_config_parses() {
    let example = PipelineConfig::example_config();
    assert!(example.contains("compression_algorithm"));
    let parsed = PipelineConfig::from_toml(&example).expect("example parses");
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_missing_sections_use_defaults() {
    let parsed = PipelineConfig::from_toml("").expect("empty config parses");
    assert_eq!(parsed.transport.max_payload_size, MAX_PAYLOAD_SIZE);
    assert_eq!(parsed.crypto.kdf_iterations, KDF_ITERATIONS);
}

#[test]
fn test_malformed_toml() {
    assert!(PipelineConfig::from_toml("transport = 5").is_err());
    assert!(PipelineConfig::from_file("/nonexistent/pipeline.toml").is_err());
}

#[test]
fn test_env_overrides_layer_on_defaults() {
    std::env::set_var("PACKET_PIPELINE_WIRE_FORMAT", "timestamped");
    std::env::set_var("PACKET_PIPELINE_COMPRESSION", "true");
    std::env::set_var("PACKET_PIPELINE_COMPRESSION_ALGORITHM", "zstd");

    let config = PipelineConfig::from_env().expect("valid overrides");
    assert_eq!(config.transport.wire_format, WireFormat::Timestamped);
    assert!(config.transport.compression_enabled);
    assert_eq!(
        config.transport.compression_algorithm,
        CompressionAlgorithm::Zstd
    );
    assert_eq!(config.transport.max_payload_size, MAX_PAYLOAD_SIZE);

    std::env::set_var("PACKET_PIPELINE_WIRE_FORMAT", "sideways");
    assert!(PipelineConfig::from_env().is_err());

    for name in [
        "PACKET_PIPELINE_WIRE_FORMAT",
        "PACKET_PIPELINE_COMPRESSION",
        "PACKET_PIPELINE_COMPRESSION_ALGORITHM",
    ] {
        std::env::remove_var(name);
    }
}
