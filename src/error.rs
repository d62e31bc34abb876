//! # Error Types
//!
//! Error handling for the packet pipeline.
//!
//! Every failure in the build and parse paths is surfaced synchronously as a
//! [`ProtocolError`]. Nothing is logged-and-ignored and nothing is retried;
//! turning a decode failure into a dropped packet or a connection reset is
//! the transport's decision.
//!
//! ## Error Categories
//! - **Configuration**: missing payload, message type or key before build
//! - **Size**: wrong key/IV/salt length, short frames, length mismatches
//! - **Crypto**: padding failures and malformed ciphertext on decrypt
//! - **Compression**: unsupported algorithms, corrupted streams
//! - **Codec**: payload (de)serialization and unknown message types
//!
//! ## Example Usage
//! ```rust
//! use packet_pipeline::error::{ErrorCategory, ProtocolError};
//! use packet_pipeline::utils::crypto::decrypt;
//!
//! let err = decrypt(&[0u8; 15], &[0u8; 32]).unwrap_err();
//! assert!(matches!(err, ProtocolError::InvalidCiphertext));
//! assert_eq!(err.category(), ErrorCategory::Crypto);
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Compression errors
    pub const ERR_COMPRESSION_FAILED: &str = "Compression failed";
    pub const ERR_DECOMPRESSION_FAILED: &str = "Decompression failed";
    pub const ERR_TRUNCATED_STREAM: &str = "Compressed stream ended unexpectedly";
    pub const ERR_DECOMPRESSION_LIMIT: &str = "Decompressed output exceeds size limit";

    /// Configuration errors
    pub const ERR_KDF_ITERATIONS: &str = "Key derivation iteration count below minimum";

    /// Registry errors
    pub const ERR_DUPLICATE_PAYLOAD: &str = "Payload kind registered more than once";
    pub const ERR_DUPLICATE_MESSAGE_TYPE: &str = "Message type registered more than once";
}

/// Broad classification of a [`ProtocolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Size,
    Crypto,
    Compression,
    Codec,
    Io,
}

// ProtocolError is the primary error type for all pipeline operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Packet has no payload")]
    MissingPayload,

    #[error("Packet message type could not be resolved")]
    MissingMessageType,

    #[error("Encryption requested without an encryption key")]
    MissingEncryptionKey,

    #[error("Timestamped wire format requires a packet timestamp")]
    MissingTimestamp,

    #[error("Password cannot be empty")]
    EmptyPassword,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid IV length: expected {expected} bytes, got {actual}")]
    InvalidIvLength { expected: usize, actual: usize },

    #[error("Invalid salt length: expected {expected} bytes, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },

    #[error("Frame too short: need {needed} bytes, have {available}")]
    FrameTooShort { needed: usize, available: usize },

    #[error("Payload length mismatch: declared {declared} bytes, {available} remaining")]
    PayloadLengthMismatch { declared: usize, available: usize },

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Frame followed by {0} unexpected bytes")]
    TrailingBytes(usize),

    #[error("Invalid packet flags: {0:#04x}")]
    InvalidFlags(u8),

    #[error("Ciphertext too short to contain an IV")]
    InvalidCiphertext,

    #[error("Decryption failed: bad padding or wrong key")]
    AuthenticationOrPaddingError,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Secure random generation failed")]
    RandomGeneration,

    #[error("Unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Compression failed: {0}")]
    CompressionError(String),

    #[error("Decompression failed: {0}")]
    DecompressionError(String),
}

impl ProtocolError {
    /// Classify the error into its category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::MissingPayload
            | ProtocolError::MissingMessageType
            | ProtocolError::MissingEncryptionKey
            | ProtocolError::MissingTimestamp
            | ProtocolError::EmptyPassword
            | ProtocolError::ConfigError(_) => ErrorCategory::Configuration,

            ProtocolError::InvalidKeyLength { .. }
            | ProtocolError::InvalidIvLength { .. }
            | ProtocolError::InvalidSaltLength { .. }
            | ProtocolError::FrameTooShort { .. }
            | ProtocolError::PayloadLengthMismatch { .. }
            | ProtocolError::OversizedPacket(_)
            | ProtocolError::TrailingBytes(_)
            | ProtocolError::InvalidFlags(_) => ErrorCategory::Size,

            ProtocolError::InvalidCiphertext
            | ProtocolError::AuthenticationOrPaddingError
            | ProtocolError::KeyDerivation(_)
            | ProtocolError::RandomGeneration => ErrorCategory::Crypto,

            ProtocolError::UnsupportedAlgorithm(_)
            | ProtocolError::CompressionError(_)
            | ProtocolError::DecompressionError(_) => ErrorCategory::Compression,

            ProtocolError::SerializeError(_)
            | ProtocolError::DeserializeError(_)
            | ProtocolError::UnknownMessageType(_) => ErrorCategory::Codec,

            ProtocolError::Io(_) => ErrorCategory::Io,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
