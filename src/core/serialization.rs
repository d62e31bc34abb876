//! # Serialization Formats
//!
//! Payload codec boundary and the serialization formats behind it.
//!
//! The pipeline never encodes payload variants itself. It asks a
//! [`PayloadCodec`] to turn a typed payload into bytes (and back, given the
//! message type read off the wire). The crate ships a serde-based codec over
//! its own payload union; applications with their own message set implement
//! the trait directly.
//!
//! ## Formats
//! - **Bincode**: compact binary (default, fastest)
//! - **JSON**: human-readable, for debugging and interop
//! - **MessagePack**: compact, self-describing binary
//!
//! ## Process-wide default
//! [`default_config`] returns the serialization settings used by
//! `SerdePayloadCodec::default()`. It is initialized at most once, either
//! explicitly through [`init_default_config`] or lazily from the
//! environment, and is read-only afterwards.

use crate::core::packet::MessageType;
use crate::error::{ProtocolError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

/// Payload body encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    #[default]
    Bincode,
    Json,
    MessagePack,
}

impl SerializationFormat {
    pub const ALL: [SerializationFormat; 3] = [
        SerializationFormat::Bincode,
        SerializationFormat::Json,
        SerializationFormat::MessagePack,
    ];

    /// Header byte written in front of the body when headers are enabled
    pub fn format_byte(self) -> u8 {
        self as u8 + 1
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.format_byte() == byte)
    }

    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "bincode",
            SerializationFormat::Json => "json",
            SerializationFormat::MessagePack => "msgpack",
        }
    }
}

impl FromStr for SerializationFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase().replace('_', "");
        if lowered == "messagepack" {
            return Ok(SerializationFormat::MessagePack);
        }
        Self::ALL
            .into_iter()
            .find(|format| format.name() == lowered)
            .ok_or_else(|| ProtocolError::ConfigError(format!("Unknown serialization format: {s}")))
    }
}

/// Serde types encodable in any [`SerializationFormat`]. Blanket-implemented.
pub trait MultiFormat: Serialize + DeserializeOwned + Sized {
    fn serialize_format(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        match format {
            SerializationFormat::Bincode => {
                bincode::serialize(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::Json => {
                serde_json::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
            SerializationFormat::MessagePack => {
                rmp_serde::to_vec(self).map_err(|e| ProtocolError::SerializeError(e.to_string()))
            }
        }
    }

    /// Body prefixed with the format byte
    fn serialize_with_header(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        let body = self.serialize_format(format)?;
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(format.format_byte());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn deserialize_format(data: &[u8], format: SerializationFormat) -> Result<Self> {
        match format {
            SerializationFormat::Bincode => bincode::deserialize(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::Json => serde_json::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
            SerializationFormat::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string())),
        }
    }

    /// Read the format byte, then decode the rest in that format
    fn deserialize_with_header(data: &[u8]) -> Result<(Self, SerializationFormat)> {
        let Some((&byte, body)) = data.split_first() else {
            return Err(ProtocolError::DeserializeError("missing format byte".into()));
        };
        let format = SerializationFormat::from_byte(byte).ok_or_else(|| {
            ProtocolError::DeserializeError(format!("format byte {byte:#04x} is not recognised"))
        })?;
        Self::deserialize_format(body, format).map(|value| (value, format))
    }
}

impl<T: Serialize + DeserializeOwned> MultiFormat for T {}

/// Converts typed payloads to and from flat byte buffers.
pub trait PayloadCodec {
    type Payload;

    /// Encode a payload to bytes
    fn serialize(&self, payload: &Self::Payload) -> Result<Vec<u8>>;

    /// Decode bytes received under `message_type`
    ///
    /// # Errors
    /// `UnknownMessageType` when no payload variant is registered for the type
    fn deserialize(&self, bytes: &[u8], message_type: MessageType) -> Result<Self::Payload>;

    /// The message type a payload is sent as, if it has one
    fn message_type_for(&self, payload: &Self::Payload) -> Option<MessageType>;
}

/// Serialization settings shared by default-constructed codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationConfig {
    /// Format used for payload bodies
    pub format: SerializationFormat,

    /// Prefix payload bodies with the format byte so the receiver can
    /// detect the format
    pub with_header: bool,
}

impl SerializationConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(format) = std::env::var("PACKET_PIPELINE_SERIALIZATION_FORMAT") {
            if let Ok(val) = format.parse() {
                config.format = val;
            }
        }
        if let Ok(header) = std::env::var("PACKET_PIPELINE_SERIALIZATION_HEADER") {
            if let Ok(val) = header.parse() {
                config.with_header = val;
            }
        }
        config
    }
}

static DEFAULT_CONFIG: OnceLock<SerializationConfig> = OnceLock::new();

/// Process-wide default serialization settings.
///
/// Initialized from the environment on first use unless
/// [`init_default_config`] ran earlier.
pub fn default_config() -> &'static SerializationConfig {
    DEFAULT_CONFIG.get_or_init(SerializationConfig::from_env)
}

/// Set the process-wide default. Only the first initialization wins.
///
/// # Errors
/// Returns `ProtocolError::ConfigError` if the default was already
/// initialized, explicitly or by an earlier [`default_config`] call.
pub fn init_default_config(config: SerializationConfig) -> Result<()> {
    DEFAULT_CONFIG.set(config).map_err(|_| {
        ProtocolError::ConfigError("Serialization defaults already initialized".to_string())
    })
}
