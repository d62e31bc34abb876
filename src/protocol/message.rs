//! Game message payloads and the serde-backed payload codec.
//!
//! Each [`Payload`] variant wraps a plain struct. Only the struct body is
//! serialized; the variant travels as the packet's [`MessageType`] byte and
//! is resolved through the [`MessageRegistry`].

use crate::core::packet::{MessageType, Timestamp};
use crate::core::serialization::{
    default_config, MultiFormat, PayloadCodec, SerializationConfig, SerializationFormat,
};
use crate::error::{ProtocolError, Result};
use crate::protocol::registry::MessageRegistry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConnect {
    pub player_id: u64,
    pub name: String,
    pub client_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDisconnect {
    pub player_id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: u64,
    pub position: Vec3,
    pub rotation: f32,
}

/// Full or partial snapshot of the simulated world at one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub tick: u64,
    pub entities: Vec<EntityState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub player_id: u64,
    pub position: Vec3,
    pub velocity: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAction {
    pub player_id: u64,
    pub action: u16,
    pub target: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender_id: u64,
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    pub sent_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub sequence: u32,
}

/// Every payload that can be built into a packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    PlayerConnect(PlayerConnect),
    PlayerDisconnect(PlayerDisconnect),
    WorldState(WorldState),
    PlayerPosition(PlayerPosition),
    PlayerAction(PlayerAction),
    ChatMessage(ChatMessage),
    Ping(Ping),
    Heartbeat(Heartbeat),
}

/// Fieldless mirror of [`Payload`] used as the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    PlayerConnect,
    PlayerDisconnect,
    WorldState,
    PlayerPosition,
    PlayerAction,
    ChatMessage,
    Ping,
    Heartbeat,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::PlayerConnect(_) => PayloadKind::PlayerConnect,
            Payload::PlayerDisconnect(_) => PayloadKind::PlayerDisconnect,
            Payload::WorldState(_) => PayloadKind::WorldState,
            Payload::PlayerPosition(_) => PayloadKind::PlayerPosition,
            Payload::PlayerAction(_) => PayloadKind::PlayerAction,
            Payload::ChatMessage(_) => PayloadKind::ChatMessage,
            Payload::Ping(_) => PayloadKind::Ping,
            Payload::Heartbeat(_) => PayloadKind::Heartbeat,
        }
    }

    /// Message type from the global registry
    pub fn message_type(&self) -> Option<MessageType> {
        MessageRegistry::global().message_type_for(self.kind())
    }
}

/// [`PayloadCodec`] for [`Payload`] using serde and the global registry.
#[derive(Debug, Clone, Copy)]
pub struct SerdePayloadCodec {
    config: SerializationConfig,
    registry: &'static MessageRegistry,
}

impl Default for SerdePayloadCodec {
    fn default() -> Self {
        Self::with_config(*default_config())
    }
}

impl SerdePayloadCodec {
    pub fn new(format: SerializationFormat) -> Self {
        Self::with_config(SerializationConfig {
            format,
            with_header: false,
        })
    }

    pub fn with_config(config: SerializationConfig) -> Self {
        Self {
            config,
            registry: MessageRegistry::global(),
        }
    }

    pub fn config(&self) -> SerializationConfig {
        self.config
    }

    fn encode<T: MultiFormat>(&self, body: &T) -> Result<Vec<u8>> {
        if self.config.with_header {
            body.serialize_with_header(self.config.format)
        } else {
            body.serialize_format(self.config.format)
        }
    }

    fn decode<T: MultiFormat>(&self, bytes: &[u8]) -> Result<T> {
        if self.config.with_header {
            T::deserialize_with_header(bytes).map(|(body, _)| body)
        } else {
            T::deserialize_format(bytes, self.config.format)
        }
    }
}

impl PayloadCodec for SerdePayloadCodec {
    type Payload = Payload;

    fn serialize(&self, payload: &Payload) -> Result<Vec<u8>> {
        match payload {
            Payload::PlayerConnect(body) => self.encode(body),
            Payload::PlayerDisconnect(body) => self.encode(body),
            Payload::WorldState(body) => self.encode(body),
            Payload::PlayerPosition(body) => self.encode(body),
            Payload::PlayerAction(body) => self.encode(body),
            Payload::ChatMessage(body) => self.encode(body),
            Payload::Ping(body) => self.encode(body),
            Payload::Heartbeat(body) => self.encode(body),
        }
    }

    fn deserialize(&self, bytes: &[u8], message_type: MessageType) -> Result<Payload> {
        let kind = self
            .registry
            .payload_kind_for(message_type)
            .ok_or(ProtocolError::UnknownMessageType(message_type.into()))?;

        let payload = match kind {
            PayloadKind::PlayerConnect => Payload::PlayerConnect(self.decode(bytes)?),
            PayloadKind::PlayerDisconnect => Payload::PlayerDisconnect(self.decode(bytes)?),
            PayloadKind::WorldState => Payload::WorldState(self.decode(bytes)?),
            PayloadKind::PlayerPosition => Payload::PlayerPosition(self.decode(bytes)?),
            PayloadKind::PlayerAction => Payload::PlayerAction(self.decode(bytes)?),
            PayloadKind::ChatMessage => Payload::ChatMessage(self.decode(bytes)?),
            PayloadKind::Ping => Payload::Ping(self.decode(bytes)?),
            PayloadKind::Heartbeat => Payload::Heartbeat(self.decode(bytes)?),
        };
        Ok(payload)
    }

    fn message_type_for(&self, payload: &Payload) -> Option<MessageType> {
        self.registry.message_type_for(payload.kind())
    }
}
