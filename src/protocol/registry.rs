use crate::core::packet::MessageType;
use crate::error::constants::{ERR_DUPLICATE_MESSAGE_TYPE, ERR_DUPLICATE_PAYLOAD};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::PayloadKind;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Built-in payload to message type assignments.
const BUILTIN: &[(PayloadKind, MessageType)] = &[
    (PayloadKind::PlayerConnect, MessageType::PlayerConnect),
    (PayloadKind::PlayerDisconnect, MessageType::PlayerDisconnect),
    (PayloadKind::WorldState, MessageType::WorldState),
    (PayloadKind::PlayerPosition, MessageType::PlayerPosition),
    (PayloadKind::PlayerAction, MessageType::PlayerAction),
    (PayloadKind::ChatMessage, MessageType::ChatMessage),
    (PayloadKind::Ping, MessageType::Ping),
    (PayloadKind::Heartbeat, MessageType::Heartbeat),
];

static GLOBAL: OnceLock<MessageRegistry> = OnceLock::new();

/// Bidirectional map between payload variants and message type bytes.
///
/// Both directions are one-to-one: a payload kind is sent under exactly one
/// message type and a message type decodes to exactly one payload kind.
#[derive(Debug, Clone, Default)]
pub struct MessageRegistry {
    by_kind: HashMap<PayloadKind, MessageType>,
    by_type: HashMap<MessageType, PayloadKind>,
}

impl MessageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a table, rejecting duplicates in either direction.
    pub fn from_table(table: &[(PayloadKind, MessageType)]) -> Result<Self> {
        let mut registry = Self::new();
        for &(kind, message_type) in table {
            registry.register(kind, message_type)?;
        }
        Ok(registry)
    }

    /// The registry used by `SerdePayloadCodec`. Built once on first access.
    pub fn global() -> &'static MessageRegistry {
        GLOBAL.get_or_init(|| {
            let mut registry = Self::new();
            for &(kind, message_type) in BUILTIN {
                registry.by_kind.insert(kind, message_type);
                registry.by_type.insert(message_type, kind);
            }
            registry
        })
    }

    pub fn register(&mut self, kind: PayloadKind, message_type: MessageType) -> Result<()> {
        if self.by_kind.contains_key(&kind) {
            return Err(ProtocolError::ConfigError(format!(
                "{ERR_DUPLICATE_PAYLOAD}: {kind:?}"
            )));
        }
        if self.by_type.contains_key(&message_type) {
            return Err(ProtocolError::ConfigError(format!(
                "{ERR_DUPLICATE_MESSAGE_TYPE}: {}",
                u8::from(message_type)
            )));
        }

        self.by_kind.insert(kind, message_type);
        self.by_type.insert(message_type, kind);
        Ok(())
    }

    #[inline]
    pub fn message_type_for(&self, kind: PayloadKind) -> Option<MessageType> {
        self.by_kind.get(&kind).copied()
    }

    #[inline]
    pub fn payload_kind_for(&self, message_type: MessageType) -> Option<PayloadKind> {
        self.by_type.get(&message_type).copied()
    }

    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}
