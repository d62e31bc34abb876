//! Packet types and the binary wire format.
//!
//! ```text
//! [Flags(1)] [MessageType(1)] [Length(4, LE)] [Payload(N)] [Timestamp(8, LE)]?
//! ```
//!
//! The timestamp is only present in the [`WireFormat::Timestamped`] variant.
//! Which variant is in use is agreed by configuration, not signalled on the
//! wire.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{ProtocolError, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed header size: flags + message type + payload length
pub const HEADER_SIZE: usize = 1 + 1 + 4;

/// Size of the trailing timestamp in the timestamped wire format
pub const TIMESTAMP_SIZE: usize = 8;

bitflags! {
    /// Transforms applied to a packet's payload before framing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct PacketFlags: u8 {
        /// Payload was compressed
        const COMPRESSED = 0b0000_0001;
        /// Payload was encrypted
        const ENCRYPTED = 0b0000_0010;
        /// Both transforms ran with compression first. Clear means
        /// encryption ran first (the reference order).
        const COMPRESS_FIRST = 0b0000_0100;
    }
}

/// Semantic kind of a packet payload. One byte on the wire.
///
/// Unknown bytes are preserved as [`MessageType::Other`] so that framing
/// never rejects a type it does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MessageType {
    PlayerConnect,
    PlayerDisconnect,
    WorldState,
    PlayerPosition,
    PlayerAction,
    ChatMessage,
    Ping,
    Heartbeat,
    Other(u8),
}

impl MessageType {
    pub const KNOWN: [MessageType; 8] = [
        MessageType::PlayerConnect,
        MessageType::PlayerDisconnect,
        MessageType::WorldState,
        MessageType::PlayerPosition,
        MessageType::PlayerAction,
        MessageType::ChatMessage,
        MessageType::Ping,
        MessageType::Heartbeat,
    ];

    pub fn is_known(self) -> bool {
        !matches!(self, MessageType::Other(_))
    }
}

impl From<u8> for MessageType {
    fn from(byte: u8) -> Self {
        match byte {
            0 => MessageType::PlayerConnect,
            1 => MessageType::PlayerDisconnect,
            2 => MessageType::WorldState,
            3 => MessageType::PlayerPosition,
            4 => MessageType::PlayerAction,
            5 => MessageType::ChatMessage,
            6 => MessageType::Ping,
            7 => MessageType::Heartbeat,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::PlayerConnect => 0,
            MessageType::PlayerDisconnect => 1,
            MessageType::WorldState => 2,
            MessageType::PlayerPosition => 3,
            MessageType::PlayerAction => 4,
            MessageType::ChatMessage => 5,
            MessageType::Ping => 6,
            MessageType::Heartbeat => 7,
            MessageType::Other(byte) => byte,
        }
    }
}

/// Selects whether frames carry a trailing timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Compact,
    Timestamped,
}

impl WireFormat {
    /// Bytes a frame occupies in addition to its payload
    pub fn overhead(self) -> usize {
        match self {
            WireFormat::Compact => HEADER_SIZE,
            WireFormat::Timestamped => HEADER_SIZE + TIMESTAMP_SIZE,
        }
    }
}

/// Ticks (100 ns) between 0001-01-01 and the Unix epoch
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

const TICKS_MASK: i64 = 0x3FFF_FFFF_FFFF_FFFF;

/// Kind marker stored in the top bits of the binary form for UTC instants
const KIND_UTC: i64 = 0x4000_0000_0000_0000;

/// UTC instant as 100-nanosecond ticks since 0001-01-01T00:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    pub fn from_ticks(ticks: i64) -> Self {
        Self(ticks & TICKS_MASK)
    }

    pub fn ticks(self) -> i64 {
        self.0
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let ticks = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => UNIX_EPOCH_TICKS + (after.as_nanos() / 100) as i64,
            Err(before) => UNIX_EPOCH_TICKS - (before.duration().as_nanos() / 100) as i64,
        };
        Self::from_ticks(ticks)
    }

    /// Milliseconds since the Unix epoch (negative before 1970)
    pub fn unix_millis(self) -> i64 {
        (self.0 - UNIX_EPOCH_TICKS) / 10_000
    }

    /// Binary form written to the wire: ticks tagged with the UTC kind bits
    pub fn to_binary(self) -> i64 {
        self.0 | KIND_UTC
    }

    /// Inverse of [`Timestamp::to_binary`]. Kind bits are discarded.
    pub fn from_binary(raw: i64) -> Self {
        Self::from_ticks(raw)
    }
}

/// The framed, transform-applied unit exchanged over the transport.
///
/// `payload` holds the transformed bytes described by `flags`, never the
/// typed value itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub flags: PacketFlags,
    pub message_type: MessageType,
    pub payload: Vec<u8>,
    pub timestamp: Option<Timestamp>,
}

impl Packet {
    /// Frame size of this packet in the given wire format
    pub fn encoded_len(&self, format: WireFormat) -> usize {
        format.overhead() + self.payload.len()
    }

    /// Serialize the packet into a fresh buffer.
    ///
    /// # Errors
    /// - `OversizedPacket` if the payload exceeds `MAX_PAYLOAD_SIZE`
    /// - `MissingTimestamp` for the timestamped format without a timestamp
    pub fn to_bytes(&self, format: WireFormat) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len(format));
        self.write_to(&mut out, format)?;
        Ok(out)
    }

    /// Append the framed packet to `out`
    pub fn write_to(&self, out: &mut Vec<u8>, format: WireFormat) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(self.payload.len()));
        }
        let timestamp = match format {
            WireFormat::Compact => None,
            WireFormat::Timestamped => Some(self.timestamp.ok_or(ProtocolError::MissingTimestamp)?),
        };

        out.reserve(self.encoded_len(format));
        out.push(self.flags.bits());
        out.push(self.message_type.into());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        if let Some(ts) = timestamp {
            out.extend_from_slice(&ts.to_binary().to_le_bytes());
        }
        Ok(())
    }

    /// Parse exactly one frame from `bytes`.
    ///
    /// The message type is not validated here; unknown values come back as
    /// [`MessageType::Other`].
    pub fn from_bytes(bytes: &[u8], format: WireFormat) -> Result<Self> {
        let (packet, used) = Self::parse_frame(bytes, format)?;
        if used != bytes.len() {
            return Err(ProtocolError::TrailingBytes(bytes.len() - used));
        }
        Ok(packet)
    }

    /// Parse one frame from the front of `bytes`, returning it with the
    /// number of bytes consumed.
    pub(crate) fn parse_frame(bytes: &[u8], format: WireFormat) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }

        let flags =
            PacketFlags::from_bits(bytes[0]).ok_or(ProtocolError::InvalidFlags(bytes[0]))?;
        let message_type = MessageType::from(bytes[1]);
        let declared = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]) as usize;

        if declared > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(declared));
        }
        let available = bytes.len() - HEADER_SIZE;
        if declared > available {
            return Err(ProtocolError::PayloadLengthMismatch {
                declared,
                available,
            });
        }

        let payload_end = HEADER_SIZE + declared;
        let payload = bytes[HEADER_SIZE..payload_end].to_vec();

        let (timestamp, used) = match format {
            WireFormat::Compact => (None, payload_end),
            WireFormat::Timestamped => {
                let end = payload_end + TIMESTAMP_SIZE;
                let raw: [u8; TIMESTAMP_SIZE] = bytes
                    .get(payload_end..end)
                    .and_then(|slice| slice.try_into().ok())
                    .ok_or(ProtocolError::FrameTooShort {
                        needed: end,
                        available: bytes.len(),
                    })?;
                (Some(Timestamp::from_binary(i64::from_le_bytes(raw))), end)
            }
        };

        Ok((
            Packet {
                flags,
                message_type,
                payload,
                timestamp,
            },
            used,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::time::Duration;

    fn sample(flags: PacketFlags) -> Packet {
        Packet {
            flags,
            message_type: MessageType::PlayerPosition,
            payload: vec![1, 2, 3, 4, 5],
            timestamp: None,
        }
    }

    #[test]
    fn test_layout() {
        let bytes = sample(PacketFlags::COMPRESSED)
            .to_bytes(WireFormat::Compact)
            .unwrap();
        assert_eq!(bytes, vec![0x01, 3, 5, 0, 0, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_roundtrip_every_flag_combination() {
        for bits in 0..=0b111u8 {
            let flags = PacketFlags::from_bits(bits).unwrap();
            let packet = sample(flags);
            let bytes = packet.to_bytes(WireFormat::Compact).unwrap();
            assert_eq!(Packet::from_bytes(&bytes, WireFormat::Compact).unwrap(), packet);
        }
    }

    #[test]
    fn test_empty_payload_is_header_only() {
        let packet = Packet {
            flags: PacketFlags::empty(),
            message_type: MessageType::Ping,
            payload: Vec::new(),
            timestamp: None,
        };
        let bytes = packet.to_bytes(WireFormat::Compact).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = Packet::from_bytes(&bytes, WireFormat::Compact).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_timestamped_roundtrip() {
        let mut packet = sample(PacketFlags::empty());
        packet.timestamp = Some(Timestamp::now());
        let bytes = packet.to_bytes(WireFormat::Timestamped).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 5 + TIMESTAMP_SIZE);
        assert_eq!(
            Packet::from_bytes(&bytes, WireFormat::Timestamped).unwrap(),
            packet
        );
    }

    #[test]
    fn test_timestamped_requires_timestamp() {
        assert!(matches!(
            sample(PacketFlags::empty()).to_bytes(WireFormat::Timestamped),
            Err(ProtocolError::MissingTimestamp)
        ));
    }

    #[test]
    fn test_compact_drops_timestamp() {
        let mut packet = sample(PacketFlags::empty());
        packet.timestamp = Some(Timestamp::now());
        let bytes = packet.to_bytes(WireFormat::Compact).unwrap();
        assert_eq!(
            Packet::from_bytes(&bytes, WireFormat::Compact)
                .unwrap()
                .timestamp,
            None
        );
    }

    #[test]
    fn test_short_header() {
        assert!(matches!(
            Packet::from_bytes(&[0, 6, 0], WireFormat::Compact),
            Err(ProtocolError::FrameTooShort {
                needed: HEADER_SIZE,
                available: 3
            })
        ));
    }

    #[test]
    fn test_missing_timestamp_bytes() {
        let bytes = sample(PacketFlags::empty())
            .to_bytes(WireFormat::Compact)
            .unwrap();
        assert!(matches!(
            Packet::from_bytes(&bytes, WireFormat::Timestamped),
            Err(ProtocolError::FrameTooShort { .. })
        ));
    }

    #[test]
    fn test_declared_length_exceeds_buffer() {
        let mut bytes = sample(PacketFlags::empty())
            .to_bytes(WireFormat::Compact)
            .unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            Packet::from_bytes(&bytes, WireFormat::Compact),
            Err(ProtocolError::PayloadLengthMismatch {
                declared: 5,
                available: 3
            })
        ));
    }

    #[test]
    fn test_oversized_declared_length() {
        let mut bytes = vec![0, 0];
        bytes.extend_from_slice(&(20_000_000u32).to_le_bytes());
        bytes.extend_from_slice(&[0xFF; 10]);
        assert!(matches!(
            Packet::from_bytes(&bytes, WireFormat::Compact),
            Err(ProtocolError::OversizedPacket(20_000_000))
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = sample(PacketFlags::empty())
            .to_bytes(WireFormat::Compact)
            .unwrap();
        bytes.push(0);
        assert!(matches!(
            Packet::from_bytes(&bytes, WireFormat::Compact),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_unknown_flag_bits_rejected() {
        let bytes = [0x80, 6, 0, 0, 0, 0];
        assert!(matches!(
            Packet::from_bytes(&bytes, WireFormat::Compact),
            Err(ProtocolError::InvalidFlags(0x80))
        ));
    }

    #[test]
    fn test_unknown_message_type_passes_through() {
        let bytes = [0x00, 200, 0, 0, 0, 0];
        let packet = Packet::from_bytes(&bytes, WireFormat::Compact).unwrap();
        assert_eq!(packet.message_type, MessageType::Other(200));
        assert!(!packet.message_type.is_known());
    }

    #[test]
    fn test_message_type_byte_mapping() {
        for (i, kind) in MessageType::KNOWN.iter().enumerate() {
            assert_eq!(u8::from(*kind), i as u8);
            assert_eq!(MessageType::from(i as u8), *kind);
        }
    }

    #[test]
    fn test_timestamp_binary_form() {
        let epoch = Timestamp::from_system_time(UNIX_EPOCH);
        assert_eq!(epoch.ticks(), UNIX_EPOCH_TICKS);
        assert_eq!(epoch.unix_millis(), 0);
        assert_eq!(epoch.to_binary() & !TICKS_MASK, KIND_UTC);
        assert_eq!(Timestamp::from_binary(epoch.to_binary()), epoch);

        let later = Timestamp::from_system_time(UNIX_EPOCH + Duration::from_millis(1_500));
        assert_eq!(later.unix_millis(), 1_500);
        assert!(later > epoch);
    }
}
