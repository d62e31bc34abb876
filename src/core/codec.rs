//! Stream framing for reliable byte-stream transports.
//!
//! Datagram transports hand one complete frame to [`Packet::from_bytes`].
//! Stream transports can wrap their socket in `tokio_util::codec::Framed`
//! with [`PacketCodec`], which buffers until a whole frame has arrived.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::packet::{Packet, WireFormat, HEADER_SIZE};
use crate::error::{ProtocolError, Result};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec {
    format: WireFormat,
}

impl PacketCodec {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let declared = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if declared > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::OversizedPacket(declared));
        }

        let total = self.format.overhead() + declared;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total);
        let (packet, _) = Packet::parse_frame(&frame, self.format)?;
        Ok(Some(packet))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        let mut frame = Vec::with_capacity(item.encoded_len(self.format));
        item.write_to(&mut frame, self.format)?;
        dst.reserve(frame.len());
        dst.put_slice(&frame);
        Ok(())
    }
}

/// Drain every complete frame currently buffered in `src`.
pub fn decode_all(codec: &mut PacketCodec, src: &mut BytesMut) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    while let Some(packet) = codec.decode(src)? {
        packets.push(packet);
    }
    Ok(packets)
}
