#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_pipeline::core::packet::{Packet, WireFormat};
use packet_pipeline::protocol::parser::PacketParser;
use packet_pipeline::utils::crypto::EncryptionKey;

fuzz_target!(|data: &[u8]| {
    // Compact frames carry no lossy fields, so anything accepted re-encodes identically
    if let Ok(packet) = Packet::from_bytes(data, WireFormat::Compact) {
        if let Ok(bytes) = packet.to_bytes(WireFormat::Compact) {
            assert_eq!(bytes, data);
        }
    }
    let _ = Packet::from_bytes(data, WireFormat::Timestamped);

    // Full decode path with a key, so encrypted and compressed flags are exercised
    let parser = PacketParser::new()
        .with_key(EncryptionKey::new([0u8; 32]))
        .with_max_payload_size(1024 * 1024);
    let _ = parser.decode(data);
});
