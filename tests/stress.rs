use bytes::BytesMut;
use packet_pipeline::core::codec::PacketCodec;
use packet_pipeline::core::packet::{MessageType, Packet, PacketFlags, WireFormat};
use packet_pipeline::protocol::builder::PacketBuilder;
use packet_pipeline::protocol::parser::PacketParser;
use packet_pipeline::utils::compression::{CompressionAlgorithm, CompressionLevel};
use packet_pipeline::utils::crypto::EncryptionKey;
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn stress_frame_encode_decode_large_series() {
    // Heavy burst of frames of growing size through the stream codec
    let mut codec = PacketCodec::default();
    let mut buf = BytesMut::new();

    for size in [0usize, 1, 64, 512, 4096, 65536, 1_048_576] {
        for _ in 0..200 {
            let p = Packet {
                flags: PacketFlags::empty(),
                message_type: MessageType::WorldState,
                payload: vec![0u8; size],
                timestamp: None,
            };
            codec.encode(p, &mut buf).unwrap();
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded.payload.len(), size);
            assert!(buf.is_empty());
        }
    }
}

#[test]
fn stress_full_pipeline_large_payloads() {
    let key = EncryptionKey::new([0x21; 32]);
    let parser = PacketParser::new()
        .with_key(key.clone())
        .with_compression_algorithm(CompressionAlgorithm::Lz4);

    for size in [1usize, 1_000, 100_000, 4 * 1024 * 1024] {
        let payload: Vec<u8> = (0..size).map(|i| (i % 97) as u8).collect();
        let bytes = PacketBuilder::new()
            .with_raw_payload(payload.clone())
            .with_message_type(MessageType::WorldState)
            .with_encryption_key(key.clone())
            .with_compression_algorithm(CompressionAlgorithm::Lz4, CompressionLevel::Fastest)
            .build()
            .unwrap()
            .to_bytes(WireFormat::Compact)
            .unwrap();
        let packet = parser.parse(&bytes).unwrap();
        assert_eq!(parser.open(&packet).unwrap(), payload);
    }
}

#[test]
fn stress_random_payloads_every_algorithm() {
    use rand::Rng;

    let mut rng = rand::rng();
    let key = EncryptionKey::new(rng.random());

    for algorithm in CompressionAlgorithm::ALL {
        let parser = PacketParser::new()
            .with_key(key.clone())
            .with_compression_algorithm(algorithm);
        for _ in 0..50 {
            let size = rng.random_range(0..200_000usize);
            let mut payload = vec![0u8; size];
            rng.fill(&mut payload[..]);

            let packet = PacketBuilder::new()
                .with_raw_payload(payload.clone())
                .with_message_type(MessageType::Other(rng.random_range(8..=255u8)))
                .with_encryption_key(key.clone())
                .with_compression_algorithm(algorithm, CompressionLevel::Fastest)
                .build()
                .unwrap();
            assert_eq!(parser.open(&packet).unwrap(), payload);
        }
    }
}
