#![no_main]

use libfuzzer_sys::fuzz_target;
use packet_pipeline::utils::compression::{
    compress, decompress, decompress_with_limit, CompressionAlgorithm, CompressionLevel,
};

const LIMIT: usize = 4 * 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    for algorithm in CompressionAlgorithm::ALL {
        // Round trip must be the identity
        if let Ok(compressed) = compress(data, algorithm, CompressionLevel::Fastest) {
            if let Ok(restored) = decompress(&compressed, algorithm) {
                assert_eq!(restored, data);
            }
        }

        // Arbitrary input must fail cleanly and respect the size limit
        if let Ok(out) = decompress_with_limit(data, algorithm, LIMIT) {
            assert!(out.len() <= LIMIT);
        }
    }
});
