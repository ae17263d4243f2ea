#![no_main]

use libfuzzer_sys::fuzz_target;
use sockframe::utils::compression::{compress, decompress, inflate, CompressionKind};
use sockframe::ByteBuffer;

fuzz_target!(|data: &[u8]| {
    // Roundtrips must hold for every kind
    for kind in [
        CompressionKind::Zlib,
        CompressionKind::Gzip,
        CompressionKind::Lz4,
        CompressionKind::Zstd,
    ] {
        if let Ok(compressed) = compress(data, &kind) {
            let restored = decompress(&compressed, &kind).expect("roundtrip");
            assert_eq!(restored, data);
        }
        // Malformed input must fail cleanly within the size limit
        let _ = decompress(data, &kind);
    }

    let _ = inflate(data);

    // Prefix handling with every possible split point of short inputs
    if data.len() <= 64 {
        let buffer = ByteBuffer::copy_from(data);
        for offset in 0..=data.len() {
            if let Ok(out) = buffer.decompress(offset) {
                assert_eq!(&out[..offset], &data[..offset]);
            }
        }
    }
});
