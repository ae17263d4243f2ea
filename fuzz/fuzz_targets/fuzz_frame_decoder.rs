#![no_main]

use std::sync::Arc;

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use sockframe::core::framing::FramingCodec;
use sockframe::{FrameCodec, LengthCodec, MarkedLengthCodec};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, stream)) = data.split_first() else {
        return;
    };
    let codec: Arc<dyn FrameCodec> = match selector % 5 {
        0 => Arc::new(LengthCodec::u8()),
        1 => Arc::new(LengthCodec::u16()),
        2 => Arc::new(LengthCodec::u32()),
        3 => Arc::new(LengthCodec::u64()),
        _ => Arc::new(MarkedLengthCodec::default()),
    };
    let mut framing = FramingCodec::new(codec, 64 * 1024);

    // Feed in uneven chunks; decoding must never panic and every frame must
    // carry exactly the announced length
    let mut src = BytesMut::new();
    for chunk in stream.chunks(usize::from(selector % 7) + 1) {
        src.extend_from_slice(chunk);
        loop {
            match framing.decode(&mut src) {
                Ok(Some(frame)) => {
                    let announced = framing.codec().parse(&frame.header).expect("header reparses");
                    assert_eq!(announced, frame.payload.len());
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
    }
    let _ = framing.decode_eof(&mut src);
});
