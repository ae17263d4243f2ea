//! # Utility Modules
//!
//! Supporting utilities for compression and logging.
//!
//! ## Components
//! - **Compression**: zlib/gzip inflate with growing output, plus LZ4 and Zstd
//! - **Logging**: `tracing-subscriber` setup driven by [`LoggingConfig`](crate::config::LoggingConfig)
//!
//! ## Security
//! - Decompression bomb protection (`MAX_DECOMPRESSION_SIZE` ceiling)

pub mod compression;
pub mod logging;
