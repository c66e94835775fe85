//! Blob compression for remote storage.

use hone_core::cache::Compression;
use hone_core::{Error, Result};
use std::io::{Read, Write};

/// Compress data using the specified codec.
pub fn compress(data: &[u8], codec: Compression) -> Result<Vec<u8>> {
    match codec {
        Compression::None => Ok(data.to_vec()),
        Compression::Zstd => zstd::encode_all(data, 3)
            .map_err(|e| Error::Cache(format!("Zstd compression failed: {}", e))),
        Compression::Gzip => {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder
                .write_all(data)
                .and_then(|_| encoder.finish())
                .map_err(|e| Error::Cache(format!("Gzip compression failed: {}", e)))
        }
        Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
    }
}

/// Decompress data using the specified codec.
pub fn decompress(data: &[u8], codec: Compression) -> Result<Vec<u8>> {
    match codec {
        Compression::None => Ok(data.to_vec()),
        Compression::Zstd => zstd::decode_all(data)
            .map_err(|e| Error::Cache(format!("Zstd decompression failed: {}", e))),
        Compression::Gzip => {
            let mut output = Vec::new();
            flate2::read::GzDecoder::new(data)
                .read_to_end(&mut output)
                .map_err(|e| Error::Cache(format!("Gzip decompression failed: {}", e)))?;
            Ok(output)
        }
        Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
            .map_err(|e| Error::Cache(format!("LZ4 decompression failed: {}", e))),
    }
}

/// Name stored alongside a remote blob so it can be read back after the
/// configured codec changes.
pub fn codec_name(codec: Compression) -> &'static str {
    match codec {
        Compression::None => "none",
        Compression::Zstd => "zstd",
        Compression::Gzip => "gzip",
        Compression::Lz4 => "lz4",
    }
}

pub fn parse_codec(name: &str) -> Option<Compression> {
    match name {
        "none" => Some(Compression::None),
        "zstd" => Some(Compression::Zstd),
        "gzip" => Some(Compression::Gzip),
        "lz4" => Some(Compression::Lz4),
        _ => None,
    }
}
