//! Gzip handling for fetched logs and delivery-stream payloads.
//!
//! Database log exports are gzip-compressed at rest, and some of them have
//! been compressed twice. [`GzipCodec::peel`] removes one layer and says
//! explicitly whether there was a layer to remove, so callers can decide
//! whether plain input is acceptable instead of catching a failure.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use snafu::prelude::*;

use crate::error::{DecompressionError, GzipSnafu};

/// Leading bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Outcome of removing one compression layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    /// The input was gzip; this is its inflated content.
    Compressed(Vec<u8>),
    /// The input does not start with a gzip header.
    AlreadyPlain,
}

/// Returns true if `data` starts with a gzip header.
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Gzip compression codec using flate2.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec;

impl GzipCodec {
    /// Decompress data that must be gzip.
    ///
    /// Concatenated members are inflated back to back, the way `gunzip`
    /// treats them.
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, DecompressionError> {
        if !is_gzip(data) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "missing gzip header"))
                .context(GzipSnafu);
        }

        let mut decoder = MultiGzDecoder::new(data);
        let mut buf = Vec::new();
        decoder.read_to_end(&mut buf).context(GzipSnafu)?;
        Ok(buf)
    }

    /// Remove one layer if present.
    ///
    /// Plain input is `Ok(Layer::AlreadyPlain)`. Input with a gzip header that
    /// fails to inflate is still an error.
    pub fn peel(&self, data: &[u8]) -> Result<Layer, DecompressionError> {
        if !is_gzip(data) {
            return Ok(Layer::AlreadyPlain);
        }
        self.decompress(data).map(Layer::Compressed)
    }

    /// Compress data with the default level.
    pub fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DATA: &[u8] = b"2024-01-15 10:00:00 UTC::@:[123]:LOG:  checkpoint starting\n";

    #[test]
    fn test_decompress_gzip() {
        let compressed = GzipCodec.compress(TEST_DATA).unwrap();
        assert!(is_gzip(&compressed));
        assert_eq!(GzipCodec.decompress(&compressed).unwrap(), TEST_DATA);
    }

    #[test]
    fn test_decompress_rejects_plain_input() {
        let err = GzipCodec.decompress(TEST_DATA).unwrap_err();
        assert!(matches!(err, DecompressionError::Gzip { .. }));

        assert!(GzipCodec.decompress(&[]).is_err());
    }

    #[test]
    fn test_decompress_concatenated_members() {
        let mut data = GzipCodec.compress(b"first\n").unwrap();
        data.extend(GzipCodec.compress(b"second\n").unwrap());

        assert_eq!(GzipCodec.decompress(&data).unwrap(), b"first\nsecond\n");
    }

    #[test]
    fn test_peel_layers() {
        let once = GzipCodec.compress(TEST_DATA).unwrap();
        let twice = GzipCodec.compress(&once).unwrap();

        let Layer::Compressed(inner) = GzipCodec.peel(&twice).unwrap() else {
            panic!("expected a compressed layer");
        };
        assert_eq!(inner, once);
        assert_eq!(
            GzipCodec.peel(&inner).unwrap(),
            Layer::Compressed(TEST_DATA.to_vec())
        );
        assert_eq!(GzipCodec.peel(TEST_DATA).unwrap(), Layer::AlreadyPlain);
    }

    #[test]
    fn test_peel_truncated_stream_is_an_error() {
        let compressed = GzipCodec.compress(TEST_DATA).unwrap();
        let truncated = &compressed[..compressed.len() / 2];

        assert!(GzipCodec.peel(truncated).is_err());
    }
}
