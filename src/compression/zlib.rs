use crate::error::{CompressionError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::Read;

/// Deflates `data` at the default compression level and wraps it in the
/// stable `{u32 uncompressed_size, u32 compressed_len, compressed_bytes}`
/// record described in `spec.md` §4.6/§6, so the decoder can preallocate
/// exactly.
pub fn compress_zlib(data: &[u8]) -> Result<Bytes> {
    let mut encoder = ZlibEncoder::new(data, Compression::default());
    let mut compressed = Vec::new();
    encoder
        .read_to_end(&mut compressed)
        .map_err(CompressionError::ZlibCompress)?;

    let mut out = BytesMut::with_capacity(8 + compressed.len());
    out.put_u32_le(data.len() as u32);
    out.put_u32_le(compressed.len() as u32);
    out.extend_from_slice(&compressed);
    Ok(out.freeze())
}

/// Inflates a record produced by [`compress_zlib`]. Fails on a truncated
/// record, a deflate stream error, or a stream that ends before
/// producing the declared `uncompressed_size` bytes.
pub fn decompress_zlib(data: &[u8]) -> Result<Bytes> {
    if data.len() < 8 {
        return Err(CompressionError::MalformedFrame.into());
    }

    let mut cursor = &data[..];
    let uncompressed_size = cursor.get_u32_le() as usize;
    let compressed_len = cursor.get_u32_le() as usize;

    if cursor.len() < compressed_len {
        return Err(CompressionError::MalformedFrame.into());
    }

    let mut decoder = ZlibDecoder::new(&cursor[..compressed_len]);
    let mut out = Vec::with_capacity(uncompressed_size);
    decoder
        .read_to_end(&mut out)
        .map_err(CompressionError::ZlibDecompress)?;

    if out.len() != uncompressed_size {
        return Err(CompressionError::MalformedFrame.into());
    }

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let compressed = compress_zlib(&payload).unwrap();
        let decompressed = decompress_zlib(&compressed).unwrap();
        assert_eq!(decompressed.as_ref(), payload.as_slice());
    }

    #[test]
    fn round_trips_empty_input() {
        let compressed = compress_zlib(&[]).unwrap();
        let decompressed = decompress_zlib(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn rejects_truncated_record() {
        assert!(decompress_zlib(&[0u8; 3]).is_err());
    }

    #[test]
    fn rejects_corrupted_compressed_bytes() {
        let mut compressed = compress_zlib(b"hello world").unwrap().to_vec();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xff;
        assert!(decompress_zlib(&compressed).is_err());
    }
}
