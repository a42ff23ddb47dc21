use crate::error::{CompressionError, Result};
use bytes::Bytes;
use jpeg_encoder::{ColorType, Encoder};

/// JPEG quality matching `spec.md` §4.1: quality 75, 4:4:4 subsampling
/// (`jpeg-encoder` always encodes 4:4:4 — it never subsamples chroma),
/// fast DCT by default.
const QUALITY: u8 = 75;

/// Encodes raw interleaved pixel data as a JPEG blob. `channels` selects
/// the color interpretation: 1 = grayscale, 3 = RGB, 4 = RGBA. Any other
/// channel count is rejected before touching the encoder.
pub fn compress_jpeg(width: u32, height: u32, channels: u8, raw: &[u8]) -> Result<Bytes> {
    let color_type = match channels {
        1 => ColorType::Luma,
        3 => ColorType::Rgb,
        4 => ColorType::Rgba,
        other => return Err(CompressionError::UnsupportedChannels(other).into()),
    };

    let mut out = Vec::new();
    let encoder = Encoder::new(&mut out, QUALITY);

    encoder
        .encode(raw, width as u16, height as u16, color_type)
        .map_err(|err| CompressionError::JpegEncode(err.to_string()))?;

    Ok(Bytes::from(out))
}
