//! The image payload helper from `spec.md` §6: a structured record
//! `{u32 width, u32 height, u8 channels, bytes pixel_data}` of length
//! `width * height * channels`. This is the only payload shape the
//! transport understands structurally — everything else is opaque bytes
//! — because [`Publisher`](crate::Publisher) needs to recover the raw
//! pixels from it when JPEG compression is selected (`spec.md` §4.4).

use crate::error::{PayloadError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const RECORD_HEADER_LEN: usize = 4 + 4 + 1;

/// Builds an image payload record from raw interleaved pixel data.
pub fn encode_image_payload(width: u32, height: u32, channels: u8, pixels: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + pixels.len());
    buf.put_u32_le(width);
    buf.put_u32_le(height);
    buf.put_u8(channels);
    buf.extend_from_slice(pixels);
    buf.freeze()
}

/// Decodes a record built by [`encode_image_payload`] back into its
/// `(width, height, channels, pixel_data)` components.
pub fn decode_image_payload(bytes: &Bytes) -> Result<(u32, u32, u8, Bytes)> {
    if bytes.len() < RECORD_HEADER_LEN {
        return Err(PayloadError::Truncated.into());
    }

    let mut cursor = &bytes[..];
    let width = cursor.get_u32_le();
    let height = cursor.get_u32_le();
    let channels = cursor.get_u8();

    let expected = width as usize * height as usize * channels as usize;
    let pixels = bytes.slice(RECORD_HEADER_LEN..);
    if pixels.len() != expected {
        return Err(PayloadError::LengthMismatch {
            declared: expected,
            actual: pixels.len(),
        }
        .into());
    }

    Ok((width, height, channels, pixels))
}
