//! Pure, frame-agnostic compression transforms over complete buffers.
//! Neither adapter frames or prefixes transport headers — that is the
//! wire codec's job (`crate::wire`).

mod jpeg;
mod zlib;

pub use jpeg::compress_jpeg;
pub use zlib::{compress_zlib, decompress_zlib};
