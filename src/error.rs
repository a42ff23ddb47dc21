use std::io;
use std::net::SocketAddr;
use thiserror::Error;

pub type Result<T, E = TetherError> = std::result::Result<T, E>;

/// Failures that can occur while (de)compressing a message payload.
#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("zlib compression failed")]
    ZlibCompress(#[source] io::Error),

    #[error("zlib decompression failed")]
    ZlibDecompress(#[source] io::Error),

    #[error("compressed frame is truncated or malformed")]
    MalformedFrame,

    #[error("unsupported channel count: {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(u8),

    #[error("jpeg encoding failed: {0}")]
    JpegEncode(String),
}

/// Failures that can occur while parsing a structured payload record
/// (e.g. the image payload helper's `{width, height, channels, bytes}`).
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload record is shorter than its fixed header")]
    Truncated,

    #[error("payload declares {declared} bytes of pixel data but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Top-level error type for the transport.
#[derive(Error, Debug)]
pub enum TetherError {
    #[error("failed to bind publisher on port {port}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error("peer {addr} violated the protocol: {reason}")]
    ProtocolViolation { addr: SocketAddr, reason: String },

    #[error("failed to resolve {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
}
