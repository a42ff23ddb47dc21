//! Fixed-layout framing for the transport: an 8-byte header, an opaque
//! body, and a single-byte control frame. See `header` and `control`.

mod control;
mod header;

pub use control::{encode_ack, is_ack, ACK};
pub use header::{decode_header, encode_header, HEADER_LEN};

/// Practical cap on a decoded `msg_size`. `spec.md` §8 permits the
/// decoder contract to accept up to `u32::MAX`, but allows implementers
/// to impose a lower cap and treat an excess as a protocol violation.
/// 64 MiB bounds how much a desynchronized or malicious peer can force
/// the receiver to allocate before the header is judged corrupt.
pub const MAX_MSG_SIZE: u32 = 64 * 1024 * 1024;
