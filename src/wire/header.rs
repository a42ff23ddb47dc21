/// Fixed width of the on-wire header: `msg_type_id` then `msg_size`,
/// each a little-endian `u32`.
pub const HEADER_LEN: usize = 8;

/// Serializes `(msg_type_id, msg_size)` into the stable 8-byte layout.
pub fn encode_header(msg_type_id: u32, msg_size: u32) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..4].copy_from_slice(&msg_type_id.to_le_bytes());
    buf[4..8].copy_from_slice(&msg_size.to_le_bytes());
    buf
}

/// Parses a fixed-size header buffer back into `(msg_type_id, msg_size)`.
/// Cannot fail: the caller always supplies exactly `HEADER_LEN` bytes,
/// since the receive loop reads the header with a fixed-size read.
pub fn decode_header(buf: &[u8; HEADER_LEN]) -> (u32, u32) {
    let msg_type_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let msg_size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    (msg_type_id, msg_size)
}
