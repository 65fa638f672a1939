//! Internet checksum (RFC 791 / RFC 1071).

/// Compute the IPv4 header checksum over the first `len` bytes of `data`.
///
/// Sums big-endian 16-bit words, pads an odd trailing byte as the high byte
/// of a final word, folds carries back into the low 16 bits and returns the
/// one's complement. `len` is clamped to `data.len()`.
pub fn ipv4_checksum(data: &[u8], len: usize) -> u16 {
    let data = &data[..len.min(data.len())];
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}
