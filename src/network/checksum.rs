//! One's-complement Internet checksum (RFC 1071)
//!
//! Words are read big-endian; an odd trailing byte is padded with zero. For
//! TCP and UDP the caller passes the pseudo-header followed by the transport
//! segment with its checksum field zeroed, and stores the result big-endian.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Length of the IPv4 pseudo-header
pub const IPV4_PSEUDO_HEADER_LEN: usize = 12;

/// Length of the IPv6 pseudo-header
pub const IPV6_PSEUDO_HEADER_LEN: usize = 40;

/// Compute the Internet checksum of `data`.
pub fn checksum(data: &[u8]) -> u16 {
    fold(sum_words(data, 0))
}

/// Add the big-endian 16-bit words of `data` to `initial`.
pub fn sum_words(data: &[u8], initial: u64) -> u64 {
    let mut sum = initial;
    let mut chunks = data.chunks_exact(2);
    for word in &mut chunks {
        sum += u64::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u64::from(u16::from_be_bytes([*last, 0]));
    }
    sum
}

/// Fold carries back into the low 16 bits and complement.
pub fn fold(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Write the IPv4 pseudo-header into `buf[..12]`.
///
/// Layout: source (4), destination (4), zero (1), protocol (1), length (2).
pub fn write_ipv4_pseudo_header(buf: &mut [u8], src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, length: u16) {
    buf[0..4].copy_from_slice(&src.octets());
    buf[4..8].copy_from_slice(&dst.octets());
    buf[8] = 0;
    buf[9] = protocol;
    buf[10..12].copy_from_slice(&length.to_be_bytes());
}

/// Write the IPv6 pseudo-header into `buf[..40]`.
///
/// Layout: source (16), destination (16), upper-layer length (4), zero (3),
/// next header (1).
pub fn write_ipv6_pseudo_header(buf: &mut [u8], src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, length: u32) {
    buf[0..16].copy_from_slice(&src.octets());
    buf[16..32].copy_from_slice(&dst.octets());
    buf[32..36].copy_from_slice(&length.to_be_bytes());
    buf[36..39].fill(0);
    buf[39] = next_header;
}
