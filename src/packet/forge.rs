//! Synthetic DNS reply packets.
//!
//! Wraps an upstream resolver's answer in fresh IPv4 and UDP headers so it
//! looks like it came from the virtual DNS server the device queried.

use std::net::Ipv4Addr;

use super::{DNS_PORT, IPV4_HEADER_LEN, PROTO_UDP, UDP_HEADER_LEN, ipv4_checksum};

const DEFAULT_TTL: u8 = 64;

/// Build an IPv4+UDP packet carrying `reply` back to the sender of `request`.
///
/// The source is `server:53`, the destination is the request's source
/// address and port. Lengths and the header checksum are computed from
/// `reply`; the UDP checksum is left at zero (not computed). The DNS
/// payload is copied verbatim.
///
/// Returns `None` if `request` is too short to carry IPv4/UDP headers or
/// the reply would not fit in a single IPv4 datagram.
pub fn build_reply(server: Ipv4Addr, request: &[u8], reply: &[u8]) -> Option<Vec<u8>> {
    let header_len = usize::from(*request.first()? & 0x0F) * 4;
    if header_len < IPV4_HEADER_LEN {
        return None;
    }
    let requester = request.get(12..16)?;
    let requester_port = request.get(header_len..header_len + 2)?;

    let udp_len = u16::try_from(UDP_HEADER_LEN + reply.len()).ok()?;
    let total_len = u16::try_from(IPV4_HEADER_LEN + UDP_HEADER_LEN + reply.len()).ok()?;

    let mut packet = Vec::with_capacity(usize::from(total_len));

    // IPv4 header
    packet.push(0x45); // version 4, IHL 5
    packet.push(0x00); // TOS
    packet.extend_from_slice(&total_len.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00]); // identification
    packet.extend_from_slice(&[0x00, 0x00]); // flags / fragment offset
    packet.push(DEFAULT_TTL);
    packet.push(PROTO_UDP);
    packet.extend_from_slice(&[0x00, 0x00]); // checksum placeholder
    packet.extend_from_slice(&server.octets());
    packet.extend_from_slice(requester);

    let checksum = ipv4_checksum(&packet, IPV4_HEADER_LEN);
    packet[10..12].copy_from_slice(&checksum.to_be_bytes());

    // UDP header
    packet.extend_from_slice(&DNS_PORT.to_be_bytes());
    packet.extend_from_slice(requester_port);
    packet.extend_from_slice(&udp_len.to_be_bytes());
    packet.extend_from_slice(&[0x00, 0x00]);

    packet.extend_from_slice(reply);

    Some(packet)
}
