//! Raw IPv4/UDP packet handling.
//!
//! Everything in here is a pure, bounded-time function over byte slices:
//! query extraction from captured packets, reply forging and the IPv4
//! header checksum.

pub mod checksum;
pub mod forge;
pub mod query;

pub use checksum::ipv4_checksum;
pub use forge::build_reply;
pub use query::DnsQuery;

/// Length of an IPv4 header without options.
pub const IPV4_HEADER_LEN: usize = 20;
/// Length of a UDP header.
pub const UDP_HEADER_LEN: usize = 8;
/// Length of the fixed DNS message header.
pub const DNS_HEADER_LEN: usize = 12;
/// IP protocol number for UDP.
pub const PROTO_UDP: u8 = 17;
/// Well-known DNS port.
pub const DNS_PORT: u16 = 53;

#[cfg(test)]
pub(crate) mod testing {
    //! Packet builders shared by the unit tests.

    use std::net::Ipv4Addr;

    use super::{DNS_PORT, PROTO_UDP, ipv4_checksum};

    /// Build a DNS query message (header + one question) for `domain`.
    pub fn dns_query(id: u16, domain: &str) -> Vec<u8> {
        let mut msg = Vec::with_capacity(64);
        msg.extend_from_slice(&id.to_be_bytes());
        msg.extend_from_slice(&[0x01, 0x00]); // standard query, RD
        msg.extend_from_slice(&[0x00, 0x01]); // QDCOUNT
        msg.extend_from_slice(&[0x00; 6]);
        for label in domain.split('.') {
            msg.push(label.len() as u8);
            msg.extend_from_slice(label.as_bytes());
        }
        msg.push(0);
        msg.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // A, IN
        msg
    }

    /// Wrap a payload in IPv4 + UDP headers.
    pub fn udp_packet(
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let total = 28 + payload.len();
        let mut pkt = Vec::with_capacity(total);
        pkt.extend_from_slice(&[0x45, 0x00]);
        pkt.extend_from_slice(&(total as u16).to_be_bytes());
        pkt.extend_from_slice(&[0x12, 0x34, 0x40, 0x00, 64, PROTO_UDP, 0, 0]);
        pkt.extend_from_slice(&src.octets());
        pkt.extend_from_slice(&dst.octets());
        let checksum = ipv4_checksum(&pkt, 20);
        pkt[10..12].copy_from_slice(&checksum.to_be_bytes());
        pkt.extend_from_slice(&src_port.to_be_bytes());
        pkt.extend_from_slice(&dst_port.to_be_bytes());
        pkt.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        pkt.extend_from_slice(&[0, 0]);
        pkt.extend_from_slice(payload);
        pkt
    }

    /// A query for `domain` from 10.0.0.2:40000 to the virtual DNS server.
    pub fn captured_query(id: u16, domain: &str) -> Vec<u8> {
        udp_packet(
            Ipv4Addr::new(10, 0, 0, 2),
            40000,
            Ipv4Addr::new(10, 0, 0, 5),
            DNS_PORT,
            &dns_query(id, domain),
        )
    }
}
