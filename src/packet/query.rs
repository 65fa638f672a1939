//! DNS query extraction from captured IPv4 packets.

use std::net::Ipv4Addr;

use super::{DNS_HEADER_LEN, DNS_PORT, IPV4_HEADER_LEN, PROTO_UDP, UDP_HEADER_LEN};

/// Upper bound on labels walked per name, so crafted packets cannot loop.
const MAX_LABELS: usize = 100;

/// A DNS query captured from the tunnel.
///
/// A borrowed view over the raw packet. Only exists for IPv4/UDP packets
/// addressed to port 53 that carry a readable question name.
#[derive(Debug, Clone)]
pub struct DnsQuery<'a> {
    packet: &'a [u8],
    pub header_len: usize,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub domain: String,
    labels: usize,
    payload_end: usize,
}

impl<'a> DnsQuery<'a> {
    /// Extract the queried domain from a raw IPv4 packet.
    ///
    /// Returns `None` for anything that is not a well-formed DNS query to
    /// port 53: empty packets, non-IPv4, non-UDP, other ports, truncated
    /// headers or names.
    pub fn extract(packet: &'a [u8]) -> Option<Self> {
        let first = *packet.first()?;
        if first >> 4 != 4 {
            return None;
        }
        let header_len = usize::from(first & 0x0F) * 4;
        if header_len < IPV4_HEADER_LEN {
            return None;
        }

        let protocol = *packet.get(9)?;
        if protocol != PROTO_UDP {
            return None;
        }

        let udp = packet.get(header_len..header_len + UDP_HEADER_LEN)?;
        let source_port = u16::from_be_bytes([udp[0], udp[1]]);
        let destination_port = u16::from_be_bytes([udp[2], udp[3]]);
        if destination_port != DNS_PORT {
            return None;
        }

        let dns_start = header_len + UDP_HEADER_LEN;
        let question_start = dns_start + DNS_HEADER_LEN;
        if question_start >= packet.len() {
            return None;
        }

        let (domain, labels) = read_name(packet, question_start)?;

        let addrs = packet.get(12..20)?;
        let source = Ipv4Addr::new(addrs[0], addrs[1], addrs[2], addrs[3]);
        let destination = Ipv4Addr::new(addrs[4], addrs[5], addrs[6], addrs[7]);

        // Trust the IP total length only when it is consistent with the read.
        let total_len = usize::from(u16::from_be_bytes([packet[2], packet[3]]));
        let payload_end = if total_len > question_start && total_len < packet.len() {
            total_len
        } else {
            packet.len()
        };

        Some(Self {
            packet,
            header_len,
            protocol,
            source,
            destination,
            source_port,
            destination_port,
            domain,
            labels,
            payload_end,
        })
    }

    /// The DNS message carried in the UDP payload.
    pub fn payload(&self) -> &'a [u8] {
        &self.packet[self.header_len + UDP_HEADER_LEN..self.payload_end]
    }

    /// The raw packet this query was extracted from.
    pub fn packet(&self) -> &'a [u8] {
        self.packet
    }

    /// Offset of the question name within the packet.
    pub fn question_offset(&self) -> usize {
        self.header_len + UDP_HEADER_LEN + DNS_HEADER_LEN
    }

    /// Number of length-prefixed labels read for the name.
    ///
    /// Counted on the wire: a label may itself contain a `.` byte.
    pub fn label_count(&self) -> usize {
        self.labels
    }
}

/// Read a sequence of length-prefixed labels starting at `offset`.
///
/// A zero byte terminates the name and a compression pointer ends it early.
/// Labels running past the packet end reject the whole name. Returns the
/// dotted name and the number of labels walked.
fn read_name(data: &[u8], offset: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut labels = 0;
    let mut pos = offset;

    for _ in 0..MAX_LABELS {
        let label_len = *data.get(pos)?;
        if label_len == 0 {
            break;
        }
        if label_len & 0xC0 == 0xC0 {
            break;
        }
        if label_len > 63 {
            return None;
        }

        let start = pos + 1;
        let end = start + usize::from(label_len);
        let label = std::str::from_utf8(data.get(start..end)?).ok()?;
        if !label.is_ascii() {
            return None;
        }

        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(label);
        labels += 1;
        pos = end;
    }

    if labels == 0 { None } else { Some((name, labels)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::testing::{captured_query, dns_query, udp_packet};

    const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

    #[test]
    fn extracts_domain_and_addressing() {
        let packet = captured_query(0xbeef, "ads.example.com");
        let query = DnsQuery::extract(&packet).unwrap();

        assert_eq!(query.domain, "ads.example.com");
        assert_eq!(query.header_len, 20);
        assert_eq!(query.protocol, 17);
        assert_eq!(query.source, CLIENT);
        assert_eq!(query.destination, SERVER);
        assert_eq!(query.source_port, 40000);
        assert_eq!(query.destination_port, 53);
        assert_eq!(query.label_count(), 3);
        assert_eq!(query.question_offset(), 40);
    }

    #[test]
    fn payload_is_the_dns_message() {
        let message = dns_query(0x1234, "example.org");
        let packet = udp_packet(CLIENT, 40000, SERVER, 53, &message);
        let query = DnsQuery::extract(&packet).unwrap();

        assert_eq!(query.payload(), &message[..]);
    }

    #[test]
    fn payload_stops_at_ip_total_length() {
        let message = dns_query(0x1234, "example.org");
        let mut packet = udp_packet(CLIENT, 40000, SERVER, 53, &message);
        packet.extend_from_slice(&[0xde, 0xad]); // trailing garbage past total length
        let query = DnsQuery::extract(&packet).unwrap();

        assert_eq!(query.payload(), &message[..]);
    }

    #[test]
    fn rejects_empty_packet() {
        assert!(DnsQuery::extract(&[]).is_none());
    }

    #[test]
    fn rejects_non_udp() {
        let mut packet = captured_query(1, "example.com");
        packet[9] = 6;
        assert!(DnsQuery::extract(&packet).is_none());
    }

    #[test]
    fn rejects_other_destination_ports() {
        let packet = udp_packet(CLIENT, 40000, SERVER, 5353, &dns_query(1, "example.com"));
        assert!(DnsQuery::extract(&packet).is_none());

        // A reply (source port 53) is not a query.
        let packet = udp_packet(SERVER, 53, CLIENT, 40000, &dns_query(1, "example.com"));
        assert!(DnsQuery::extract(&packet).is_none());
    }

    #[test]
    fn rejects_non_ipv4() {
        let mut packet = captured_query(1, "example.com");
        packet[0] = 0x65;
        assert!(DnsQuery::extract(&packet).is_none());
    }

    #[test]
    fn rejects_short_ihl() {
        let mut packet = captured_query(1, "example.com");
        packet[0] = 0x44;
        assert!(DnsQuery::extract(&packet).is_none());
    }

    #[test]
    fn rejects_question_offset_out_of_bounds() {
        let packet = captured_query(1, "example.com");
        // IP + UDP + DNS header only.
        assert!(DnsQuery::extract(&packet[..40]).is_none());
        // Truncated inside the UDP header.
        assert!(DnsQuery::extract(&packet[..24]).is_none());
    }

    #[test]
    fn honours_ip_options() {
        let message = dns_query(7, "example.com");
        let mut packet = udp_packet(CLIENT, 40000, SERVER, 53, &message);
        packet[0] = 0x46;
        packet.splice(20..20, [1, 1, 1, 1]); // four bytes of NOP options
        let total = packet.len() as u16;
        packet[2..4].copy_from_slice(&total.to_be_bytes());

        let query = DnsQuery::extract(&packet).unwrap();
        assert_eq!(query.header_len, 24);
        assert_eq!(query.domain, "example.com");
        assert_eq!(query.payload(), &message[..]);
    }

    #[test]
    fn rejects_truncated_label() {
        let packet = captured_query(1, "example.com");
        // Cut inside "example".
        assert!(DnsQuery::extract(&packet[..44]).is_none());
    }

    #[test]
    fn rejects_empty_name() {
        let packet = captured_query(1, "example.com");
        let mut packet = packet[..40].to_vec();
        packet.push(0);
        assert!(DnsQuery::extract(&packet).is_none());
    }

    #[test]
    fn compression_pointer_ends_name() {
        let mut message = dns_query(1, "example");
        // Replace the root label after "example" with a pointer.
        let root = 12 + 1 + 7;
        message[root] = 0xC0;
        message.insert(root + 1, 0x0C);
        let packet = udp_packet(CLIENT, 40000, SERVER, 53, &message);

        let query = DnsQuery::extract(&packet).unwrap();
        assert_eq!(query.domain, "example");
    }

    #[test]
    fn label_walk_is_bounded() {
        // 200 one-byte labels and no terminator within the cap.
        let mut message = vec![0u8; 12];
        for _ in 0..200 {
            message.extend_from_slice(&[1, b'a']);
        }
        message.push(0);
        let packet = udp_packet(CLIENT, 40000, SERVER, 53, &message);

        let query = DnsQuery::extract(&packet).unwrap();
        assert_eq!(query.label_count(), 100);
    }

    #[test]
    fn label_count_matches_length_prefixes() {
        for domain in ["a", "a.b", "www.example.co.uk", "x.y.z.w.v.u"] {
            let packet = captured_query(1, domain);
            let query = DnsQuery::extract(&packet).unwrap();

            assert_eq!(query.label_count(), domain.split('.').count());
            assert_eq!(query.domain, domain);
        }
    }

    #[test]
    fn dotted_label_counts_once() {
        // One 3-byte label "a.b" followed by "com".
        let mut message = vec![0u8; 12];
        message.extend_from_slice(&[3, b'a', b'.', b'b', 3, b'c', b'o', b'm', 0]);
        let packet = udp_packet(CLIENT, 40000, SERVER, 53, &message);

        let query = DnsQuery::extract(&packet).unwrap();
        assert_eq!(query.domain, "a.b.com");
        assert_eq!(query.label_count(), 2);
    }
}
