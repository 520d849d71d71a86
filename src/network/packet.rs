//! Probe construction and response parsing
//!
//! Each family/transport pair has one builder. The builder lays the fixed
//! header skeleton into the session's outbound buffer once (`prepare`), then
//! rewrites only the per-probe fields and checksum for every port
//! (`write_probe`). Inbound packets go through `read_response`, which yields a
//! port and verdict only for packets that answer one of our probes.

use crate::error::{ScanError, ScanResult};
use crate::network::tcp::{Tcp4Builder, Tcp6Builder};
use crate::network::udp::Udp6Builder;
use crate::network::{AddressFamily, Response, Transport, Verdict};
use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::MutableIpv4Packet;
use pnet::packet::ipv6::MutableIpv6Packet;
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket};
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const IPV4_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const TCP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

/// Largest probe any builder emits (IPv6 + TCP)
pub const OUTBOUND_CAPACITY: usize = IPV6_HEADER_LEN + TCP_HEADER_LEN;
/// Largest pseudo-header + segment any builder checksums
pub const SCRATCH_CAPACITY: usize = 40 + TCP_HEADER_LEN;
/// Receive buffer; only headers are inspected so truncation is harmless
pub const INBOUND_CAPACITY: usize = 2048;

/// Hop limit / TTL on every probe
pub const PROBE_TTL: u8 = 255;
/// IPv4 identification on every probe
pub const PROBE_IP_ID: u16 = 54321;
/// TCP window advertised by SYN probes
pub const PROBE_WINDOW: u16 = 1024;

/// Socket a packet was received on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The raw socket probes are sent from
    Probe,
    /// The ICMPv6 companion socket (IPv6/UDP only)
    Icmp,
}

/// One received packet, as handed to a builder
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub channel: Channel,
    pub from: IpAddr,
    pub data: &'a [u8],
}

/// Per-session probe identity shared by all variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeParams {
    pub source: IpAddr,
    pub destination: IpAddr,
    pub source_port: u16,
    pub sequence: u32,
}

impl ProbeParams {
    /// Pick the session source port from the ephemeral range and a random
    /// initial sequence number.
    pub fn new(source: IpAddr, destination: IpAddr) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            source,
            destination,
            source_port: rng.gen_range(49152..=65535),
            sequence: rng.gen(),
        }
    }

    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = port;
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }
}

/// Capabilities every protocol variant provides
pub trait ProbeBuilder {
    /// Bytes put on the wire per probe
    fn probe_len(&self) -> usize;

    /// Bytes of checksum scratch used per probe
    fn scratch_len(&self) -> usize;

    /// Write the fixed header skeleton and pseudo-header prefix.
    fn prepare(&self, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<()>;

    /// Fill the per-probe fields for `port` and install the checksum.
    /// Returns the number of bytes of `out` to transmit.
    fn write_probe(&self, port: u16, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<usize>;

    /// Classify an inbound packet, or `None` when it does not answer a probe.
    fn read_response(&self, inbound: &Inbound<'_>) -> Option<Response>;

    /// Whether the variant needs the ICMPv6 companion socket
    fn needs_icmp_channel(&self) -> bool {
        false
    }
}

/// The closed set of implemented variants
#[derive(Debug, Clone)]
pub enum PacketBuilder {
    Tcp4(Tcp4Builder),
    Tcp6(Tcp6Builder),
    Udp6(Udp6Builder),
}

impl PacketBuilder {
    /// Check that a family/transport pair has a builder, without building one.
    pub fn supports(family: AddressFamily, transport: Transport) -> ScanResult<()> {
        match (family, transport) {
            (AddressFamily::Ipv4, Transport::Tcp)
            | (AddressFamily::Ipv6, Transport::Tcp)
            | (AddressFamily::Ipv6, Transport::Udp) => Ok(()),
            (family, transport) => Err(ScanError::UnsupportedProtocolError { family, transport }),
        }
    }

    /// Select the variant for a family/transport pair.
    pub fn select(family: AddressFamily, transport: Transport, params: ProbeParams) -> ScanResult<Self> {
        Self::supports(family, transport)?;
        match (family, transport, params.source, params.destination) {
            (AddressFamily::Ipv4, Transport::Tcp, IpAddr::V4(src), IpAddr::V4(dst)) => {
                Ok(PacketBuilder::Tcp4(Tcp4Builder::new(src, dst, params.source_port, params.sequence)))
            }
            (AddressFamily::Ipv6, Transport::Tcp, IpAddr::V6(src), IpAddr::V6(dst)) => {
                Ok(PacketBuilder::Tcp6(Tcp6Builder::new(src, dst, params.source_port, params.sequence)))
            }
            (AddressFamily::Ipv6, Transport::Udp, IpAddr::V6(src), IpAddr::V6(dst)) => {
                Ok(PacketBuilder::Udp6(Udp6Builder::new(src, dst, params.source_port)))
            }
            _ => Err(ScanError::AddressError(format!(
                "{} -> {} does not match {}",
                params.source, params.destination, family
            ))),
        }
    }

    pub fn family(&self) -> AddressFamily {
        match self {
            PacketBuilder::Tcp4(_) => AddressFamily::Ipv4,
            PacketBuilder::Tcp6(_) | PacketBuilder::Udp6(_) => AddressFamily::Ipv6,
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            PacketBuilder::Tcp4(_) | PacketBuilder::Tcp6(_) => Transport::Tcp,
            PacketBuilder::Udp6(_) => Transport::Udp,
        }
    }
}

impl ProbeBuilder for PacketBuilder {
    fn probe_len(&self) -> usize {
        match self {
            PacketBuilder::Tcp4(b) => b.probe_len(),
            PacketBuilder::Tcp6(b) => b.probe_len(),
            PacketBuilder::Udp6(b) => b.probe_len(),
        }
    }

    fn scratch_len(&self) -> usize {
        match self {
            PacketBuilder::Tcp4(b) => b.scratch_len(),
            PacketBuilder::Tcp6(b) => b.scratch_len(),
            PacketBuilder::Udp6(b) => b.scratch_len(),
        }
    }

    fn prepare(&self, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<()> {
        match self {
            PacketBuilder::Tcp4(b) => b.prepare(out, scratch),
            PacketBuilder::Tcp6(b) => b.prepare(out, scratch),
            PacketBuilder::Udp6(b) => b.prepare(out, scratch),
        }
    }

    fn write_probe(&self, port: u16, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<usize> {
        match self {
            PacketBuilder::Tcp4(b) => b.write_probe(port, out, scratch),
            PacketBuilder::Tcp6(b) => b.write_probe(port, out, scratch),
            PacketBuilder::Udp6(b) => b.write_probe(port, out, scratch),
        }
    }

    fn read_response(&self, inbound: &Inbound<'_>) -> Option<Response> {
        match self {
            PacketBuilder::Tcp4(b) => b.read_response(inbound),
            PacketBuilder::Tcp6(b) => b.read_response(inbound),
            PacketBuilder::Udp6(b) => b.read_response(inbound),
        }
    }

    fn needs_icmp_channel(&self) -> bool {
        match self {
            PacketBuilder::Tcp4(b) => b.needs_icmp_channel(),
            PacketBuilder::Tcp6(b) => b.needs_icmp_channel(),
            PacketBuilder::Udp6(b) => b.needs_icmp_channel(),
        }
    }
}

/// Reject buffers that cannot hold the variant's probe.
pub(crate) fn ensure_capacity(what: &str, buf: &[u8], needed: usize) -> ScanResult<()> {
    if buf.len() < needed {
        return Err(ScanError::PacketError(format!(
            "{} buffer holds {} bytes, {} needed",
            what,
            buf.len(),
            needed
        )));
    }
    Ok(())
}

/// Lay out a fixed IPv4 header (no options) including its checksum.
pub(crate) fn write_ipv4_header(
    buf: &mut [u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: IpNextHeaderProtocol,
    total_len: u16,
) -> ScanResult<()> {
    {
        let mut ip = MutableIpv4Packet::new(buf)
            .ok_or_else(|| ScanError::PacketError("IPv4 header does not fit".to_string()))?;
        ip.set_version(4);
        ip.set_header_length(5); // 5 * 4 = 20 bytes
        ip.set_dscp(0);
        ip.set_ecn(0);
        ip.set_total_length(total_len);
        ip.set_identification(PROBE_IP_ID);
        ip.set_flags(0);
        ip.set_fragment_offset(0);
        ip.set_ttl(PROBE_TTL);
        ip.set_next_level_protocol(protocol);
        ip.set_source(src);
        ip.set_destination(dst);
        ip.set_checksum(0);
    }
    let sum = super::checksum::checksum(&buf[..IPV4_HEADER_LEN]);
    buf[10..12].copy_from_slice(&sum.to_be_bytes());
    Ok(())
}

/// Lay out a fixed IPv6 header.
pub(crate) fn write_ipv6_header(
    buf: &mut [u8],
    src: Ipv6Addr,
    dst: Ipv6Addr,
    next_header: IpNextHeaderProtocol,
    payload_len: u16,
) -> ScanResult<()> {
    let mut ip = MutableIpv6Packet::new(buf)
        .ok_or_else(|| ScanError::PacketError("IPv6 header does not fit".to_string()))?;
    ip.set_version(6);
    ip.set_traffic_class(0);
    ip.set_flow_label(0);
    ip.set_payload_length(payload_len);
    ip.set_next_header(next_header);
    ip.set_hop_limit(PROBE_TTL);
    ip.set_source(src);
    ip.set_destination(dst);
    Ok(())
}

/// Write a bare SYN segment (no options) with a zero checksum.
pub(crate) fn write_syn_segment(buf: &mut [u8], source_port: u16, port: u16, sequence: u32) -> ScanResult<()> {
    let mut tcp = MutableTcpPacket::new(buf)
        .ok_or_else(|| ScanError::PacketError("TCP header does not fit".to_string()))?;
    tcp.set_source(source_port);
    tcp.set_destination(port);
    tcp.set_sequence(sequence);
    tcp.set_acknowledgement(0);
    tcp.set_data_offset(5); // 5 * 4 = 20 bytes
    tcp.set_reserved(0);
    tcp.set_flags(TcpFlags::SYN);
    tcp.set_window(PROBE_WINDOW);
    tcp.set_checksum(0);
    tcp.set_urgent_ptr(0);
    Ok(())
}

/// Checksum `segment` behind the pseudo-header already in `scratch` and
/// store the result at `checksum_offset` inside `segment`.
pub(crate) fn install_checksum(
    segment: &mut [u8],
    scratch: &mut [u8],
    pseudo_len: usize,
    checksum_offset: usize,
) -> u16 {
    let end = pseudo_len + segment.len();
    scratch[pseudo_len..end].copy_from_slice(segment);
    let sum = super::checksum::checksum(&scratch[..end]);
    segment[checksum_offset..checksum_offset + 2].copy_from_slice(&sum.to_be_bytes());
    sum
}

/// Classify a TCP segment answering a SYN sent from `source_port` with
/// sequence number `sequence`.
pub(crate) fn classify_tcp(segment: &[u8], source_port: u16, sequence: u32) -> Option<Response> {
    let tcp = TcpPacket::new(segment)?;
    if tcp.get_destination() != source_port || tcp.get_source() == 0 {
        return None;
    }

    let flags = tcp.get_flags();
    if flags & TcpFlags::ACK != 0 && tcp.get_acknowledgement() != sequence.wrapping_add(1) {
        return None;
    }

    let syn_ack = TcpFlags::SYN | TcpFlags::ACK;
    if flags & TcpFlags::RST != 0 {
        Some(Response::new(tcp.get_source(), Verdict::Closed))
    } else if flags & syn_ack == syn_ack {
        Some(Response::new(tcp.get_source(), Verdict::Open))
    } else {
        None
    }
}
