//! Empty-datagram probes over IPv6
//!
//! A UDP port only answers definitively when it is closed: the destination
//! returns ICMPv6 port unreachable, quoting our datagram. Silence leaves the
//! port ambiguous. A datagram coming back from the port is taken as open.

use crate::error::{ScanError, ScanResult};
use crate::network::checksum::{write_ipv6_pseudo_header, IPV6_PSEUDO_HEADER_LEN};
use crate::network::packet::{
    ensure_capacity, install_checksum, write_ipv6_header, Channel, Inbound, ProbeBuilder, IPV6_HEADER_LEN,
    UDP_HEADER_LEN,
};
use crate::network::{Response, Verdict};
use pnet::packet::icmpv6::{Icmpv6Code, Icmpv6Packet, Icmpv6Types};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::{MutableUdpPacket, UdpPacket};
use std::net::{IpAddr, Ipv6Addr};

/// Offset of the checksum inside a UDP header
const UDP_CHECKSUM_OFFSET: usize = 6;

/// ICMPv6 destination-unreachable code for "port unreachable"
const ICMPV6_PORT_UNREACHABLE: u8 = 4;

/// Type, code, checksum and the unused word before the quoted packet
const ICMPV6_ERROR_HEADER_LEN: usize = 8;

/// IPv6 + UDP builder
#[derive(Debug, Clone)]
pub struct Udp6Builder {
    source: Ipv6Addr,
    destination: Ipv6Addr,
    source_port: u16,
}

impl Udp6Builder {
    pub fn new(source: Ipv6Addr, destination: Ipv6Addr, source_port: u16) -> Self {
        Self {
            source,
            destination,
            source_port,
        }
    }

    fn read_datagram(&self, inbound: &Inbound<'_>) -> Option<Response> {
        if inbound.from != IpAddr::V6(self.destination) {
            return None;
        }
        let udp = UdpPacket::new(inbound.data)?;
        if udp.get_destination() != self.source_port || udp.get_source() == 0 {
            return None;
        }
        // On loopback our own probes come back in as well.
        if self.source == self.destination && udp.get_source() == self.source_port {
            return None;
        }
        Some(Response::new(udp.get_source(), Verdict::Open))
    }

    fn read_unreachable(&self, inbound: &Inbound<'_>) -> Option<Response> {
        let icmp = Icmpv6Packet::new(inbound.data)?;
        if icmp.get_icmpv6_type() != Icmpv6Types::DestinationUnreachable
            || icmp.get_icmpv6_code() != Icmpv6Code::new(ICMPV6_PORT_UNREACHABLE)
        {
            return None;
        }

        // The error quotes as much of the offending packet as fits.
        let quoted = inbound.data.get(ICMPV6_ERROR_HEADER_LEN..)?;
        let ip = Ipv6Packet::new(quoted)?;
        if ip.get_next_header() != IpNextHeaderProtocols::Udp
            || ip.get_source() != self.source
            || ip.get_destination() != self.destination
        {
            return None;
        }

        let udp = UdpPacket::new(quoted.get(IPV6_HEADER_LEN..)?)?;
        if udp.get_source() != self.source_port || udp.get_destination() == 0 {
            return None;
        }
        Some(Response::new(udp.get_destination(), Verdict::Closed))
    }
}

impl ProbeBuilder for Udp6Builder {
    fn probe_len(&self) -> usize {
        IPV6_HEADER_LEN + UDP_HEADER_LEN
    }

    fn scratch_len(&self) -> usize {
        IPV6_PSEUDO_HEADER_LEN + UDP_HEADER_LEN
    }

    fn prepare(&self, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<()> {
        ensure_capacity("outbound", out, self.probe_len())?;
        ensure_capacity("checksum", scratch, self.scratch_len())?;

        write_ipv6_header(
            &mut out[..IPV6_HEADER_LEN],
            self.source,
            self.destination,
            IpNextHeaderProtocols::Udp,
            UDP_HEADER_LEN as u16,
        )?;
        write_ipv6_pseudo_header(
            scratch,
            self.source,
            self.destination,
            IpNextHeaderProtocols::Udp.0,
            UDP_HEADER_LEN as u32,
        );
        Ok(())
    }

    fn write_probe(&self, port: u16, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<usize> {
        let len = self.probe_len();
        ensure_capacity("outbound", out, len)?;
        ensure_capacity("checksum", scratch, self.scratch_len())?;

        let segment = &mut out[IPV6_HEADER_LEN..len];
        {
            let mut udp = MutableUdpPacket::new(&mut *segment)
                .ok_or_else(|| ScanError::PacketError("UDP header does not fit".to_string()))?;
            udp.set_source(self.source_port);
            udp.set_destination(port);
            udp.set_length(UDP_HEADER_LEN as u16);
            udp.set_checksum(0);
        }
        if install_checksum(segment, scratch, IPV6_PSEUDO_HEADER_LEN, UDP_CHECKSUM_OFFSET) == 0 {
            // A zero UDP checksum means "none", which IPv6 forbids.
            segment[UDP_CHECKSUM_OFFSET..UDP_CHECKSUM_OFFSET + 2].copy_from_slice(&0xffffu16.to_be_bytes());
        }
        Ok(len)
    }

    fn read_response(&self, inbound: &Inbound<'_>) -> Option<Response> {
        match inbound.channel {
            Channel::Probe => self.read_datagram(inbound),
            Channel::Icmp => self.read_unreachable(inbound),
        }
    }

    fn needs_icmp_channel(&self) -> bool {
        true
    }
}
