//! SYN probes over IPv4 and IPv6

use crate::error::ScanResult;
use crate::network::checksum::{
    write_ipv4_pseudo_header, write_ipv6_pseudo_header, IPV4_PSEUDO_HEADER_LEN, IPV6_PSEUDO_HEADER_LEN,
};
use crate::network::packet::{
    classify_tcp, ensure_capacity, install_checksum, write_ipv4_header, write_ipv6_header, write_syn_segment,
    Channel, Inbound, ProbeBuilder, IPV4_HEADER_LEN, IPV6_HEADER_LEN, TCP_HEADER_LEN,
};
use crate::network::Response;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Offset of the checksum inside a TCP header
const TCP_CHECKSUM_OFFSET: usize = 16;

/// IPv4 + TCP SYN builder
#[derive(Debug, Clone)]
pub struct Tcp4Builder {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    source_port: u16,
    sequence: u32,
}

impl Tcp4Builder {
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, source_port: u16, sequence: u32) -> Self {
        Self {
            source,
            destination,
            source_port,
            sequence,
        }
    }
}

impl ProbeBuilder for Tcp4Builder {
    fn probe_len(&self) -> usize {
        IPV4_HEADER_LEN + TCP_HEADER_LEN
    }

    fn scratch_len(&self) -> usize {
        IPV4_PSEUDO_HEADER_LEN + TCP_HEADER_LEN
    }

    fn prepare(&self, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<()> {
        ensure_capacity("outbound", out, self.probe_len())?;
        ensure_capacity("checksum", scratch, self.scratch_len())?;

        // Every IPv4 field is per-session, so the header checksum is too.
        write_ipv4_header(
            &mut out[..IPV4_HEADER_LEN],
            self.source,
            self.destination,
            IpNextHeaderProtocols::Tcp,
            self.probe_len() as u16,
        )?;
        write_ipv4_pseudo_header(
            scratch,
            self.source,
            self.destination,
            IpNextHeaderProtocols::Tcp.0,
            TCP_HEADER_LEN as u16,
        );
        Ok(())
    }

    fn write_probe(&self, port: u16, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<usize> {
        let len = self.probe_len();
        ensure_capacity("outbound", out, len)?;
        ensure_capacity("checksum", scratch, self.scratch_len())?;

        let segment = &mut out[IPV4_HEADER_LEN..len];
        write_syn_segment(segment, self.source_port, port, self.sequence)?;
        install_checksum(segment, scratch, IPV4_PSEUDO_HEADER_LEN, TCP_CHECKSUM_OFFSET);
        Ok(len)
    }

    fn read_response(&self, inbound: &Inbound<'_>) -> Option<Response> {
        if inbound.channel != Channel::Probe {
            return None;
        }

        // IPv4 raw sockets hand back the IP header too.
        let ip = Ipv4Packet::new(inbound.data)?;
        if ip.get_version() != 4
            || ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp
            || ip.get_source() != self.destination
            || ip.get_destination() != self.source
        {
            return None;
        }

        let header_len = usize::from(ip.get_header_length()) * 4;
        if header_len < IPV4_HEADER_LEN || inbound.data.len() < header_len + TCP_HEADER_LEN {
            return None;
        }
        classify_tcp(&inbound.data[header_len..], self.source_port, self.sequence)
    }
}

/// IPv6 + TCP SYN builder
#[derive(Debug, Clone)]
pub struct Tcp6Builder {
    source: Ipv6Addr,
    destination: Ipv6Addr,
    source_port: u16,
    sequence: u32,
}

impl Tcp6Builder {
    pub fn new(source: Ipv6Addr, destination: Ipv6Addr, source_port: u16, sequence: u32) -> Self {
        Self {
            source,
            destination,
            source_port,
            sequence,
        }
    }
}

impl ProbeBuilder for Tcp6Builder {
    fn probe_len(&self) -> usize {
        IPV6_HEADER_LEN + TCP_HEADER_LEN
    }

    fn scratch_len(&self) -> usize {
        IPV6_PSEUDO_HEADER_LEN + TCP_HEADER_LEN
    }

    fn prepare(&self, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<()> {
        ensure_capacity("outbound", out, self.probe_len())?;
        ensure_capacity("checksum", scratch, self.scratch_len())?;

        write_ipv6_header(
            &mut out[..IPV6_HEADER_LEN],
            self.source,
            self.destination,
            IpNextHeaderProtocols::Tcp,
            TCP_HEADER_LEN as u16,
        )?;
        write_ipv6_pseudo_header(
            scratch,
            self.source,
            self.destination,
            IpNextHeaderProtocols::Tcp.0,
            TCP_HEADER_LEN as u32,
        );
        Ok(())
    }

    fn write_probe(&self, port: u16, out: &mut [u8], scratch: &mut [u8]) -> ScanResult<usize> {
        let len = self.probe_len();
        ensure_capacity("outbound", out, len)?;
        ensure_capacity("checksum", scratch, self.scratch_len())?;

        let segment = &mut out[IPV6_HEADER_LEN..len];
        write_syn_segment(segment, self.source_port, port, self.sequence)?;
        install_checksum(segment, scratch, IPV6_PSEUDO_HEADER_LEN, TCP_CHECKSUM_OFFSET);
        Ok(len)
    }

    fn read_response(&self, inbound: &Inbound<'_>) -> Option<Response> {
        // IPv6 raw sockets never return the IPv6 header, so the peer address
        // comes from the socket and the data starts at the TCP header.
        if inbound.channel != Channel::Probe || inbound.from != IpAddr::V6(self.destination) {
            return None;
        }
        if inbound.data.len() < TCP_HEADER_LEN {
            return None;
        }
        classify_tcp(inbound.data, self.source_port, self.sequence)
    }
}
