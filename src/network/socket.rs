//! Raw socket management and operations

use crate::error::{ScanError, ScanResult};
use crate::network::AddressFamily;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::os::unix::io::{AsRawFd, RawFd};

/// Non-blocking datagram I/O the scan session needs from a socket
pub trait PacketSocket: AsRawFd {
    /// Send one packet to `dest`; `WouldBlock` means try again later.
    fn send_packet(&self, packet: &[u8], dest: IpAddr) -> io::Result<usize>;

    /// Receive one packet and the address it came from.
    fn recv_packet(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)>;
}

/// Raw socket wrapper for sending crafted packets
pub struct RawSocket {
    socket: Socket,
    family: AddressFamily,
}

impl RawSocket {
    /// Open a non-blocking raw socket that carries its own IP header.
    pub fn new_probe(family: AddressFamily, protocol: u8) -> ScanResult<Self> {
        let raw = Self::open(family, Protocol::from(i32::from(protocol)))?;
        match family {
            AddressFamily::Ipv4 => raw.socket.set_header_included_v4(true),
            AddressFamily::Ipv6 => raw.socket.set_header_included_v6(true),
        }
        .map_err(|e| ScanError::from_socket_io("setsockopt(HDRINCL)", e))?;
        Ok(raw)
    }

    /// Open a non-blocking ICMPv6 socket used only for receiving errors.
    pub fn new_icmpv6() -> ScanResult<Self> {
        Self::open(AddressFamily::Ipv6, Protocol::ICMPV6)
    }

    fn open(family: AddressFamily, protocol: Protocol) -> ScanResult<Self> {
        let domain = match family {
            AddressFamily::Ipv4 => Domain::IPV4,
            AddressFamily::Ipv6 => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::from(libc::SOCK_RAW), Some(protocol))
            .map_err(|e| ScanError::from_socket_io("socket(SOCK_RAW)", e))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| ScanError::from_socket_io("set_nonblocking", e))?;

        Ok(Self { socket, family })
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Whether the kernel expects the IP header in sent packets.
    pub fn header_included(&self) -> io::Result<bool> {
        match self.family {
            AddressFamily::Ipv4 => self.socket.header_included_v4(),
            AddressFamily::Ipv6 => self.socket.header_included_v6(),
        }
    }
}

impl PacketSocket for RawSocket {
    fn send_packet(&self, packet: &[u8], dest: IpAddr) -> io::Result<usize> {
        // Raw sockets take the protocol from the socket, so the port stays 0.
        let addr = SockAddr::from(SocketAddr::new(dest, 0));
        self.socket.send_to(packet, &addr)
    }

    fn recv_packet(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        // SAFETY: `recv_from` only writes initialised bytes into the slice and
        // `MaybeUninit<u8>` has the same layout as `u8`.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (size, addr) = self.socket.recv_from(uninit)?;
        let from = addr
            .as_socket()
            .map(|sa| sa.ip())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-IP source address"))?;
        Ok((size.min(buf.len()), from))
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
