//! Destination resolution and source address selection

use crate::error::{ScanError, ScanResult};
use crate::network::AddressFamily;
use log::debug;
use pnet::datalink;
use std::net::{IpAddr, Ipv6Addr, ToSocketAddrs};

/// One local interface as seen by source selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceCandidate {
    pub name: String,
    pub is_up: bool,
    pub is_loopback: bool,
    pub addresses: Vec<IpAddr>,
}

/// Resolve `name` (literal or hostname) to the first address of `family`.
pub fn resolve_destination(name: &str, family: AddressFamily) -> ScanResult<IpAddr> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return if family.matches(&ip) {
            Ok(ip)
        } else {
            Err(ScanError::ResolutionError(format!("{} is not an {} address", name, family)))
        };
    }

    let addrs = (name, 0)
        .to_socket_addrs()
        .map_err(|e| ScanError::ResolutionError(format!("{}: {}", name, e)))?;

    addrs
        .map(|sa| sa.ip())
        .find(|ip| family.matches(ip))
        .ok_or_else(|| ScanError::ResolutionError(format!("{} has no {} address", name, family)))
}

/// Enumerate local interfaces.
pub fn local_interfaces() -> Vec<InterfaceCandidate> {
    datalink::interfaces()
        .into_iter()
        .map(|iface| InterfaceCandidate {
            is_up: iface.is_up(),
            is_loopback: iface.is_loopback(),
            addresses: iface.ips.iter().map(|net| net.ip()).collect(),
            name: iface.name,
        })
        .collect()
}

/// Find a source address of `family` on the local interfaces.
pub fn find_source_address(family: AddressFamily, interface: Option<&str>) -> ScanResult<IpAddr> {
    let source = select_source(&local_interfaces(), family, interface)?;
    debug!("Send from {}", source);
    Ok(source)
}

/// Pick a source address from `candidates`.
///
/// The interface must be up and carry an address of `family`. Without a
/// named interface, loopback interfaces and link-local addresses are never
/// used. With a named interface both are allowed, but a routable address
/// on that interface is still preferred over a link-local one.
pub fn select_source(
    candidates: &[InterfaceCandidate],
    family: AddressFamily,
    interface: Option<&str>,
) -> ScanResult<IpAddr> {
    let mut fallback = None;

    for iface in candidates {
        if !iface.is_up {
            continue;
        }
        match interface {
            Some(name) if iface.name != name => continue,
            None if iface.is_loopback => continue,
            _ => {}
        }

        for ip in iface.addresses.iter().filter(|ip| family.matches(ip)) {
            if !is_link_local(ip) {
                return Ok(*ip);
            }
            if interface.is_some() && fallback.is_none() {
                fallback = Some(*ip);
            }
        }
    }

    fallback.ok_or_else(|| {
        ScanError::AddressError(match interface {
            Some(name) => format!("interface {} has no usable {} address", name, family),
            None => format!("no interface has a usable {} address", family),
        })
    })
}

/// True for 169.254.0.0/16 and fe80::/10
pub fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => is_ipv6_link_local(v6),
    }
}

fn is_ipv6_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}
