//! Network module for packet crafting and protocol handling

pub mod checksum;
pub mod interface;
pub mod packet;
pub mod socket;
pub mod tcp;
pub mod udp;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address family of the scanned destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    pub fn name(&self) -> &'static str {
        match self {
            AddressFamily::Ipv4 => "IPv4",
            AddressFamily::Ipv6 => "IPv6",
        }
    }

    /// Whether `addr` belongs to this family
    pub fn matches(&self, addr: &std::net::IpAddr) -> bool {
        matches!(
            (self, addr),
            (AddressFamily::Ipv4, std::net::IpAddr::V4(_)) | (AddressFamily::Ipv6, std::net::IpAddr::V6(_))
        )
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AddressFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "4" | "ipv4" | "inet" => Ok(AddressFamily::Ipv4),
            "6" | "ipv6" | "inet6" => Ok(AddressFamily::Ipv6),
            _ => Err(format!("Invalid address family: {}", s)),
        }
    }
}

/// Transport protocol carried by the probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    /// IANA protocol number, used for the IP protocol / next-header field
    pub fn number(&self) -> u8 {
        match self {
            Transport::Tcp => 6,
            Transport::Udp => 17,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            _ => Err(format!("Invalid transport protocol: {}", s)),
        }
    }
}

/// Classification carried by a matching response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Open,
    Closed,
}

/// A parsed inbound packet that refers to one scanned port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub port: u16,
    pub verdict: Verdict,
}

impl Response {
    pub fn new(port: u16, verdict: Verdict) -> Self {
        Self { port, verdict }
    }
}
