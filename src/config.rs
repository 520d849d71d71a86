//! Configuration module for the halfscan scanner

use crate::error::ScanError;
use crate::network::{AddressFamily, Transport};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default scan duration in seconds
pub const DEFAULT_DURATION_SECS: u64 = 10;

/// Main configuration structure for a scan session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Destination host name or address
    pub target: String,

    /// Interface to take the source address from
    pub interface: Option<String>,

    pub family: AddressFamily,

    pub transport: Transport,

    /// First port of the inclusive range
    pub start_port: u16,

    /// Last port of the inclusive range
    pub end_port: u16,

    /// How long the scan runs, sending and listening, in seconds
    pub duration_secs: u64,

    /// Hex-dump every packet at trace level
    pub dump_packets: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            interface: None,
            family: AddressFamily::Ipv4,
            transport: Transport::Tcp,
            start_port: 1,
            end_port: u16::MAX,
            duration_secs: DEFAULT_DURATION_SECS,
            dump_packets: false,
        }
    }
}

impl ScanConfig {
    /// Create a new scan configuration
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_ports(mut self, start_port: u16, end_port: u16) -> Self {
        self.start_port = start_port;
        self.end_port = end_port;
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_interface(mut self, interface: Option<String>) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_packet_dump(mut self, dump: bool) -> Self {
        self.dump_packets = dump;
        self
    }

    /// Get the scan duration as Duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Number of ports in the range
    pub fn port_count(&self) -> usize {
        if self.start_port > self.end_port {
            0
        } else {
            usize::from(self.end_port - self.start_port) + 1
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ScanError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ScanError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from `~/.halfscan.toml`, or defaults
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let config_path = home_dir.join(".halfscan.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::debug!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.target.trim().is_empty() {
            return Err(ScanError::ConfigError("Target cannot be empty".to_string()));
        }

        if self.start_port == 0 {
            return Err(ScanError::ConfigError("Ports start at 1".to_string()));
        }

        if self.start_port > self.end_port {
            return Err(ScanError::ConfigError(format!(
                "Invalid port range {}-{} (start > end)",
                self.start_port, self.end_port
            )));
        }

        if self.duration_secs == 0 {
            return Err(ScanError::ConfigError("Duration must be at least one second".to_string()));
        }

        Ok(())
    }
}

/// Parse `start-end` or a single port into an inclusive range.
pub fn parse_port_range(s: &str) -> crate::Result<(u16, u16)> {
    let s = s.trim();
    let (start, end) = match s.split_once('-') {
        Some((a, b)) => (parse_port(a)?, parse_port(b)?),
        None => {
            let port = parse_port(s)?;
            (port, port)
        }
    };

    if start > end {
        return Err(ScanError::ConfigError(format!("Invalid port range {}-{} (start > end)", start, end)));
    }
    Ok((start, end))
}

fn parse_port(s: &str) -> crate::Result<u16> {
    let value: u32 = s
        .trim()
        .parse()
        .map_err(|e| ScanError::ConfigError(format!("Invalid port value {:?}: {}", s, e)))?;
    if value == 0 || value > u32::from(u16::MAX) {
        return Err(ScanError::ConfigError(format!("Port out of range: {}", value)));
    }
    Ok(value as u16)
}
