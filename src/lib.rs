//! halfscan - a half-open port scanner
//!
//! Sends one SYN (or empty UDP datagram) per port from a raw socket and
//! classifies ports from the replies, without ever completing a handshake.

pub mod config;
pub mod error;
pub mod network;
pub mod output;
pub mod scanner;

// Re-export commonly used types
pub use config::ScanConfig;
pub use error::{ScanError, ScanResult};
pub use network::{AddressFamily, Transport};
pub use scanner::{EventLoop, ScanObserver, ScanReport, Session};

pub type Result<T> = std::result::Result<T, ScanError>;
