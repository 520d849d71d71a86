//! Error handling for the halfscan scanner
//!
//! Setup failures (resolution, addressing, sockets, unsupported protocol
//! pairs) abort session creation. Inside the running loop only a failed
//! readiness wait is fatal; a failed probe is logged and skipped.

use crate::network::{AddressFamily, Transport};
use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Cannot resolve destination: {0}")]
    ResolutionError(String),

    #[error("No usable source address: {0}")]
    AddressError(String),

    #[error("Socket error: {0}")]
    SocketError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Unsupported protocol combination: {family}/{transport}")]
    UnsupportedProtocolError {
        family: AddressFamily,
        transport: Transport,
    },

    #[error("Transmit error: {0}")]
    TransmitError(String),

    #[error("Readiness wait failed: {0}")]
    WaitError(String),

    #[error("Packet layout error: {0}")]
    PacketError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ScanError {
    /// Map a raw socket creation failure, singling out missing privileges.
    pub fn from_socket_io(context: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            ScanError::PermissionError(format!("{}: {} (raw sockets need CAP_NET_RAW)", context, err))
        } else {
            ScanError::SocketError(format!("{}: {}", context, err))
        }
    }

    /// True for errors that can only happen while setting a session up.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            ScanError::ResolutionError(_)
                | ScanError::AddressError(_)
                | ScanError::SocketError(_)
                | ScanError::PermissionError(_)
                | ScanError::UnsupportedProtocolError { .. }
                | ScanError::ConfigError(_)
        )
    }
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn permission_denied_maps_to_permission_error() {
        let err = ScanError::from_socket_io(
            "socket(AF_INET, SOCK_RAW)",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, ScanError::PermissionError(_)));
        assert!(err.is_setup_error());
    }

    #[test]
    fn other_io_maps_to_socket_error() {
        let err = ScanError::from_socket_io("setsockopt", io::Error::from(io::ErrorKind::InvalidInput));
        assert!(matches!(err, ScanError::SocketError(_)));
    }

    #[test]
    fn runtime_errors_are_not_setup_errors() {
        assert!(!ScanError::TransmitError("short write".into()).is_setup_error());
        assert!(!ScanError::WaitError("EBADF".into()).is_setup_error());
    }
}
