//! Scanner module containing the scan session, its port tracker and the
//! event loop that drives them

pub mod event_loop;
pub mod session;
pub mod tracker;

use crate::network::{AddressFamily, Transport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

pub use event_loop::{Epoll, Event, EventLoop, Interest, Selector, Token};
pub use session::Session;
pub use tracker::{PortStatus, PortTracker, TrackerSummary};

/// Outcome of a time-budget check
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Continue,
    Complete(ScanReport),
}

/// Final result of one scan session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Destination as given by the user
    pub target: String,

    /// Resolved destination address
    pub destination: IpAddr,

    pub family: AddressFamily,
    pub transport: Transport,
    pub start_port: u16,
    pub end_port: u16,

    /// Ports classified open, ascending
    pub open_ports: Vec<u16>,

    pub closed: usize,

    /// Probed but never answered; ambiguous rather than failed
    pub unanswered: usize,

    /// Never probed before the duration ran out
    pub unprobed: usize,

    pub sent: u64,
    pub received: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl ScanReport {
    /// Ports per second actually put on the wire
    pub fn send_rate(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.sent as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn total_ports(&self) -> usize {
        self.open_ports.len() + self.closed + self.unanswered + self.unprobed
    }
}

/// Receives live notifications from a running session
///
/// Every method defaults to doing nothing.
pub trait ScanObserver {
    /// A port reached `Open` or `Closed`
    fn port_changed(&mut self, _port: u16, _status: PortStatus) {}

    /// Once per second while the scan runs
    fn progress(&mut self, _sent: u64, _received: u64) {}

    /// The duration ran out
    fn completed(&mut self, _report: &ScanReport) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ScanObserver for NullObserver {}
