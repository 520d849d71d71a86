//! Per-destination port status table

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of slots in the table; slot 0 is never used
pub const PORT_SLOTS: usize = u16::MAX as usize + 1;

/// Classification of one port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortStatus {
    /// No probe has reached the wire
    Unknown,
    /// Probe sent, no classifying response yet
    Probed,
    Open,
    Closed,
}

impl PortStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PortStatus::Open | PortStatus::Closed)
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortStatus::Unknown => write!(f, "unknown"),
            PortStatus::Probed => write!(f, "unanswered"),
            PortStatus::Open => write!(f, "open"),
            PortStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Counts produced when a scan completes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSummary {
    /// Ports classified open, ascending
    pub open: Vec<u16>,
    pub closed: usize,
    /// Probed but never answered
    pub unanswered: usize,
    /// In range but never probed
    pub unprobed: usize,
}

/// Port status table with monotonic transitions
///
/// `Unknown -> Probed -> {Open | Closed}`; the last two are terminal and
/// ports outside `[begin, end]` stay `Unknown`.
#[derive(Debug, Clone)]
pub struct PortTracker {
    begin: u16,
    end: u16,
    status: Vec<PortStatus>,
}

impl PortTracker {
    /// Create a tracker for the inclusive range `[begin, end]`.
    ///
    /// Port 0 is never tracked, so a `begin` of 0 is raised to 1.
    pub fn new(begin: u16, end: u16) -> Self {
        Self {
            begin: begin.max(1),
            end,
            status: vec![PortStatus::Unknown; PORT_SLOTS],
        }
    }

    pub fn begin(&self) -> u16 {
        self.begin
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn in_range(&self, port: u16) -> bool {
        port != 0 && port >= self.begin && port <= self.end
    }

    pub fn status(&self, port: u16) -> PortStatus {
        self.status[usize::from(port)]
    }

    /// `Unknown -> Probed`. Returns whether the status changed.
    pub fn mark_probed(&mut self, port: u16) -> bool {
        self.transition(port, PortStatus::Probed)
    }

    /// `Probed -> Open`. Returns whether the status changed.
    pub fn mark_open(&mut self, port: u16) -> bool {
        self.transition(port, PortStatus::Open)
    }

    /// `Probed -> Closed`. Returns whether the status changed.
    pub fn mark_closed(&mut self, port: u16) -> bool {
        self.transition(port, PortStatus::Closed)
    }

    fn transition(&mut self, port: u16, to: PortStatus) -> bool {
        if !self.in_range(port) {
            return false;
        }
        let slot = &mut self.status[usize::from(port)];
        let allowed = match to {
            PortStatus::Probed => *slot == PortStatus::Unknown,
            PortStatus::Open | PortStatus::Closed => *slot == PortStatus::Probed,
            PortStatus::Unknown => false,
        };
        if allowed {
            *slot = to;
        }
        allowed
    }

    /// Iterate `(port, status)` over the scanned range.
    pub fn iter(&self) -> impl Iterator<Item = (u16, PortStatus)> + '_ {
        (self.begin..=self.end)
            .filter(|&port| port != 0)
            .map(move |port| (port, self.status(port)))
    }

    /// Summarise the scanned range.
    pub fn final_report(&self) -> TrackerSummary {
        let mut summary = TrackerSummary::default();
        for (port, status) in self.iter() {
            match status {
                PortStatus::Open => summary.open.push(port),
                PortStatus::Closed => summary.closed += 1,
                PortStatus::Probed => summary.unanswered += 1,
                PortStatus::Unknown => summary.unprobed += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown() {
        let tracker = PortTracker::new(1, 1024);
        assert!(tracker.iter().all(|(_, s)| s == PortStatus::Unknown));
        assert_eq!(tracker.final_report().unprobed, 1024);
    }

    #[test]
    fn open_requires_probe() {
        let mut tracker = PortTracker::new(1, 100);
        assert!(!tracker.mark_open(22));
        assert_eq!(tracker.status(22), PortStatus::Unknown);
        assert!(tracker.mark_probed(22));
        assert!(tracker.mark_open(22));
        assert_eq!(tracker.status(22), PortStatus::Open);
    }

    #[test]
    fn first_classification_wins() {
        let mut tracker = PortTracker::new(1, 100);
        tracker.mark_probed(80);
        assert!(tracker.mark_closed(80));
        assert!(!tracker.mark_open(80));
        assert!(!tracker.mark_probed(80));
        assert_eq!(tracker.status(80), PortStatus::Closed);
    }

    #[test]
    fn out_of_range_ports_are_ignored() {
        let mut tracker = PortTracker::new(10, 20);
        assert!(!tracker.mark_probed(9));
        assert!(!tracker.mark_probed(21));
        assert!(!tracker.mark_probed(0));
        assert_eq!(tracker.status(9), PortStatus::Unknown);
    }

    #[test]
    fn zero_begin_is_raised() {
        let tracker = PortTracker::new(0, 5);
        assert_eq!(tracker.begin(), 1);
        assert_eq!(tracker.iter().count(), 5);
    }

    #[test]
    fn report_separates_unanswered() {
        let mut tracker = PortTracker::new(1, 10);
        for port in 1..=6 {
            tracker.mark_probed(port);
        }
        tracker.mark_open(2);
        tracker.mark_open(5);
        tracker.mark_closed(3);
        let report = tracker.final_report();
        assert_eq!(report.open, vec![2, 5]);
        assert_eq!(report.closed, 1);
        assert_eq!(report.unanswered, 3);
        assert_eq!(report.unprobed, 4);
    }
}
