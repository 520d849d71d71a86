//! Scan session: one destination, one probe socket, one port range
//!
//! The session owns the sockets, their readiness registration, the probe
//! and receive buffers, the port cursor and the tracker. Write readiness
//! sends the probe for the next port; read readiness parses one packet and
//! applies its verdict. Once the cursor passes the end of the range the
//! session drops its write interest and only listens.

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};
use crate::network::interface::{find_source_address, resolve_destination};
use crate::network::packet::{
    Channel, Inbound, PacketBuilder, ProbeBuilder, ProbeParams, INBOUND_CAPACITY, OUTBOUND_CAPACITY,
    SCRATCH_CAPACITY,
};
use crate::network::socket::{PacketSocket, RawSocket};
use crate::network::{AddressFamily, Response, Transport, Verdict};
use crate::output::hex_dump;
use crate::scanner::event_loop::{Epoll, Event, Interest, Selector, Token};
use crate::scanner::tracker::{PortStatus, PortTracker};
use crate::scanner::{Progress, ScanObserver, ScanReport};
use chrono::{DateTime, Utc};
use log::{debug, info, log_enabled, trace, warn, Level};
use std::io;
use std::net::IpAddr;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

/// Cadence of progress notifications
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// What happened to one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transmit {
    Sent,
    /// Socket buffer full; retry the same port on the next write event
    Deferred,
}

pub struct Session<S: PacketSocket = RawSocket, P: Selector = Epoll> {
    target: String,
    family: AddressFamily,
    transport: Transport,
    source: IpAddr,
    destination: IpAddr,
    builder: PacketBuilder,

    probe: Option<S>,
    icmp: Option<S>,
    selector: P,
    interest: Interest,
    registered: Option<Interest>,
    icmp_registered: bool,

    start_port: u16,
    end_port: u16,
    next_port: u32,

    outbound: Vec<u8>,
    inbound: Vec<u8>,
    scratch: Vec<u8>,

    sent: u64,
    received: u64,
    duration: Duration,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    last_report: Instant,

    tracker: Option<PortTracker>,
    dump_packets: bool,
    terminated: bool,
}

impl Session<RawSocket, Epoll> {
    /// Resolve addresses, open the raw socket(s) and register them.
    ///
    /// The family/transport pair is checked before anything is resolved
    /// or opened.
    pub fn create(config: &ScanConfig) -> ScanResult<Self> {
        config.validate()?;
        PacketBuilder::supports(config.family, config.transport)?;

        let destination = resolve_destination(&config.target, config.family)?;
        let source = find_source_address(config.family, config.interface.as_deref())?;
        let params = ProbeParams::new(source, destination);

        let probe = RawSocket::new_probe(config.family, config.transport.number())?;
        let icmp = match (config.family, config.transport) {
            (AddressFamily::Ipv6, Transport::Udp) => Some(RawSocket::new_icmpv6()?),
            _ => None,
        };
        let selector = Epoll::new().map_err(|e| ScanError::SocketError(format!("epoll_create1: {}", e)))?;

        Session::with_parts(config, params, probe, icmp, selector)
    }
}

impl<S: PacketSocket, P: Selector> Session<S, P> {
    /// Assemble a session from already opened sockets and a selector.
    pub fn with_parts(config: &ScanConfig, params: ProbeParams, probe: S, icmp: Option<S>, selector: P) -> ScanResult<Self> {
        config.validate()?;
        let builder = PacketBuilder::select(config.family, config.transport, params)?;
        if builder.needs_icmp_channel() && icmp.is_none() {
            return Err(ScanError::SocketError(format!(
                "{}/{} needs an ICMPv6 socket",
                config.family, config.transport
            )));
        }

        let now = Instant::now();
        let mut session = Self {
            target: config.target.clone(),
            family: config.family,
            transport: config.transport,
            source: params.source,
            destination: params.destination,
            builder,
            probe: Some(probe),
            icmp,
            selector,
            interest: Interest::READ_WRITE,
            registered: None,
            icmp_registered: false,
            start_port: config.start_port,
            end_port: config.end_port,
            next_port: u32::from(config.start_port),
            outbound: vec![0; OUTBOUND_CAPACITY],
            inbound: vec![0; INBOUND_CAPACITY],
            scratch: vec![0; SCRATCH_CAPACITY],
            sent: 0,
            received: 0,
            duration: config.duration(),
            started_at: now,
            started_wall: Utc::now(),
            last_report: now,
            tracker: Some(PortTracker::new(config.start_port, config.end_port)),
            dump_packets: config.dump_packets,
            terminated: false,
        };

        session.builder.prepare(&mut session.outbound, &mut session.scratch)?;
        session.register()?;

        debug!(
            "Scanning {} ({}) ports {}-{} over {}/{} from {}",
            session.target,
            session.destination,
            session.start_port,
            session.end_port,
            session.family,
            session.transport,
            session.source
        );
        Ok(session)
    }

    fn register(&mut self) -> ScanResult<()> {
        if let Some(probe) = &self.probe {
            self.selector
                .register(probe.as_raw_fd(), Token::PROBE, self.interest)
                .map_err(|e| ScanError::SocketError(format!("register probe socket: {}", e)))?;
            self.registered = Some(self.interest);
        }
        if let Some(icmp) = &self.icmp {
            self.selector
                .register(icmp.as_raw_fd(), Token::ICMP, Interest::READ)
                .map_err(|e| ScanError::SocketError(format!("register ICMPv6 socket: {}", e)))?;
            self.icmp_registered = true;
        }
        Ok(())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn source(&self) -> IpAddr {
        self.source
    }

    pub fn destination(&self) -> IpAddr {
        self.destination
    }

    /// Next port the cursor will probe; `end_port + 1` once exhausted
    pub fn next_port(&self) -> u32 {
        self.next_port
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn tracker(&self) -> Option<&PortTracker> {
        self.tracker.as_ref()
    }

    /// Status of `port`, `Unknown` once the tracker is released
    pub fn port_status(&self, port: u16) -> PortStatus {
        self.tracker
            .as_ref()
            .map(|t| t.status(port))
            .unwrap_or(PortStatus::Unknown)
    }

    /// Stop asking for write readiness. Idempotent.
    pub fn retract_write_interest(&mut self) {
        if self.interest.write {
            self.interest = Interest::READ;
            debug!("Completed the probe transmission");
        }
    }

    /// Push the current interest to the selector if it changed.
    pub fn sync_interest(&mut self) -> ScanResult<()> {
        let Some(probe) = &self.probe else {
            return Ok(());
        };
        if self.registered == Some(self.interest) {
            return Ok(());
        }
        self.selector
            .reregister(probe.as_raw_fd(), Token::PROBE, self.interest)
            .map_err(|e| ScanError::WaitError(format!("reregister probe socket: {}", e)))?;
        self.registered = Some(self.interest);
        Ok(())
    }

    /// Apply pending interest changes and block for readiness.
    pub fn wait(&mut self, events: &mut Vec<Event>, timeout: Duration) -> ScanResult<()> {
        self.sync_interest()?;
        self.selector
            .select(events, timeout)
            .map_err(|e| ScanError::WaitError(e.to_string()))
    }

    /// Handle one readiness event; reads are served before writes.
    pub fn dispatch<O: ScanObserver + ?Sized>(&mut self, event: Event, observer: &mut O) {
        if self.terminated {
            return;
        }
        if event.readable {
            self.read_ready(event.token, observer);
        }
        if event.writable && event.token == Token::PROBE {
            self.write_ready();
        }
    }

    fn write_ready(&mut self) {
        if !self.interest.write {
            return;
        }
        if self.next_port > u32::from(self.end_port) {
            self.retract_write_interest();
            return;
        }
        let port = self.next_port as u16;

        match self.send_probe(port) {
            Ok(Transmit::Deferred) => return,
            Ok(Transmit::Sent) => {
                if let Some(tracker) = self.tracker.as_mut() {
                    tracker.mark_probed(port);
                }
                self.sent += 1;
                debug!("Sent to {}:{}", self.destination, port);
            }
            Err(e) => warn!("Probe to {}:{} not sent: {}", self.destination, port, e),
        }

        self.next_port += 1;
        if self.next_port > u32::from(self.end_port) {
            self.retract_write_interest();
        }
    }

    fn send_probe(&mut self, port: u16) -> ScanResult<Transmit> {
        let Some(probe) = &self.probe else {
            return Err(ScanError::TransmitError("socket closed".to_string()));
        };
        let len = self.builder.write_probe(port, &mut self.outbound, &mut self.scratch)?;
        let packet = &self.outbound[..len];

        if self.dump_packets && log_enabled!(Level::Trace) {
            trace!("<- {} bytes\n{}", len, hex_dump(packet));
        }

        match probe.send_packet(packet, self.destination) {
            Ok(n) if n == len => Ok(Transmit::Sent),
            Ok(n) => Err(ScanError::TransmitError(format!("sent {} of {} bytes", n, len))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Transmit::Deferred),
            Err(e) => Err(ScanError::TransmitError(e.to_string())),
        }
    }

    fn read_ready<O: ScanObserver + ?Sized>(&mut self, token: Token, observer: &mut O) {
        let (socket, channel) = match token {
            Token::PROBE => (self.probe.as_ref(), Channel::Probe),
            Token::ICMP => (self.icmp.as_ref(), Channel::Icmp),
            _ => return,
        };
        let Some(socket) = socket else {
            return;
        };

        let (len, from) = match socket.recv_packet(&mut self.inbound) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("Receive on {:?} channel failed: {}", channel, e);
                return;
            }
        };

        let data = &self.inbound[..len];
        if self.dump_packets && log_enabled!(Level::Trace) {
            trace!("-> {} bytes from {}\n{}", len, from, hex_dump(data));
        }

        let inbound = Inbound { channel, from, data };
        if let Some(response) = self.builder.read_response(&inbound) {
            self.apply_response(response, observer);
        }
    }

    /// Apply a verdict to the tracker. Only ports already probed by this
    /// session are eligible; anything else is unsolicited and dropped.
    /// Returns whether the port changed status.
    pub fn apply_response<O: ScanObserver + ?Sized>(&mut self, response: Response, observer: &mut O) -> bool {
        let port = response.port;
        if port < self.start_port || u32::from(port) >= self.next_port {
            trace!("Ignoring unsolicited response for port {}", port);
            return false;
        }
        let Some(tracker) = self.tracker.as_mut() else {
            return false;
        };
        if tracker.status(port) == PortStatus::Unknown {
            return false;
        }

        self.received += 1;
        let changed = match response.verdict {
            Verdict::Open => tracker.mark_open(port),
            Verdict::Closed => tracker.mark_closed(port),
        };
        if changed {
            let status = tracker.status(port);
            info!("Port {} is {} on {}", port, status, self.target);
            observer.port_changed(port, status);
        }
        changed
    }

    /// Compare `now` with the duration budget.
    ///
    /// Returns `Complete` with the final report once the duration is spent,
    /// whatever ports remain unsent. Otherwise emits at most one progress
    /// notification per second.
    pub fn check_progress<O: ScanObserver + ?Sized>(&mut self, now: Instant, observer: &mut O) -> Progress {
        let elapsed = now.saturating_duration_since(self.started_at);
        if elapsed >= self.duration {
            info!("Completed the scanning of {}", self.target);
            let report = self.report(elapsed);
            observer.completed(&report);
            return Progress::Complete(report);
        }

        if now.saturating_duration_since(self.last_report) >= PROGRESS_INTERVAL {
            self.last_report = now;
            debug!("tx: {}, rx: {}", self.sent, self.received);
            observer.progress(self.sent, self.received);
        }
        Progress::Continue
    }

    /// Build the report for the current state.
    pub fn report(&self, elapsed: Duration) -> ScanReport {
        let summary = self.tracker.as_ref().map(|t| t.final_report()).unwrap_or_default();
        ScanReport {
            target: self.target.clone(),
            destination: self.destination,
            family: self.family,
            transport: self.transport,
            start_port: self.start_port,
            end_port: self.end_port,
            open_ports: summary.open,
            closed: summary.closed,
            unanswered: summary.unanswered,
            unprobed: summary.unprobed,
            sent: self.sent,
            received: self.received,
            started_at: self.started_wall,
            elapsed,
        }
    }

    /// Deregister and close the sockets and release the tracker.
    ///
    /// Safe to call more than once and on a half-built session.
    pub fn terminate(&mut self) {
        if let Some(probe) = self.probe.take() {
            if self.registered.take().is_some() {
                if let Err(e) = self.selector.deregister(probe.as_raw_fd()) {
                    debug!("Deregistering probe socket: {}", e);
                }
            }
        }
        if let Some(icmp) = self.icmp.take() {
            if self.icmp_registered {
                if let Err(e) = self.selector.deregister(icmp.as_raw_fd()) {
                    debug!("Deregistering ICMPv6 socket: {}", e);
                }
                self.icmp_registered = false;
            }
        }
        self.tracker = None;
        self.terminated = true;
    }
}

impl<S: PacketSocket, P: Selector> Drop for Session<S, P> {
    fn drop(&mut self) {
        self.terminate();
    }
}
