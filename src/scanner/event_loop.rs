//! Readiness selector and the single-threaded scan loop
//!
//! One blocking wait per iteration, bounded by a timeout shorter than the
//! progress cadence so completion is checked even when the socket is idle.

use crate::error::{ScanError, ScanResult};
use crate::network::socket::PacketSocket;
use crate::scanner::session::Session;
use crate::scanner::{Progress, ScanObserver, ScanReport};
use log::debug;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

/// Upper bound on a single readiness wait
pub const WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Most events collected per wait (probe + ICMPv6 sockets)
pub const MAX_EVENTS: usize = 4;

/// Identifies a registered socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub usize);

impl Token {
    pub const PROBE: Token = Token(0);
    pub const ICMP: Token = Token(1);
}

/// Directions a registration waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READ: Interest = Interest { read: true, write: false };
    pub const READ_WRITE: Interest = Interest { read: true, write: true };

    fn epoll_bits(&self) -> u32 {
        let mut bits = 0;
        if self.read {
            bits |= libc::EPOLLIN as u32;
        }
        if self.write {
            bits |= libc::EPOLLOUT as u32;
        }
        bits
    }
}

/// One readiness notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

impl Event {
    pub fn new(token: Token, readable: bool, writable: bool) -> Self {
        Self {
            token,
            readable,
            writable,
        }
    }

    fn from_epoll(token: Token, bits: u32) -> Self {
        // Errors and hangups are surfaced through the read path.
        let read_mask = (libc::EPOLLIN | libc::EPOLLERR | libc::EPOLLHUP) as u32;
        Self::new(token, bits & read_mask != 0, bits & libc::EPOLLOUT as u32 != 0)
    }
}

/// Readiness primitive the session registers its sockets with
pub trait Selector {
    fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()>;

    fn reregister(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()>;

    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Block until a registered socket is ready or `timeout` expires.
    /// An expiry leaves `events` empty.
    fn select(&mut self, events: &mut Vec<Event>, timeout: Duration) -> io::Result<()>;
}

/// Level-triggered epoll instance
pub struct Epoll {
    fd: OwnedFd,
}

impl Epoll {
    pub fn new() -> io::Result<Self> {
        // SAFETY: plain syscall; the returned fd is checked before use.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: `fd` is a freshly created descriptor nobody else owns.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interest.epoll_bits(),
            u64: token.0 as u64,
        };
        // SAFETY: `event` is a valid epoll_event for the duration of the call.
        if unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), op, fd, &mut event) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Selector for Epoll {
    fn register(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, token, interest)
    }

    fn reregister(&mut self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, token, interest)
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        // SAFETY: a null event is accepted for EPOLL_CTL_DEL since Linux 2.6.9.
        if unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn select(&mut self, events: &mut Vec<Event>, timeout: Duration) -> io::Result<()> {
        events.clear();
        let mut raw = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;

        // SAFETY: `raw` has room for MAX_EVENTS entries.
        let n = unsafe { libc::epoll_wait(self.fd.as_raw_fd(), raw.as_mut_ptr(), MAX_EVENTS as libc::c_int, timeout_ms) };
        if n == -1 {
            let err = io::Error::last_os_error();
            // A signal cut the wait short; treat it as an expiry.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for entry in &raw[..n as usize] {
            let bits = entry.events;
            let token = entry.u64;
            events.push(Event::from_epoll(Token(token as usize), bits));
        }
        Ok(())
    }
}

/// Drives one session until its duration is spent
#[derive(Debug, Clone)]
pub struct EventLoop {
    timeout: Duration,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self { timeout: WAIT_TIMEOUT }
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `session` to completion and return its final report.
    ///
    /// The session is terminated on every exit path. A failed wait is
    /// returned as `WaitError`.
    pub fn run<S, P, O>(&self, session: &mut Session<S, P>, observer: &mut O) -> ScanResult<ScanReport>
    where
        S: PacketSocket,
        P: Selector,
        O: ScanObserver + ?Sized,
    {
        let mut events = Vec::with_capacity(MAX_EVENTS);
        loop {
            if let Err(e) = session.wait(&mut events, self.timeout) {
                session.terminate();
                return Err(match e {
                    ScanError::WaitError(_) => e,
                    other => ScanError::WaitError(other.to_string()),
                });
            }

            for event in &events {
                session.dispatch(*event, observer);
            }

            if let Progress::Complete(report) = session.check_progress(Instant::now(), observer) {
                debug!("tx: {}, rx: {} at completion", report.sent, report.received);
                session.terminate();
                return Ok(report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_bits() {
        assert_eq!(Interest::READ.epoll_bits(), libc::EPOLLIN as u32);
        assert_eq!(
            Interest::READ_WRITE.epoll_bits(),
            (libc::EPOLLIN | libc::EPOLLOUT) as u32
        );
    }

    #[test]
    fn error_bits_are_readable() {
        let event = Event::from_epoll(Token::PROBE, libc::EPOLLERR as u32);
        assert!(event.readable);
        assert!(!event.writable);
    }

    #[test]
    fn epoll_times_out_without_registrations() {
        let mut epoll = Epoll::new().expect("epoll_create1");
        let mut events = vec![Event::new(Token::PROBE, true, true)];
        epoll.select(&mut events, Duration::from_millis(10)).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn epoll_reports_write_readiness() {
        let (a, _b) = std::os::unix::net::UnixDatagram::pair().unwrap();
        let mut epoll = Epoll::new().unwrap();
        epoll.register(a.as_raw_fd(), Token::PROBE, Interest::READ_WRITE).unwrap();
        let mut events = Vec::new();
        epoll.select(&mut events, Duration::from_millis(100)).unwrap();
        assert_eq!(events, vec![Event::new(Token::PROBE, false, true)]);

        epoll.reregister(a.as_raw_fd(), Token::PROBE, Interest::READ).unwrap();
        epoll.select(&mut events, Duration::from_millis(10)).unwrap();
        assert!(events.is_empty());
        epoll.deregister(a.as_raw_fd()).unwrap();
    }
}
