//! Output formatting and live console reporting

use crate::scanner::{PortStatus, ScanObserver, ScanReport};
use chrono::{DateTime, Utc};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};
use std::time::Duration;

/// Output format options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub colored: bool,
    /// List unanswered and unprobed counts in text output
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            colored: true,
            verbose: false,
        }
    }
}

/// Writes the final report in the configured format
pub struct OutputManager {
    config: OutputConfig,
}

impl OutputManager {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Write the report to stdout
    pub fn write_report(&self, report: &ScanReport) -> io::Result<()> {
        let output = self.render(report)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(output.as_bytes())?;
        stdout.flush()
    }

    pub fn render(&self, report: &ScanReport) -> io::Result<String> {
        match self.config.format {
            OutputFormat::Text => Ok(self.format_text(report)),
            OutputFormat::Json => format_json(report),
        }
    }

    fn format_text(&self, report: &ScanReport) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "\n{} {} ({}) {}/{} ports {}-{}",
            self.paint("Scan report for", Paint::Bold),
            report.target,
            report.destination,
            report.family,
            report.transport,
            report.start_port,
            report.end_port
        );

        if report.open_ports.is_empty() {
            let _ = writeln!(output, "No open ports found");
        } else {
            let _ = writeln!(output, "{:<8} {}", "PORT", "STATE");
            for port in &report.open_ports {
                let label = format!("{}/{}", port, report.transport);
                let _ = writeln!(output, "{:<8} {}", label, self.paint("open", Paint::Open));
            }
        }

        if report.closed > 0 {
            let _ = writeln!(output, "{}", self.paint(&format!("{} closed ports", report.closed), Paint::Dim));
        }
        if self.config.verbose {
            let _ = writeln!(output, "{} unanswered, {} not probed", report.unanswered, report.unprobed);
        }

        let _ = writeln!(
            output,
            "tx: {}, rx: {} in {:.2}s ({:.0} probes/s)",
            report.sent,
            report.received,
            report.elapsed.as_secs_f64(),
            report.send_rate()
        );
        output
    }

    fn paint(&self, text: &str, paint: Paint) -> String {
        if !self.config.colored {
            return text.to_string();
        }
        match paint {
            Paint::Bold => text.bold().to_string(),
            Paint::Open => text.bright_green().to_string(),
            Paint::Dim => text.bright_black().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Paint {
    Bold,
    Open,
    Dim,
}

/// JSON-serializable scan result
#[derive(Debug, Serialize, Deserialize)]
struct JsonScanReport {
    target: String,
    address: String,
    family: String,
    protocol: String,
    scan_time: DateTime<Utc>,
    duration_seconds: f64,
    send_rate: f64,
    open_ports: Vec<u16>,
    statistics: JsonScanStats,
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonScanStats {
    packets_sent: u64,
    packets_received: u64,
    closed: usize,
    unanswered: usize,
    unprobed: usize,
}

impl From<&ScanReport> for JsonScanReport {
    fn from(report: &ScanReport) -> Self {
        Self {
            target: report.target.clone(),
            address: report.destination.to_string(),
            family: report.family.to_string(),
            protocol: report.transport.to_string(),
            scan_time: report.started_at,
            duration_seconds: report.elapsed.as_secs_f64(),
            send_rate: report.send_rate(),
            open_ports: report.open_ports.clone(),
            statistics: JsonScanStats {
                packets_sent: report.sent,
                packets_received: report.received,
                closed: report.closed,
                unanswered: report.unanswered,
                unprobed: report.unprobed,
            },
        }
    }
}

fn format_json(report: &ScanReport) -> io::Result<String> {
    let mut json = serde_json::to_string_pretty(&JsonScanReport::from(report))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    json.push('\n');
    Ok(json)
}

/// Live console observer: prints each port as it is classified and keeps
/// a spinner with the tx/rx counters.
///
/// The spinner only exists when stderr is a terminal. Otherwise, and
/// whenever the bar is hidden, discoveries go straight to the writer.
pub struct ConsoleReporter {
    spinner: Option<ProgressBar>,
    out: Box<dyn Write>,
    show_closed: bool,
    colored: bool,
}

impl ConsoleReporter {
    pub fn new(interactive: bool, colored: bool) -> Self {
        let spinner = (interactive && io::stderr().is_terminal()).then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed}] {msg}") {
                bar.set_style(style);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });
        Self {
            spinner,
            out: Box::new(io::stdout()),
            show_closed: false,
            colored,
        }
    }

    /// Reporter without a spinner that writes discoveries to `out`.
    pub fn with_writer(out: Box<dyn Write>, colored: bool) -> Self {
        Self {
            spinner: None,
            out,
            show_closed: false,
            colored,
        }
    }

    pub fn show_closed(mut self, show: bool) -> Self {
        self.show_closed = show;
        self
    }

    fn line(&mut self, text: String) {
        match &self.spinner {
            Some(bar) if !bar.is_hidden() => bar.println(text),
            _ => {
                if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
                    log::warn!("Failed to write port status: {}", e);
                }
            }
        }
    }
}

impl ScanObserver for ConsoleReporter {
    fn port_changed(&mut self, port: u16, status: PortStatus) {
        let text = match status {
            PortStatus::Open => format!("Port {} is open", port),
            PortStatus::Closed if self.show_closed => format!("Port {} is closed", port),
            _ => return,
        };
        if self.colored && status == PortStatus::Open {
            self.line(text.bright_green().to_string());
        } else {
            self.line(text);
        }
    }

    fn progress(&mut self, sent: u64, received: u64) {
        if let Some(bar) = &self.spinner {
            bar.set_message(format!("tx: {}, rx: {}", sent, received));
        }
    }

    fn completed(&mut self, report: &ScanReport) {
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
        log::debug!("{} open of {} ports", report.open_ports.len(), report.total_ports());
    }
}

/// Hex dump with 16 bytes per row and a printable column.
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4);
    for (row, chunk) in data.chunks(16).enumerate() {
        let _ = write!(out, "{:04x}  ", row * 16);
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{:02x} ", b);
                }
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }
        out.push(' ');
        out.extend(chunk.iter().map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' }));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{AddressFamily, Transport};
    use std::net::{IpAddr, Ipv4Addr};

    fn report() -> ScanReport {
        ScanReport {
            target: "localhost".to_string(),
            destination: IpAddr::V4(Ipv4Addr::LOCALHOST),
            family: AddressFamily::Ipv4,
            transport: Transport::Tcp,
            start_port: 1,
            end_port: 1024,
            open_ports: vec![22, 631],
            closed: 1000,
            unanswered: 22,
            unprobed: 0,
            sent: 1024,
            received: 1002,
            started_at: Utc::now(),
            elapsed: Duration::from_secs(2),
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    #[test]
    fn reporter_without_terminal_writes_discoveries() {
        let buf = SharedBuf::default();
        let mut reporter = ConsoleReporter::with_writer(Box::new(buf.clone()), false).show_closed(true);
        reporter.port_changed(8081, PortStatus::Open);
        reporter.port_changed(8080, PortStatus::Closed);
        reporter.port_changed(8082, PortStatus::Probed);
        reporter.progress(3, 2);
        reporter.completed(&report());

        assert_eq!(buf.text(), "Port 8081 is open\nPort 8080 is closed\n");
    }

    #[test]
    fn reporter_hides_closed_by_default() {
        let buf = SharedBuf::default();
        let mut reporter = ConsoleReporter::with_writer(Box::new(buf.clone()), false);
        reporter.port_changed(8080, PortStatus::Closed);
        reporter.port_changed(22, PortStatus::Open);

        assert_eq!(buf.text(), "Port 22 is open\n");
    }

    #[test]
    fn reporter_falls_back_when_stderr_is_not_a_terminal() {
        if io::stderr().is_terminal() {
            return;
        }
        let reporter = ConsoleReporter::new(true, false);
        assert!(reporter.spinner.is_none());
    }

    #[test]
    fn hex_dump_layout() {
        let dump = hex_dump(b"0123456789abcdefXY");
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000  30 31 32"));
        assert!(lines[0].ends_with("0123456789abcdef"));
        assert!(lines[1].starts_with("0010  58 59"));
        assert!(lines[1].ends_with("XY"));
    }

    #[test]
    fn hex_dump_masks_unprintable() {
        assert!(hex_dump(&[0x00, 0x41, 0xff]).trim_end().ends_with(".A."));
    }

    #[test]
    fn text_lists_open_ports() {
        let manager = OutputManager::new(OutputConfig {
            colored: false,
            ..Default::default()
        });
        let text = manager.render(&report()).unwrap();
        assert!(text.contains("22/tcp"));
        assert!(text.contains("631/tcp"));
        assert!(text.contains("1000 closed ports"));
        assert!(text.contains("tx: 1024, rx: 1002"));
    }

    #[test]
    fn json_carries_statistics() {
        let manager = OutputManager::new(OutputConfig {
            format: OutputFormat::Json,
            ..Default::default()
        });
        let json = manager.render(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["open_ports"], serde_json::json!([22, 631]));
        assert_eq!(value["protocol"], "tcp");
        assert_eq!(value["statistics"]["unanswered"], 22);
    }

    #[test]
    fn format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
