use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use log::LevelFilter;
use std::process;

use halfscan::{
    config::{parse_port_range, ScanConfig},
    network::{AddressFamily, Transport},
    output::{ConsoleReporter, OutputConfig, OutputFormat, OutputManager},
    scanner::{EventLoop, Session},
};

fn build_cli() -> Command {
    Command::new("halfscan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Half-open TCP SYN and IPv6 UDP port scanner")
        .arg(
            Arg::new("target")
                .value_name("TARGET")
                .help("Host name or address to scan")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("ports")
                .short('p')
                .long("ports")
                .value_name("RANGE")
                .help("Port range to scan, e.g. 1-1024 or 443 [default: 1-65535]"),
        )
        .arg(
            Arg::new("ipv4")
                .short('4')
                .long("ipv4")
                .help("Scan over IPv4, overriding the config file")
                .conflicts_with("ipv6")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ipv6")
                .short('6')
                .long("ipv6")
                .help("Scan over IPv6")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("udp")
                .short('u')
                .long("udp")
                .help("Send empty UDP datagrams instead of SYNs (IPv6 only)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tcp")
                .long("tcp")
                .help("Send TCP SYNs, overriding the config file")
                .conflicts_with("udp")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("interface")
                .short('i')
                .long("interface")
                .value_name("IFACE")
                .help("Network interface to take the source address from"),
        )
        .arg(
            Arg::new("duration")
                .short('t')
                .long("duration")
                .value_name("SECONDS")
                .help("How long to send and listen [default: 10]")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Read settings from a TOML file (default: ~/.halfscan.toml)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Log every port classification")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Log every probe and the tx/rx counters")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .help("Hex-dump every packet sent and received")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the final report as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("closed")
                .long("closed")
                .help("Also print ports as they are found closed")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
}

fn init_logging(matches: &ArgMatches) {
    let mut builder = env_logger::Builder::from_default_env();
    if matches.get_flag("dump") {
        builder.filter_module("halfscan", LevelFilter::Trace);
    } else if matches.get_flag("debug") {
        builder.filter_module("halfscan", LevelFilter::Debug);
    } else if matches.get_flag("verbose") {
        builder.filter_module("halfscan", LevelFilter::Info);
    }
    builder.format_timestamp_millis().init();
}

/// Start from the config file and let command-line flags override it.
fn build_config(matches: &ArgMatches) -> anyhow::Result<ScanConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ScanConfig::from_toml_file(path).with_context(|| format!("loading {}", path))?,
        None => ScanConfig::load_default_config(),
    };

    if let Some(target) = matches.get_one::<String>("target") {
        config.target = target.clone();
    }
    if let Some(ports) = matches.get_one::<String>("ports") {
        let (start, end) = parse_port_range(ports).context("parsing --ports")?;
        config = config.with_ports(start, end);
    }
    if matches.get_flag("ipv4") {
        config = config.with_family(AddressFamily::Ipv4);
    } else if matches.get_flag("ipv6") {
        config = config.with_family(AddressFamily::Ipv6);
    }
    if matches.get_flag("tcp") {
        config = config.with_transport(Transport::Tcp);
    } else if matches.get_flag("udp") {
        config = config.with_transport(Transport::Udp);
    }
    if let Some(iface) = matches.get_one::<String>("interface") {
        config = config.with_interface(Some(iface.clone()));
    }
    if let Some(secs) = matches.get_one::<u64>("duration") {
        config = config.with_duration(*secs);
    }
    if matches.get_flag("dump") {
        config = config.with_packet_dump(true);
    }

    config.validate()?;
    Ok(config)
}

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = build_config(matches)?;
    let json = matches.get_flag("json");
    let colored = !matches.get_flag("no-color");

    let mut session = Session::create(&config)
        .with_context(|| format!("setting up {}/{} scan of {}", config.family, config.transport, config.target))?;

    if !json {
        println!(
            "{} {} ({}) ports {}-{} for {}s",
            "Scanning".bold(),
            config.target,
            session.destination(),
            config.start_port,
            config.end_port,
            config.duration_secs
        );
    }

    let mut reporter = ConsoleReporter::new(!json, colored).show_closed(matches.get_flag("closed"));
    let report = EventLoop::new().run(&mut session, &mut reporter).context("scan aborted")?;

    let output = OutputManager::new(OutputConfig {
        format: if json { OutputFormat::Json } else { OutputFormat::Text },
        colored,
        verbose: matches.get_flag("verbose") || matches.get_flag("debug"),
    });
    output.write_report(&report).context("writing report")?;
    Ok(())
}

fn main() {
    let matches = build_cli().get_matches();
    init_logging(&matches);

    if matches.get_flag("no-color") {
        colored::control::set_override(false);
    }

    if let Err(e) = run(&matches) {
        eprintln!("{} {:#}", "[!]".bright_red(), e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let matches = build_cli().get_matches_from(["halfscan", "-6", "-u", "-p", "53", "-t", "3", "::1"]);
        let config = build_config(&matches).unwrap();
        assert_eq!(config.target, "::1");
        assert_eq!(config.family, AddressFamily::Ipv6);
        assert_eq!(config.transport, Transport::Udp);
        assert_eq!((config.start_port, config.end_port), (53, 53));
        assert_eq!(config.duration_secs, 3);
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn flags_switch_file_settings_back_to_ipv4_tcp() {
        let file = config_file("family = \"ipv6\"\ntransport = \"udp\"\nduration_secs = 4\n");
        let path = file.path().to_str().unwrap();

        let matches = build_cli().get_matches_from(["halfscan", "-c", path, "127.0.0.1"]);
        let config = build_config(&matches).unwrap();
        assert_eq!((config.family, config.transport), (AddressFamily::Ipv6, Transport::Udp));

        let matches = build_cli().get_matches_from(["halfscan", "-c", path, "-4", "--tcp", "127.0.0.1"]);
        let config = build_config(&matches).unwrap();
        assert_eq!(config.family, AddressFamily::Ipv4);
        assert_eq!(config.transport, Transport::Tcp);
        assert_eq!(config.duration_secs, 4);
    }

    #[test]
    fn opposite_family_flags_conflict() {
        assert!(build_cli().try_get_matches_from(["halfscan", "-4", "-6", "localhost"]).is_err());
        assert!(build_cli().try_get_matches_from(["halfscan", "--tcp", "-u", "localhost"]).is_err());
    }

    #[test]
    fn bad_range_is_rejected() {
        let matches = build_cli().get_matches_from(["halfscan", "-p", "9-1", "localhost"]);
        assert!(build_config(&matches).is_err());
    }
}
