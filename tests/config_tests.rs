//! Configuration loading and validation tests

use halfscan::config::{parse_port_range, ScanConfig, DEFAULT_DURATION_SECS};
use halfscan::network::{AddressFamily, Transport};
use halfscan::ScanError;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_full_toml_file() {
    let file = write_config(
        r#"
target = "2001:db8::1"
interface = "eth0"
family = "ipv6"
transport = "udp"
start_port = 50
end_port = 60
duration_secs = 3
dump_packets = true
"#,
    );

    let config = ScanConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.target, "2001:db8::1");
    assert_eq!(config.interface.as_deref(), Some("eth0"));
    assert_eq!(config.family, AddressFamily::Ipv6);
    assert_eq!(config.transport, Transport::Udp);
    assert_eq!((config.start_port, config.end_port), (50, 60));
    assert_eq!(config.duration_secs, 3);
    assert!(config.dump_packets);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_uses_defaults() {
    let file = write_config("target = \"scanme.example\"\nend_port = 1024\n");
    let config = ScanConfig::from_toml_file(file.path()).unwrap();

    assert_eq!(config.family, AddressFamily::Ipv4);
    assert_eq!(config.transport, Transport::Tcp);
    assert_eq!(config.start_port, 1);
    assert_eq!(config.end_port, 1024);
    assert_eq!(config.duration_secs, DEFAULT_DURATION_SECS);
    assert_eq!(config.interface, None);
}

#[test]
fn test_bad_toml_is_config_error() {
    let file = write_config("family = \"ipx\"\n");
    assert!(matches!(
        ScanConfig::from_toml_file(file.path()),
        Err(ScanError::ConfigError(_))
    ));

    let file = write_config("start_port = 70000\n");
    assert!(matches!(
        ScanConfig::from_toml_file(file.path()),
        Err(ScanError::ConfigError(_))
    ));
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ScanConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ScanError::ConfigError(_)));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_config_round_trips_through_toml() {
    let config = ScanConfig::new("10.0.0.1")
        .with_family(AddressFamily::Ipv4)
        .with_ports(20, 25)
        .with_duration(4)
        .with_interface(Some("wlan0".to_string()));
    let text = toml::to_string(&config).unwrap();
    let file = write_config(&text);
    assert_eq!(ScanConfig::from_toml_file(file.path()).unwrap(), config);
}

#[test]
fn test_port_range_edges() {
    assert_eq!(parse_port_range("1-65535").unwrap(), (1, 65535));
    assert_eq!(parse_port_range("65535").unwrap(), (65535, 65535));
    assert_eq!(parse_port_range("80 - 90").unwrap(), (80, 90));
    assert!(parse_port_range("").is_err());
    assert!(parse_port_range("-").is_err());
    assert!(parse_port_range("1-2-3").is_err());
    assert!(parse_port_range("0").is_err());
    assert!(parse_port_range("65536").is_err());
}

#[test]
fn test_port_count() {
    assert_eq!(ScanConfig::new("h").with_ports(1, 1).port_count(), 1);
    assert_eq!(ScanConfig::new("h").with_ports(1, 65535).port_count(), 65535);
    assert_eq!(ScanConfig::new("h").with_ports(10, 9).port_count(), 0);
}
