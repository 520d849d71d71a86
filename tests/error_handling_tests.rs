//! Error taxonomy and setup failure tests

use halfscan::config::ScanConfig;
use halfscan::network::interface::{resolve_destination, select_source, InterfaceCandidate};
use halfscan::network::{AddressFamily, Transport};
use halfscan::scanner::Session;
use halfscan::ScanError;
use std::io;
use std::net::IpAddr;

fn setup_error(config: &ScanConfig) -> ScanError {
    match Session::create(config) {
        Err(e) => e,
        Ok(_) => panic!("session for {:?} should not have been created", config),
    }
}

#[test]
fn test_unsupported_pair_message() {
    let err = ScanError::UnsupportedProtocolError {
        family: AddressFamily::Ipv4,
        transport: Transport::Udp,
    };
    assert_eq!(err.to_string(), "Unsupported protocol combination: IPv4/udp");
    assert!(err.is_setup_error());
}

#[test]
fn test_io_errors_convert() {
    let err: ScanError = io::Error::new(io::ErrorKind::Other, "boom").into();
    assert!(matches!(err, ScanError::IoError(_)));
    assert!(!err.is_setup_error());
}

#[test]
fn test_raw_socket_refusal_is_permission_error() {
    let err = ScanError::from_socket_io("socket(SOCK_RAW)", io::Error::from_raw_os_error(libc::EPERM));
    assert!(matches!(err, ScanError::PermissionError(_)));
    assert!(err.to_string().contains("CAP_NET_RAW"));
}

#[test]
fn test_invalid_config_fails_before_resolution() {
    let err = setup_error(&ScanConfig::new("").with_transport(Transport::Udp));
    assert!(matches!(err, ScanError::ConfigError(_)));

    let err = setup_error(&ScanConfig::new("127.0.0.1").with_ports(10, 1));
    assert!(matches!(err, ScanError::ConfigError(_)));
}

#[test]
fn test_family_mismatch_is_resolution_error() {
    let err = setup_error(&ScanConfig::new("::1").with_family(AddressFamily::Ipv4));
    assert!(matches!(err, ScanError::ResolutionError(_)));

    assert!(matches!(
        resolve_destination("127.0.0.1", AddressFamily::Ipv6),
        Err(ScanError::ResolutionError(_))
    ));
}

#[test]
fn test_literal_addresses_resolve_without_lookup() {
    assert_eq!(
        resolve_destination("192.0.2.55", AddressFamily::Ipv4).unwrap(),
        "192.0.2.55".parse::<IpAddr>().unwrap()
    );
    assert_eq!(
        resolve_destination("2001:db8::55", AddressFamily::Ipv6).unwrap(),
        "2001:db8::55".parse::<IpAddr>().unwrap()
    );
}

#[test]
fn test_unresolvable_name() {
    assert!(matches!(
        resolve_destination("no-such-host.invalid", AddressFamily::Ipv4),
        Err(ScanError::ResolutionError(_))
    ));
}

#[test]
fn test_no_source_address_is_address_error() {
    let ifaces = vec![InterfaceCandidate {
        name: "eth0".to_string(),
        is_up: true,
        is_loopback: false,
        addresses: vec!["192.0.2.10".parse().unwrap()],
    }];
    assert!(matches!(
        select_source(&ifaces, AddressFamily::Ipv6, None),
        Err(ScanError::AddressError(_))
    ));
    assert!(matches!(
        select_source(&ifaces, AddressFamily::Ipv4, Some("wlan0")),
        Err(ScanError::AddressError(_))
    ));
}
