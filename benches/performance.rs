//! Performance benchmarks for the halfscan probe path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use halfscan::network::checksum::checksum;
use halfscan::network::packet::{
    Channel, Inbound, PacketBuilder, ProbeBuilder, ProbeParams, OUTBOUND_CAPACITY, SCRATCH_CAPACITY,
};
use halfscan::network::{AddressFamily, Transport};
use halfscan::scanner::PortTracker;
use std::net::IpAddr;

fn params(family: AddressFamily) -> ProbeParams {
    let (src, dst): (IpAddr, IpAddr) = match family {
        AddressFamily::Ipv4 => ("192.168.1.1".parse().unwrap(), "192.168.1.100".parse().unwrap()),
        AddressFamily::Ipv6 => ("2001:db8::1".parse().unwrap(), "2001:db8::100".parse().unwrap()),
    };
    ProbeParams::new(src, dst).with_source_port(54321).with_sequence(1)
}

/// Benchmark the checksum engine over header-sized and larger inputs
fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    for size in [20usize, 32, 60, 1500] {
        let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| black_box(checksum(black_box(data))))
        });
    }
    group.finish();
}

/// Benchmark per-port probe construction for every variant
fn bench_write_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_probe");
    let variants = [
        ("tcp4", AddressFamily::Ipv4, Transport::Tcp),
        ("tcp6", AddressFamily::Ipv6, Transport::Tcp),
        ("udp6", AddressFamily::Ipv6, Transport::Udp),
    ];

    for (name, family, transport) in variants {
        let builder = PacketBuilder::select(family, transport, params(family)).unwrap();
        let mut out = vec![0u8; OUTBOUND_CAPACITY];
        let mut scratch = vec![0u8; SCRATCH_CAPACITY];
        builder.prepare(&mut out, &mut scratch).unwrap();

        group.throughput(Throughput::Elements(1000));
        group.bench_function(BenchmarkId::new(name, 1000), |b| {
            b.iter(|| {
                for port in 1..=1000u16 {
                    black_box(builder.write_probe(port, &mut out, &mut scratch).unwrap());
                }
            })
        });
    }
    group.finish();
}

/// Benchmark classification of a reply that does not match
fn bench_read_response(c: &mut Criterion) {
    let builder = PacketBuilder::select(AddressFamily::Ipv4, Transport::Tcp, params(AddressFamily::Ipv4)).unwrap();
    let mut out = vec![0u8; OUTBOUND_CAPACITY];
    let mut scratch = vec![0u8; SCRATCH_CAPACITY];
    builder.prepare(&mut out, &mut scratch).unwrap();
    let len = builder.write_probe(80, &mut out, &mut scratch).unwrap();
    let from: IpAddr = "192.168.1.1".parse().unwrap();

    c.bench_function("read_response_reflected_probe", |b| {
        b.iter(|| {
            let inbound = Inbound {
                channel: Channel::Probe,
                from,
                data: black_box(&out[..len]),
            };
            black_box(builder.read_response(&inbound))
        })
    });
}

/// Benchmark a full-range pass over the tracker
fn bench_tracker(c: &mut Criterion) {
    c.bench_function("tracker_full_range", |b| {
        b.iter(|| {
            let mut tracker = PortTracker::new(1, 65535);
            for port in 1..=65535u16 {
                tracker.mark_probed(port);
                if port % 100 == 0 {
                    tracker.mark_closed(port);
                }
            }
            black_box(tracker.final_report())
        })
    });
}

criterion_group!(
    benches,
    bench_checksum,
    bench_write_probe,
    bench_read_response,
    bench_tracker
);
criterion_main!(benches);
