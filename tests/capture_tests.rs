use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use etherparse::PacketBuilder;
use tcpcarve::capture::PacketSource;
use tcpcarve::stats::Statistics;
use tcpcarve::types::FourTuple;
use tempfile::tempdir;

fn tcp_frame(payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .tcp(4444, 80, 1000, 64240);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

fn udp_frame(payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .udp(4444, 53);
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut frame, payload).unwrap();
    frame
}

fn write_pcap(path: &Path, packets: &[(u32, Vec<u8>)]) {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    for (ts, frame) in packets {
        out.extend_from_slice(&ts.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(frame);
    }
    fs::write(path, out).unwrap();
}

#[test]
fn test_tcp_payload_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("one.pcap");
    write_pcap(&path, &[(1700000000, tcp_frame(b"hello capture"))]);

    let mut stats = Statistics::new();
    let mut source = PacketSource::open(&path).unwrap();
    let p = source.next_payload(&mut stats).unwrap().unwrap();
    assert_eq!(p.data, b"hello capture");
    assert_eq!(p.ts, 1700000000);
    assert_eq!(
        p.tuple,
        FourTuple::new(
            Ipv4Addr::new(10, 0, 0, 1),
            4444,
            Ipv4Addr::new(10, 0, 0, 2),
            80
        )
    );
    assert!(source.next_payload(&mut stats).unwrap().is_none());
    assert_eq!(stats.total_packets, 1);
}

#[test]
fn test_non_tcp_packets_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.pcap");
    write_pcap(
        &path,
        &[
            (100, udp_frame(b"dns query")),
            (101, tcp_frame(b"tcp data")),
        ],
    );

    let mut stats = Statistics::new();
    let mut source = PacketSource::open(&path).unwrap();
    let p = source.next_payload(&mut stats).unwrap().unwrap();
    assert_eq!(p.data, b"tcp data");
    assert!(source.next_payload(&mut stats).unwrap().is_none());
    // both packets are counted even though only one carried a payload
    assert_eq!(stats.total_packets, 2);
}

#[test]
fn test_empty_tcp_payload_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ack.pcap");
    write_pcap(&path, &[(100, tcp_frame(b"")), (101, tcp_frame(b"late"))]);

    let mut stats = Statistics::new();
    let mut source = PacketSource::open(&path).unwrap();
    let p = source.next_payload(&mut stats).unwrap().unwrap();
    assert_eq!(p.data, b"late");
    assert!(source.next_payload(&mut stats).unwrap().is_none());
}
