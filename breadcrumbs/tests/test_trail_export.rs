use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use breadcrumbs::cs::CommandBuffer;
use breadcrumbs::device::Device;
use breadcrumbs::domain::Breadcrumb;
use breadcrumbs::listener::{BreadcrumbTrail, TrailEntry};
use breadcrumbs::region::HostBuffer;
use breadcrumbs::sim::SimGpu;
use breadcrumbs_common::Opcode;

#[test]
fn test_export_creates_valid_json() {
    let mut trail = BreadcrumbTrail::new();
    for value in [1, 2, 3, 1] {
        trail.record(Breadcrumb(value));
    }
    trail.record_datagram(b"xx");

    let file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    trail.export(BufWriter::new(file.reopen().unwrap())).expect("Failed to export trail");

    let parsed: serde_json::Value =
        serde_json::from_reader(BufReader::new(File::open(file.path()).unwrap()))
            .expect("Invalid JSON");

    assert_eq!(parsed["breadcrumbs"].as_array().unwrap().len(), 4);
    assert_eq!(parsed["last"]["breadcrumb"], 1);
    assert_eq!(parsed["last"]["occurrence"], 1);
    assert_eq!(parsed["suggested_break"], "break=1:1");
    assert_eq!(parsed["malformed"], 1);

    let entries: Vec<TrailEntry> =
        serde_json::from_value(parsed["breadcrumbs"].clone()).expect("Entries round trip");
    assert_eq!(entries, trail.entries());
}

#[test]
fn test_empty_trail_has_no_suggestion() {
    let mut buffer = Vec::new();
    BreadcrumbTrail::new().export(&mut buffer).expect("Failed to export trail");

    let parsed: serde_json::Value = serde_json::from_slice(&buffer).expect("Invalid JSON");
    assert_eq!(parsed["breadcrumbs"], serde_json::json!([]));
    assert!(parsed.get("last").is_none());
    assert!(parsed.get("suggested_break").is_none());
}

#[test]
fn test_trail_from_replayed_stream() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let port = socket.local_addr().unwrap().port();

    let global = Arc::new(HostBuffer::new());
    let mut device = Device::new(global.clone());
    device.breadcrumbs_init_with(
        Some(&format!("127.0.0.1:{port},break=-1:0")),
        |_: Breadcrumb| -> std::io::Result<()> { Ok(()) },
    );

    let mut cs = CommandBuffer::growable(&device);
    cs.emit_packet(Opcode::ExecCs.raw(), &[1, 1, 1]);
    let words = cs.into_words();

    let gpu = SimGpu::new(global.clone()).spawn();
    gpu.submit_and_wait(words.clone()).unwrap();
    gpu.submit_and_wait(words).unwrap();

    let mut trail = BreadcrumbTrail::new();
    let mut buf = [0u8; 16];
    for _ in 0..4 {
        let len = socket.recv(&mut buf).unwrap();
        trail.record_datagram(&buf[..len]).unwrap();
    }
    device.breadcrumbs_finish();

    let lines: Vec<String> = trail.entries().iter().map(ToString::to_string).collect();
    assert_eq!(lines, ["1:0", "2:0", "1:1", "2:1"]);
    assert_eq!(trail.suggested_breakpoint().unwrap().to_string(), "break=2:1");
}
