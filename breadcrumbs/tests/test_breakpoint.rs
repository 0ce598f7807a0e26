use std::io;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use breadcrumbs::cs::CommandBuffer;
use breadcrumbs::device::Device;
use breadcrumbs::domain::{Breadcrumb, GpuError};
use breadcrumbs::emitter::emit_sync_breadcrumb;
use breadcrumbs::poller::PollerExit;
use breadcrumbs::region::HostBuffer;
use breadcrumbs::sim::SimGpu;
use breadcrumbs_common::Opcode;
use crossbeam_channel::{unbounded, Receiver};

/// Device whose breakpoint prompts are confirmed and forwarded to the receiver
fn instrumented(option: &str) -> (Arc<HostBuffer>, Device, Receiver<u32>) {
    let global = Arc::new(HostBuffer::new());
    let mut device = Device::new(global.clone());
    let (prompt_tx, prompt_rx) = unbounded();
    device.breadcrumbs_init_with(Some(option), move |b: Breadcrumb| -> io::Result<()> {
        prompt_tx.send(b.0).ok();
        Ok(())
    });
    assert!(device.breadcrumbs().is_some());
    (global, device, prompt_rx)
}

fn sink() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("Failed to bind receiver");
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

fn draws(device: &Device, count: usize) -> Vec<u32> {
    let mut cs = CommandBuffer::growable(device);
    for _ in 0..count {
        cs.emit_packet(Opcode::DrawIndx.raw(), &[0, 0, 0]);
    }
    cs.into_words()
}

/// `count` breadcrumbs, each after a NOP, regardless of gating
fn breadcrumbs(device: &Device, count: usize) -> Vec<u32> {
    let mut cs = CommandBuffer::growable(device);
    for _ in 0..count {
        cs.emit_packet(Opcode::Nop.raw(), &[0]);
        emit_sync_breadcrumb(&mut cs, 0, 0);
    }
    cs.into_words()
}

#[test]
fn test_single_step_after_hits() {
    let (_sink, port) = sink();
    let (global, mut device, prompts) = instrumented(&format!("127.0.0.1:{port},break=50:2"));

    // 1..=49 are gated away at record time
    let words = breadcrumbs(&device, 60);
    assert_eq!(device.breadcrumbs().unwrap().breadcrumbs_allocated(), 60);

    let gpu = SimGpu::new(global.clone()).spawn();

    gpu.submit_and_wait(words.clone()).expect("Replay 1 faulted");
    assert_eq!(prompts.try_iter().count(), 0);

    gpu.submit_and_wait(words.clone()).expect("Replay 2 faulted");
    assert_eq!(prompts.try_iter().collect::<Vec<_>>(), (51..=60).collect::<Vec<_>>());

    gpu.submit_and_wait(words).expect("Replay 3 faulted");
    assert_eq!(prompts.try_iter().collect::<Vec<_>>(), (50..=60).collect::<Vec<_>>());

    let stats = device.breadcrumbs_finish().expect("Poller stats");
    assert_eq!(stats.reported, 3 * 11);
    assert_eq!(stats.prompts, 21);
}

#[test]
fn test_sentinel_never_prompts() {
    let (_sink, port) = sink();
    for option in [
        format!("127.0.0.1:{port},break=-1:0"),
        format!("127.0.0.1:{port},break=4294967295:0"),
    ] {
        let (global, mut device, prompts) = instrumented(&option);
        let words = draws(&device, 10);

        let gpu = SimGpu::new(global.clone()).spawn();
        gpu.submit_and_wait(words.clone()).expect("Submission faulted");
        gpu.submit_and_wait(words).expect("Submission faulted");

        let stats = device.breadcrumbs_finish().expect("Poller stats");
        assert_eq!(stats.reported, 40);
        assert_eq!(stats.prompts, 0);
        assert_eq!(prompts.try_iter().count(), 0);
    }
}

#[test]
fn test_failed_prompt_parks_the_gpu() {
    let (_sink, port) = sink();
    let global = Arc::new(HostBuffer::new());
    let mut device = Device::new(global.clone());
    device.breadcrumbs_init_with(
        Some(&format!("127.0.0.1:{port},break=3:0")),
        |_: Breadcrumb| -> io::Result<()> { Err(io::ErrorKind::UnexpectedEof.into()) },
    );

    let words = draws(&device, 3);
    let gpu = SimGpu::new(global.clone()).with_hangcheck(Duration::from_millis(300)).spawn();
    let err = gpu.submit_and_wait(words).expect_err("GPU should stay parked");
    assert!(matches!(err, GpuError::Hang { last_published: Breadcrumb(3), .. }));

    let stats = device.breadcrumbs_finish().expect("Poller stats");
    assert_eq!(stats.exit, PollerExit::PromptFailed);
    assert_eq!(stats.prompts, 1);
    assert_eq!(stats.last, None);
}
