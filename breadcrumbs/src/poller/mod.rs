//! # Host Poller
//!
//! Dedicated thread watching `gpu_sync_seqno`. Every new value is sent to the
//! remote observer as a 4-byte big-endian UDP datagram, optionally held at
//! the interactive breakpoint, and then acknowledged through
//! `cpu_sync_seqno`, which releases the GPU from its `CP_WAIT_REG_MEM`.
//!
//! The loop runs until the device is finished because every breadcrumb the
//! GPU reaches needs an ack; without one the GPU would time out.

pub mod prompt;

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use breadcrumbs_common::encode_breadcrumb;
use log::{debug, error, info};

use crate::breakpoint::BreakpointTracker;
use crate::context::BreadcrumbsContext;
use crate::domain::Breadcrumb;

pub use prompt::{BreakpointPrompt, StdinPrompt};

/// Name of the poller thread
pub const POLLER_THREAD_NAME: &str = "breadcrumbs";

/// Why the poller loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollerExit {
    /// Stop flag set by finish
    #[default]
    Stopped,
    SocketFailed,
    SendFailed,
    PromptFailed,
}

/// Counters returned when the poller thread ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Datagrams sent
    pub reported: u64,
    /// Interactive prompts issued
    pub prompts: u64,
    /// Last breadcrumb acknowledged
    pub last: Option<Breadcrumb>,
    pub exit: PollerExit,
}

/// Start the poller thread for `ctx`
///
/// # Errors
/// Returns an error if the thread cannot be spawned.
pub fn spawn(
    ctx: Arc<BreadcrumbsContext>,
    prompt: Box<dyn BreakpointPrompt>,
) -> std::io::Result<JoinHandle<PollerStats>> {
    thread::Builder::new().name(POLLER_THREAD_NAME.to_string()).spawn(move || {
        let stats = run(&ctx, prompt);
        info!(
            "breadcrumbs poller exited ({:?}): {} reported, {} prompts, last {}",
            stats.exit,
            stats.reported,
            stats.prompts,
            stats.last.unwrap_or(Breadcrumb::NONE)
        );
        stats
    })
}

fn run(ctx: &BreadcrumbsContext, mut prompt: Box<dyn BreakpointPrompt>) -> PollerStats {
    let mut stats = PollerStats::default();

    let socket = match UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)) {
        Ok(socket) => socket,
        Err(e) => {
            error!("breadcrumbs: error while creating socket: {e}");
            stats.exit = PollerExit::SocketFailed;
            return stats;
        }
    };

    let remote = ctx.config().remote;
    let seqnos = ctx.global().seqnos();
    let mut tracker = BreakpointTracker::new(ctx.breakpoint());
    let mut last_breadcrumb = Breadcrumb::NONE;

    while !ctx.is_stopping() {
        let current = Breadcrumb(seqnos.gpu_sync_seqno.load(Ordering::Acquire));

        if current == last_breadcrumb {
            thread::yield_now();
            continue;
        }
        last_breadcrumb = current;

        if let Err(e) = socket.send_to(&encode_breadcrumb(current.0), remote) {
            error!("breadcrumbs: sendto {remote} failed: {e}");
            stats.exit = PollerExit::SendFailed;
            break;
        }
        stats.reported += 1;
        debug!("breadcrumb {current} reported to {remote}");

        if tracker.observe(current) {
            stats.prompts += 1;
            if let Err(e) = prompt.confirm(current) {
                error!("breadcrumbs: breakpoint prompt failed at {current}: {e}");
                stats.exit = PollerExit::PromptFailed;
                break;
            }
        }

        // ack that we received the value
        seqnos.cpu_sync_seqno.store(current.0, Ordering::Release);
        stats.last = Some(current);
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::region::{GlobalBuffer, HostBuffer};

    #[test]
    fn test_poller_reports_and_acks() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = receiver.local_addr().unwrap().port();

        let global = Arc::new(HostBuffer::new());
        let config = format!("127.0.0.1:{port},break=-1:0").parse().unwrap();
        let ctx = Arc::new(BreadcrumbsContext::new(config, global.clone()));
        let handle = spawn(Arc::clone(&ctx), Box::new(StdinPrompt)).unwrap();

        // play the GPU side of one breadcrumb
        global.seqnos().gpu_sync_seqno.store(1, Ordering::Release);
        let mut buf = [0u8; 8];
        let len = receiver.recv(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[0, 0, 0, 1]);

        while global.cpu_seqno() != Breadcrumb(1) {
            thread::yield_now();
        }

        ctx.request_stop();
        let stats = handle.join().unwrap();
        assert_eq!(stats.reported, 1);
        assert_eq!(stats.prompts, 0);
        assert_eq!(stats.last, Some(Breadcrumb(1)));
        assert_eq!(stats.exit, PollerExit::Stopped);
    }
}
