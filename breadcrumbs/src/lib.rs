//! # breadcrumbs - GPU Hang Localization by Synchronous Breadcrumbs
//!
//! Finds which GPU command hangs by making the GPU and a host thread
//! rendezvous around every command that issues work. Before (and after) each
//! such command the command stream publishes an increasing breadcrumb index
//! into host-visible memory and stalls until the host acknowledges it. A
//! poller thread forwards every index over UDP before acknowledging, so the
//! last datagram a remote listener receives before a hang brackets the
//! hanging command.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────┐        ┌───────────────────────────┐
//! │  Driver thread(s)          │        │  GPU                      │
//! │  CommandBuffer::emit_pkt7  │──cs───▶│  CP_MEM_WRITE  gpu_seqno  │
//! │   └─ emitter: sync burst   │        │  CP_WAIT_REG_MEM cpu_seqno│
//! └────────────────────────────┘        └─────────────┬─────────────┘
//!                                                     │ SyncSeqnos
//!                                                     ▼ (host-visible)
//! ┌────────────────────────────┐  UDP   ┌───────────────────────────┐
//! │  Listener (this binary)    │◀───────│  Poller thread            │
//! │  prints value:occurrence   │  u32be │  report, maybe prompt, ack│
//! └────────────────────────────┘        └───────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`region`]: the shared `gpu_sync_seqno`/`cpu_sync_seqno` pair and the
//!   [`region::GlobalBuffer`] holding it
//! - [`cs`]: the [`cs::CommandStream`] seam and the reference
//!   [`cs::CommandBuffer`]
//! - [`emitter`]: the sync burst and which opcodes get one
//! - [`context`]: per-device state shared by emitter and poller
//! - [`poller`]: the host thread that reports and acknowledges breadcrumbs
//! - [`breakpoint`]: emission gating and interactive blocking
//! - [`config`]: parsing `GPU_BREADCRUMBS`
//! - [`device`]: init/finish lifecycle
//! - [`sim`]: a software command processor for running streams without a GPU
//! - [`listener`] and [`cli`]: the remote observer
//!
//! ## Typical Usage
//!
//! ```bash
//! # Give the GPU enough time to wait on the host
//! echo -n 60000 > /sys/kernel/debug/dri/0/hangcheck_period_ms
//!
//! # Remote side
//! breadcrumbs --port 9999
//!
//! # Discovery run: every breadcrumb is reported, nothing blocks
//! GPU_BREADCRUMBS=10.0.0.2:9999,break=-1:0 ./app
//!
//! # Rerun with the last reported value; confirm each step with `y`
//! GPU_BREADCRUMBS=10.0.0.2:9999,break=1732:2 ./app
//! ```
//!
//! ## Caveats
//!
//! - The breadcrumb index is per device and never reset, so a replay only
//!   reproduces the same numbering if command streams are built in the same
//!   order. Multithreaded recording breaks that.
//! - Only growable command streams are instrumented.

pub mod breakpoint;
pub mod cli;
pub mod config;
pub mod context;
pub mod cs;
pub mod device;
pub mod domain;
pub mod emitter;
pub mod listener;
pub mod poller;
pub mod region;
pub mod sim;
