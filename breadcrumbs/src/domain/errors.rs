//! Structured error types for breadcrumbs
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{Breadcrumb, Iova};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("expected HOST:PORT,break=INDEX:HITS, got {0:?}")]
    Malformed(String),

    #[error("host {0:?} is not an IPv4 address")]
    InvalidHost(String),

    #[error("host {0:?} is longer than 63 characters")]
    HostTooLong(String),

    #[error("port {0:?} is not in 1..=65535")]
    InvalidPort(String),

    #[error("breakpoint index {0:?} is not a u32 or -1")]
    InvalidBreakpoint(String),

    #[error("breakpoint hits {0:?} is not a u32")]
    InvalidHits(String),
}

/// Faults raised by the software command processor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("invalid packet header 0x{header:08x} at dword {offset}")]
    InvalidHeader { header: u32, offset: usize },

    #[error("packet at dword {offset} needs {needed} payload dwords, {available} left")]
    Truncated { offset: usize, needed: usize, available: usize },

    #[error("page fault at {0}")]
    PageFault(Iova),

    #[error("unsupported CP_WAIT_REG_MEM dword0 0x{0:08x}")]
    UnsupportedWait(u32),

    #[error("GPU hang: waiting on {iova} for {reference} (last published {last_published})")]
    Hang { iova: Iova, reference: u32, last_published: Breadcrumb },

    #[error("GPU queue is closed")]
    QueueClosed,
}

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind {addr}: {source}")]
    BindFailed { addr: String, source: std::io::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
