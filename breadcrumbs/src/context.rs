//! Per-device breadcrumbs context
//!
//! Shared between the command-building threads (emitter) and the poller
//! thread. Everything mutable in here is atomic; there are no locks on the
//! emission path.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::breakpoint::Breakpoint;
use crate::config::BreadcrumbsConfig;
use crate::domain::Breadcrumb;
use crate::region::GlobalBuffer;

pub struct BreadcrumbsContext {
    config: BreadcrumbsConfig,

    /// Polled by the poller every iteration; set once by finish
    thread_stop: AtomicBool,

    /// Last breadcrumb index handed out
    breadcrumb_idx: AtomicU32,

    /// The owning device's global buffer
    global: Arc<dyn GlobalBuffer>,
}

impl BreadcrumbsContext {
    pub fn new(config: BreadcrumbsConfig, global: Arc<dyn GlobalBuffer>) -> Self {
        Self {
            config,
            thread_stop: AtomicBool::new(false),
            breadcrumb_idx: AtomicU32::new(0),
            global,
        }
    }

    pub fn config(&self) -> &BreadcrumbsConfig {
        &self.config
    }

    pub fn breakpoint(&self) -> Breakpoint {
        self.config.breakpoint
    }

    pub fn global(&self) -> &dyn GlobalBuffer {
        self.global.as_ref()
    }

    /// Allocate the next breadcrumb index (1, 2, 3, ...)
    ///
    /// Concurrent callers always get distinct, contiguous values.
    pub fn next_breadcrumb(&self) -> Breadcrumb {
        Breadcrumb(self.breadcrumb_idx.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }

    /// Number of breadcrumb indices handed out so far
    pub fn breadcrumbs_allocated(&self) -> u32 {
        self.breadcrumb_idx.load(Ordering::Relaxed)
    }

    pub fn is_stopping(&self) -> bool {
        self.thread_stop.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.thread_stop.store(true, Ordering::Release);
    }
}

impl fmt::Debug for BreadcrumbsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreadcrumbsContext")
            .field("config", &self.config)
            .field("thread_stop", &self.thread_stop)
            .field("breadcrumb_idx", &self.breadcrumb_idx)
            .field("global_iova", &self.global.iova())
            .finish()
    }
}
