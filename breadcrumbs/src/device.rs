//! # Lifecycle Controller
//!
//! The device owns the breadcrumbs context. Init attaches one (and starts the
//! poller) only when configuration is present and valid; otherwise the device
//! stays uninstrumented and every breadcrumb entry point is a no-op.

use std::sync::Arc;
use std::thread::JoinHandle;

use log::{error, info, warn};

use crate::config::{BreadcrumbsConfig, CONFIG_ENV};
use crate::context::BreadcrumbsContext;
use crate::poller::{self, BreakpointPrompt, PollerStats, StdinPrompt};
use crate::region::GlobalBuffer;

/// The slice of a GPU device the tracer hangs off
pub struct Device {
    global: Arc<dyn GlobalBuffer>,
    breadcrumbs: Option<Arc<BreadcrumbsContext>>,
    poller: Option<JoinHandle<PollerStats>>,
}

impl Device {
    /// Uninstrumented device around its global buffer
    pub fn new(global: Arc<dyn GlobalBuffer>) -> Self {
        Self { global, breadcrumbs: None, poller: None }
    }

    pub fn global(&self) -> &dyn GlobalBuffer {
        self.global.as_ref()
    }

    /// Breadcrumbs context, if tracing is enabled
    pub fn breadcrumbs(&self) -> Option<&BreadcrumbsContext> {
        self.breadcrumbs.as_deref()
    }

    /// Weak handle to the context, for checking it was released
    pub fn breadcrumbs_weak(&self) -> Option<std::sync::Weak<BreadcrumbsContext>> {
        self.breadcrumbs.as_ref().map(Arc::downgrade)
    }

    /// Enable tracing from the environment, prompting on stdin
    pub fn breadcrumbs_init(&mut self) {
        let option = std::env::var(CONFIG_ENV).ok();
        self.breadcrumbs_init_with(option.as_deref(), StdinPrompt);
    }

    /// Enable tracing from an explicit option string
    ///
    /// `None` leaves the device uninstrumented. A malformed option is logged
    /// and also leaves the device uninstrumented.
    pub fn breadcrumbs_init_with(
        &mut self,
        option: Option<&str>,
        prompt: impl BreakpointPrompt + 'static,
    ) {
        if self.breadcrumbs.is_some() {
            warn!("breadcrumbs already initialized, ignoring");
            return;
        }

        let Some(option) = option else {
            return;
        };

        let config: BreadcrumbsConfig = match option.parse() {
            Ok(config) => config,
            Err(e) => {
                error!("Wrong {CONFIG_ENV} value: {e}");
                return;
            }
        };

        self.global.reset_seqnos();

        let ctx = Arc::new(BreadcrumbsContext::new(config, Arc::clone(&self.global)));
        match poller::spawn(Arc::clone(&ctx), Box::new(prompt)) {
            Ok(handle) => {
                info!("breadcrumbs enabled: {config}");
                self.breadcrumbs = Some(ctx);
                self.poller = Some(handle);
            }
            Err(e) => error!("breadcrumbs: failed to start poller thread: {e}"),
        }
    }

    /// Stop the poller and release the context
    ///
    /// No GPU work may be in flight. Returns the poller's counters the first
    /// time it is called on an instrumented device, `None` otherwise.
    pub fn breadcrumbs_finish(&mut self) -> Option<PollerStats> {
        let ctx = self.breadcrumbs.as_ref()?;
        if ctx.is_stopping() {
            return None;
        }

        ctx.request_stop();
        let stats = self.poller.take().and_then(|handle| match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                error!("breadcrumbs poller thread panicked");
                None
            }
        });

        self.breadcrumbs = None;
        stats
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.breadcrumbs_finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::HostBuffer;

    #[test]
    fn test_no_option_leaves_device_uninstrumented() {
        let mut device = Device::new(Arc::new(HostBuffer::new()));
        device.breadcrumbs_init_with(None, StdinPrompt);
        assert!(device.breadcrumbs().is_none());
        assert!(device.breadcrumbs_finish().is_none());
    }

    #[test]
    fn test_malformed_option_leaves_device_uninstrumented() {
        let mut device = Device::new(Arc::new(HostBuffer::new()));
        device.breadcrumbs_init_with(Some("127.0.0.1,break=1:1"), StdinPrompt);
        assert!(device.breadcrumbs().is_none());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut device = Device::new(Arc::new(HostBuffer::new()));
        device.breadcrumbs_init_with(Some("127.0.0.1:9,break=-1:0"), StdinPrompt);
        assert!(device.breadcrumbs().is_some());

        let weak = device.breadcrumbs_weak().unwrap();
        let stats = device.breadcrumbs_finish().unwrap();
        assert_eq!(stats.reported, 0);
        assert!(weak.upgrade().is_none());

        assert!(device.breadcrumbs_finish().is_none());
    }
}
