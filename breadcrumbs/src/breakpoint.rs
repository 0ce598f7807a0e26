//! # Breakpoint Controller
//!
//! One configured breakpoint drives two decisions:
//!
//! - **Emission** (GPU side): sync bursts for breadcrumbs below the breakpoint
//!   are not emitted at all, so instrumentation only costs anything close to
//!   the suspected hang.
//! - **Interactive blocking** (host side): once the breakpoint breadcrumb has
//!   been observed `hits` times, every breadcrumb at or past it requires a
//!   human `y` before the GPU is released.
//!
//! Hits exist because the same recorded command stream can execute several
//! times (re-usable command buffers, one pass per GMEM tile), republishing the
//! same breadcrumb values each time.

use std::fmt;

use crate::domain::Breadcrumb;

/// Configured breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Breakpoint {
    /// Discovery run: instrument every breadcrumb, never prompt
    #[default]
    Disabled,
    /// Gate emission below `index`; prompt from `index` on after `hits` hits
    At { index: u32, hits: u32 },
}

impl Breakpoint {
    /// `u32::MAX` as index means no gate
    pub fn from_parts(index: u32, hits: u32) -> Self {
        match index {
            u32::MAX => Breakpoint::Disabled,
            index => Breakpoint::At { index, hits },
        }
    }

    /// Whether the sync burst for `breadcrumb` is suppressed on the GPU side
    pub fn suppresses(self, breadcrumb: Breadcrumb) -> bool {
        match self {
            Breakpoint::Disabled => false,
            Breakpoint::At { index, .. } => breadcrumb.0 < index,
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Breakpoint::Disabled => write!(f, "break=-1:0"),
            Breakpoint::At { index, hits } => write!(f, "break={index}:{hits}"),
        }
    }
}

/// Host-side breakpoint state, owned by the poller thread
#[derive(Debug, Clone)]
pub struct BreakpointTracker {
    breakpoint: Breakpoint,
    hits_seen: u32,
}

impl BreakpointTracker {
    pub fn new(breakpoint: Breakpoint) -> Self {
        Self { breakpoint, hits_seen: 0 }
    }

    /// Record a newly observed breadcrumb and decide whether to prompt
    ///
    /// The prompt decision is taken before the hit for this observation is
    /// counted, so with `hits = N` the first prompt fires on the observation
    /// following the N-th sighting of the breakpoint index.
    pub fn observe(&mut self, breadcrumb: Breadcrumb) -> bool {
        let Breakpoint::At { index, hits } = self.breakpoint else {
            return false;
        };

        let prompt = breadcrumb.0 >= index && self.hits_seen >= hits;

        if breadcrumb.0 == index {
            self.hits_seen = self.hits_seen.saturating_add(1);
        }

        prompt
    }

    pub fn hits_seen(&self) -> u32 {
        self.hits_seen
    }
}
