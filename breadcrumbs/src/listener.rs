//! Remote observer side of the breadcrumb channel
//!
//! Collects the datagrams a poller sends and numbers repeated values. The
//! last entry is what to pass back as `break=INDEX:HITS` when a hang is being
//! narrowed down.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use breadcrumbs_common::decode_breadcrumb;
use serde::{Deserialize, Serialize};

use crate::breakpoint::Breakpoint;
use crate::domain::{Breadcrumb, ListenerError};

/// One received breadcrumb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub breadcrumb: u32,
    /// How many times this value was received before, so the first is 0
    pub occurrence: u32,
}

impl fmt::Display for TrailEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.breadcrumb, self.occurrence)
    }
}

impl TrailEntry {
    /// Breakpoint that stops a replay on exactly this entry
    pub fn breakpoint(&self) -> Breakpoint {
        Breakpoint::from_parts(self.breadcrumb, self.occurrence)
    }
}

#[derive(Debug, Serialize)]
struct TrailExport<'a> {
    breadcrumbs: &'a [TrailEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    last: Option<TrailEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_break: Option<String>,
    malformed: u64,
}

/// Ordered record of everything received
#[derive(Debug, Default)]
pub struct BreadcrumbTrail {
    entries: Vec<TrailEntry>,
    occurrences: HashMap<u32, u32>,
    malformed: u64,
}

impl BreadcrumbTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, breadcrumb: Breadcrumb) -> TrailEntry {
        let seen = self.occurrences.entry(breadcrumb.0).or_insert(0);
        let entry = TrailEntry { breadcrumb: breadcrumb.0, occurrence: *seen };
        *seen += 1;
        self.entries.push(entry);
        entry
    }

    /// Record a raw datagram; `None` (and a malformed count) unless it is
    /// exactly one big-endian u32
    pub fn record_datagram(&mut self, datagram: &[u8]) -> Option<TrailEntry> {
        if let Some(value) = decode_breadcrumb(datagram) {
            Some(self.record(Breadcrumb(value)))
        } else {
            self.malformed += 1;
            None
        }
    }

    pub fn entries(&self) -> &[TrailEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    pub fn last(&self) -> Option<TrailEntry> {
        self.entries.last().copied()
    }

    /// Breakpoint for the next run: stop where this one ended
    pub fn suggested_breakpoint(&self) -> Option<Breakpoint> {
        self.last().map(|entry| entry.breakpoint())
    }

    /// Write the trail as pretty JSON
    ///
    /// # Errors
    /// Serialization or I/O failure on `writer`.
    pub fn export<W: Write>(&self, writer: W) -> Result<(), ListenerError> {
        let export = TrailExport {
            breadcrumbs: &self.entries,
            last: self.last(),
            suggested_break: self.suggested_breakpoint().map(|b| b.to_string()),
            malformed: self.malformed,
        };
        serde_json::to_writer_pretty(writer, &export)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrences_count_from_zero() {
        let mut trail = BreadcrumbTrail::new();
        let lines: Vec<String> =
            [1, 2, 1, 2, 1].into_iter().map(|v| trail.record(Breadcrumb(v)).to_string()).collect();
        assert_eq!(lines, ["1:0", "2:0", "1:1", "2:1", "1:2"]);
    }

    #[test]
    fn test_malformed_datagrams_are_counted() {
        let mut trail = BreadcrumbTrail::new();
        assert_eq!(trail.record_datagram(&[0, 0, 1]), None);
        assert_eq!(trail.record_datagram(&[0, 0, 0, 1, 0]), None);
        let entry = trail.record_datagram(&[0, 0, 1, 0]).unwrap();
        assert_eq!(entry.breadcrumb, 256);
        assert_eq!(trail.malformed(), 2);
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn test_suggested_breakpoint() {
        let mut trail = BreadcrumbTrail::new();
        assert_eq!(trail.suggested_breakpoint(), None);

        for v in [5, 6, 5] {
            trail.record(Breadcrumb(v));
        }
        assert_eq!(trail.suggested_breakpoint(), Some(Breakpoint::At { index: 5, hits: 1 }));
    }
}
