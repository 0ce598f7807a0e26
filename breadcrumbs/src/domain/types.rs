//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent mixing up a breadcrumb index with a raw
//! command word or a byte offset with a device address.

use std::fmt;

/// Breadcrumb index
///
/// The i-th breadcrumb emitted by a context carries value `i`, starting at 1.
/// `0` only ever appears as the initial content of the rendezvous region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Breadcrumb(pub u32);

impl Breadcrumb {
    /// Value before any breadcrumb has been published
    pub const NONE: Breadcrumb = Breadcrumb(0);
}

impl fmt::Display for Breadcrumb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// GPU virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Iova(pub u64);

impl Iova {
    /// Address `bytes` past this one
    #[must_use]
    pub fn offset(self, bytes: u64) -> Iova {
        Iova(self.0 + bytes)
    }

    /// Low dword, as emitted first in a packet payload
    #[allow(clippy::cast_possible_truncation)]
    pub fn lo(self) -> u32 {
        self.0 as u32
    }

    /// High dword
    #[allow(clippy::cast_possible_truncation)]
    pub fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Reassemble from the two payload dwords
    pub fn from_dwords(lo: u32, hi: u32) -> Iova {
        Iova((u64::from(hi) << 32) | u64::from(lo))
    }
}

impl fmt::Display for Iova {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:010x}", self.0)
    }
}
