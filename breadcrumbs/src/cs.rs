//! # Command Streams
//!
//! [`CommandStream`] is the capability set the emitter needs from a driver's
//! command-stream cursor. [`CommandBuffer`] is a reference cursor that also
//! implements the builder half of the protocol: it asks for a sync burst
//! before every packet and drops the deferred "after" burst once the packet's
//! dwords are all written.

use breadcrumbs_common::{pkt7_header, PKT7_MAX_CNT};

use crate::context::BreadcrumbsContext;
use crate::device::Device;
use crate::domain::Iova;
use crate::emitter::emit_sync_breadcrumb;
use crate::region::SeqnoField;

/// Allocation mode of a command stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsMode {
    /// Can be extended while building; the only mode breadcrumbs instrument
    Grow,
    /// Preallocated; a sync burst could overrun the remaining space
    Fixed,
}

/// Cursor over a GPU command stream being built
pub trait CommandStream {
    fn mode(&self) -> CsMode;

    /// Make room for `dwords` more words
    fn reserve(&mut self, dwords: usize);

    /// Write one word without breadcrumb bookkeeping
    fn emit_raw(&mut self, dword: u32);

    /// Dwords left before the deferred "after" burst is due (0 = none queued)
    fn breadcrumb_emit_after(&self) -> u16;

    fn set_breadcrumb_emit_after(&mut self, cnt: u16);

    /// Device address of a rendezvous field in the device's global buffer
    fn seqno_iova(&self, field: SeqnoField) -> Iova;

    /// Breadcrumbs context of the owning device, if tracing is enabled
    fn breadcrumbs(&self) -> Option<&BreadcrumbsContext>;

    /// Packet header encoding of the target GPU family
    fn pkt7_header(&self, opcode: u8, cnt: u16) -> u32 {
        pkt7_header(opcode, cnt)
    }

    /// Type-7 packet header with room reserved for its payload, uninstrumented
    fn emit_pkt7_raw(&mut self, opcode: u8, cnt: u16) {
        self.reserve(usize::from(cnt) + 1);
        let header = self.pkt7_header(opcode, cnt);
        self.emit_raw(header);
    }

    /// 64-bit value as two words, low first, uninstrumented
    fn emit_qw_raw(&mut self, value: u64) {
        let iova = Iova(value);
        self.emit_raw(iova.lo());
        self.emit_raw(iova.hi());
    }
}

/// Command buffer recorded for a [`Device`]
///
/// Borrowing the device ties the buffer's lifetime to it, so
/// [`Device::breadcrumbs_finish`] cannot run while a buffer is still being
/// built.
pub struct CommandBuffer<'d> {
    device: &'d Device,
    mode: CsMode,
    words: Vec<u32>,
    capacity: usize,
    breadcrumb_emit_after: u16,
}

impl<'d> CommandBuffer<'d> {
    pub fn growable(device: &'d Device) -> Self {
        Self {
            device,
            mode: CsMode::Grow,
            words: Vec::new(),
            capacity: usize::MAX,
            breadcrumb_emit_after: 0,
        }
    }

    /// Fixed-size buffer; writing past `capacity` dwords panics
    pub fn fixed(device: &'d Device, capacity: usize) -> Self {
        Self {
            device,
            mode: CsMode::Fixed,
            words: Vec::with_capacity(capacity),
            capacity,
            breadcrumb_emit_after: 0,
        }
    }

    /// Start a type-7 packet with `cnt` payload dwords
    ///
    /// The header plus payload are `cnt + 1` dwords; that is the countdown
    /// handed to the emitter for the "after" burst.
    pub fn emit_pkt7(&mut self, opcode: u8, cnt: u16) {
        emit_sync_breadcrumb(self, opcode, cnt.saturating_add(1));
        self.reserve(usize::from(cnt) + 1);
        let header = self.pkt7_header(opcode, cnt);
        self.emit(header);
    }

    /// Write one word, dropping the deferred "after" burst when it is due
    pub fn emit(&mut self, value: u32) {
        self.emit_raw(value);

        if self.breadcrumb_emit_after > 0 {
            self.breadcrumb_emit_after -= 1;
            if self.breadcrumb_emit_after == 0 {
                emit_sync_breadcrumb(self, 0, 0);
            }
        }
    }

    pub fn emit_qw(&mut self, value: u64) {
        let iova = Iova(value);
        self.emit(iova.lo());
        self.emit(iova.hi());
    }

    /// Packet with a fully known payload
    #[allow(clippy::cast_possible_truncation)]
    pub fn emit_packet(&mut self, opcode: u8, payload: &[u32]) {
        assert!(payload.len() <= usize::from(PKT7_MAX_CNT), "packet payload too large");
        self.emit_pkt7(opcode, payload.len() as u16);
        for &dword in payload {
            self.emit(dword);
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn into_words(self) -> Vec<u32> {
        self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl CommandStream for CommandBuffer<'_> {
    fn mode(&self) -> CsMode {
        self.mode
    }

    fn reserve(&mut self, dwords: usize) {
        match self.mode {
            CsMode::Grow => self.words.reserve(dwords),
            CsMode::Fixed => assert!(
                self.words.len() + dwords <= self.capacity,
                "fixed command stream overflow: {} + {dwords} > {}",
                self.words.len(),
                self.capacity
            ),
        }
    }

    fn emit_raw(&mut self, dword: u32) {
        debug_assert!(self.words.len() < self.capacity);
        self.words.push(dword);
    }

    fn breadcrumb_emit_after(&self) -> u16 {
        self.breadcrumb_emit_after
    }

    fn set_breadcrumb_emit_after(&mut self, cnt: u16) {
        self.breadcrumb_emit_after = cnt;
    }

    fn seqno_iova(&self, field: SeqnoField) -> Iova {
        self.device.global().seqno_iova(field)
    }

    fn breadcrumbs(&self) -> Option<&BreadcrumbsContext> {
        self.device.breadcrumbs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breadcrumbs_common::{decode_pkt7_header, Opcode};
    use std::sync::Arc;

    use crate::region::HostBuffer;

    #[test]
    fn test_uninstrumented_device_emits_plain_packets() {
        let device = Device::new(Arc::new(HostBuffer::new()));
        let mut cs = CommandBuffer::growable(&device);
        cs.emit_packet(Opcode::DrawIndx.raw(), &[1, 2, 3]);

        assert_eq!(cs.len(), 4);
        assert_eq!(decode_pkt7_header(cs.words()[0]), Some((Opcode::DrawIndx.raw(), 3)));
        assert_eq!(cs.breadcrumb_emit_after(), 0);
    }

    #[test]
    fn test_fixed_within_capacity() {
        let device = Device::new(Arc::new(HostBuffer::new()));
        let mut cs = CommandBuffer::fixed(&device, 2);
        cs.emit_pkt7(Opcode::Nop.raw(), 1);
        cs.emit(0xdead_beef);
        assert_eq!(cs.into_words().len(), 2);
    }

    #[test]
    #[should_panic(expected = "fixed command stream overflow")]
    fn test_fixed_overflow_panics() {
        let device = Device::new(Arc::new(HostBuffer::new()));
        let mut cs = CommandBuffer::fixed(&device, 2);
        cs.emit_pkt7(Opcode::Nop.raw(), 2);
    }

    #[test]
    fn test_emit_qw_order() {
        let device = Device::new(Arc::new(HostBuffer::new()));
        let mut cs = CommandBuffer::growable(&device);
        cs.emit_qw(0x0000_0001_2000_0040);
        assert_eq!(cs.words(), &[0x2000_0040, 0x1]);
    }
}
