//! # Shared Rendezvous Region
//!
//! The two breadcrumb seqnos live inside the driver's device-global buffer,
//! which is mapped both into the GPU address space and into the host. The
//! driver owns the allocation; the tracer only needs the host view of
//! [`SyncSeqnos`] and the device address of each field.

use std::sync::atomic::Ordering;

use breadcrumbs_common::{SyncSeqnos, CPU_SYNC_SEQNO_OFFSET, GPU_SYNC_SEQNO_OFFSET};

use crate::domain::{Breadcrumb, Iova};

/// One of the two rendezvous fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqnoField {
    /// Published by the GPU (`CP_MEM_WRITE`)
    Gpu,
    /// Acknowledged by the host, polled by `CP_WAIT_REG_MEM`
    Cpu,
}

impl SeqnoField {
    /// Byte offset inside [`SyncSeqnos`]
    pub fn offset(self) -> u64 {
        match self {
            SeqnoField::Gpu => GPU_SYNC_SEQNO_OFFSET,
            SeqnoField::Cpu => CPU_SYNC_SEQNO_OFFSET,
        }
    }
}

/// Device-global buffer holding the rendezvous region
///
/// Implementations must keep the mapping alive and at a stable address for
/// as long as the value exists.
pub trait GlobalBuffer: Send + Sync {
    /// Host mapping of the rendezvous region
    fn seqnos(&self) -> &SyncSeqnos;

    /// Device address of the start of the buffer
    fn iova(&self) -> Iova;

    /// Byte offset of the rendezvous region inside the buffer
    fn seqnos_offset(&self) -> u64;

    /// Device address of one rendezvous field
    fn seqno_iova(&self, field: SeqnoField) -> Iova {
        self.iova().offset(self.seqnos_offset() + field.offset())
    }

    /// Zero both seqnos; only valid while no GPU work is in flight
    fn reset_seqnos(&self) {
        let seqnos = self.seqnos();
        seqnos.cpu_sync_seqno.store(0, Ordering::Release);
        seqnos.gpu_sync_seqno.store(0, Ordering::Release);
    }

    /// Last breadcrumb the GPU published
    fn gpu_seqno(&self) -> Breadcrumb {
        Breadcrumb(self.seqnos().gpu_sync_seqno.load(Ordering::Acquire))
    }

    /// Last breadcrumb the host acknowledged
    fn cpu_seqno(&self) -> Breadcrumb {
        Breadcrumb(self.seqnos().cpu_sync_seqno.load(Ordering::Acquire))
    }
}

/// Default device address of a [`HostBuffer`]
pub const DEFAULT_HOST_BUFFER_IOVA: Iova = Iova(0x1_0000_0000);

/// Global buffer backed by ordinary host memory
///
/// Stands in for the driver's global BO when the GPU is the software command
/// processor in [`crate::sim`]. The rendezvous region is placed after a small
/// header so field addresses are not trivially the buffer base.
#[derive(Debug)]
pub struct HostBuffer {
    iova: Iova,
    seqnos: Box<SyncSeqnos>,
}

impl HostBuffer {
    /// Offset of the rendezvous region, past a 64-byte header
    pub const SEQNOS_OFFSET: u64 = 64;

    pub fn new() -> Self {
        Self::at(DEFAULT_HOST_BUFFER_IOVA)
    }

    /// Place the buffer at a specific device address
    pub fn at(iova: Iova) -> Self {
        Self { iova, seqnos: Box::default() }
    }

    /// Resolve a device address to a rendezvous field
    pub fn field_at(&self, iova: Iova) -> Option<SeqnoField> {
        [SeqnoField::Gpu, SeqnoField::Cpu].into_iter().find(|&field| self.seqno_iova(field) == iova)
    }
}

impl Default for HostBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalBuffer for HostBuffer {
    fn seqnos(&self) -> &SyncSeqnos {
        &self.seqnos
    }

    fn iova(&self) -> Iova {
        self.iova
    }

    fn seqnos_offset(&self) -> u64 {
        Self::SEQNOS_OFFSET
    }
}
