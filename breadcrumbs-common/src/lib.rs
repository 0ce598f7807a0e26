//! # Shared Data Structures (GPU ↔ Host)
//!
//! Defines the data layout, packet encoding and wire format shared between the
//! GPU command stream and the host-side breadcrumb poller. Everything here is
//! `no_std` so it can be reused by firmware-side tooling and decoders.
//!
//! ## Key Types
//!
//! - [`SyncSeqnos`] - The two-seqno rendezvous region inside the global buffer
//! - [`Opcode`] - PM4 type-7 opcodes the tracer emits or filters on
//! - [`WaitFunction`] - Compare function of `CP_WAIT_REG_MEM`
//!
//! ## Handshake
//!
//! ```text
//!   GPU                                   Host poller
//!   ───                                   ───────────
//!   WAIT_MEM_WRITES / WAIT_FOR_IDLE / WAIT_FOR_ME
//!   MEM_WRITE gpu_sync_seqno = i   ──▶    sees i, sends UDP, (prompt)
//!   WAIT_REG_MEM cpu_sync_seqno == i ◀──  cpu_sync_seqno = i
//! ```

#![no_std]

use core::sync::atomic::AtomicU32;

// ============================================================================
// Rendezvous Region
// ============================================================================

/// Breadcrumb rendezvous region
///
/// Lives at a fixed offset inside the device-global buffer, mapped both to the
/// GPU and to the host.
///
/// **Memory Layout**: `#[repr(C)]`, two naturally aligned 32-bit words.
/// `AtomicU32` has the same in-memory representation as `u32`, so a host
/// mapping of the GPU buffer can be viewed as this struct.
#[repr(C)]
#[derive(Debug, Default)]
pub struct SyncSeqnos {
    /// Last breadcrumb published by the GPU (`CP_MEM_WRITE`)
    ///
    /// Written only by the GPU, read by the host poller.
    pub gpu_sync_seqno: AtomicU32,

    /// Last breadcrumb acknowledged by the host
    ///
    /// Written only by the host poller, polled by `CP_WAIT_REG_MEM`.
    /// Never exceeds `gpu_sync_seqno`.
    pub cpu_sync_seqno: AtomicU32,
}

/// Byte offset of `gpu_sync_seqno` within [`SyncSeqnos`]
pub const GPU_SYNC_SEQNO_OFFSET: u64 = core::mem::offset_of!(SyncSeqnos, gpu_sync_seqno) as u64;

/// Byte offset of `cpu_sync_seqno` within [`SyncSeqnos`]
pub const CPU_SYNC_SEQNO_OFFSET: u64 = core::mem::offset_of!(SyncSeqnos, cpu_sync_seqno) as u64;

/// Size of the rendezvous region in bytes
pub const SYNC_SEQNOS_SIZE: u64 = core::mem::size_of::<SyncSeqnos>() as u64;

// ============================================================================
// PM4 Type-7 Packets
// ============================================================================

/// Type-7 packet marker in bits 31:28
pub const CP_TYPE7_PKT: u32 = 0x7000_0000;

/// Largest payload a single type-7 packet can carry (15-bit count)
pub const PKT7_MAX_CNT: u16 = 0x7fff;

/// PM4 opcodes known to the tracer
///
/// Only the packets the sync burst is made of and the packets it brackets are
/// listed; anything else is carried around as a raw `u8`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Nop = 0x10,
    WaitMemWrites = 0x12,
    WaitForMe = 0x13,
    DrawIndx = 0x22,
    DrawAuto = 0x24,
    WaitForIdle = 0x26,
    DrawIndirect = 0x28,
    DrawIndxIndirect = 0x29,
    DrawIndirectMulti = 0x2a,
    Blit = 0x2c,
    LoadState6Geom = 0x32,
    ExecCs = 0x33,
    LoadState6Frag = 0x34,
    DrawIndxOffset = 0x38,
    WaitRegMem = 0x3c,
    MemWrite = 0x3d,
    ExecCsIndirect = 0x41,
    SetDrawState = 0x43,
}

impl Opcode {
    /// Map a raw 7-bit opcode to a known [`Opcode`]
    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0x10 => Self::Nop,
            0x12 => Self::WaitMemWrites,
            0x13 => Self::WaitForMe,
            0x22 => Self::DrawIndx,
            0x24 => Self::DrawAuto,
            0x26 => Self::WaitForIdle,
            0x28 => Self::DrawIndirect,
            0x29 => Self::DrawIndxIndirect,
            0x2a => Self::DrawIndirectMulti,
            0x2c => Self::Blit,
            0x32 => Self::LoadState6Geom,
            0x33 => Self::ExecCs,
            0x34 => Self::LoadState6Frag,
            0x38 => Self::DrawIndxOffset,
            0x3c => Self::WaitRegMem,
            0x3d => Self::MemWrite,
            0x41 => Self::ExecCsIndirect,
            0x43 => Self::SetDrawState,
            _ => return None,
        })
    }

    /// Raw opcode value
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Mnemonic as it appears in decoded command stream dumps
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Nop => "CP_NOP",
            Self::WaitMemWrites => "CP_WAIT_MEM_WRITES",
            Self::WaitForMe => "CP_WAIT_FOR_ME",
            Self::DrawIndx => "CP_DRAW_INDX",
            Self::DrawAuto => "CP_DRAW_AUTO",
            Self::WaitForIdle => "CP_WAIT_FOR_IDLE",
            Self::DrawIndirect => "CP_DRAW_INDIRECT",
            Self::DrawIndxIndirect => "CP_DRAW_INDX_INDIRECT",
            Self::DrawIndirectMulti => "CP_DRAW_INDIRECT_MULTI",
            Self::Blit => "CP_BLIT",
            Self::LoadState6Geom => "CP_LOAD_STATE6_GEOM",
            Self::ExecCs => "CP_EXEC_CS",
            Self::LoadState6Frag => "CP_LOAD_STATE6_FRAG",
            Self::DrawIndxOffset => "CP_DRAW_INDX_OFFSET",
            Self::WaitRegMem => "CP_WAIT_REG_MEM",
            Self::MemWrite => "CP_MEM_WRITE",
            Self::ExecCsIndirect => "CP_EXEC_CS_INDIRECT",
            Self::SetDrawState => "CP_SET_DRAW_STATE",
        }
    }
}

/// Odd parity bit: set when `val` has an even number of ones
#[must_use]
pub const fn odd_parity_bit(val: u32) -> u32 {
    (val.count_ones() & 1) ^ 1
}

/// Encode a PM4 type-7 packet header
///
/// Bits: `[31:28]` type 7, `[23]` opcode parity, `[22:16]` opcode,
/// `[15]` count parity, `[14:0]` payload dword count.
#[must_use]
pub const fn pkt7_header(opcode: u8, cnt: u16) -> u32 {
    let cnt = (cnt & PKT7_MAX_CNT) as u32;
    let opcode = (opcode & 0x7f) as u32;
    CP_TYPE7_PKT | cnt | (odd_parity_bit(cnt) << 15) | (opcode << 16) | (odd_parity_bit(opcode) << 23)
}

/// Decoded type-7 header: `(opcode, cnt)`
///
/// Returns `None` when the type nibble or either parity bit is wrong.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn decode_pkt7_header(header: u32) -> Option<(u8, u16)> {
    if header & 0xf000_0000 != CP_TYPE7_PKT {
        return None;
    }
    let cnt = header & 0x7fff;
    let opcode = (header >> 16) & 0x7f;
    if (header >> 15) & 1 != odd_parity_bit(cnt) || (header >> 23) & 1 != odd_parity_bit(opcode) {
        return None;
    }
    Some((opcode as u8, cnt as u16))
}

// ============================================================================
// CP_WAIT_REG_MEM fields
// ============================================================================

/// Compare function of `CP_WAIT_REG_MEM` (dword 0, bits 2:0)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitFunction {
    Always = 0,
    Lt = 1,
    Le = 2,
    Eq = 3,
    Ne = 4,
    Ge = 5,
    Gt = 6,
}

impl WaitFunction {
    /// Decode dword 0 of a `CP_WAIT_REG_MEM` packet
    #[must_use]
    pub const fn from_dword(dword: u32) -> Option<Self> {
        Some(match dword & 0x7 {
            0 => Self::Always,
            1 => Self::Lt,
            2 => Self::Le,
            3 => Self::Eq,
            4 => Self::Ne,
            5 => Self::Ge,
            6 => Self::Gt,
            _ => return None,
        })
    }

    /// Evaluate `value <op> reference`
    #[must_use]
    pub const fn holds(self, value: u32, reference: u32) -> bool {
        match self {
            Self::Always => true,
            Self::Lt => value < reference,
            Self::Le => value <= reference,
            Self::Eq => value == reference,
            Self::Ne => value != reference,
            Self::Ge => value >= reference,
            Self::Gt => value > reference,
        }
    }
}

/// `CP_WAIT_REG_MEM` dword 0: poll memory instead of a register
pub const WAIT_REG_MEM_0_POLL_MEMORY: u32 = 1 << 4;

/// `CP_WAIT_REG_MEM` dword 0 function field
#[must_use]
pub const fn wait_reg_mem_0_function(function: WaitFunction) -> u32 {
    function as u32 & 0x7
}

/// `CP_WAIT_REG_MEM` dword 5: delay between polls (bits 19:0)
#[must_use]
pub const fn wait_reg_mem_5_delay_loop_cycles(cycles: u32) -> u32 {
    cycles & 0xf_ffff
}

/// Payload dwords of a `CP_MEM_WRITE` carrying a single value
pub const MEM_WRITE_CNT: u16 = 3;

/// Payload dwords of a `CP_WAIT_REG_MEM`
pub const WAIT_REG_MEM_CNT: u16 = 6;

/// Delay loop used by the sync burst between polls of `cpu_sync_seqno`
pub const SYNC_DELAY_LOOP_CYCLES: u32 = 16;

// ============================================================================
// Wire Format
// ============================================================================

/// Size of one breadcrumb datagram
pub const BREADCRUMB_DATAGRAM_LEN: usize = 4;

/// Encode a breadcrumb as sent over UDP (big-endian, no framing)
#[must_use]
pub const fn encode_breadcrumb(value: u32) -> [u8; BREADCRUMB_DATAGRAM_LEN] {
    value.to_be_bytes()
}

/// Decode a breadcrumb datagram; anything but exactly 4 bytes is rejected
#[must_use]
pub fn decode_breadcrumb(datagram: &[u8]) -> Option<u32> {
    let bytes: [u8; BREADCRUMB_DATAGRAM_LEN] = datagram.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seqno_layout() {
        assert_eq!(GPU_SYNC_SEQNO_OFFSET, 0);
        assert_eq!(CPU_SYNC_SEQNO_OFFSET, 4);
        assert_eq!(SYNC_SEQNOS_SIZE, 8);
    }

    #[test]
    fn test_pkt7_header_known_values() {
        // CP_NOP with no payload: opcode 0x10 has odd parity, cnt 0 even
        assert_eq!(pkt7_header(Opcode::Nop.raw(), 0), 0x7010_8000);
        // CP_MEM_WRITE, 3 dwords: 0x3d has 5 ones, 3 has 2 ones
        assert_eq!(pkt7_header(Opcode::MemWrite.raw(), 3), 0x703d_8003);
    }

    #[test]
    fn test_decode_rejects_bad_parity() {
        let header = pkt7_header(Opcode::WaitRegMem.raw(), WAIT_REG_MEM_CNT);
        assert_eq!(decode_pkt7_header(header), Some((0x3c, 6)));
        assert_eq!(decode_pkt7_header(header ^ (1 << 15)), None);
        assert_eq!(decode_pkt7_header(0x4000_0000), None);
    }

    #[test]
    fn test_opcode_from_raw() {
        assert_eq!(Opcode::from_raw(0x22), Some(Opcode::DrawIndx));
        assert_eq!(Opcode::from_raw(0x7f), None);
        assert_eq!(Opcode::Blit.name(), "CP_BLIT");
    }

    #[test]
    fn test_wait_function() {
        let dword = wait_reg_mem_0_function(WaitFunction::Eq) | WAIT_REG_MEM_0_POLL_MEMORY;
        assert_eq!(WaitFunction::from_dword(dword), Some(WaitFunction::Eq));
        assert!(WaitFunction::Eq.holds(7, 7));
        assert!(!WaitFunction::Eq.holds(6, 7));
        assert!(WaitFunction::Ge.holds(8, 7));
        assert_eq!(WaitFunction::from_dword(7), None);
    }

    #[test]
    fn test_breadcrumb_wire_format() {
        assert_eq!(encode_breadcrumb(6), [0, 0, 0, 6]);
        assert_eq!(decode_breadcrumb(&[0, 0, 1, 0]), Some(256));
        assert_eq!(decode_breadcrumb(&[0, 0, 1]), None);
        assert_eq!(decode_breadcrumb(&[0, 0, 0, 1, 0]), None);
    }
}
