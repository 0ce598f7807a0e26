//! # Command Emitter
//!
//! Inserts a sync burst around GPU commands that issue work:
//!
//! ```text
//! CP_WAIT_MEM_WRITES
//! CP_WAIT_FOR_IDLE
//! CP_WAIT_FOR_ME
//! CP_MEM_WRITE     gpu_sync_seqno = i
//! CP_WAIT_REG_MEM  cpu_sync_seqno == i   (poll memory, delay 16)
//! ```
//!
//! The three waits make any store or fault of an earlier command observable
//! before `i` is published, so the last breadcrumb the host reports before a
//! hang brackets the hanging command.

use breadcrumbs_common::{
    wait_reg_mem_0_function, wait_reg_mem_5_delay_loop_cycles, Opcode, WaitFunction,
    MEM_WRITE_CNT, SYNC_DELAY_LOOP_CYCLES, WAIT_REG_MEM_0_POLL_MEMORY, WAIT_REG_MEM_CNT,
};
use log::trace;

use crate::cs::{CommandStream, CsMode};
use crate::domain::Breadcrumb;
use crate::region::SeqnoField;

/// Commands that issue GPU work and therefore get a "before" burst
pub fn brackets(opcode: Opcode) -> bool {
    match opcode {
        Opcode::ExecCsIndirect
        | Opcode::ExecCs
        | Opcode::DrawIndx
        | Opcode::DrawIndxOffset
        | Opcode::DrawIndirect
        | Opcode::DrawIndxIndirect
        | Opcode::DrawIndirectMulti
        | Opcode::DrawAuto
        | Opcode::Blit => true,
        // State loads and draw-state groups stay unbracketed:
        // Opcode::SetDrawState | Opcode::LoadState6Frag | Opcode::LoadState6Geom
        _ => false,
    }
}

/// Emit a sync breadcrumb before or after a packet
///
/// `cnt != 0`: the caller is about to emit `opcode`; if it issues work, a
/// burst is emitted now and `cnt` is stored in the stream's
/// `breadcrumb_emit_after` slot so the builder calls back with `cnt == 0`
/// once those `cnt` dwords are written.
///
/// `cnt == 0`: the deferred "after" burst; `opcode` is ignored.
///
/// No-op on fixed-size streams, without a breadcrumbs context, or once the
/// poller is stopping.
pub fn emit_sync_breadcrumb<C: CommandStream + ?Sized>(cs: &mut C, opcode: u8, cnt: u16) {
    // TODO: fixed-size streams would need the burst accounted for in their
    // up-front size estimate before they can be instrumented.
    if cs.mode() != CsMode::Grow {
        return;
    }

    let Some(ctx) = cs.breadcrumbs() else {
        return;
    };
    if ctx.is_stopping() {
        return;
    }

    let before_packet = cnt != 0;

    if before_packet {
        if !Opcode::from_raw(opcode).is_some_and(brackets) {
            return;
        }
    } else {
        debug_assert_eq!(cs.breadcrumb_emit_after(), 0, "after burst requested twice");
    }

    let breadcrumb = ctx.next_breadcrumb();

    if ctx.breakpoint().suppresses(breadcrumb) {
        return;
    }

    if before_packet {
        let name = Opcode::from_raw(opcode).map_or("?", Opcode::name);
        trace!("breadcrumb {breadcrumb} before {name}");
    } else {
        trace!("breadcrumb {breadcrumb} after previous packet");
    }

    emit_sync_burst(cs, breadcrumb);

    if before_packet {
        cs.set_breadcrumb_emit_after(cnt);
    }
}

/// The five packets publishing `breadcrumb` and waiting for the host ack
fn emit_sync_burst<C: CommandStream + ?Sized>(cs: &mut C, breadcrumb: Breadcrumb) {
    cs.emit_pkt7_raw(Opcode::WaitMemWrites.raw(), 0);
    cs.emit_pkt7_raw(Opcode::WaitForIdle.raw(), 0);
    cs.emit_pkt7_raw(Opcode::WaitForMe.raw(), 0);

    let gpu_seqno = cs.seqno_iova(SeqnoField::Gpu);
    cs.emit_pkt7_raw(Opcode::MemWrite.raw(), MEM_WRITE_CNT);
    cs.emit_qw_raw(gpu_seqno.0);
    cs.emit_raw(breadcrumb.0);

    // Wait until the host acknowledges the value written above
    let cpu_seqno = cs.seqno_iova(SeqnoField::Cpu);
    cs.emit_pkt7_raw(Opcode::WaitRegMem.raw(), WAIT_REG_MEM_CNT);
    cs.emit_raw(wait_reg_mem_0_function(WaitFunction::Eq) | WAIT_REG_MEM_0_POLL_MEMORY);
    cs.emit_qw_raw(cpu_seqno.0);
    cs.emit_raw(breadcrumb.0);
    cs.emit_raw(!0);
    cs.emit_raw(wait_reg_mem_5_delay_loop_cycles(SYNC_DELAY_LOOP_CYCLES));
}

/// Dwords one sync burst occupies
pub const SYNC_BURST_DWORDS: usize =
    3 + (1 + MEM_WRITE_CNT as usize) + (1 + WAIT_REG_MEM_CNT as usize);
