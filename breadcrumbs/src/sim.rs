//! # Software Command Processor
//!
//! Executes PM4 type-7 streams against a [`HostBuffer`] so the handshake can
//! be exercised without hardware. This is **not** a GPU model: only the
//! packets the breadcrumb protocol depends on have behaviour.
//!
//! - `CP_MEM_WRITE` stores into the rendezvous region (anything else faults)
//! - `CP_WAIT_REG_MEM` polls memory until its condition holds, or reports a
//!   hang after the hangcheck period
//! - every other packet is skipped after being recorded in the trace

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use breadcrumbs_common::{
    decode_pkt7_header, Opcode, WaitFunction, MEM_WRITE_CNT, WAIT_REG_MEM_0_POLL_MEMORY,
    WAIT_REG_MEM_CNT,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, trace, warn};

use crate::domain::{Breadcrumb, GpuError, Iova};
use crate::region::{GlobalBuffer, HostBuffer, SeqnoField};

/// Default time a wait may spin before it is declared a hang
pub const DEFAULT_HANGCHECK: Duration = Duration::from_secs(10);

/// What a submission did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecTrace {
    /// Raw opcodes in execution order
    pub packets: Vec<u8>,
    /// Values stored to `gpu_sync_seqno`, in order
    pub published: Vec<Breadcrumb>,
}

impl ExecTrace {
    /// Packets matching `opcode`
    pub fn count(&self, opcode: Opcode) -> usize {
        self.packets.iter().filter(|&&raw| raw == opcode.raw()).count()
    }
}

pub struct SimGpu {
    global: Arc<HostBuffer>,
    hangcheck: Duration,
}

impl SimGpu {
    pub fn new(global: Arc<HostBuffer>) -> Self {
        Self { global, hangcheck: DEFAULT_HANGCHECK }
    }

    #[must_use]
    pub fn with_hangcheck(mut self, hangcheck: Duration) -> Self {
        self.hangcheck = hangcheck;
        self
    }

    /// Run one command stream to completion
    ///
    /// # Errors
    /// Malformed packets, accesses outside the rendezvous region, and waits
    /// that outlive the hangcheck period.
    pub fn execute(&self, words: &[u32]) -> Result<ExecTrace, GpuError> {
        let mut trace = ExecTrace::default();
        let mut offset = 0;

        while offset < words.len() {
            let header = words[offset];
            let (opcode, cnt) =
                decode_pkt7_header(header).ok_or(GpuError::InvalidHeader { header, offset })?;

            let start = offset + 1;
            let end = start + usize::from(cnt);
            if end > words.len() {
                return Err(GpuError::Truncated {
                    offset,
                    needed: usize::from(cnt),
                    available: words.len() - start,
                });
            }
            let payload = &words[start..end];

            let known = Opcode::from_raw(opcode);
            trace!(
                "dword {offset}: {} ({cnt} dwords)",
                known.map_or("unknown packet", Opcode::name)
            );

            match known {
                Some(Opcode::MemWrite) => {
                    check_payload(offset, payload, MEM_WRITE_CNT)?;
                    self.mem_write(payload, &mut trace)?;
                }
                Some(Opcode::WaitRegMem) => {
                    check_payload(offset, payload, WAIT_REG_MEM_CNT)?;
                    self.wait_reg_mem(payload)?;
                }
                _ => {}
            }

            trace.packets.push(opcode);
            offset = end;
        }

        Ok(trace)
    }

    /// Run on a dedicated thread, fed through a submission queue
    pub fn spawn(self) -> GpuQueue {
        let (submit_tx, submit_rx) = unbounded::<Submission>();
        let spawned = thread::Builder::new()
            .name("sim-gpu".to_string())
            .spawn(move || {
                for submission in submit_rx {
                    let result = self.execute(&submission.words);
                    match &result {
                        Ok(trace) => debug!(
                            "submission done: {} packets, {} breadcrumbs",
                            trace.packets.len(),
                            trace.published.len()
                        ),
                        Err(e) => warn!("submission faulted: {e}"),
                    }
                    // The submitter may have stopped waiting
                    let _ = submission.done.send(result);
                }
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("sim-gpu: failed to start thread: {e}");
                None
            }
        };

        GpuQueue { submit_tx: Some(submit_tx), thread }
    }

    /// `dst_lo, dst_hi, value...`
    fn mem_write(&self, payload: &[u32], trace: &mut ExecTrace) -> Result<(), GpuError> {
        let dst = Iova::from_dwords(payload[0], payload[1]);
        for (i, &value) in (0u64..).zip(&payload[2..]) {
            let iova = dst.offset(4 * i);
            let field = self.field(iova)?;
            self.word(field).store(value, Ordering::Release);
            if field == SeqnoField::Gpu {
                trace.published.push(Breadcrumb(value));
            }
        }
        Ok(())
    }

    /// `function|poll, addr_lo, addr_hi, ref, mask, delay`
    fn wait_reg_mem(&self, payload: &[u32]) -> Result<(), GpuError> {
        if payload[0] & WAIT_REG_MEM_0_POLL_MEMORY == 0 {
            return Err(GpuError::UnsupportedWait(payload[0]));
        }
        let function =
            WaitFunction::from_dword(payload[0]).ok_or(GpuError::UnsupportedWait(payload[0]))?;
        let iova = Iova::from_dwords(payload[1], payload[2]);
        let reference = payload[3];
        let mask = payload[4];

        let word = self.word(self.field(iova)?);
        let deadline = Instant::now() + self.hangcheck;

        while !function.holds(word.load(Ordering::Acquire) & mask, reference) {
            if Instant::now() >= deadline {
                return Err(GpuError::Hang {
                    iova,
                    reference,
                    last_published: self.global.gpu_seqno(),
                });
            }
            thread::yield_now();
        }
        Ok(())
    }

    fn field(&self, iova: Iova) -> Result<SeqnoField, GpuError> {
        self.global.field_at(iova).ok_or(GpuError::PageFault(iova))
    }

    fn word(&self, field: SeqnoField) -> &AtomicU32 {
        let seqnos = self.global.seqnos();
        match field {
            SeqnoField::Gpu => &seqnos.gpu_sync_seqno,
            SeqnoField::Cpu => &seqnos.cpu_sync_seqno,
        }
    }
}

fn check_payload(offset: usize, payload: &[u32], needed: u16) -> Result<(), GpuError> {
    if payload.len() < usize::from(needed) {
        return Err(GpuError::Truncated {
            offset,
            needed: usize::from(needed),
            available: payload.len(),
        });
    }
    Ok(())
}

struct Submission {
    words: Vec<u32>,
    done: Sender<Result<ExecTrace, GpuError>>,
}

/// Handle to a [`SimGpu`] running on its own thread
///
/// Submissions execute in order. Dropping the queue waits for queued work.
pub struct GpuQueue {
    submit_tx: Option<Sender<Submission>>,
    thread: Option<JoinHandle<()>>,
}

impl GpuQueue {
    /// Queue a command stream; the receiver yields its result once executed
    ///
    /// # Errors
    /// [`GpuError::QueueClosed`] if the GPU thread is gone.
    pub fn submit(
        &self,
        words: impl Into<Vec<u32>>,
    ) -> Result<Receiver<Result<ExecTrace, GpuError>>, GpuError> {
        let (done, fence) = bounded(1);
        let submit_tx = self.submit_tx.as_ref().ok_or(GpuError::QueueClosed)?;
        submit_tx
            .send(Submission { words: words.into(), done })
            .map_err(|_| GpuError::QueueClosed)?;
        Ok(fence)
    }

    /// Submit and wait for completion
    ///
    /// # Errors
    /// Whatever the execution reported, or [`GpuError::QueueClosed`].
    pub fn submit_and_wait(&self, words: impl Into<Vec<u32>>) -> Result<ExecTrace, GpuError> {
        self.submit(words)?.recv().map_err(|_| GpuError::QueueClosed)?
    }

    /// Close the queue and wait for the GPU thread to drain it
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.submit_tx = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("sim-gpu thread panicked");
            }
        }
    }
}

impl Drop for GpuQueue {
    fn drop(&mut self) {
        self.close();
    }
}
