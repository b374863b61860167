//! Virtchnl request/response over the admin queue.
//!
//! A request goes out on the ATQ; the PF answers on the ARQ. Unsolicited
//! PF events can land on the ARQ ahead of the answer and are queued for the
//! process loop without costing the caller any retry budget.

use alloc::vec::Vec;

use log::warn;

use super::desc::{AqDesc, AqFlags};
use super::ring::AdminQueue;
use super::{AQ_BUF_SIZE, AQ_LEN, PF_POLL_DELAY_MS, PF_POLL_RETRIES};
use crate::error::{AvfError, Mismatch, Result, TimeoutKind};
use crate::hal::{RegisterIo, Timer};
use crate::regs::aq;
use crate::trace::Trace;
use crate::virtchnl::msg::PF_EVENT_LEN;
use crate::virtchnl::{PfEvent, VirtchnlOp, AQ_OP_SEND_TO_PF};

/// ARQH head field.
const ARQH_MASK: u32 = 0x3ff;

impl AdminQueue {
    /// Re-arm the ARQ slot at the cursor, give it back to hardware and move on.
    fn arq_consume(&mut self, regs: &dyn RegisterIo) {
        let slot = self.arq_next_slot;
        self.arq_slot_init(slot);
        regs.write(aq::ARQT, slot as u32);
        regs.flush();
        self.arq_next_slot = (slot + 1) % AQ_LEN;
    }

    /// Send `op` with `req` to the PF and wait for its answer.
    ///
    /// Copies at most `out.len()` bytes of the answer into `out` and returns
    /// the number copied. PF events seen while waiting are appended to
    /// `events`.
    ///
    /// # Errors
    /// - `PayloadTooLarge` before the ARQ slot is touched when `req`
    ///   exceeds one buffer
    /// - anything [`AdminQueue::enqueue`] returns
    /// - `Timeout` after [`PF_POLL_RETRIES`] head checks without an answer
    /// - `ProtocolMismatch` for a malformed event or an answer to another op
    /// - `DeviceError` when the PF answers with a nonzero return code
    #[allow(clippy::too_many_arguments)]
    pub fn send_to_pf(
        &mut self,
        regs: &dyn RegisterIo,
        timer: &dyn Timer,
        trace: &Trace,
        op: VirtchnlOp,
        req: &[u8],
        out: &mut [u8],
        events: &mut Vec<PfEvent>,
    ) -> Result<usize> {
        if req.len() > AQ_BUF_SIZE {
            return Err(AvfError::PayloadTooLarge { len: req.len() });
        }

        // Only events should interrupt; the answer we poll for.
        let slot = self.arq_next_slot;
        let flags = AqDesc::slot_flags(&self.arq, slot);
        AqDesc::set_slot_flags(&mut self.arq, slot, flags | AqFlags::SI);

        let mut d = AqDesc::new(AQ_OP_SEND_TO_PF);
        d.v_opcode = op.as_u32();
        self.enqueue(regs, timer, trace, &mut d, req)?;

        let result = self.wait_for_pf(regs, timer, op, out, events);
        let v_retval = match &result {
            Err(AvfError::DeviceError { retval, .. }) => *retval,
            _ => 0,
        };
        trace.send_to_pf(op, v_retval);
        result
    }

    fn wait_for_pf(
        &mut self,
        regs: &dyn RegisterIo,
        timer: &dyn Timer,
        op: VirtchnlOp,
        out: &mut [u8],
        events: &mut Vec<PfEvent>,
    ) -> Result<usize> {
        let mut n_retry = PF_POLL_RETRIES;
        loop {
            let head = regs.read(aq::ARQH) & ARQH_MASK;
            if self.arq_next_slot as u32 == head {
                n_retry -= 1;
                if n_retry == 0 {
                    return Err(AvfError::Timeout {
                        kind: TimeoutKind::PfResponse,
                        opcode: op.as_u32(),
                    });
                }
                timer.delay_ms(PF_POLL_DELAY_MS);
                continue;
            }

            let slot = self.arq_next_slot;
            let d = AqDesc::read_slot(&self.arq, slot);
            let buf_off = slot as usize * AQ_BUF_SIZE;

            if d.v_opcode == VirtchnlOp::Event.as_u32() {
                if d.datalen as usize != PF_EVENT_LEN || !d.flags.contains(AqFlags::BUF) {
                    self.arq_consume(regs);
                    return Err(AvfError::ProtocolMismatch(Mismatch::EventMessage {
                        datalen: d.datalen,
                    }));
                }
                let mut raw = [0u8; PF_EVENT_LEN];
                self.arq_bufs.read_bytes(buf_off, &mut raw);
                if let Some(e) = PfEvent::decode(&raw) {
                    events.push(e);
                }
                self.arq_consume(regs);
                n_retry = PF_POLL_RETRIES;
                continue;
            }

            if d.v_opcode != op.as_u32() {
                warn!(
                    "avf: unexpected message on arq slot {} [v_opcode {} expected {:?}]",
                    slot, d.v_opcode, op
                );
                self.arq_consume(regs);
                return Err(AvfError::ProtocolMismatch(Mismatch::Opcode {
                    received: d.v_opcode,
                    expected: op,
                }));
            }

            if d.v_retval != 0 {
                self.arq_consume(regs);
                return Err(AvfError::DeviceError {
                    opcode: op.as_u32(),
                    retval: d.v_retval,
                });
            }

            let mut n = 0;
            if d.flags.contains(AqFlags::BUF) {
                n = (d.datalen as usize).min(out.len()).min(AQ_BUF_SIZE);
                self.arq_bufs.read_bytes(buf_off, &mut out[..n]);
            }
            self.arq_consume(regs);
            return Ok(n);
        }
    }
}
