//! Admin queue ring memory and the ATQ transport.

use log::trace;

use dma_pool::{AddressTranslate, DmaAllocator, DmaError, DmaMemory};

use super::desc::{AqDesc, AqFlags, AQ_DESC_LEN};
use super::{AQ_ALIGN, AQ_BUF_SIZE, AQ_LEN, ATQ_POLL_DELAY_US, ATQ_POLL_RETRIES};
use crate::error::{AvfError, Result, TimeoutKind};
use crate::hal::{RegisterIo, Timer};
use crate::regs::aq;
use crate::trace::Trace;

/// Both admin queue rings with their slot buffers.
pub struct AdminQueue {
    pub(crate) atq: DmaMemory,
    pub(crate) arq: DmaMemory,
    pub(crate) atq_bufs: DmaMemory,
    pub(crate) arq_bufs: DmaMemory,
    atq_bufs_pa: u64,
    arq_bufs_pa: u64,
    pub(crate) atq_next_slot: u16,
    pub(crate) arq_next_slot: u16,
    /// ATQ slots handed to hardware and not yet seen DD|CMP, one bit each.
    atq_in_flight: u64,
}

impl AdminQueue {
    /// Allocate ring and buffer memory. Nothing is programmed yet.
    pub fn alloc(dma: &dyn DmaAllocator) -> Result<Self> {
        let ring_len = AQ_DESC_LEN * AQ_LEN as usize;
        let bufs_len = AQ_BUF_SIZE * AQ_LEN as usize;

        let mut blocks: [Option<DmaMemory>; 4] = [None, None, None, None];
        let sizes = [ring_len, ring_len, bufs_len, bufs_len];
        for (slot, size) in blocks.iter_mut().zip(sizes) {
            match dma.alloc(size, AQ_ALIGN) {
                Ok(mem) => *slot = Some(mem),
                Err(e) => {
                    for mem in blocks.iter_mut().filter_map(Option::take) {
                        let _ = dma.free(mem);
                    }
                    return Err(e.into());
                }
            }
        }

        let [Some(atq), Some(arq), Some(atq_bufs), Some(arq_bufs)] = blocks else {
            return Err(DmaError::OutOfMemory.into());
        };
        Ok(Self {
            atq,
            arq,
            atq_bufs,
            arq_bufs,
            atq_bufs_pa: 0,
            arq_bufs_pa: 0,
            atq_next_slot: 0,
            arq_next_slot: 0,
            atq_in_flight: 0,
        })
    }

    /// Return all memory to the allocator.
    pub fn release(self, dma: &dyn DmaAllocator) {
        for mem in [self.atq, self.arq, self.atq_bufs, self.arq_bufs] {
            let _ = dma.free(mem);
        }
    }

    #[inline]
    pub fn atq_next_slot(&self) -> u16 {
        self.atq_next_slot
    }

    #[inline]
    pub fn arq_next_slot(&self) -> u16 {
        self.arq_next_slot
    }

    /// Zero both rings and program them into the device.
    ///
    /// Used at creation and again after a VF reset, which clears the
    /// hardware's copy of the admin queue registers.
    pub fn init(&mut self, regs: &dyn RegisterIo, xlate: &dyn AddressTranslate) -> Result<()> {
        let dma_addr = |mem: &DmaMemory| {
            xlate
                .dma_addr(mem.as_ptr())
                .ok_or(AvfError::from(DmaError::ForeignAddress))
        };

        // VF mailbox transmit
        self.atq.zero();
        self.atq_bufs_pa = dma_addr(&self.atq_bufs)?;
        let pa = dma_addr(&self.atq)?;
        regs.write(aq::ATQT, 0);
        regs.write(aq::ATQH, 0);
        regs.write(aq::ATQLEN, AQ_LEN as u32 | aq::LEN_ENABLE);
        regs.write(aq::ATQBAL, pa as u32);
        regs.write(aq::ATQBAH, (pa >> 32) as u32);

        // VF mailbox receive
        self.arq.zero();
        self.arq_bufs_pa = dma_addr(&self.arq_bufs)?;
        for slot in 0..AQ_LEN {
            self.arq_slot_init(slot);
        }
        let pa = dma_addr(&self.arq)?;
        regs.write(aq::ARQH, 0);
        regs.write(aq::ARQT, 0);
        regs.write(aq::ARQLEN, AQ_LEN as u32 | aq::LEN_ENABLE);
        regs.write(aq::ARQBAL, pa as u32);
        regs.write(aq::ARQBAH, (pa >> 32) as u32);
        regs.write(aq::ARQT, AQ_LEN as u32 - 1);

        self.atq_next_slot = 0;
        self.arq_next_slot = 0;
        self.atq_in_flight = 0;
        Ok(())
    }

    /// Hand ARQ slot `slot` back to hardware with an empty buffer.
    pub fn arq_slot_init(&mut self, slot: u16) {
        let mut d = AqDesc::default();
        d.flags = AqFlags::BUF;
        d.datalen = AQ_BUF_SIZE as u16;
        d.set_addr(self.arq_bufs_pa + slot as u64 * AQ_BUF_SIZE as u64);
        d.write_slot(&mut self.arq, slot);
    }

    /// Whether ATQ slot `slot` may be written by software.
    fn atq_slot_free(&mut self, slot: u16) -> bool {
        let bit = 1u64 << slot;
        if self.atq_in_flight & bit == 0 {
            return true;
        }
        if AqDesc::slot_flags(&self.atq, slot).is_done() {
            self.atq_in_flight &= !bit;
            return true;
        }
        false
    }

    /// Post `desc` on the ATQ and wait for the device to complete it.
    ///
    /// On return `desc` holds the descriptor as written back by hardware.
    ///
    /// # Errors
    /// - `PayloadTooLarge` before anything is written when `payload` exceeds
    ///   one slot buffer
    /// - `AdminQueueBusy` when the next slot still belongs to hardware
    /// - `Timeout` after [`ATQ_POLL_RETRIES`] checks without DD|CMP
    /// - `DeviceError` when hardware completed with ERR
    pub fn enqueue(
        &mut self,
        regs: &dyn RegisterIo,
        timer: &dyn Timer,
        trace: &Trace,
        desc: &mut AqDesc,
        payload: &[u8],
    ) -> Result<()> {
        if payload.len() > AQ_BUF_SIZE {
            return Err(AvfError::PayloadTooLarge { len: payload.len() });
        }

        let slot = self.atq_next_slot;
        if !self.atq_slot_free(slot) {
            return Err(AvfError::AdminQueueBusy { slot });
        }

        let mut d = *desc;
        d.flags |= AqFlags::RD | AqFlags::SI;
        if !payload.is_empty() {
            d.datalen = payload.len() as u16;
            d.set_addr(self.atq_bufs_pa + slot as u64 * AQ_BUF_SIZE as u64);
            d.flags |= AqFlags::BUF;
            self.atq_bufs
                .write_bytes(slot as usize * AQ_BUF_SIZE, payload);
            trace!("avf aq payload {:02x?}", payload);
        }
        d.write_slot(&mut self.atq, slot);
        let sent = d;

        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
        self.atq_in_flight |= 1u64 << slot;
        self.atq_next_slot = (slot + 1) % AQ_LEN;
        regs.write(aq::ATQT, self.atq_next_slot as u32);
        regs.flush();

        let mut done = false;
        for _ in 0..ATQ_POLL_RETRIES {
            timer.delay_us(ATQ_POLL_DELAY_US);
            if AqDesc::slot_flags(&self.atq, slot).is_done() {
                done = true;
                break;
            }
        }

        let back = AqDesc::read_slot(&self.atq, slot);
        trace.aq_enq(sent.flags, back.flags, sent.opcode, sent.datalen, back.retval);

        if !done {
            return Err(AvfError::Timeout {
                kind: TimeoutKind::AdminQueue,
                opcode: sent.opcode as u32,
            });
        }

        self.atq_in_flight &= !(1u64 << slot);
        *desc = back;
        if back.flags.contains(AqFlags::ERR) {
            return Err(AvfError::DeviceError {
                opcode: back.opcode as u32,
                retval: back.retval as i32,
            });
        }
        Ok(())
    }
}
