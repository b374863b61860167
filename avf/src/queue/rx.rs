//! RX descriptor ring.

use alloc::vec::Vec;

use dma_pool::{AddressTranslate, BufferAllocator, BufferIndex, DmaAllocator, DmaError, DmaMemory};

use super::{free_from_ring, DESC_ALIGN};
use crate::error::{AvfError, Resource, Result};
use crate::regs::queue::qrx_tail;

// ═══════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════

/// RX ring depth.
pub const RXQ_SIZE: u16 = 512;

/// Size of a single RX descriptor in bytes.
pub const RX_DESC_LEN: usize = 32;

/// Ring slots left without a buffer at init.
pub const RX_BUFFER_HEADROOM: u16 = 8;

// ═══════════════════════════════════════════════════════════════════════════
// RX QUEUE
// ═══════════════════════════════════════════════════════════════════════════

pub struct RxQueue {
    qid: u16,
    size: u16,
    /// Next descriptor to check for a received packet.
    pub(crate) next: u16,
    descs: DmaMemory,
    /// Buffer posted at each ring index.
    pub(crate) bufs: Vec<BufferIndex>,
    /// Buffers currently posted.
    pub(crate) n_bufs: u16,
    qrx_tail: u32,
    buffer_size: u32,
}

impl RxQueue {
    /// Allocate the ring and post `RXQ_SIZE - RX_BUFFER_HEADROOM` buffers.
    ///
    /// Qword 0 of each filled descriptor gets the buffer's DMA address. On
    /// failure everything obtained so far is returned.
    pub fn init(
        qid: u16,
        dma: &dyn DmaAllocator,
        buffers: &mut dyn BufferAllocator,
        xlate: &dyn AddressTranslate,
    ) -> Result<Self> {
        let size = RXQ_SIZE;
        let mut descs = dma.alloc(size as usize * RX_DESC_LEN, DESC_ALIGN)?;
        descs.zero();

        let mut bufs: Vec<BufferIndex> = alloc::vec![0; size as usize];
        let n_alloc = buffers.alloc(&mut bufs[..(size - RX_BUFFER_HEADROOM) as usize]);
        if n_alloc == 0 {
            let _ = dma.free(descs);
            return Err(AvfError::ResourceExhaustion(Resource::RxBuffers));
        }

        for (i, &b) in bufs[..n_alloc].iter().enumerate() {
            let addr = buffers
                .data_ptr(b)
                .and_then(|p| xlate.dma_addr(p));
            let Some(addr) = addr else {
                buffers.free(&bufs[..n_alloc]);
                let _ = dma.free(descs);
                return Err(DmaError::ForeignAddress.into());
            };
            descs.write_u64(i * RX_DESC_LEN, addr);
        }

        Ok(Self {
            qid,
            size,
            next: 0,
            descs,
            bufs,
            n_bufs: n_alloc as u16,
            qrx_tail: qrx_tail(qid as u32),
            buffer_size: buffers.buffer_size() as u32,
        })
    }

    /// Free the ring and return posted buffers, starting at `next`.
    pub fn release(self, dma: &dyn DmaAllocator, buffers: &mut dyn BufferAllocator) {
        free_from_ring(buffers, &self.bufs, self.next, self.size, self.n_bufs);
        let _ = dma.free(self.descs);
    }

    #[inline]
    pub fn qid(&self) -> u16 {
        self.qid
    }

    #[inline]
    pub fn size(&self) -> u16 {
        self.size
    }

    #[inline]
    pub fn n_bufs(&self) -> u16 {
        self.n_bufs
    }

    /// Tail register offset.
    #[inline]
    pub fn qrx_tail(&self) -> u32 {
        self.qrx_tail
    }

    #[inline]
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    #[inline]
    pub fn descs(&self) -> &DmaMemory {
        &self.descs
    }

    #[inline]
    pub fn bufs(&self) -> &[BufferIndex] {
        &self.bufs
    }
}
