//! TX descriptor ring.
//!
//! One ring per hardware queue pair. Workers beyond the granted queue pair
//! count share a ring; a shared ring carries a lock that senders hold while
//! enqueueing.

use alloc::sync::Arc;
use alloc::vec::Vec;

use dma_pool::{BufferAllocator, BufferIndex, DmaAllocator, DmaMemory};
use spin::{Mutex, MutexGuard};

use super::{free_from_ring, DESC_ALIGN};
use crate::error::Result;
use crate::regs::queue::qtx_tail;

/// TX ring depth.
pub const TXQ_SIZE: u16 = 512;

/// Size of a single TX descriptor in bytes.
pub const TX_DESC_LEN: usize = 16;

pub struct TxQueue {
    qid: u16,
    size: u16,
    /// Next free descriptor.
    pub(crate) next: u16,
    descs: DmaMemory,
    pub(crate) bufs: Vec<BufferIndex>,
    /// Buffers in flight (ending just before `next`).
    pub(crate) n_bufs: u16,
    qtx_tail: u32,
    pub(crate) lock: Option<Arc<Mutex<()>>>,
}

impl TxQueue {
    /// Allocate an empty ring; no buffers are posted.
    pub fn init(qid: u16, dma: &dyn DmaAllocator) -> Result<Self> {
        let size = TXQ_SIZE;
        let mut descs = dma.alloc(size as usize * TX_DESC_LEN, DESC_ALIGN)?;
        descs.zero();
        Ok(Self {
            qid,
            size,
            next: 0,
            descs,
            bufs: alloc::vec![0; size as usize],
            n_bufs: 0,
            qtx_tail: qtx_tail(qid as u32),
            lock: None,
        })
    }

    /// Free the ring and return in-flight buffers, oldest first.
    pub fn release(self, dma: &dyn DmaAllocator, buffers: &mut dyn BufferAllocator) {
        let first = self.next.wrapping_sub(self.n_bufs) & (self.size - 1);
        free_from_ring(buffers, &self.bufs, first, self.size, self.n_bufs);
        let _ = dma.free(self.descs);
    }

    /// Take the sharing lock, if the ring is shared.
    pub fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.lock.as_ref().map(|l| l.lock())
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.lock.is_some()
    }

    /// The sharing lock itself.
    pub fn shared_lock(&self) -> Option<&Arc<Mutex<()>>> {
        self.lock.as_ref()
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
    pub fn qtx_tail(&self) -> u32 {
        self.qtx_tail
    }

    #[inline]
    pub fn descs(&self) -> &DmaMemory {
        &self.descs
    }
}
