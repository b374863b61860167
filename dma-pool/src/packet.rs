//! Packet buffer pool.
//!
//! Fixed-size buffers carved from one DMA block, handed out by index. RX
//! rings post these indices; the driver never touches buffer contents.

use alloc::vec::Vec;

use crate::{DmaMemory, DmaError, Result};

/// Index of a buffer within its pool.
pub type BufferIndex = u32;

/// Buffer ownership state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOwnership {
    /// Available for allocation.
    Free,
    /// Handed out to a queue (posted to hardware or held by software).
    InUse,
}

/// Shared packet buffer allocator.
pub trait BufferAllocator {
    /// Fill `out` with up to `out.len()` buffers; returns how many were
    /// obtained.
    fn alloc(&mut self, out: &mut [BufferIndex]) -> usize;

    /// Return buffers to the pool.
    fn free(&mut self, bufs: &[BufferIndex]);

    /// CPU pointer to the data area of `idx`.
    fn data_ptr(&self, idx: BufferIndex) -> Option<*mut u8>;

    /// Data size of every buffer.
    fn buffer_size(&self) -> usize;
}

/// Pool of equally sized buffers backed by one DMA block.
pub struct PacketPool {
    mem: DmaMemory,
    buffer_size: usize,
    states: Vec<BufferOwnership>,
    /// Free list (indices of free buffers).
    free_list: Vec<BufferIndex>,
}

impl PacketPool {
    /// Split `mem` into `mem.len() / buffer_size` buffers.
    pub fn new(mem: DmaMemory, buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(DmaError::ZeroSize);
        }
        let count = mem.len() / buffer_size;
        if count == 0 {
            return Err(DmaError::OutOfMemory);
        }

        // Reverse order so the lowest index is handed out first.
        let free_list = (0..count as BufferIndex).rev().collect();
        Ok(Self {
            mem,
            buffer_size,
            states: alloc::vec![BufferOwnership::Free; count],
            free_list,
        })
    }

    /// Get number of available (free) buffers.
    pub fn available(&self) -> usize {
        self.free_list.len()
    }

    /// Get total number of buffers in pool.
    pub fn total(&self) -> usize {
        self.states.len()
    }

    /// Get number of buffers currently in use.
    pub fn in_use(&self) -> usize {
        self.total() - self.available()
    }

    pub fn state(&self, idx: BufferIndex) -> Option<BufferOwnership> {
        self.states.get(idx as usize).copied()
    }

    /// Give the backing block back, e.g. to free it.
    pub fn into_memory(self) -> DmaMemory {
        self.mem
    }
}

impl BufferAllocator for PacketPool {
    fn alloc(&mut self, out: &mut [BufferIndex]) -> usize {
        let mut n = 0;
        for slot in out.iter_mut() {
            let Some(idx) = self.free_list.pop() else {
                break;
            };
            debug_assert_eq!(self.states[idx as usize], BufferOwnership::Free);
            self.states[idx as usize] = BufferOwnership::InUse;
            *slot = idx;
            n += 1;
        }
        n
    }

    fn free(&mut self, bufs: &[BufferIndex]) {
        for &idx in bufs {
            match self.states.get_mut(idx as usize) {
                Some(state @ BufferOwnership::InUse) => {
                    *state = BufferOwnership::Free;
                    self.free_list.push(idx);
                }
                // Double free or foreign index: ignore.
                _ => {}
            }
        }
    }

    fn data_ptr(&self, idx: BufferIndex) -> Option<*mut u8> {
        if (idx as usize) >= self.states.len() {
            return None;
        }
        // SAFETY: idx < count, so the offset is inside the block
        Some(unsafe { self.mem.as_ptr().add(idx as usize * self.buffer_size) })
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}
