//! Descriptor ring manager.
//!
//! Provisions the hardware RX/TX descriptor rings and the packet buffers
//! posted to them. Descriptor ↔ packet translation is not done here.

pub mod rx;
pub mod tx;

pub use rx::RxQueue;
pub use tx::TxQueue;

use dma_pool::{BufferAllocator, BufferIndex};

/// Descriptor ring alignment.
pub const DESC_ALIGN: usize = 128;

/// Return `n` buffers starting at ring index `first`, wrapping at `size`.
pub(crate) fn free_from_ring(
    buffers: &mut dyn BufferAllocator,
    ring: &[BufferIndex],
    first: u16,
    size: u16,
    n: u16,
) {
    if n == 0 || size == 0 {
        return;
    }
    let first = first as usize % size as usize;
    let n = (n as usize).min(size as usize);
    let head = n.min(size as usize - first);
    buffers.free(&ring[first..first + head]);
    if head < n {
        buffers.free(&ring[..n - head]);
    }
}
