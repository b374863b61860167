//! DMA memory for bare-metal device drivers.
//!
//! This crate owns everything a NIC driver needs to hand memory to a device:
//!
//! - **Regions**: a caller-provided, device-visible memory window
//!   ([`MemoryRegion`]) carved up by a first-fit [`RegionAllocator`].
//! - **Handles**: [`DmaMemory`] couples the CPU pointer with the bus address
//!   and offers bounds-checked volatile accessors for descriptor rings.
//! - **Translation**: [`AddressTranslate`] turns a CPU pointer into the
//!   address the device must be given, either directly (IOVA) or through the
//!   region's physical mapping.
//! - **Packet buffers**: [`PacketPool`] hands out fixed-size buffers by index
//!   through the [`BufferAllocator`] interface.
//!
//! # Usage
//!
//! ```ignore
//! use dma_pool::{DmaAllocator, MemoryRegion, RegionAllocator};
//!
//! let dma = unsafe { RegionAllocator::new(MemoryRegion::new(base, size), bus_base)? };
//! let ring = dma.alloc(64 * 32, 64)?;
//! ```

#![no_std]
#![allow(dead_code)]

extern crate alloc;

use core::fmt;
use core::ptr::NonNull;

pub mod allocator;
pub mod packet;
pub mod translate;

pub use allocator::RegionAllocator;
pub use packet::{BufferAllocator, BufferIndex, BufferOwnership, PacketPool};
pub use translate::{AddressMode, AddressTranslate, IovaTranslate, RegionTranslate};

/// Page size (4KB).
pub const PAGE_SIZE: usize = 4096;

/// Maximum allocation tracking entries per region.
pub const MAX_ALLOCATIONS: usize = 128;

/// Minimum usable memory region size (64KB).
pub const MIN_REGION_SIZE: usize = 64 * 1024;

// ============================================================================
// Utility functions
// ============================================================================

/// Align a value up to the given alignment.
#[inline]
pub const fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Align a value down to the given alignment.
#[inline]
pub const fn align_down(val: usize, align: usize) -> usize {
    val & !(align - 1)
}

/// Convert pages to bytes.
#[inline]
pub const fn pages_to_bytes(pages: usize) -> usize {
    pages * PAGE_SIZE
}

/// Convert bytes to pages (rounded up).
#[inline]
pub const fn bytes_to_pages(bytes: usize) -> usize {
    align_up(bytes, PAGE_SIZE) / PAGE_SIZE
}

// ============================================================================
// Memory regions
// ============================================================================

/// A memory window usable for DMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    /// CPU-visible base address.
    pub base: usize,
    /// Size in bytes.
    pub size: usize,
}

impl MemoryRegion {
    /// Create a new memory region.
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Check if region is usable for DMA (page-aligned, large enough).
    pub fn is_usable(&self) -> bool {
        self.base != 0 && self.base % PAGE_SIZE == 0 && self.size >= MIN_REGION_SIZE
    }

    /// Get the page-aligned sub-region.
    pub fn aligned(&self) -> Self {
        let aligned_base = align_up(self.base, PAGE_SIZE);
        let adjustment = aligned_base - self.base;
        let aligned_size = align_down(self.size.saturating_sub(adjustment), PAGE_SIZE);
        Self {
            base: aligned_base,
            size: aligned_size,
        }
    }

    /// Check whether `[addr, addr + len)` lies inside the region.
    pub fn contains(&self, addr: usize, len: usize) -> bool {
        addr >= self.base
            && addr
                .checked_add(len)
                .map_or(false, |end| end <= self.base + self.size)
    }
}

// ============================================================================
// Error types
// ============================================================================

/// DMA pool errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    /// Requested 0 bytes.
    ZeroSize,
    /// Alignment is not a power of two.
    InvalidAlignment,
    /// Not enough memory in the region.
    OutOfMemory,
    /// Allocation table is full.
    TooManyAllocations,
    /// Invalid memory region.
    InvalidRegion,
    /// Freed memory was not handed out by this allocator.
    UnknownAllocation,
    /// Address lies outside every translatable region.
    ForeignAddress,
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroSize => write!(f, "zero-sized DMA allocation"),
            Self::InvalidAlignment => write!(f, "DMA alignment is not a power of two"),
            Self::OutOfMemory => write!(f, "DMA region exhausted"),
            Self::TooManyAllocations => write!(f, "DMA allocation table full"),
            Self::InvalidRegion => write!(f, "invalid DMA region"),
            Self::UnknownAllocation => write!(f, "memory was not allocated from this region"),
            Self::ForeignAddress => write!(f, "address outside DMA region"),
        }
    }
}

/// Result type for DMA operations.
pub type Result<T> = core::result::Result<T, DmaError>;

// ============================================================================
// DMA memory handle
// ============================================================================

/// A block of device-visible memory.
///
/// Contains both the CPU-accessible pointer and the bus address the memory
/// was allocated at. The handle owns the block until it is returned through
/// [`DmaAllocator::free`].
///
/// All accessors are volatile: the device may write the memory at any time.
pub struct DmaMemory {
    cpu: NonNull<u8>,
    bus: u64,
    size: usize,
}

impl DmaMemory {
    /// Wrap a raw block.
    ///
    /// # Safety
    /// - `cpu` must point to `size` bytes of valid memory for the lifetime of
    ///   the handle
    /// - `bus` must be the device-visible address of the same bytes
    pub unsafe fn from_raw(cpu: NonNull<u8>, bus: u64, size: usize) -> Self {
        Self { cpu, bus, size }
    }

    /// CPU pointer to the first byte.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.cpu.as_ptr()
    }

    /// Physical (bus) address of the first byte.
    #[inline]
    pub fn bus_addr(&self) -> u64 {
        self.bus
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    fn check(&self, offset: usize, len: usize, align: usize) {
        assert!(
            offset.checked_add(len).map_or(false, |end| end <= self.size),
            "DMA access out of bounds: offset {:#x} len {} size {:#x}",
            offset,
            len,
            self.size
        );
        assert!(offset % align == 0, "misaligned DMA access at {:#x}", offset);
    }

    /// Zero the whole block.
    pub fn zero(&mut self) {
        unsafe { core::ptr::write_bytes(self.cpu.as_ptr(), 0, self.size) };
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }

    /// Volatile 16-bit read.
    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        self.check(offset, 2, 2);
        unsafe { core::ptr::read_volatile(self.cpu.as_ptr().add(offset) as *const u16) }
    }

    /// Volatile 32-bit read.
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        self.check(offset, 4, 4);
        unsafe { core::ptr::read_volatile(self.cpu.as_ptr().add(offset) as *const u32) }
    }

    /// Volatile 64-bit read.
    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        self.check(offset, 8, 8);
        unsafe { core::ptr::read_volatile(self.cpu.as_ptr().add(offset) as *const u64) }
    }

    /// Volatile 16-bit write.
    #[inline]
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.check(offset, 2, 2);
        unsafe { core::ptr::write_volatile(self.cpu.as_ptr().add(offset) as *mut u16, value) }
    }

    /// Volatile 32-bit write.
    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.check(offset, 4, 4);
        unsafe { core::ptr::write_volatile(self.cpu.as_ptr().add(offset) as *mut u32, value) }
    }

    /// Volatile 64-bit write.
    #[inline]
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.check(offset, 8, 8);
        unsafe { core::ptr::write_volatile(self.cpu.as_ptr().add(offset) as *mut u64, value) }
    }

    /// Copy `data` into the block at `offset`.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        self.check(offset, data.len(), 1);
        unsafe {
            core::ptr::copy_nonoverlapping(
                data.as_ptr(),
                self.cpu.as_ptr().add(offset),
                data.len(),
            );
        }
    }

    /// Copy `out.len()` bytes starting at `offset` out of the block.
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        self.check(offset, out.len(), 1);
        unsafe {
            core::ptr::copy_nonoverlapping(
                self.cpu.as_ptr().add(offset),
                out.as_mut_ptr(),
                out.len(),
            );
        }
    }
}

impl fmt::Debug for DmaMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaMemory")
            .field("cpu", &self.cpu)
            .field("bus", &format_args!("{:#x}", self.bus))
            .field("size", &format_args!("{:#x}", self.size))
            .finish()
    }
}

// Safety: the handle is the unique owner of its block; concurrent device
// access is mediated by volatile accessors.
unsafe impl Send for DmaMemory {}
unsafe impl Sync for DmaMemory {}

/// Source of DMA memory.
pub trait DmaAllocator {
    /// Allocate `size` zeroed bytes aligned to `align`.
    fn alloc(&self, size: usize, align: usize) -> Result<DmaMemory>;

    /// Return a block obtained from [`DmaAllocator::alloc`].
    fn free(&self, mem: DmaMemory) -> Result<()>;
}

impl<T: DmaAllocator + ?Sized> DmaAllocator for alloc::sync::Arc<T> {
    fn alloc(&self, size: usize, align: usize) -> Result<DmaMemory> {
        (**self).alloc(size, align)
    }

    fn free(&self, mem: DmaMemory) -> Result<()> {
        (**self).free(mem)
    }
}

// ============================================================================
// Tests
// ============================================================================
