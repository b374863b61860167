//! First-fit DMA region allocator.
//!
//! Carves aligned blocks out of one [`MemoryRegion`]. Live blocks are kept in
//! a fixed table sorted by offset; allocation walks the gaps between them.

use core::ptr::NonNull;

use spin::Mutex;

use crate::translate::RegionTranslate;
use crate::{
    align_up, DmaAllocator, DmaError, DmaMemory, MemoryRegion, Result, MAX_ALLOCATIONS,
};

/// Allocation tracking entry.
#[derive(Clone, Copy)]
struct Allocation {
    offset: usize,
    size: usize,
}

impl Allocation {
    const fn empty() -> Self {
        Self { offset: 0, size: 0 }
    }

    #[inline]
    fn end(&self) -> usize {
        self.offset + self.size
    }
}

struct Table {
    entries: [Allocation; MAX_ALLOCATIONS],
    count: usize,
}

impl Table {
    const fn new() -> Self {
        Self {
            entries: [Allocation::empty(); MAX_ALLOCATIONS],
            count: 0,
        }
    }

    fn live(&self) -> &[Allocation] {
        &self.entries[..self.count]
    }

    /// Find the lowest offset where `size` bytes at `align` fit.
    fn find_gap(&self, base: usize, limit: usize, size: usize, align: usize) -> Option<(usize, usize)> {
        let mut cursor = 0usize;
        for (slot, entry) in self.live().iter().enumerate() {
            let start = align_up(base + cursor, align) - base;
            if start + size <= entry.offset {
                return Some((slot, start));
            }
            cursor = entry.end();
        }
        let start = align_up(base + cursor, align) - base;
        if start.checked_add(size)? <= limit {
            Some((self.count, start))
        } else {
            None
        }
    }

    fn insert(&mut self, slot: usize, entry: Allocation) {
        self.entries.copy_within(slot..self.count, slot + 1);
        self.entries[slot] = entry;
        self.count += 1;
    }

    fn remove(&mut self, offset: usize, size: usize) -> Result<()> {
        let slot = self
            .live()
            .iter()
            .position(|a| a.offset == offset && a.size == size)
            .ok_or(DmaError::UnknownAllocation)?;
        self.entries.copy_within(slot + 1..self.count, slot);
        self.count -= 1;
        Ok(())
    }
}

/// DMA allocator over a single device-visible region.
///
/// The region is mapped at `bus_base` on the bus side; every block handed
/// out carries `bus_base + offset` as its bus address.
pub struct RegionAllocator {
    region: MemoryRegion,
    bus_base: u64,
    table: Mutex<Table>,
}

impl RegionAllocator {
    /// Create an allocator over `region`.
    ///
    /// # Safety
    /// - `region` must be valid, writable memory owned exclusively by the
    ///   allocator for its whole lifetime
    /// - `bus_base` must be the device-visible address of `region.base`
    pub unsafe fn new(region: MemoryRegion, bus_base: u64) -> Result<Self> {
        if region.base == 0 || region.size == 0 {
            return Err(DmaError::InvalidRegion);
        }
        Ok(Self {
            region,
            bus_base,
            table: Mutex::new(Table::new()),
        })
    }

    /// The managed region.
    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// Translator mapping CPU pointers inside the region to bus addresses.
    pub fn translator(&self) -> RegionTranslate {
        RegionTranslate::new(self.region, self.bus_base)
    }

    /// Number of live allocations.
    pub fn allocations(&self) -> usize {
        self.table.lock().count
    }

    /// Bytes handed out and not yet freed.
    pub fn bytes_in_use(&self) -> usize {
        self.table.lock().live().iter().map(|a| a.size).sum()
    }
}

impl DmaAllocator for RegionAllocator {
    fn alloc(&self, size: usize, align: usize) -> Result<DmaMemory> {
        if size == 0 {
            return Err(DmaError::ZeroSize);
        }
        if !align.is_power_of_two() {
            return Err(DmaError::InvalidAlignment);
        }

        let mut table = self.table.lock();
        if table.count == MAX_ALLOCATIONS {
            return Err(DmaError::TooManyAllocations);
        }
        let (slot, offset) = table
            .find_gap(self.region.base, self.region.size, size, align)
            .ok_or(DmaError::OutOfMemory)?;
        table.insert(slot, Allocation { offset, size });
        drop(table);

        let cpu = (self.region.base + offset) as *mut u8;
        // SAFETY: offset..offset+size lies inside the region (find_gap)
        unsafe { core::ptr::write_bytes(cpu, 0, size) };
        let cpu = NonNull::new(cpu).ok_or(DmaError::InvalidRegion)?;
        Ok(unsafe { DmaMemory::from_raw(cpu, self.bus_base + offset as u64, size) })
    }

    fn free(&self, mem: DmaMemory) -> Result<()> {
        let addr = mem.as_ptr() as usize;
        if !self.region.contains(addr, mem.len()) {
            return Err(DmaError::UnknownAllocation);
        }
        self.table.lock().remove(addr - self.region.base, mem.len())
    }
}
