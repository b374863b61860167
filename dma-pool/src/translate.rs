//! CPU pointer to device address translation.

use crate::MemoryRegion;

/// How the device addresses host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// IOMMU maps virtual addresses 1:1; the pointer is the DMA address.
    Iova,
    /// The device needs physical addresses.
    Physical,
}

/// Produces the address a device must be given for a host buffer.
pub trait AddressTranslate: Send + Sync {
    fn mode(&self) -> AddressMode;

    /// DMA address of `cpu`, or `None` when it cannot be translated.
    fn dma_addr(&self, cpu: *const u8) -> Option<u64>;
}

/// Direct virtual addressing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IovaTranslate;

impl AddressTranslate for IovaTranslate {
    fn mode(&self) -> AddressMode {
        AddressMode::Iova
    }

    #[inline]
    fn dma_addr(&self, cpu: *const u8) -> Option<u64> {
        Some(cpu as usize as u64)
    }
}

/// Physical translation for a linearly mapped region.
#[derive(Debug, Clone, Copy)]
pub struct RegionTranslate {
    cpu_base: usize,
    bus_base: u64,
    size: usize,
}

impl RegionTranslate {
    pub const fn new(region: MemoryRegion, bus_base: u64) -> Self {
        Self {
            cpu_base: region.base,
            bus_base,
            size: region.size,
        }
    }
}

impl AddressTranslate for RegionTranslate {
    fn mode(&self) -> AddressMode {
        AddressMode::Physical
    }

    fn dma_addr(&self, cpu: *const u8) -> Option<u64> {
        let addr = cpu as usize;
        if addr < self.cpu_base || addr >= self.cpu_base + self.size {
            return None;
        }
        Some(self.bus_base + (addr - self.cpu_base) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iova_is_identity() {
        let x = 0x1234_5000usize as *const u8;
        assert_eq!(IovaTranslate.dma_addr(x), Some(0x1234_5000));
        assert_eq!(IovaTranslate.mode(), AddressMode::Iova);
    }

    #[test]
    fn test_region_translate_bounds() {
        let t = RegionTranslate::new(MemoryRegion::new(0x10_0000, 0x1000), 0xF000_0000);
        assert_eq!(t.dma_addr(0x10_0010 as *const u8), Some(0xF000_0010));
        assert_eq!(t.dma_addr(0x10_1000 as *const u8), None);
        assert_eq!(t.dma_addr(0x0F_FFFF as *const u8), None);
    }
}
