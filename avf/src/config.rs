//! Driver and per-interface configuration.

use alloc::sync::Arc;
use core::fmt;

use dma_pool::{AddressMode, AddressTranslate};

use crate::hal::RegisterIo;

/// Driver-wide configuration.
#[derive(Debug, Clone, Copy)]
pub struct AvfConfig {
    /// Software workers that transmit; one TX queue is initialized per
    /// worker.
    pub n_workers: u16,
    /// Elog default for interfaces that don't say.
    pub enable_elog: bool,
    /// Device slots.
    pub max_devices: usize,
}

impl Default for AvfConfig {
    fn default() -> Self {
        Self {
            n_workers: 1,
            enable_elog: false,
            max_devices: 32,
        }
    }
}

/// PCI address `domain:bus:slot.function`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

impl PciAddress {
    pub const fn new(domain: u16, bus: u8, slot: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            slot,
            function,
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

/// Everything `create_if` needs to bring up one VF.
///
/// PCI enumeration and BAR mapping happen outside the driver; the caller
/// hands over the mapped register space and the DMA addressing mode.
pub struct CreateIfArgs {
    pub addr: PciAddress,
    pub vendor_id: u16,
    pub device_id: u16,
    pub regs: Arc<dyn RegisterIo>,
    pub translate: Arc<dyn AddressTranslate>,
    /// `None` takes [`AvfConfig::enable_elog`].
    pub enable_elog: Option<bool>,
}

impl CreateIfArgs {
    pub fn new(
        addr: PciAddress,
        vendor_id: u16,
        device_id: u16,
        regs: Arc<dyn RegisterIo>,
        translate: Arc<dyn AddressTranslate>,
    ) -> Self {
        Self {
            addr,
            vendor_id,
            device_id,
            regs,
            translate,
            enable_elog: None,
        }
    }

    pub fn with_elog(mut self, enable: bool) -> Self {
        self.enable_elog = Some(enable);
        self
    }

    pub fn address_mode(&self) -> AddressMode {
        self.translate.mode()
    }
}
