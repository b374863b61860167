//! Device class: what the interface layer may ask of an AVF interface.

use alloc::format;
use alloc::string::String;

use log::info;

use crate::device::{AvfDevice, DeviceFlags};
use crate::error::{AvfError, Result};
use crate::notify::{HwIfFlags, InterfaceNotifier};

/// Intel PCI vendor ID.
pub const PCI_VENDOR_ID_INTEL: u16 = 0x8086;
/// Adaptive Virtual Function.
pub const PCI_DEVICE_ID_INTEL_AVF: u16 = 0x1889;
/// X710 virtual function.
pub const PCI_DEVICE_ID_INTEL_X710_VF: u16 = 0x154c;

/// Interface class capability.
pub trait DeviceClass {
    fn name(&self) -> &'static str;

    /// PCI vendor IDs this class drives.
    fn supported_vendors(&self) -> &'static [u16];

    /// PCI device IDs this class drives.
    fn supported_devices(&self) -> &'static [u16];

    /// Check if this class drives a PCI device.
    fn supports_device(&self, vendor: u16, device: u16) -> bool {
        self.supported_vendors().contains(&vendor) && self.supported_devices().contains(&device)
    }

    fn format_device_name(&self, dev: &AvfDevice) -> String;

    /// Administrative up/down request from the interface layer.
    fn admin_up_down(
        &self,
        dev: &mut AvfDevice,
        notifier: &mut dyn InterfaceNotifier,
        up: bool,
    ) -> Result<()>;
}

/// The AVF device class.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvfClass;

impl DeviceClass for AvfClass {
    fn name(&self) -> &'static str {
        "Adaptive Virtual Function (AVF) interface"
    }

    fn supported_vendors(&self) -> &'static [u16] {
        &[PCI_VENDOR_ID_INTEL]
    }

    fn supported_devices(&self) -> &'static [u16] {
        &[PCI_DEVICE_ID_INTEL_AVF, PCI_DEVICE_ID_INTEL_X710_VF]
    }

    fn format_device_name(&self, dev: &AvfDevice) -> String {
        format!("avf-{}", dev.pci_addr())
    }

    fn admin_up_down(
        &self,
        dev: &mut AvfDevice,
        notifier: &mut dyn InterfaceNotifier,
        up: bool,
    ) -> Result<()> {
        if dev.flags.contains(DeviceFlags::ERROR) {
            return Err(AvfError::DeviceInErrorState);
        }

        if up {
            if let Some(hw) = dev.hw_if_index {
                notifier.set_flags(hw, HwIfFlags::LINK_UP);
            }
            dev.flags |= DeviceFlags::ADMIN_UP;
        } else {
            if let Some(hw) = dev.hw_if_index {
                notifier.set_flags(hw, HwIfFlags::empty());
            }
            dev.flags.remove(DeviceFlags::ADMIN_UP);
        }
        info!(
            "{}: admin {}",
            self.format_device_name(dev),
            if up { "up" } else { "down" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_ids() {
        let c = AvfClass;
        assert!(c.supports_device(0x8086, 0x1889));
        assert!(c.supports_device(0x8086, 0x154c));
        assert!(!c.supports_device(0x8086, 0x10d3));
        assert!(!c.supports_device(0x1af4, 0x1889));
    }
}
