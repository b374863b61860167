//! Interface notifications.
//!
//! The generic interface layer lives outside the driver. The driver tells
//! it about new and removed interfaces and about link state through
//! [`InterfaceNotifier`].

use bitflags::bitflags;
use smoltcp::wire::EthernetAddress;

use crate::error::Result;
use crate::virtchnl::{LinkSpeed, PfEvent};

bitflags! {
    /// Hardware interface state reported upward.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HwIfFlags: u32 {
        const LINK_UP = 1 << 0;
        const HALF_DUPLEX = 1 << 1;
        const FULL_DUPLEX = 1 << 2;
        const SPEED_100M = 1 << 4;
        const SPEED_1G = 1 << 5;
        const SPEED_10G = 1 << 7;
        const SPEED_25G = 1 << 8;
        const SPEED_40G = 1 << 9;
    }
}

impl HwIfFlags {
    /// Speed flag for a virtchnl link speed (none for 20G and unknown).
    pub fn from_link_speed(speed: LinkSpeed) -> Self {
        match speed {
            LinkSpeed::Speed40Gb => Self::SPEED_40G,
            LinkSpeed::Speed25Gb => Self::SPEED_25G,
            LinkSpeed::Speed10Gb => Self::SPEED_10G,
            LinkSpeed::Speed1Gb => Self::SPEED_1G,
            LinkSpeed::Speed100Mb => Self::SPEED_100M,
            LinkSpeed::Speed20Gb | LinkSpeed::Unknown => Self::empty(),
        }
    }
}

/// Sink for interface lifecycle and link state.
pub trait InterfaceNotifier {
    /// Register a new Ethernet interface; returns its hardware interface
    /// index.
    fn register_interface(&mut self, dev_instance: u32, hwaddr: EthernetAddress) -> Result<u32>;

    fn unregister_interface(&mut self, hw_if_index: u32);

    fn set_flags(&mut self, hw_if_index: u32, flags: HwIfFlags);

    /// PF event other than a link change.
    fn pf_event(&mut self, _dev_instance: u32, _event: &PfEvent) {}
}
