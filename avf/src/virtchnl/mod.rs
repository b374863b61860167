//! Virtchnl: the VF ↔ PF message protocol carried over the admin queue.
//!
//! Every message rides in an admin queue descriptor with opcode
//! [`AQ_OP_SEND_TO_PF`] (or [`AQ_OP_SEND_TO_VF`] on the way back); the
//! virtchnl opcode lives in the descriptor cookie.

pub mod msg;

pub use msg::{
    EthStats, LinkSpeed, PfEvent, PfEventKind, QueueSelect, Severity, VersionInfo, VfResource,
    VsiResource,
};

/// Admin queue opcode: VF → PF mailbox message.
pub const AQ_OP_SEND_TO_PF: u16 = 0x0801;
/// Admin queue opcode: PF → VF mailbox message.
pub const AQ_OP_SEND_TO_VF: u16 = 0x0802;
/// Admin queue opcode: RX control register write.
pub const AQ_OP_RX_CTL_REG_WRITE: u16 = 0x0207;

pub const VERSION_MAJOR: u32 = 1;
pub const VERSION_MINOR: u32 = 1;

/// VSI type of an SR-IOV VF.
pub const VSI_SRIOV: u32 = 6;

/// Unicast promiscuous.
pub const PROMISC_UNICAST: u16 = 1 << 0;
pub const PROMISC_MULTICAST: u16 = 1 << 1;

/// Offload capability bits of GET_VF_RESOURCES.
pub mod offload {
    pub const L2: u32 = 0x0000_0001;
    pub const IWARP: u32 = 0x0000_0002;
    pub const RSS_AQ: u32 = 0x0000_0008;
    pub const RSS_REG: u32 = 0x0000_0010;
    pub const WB_ON_ITR: u32 = 0x0000_0020;
    pub const VLAN: u32 = 0x0001_0000;
    pub const RX_POLLING: u32 = 0x0002_0000;
    pub const RSS_PCTYPE_V2: u32 = 0x0004_0000;
    pub const RSS_PF: u32 = 0x0008_0000;
    pub const ENCAP: u32 = 0x0010_0000;
    pub const ENCAP_CSUM: u32 = 0x0020_0000;
    pub const RX_ENCAP_CSUM: u32 = 0x0040_0000;

    /// What this driver asks the PF for.
    pub const REQUESTED: u32 = L2 | RSS_AQ | RSS_REG | WB_ON_ITR | VLAN | RX_POLLING;
}

macro_rules! virtchnl_ops {
    ($($name:ident = $val:literal,)*) => {
        /// Virtchnl opcodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u32)]
        pub enum VirtchnlOp {
            $($name = $val,)*
        }

        impl VirtchnlOp {
            pub fn from_u32(v: u32) -> Option<Self> {
                match v {
                    $($val => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}

virtchnl_ops! {
    Unknown = 0,
    Version = 1,
    ResetVf = 2,
    GetVfResources = 3,
    ConfigTxQueue = 4,
    ConfigRxQueue = 5,
    ConfigVsiQueues = 6,
    ConfigIrqMap = 7,
    EnableQueues = 8,
    DisableQueues = 9,
    AddEthAddr = 10,
    DelEthAddr = 11,
    AddVlan = 12,
    DelVlan = 13,
    ConfigPromiscuousMode = 14,
    GetStats = 15,
    Event = 17,
    ConfigRssKey = 23,
    ConfigRssLut = 24,
    GetRssHenaCaps = 25,
    SetRssHena = 26,
    EnableVlanStripping = 27,
    DisableVlanStripping = 28,
    RequestQueues = 29,
}

impl VirtchnlOp {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_values() {
        assert_eq!(VirtchnlOp::Event.as_u32(), 17);
        assert_eq!(VirtchnlOp::from_u32(28), Some(VirtchnlOp::DisableVlanStripping));
        assert_eq!(VirtchnlOp::from_u32(16), None);
        assert_eq!(offload::REQUESTED, 0x0003_0039);
    }
}
