//! AVF driver error types

use core::fmt;

use dma_pool::DmaError;

use crate::virtchnl::VirtchnlOp;

pub type Result<T> = core::result::Result<T, AvfError>;

/// Which bounded wait ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// ATQ descriptor never reported DD|CMP.
    AdminQueue,
    /// PF never answered on the ARQ.
    PfResponse,
    /// VFGEN_RSTAT never reported a completed reset.
    Reset,
}

/// What the PF sent that we could not accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    /// Remote virtchnl version differs from ours.
    Version { major: u32, minor: u32 },
    /// Wrong VSI count or VSI type in the resource grant.
    VsiResource { num_vsis: u16, vsi_type: u32 },
    /// Response carried a different virtchnl opcode.
    Opcode { received: u32, expected: VirtchnlOp },
    /// EVENT message with bad size or without a buffer.
    EventMessage { datalen: u16 },
    /// Response payload too short to decode.
    MessageLength { op: VirtchnlOp, len: usize },
}

/// Which resource ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Dma(DmaError),
    RxBuffers,
    /// PF granted no queue pairs.
    QueuePairs,
    DeviceSlots,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvfError {
    /// A bounded wait expired. `opcode` is the AQ opcode or virtchnl op.
    Timeout { kind: TimeoutKind, opcode: u32 },
    ProtocolMismatch(Mismatch),
    /// ERR flag on an AQ descriptor or nonzero virtchnl return code.
    DeviceError { opcode: u32, retval: i32 },
    /// Admin queue enable bit dropped while running.
    RuntimeFault { arq_len: u32, atq_len: u32 },
    ResourceExhaustion(Resource),
    /// Admin queue payload above the 512-byte slot buffer.
    PayloadTooLarge { len: usize },
    /// ATQ slot still owned by hardware.
    AdminQueueBusy { slot: u16 },
    UnsupportedDevice { vendor: u16, device: u16 },
    DeviceInErrorState,
    NoSuchDevice,
    /// Interface notifier refused the new interface.
    InterfaceRegistration,
}

impl AvfError {
    /// True for failures caused by the PF not answering.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdminQueue => write!(f, "admin queue"),
            Self::PfResponse => write!(f, "PF response"),
            Self::Reset => write!(f, "VF reset"),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version { major, minor } => {
                write!(f, "incompatible virtchnl version {}.{}", major, minor)
            }
            Self::VsiResource { num_vsis, vsi_type } => write!(
                f,
                "unexpected VSI resource ({} vsis, type {})",
                num_vsis, vsi_type
            ),
            Self::Opcode { received, expected } => write!(
                f,
                "unexpected response opcode {} (expected {:?})",
                received, expected
            ),
            Self::EventMessage { datalen } => {
                write!(f, "malformed PF event message (len {})", datalen)
            }
            Self::MessageLength { op, len } => {
                write!(f, "short {:?} response ({} bytes)", op, len)
            }
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dma(e) => write!(f, "DMA memory: {}", e),
            Self::RxBuffers => write!(f, "no RX buffers available"),
            Self::QueuePairs => write!(f, "no queue pairs granted"),
            Self::DeviceSlots => write!(f, "no free device slots"),
        }
    }
}

impl fmt::Display for AvfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { kind, opcode } => {
                write!(f, "{} timeout (opcode {:#x})", kind, opcode)
            }
            Self::ProtocolMismatch(m) => write!(f, "Protocol mismatch: {}", m),
            Self::DeviceError { opcode, retval } => {
                write!(f, "Device error: opcode {:#x} retval {}", opcode, retval)
            }
            Self::RuntimeFault { arq_len, atq_len } => write!(
                f,
                "Admin queue disabled (arq_len {:#010x} atq_len {:#010x})",
                arq_len, atq_len
            ),
            Self::ResourceExhaustion(r) => write!(f, "Out of resources: {}", r),
            Self::PayloadTooLarge { len } => {
                write!(f, "Admin queue payload too large ({} bytes)", len)
            }
            Self::AdminQueueBusy { slot } => write!(f, "Admin queue slot {} busy", slot),
            Self::UnsupportedDevice { vendor, device } => {
                write!(f, "Unsupported PCI device {:04x}:{:04x}", vendor, device)
            }
            Self::DeviceInErrorState => write!(f, "Device in error state"),
            Self::NoSuchDevice => write!(f, "No such device"),
            Self::InterfaceRegistration => write!(f, "Interface registration failed"),
        }
    }
}

impl From<DmaError> for AvfError {
    fn from(e: DmaError) -> Self {
        Self::ResourceExhaustion(Resource::Dma(e))
    }
}
