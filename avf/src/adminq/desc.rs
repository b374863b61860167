//! Admin queue descriptor.
//!
//! # Layout (32 bytes, little-endian)
//! ```text
//! 0       2       4       6       8          12         16      20      24      28
//! | flags | opcode|datalen|retval | v_opcode | v_retval | param0| param1| addr_hi| addr_lo|
//! ```
//! `v_opcode`/`v_retval` are the cookie words; virtchnl stores its own
//! opcode and return code there.

use bitflags::bitflags;
use dma_pool::DmaMemory;

/// Descriptor size in bytes.
pub const AQ_DESC_LEN: usize = 32;

bitflags! {
    /// Admin queue descriptor flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AqFlags: u16 {
        /// Descriptor done (hardware).
        const DD = 1 << 0;
        /// Command complete (hardware).
        const CMP = 1 << 1;
        /// Command failed.
        const ERR = 1 << 2;
        /// VF error.
        const VFE = 1 << 3;
        /// Large buffer.
        const LB = 1 << 9;
        /// Buffer is read by the device.
        const RD = 1 << 10;
        /// VF command.
        const VFC = 1 << 11;
        /// Buffer present.
        const BUF = 1 << 12;
        /// Suppress completion interrupt.
        const SI = 1 << 13;
        /// Error interrupt.
        const EI = 1 << 14;
        /// Flush.
        const FE = 1 << 15;
    }
}

impl AqFlags {
    /// Both completion bits the device sets when it is done with a slot.
    pub const DONE: Self = Self::DD.union(Self::CMP);

    #[inline]
    pub fn is_done(self) -> bool {
        self.contains(Self::DONE)
    }
}

// Field offsets
const OFF_FLAGS: usize = 0;
const OFF_OPCODE: usize = 2;
const OFF_DATALEN: usize = 4;
const OFF_RETVAL: usize = 6;
const OFF_V_OPCODE: usize = 8;
const OFF_V_RETVAL: usize = 12;
const OFF_PARAM0: usize = 16;
const OFF_PARAM1: usize = 20;
const OFF_ADDR_HI: usize = 24;
const OFF_ADDR_LO: usize = 28;

/// Host copy of one admin queue descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AqDesc {
    pub flags: AqFlags,
    pub opcode: u16,
    pub datalen: u16,
    pub retval: u16,
    pub v_opcode: u32,
    pub v_retval: i32,
    pub param0: u32,
    pub param1: u32,
    /// param2, or the buffer address high word when BUF is set.
    pub addr_hi: u32,
    /// param3, or the buffer address low word when BUF is set.
    pub addr_lo: u32,
}

impl AqDesc {
    pub fn new(opcode: u16) -> Self {
        Self {
            opcode,
            ..Default::default()
        }
    }

    #[inline]
    pub fn set_addr(&mut self, addr: u64) {
        self.addr_hi = (addr >> 32) as u32;
        self.addr_lo = addr as u32;
    }

    #[inline]
    pub fn addr(&self) -> u64 {
        ((self.addr_hi as u64) << 32) | self.addr_lo as u64
    }

    pub fn to_bytes(&self) -> [u8; AQ_DESC_LEN] {
        let mut b = [0u8; AQ_DESC_LEN];
        b[OFF_FLAGS..OFF_FLAGS + 2].copy_from_slice(&self.flags.bits().to_le_bytes());
        b[OFF_OPCODE..OFF_OPCODE + 2].copy_from_slice(&self.opcode.to_le_bytes());
        b[OFF_DATALEN..OFF_DATALEN + 2].copy_from_slice(&self.datalen.to_le_bytes());
        b[OFF_RETVAL..OFF_RETVAL + 2].copy_from_slice(&self.retval.to_le_bytes());
        b[OFF_V_OPCODE..OFF_V_OPCODE + 4].copy_from_slice(&self.v_opcode.to_le_bytes());
        b[OFF_V_RETVAL..OFF_V_RETVAL + 4].copy_from_slice(&self.v_retval.to_le_bytes());
        b[OFF_PARAM0..OFF_PARAM0 + 4].copy_from_slice(&self.param0.to_le_bytes());
        b[OFF_PARAM1..OFF_PARAM1 + 4].copy_from_slice(&self.param1.to_le_bytes());
        b[OFF_ADDR_HI..OFF_ADDR_HI + 4].copy_from_slice(&self.addr_hi.to_le_bytes());
        b[OFF_ADDR_LO..OFF_ADDR_LO + 4].copy_from_slice(&self.addr_lo.to_le_bytes());
        b
    }

    pub fn from_bytes(b: &[u8; AQ_DESC_LEN]) -> Self {
        let u16_at = |o: usize| u16::from_le_bytes([b[o], b[o + 1]]);
        let u32_at = |o: usize| u32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]]);
        Self {
            flags: AqFlags::from_bits_retain(u16_at(OFF_FLAGS)),
            opcode: u16_at(OFF_OPCODE),
            datalen: u16_at(OFF_DATALEN),
            retval: u16_at(OFF_RETVAL),
            v_opcode: u32_at(OFF_V_OPCODE),
            v_retval: u32_at(OFF_V_RETVAL) as i32,
            param0: u32_at(OFF_PARAM0),
            param1: u32_at(OFF_PARAM1),
            addr_hi: u32_at(OFF_ADDR_HI),
            addr_lo: u32_at(OFF_ADDR_LO),
        }
    }

    /// Read slot `slot` of a descriptor ring.
    pub fn read_slot(ring: &DmaMemory, slot: u16) -> Self {
        let mut b = [0u8; AQ_DESC_LEN];
        ring.read_bytes(slot as usize * AQ_DESC_LEN, &mut b);
        Self::from_bytes(&b)
    }

    /// Write this descriptor into slot `slot` of a descriptor ring.
    pub fn write_slot(&self, ring: &mut DmaMemory, slot: u16) {
        ring.write_bytes(slot as usize * AQ_DESC_LEN, &self.to_bytes());
    }

    /// Volatile read of just the flags word of a slot.
    #[inline]
    pub fn slot_flags(ring: &DmaMemory, slot: u16) -> AqFlags {
        AqFlags::from_bits_retain(ring.read_u16(slot as usize * AQ_DESC_LEN + OFF_FLAGS))
    }

    #[inline]
    pub fn set_slot_flags(ring: &mut DmaMemory, slot: u16, flags: AqFlags) {
        ring.write_u16(slot as usize * AQ_DESC_LEN + OFF_FLAGS, flags.bits());
    }
}
