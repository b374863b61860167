//! AVF VF register definitions (offsets into BAR0).

/// Queue tail registers
pub mod queue {
    /// TX queue tail, 4 bytes per queue
    #[inline]
    pub const fn qtx_tail(q: u32) -> u32 {
        0x0000 + 4 * q
    }

    /// RX queue tail, 4 bytes per queue
    #[inline]
    pub const fn qrx_tail(q: u32) -> u32 {
        0x2000 + 4 * q
    }
}

/// Interrupt registers
pub mod irq {
    /// Dynamic control for vector n+1
    #[inline]
    pub const fn dyn_ctln(n: u32) -> u32 {
        0x3800 + 4 * n
    }

    /// Interrupt cause (read clears)
    pub const ICR0: u32 = 0x4800;
    /// Interrupt cause enable
    pub const ICR0_ENA1: u32 = 0x5000;
    /// Dynamic control for vector 0
    pub const DYN_CTL0: u32 = 0x5C00;

    /// ICR0 / ICR0_ENA1: admin queue cause
    pub const ICR0_ADMINQ: u32 = 1 << 30;

    pub const DYN_CTL_INTENA: u32 = 1 << 0; // Interrupt enable
    pub const DYN_CTL_CLEARPBA: u32 = 1 << 1; // Clear pending bit
    pub const DYN_CTL_ITR_INDX_SHIFT: u32 = 3;
    pub const DYN_CTL_INTERVAL_SHIFT: u32 = 5;

    /// ITR index 11b: no ITR update
    pub const DYN_CTL_ITR_NONE: u32 = 3 << DYN_CTL_ITR_INDX_SHIFT;

    /// Throttling interval, in ITR units before halving
    pub const ITR_INTERVAL: u32 = 8160;
}

/// Admin queue registers
pub mod aq {
    pub const ARQBAH: u32 = 0x6000;
    pub const ATQH: u32 = 0x6400;
    pub const ATQLEN: u32 = 0x6800;
    pub const ARQBAL: u32 = 0x6C00;
    pub const ARQT: u32 = 0x7000;
    pub const ARQH: u32 = 0x7400;
    pub const ATQBAH: u32 = 0x7800;
    pub const ATQBAL: u32 = 0x7C00;
    pub const ARQLEN: u32 = 0x8000;
    pub const ATQT: u32 = 0x8400;

    /// ATQLEN / ARQLEN: queue enable
    pub const LEN_ENABLE: u32 = 1 << 31;
    /// ATQLEN / ARQLEN: enable plus the three error bits below it
    pub const LEN_STATUS_MASK: u32 = 0xf000_0000;
}

/// Reset status
pub mod rstat {
    pub const VFGEN_RSTAT: u32 = 0x8800;

    pub const VFR_INPROGRESS: u32 = 0;
    pub const VFR_COMPLETED: u32 = 1;
    pub const VFR_VFACTIVE: u32 = 2;
    pub const VFR_VFINACTIVE: u32 = 3;
}

/// Receive control registers cleared during bring-up
pub mod rx_ctl {
    pub const REG_C400: u32 = 0xc400;
    pub const REG_C404: u32 = 0xc404;
}
