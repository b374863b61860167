//! Hardware access: BAR0 register I/O and the wait clock.
//!
//! The driver only ever touches hardware through [`RegisterIo`] and only ever
//! waits through [`Timer`], so both can be replaced by a simulated PF in
//! tests.

use crate::regs::rstat::VFGEN_RSTAT;

// ═══════════════════════════════════════════════════════════════════════════
// REGISTER I/O
// ═══════════════════════════════════════════════════════════════════════════

/// 32-bit register access to the VF's BAR0.
pub trait RegisterIo: Send + Sync {
    fn read(&self, reg: u32) -> u32;

    fn write(&self, reg: u32, val: u32);

    /// Force posted writes out to the device.
    #[inline]
    fn flush(&self) {
        let _ = self.read(VFGEN_RSTAT);
    }
}

/// Memory-mapped BAR0.
pub struct Bar0 {
    base: *mut u8,
    len: usize,
}

impl Bar0 {
    /// # Safety
    /// - `base` must be the CPU mapping of the VF's BAR0, uncached
    /// - the mapping must span `len` bytes and outlive this handle
    pub unsafe fn new(base: *mut u8, len: usize) -> Self {
        Self { base, len }
    }

    #[inline]
    fn reg_ptr(&self, reg: u32) -> *mut u32 {
        let off = reg as usize;
        assert!(off + 4 <= self.len && off % 4 == 0, "bad BAR0 offset {:#x}", off);
        // SAFETY: bounds checked above
        unsafe { self.base.add(off) as *mut u32 }
    }
}

impl RegisterIo for Bar0 {
    #[inline]
    fn read(&self, reg: u32) -> u32 {
        unsafe { core::ptr::read_volatile(self.reg_ptr(reg)) }
    }

    #[inline]
    fn write(&self, reg: u32, val: u32) {
        unsafe { core::ptr::write_volatile(self.reg_ptr(reg), val) }
    }
}

// SAFETY: MMIO registers are accessed with single volatile 32-bit operations.
unsafe impl Send for Bar0 {}
unsafe impl Sync for Bar0 {}

// ═══════════════════════════════════════════════════════════════════════════
// TIMER
// ═══════════════════════════════════════════════════════════════════════════

/// Monotonic clock with a blocking delay.
pub trait Timer {
    /// Microseconds since an arbitrary epoch.
    fn now_us(&self) -> u64;

    /// Block for at least `us` microseconds.
    fn delay_us(&self, us: u64);

    #[inline]
    fn delay_ms(&self, ms: u64) {
        self.delay_us(ms * 1000);
    }
}

/// TSC busy-wait timer.
///
/// Requires an invariant TSC; `tsc_freq` is the calibrated frequency in Hz.
#[cfg(target_arch = "x86_64")]
pub struct TscTimer {
    tsc_freq: u64,
}

#[cfg(target_arch = "x86_64")]
impl TscTimer {
    pub fn new(tsc_freq: u64) -> Self {
        Self {
            tsc_freq: tsc_freq.max(1_000_000),
        }
    }

    #[inline]
    fn read_tsc() -> u64 {
        // SAFETY: RDTSC has no side effects
        unsafe { core::arch::x86_64::_rdtsc() }
    }
}

#[cfg(target_arch = "x86_64")]
impl Timer for TscTimer {
    fn now_us(&self) -> u64 {
        Self::read_tsc() / (self.tsc_freq / 1_000_000)
    }

    fn delay_us(&self, us: u64) {
        let start = Self::read_tsc();
        let ticks = us.saturating_mul(self.tsc_freq / 1_000_000);
        while Self::read_tsc().wrapping_sub(start) < ticks {
            core::hint::spin_loop();
        }
    }
}
