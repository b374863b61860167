//! Supervisor process: device health, statistics and PF events.
//!
//! One process serves every device of an [`AvfMain`](crate::AvfMain). It
//! wakes on a signal or, once started, every [`PROCESS_PERIOD_US`] minus
//! the time the previous run took.

use core::sync::atomic::{AtomicU32, Ordering};

use log::{error, warn};

use crate::device::{AvfDevice, DeviceFlags};
use crate::error::AvfError;
use crate::hal::Timer;
use crate::notify::{HwIfFlags, InterfaceNotifier};
use crate::regs::aq;
use crate::virtchnl::{LinkSpeed, PfEventKind};

/// Periodic wakeup interval.
pub const PROCESS_PERIOD_US: u64 = 5_000_000;

/// Signal poll granularity while waiting.
pub const PROCESS_POLL_US: u64 = 1_000;

/// Why the process woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Period elapsed.
    Timer,
    /// First device created.
    Start,
    Stop,
    /// Admin queue interrupt.
    AqInterrupt,
}

impl ProcessEvent {
    const fn bit(self) -> u32 {
        match self {
            Self::Timer => 0,
            Self::Start => 1 << 0,
            Self::Stop => 1 << 1,
            Self::AqInterrupt => 1 << 2,
        }
    }
}

/// Pending process events, settable from interrupt context.
#[derive(Debug, Default)]
pub struct ProcessSignal {
    pending: AtomicU32,
}

impl ProcessSignal {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    pub fn signal(&self, ev: ProcessEvent) {
        self.pending.fetch_or(ev.bit(), Ordering::AcqRel);
    }

    /// Take one pending event, in Start, Stop, AqInterrupt order.
    pub fn take(&self) -> Option<ProcessEvent> {
        for ev in [ProcessEvent::Start, ProcessEvent::Stop, ProcessEvent::AqInterrupt] {
            let prev = self.pending.fetch_and(!ev.bit(), Ordering::AcqRel);
            if prev & ev.bit() != 0 {
                return Some(ev);
            }
        }
        None
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }

    /// Wait for an event, or until `timeout_us` elapsed when given.
    pub fn wait(&self, timer: &dyn Timer, timeout_us: Option<u64>) -> ProcessEvent {
        let start = timer.now_us();
        loop {
            if let Some(ev) = self.take() {
                return ev;
            }
            if let Some(t) = timeout_us {
                if timer.now_us().saturating_sub(start) >= t {
                    return ProcessEvent::Timer;
                }
            }
            timer.delay_us(PROCESS_POLL_US);
        }
    }
}

/// Process loop bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessState {
    pub enabled: bool,
    pub last_run_duration_us: u64,
    pub last_periodic_us: u64,
}

impl ProcessState {
    /// How long the next wait may last; `None` waits for a signal only.
    pub fn next_timeout(&self) -> Option<u64> {
        self.enabled
            .then(|| PROCESS_PERIOD_US.saturating_sub(self.last_run_duration_us))
    }
}

/// Admin queue length register still shows an enabled, error-free queue.
#[inline]
fn aq_enabled(len: u32) -> bool {
    len & aq::LEN_STATUS_MASK == aq::LEN_ENABLE
}

impl AvfDevice {
    /// One supervision pass over this device.
    ///
    /// Checks that both admin queues are still enabled, refreshes statistics
    /// on periodic passes and turns queued PF events into notifications.
    /// A disabled admin queue puts the device in the Error state for good.
    /// The event queue is empty afterwards, whether or not the pass ran.
    pub fn process(&mut self, timer: &dyn Timer, notifier: &mut dyn InterfaceNotifier, is_irq: bool) {
        if self.flags.contains(DeviceFlags::ERROR) || !self.flags.contains(DeviceFlags::INITIALIZED) {
            self.events.clear();
            return;
        }

        let arq_len = self.regs.read(aq::ARQLEN);
        let atq_len = self.regs.read(aq::ATQLEN);
        if !aq_enabled(arq_len) || !aq_enabled(atq_len) {
            let err = AvfError::RuntimeFault { arq_len, atq_len };
            error!("avf[{}] {}: {}", self.dev_instance, self.pci_addr, err);
            self.error = Some(err);
            self.flags |= DeviceFlags::ERROR;
            self.events.clear();
            return;
        }

        if !is_irq {
            match self.op_get_stats(timer) {
                Ok(stats) => self.eth_stats = stats,
                Err(e) => warn!("avf[{}]: get stats failed: {}", self.dev_instance, e),
            }
        }

        let trace = self.trace();
        for e in self.events.drain(..) {
            match e.kind {
                PfEventKind::LinkChange => {
                    let was_up = self.flags.contains(DeviceFlags::LINK_UP);
                    if e.link_up && !was_up {
                        self.flags |= DeviceFlags::LINK_UP;
                        self.link_speed = e.link_speed;
                        let flags = HwIfFlags::FULL_DUPLEX
                            | HwIfFlags::LINK_UP
                            | HwIfFlags::from_link_speed(e.link_speed);
                        if let Some(hw) = self.hw_if_index {
                            notifier.set_flags(hw, flags);
                        }
                    } else if !e.link_up && was_up {
                        self.flags.remove(DeviceFlags::LINK_UP);
                        self.link_speed = LinkSpeed::Unknown;
                        if let Some(hw) = self.hw_if_index {
                            notifier.set_flags(hw, HwIfFlags::empty());
                        }
                    }
                    trace.link_change(e.link_up, e.link_speed);
                }
                _ => {
                    trace.event(e.kind.as_u32(), e.severity.as_i32());
                    notifier.pf_event(self.dev_instance, &e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_order_and_clear() {
        let s = ProcessSignal::new();
        s.signal(ProcessEvent::AqInterrupt);
        s.signal(ProcessEvent::Start);
        assert_eq!(s.take(), Some(ProcessEvent::Start));
        assert_eq!(s.take(), Some(ProcessEvent::AqInterrupt));
        assert_eq!(s.take(), None);
        assert!(!s.is_pending());
    }

    #[test]
    fn test_aq_enabled_mask() {
        assert!(aq_enabled(0x8000_0040));
        assert!(!aq_enabled(0x0000_0040));
        // enable still set but an error bit raised
        assert!(!aq_enabled(0xC000_0040));
    }

    #[test]
    fn test_next_timeout() {
        let mut st = ProcessState::default();
        assert_eq!(st.next_timeout(), None);
        st.enabled = true;
        st.last_run_duration_us = 1_000_000;
        assert_eq!(st.next_timeout(), Some(4_000_000));
        st.last_run_duration_us = 9_000_000;
        assert_eq!(st.next_timeout(), Some(0));
    }
}
