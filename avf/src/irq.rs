//! Interrupt line control and handlers.
//!
//! Line 0 carries admin queue (mailbox) causes; line N carries queue
//! interrupts. Handlers only touch registers and the process signal.

use alloc::sync::Arc;

use crate::hal::RegisterIo;
use crate::process::{ProcessEvent, ProcessSignal};
use crate::regs::irq::*;
use crate::trace::Trace;

/// DYN_CTL value: enable, clear PBA, default throttling interval.
const DYN_CTL_ENABLE: u32 =
    DYN_CTL_INTENA | DYN_CTL_CLEARPBA | ((ITR_INTERVAL / 2) << DYN_CTL_INTERVAL_SHIFT);

pub fn irq_0_disable(regs: &dyn RegisterIo) {
    regs.write(ICR0_ENA1, 0);
    regs.write(DYN_CTL0, DYN_CTL_ITR_NONE);
    regs.flush();
}

pub fn irq_0_enable(regs: &dyn RegisterIo) {
    irq_0_disable(regs);
    regs.write(ICR0_ENA1, ICR0_ADMINQ);
    regs.write(DYN_CTL0, DYN_CTL_ENABLE);
    regs.flush();
}

pub fn irq_n_disable(regs: &dyn RegisterIo, line: u16) {
    regs.write(dyn_ctln(line as u32), 0);
    regs.flush();
}

pub fn irq_n_enable(regs: &dyn RegisterIo, line: u16) {
    irq_n_disable(regs, line);
    regs.write(dyn_ctln(line as u32), DYN_CTL_ENABLE);
    regs.flush();
}

/// Interrupt entry points for one device.
///
/// Cheap to clone; owns only the register handle and the process signal so
/// it can be called from interrupt context.
#[derive(Clone)]
pub struct IrqHandler {
    dev_instance: u32,
    regs: Arc<dyn RegisterIo>,
    signal: Arc<ProcessSignal>,
    trace: Trace,
}

impl IrqHandler {
    pub(crate) fn new(
        dev_instance: u32,
        regs: Arc<dyn RegisterIo>,
        signal: Arc<ProcessSignal>,
        trace: Trace,
    ) -> Self {
        Self {
            dev_instance,
            regs,
            signal,
            trace,
        }
    }

    #[inline]
    pub fn dev_instance(&self) -> u32 {
        self.dev_instance
    }

    /// MSI-X vector 0.
    pub fn line_0(&self) {
        let icr0 = self.regs.read(ICR0);
        self.trace.irq_0(icr0);

        irq_0_enable(&*self.regs);

        if icr0 & ICR0_ADMINQ != 0 {
            self.signal.signal(ProcessEvent::AqInterrupt);
        }
    }

    /// MSI-X vector `line` (1 and up).
    pub fn line_n(&self, line: u16) {
        self.trace.irq_n(line);
        irq_n_enable(&*self.regs, line.saturating_sub(1));
    }
}
