//! Per-device diagnostic event log ("elog").
//!
//! Records are plain `log::debug!` lines under [`ELOG_TARGET`], emitted only
//! when the device was created with elog enabled. Nothing here changes
//! driver state.

use log::debug;

use crate::adminq::AqFlags;
use crate::virtchnl::{LinkSpeed, VirtchnlOp};

/// Log target of elog records.
pub const ELOG_TARGET: &str = "avf::elog";

#[derive(Debug, Clone, Copy)]
pub struct Trace {
    dev_instance: u32,
    enabled: bool,
}

impl Trace {
    pub const fn new(dev_instance: u32, enabled: bool) -> Self {
        Self {
            dev_instance,
            enabled,
        }
    }

    /// Trace that never emits.
    pub const fn off() -> Self {
        Self::new(0, false)
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn aq_enq(&self, s_flags: AqFlags, r_flags: AqFlags, opcode: u16, datalen: u16, retval: u16) {
        if self.enabled {
            debug!(
                target: ELOG_TARGET,
                "avf[{}] aq enq: s_flags {:#x} r_flags {:#x} opcode {:#x} datalen {} retval {}",
                self.dev_instance,
                s_flags.bits(),
                r_flags.bits(),
                opcode,
                datalen,
                retval
            );
        }
    }

    pub fn send_to_pf(&self, op: VirtchnlOp, v_retval: i32) {
        if self.enabled {
            debug!(
                target: ELOG_TARGET,
                "avf[{}] send to pf: v_opcode {:?} ({}) v_retval {:#x}",
                self.dev_instance,
                op,
                op.as_u32(),
                v_retval
            );
        }
    }

    pub fn rx_ctl_reg_write(&self, reg: u32, val: u32) {
        if self.enabled {
            debug!(
                target: ELOG_TARGET,
                "avf[{}] rx ctl reg write: reg {:#x} val {:#x}",
                self.dev_instance,
                reg,
                val
            );
        }
    }

    pub fn link_change(&self, up: bool, speed: LinkSpeed) {
        if self.enabled {
            debug!(
                target: ELOG_TARGET,
                "avf[{}] link change: link_status {} link_speed {:?}",
                self.dev_instance,
                up as u8,
                speed
            );
        }
    }

    pub fn event(&self, event: u32, severity: i32) {
        if self.enabled {
            debug!(
                target: ELOG_TARGET,
                "avf[{}] event: event {} severity {}",
                self.dev_instance,
                event,
                severity
            );
        }
    }

    pub fn irq_0(&self, icr0: u32) {
        if self.enabled {
            debug!(target: ELOG_TARGET, "avf[{}] irq 0: icr0 {:#x}", self.dev_instance, icr0);
        }
    }

    pub fn irq_n(&self, line: u16) {
        if self.enabled {
            debug!(target: ELOG_TARGET, "avf[{}] irq {}: received", self.dev_instance, line);
        }
    }
}
