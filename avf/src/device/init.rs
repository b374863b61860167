//! Device bring-up state machine.
//!
//! Bring-up is a fixed, strictly ordered list of stages from reset to a
//! traffic-ready VF. The first failing stage aborts bring-up; the device
//! records the stage it was in.

use log::{debug, info, warn};

use super::{AvfDevice, DeviceFlags, Env};
use crate::error::{AvfError, Mismatch, Result};
use crate::irq::{irq_0_enable, irq_n_enable};
use crate::regs::rx_ctl;
use crate::virtchnl::{VERSION_MAJOR, VERSION_MINOR, VSI_SRIOV};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Reset,
    AdminQueueArmed,
    VersionNegotiated,
    ResourcesGranted,
    VlanStrippingDisabled,
    PromiscuousConfigured,
    RxControlRegistersCleared,
    RxQueueInitialized,
    TxQueuesInitialized,
    QueuesConfigured,
    InterruptsMapped,
    InterruptsArmed,
    MacAddressRegistered,
    RxQueueEnabled,
    TxQueueEnabled,
    Initialized,
}

impl InitStage {
    pub const fn next(self) -> Option<Self> {
        use InitStage::*;
        Some(match self {
            Reset => AdminQueueArmed,
            AdminQueueArmed => VersionNegotiated,
            VersionNegotiated => ResourcesGranted,
            ResourcesGranted => VlanStrippingDisabled,
            VlanStrippingDisabled => PromiscuousConfigured,
            PromiscuousConfigured => RxControlRegistersCleared,
            RxControlRegistersCleared => RxQueueInitialized,
            RxQueueInitialized => TxQueuesInitialized,
            TxQueuesInitialized => QueuesConfigured,
            QueuesConfigured => InterruptsMapped,
            InterruptsMapped => InterruptsArmed,
            InterruptsArmed => MacAddressRegistered,
            MacAddressRegistered => RxQueueEnabled,
            RxQueueEnabled => TxQueueEnabled,
            TxQueueEnabled => Initialized,
            Initialized => return None,
        })
    }
}

impl AvfDevice {
    /// Bring the VF from reset to traffic-ready.
    ///
    /// `n_workers` TX queues are initialized, ids `0..n_workers`.
    pub fn device_init(&mut self, env: &mut Env<'_>, n_workers: u16) -> Result<()> {
        let mut stage = InitStage::Reset;
        loop {
            self.stage = stage;
            if let Err(e) = self.run_stage(env, stage, n_workers) {
                warn!(
                    "avf[{}] {}: bring-up failed at {:?}: {}",
                    self.dev_instance, self.pci_addr, stage, e
                );
                return Err(e);
            }
            debug!("avf[{}]: {:?} done", self.dev_instance, stage);
            match stage.next() {
                Some(s) => stage = s,
                None => return Ok(()),
            }
        }
    }

    fn run_stage(&mut self, env: &mut Env<'_>, stage: InitStage, n_workers: u16) -> Result<()> {
        let timer = env.timer;
        match stage {
            InitStage::Reset => {
                self.adminq.init(&*self.regs, &*self.xlate)?;
                self.device_reset(timer)
            }
            InitStage::AdminQueueArmed => self.adminq.init(&*self.regs, &*self.xlate),
            InitStage::VersionNegotiated => {
                let ver = self.op_version(timer)?;
                if ver.major != VERSION_MAJOR || ver.minor != VERSION_MINOR {
                    return Err(AvfError::ProtocolMismatch(Mismatch::Version {
                        major: ver.major,
                        minor: ver.minor,
                    }));
                }
                Ok(())
            }
            InitStage::ResourcesGranted => {
                let res = self.op_get_vf_resources(timer)?;
                let vsi = match res.vsi_res.first() {
                    Some(vsi) if res.num_vsis == 1 && vsi.vsi_type == VSI_SRIOV => *vsi,
                    other => {
                        return Err(AvfError::ProtocolMismatch(Mismatch::VsiResource {
                            num_vsis: res.num_vsis,
                            vsi_type: other.map_or(0, |v| v.vsi_type),
                        }))
                    }
                };
                self.vsi_id = vsi.vsi_id;
                self.feature_bitmap = res.vf_offload_flags;
                self.num_queue_pairs = res.num_queue_pairs;
                self.max_vectors = res.max_vectors;
                self.max_mtu = res.max_mtu;
                self.rss_key_size = res.rss_key_size;
                self.rss_lut_size = res.rss_lut_size;
                self.hwaddr = vsi.default_mac;
                info!(
                    "avf[{}] {}: vsi {} queue pairs {} vectors {} mtu {} mac {}",
                    self.dev_instance,
                    self.pci_addr,
                    self.vsi_id,
                    self.num_queue_pairs,
                    self.max_vectors,
                    self.max_mtu,
                    self.hwaddr
                );
                Ok(())
            }
            InitStage::VlanStrippingDisabled => self.op_disable_vlan_stripping(timer),
            InitStage::PromiscuousConfigured => self.op_config_promisc_mode(timer),
            InitStage::RxControlRegistersCleared => {
                self.cmd_rx_ctl_reg_write(timer, rx_ctl::REG_C400, 0)?;
                self.cmd_rx_ctl_reg_write(timer, rx_ctl::REG_C404, 0)
            }
            InitStage::RxQueueInitialized => self.rxq_init(env, 0),
            InitStage::TxQueuesInitialized => {
                for qid in 0..n_workers.max(1) {
                    self.txq_init(env, qid)?;
                }
                Ok(())
            }
            InitStage::QueuesConfigured => self.op_config_vsi_queues(timer),
            InitStage::InterruptsMapped => self.op_config_irq_map(timer),
            InitStage::InterruptsArmed => {
                irq_0_enable(&*self.regs);
                irq_n_enable(&*self.regs, 0);
                Ok(())
            }
            InitStage::MacAddressRegistered => {
                let mac = self.hwaddr;
                self.op_add_eth_addr(timer, &[mac])
            }
            InitStage::RxQueueEnabled => self.op_enable_queues(timer, 1, 0),
            InitStage::TxQueueEnabled => self.op_enable_queues(timer, 0, 1),
            InitStage::Initialized => {
                self.flags |= DeviceFlags::INITIALIZED;
                info!("avf[{}] {}: initialized", self.dev_instance, self.pci_addr);
                Ok(())
            }
        }
    }
}
