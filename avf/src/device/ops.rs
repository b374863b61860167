//! Typed PF operations.
//!
//! Each `op_*` wraps one virtchnl message; `cmd_*` are admin queue
//! commands that bypass virtchnl.

use alloc::vec;
use alloc::vec::Vec;

use log::info;
use smoltcp::wire::EthernetAddress;

use super::AvfDevice;
use crate::adminq::{AqDesc, AQ_BUF_SIZE};
use crate::error::{AvfError, Mismatch, Result, TimeoutKind};
use crate::hal::Timer;
use crate::regs::{queue::qrx_tail, rstat};
use crate::virtchnl::msg::{
    EtherAddrList, IrqMapInfo, PromiscInfo, QueuePairInfo, RxqInfo, TxqInfo, VectorMap,
    VsiQueueConfig, ETH_STATS_LEN, QUEUE_PAIR_INFO_LEN, VERSION_INFO_LEN, VF_RESOURCE_LEN,
    VSI_QUEUE_CONFIG_HDR_LEN,
};
use crate::virtchnl::{
    offload, EthStats, QueueSelect, VersionInfo, VfResource, VirtchnlOp, AQ_OP_RX_CTL_REG_WRITE,
    AQ_OP_SEND_TO_PF, PROMISC_UNICAST, VERSION_MAJOR, VERSION_MINOR,
};

/// Largest frame the RX queues are configured for.
pub const MAX_PKT_SIZE: u32 = 1518;

/// Reset poll: delay between RSTAT reads.
pub const RESET_POLL_DELAY_MS: u64 = 10;
/// Reset poll: number of RSTAT reads.
pub const RESET_POLL_RETRIES: u32 = 20;

/// Queue pairs one CONFIG_VSI_QUEUES message can describe within an admin
/// queue buffer. Hardware TX queues are capped at this count.
pub const MAX_VSI_QUEUE_PAIRS: u16 =
    ((AQ_BUF_SIZE - VSI_QUEUE_CONFIG_HDR_LEN) / QUEUE_PAIR_INFO_LEN) as u16;

/// MSI-X vector queue interrupts are mapped to.
pub const QUEUE_VECTOR: u16 = 1;

impl AvfDevice {
    /// One virtchnl round trip; see [`AdminQueue::send_to_pf`](crate::adminq::AdminQueue::send_to_pf).
    pub fn send_to_pf(
        &mut self,
        timer: &dyn Timer,
        op: VirtchnlOp,
        req: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        let trace = self.trace();
        self.adminq
            .send_to_pf(&*self.regs, timer, &trace, op, req, out, &mut self.events)
    }

    pub fn op_version(&mut self, timer: &dyn Timer) -> Result<VersionInfo> {
        let mine = VersionInfo {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
        };
        let mut out = [0u8; VERSION_INFO_LEN];
        let n = self.send_to_pf(timer, VirtchnlOp::Version, &mine.encode(), &mut out)?;
        VersionInfo::decode(&out[..n]).ok_or(AvfError::ProtocolMismatch(Mismatch::MessageLength {
            op: VirtchnlOp::Version,
            len: n,
        }))
    }

    pub fn op_get_vf_resources(&mut self, timer: &dyn Timer) -> Result<VfResource> {
        let bitmap = offload::REQUESTED.to_le_bytes();
        let mut out = [0u8; VF_RESOURCE_LEN];
        let n = self.send_to_pf(timer, VirtchnlOp::GetVfResources, &bitmap, &mut out)?;
        VfResource::decode(&out[..n]).ok_or(AvfError::ProtocolMismatch(Mismatch::MessageLength {
            op: VirtchnlOp::GetVfResources,
            len: n,
        }))
    }

    pub fn op_disable_vlan_stripping(&mut self, timer: &dyn Timer) -> Result<()> {
        self.send_to_pf(timer, VirtchnlOp::DisableVlanStripping, &[], &mut [])?;
        Ok(())
    }

    pub fn op_config_promisc_mode(&mut self, timer: &dyn Timer) -> Result<()> {
        let pi = PromiscInfo {
            vsi_id: self.vsi_id,
            flags: PROMISC_UNICAST,
        };
        self.send_to_pf(timer, VirtchnlOp::ConfigPromiscuousMode, &pi.encode(), &mut [])?;
        Ok(())
    }

    /// Describe every queue pair to the PF in one message and point the RX
    /// tails at the end of their rings.
    ///
    /// The message is sized before any tail is written; one that would not
    /// fit an admin queue buffer fails with `PayloadTooLarge`.
    pub fn op_config_vsi_queues(&mut self, timer: &dyn Timer) -> Result<()> {
        let n_qp = self.rxqs.len().max(self.txqs.len());
        let mut qpair = Vec::with_capacity(n_qp);
        let mut tails = Vec::new();

        for i in 0..n_qp {
            let mut rxq = RxqInfo {
                vsi_id: self.vsi_id,
                queue_id: i as u16,
                max_pkt_size: MAX_PKT_SIZE,
                ..Default::default()
            };
            if let Some(q) = self.rx_queue(i as u16) {
                rxq.ring_len = q.size() as u32;
                rxq.databuffer_size = q.buffer_size();
                rxq.dma_ring_addr = self.dma_addr(q.descs().as_ptr())?;
                tails.push((qrx_tail(i as u32), q.size() as u32 - 1));
            }

            let mut txq = TxqInfo {
                vsi_id: self.vsi_id,
                ..Default::default()
            };
            if let Some(q) = self.tx_queue(i as u16) {
                txq.queue_id = i as u16;
                txq.ring_len = q.size();
                txq.dma_ring_addr = self.dma_addr(q.descs().as_ptr())?;
            }

            qpair.push(QueuePairInfo { txq, rxq });
        }

        let msg = VsiQueueConfig {
            vsi_id: self.vsi_id,
            qpair,
        }
        .encode();
        if msg.len() > AQ_BUF_SIZE {
            return Err(AvfError::PayloadTooLarge { len: msg.len() });
        }

        for (reg, val) in tails {
            self.regs.write(reg, val);
        }
        self.send_to_pf(timer, VirtchnlOp::ConfigVsiQueues, &msg, &mut [])?;
        Ok(())
    }

    pub fn op_config_irq_map(&mut self, timer: &dyn Timer) -> Result<()> {
        let imi = IrqMapInfo {
            vecmap: vec![VectorMap {
                vsi_id: self.vsi_id,
                vector_id: QUEUE_VECTOR,
                rxq_map: 1,
                ..Default::default()
            }],
        };
        self.send_to_pf(timer, VirtchnlOp::ConfigIrqMap, &imi.encode(), &mut [])?;
        Ok(())
    }

    pub fn op_add_eth_addr(&mut self, timer: &dyn Timer, macs: &[EthernetAddress]) -> Result<()> {
        let al = EtherAddrList {
            vsi_id: self.vsi_id,
            list: macs.to_vec(),
        };
        self.send_to_pf(timer, VirtchnlOp::AddEthAddr, &al.encode(), &mut [])?;
        Ok(())
    }

    /// Enable the RX/TX queues selected by the bitmaps `rx` and `tx`.
    ///
    /// The RX tail of queue 0 is first set to its posted buffer count.
    pub fn op_enable_queues(&mut self, timer: &dyn Timer, rx: u32, tx: u32) -> Result<()> {
        let qs = QueueSelect {
            vsi_id: self.vsi_id,
            rx_queues: rx,
            tx_queues: tx,
        };
        if let Some(q) = self.rx_queue(0) {
            self.regs.write(q.qrx_tail(), q.n_bufs() as u32);
        }
        self.send_to_pf(timer, VirtchnlOp::EnableQueues, &qs.encode(), &mut [])?;
        Ok(())
    }

    pub fn op_get_stats(&mut self, timer: &dyn Timer) -> Result<EthStats> {
        let qs = QueueSelect {
            vsi_id: self.vsi_id,
            ..Default::default()
        };
        let mut out = [0u8; ETH_STATS_LEN];
        let n = self.send_to_pf(timer, VirtchnlOp::GetStats, &qs.encode(), &mut out)?;
        EthStats::decode(&out[..n]).ok_or(AvfError::ProtocolMismatch(Mismatch::MessageLength {
            op: VirtchnlOp::GetStats,
            len: n,
        }))
    }

    /// Write RX control register `reg` through the admin queue.
    pub fn cmd_rx_ctl_reg_write(&mut self, timer: &dyn Timer, reg: u32, val: u32) -> Result<()> {
        let mut d = AqDesc::new(AQ_OP_RX_CTL_REG_WRITE);
        d.param1 = reg;
        d.addr_lo = val;
        let trace = self.trace();
        let res = self.adminq.enqueue(&*self.regs, timer, &trace, &mut d, &[]);
        trace.rx_ctl_reg_write(reg, val);
        res
    }

    /// Ask the PF to reset this VF and wait for the reset to finish.
    ///
    /// Completion is polled through VFGEN_RSTAT, which must read exactly
    /// VFACTIVE or VFINACTIVE; no answer arrives on the ARQ because the
    /// reset wipes the admin queue.
    pub fn device_reset(&mut self, timer: &dyn Timer) -> Result<()> {
        let mut d = AqDesc::new(AQ_OP_SEND_TO_PF);
        d.v_opcode = VirtchnlOp::ResetVf.as_u32();
        let trace = self.trace();
        self.adminq.enqueue(&*self.regs, timer, &trace, &mut d, &[])?;

        for _ in 0..RESET_POLL_RETRIES {
            timer.delay_ms(RESET_POLL_DELAY_MS);
            let state = self.regs.read(rstat::VFGEN_RSTAT);
            if state == rstat::VFR_VFACTIVE || state == rstat::VFR_VFINACTIVE {
                info!("avf[{}]: VF reset complete (rstat {})", self.dev_instance, state);
                return Ok(());
            }
        }
        Err(AvfError::Timeout {
            kind: TimeoutKind::Reset,
            opcode: VirtchnlOp::ResetVf.as_u32(),
        })
    }
}
