//! One AVF virtual function.
//!
//! - [`ops`]: typed virtchnl operations and direct admin commands
//! - [`init`]: the bring-up state machine

pub mod init;
pub mod ops;

pub use init::InitStage;

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use dma_pool::{AddressMode, AddressTranslate, BufferAllocator, DmaAllocator, DmaError};
use smoltcp::wire::EthernetAddress;

use crate::adminq::AdminQueue;
use crate::config::PciAddress;
use crate::error::{AvfError, Resource, Result};
use crate::hal::{RegisterIo, Timer};
use crate::queue::{RxQueue, TxQueue};
use crate::trace::Trace;
use crate::virtchnl::{EthStats, LinkSpeed, PfEvent};

bitflags! {
    /// Device status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceFlags: u32 {
        const INITIALIZED = 1 << 0;
        const ERROR = 1 << 1;
        const ADMIN_UP = 1 << 2;
        /// Device addresses host memory by virtual address.
        const IOVA = 1 << 3;
        const LINK_UP = 1 << 4;
        /// At least one TX queue is shared between workers.
        const SHARED_TXQ_LOCK = 1 << 5;
        /// Diagnostic event log enabled.
        const ELOG = 1 << 6;
    }
}

/// Collaborators a device borrows while it works.
pub struct Env<'a> {
    pub timer: &'a dyn Timer,
    pub dma: &'a dyn DmaAllocator,
    pub buffers: &'a mut dyn BufferAllocator,
}

/// One VF instance.
pub struct AvfDevice {
    pub(crate) dev_instance: u32,
    pub(crate) pci_addr: PciAddress,
    pub(crate) regs: Arc<dyn RegisterIo>,
    pub(crate) xlate: Arc<dyn AddressTranslate>,
    pub(crate) flags: DeviceFlags,

    // Granted by the PF
    pub(crate) vsi_id: u16,
    pub(crate) feature_bitmap: u32,
    pub(crate) num_queue_pairs: u16,
    pub(crate) max_vectors: u16,
    pub(crate) max_mtu: u16,
    pub(crate) rss_key_size: u32,
    pub(crate) rss_lut_size: u32,
    pub(crate) hwaddr: EthernetAddress,

    pub(crate) link_speed: LinkSpeed,
    pub(crate) error: Option<AvfError>,

    pub(crate) rxqs: Vec<Option<RxQueue>>,
    pub(crate) txqs: Vec<Option<TxQueue>>,
    pub(crate) adminq: AdminQueue,
    /// PF events waiting for the process.
    pub(crate) events: Vec<PfEvent>,
    pub(crate) eth_stats: EthStats,

    pub(crate) hw_if_index: Option<u32>,
    pub(crate) stage: InitStage,
}

impl AvfDevice {
    pub(crate) fn new(
        dev_instance: u32,
        pci_addr: PciAddress,
        regs: Arc<dyn RegisterIo>,
        xlate: Arc<dyn AddressTranslate>,
        adminq: AdminQueue,
        enable_elog: bool,
    ) -> Self {
        let mut flags = DeviceFlags::empty();
        if enable_elog {
            flags |= DeviceFlags::ELOG;
        }
        if xlate.mode() == AddressMode::Iova {
            flags |= DeviceFlags::IOVA;
        }
        Self {
            dev_instance,
            pci_addr,
            regs,
            xlate,
            flags,
            vsi_id: 0,
            feature_bitmap: 0,
            num_queue_pairs: 0,
            max_vectors: 0,
            max_mtu: 0,
            rss_key_size: 0,
            rss_lut_size: 0,
            hwaddr: EthernetAddress([0; 6]),
            link_speed: LinkSpeed::Unknown,
            error: None,
            rxqs: Vec::new(),
            txqs: Vec::new(),
            adminq,
            events: Vec::new(),
            eth_stats: EthStats::default(),
            hw_if_index: None,
            stage: InitStage::Reset,
        }
    }

    #[inline]
    pub(crate) fn trace(&self) -> Trace {
        Trace::new(self.dev_instance, self.flags.contains(DeviceFlags::ELOG))
    }

    #[inline]
    pub(crate) fn regs(&self) -> &dyn RegisterIo {
        &*self.regs
    }

    /// DMA address of `p` under this device's addressing mode.
    pub(crate) fn dma_addr(&self, p: *const u8) -> Result<u64> {
        self.xlate
            .dma_addr(p)
            .ok_or(AvfError::from(DmaError::ForeignAddress))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUEUES
    // ═══════════════════════════════════════════════════════════════════════

    /// Create RX queue `qid`, replacing (and releasing) any previous one.
    pub fn rxq_init(&mut self, env: &mut Env<'_>, qid: u16) -> Result<()> {
        let q = RxQueue::init(qid, env.dma, &mut *env.buffers, &*self.xlate)?;
        let idx = qid as usize;
        if self.rxqs.len() <= idx {
            self.rxqs.resize_with(idx + 1, || None);
        }
        if let Some(old) = self.rxqs[idx].replace(q) {
            old.release(env.dma, &mut *env.buffers);
        }
        Ok(())
    }

    /// Hardware TX queues in use: the granted queue pairs, capped at what
    /// one CONFIG_VSI_QUEUES message can describe.
    #[inline]
    pub fn tx_queue_limit(&self) -> u16 {
        self.num_queue_pairs.min(ops::MAX_VSI_QUEUE_PAIRS)
    }

    /// Create the TX queue for worker `qid`.
    ///
    /// Workers at or above [`tx_queue_limit`](Self::tx_queue_limit) share
    /// hardware queue `qid % limit`, which then gets a lock. An existing
    /// queue is kept as is.
    pub fn txq_init(&mut self, env: &mut Env<'_>, qid: u16) -> Result<()> {
        let n = self.tx_queue_limit();
        if n == 0 {
            return Err(AvfError::ResourceExhaustion(Resource::QueuePairs));
        }

        if qid >= n {
            let hw = qid % n;
            if self.tx_queue(hw).is_none() {
                self.txq_init(env, hw)?;
            }
            if let Some(txq) = self.txqs[hw as usize].as_mut() {
                if txq.lock.is_none() {
                    txq.lock = Some(Arc::new(spin::Mutex::new(())));
                }
            }
            self.flags |= DeviceFlags::SHARED_TXQ_LOCK;
            return Ok(());
        }

        if self.tx_queue(qid).is_some() {
            return Ok(());
        }
        let q = TxQueue::init(qid, env.dma)?;
        let idx = qid as usize;
        if self.txqs.len() <= idx {
            self.txqs.resize_with(idx + 1, || None);
        }
        self.txqs[idx] = Some(q);
        Ok(())
    }

    /// Release every ring, posted buffer and the admin queue memory.
    pub(crate) fn release(self, dma: &dyn DmaAllocator, buffers: &mut dyn BufferAllocator) {
        for q in self.rxqs.into_iter().flatten() {
            q.release(dma, buffers);
        }
        for q in self.txqs.into_iter().flatten() {
            q.release(dma, buffers);
        }
        self.adminq.release(dma);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    #[inline]
    pub fn dev_instance(&self) -> u32 {
        self.dev_instance
    }

    #[inline]
    pub fn pci_addr(&self) -> PciAddress {
        self.pci_addr
    }

    #[inline]
    pub fn flags(&self) -> DeviceFlags {
        self.flags
    }

    #[inline]
    pub fn vsi_id(&self) -> u16 {
        self.vsi_id
    }

    #[inline]
    pub fn feature_bitmap(&self) -> u32 {
        self.feature_bitmap
    }

    #[inline]
    pub fn num_queue_pairs(&self) -> u16 {
        self.num_queue_pairs
    }

    #[inline]
    pub fn max_vectors(&self) -> u16 {
        self.max_vectors
    }

    #[inline]
    pub fn max_mtu(&self) -> u16 {
        self.max_mtu
    }

    /// RSS key and lookup table sizes.
    #[inline]
    pub fn rss_sizes(&self) -> (u32, u32) {
        (self.rss_key_size, self.rss_lut_size)
    }

    #[inline]
    pub fn hwaddr(&self) -> EthernetAddress {
        self.hwaddr
    }

    #[inline]
    pub fn link_speed(&self) -> LinkSpeed {
        self.link_speed
    }

    #[inline]
    pub fn error(&self) -> Option<&AvfError> {
        self.error.as_ref()
    }

    #[inline]
    pub fn stage(&self) -> InitStage {
        self.stage
    }

    #[inline]
    pub fn eth_stats(&self) -> &EthStats {
        &self.eth_stats
    }

    #[inline]
    pub fn hw_if_index(&self) -> Option<u32> {
        self.hw_if_index
    }

    #[inline]
    pub fn adminq(&self) -> &AdminQueue {
        &self.adminq
    }

    pub fn pending_events(&self) -> &[PfEvent] {
        &self.events
    }

    pub fn rx_queue(&self, qid: u16) -> Option<&RxQueue> {
        self.rxqs.get(qid as usize).and_then(Option::as_ref)
    }

    pub fn tx_queue(&self, qid: u16) -> Option<&TxQueue> {
        self.txqs.get(qid as usize).and_then(Option::as_ref)
    }

    pub fn rx_queue_count(&self) -> usize {
        self.rxqs.len()
    }

    pub fn tx_queue_count(&self) -> usize {
        self.txqs.len()
    }

    /// Hardware TX queue used by `worker`.
    pub fn tx_queue_for_worker(&self, worker: u16) -> Option<&TxQueue> {
        match self.tx_queue_limit() {
            0 => None,
            n => self.tx_queue(worker % n),
        }
    }
}
