//! Virtchnl message payloads.
//!
//! All payloads are packed little-endian structures. Requests are encoded
//! into byte vectors that go straight into an ATQ slot buffer; responses are
//! decoded from the bytes copied out of an ARQ slot buffer.

use alloc::vec::Vec;

use smoltcp::wire::EthernetAddress;

// ═══════════════════════════════════════════════════════════════════════════
// WIRE SIZES
// ═══════════════════════════════════════════════════════════════════════════

pub const VERSION_INFO_LEN: usize = 8;
pub const VF_RESOURCE_HDR_LEN: usize = 20;
pub const VSI_RESOURCE_LEN: usize = 16;
/// Resource reply with room for exactly one VSI.
pub const VF_RESOURCE_LEN: usize = VF_RESOURCE_HDR_LEN + VSI_RESOURCE_LEN;
pub const PROMISC_INFO_LEN: usize = 4;
pub const VSI_QUEUE_CONFIG_HDR_LEN: usize = 8;
pub const TXQ_INFO_LEN: usize = 24;
pub const RXQ_INFO_LEN: usize = 40;
pub const QUEUE_PAIR_INFO_LEN: usize = TXQ_INFO_LEN + RXQ_INFO_LEN;
pub const IRQ_MAP_HDR_LEN: usize = 2;
pub const VECTOR_MAP_LEN: usize = 12;
pub const ETHER_ADDR_LIST_HDR_LEN: usize = 4;
pub const ETHER_ADDR_LEN: usize = 8;
pub const QUEUE_SELECT_LEN: usize = 12;
pub const ETH_STATS_LEN: usize = 12 * 8;
pub const PF_EVENT_LEN: usize = 16;

// ═══════════════════════════════════════════════════════════════════════════
// LE HELPERS
// ═══════════════════════════════════════════════════════════════════════════

#[inline]
fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

#[inline]
fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

#[inline]
fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(b)
}

#[inline]
fn get_u64(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}

// ═══════════════════════════════════════════════════════════════════════════
// VERSION / RESOURCES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
}

impl VersionInfo {
    pub fn encode(&self) -> [u8; VERSION_INFO_LEN] {
        let mut b = [0u8; VERSION_INFO_LEN];
        put_u32(&mut b, 0, self.major);
        put_u32(&mut b, 4, self.minor);
        b
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < VERSION_INFO_LEN {
            return None;
        }
        Some(Self {
            major: get_u32(buf, 0),
            minor: get_u32(buf, 4),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsiResource {
    pub vsi_id: u16,
    pub num_queue_pairs: u16,
    pub vsi_type: u32,
    pub qset_handle: u16,
    pub default_mac: EthernetAddress,
}

impl VsiResource {
    fn decode(buf: &[u8]) -> Self {
        Self {
            vsi_id: get_u16(buf, 0),
            num_queue_pairs: get_u16(buf, 2),
            vsi_type: get_u32(buf, 4),
            qset_handle: get_u16(buf, 8),
            default_mac: EthernetAddress::from_bytes(&buf[10..16]),
        }
    }

    pub fn encode_into(&self, buf: &mut [u8]) {
        put_u16(buf, 0, self.vsi_id);
        put_u16(buf, 2, self.num_queue_pairs);
        put_u32(buf, 4, self.vsi_type);
        put_u16(buf, 8, self.qset_handle);
        buf[10..16].copy_from_slice(self.default_mac.as_bytes());
    }
}

/// GET_VF_RESOURCES reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VfResource {
    pub num_vsis: u16,
    pub num_queue_pairs: u16,
    pub max_vectors: u16,
    pub max_mtu: u16,
    pub vf_offload_flags: u32,
    pub rss_key_size: u32,
    pub rss_lut_size: u32,
    /// VSIs present in the received bytes (may be fewer than `num_vsis`).
    pub vsi_res: Vec<VsiResource>,
}

impl VfResource {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < VF_RESOURCE_HDR_LEN {
            return None;
        }
        let num_vsis = get_u16(buf, 0);
        let vsi_res = buf[VF_RESOURCE_HDR_LEN..]
            .chunks_exact(VSI_RESOURCE_LEN)
            .take(num_vsis as usize)
            .map(VsiResource::decode)
            .collect();
        Some(Self {
            num_vsis,
            num_queue_pairs: get_u16(buf, 2),
            max_vectors: get_u16(buf, 4),
            max_mtu: get_u16(buf, 6),
            vf_offload_flags: get_u32(buf, 8),
            rss_key_size: get_u32(buf, 12),
            rss_lut_size: get_u32(buf, 16),
            vsi_res,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = alloc::vec![0u8; VF_RESOURCE_HDR_LEN + self.vsi_res.len() * VSI_RESOURCE_LEN];
        put_u16(&mut b, 0, self.num_vsis);
        put_u16(&mut b, 2, self.num_queue_pairs);
        put_u16(&mut b, 4, self.max_vectors);
        put_u16(&mut b, 6, self.max_mtu);
        put_u32(&mut b, 8, self.vf_offload_flags);
        put_u32(&mut b, 12, self.rss_key_size);
        put_u32(&mut b, 16, self.rss_lut_size);
        for (i, vsi) in self.vsi_res.iter().enumerate() {
            let off = VF_RESOURCE_HDR_LEN + i * VSI_RESOURCE_LEN;
            vsi.encode_into(&mut b[off..off + VSI_RESOURCE_LEN]);
        }
        b
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION REQUESTS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromiscInfo {
    pub vsi_id: u16,
    pub flags: u16,
}

impl PromiscInfo {
    pub fn encode(&self) -> [u8; PROMISC_INFO_LEN] {
        let mut b = [0u8; PROMISC_INFO_LEN];
        put_u16(&mut b, 0, self.vsi_id);
        put_u16(&mut b, 2, self.flags);
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxqInfo {
    pub vsi_id: u16,
    pub queue_id: u16,
    pub ring_len: u16,
    pub headwb_enabled: u16,
    pub dma_ring_addr: u64,
    pub dma_headwb_addr: u64,
}

impl TxqInfo {
    fn encode_into(&self, b: &mut [u8]) {
        put_u16(b, 0, self.vsi_id);
        put_u16(b, 2, self.queue_id);
        put_u16(b, 4, self.ring_len);
        put_u16(b, 6, self.headwb_enabled);
        put_u64(b, 8, self.dma_ring_addr);
        put_u64(b, 16, self.dma_headwb_addr);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxqInfo {
    pub vsi_id: u16,
    pub queue_id: u16,
    pub ring_len: u32,
    pub hdr_size: u16,
    pub splithdr_enabled: u16,
    pub databuffer_size: u32,
    pub max_pkt_size: u32,
    pub dma_ring_addr: u64,
    pub rx_split_pos: u32,
}

impl RxqInfo {
    fn encode_into(&self, b: &mut [u8]) {
        put_u16(b, 0, self.vsi_id);
        put_u16(b, 2, self.queue_id);
        put_u32(b, 4, self.ring_len);
        put_u16(b, 8, self.hdr_size);
        put_u16(b, 10, self.splithdr_enabled);
        put_u32(b, 12, self.databuffer_size);
        put_u32(b, 16, self.max_pkt_size);
        put_u64(b, 24, self.dma_ring_addr);
        put_u32(b, 32, self.rx_split_pos);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueuePairInfo {
    pub txq: TxqInfo,
    pub rxq: RxqInfo,
}

/// CONFIG_VSI_QUEUES request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VsiQueueConfig {
    pub vsi_id: u16,
    pub qpair: Vec<QueuePairInfo>,
}

impl VsiQueueConfig {
    pub fn encoded_len(&self) -> usize {
        VSI_QUEUE_CONFIG_HDR_LEN + self.qpair.len() * QUEUE_PAIR_INFO_LEN
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut b = alloc::vec![0u8; self.encoded_len()];
        put_u16(&mut b, 0, self.vsi_id);
        put_u16(&mut b, 2, self.qpair.len() as u16);
        for (i, qp) in self.qpair.iter().enumerate() {
            let off = VSI_QUEUE_CONFIG_HDR_LEN + i * QUEUE_PAIR_INFO_LEN;
            qp.txq.encode_into(&mut b[off..off + TXQ_INFO_LEN]);
            qp.rxq
                .encode_into(&mut b[off + TXQ_INFO_LEN..off + QUEUE_PAIR_INFO_LEN]);
        }
        b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VectorMap {
    pub vsi_id: u16,
    pub vector_id: u16,
    pub rxq_map: u16,
    pub txq_map: u16,
    pub rxitr_idx: u16,
    pub txitr_idx: u16,
}

/// CONFIG_IRQ_MAP request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrqMapInfo {
    pub vecmap: Vec<VectorMap>,
}

impl IrqMapInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut b = alloc::vec![0u8; IRQ_MAP_HDR_LEN + self.vecmap.len() * VECTOR_MAP_LEN];
        put_u16(&mut b, 0, self.vecmap.len() as u16);
        for (i, v) in self.vecmap.iter().enumerate() {
            let off = IRQ_MAP_HDR_LEN + i * VECTOR_MAP_LEN;
            put_u16(&mut b, off, v.vsi_id);
            put_u16(&mut b, off + 2, v.vector_id);
            put_u16(&mut b, off + 4, v.rxq_map);
            put_u16(&mut b, off + 6, v.txq_map);
            put_u16(&mut b, off + 8, v.rxitr_idx);
            put_u16(&mut b, off + 10, v.txitr_idx);
        }
        b
    }
}

/// ADD_ETH_ADDR / DEL_ETH_ADDR request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EtherAddrList {
    pub vsi_id: u16,
    pub list: Vec<EthernetAddress>,
}

impl EtherAddrList {
    pub fn encode(&self) -> Vec<u8> {
        let mut b = alloc::vec![0u8; ETHER_ADDR_LIST_HDR_LEN + self.list.len() * ETHER_ADDR_LEN];
        put_u16(&mut b, 0, self.vsi_id);
        put_u16(&mut b, 2, self.list.len() as u16);
        for (i, addr) in self.list.iter().enumerate() {
            let off = ETHER_ADDR_LIST_HDR_LEN + i * ETHER_ADDR_LEN;
            b[off..off + 6].copy_from_slice(addr.as_bytes());
        }
        b
    }
}

/// ENABLE_QUEUES / DISABLE_QUEUES / GET_STATS request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueSelect {
    pub vsi_id: u16,
    pub rx_queues: u32,
    pub tx_queues: u32,
}

impl QueueSelect {
    pub fn encode(&self) -> [u8; QUEUE_SELECT_LEN] {
        let mut b = [0u8; QUEUE_SELECT_LEN];
        put_u16(&mut b, 0, self.vsi_id);
        put_u32(&mut b, 4, self.rx_queues);
        put_u32(&mut b, 8, self.tx_queues);
        b
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < QUEUE_SELECT_LEN {
            return None;
        }
        Some(Self {
            vsi_id: get_u16(buf, 0),
            rx_queues: get_u32(buf, 4),
            tx_queues: get_u32(buf, 8),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STATISTICS
// ═══════════════════════════════════════════════════════════════════════════

/// GET_STATS reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EthStats {
    pub rx_bytes: u64,
    pub rx_unicast: u64,
    pub rx_multicast: u64,
    pub rx_broadcast: u64,
    pub rx_discards: u64,
    pub rx_unknown_protocol: u64,
    pub tx_bytes: u64,
    pub tx_unicast: u64,
    pub tx_multicast: u64,
    pub tx_broadcast: u64,
    pub tx_discards: u64,
    pub tx_errors: u64,
}

impl EthStats {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < ETH_STATS_LEN {
            return None;
        }
        let q = |i: usize| get_u64(buf, i * 8);
        Some(Self {
            rx_bytes: q(0),
            rx_unicast: q(1),
            rx_multicast: q(2),
            rx_broadcast: q(3),
            rx_discards: q(4),
            rx_unknown_protocol: q(5),
            tx_bytes: q(6),
            tx_unicast: q(7),
            tx_multicast: q(8),
            tx_broadcast: q(9),
            tx_discards: q(10),
            tx_errors: q(11),
        })
    }

    pub fn encode(&self) -> [u8; ETH_STATS_LEN] {
        let mut b = [0u8; ETH_STATS_LEN];
        let fields = [
            self.rx_bytes,
            self.rx_unicast,
            self.rx_multicast,
            self.rx_broadcast,
            self.rx_discards,
            self.rx_unknown_protocol,
            self.tx_bytes,
            self.tx_unicast,
            self.tx_multicast,
            self.tx_broadcast,
            self.tx_discards,
            self.tx_errors,
        ];
        for (i, v) in fields.iter().enumerate() {
            put_u64(&mut b, i * 8, *v);
        }
        b
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PF EVENTS
// ═══════════════════════════════════════════════════════════════════════════

/// Virtchnl link speed encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkSpeed {
    #[default]
    Unknown,
    Speed100Mb,
    Speed1Gb,
    Speed10Gb,
    Speed40Gb,
    Speed20Gb,
    Speed25Gb,
}

impl LinkSpeed {
    pub fn from_u32(v: u32) -> Self {
        match v {
            0x02 => Self::Speed100Mb,
            0x04 => Self::Speed1Gb,
            0x08 => Self::Speed10Gb,
            0x10 => Self::Speed40Gb,
            0x20 => Self::Speed20Gb,
            0x40 => Self::Speed25Gb,
            _ => Self::Unknown,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Speed100Mb => 0x02,
            Self::Speed1Gb => 0x04,
            Self::Speed10Gb => 0x08,
            Self::Speed40Gb => 0x10,
            Self::Speed20Gb => 0x20,
            Self::Speed25Gb => 0x40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Attention,
    ActionRequired,
    CertainDoom,
    Other(i32),
}

impl Severity {
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => Self::Info,
            1 => Self::Attention,
            2 => Self::ActionRequired,
            255 => Self::CertainDoom,
            other => Self::Other(other),
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Info => 0,
            Self::Attention => 1,
            Self::ActionRequired => 2,
            Self::CertainDoom => 255,
            Self::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PfEventKind {
    LinkChange,
    ResetImpending,
    PfDriverClose,
    Unknown(u32),
}

impl PfEventKind {
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::LinkChange,
            2 => Self::ResetImpending,
            3 => Self::PfDriverClose,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::LinkChange => 1,
            Self::ResetImpending => 2,
            Self::PfDriverClose => 3,
            Self::Unknown(v) => v,
        }
    }
}

/// Unsolicited PF → VF notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfEvent {
    pub kind: PfEventKind,
    pub link_speed: LinkSpeed,
    pub link_up: bool,
    pub severity: Severity,
}

impl PfEvent {
    pub fn link_change(up: bool, speed: LinkSpeed) -> Self {
        Self {
            kind: PfEventKind::LinkChange,
            link_speed: speed,
            link_up: up,
            severity: Severity::Info,
        }
    }

    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < PF_EVENT_LEN {
            return None;
        }
        Some(Self {
            kind: PfEventKind::from_u32(get_u32(buf, 0)),
            link_speed: LinkSpeed::from_u32(get_u32(buf, 4)),
            link_up: buf[8] != 0,
            severity: Severity::from_i32(get_u32(buf, 12) as i32),
        })
    }

    pub fn encode(&self) -> [u8; PF_EVENT_LEN] {
        let mut b = [0u8; PF_EVENT_LEN];
        put_u32(&mut b, 0, self.kind.as_u32());
        put_u32(&mut b, 4, self.link_speed.as_u32());
        b[8] = self.link_up as u8;
        put_u32(&mut b, 12, self.severity.as_i32() as u32);
        b
    }
}
