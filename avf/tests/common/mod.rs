//! Common test utilities: a scripted PF behind fake registers, a virtual
//! clock and DMA/buffer pools over leaked host memory.

#![allow(dead_code)]

use std::alloc::{alloc_zeroed, Layout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use avf::adminq::{AqDesc, AqFlags, AQ_DESC_LEN, AQ_LEN};
use avf::config::{CreateIfArgs, PciAddress};
use avf::error::Result;
use avf::hal::{RegisterIo, Timer};
use avf::notify::{HwIfFlags, InterfaceNotifier};
use avf::regs::{aq, rstat};
use avf::virtchnl::msg::VsiResource;
use avf::virtchnl::{
    EthStats, PfEvent, QueueSelect, VersionInfo, VfResource, VirtchnlOp, AQ_OP_SEND_TO_PF,
    AQ_OP_SEND_TO_VF, AQ_OP_RX_CTL_REG_WRITE, VSI_SRIOV,
};
use avf::{AvfConfig, AvfMain};
use dma_pool::{
    BufferAllocator, BufferIndex, DmaAllocator, IovaTranslate, MemoryRegion, PacketPool,
    RegionAllocator,
};
use smoltcp::wire::EthernetAddress;

pub const VSI_ID: u16 = 3;
pub const MAC: EthernetAddress = EthernetAddress([0x02, 0x00, 0x5e, 0x10, 0x20, 0x30]);
pub const PCI: PciAddress = PciAddress::new(0, 0x3b, 2, 1);

// ============================================================================
// Fake PF
// ============================================================================

/// How the fake PF answers one virtchnl opcode.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Default answer for the opcode.
    Normal,
    /// Answer with a nonzero return code.
    Fail(i32),
    /// Answer as if it were another opcode.
    WrongOpcode(u32),
    /// Never answer.
    Silent,
    /// Answer with exactly these bytes.
    Payload(Vec<u8>),
    /// Stay quiet at first: post `event` on ARQH read number `event_on_read`
    /// and the normal answer on read number `answer_on_read`, counting
    /// reads from the request.
    Delayed {
        event: PfEvent,
        event_on_read: u32,
        answer_on_read: u32,
    },
}

/// Something the fake PF posts on the ARQ once enough ARQH reads went by.
#[derive(Debug, Clone, Copy)]
enum Posting {
    Event(PfEvent),
    Answer(u32),
}

struct PfState {
    regs: HashMap<u32, u32>,
    writes: Vec<(u32, u32)>,
    atq_head: u16,
    arq_head: u16,

    /// Complete no ATQ descriptor.
    stall_atq: bool,
    /// Complete ATQ descriptors with ERR.
    atq_err: bool,
    /// RSTAT state after a VF reset.
    rstat_after_reset: u32,

    version: VersionInfo,
    resources: VfResource,
    stats: EthStats,
    replies: HashMap<u32, Reply>,
    /// Events posted ahead of the next answer.
    events_before_reply: Vec<PfEvent>,

    /// ARQH reads since the last request.
    arqh_reads: u32,
    /// Postings held back until a given ARQH read.
    scheduled: Vec<(u32, Posting)>,

    ops: Vec<u32>,
    requests: Vec<(u32, Vec<u8>)>,
    rx_ctl: Vec<(u32, u32)>,
}

/// Register space of a VF whose PF answers from a script.
///
/// Descriptor rings are read and written directly at the addresses
/// programmed into the base registers, so it only works with IOVA (identity)
/// addressing.
pub struct FakePf {
    state: Mutex<PfState>,
}

pub fn default_resources(num_queue_pairs: u16) -> VfResource {
    VfResource {
        num_vsis: 1,
        num_queue_pairs,
        max_vectors: 5,
        max_mtu: 9000,
        vf_offload_flags: 0x0003_0039,
        rss_key_size: 52,
        rss_lut_size: 64,
        vsi_res: vec![VsiResource {
            vsi_id: VSI_ID,
            num_queue_pairs,
            vsi_type: VSI_SRIOV,
            qset_handle: 0,
            default_mac: MAC,
        }],
    }
}

impl FakePf {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PfState {
                regs: HashMap::new(),
                writes: Vec::new(),
                atq_head: 0,
                arq_head: 0,
                stall_atq: false,
                atq_err: false,
                rstat_after_reset: rstat::VFR_VFACTIVE,
                version: VersionInfo { major: 1, minor: 1 },
                resources: default_resources(4),
                stats: EthStats {
                    rx_bytes: 1500,
                    rx_unicast: 1,
                    tx_bytes: 64,
                    tx_unicast: 1,
                    ..Default::default()
                },
                replies: HashMap::new(),
                events_before_reply: Vec::new(),
                arqh_reads: 0,
                scheduled: Vec::new(),
                ops: Vec::new(),
                requests: Vec::new(),
                rx_ctl: Vec::new(),
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PfState> {
        self.state.lock().unwrap()
    }

    // Script

    pub fn set_version(&self, major: u32, minor: u32) {
        self.lock().version = VersionInfo { major, minor };
    }

    pub fn set_resources(&self, res: VfResource) {
        self.lock().resources = res;
    }

    pub fn set_stats(&self, stats: EthStats) {
        self.lock().stats = stats;
    }

    pub fn set_reply(&self, op: VirtchnlOp, reply: Reply) {
        self.lock().replies.insert(op.as_u32(), reply);
    }

    pub fn set_stall_atq(&self, stall: bool) {
        self.lock().stall_atq = stall;
    }

    pub fn set_atq_err(&self, err: bool) {
        self.lock().atq_err = err;
    }

    pub fn set_rstat_after_reset(&self, state: u32) {
        self.lock().rstat_after_reset = state;
    }

    pub fn queue_event_before_reply(&self, e: PfEvent) {
        self.lock().events_before_reply.push(e);
    }

    pub fn set_reg(&self, reg: u32, val: u32) {
        self.lock().regs.insert(reg, val);
    }

    /// Post an event on the ARQ right now.
    pub fn post_event(&self, e: PfEvent) {
        let mut st = self.lock();
        st.post(VirtchnlOp::Event.as_u32(), 0, &e.encode());
    }

    /// Post an arbitrary message on the ARQ right now.
    pub fn post_raw(&self, v_opcode: u32, v_retval: i32, payload: &[u8]) {
        self.lock().post(v_opcode, v_retval, payload);
    }

    // Observation

    pub fn reg(&self, reg: u32) -> u32 {
        self.lock().regs.get(&reg).copied().unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.lock().writes.clone()
    }

    pub fn writes_to(&self, reg: u32) -> Vec<u32> {
        self.lock()
            .writes
            .iter()
            .filter(|(r, _)| *r == reg)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Virtchnl opcodes received, in order (RESET_VF included).
    pub fn ops(&self) -> Vec<u32> {
        self.lock().ops.clone()
    }

    pub fn request(&self, op: VirtchnlOp) -> Option<Vec<u8>> {
        self.lock()
            .requests
            .iter()
            .rev()
            .find(|(o, _)| *o == op.as_u32())
            .map(|(_, b)| b.clone())
    }

    pub fn rx_ctl_writes(&self) -> Vec<(u32, u32)> {
        self.lock().rx_ctl.clone()
    }
}

fn read_desc(base: u64, slot: u16) -> AqDesc {
    let mut b = [0u8; AQ_DESC_LEN];
    let p = (base as usize + slot as usize * AQ_DESC_LEN) as *const u8;
    unsafe { std::ptr::copy_nonoverlapping(p, b.as_mut_ptr(), AQ_DESC_LEN) };
    AqDesc::from_bytes(&b)
}

fn write_desc(base: u64, slot: u16, d: &AqDesc) {
    let p = (base as usize + slot as usize * AQ_DESC_LEN) as *mut u8;
    unsafe { std::ptr::copy_nonoverlapping(d.to_bytes().as_ptr(), p, AQ_DESC_LEN) };
}

impl PfState {
    fn reg(&self, reg: u32) -> u32 {
        self.regs.get(&reg).copied().unwrap_or(0)
    }

    fn base(&self, lo: u32, hi: u32) -> u64 {
        ((self.reg(hi) as u64) << 32) | self.reg(lo) as u64
    }

    fn enabled(&self, len_reg: u32) -> bool {
        self.reg(len_reg) & aq::LEN_ENABLE != 0
    }

    fn post(&mut self, v_opcode: u32, v_retval: i32, payload: &[u8]) {
        let base = self.base(aq::ARQBAL, aq::ARQBAH);
        let slot = self.arq_head;
        let mut d = read_desc(base, slot);
        assert!(payload.len() <= d.datalen as usize, "payload larger than posted buffer");
        if !payload.is_empty() {
            let p = d.addr() as usize as *mut u8;
            unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), p, payload.len()) };
            d.flags = AqFlags::DONE | AqFlags::BUF;
        } else {
            d.flags = AqFlags::DONE;
        }
        d.opcode = AQ_OP_SEND_TO_VF;
        d.datalen = payload.len() as u16;
        d.v_opcode = v_opcode;
        d.v_retval = v_retval;
        write_desc(base, slot, &d);

        self.arq_head = (slot + 1) % AQ_LEN;
        self.regs.insert(aq::ARQH, self.arq_head as u32);
    }

    fn run_atq(&mut self, tail: u16) {
        if !self.enabled(aq::ATQLEN) || self.stall_atq {
            return;
        }
        let base = self.base(aq::ATQBAL, aq::ATQBAH);
        // A reset in the middle of the batch disables the queue.
        while self.atq_head != tail && self.enabled(aq::ATQLEN) {
            let slot = self.atq_head;
            let mut d = read_desc(base, slot);
            let payload = if d.flags.contains(AqFlags::BUF) {
                let mut b = vec![0u8; d.datalen as usize];
                let p = d.addr() as usize as *const u8;
                unsafe { std::ptr::copy_nonoverlapping(p, b.as_mut_ptr(), b.len()) };
                b
            } else {
                Vec::new()
            };

            d.flags |= AqFlags::DONE;
            if self.atq_err {
                d.flags |= AqFlags::ERR;
                d.retval = 1;
            }
            write_desc(base, slot, &d);
            self.atq_head = (slot + 1) % AQ_LEN;
            self.regs.insert(aq::ATQH, self.atq_head as u32);

            if self.atq_err {
                continue;
            }
            match d.opcode {
                AQ_OP_SEND_TO_PF => self.handle_virtchnl(d.v_opcode, payload),
                AQ_OP_RX_CTL_REG_WRITE => self.rx_ctl.push((d.param1, d.addr_lo)),
                _ => {}
            }
        }
    }

    fn handle_virtchnl(&mut self, v_opcode: u32, payload: Vec<u8>) {
        self.ops.push(v_opcode);
        self.requests.push((v_opcode, payload));

        if v_opcode == VirtchnlOp::ResetVf.as_u32() {
            // The reset wipes the admin queue configuration.
            for reg in [aq::ATQLEN, aq::ARQLEN, aq::ATQH, aq::ARQH, aq::ATQT, aq::ARQT] {
                self.regs.insert(reg, 0);
            }
            self.atq_head = 0;
            self.arq_head = 0;
            self.regs.insert(rstat::VFGEN_RSTAT, self.rstat_after_reset);
            return;
        }

        for e in std::mem::take(&mut self.events_before_reply) {
            self.post(VirtchnlOp::Event.as_u32(), 0, &e.encode());
        }

        let reply = self
            .replies
            .get(&v_opcode)
            .cloned()
            .unwrap_or(Reply::Normal);
        match reply {
            Reply::Silent => {}
            Reply::Fail(rv) => self.post(v_opcode, rv, &[]),
            Reply::WrongOpcode(other) => self.post(other, 0, &[]),
            Reply::Payload(b) => self.post(v_opcode, 0, &b),
            Reply::Normal => self.answer(v_opcode),
            Reply::Delayed {
                event,
                event_on_read,
                answer_on_read,
            } => {
                self.arqh_reads = 0;
                self.scheduled.push((event_on_read, Posting::Event(event)));
                self.scheduled.push((answer_on_read, Posting::Answer(v_opcode)));
            }
        }
    }

    fn answer(&mut self, v_opcode: u32) {
        let body = match VirtchnlOp::from_u32(v_opcode) {
            Some(VirtchnlOp::Version) => self.version.encode().to_vec(),
            Some(VirtchnlOp::GetVfResources) => self.resources.encode(),
            Some(VirtchnlOp::GetStats) => self.stats.encode().to_vec(),
            _ => Vec::new(),
        };
        self.post(v_opcode, 0, &body);
    }

    /// Count one ARQH read and post whatever became due.
    fn arqh_read(&mut self) {
        self.arqh_reads += 1;
        let now = self.arqh_reads;
        let (due, later): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|(at, _)| *at <= now);
        self.scheduled = later;
        for (_, p) in due {
            match p {
                Posting::Event(e) => self.post(VirtchnlOp::Event.as_u32(), 0, &e.encode()),
                Posting::Answer(op) => self.answer(op),
            }
        }
    }
}

impl RegisterIo for FakePf {
    fn read(&self, reg: u32) -> u32 {
        let mut st = self.lock();
        if reg == aq::ARQH {
            st.arqh_read();
        }
        st.reg(reg)
    }

    fn write(&self, reg: u32, val: u32) {
        let mut st = self.lock();
        st.writes.push((reg, val));
        st.regs.insert(reg, val);
        match reg {
            aq::ATQH => st.atq_head = val as u16 % AQ_LEN,
            aq::ARQH => st.arq_head = val as u16 % AQ_LEN,
            aq::ATQT => st.run_atq(val as u16 % AQ_LEN),
            _ => {}
        }
        // Hardware keeps ARQH as its own.
        let arq_head = st.arq_head as u32;
        st.regs.insert(aq::ARQH, arq_head);
    }
}

/// Decode the queue selection of an ENABLE_QUEUES request.
pub fn queue_select(b: &[u8]) -> QueueSelect {
    QueueSelect::decode(b).unwrap()
}

// ============================================================================
// Clock
// ============================================================================

/// Virtual clock: delays advance it, nothing sleeps.
#[derive(Clone, Default)]
pub struct FakeTimer {
    now: Arc<AtomicU64>,
}

impl FakeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, us: u64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }
}

impl Timer for FakeTimer {
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn delay_us(&self, us: u64) {
        self.advance(us);
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Region allocator over leaked host memory, bus address = CPU address.
pub fn dma_region(size: usize) -> Arc<RegionAllocator> {
    let layout = Layout::from_size_align(size, 4096).unwrap();
    let base = unsafe { alloc_zeroed(layout) } as usize;
    Arc::new(unsafe { RegionAllocator::new(MemoryRegion::new(base, size), base as u64) }.unwrap())
}

/// Packet pool shared between the driver and the test.
#[derive(Clone)]
pub struct SharedPool(pub Arc<Mutex<PacketPool>>);

impl SharedPool {
    pub fn new(dma: &dyn DmaAllocator, count: usize, buffer_size: usize) -> Self {
        let mem = dma.alloc(count * buffer_size, 4096).unwrap();
        Self(Arc::new(Mutex::new(PacketPool::new(mem, buffer_size).unwrap())))
    }

    pub fn available(&self) -> usize {
        self.0.lock().unwrap().available()
    }

    pub fn total(&self) -> usize {
        self.0.lock().unwrap().total()
    }
}

impl BufferAllocator for SharedPool {
    fn alloc(&mut self, out: &mut [BufferIndex]) -> usize {
        self.0.lock().unwrap().alloc(out)
    }

    fn free(&mut self, bufs: &[BufferIndex]) {
        self.0.lock().unwrap().free(bufs)
    }

    fn data_ptr(&self, idx: BufferIndex) -> Option<*mut u8> {
        self.0.lock().unwrap().data_ptr(idx)
    }

    fn buffer_size(&self) -> usize {
        self.0.lock().unwrap().buffer_size()
    }
}

// ============================================================================
// Interface layer
// ============================================================================

#[derive(Default)]
pub struct NotifierLog {
    pub registered: Vec<(u32, EthernetAddress)>,
    pub unregistered: Vec<u32>,
    pub flags: Vec<(u32, HwIfFlags)>,
    pub events: Vec<(u32, PfEvent)>,
    pub refuse_register: bool,
}

/// Interface layer that records every call.
#[derive(Clone, Default)]
pub struct RecordingNotifier(pub Arc<Mutex<NotifierLog>>);

impl RecordingNotifier {
    pub fn log(&self) -> std::sync::MutexGuard<'_, NotifierLog> {
        self.0.lock().unwrap()
    }

    pub fn last_flags(&self) -> Option<HwIfFlags> {
        self.log().flags.last().map(|(_, f)| *f)
    }
}

impl InterfaceNotifier for RecordingNotifier {
    fn register_interface(&mut self, dev_instance: u32, hwaddr: EthernetAddress) -> Result<u32> {
        let mut log = self.log();
        if log.refuse_register {
            return Err(avf::AvfError::InterfaceRegistration);
        }
        log.registered.push((dev_instance, hwaddr));
        Ok(100 + dev_instance)
    }

    fn unregister_interface(&mut self, hw_if_index: u32) {
        self.log().unregistered.push(hw_if_index);
    }

    fn set_flags(&mut self, hw_if_index: u32, flags: HwIfFlags) {
        self.log().flags.push((hw_if_index, flags));
    }

    fn pf_event(&mut self, dev_instance: u32, event: &PfEvent) {
        self.log().events.push((dev_instance, *event));
    }
}

// ============================================================================
// Harness
// ============================================================================

/// One driver context with handles on everything it was given.
pub struct Harness {
    pub avf: AvfMain,
    pub pf: Arc<FakePf>,
    pub timer: FakeTimer,
    pub dma: Arc<RegionAllocator>,
    pub pool: SharedPool,
    pub notifier: RecordingNotifier,
}

pub const POOL_BUFFERS: usize = 1024;
pub const POOL_BUFFER_SIZE: usize = 2048;

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AvfConfig::default())
    }

    pub fn with_config(config: AvfConfig) -> Self {
        let dma = dma_region(8 * 1024 * 1024);
        let pool = SharedPool::new(&*dma, POOL_BUFFERS, POOL_BUFFER_SIZE);
        let timer = FakeTimer::new();
        let notifier = RecordingNotifier::default();
        let avf = AvfMain::new(
            config,
            Box::new(dma.clone()),
            Box::new(pool.clone()),
            Box::new(timer.clone()),
            Box::new(notifier.clone()),
        );
        Self {
            avf,
            pf: FakePf::new(),
            timer,
            dma,
            pool,
            notifier,
        }
    }

    pub fn args(&self) -> CreateIfArgs {
        CreateIfArgs::new(
            PCI,
            0x8086,
            0x1889,
            self.pf.clone(),
            Arc::new(IovaTranslate),
        )
    }

    /// Bytes the driver holds, not counting the packet pool itself.
    pub fn driver_bytes(&self) -> usize {
        self.dma.bytes_in_use() - POOL_BUFFERS * POOL_BUFFER_SIZE
    }

    pub fn try_create(&mut self) -> Result<u32> {
        let args = self.args();
        self.avf.create_if(args)
    }

    pub fn create(&mut self) -> u32 {
        self.try_create().unwrap()
    }
}
