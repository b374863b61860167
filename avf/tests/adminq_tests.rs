//! Admin queue transport and PF mailbox against a scripted PF.

mod common;

use avf::adminq::{AdminQueue, AqDesc};
use avf::error::{AvfError, Mismatch, TimeoutKind};
use avf::hal::Timer;
use avf::regs::aq;
use avf::trace::Trace;
use avf::virtchnl::msg::VERSION_INFO_LEN;
use avf::virtchnl::{
    LinkSpeed, PfEvent, VersionInfo, VirtchnlOp, AQ_OP_RX_CTL_REG_WRITE, AQ_OP_SEND_TO_PF,
};
use common::{dma_region, FakePf, FakeTimer, Reply};
use dma_pool::IovaTranslate;
use std::sync::Arc;

struct Rig {
    pf: Arc<FakePf>,
    timer: FakeTimer,
    aq: AdminQueue,
    events: Vec<PfEvent>,
}

fn rig() -> Rig {
    let dma = dma_region(1024 * 1024);
    let pf = FakePf::new();
    let mut aq = AdminQueue::alloc(&*dma).unwrap();
    aq.init(&*pf, &IovaTranslate).unwrap();
    Rig {
        pf,
        timer: FakeTimer::new(),
        aq,
        events: Vec::new(),
    }
}

impl Rig {
    fn enqueue(&mut self, opcode: u16, payload: &[u8]) -> avf::Result<AqDesc> {
        let mut d = AqDesc::new(opcode);
        self.aq
            .enqueue(&*self.pf, &self.timer, &Trace::off(), &mut d, payload)?;
        Ok(d)
    }

    fn send(&mut self, op: VirtchnlOp, req: &[u8], out: &mut [u8]) -> avf::Result<usize> {
        self.aq.send_to_pf(
            &*self.pf,
            &self.timer,
            &Trace::off(),
            op,
            req,
            out,
            &mut self.events,
        )
    }

    fn version(&mut self) -> avf::Result<usize> {
        let req = VersionInfo { major: 1, minor: 1 }.encode();
        let mut out = [0u8; VERSION_INFO_LEN];
        self.send(VirtchnlOp::Version, &req, &mut out)
    }
}

// ============================================================================
// ATQ
// ============================================================================

#[test]
fn test_init_programs_both_rings() {
    let r = rig();
    assert_eq!(r.pf.reg(aq::ATQLEN), 64 | aq::LEN_ENABLE);
    assert_eq!(r.pf.reg(aq::ARQLEN), 64 | aq::LEN_ENABLE);
    assert_eq!(r.pf.reg(aq::ARQT), 63);
    assert_ne!(r.pf.reg(aq::ATQBAL), 0);
    assert_eq!(r.aq.atq_next_slot(), 0);
    assert_eq!(r.aq.arq_next_slot(), 0);
}

#[test]
fn test_enqueue_completes() {
    let mut r = rig();
    let d = r.enqueue(AQ_OP_SEND_TO_PF, &[1, 2, 3, 4]).unwrap();
    assert!(d.flags.is_done());
    assert_eq!(r.aq.atq_next_slot(), 1);
    assert_eq!(r.pf.reg(aq::ATQT), 1);
    // one poll interval
    assert_eq!(r.timer.now_us(), 10);
}

#[test]
fn test_atq_timeout_after_five_polls() {
    let mut r = rig();
    r.pf.set_stall_atq(true);

    let err = r.enqueue(AQ_OP_SEND_TO_PF, &[]).unwrap_err();
    assert_eq!(
        err,
        AvfError::Timeout {
            kind: TimeoutKind::AdminQueue,
            opcode: AQ_OP_SEND_TO_PF as u32
        }
    );
    assert_eq!(r.timer.now_us(), 5 * 10);
}

#[test]
fn test_oversized_payload_rejected_before_any_write() {
    let mut r = rig();
    r.pf.clear_writes();

    let err = r.enqueue(AQ_OP_SEND_TO_PF, &[0u8; 513]).unwrap_err();
    assert_eq!(err, AvfError::PayloadTooLarge { len: 513 });
    assert!(r.pf.writes().is_empty());
    assert_eq!(r.aq.atq_next_slot(), 0);
    assert_eq!(r.timer.now_us(), 0);

    // a full slot buffer still fits
    r.enqueue(AQ_OP_SEND_TO_PF, &[0u8; 512]).unwrap();
}

#[test]
fn test_busy_slot_not_reused() {
    let mut r = rig();
    r.pf.set_stall_atq(true);

    for _ in 0..64 {
        assert!(r.enqueue(AQ_OP_SEND_TO_PF, &[]).unwrap_err().is_timeout());
    }
    assert_eq!(r.aq.atq_next_slot(), 0);

    let err = r.enqueue(AQ_OP_SEND_TO_PF, &[]).unwrap_err();
    assert_eq!(err, AvfError::AdminQueueBusy { slot: 0 });
}

#[test]
fn test_cursor_wraps_within_ring() {
    let mut r = rig();
    for i in 0..130u32 {
        let mut d = AqDesc::new(AQ_OP_RX_CTL_REG_WRITE);
        d.param1 = 0xc400;
        d.addr_lo = i;
        r.aq
            .enqueue(&*r.pf, &r.timer, &Trace::off(), &mut d, &[])
            .unwrap();
        assert!(r.aq.atq_next_slot() < 64);
    }
    assert_eq!(r.aq.atq_next_slot(), 130 % 64);
    assert_eq!(r.pf.rx_ctl_writes().len(), 130);
    assert_eq!(r.pf.rx_ctl_writes()[129], (0xc400, 129));
}

#[test]
fn test_atq_error_flag() {
    let mut r = rig();
    r.pf.set_atq_err(true);
    let err = r.enqueue(AQ_OP_RX_CTL_REG_WRITE, &[]).unwrap_err();
    assert_eq!(
        err,
        AvfError::DeviceError {
            opcode: AQ_OP_RX_CTL_REG_WRITE as u32,
            retval: 1
        }
    );
}

// ============================================================================
// Mailbox
// ============================================================================

#[test]
fn test_version_round_trip() {
    let mut r = rig();
    let mut out = [0u8; VERSION_INFO_LEN];
    let req = VersionInfo { major: 1, minor: 1 }.encode();
    let n = r.send(VirtchnlOp::Version, &req, &mut out).unwrap();

    assert_eq!(n, 8);
    assert_eq!(VersionInfo::decode(&out), Some(VersionInfo { major: 1, minor: 1 }));
    assert_eq!(r.pf.request(VirtchnlOp::Version).unwrap(), req.to_vec());
    assert_eq!(r.aq.arq_next_slot(), 1);
    // consumed slot handed back
    assert_eq!(r.pf.reg(aq::ARQT), 0);
}

#[test]
fn test_events_ahead_of_answer_cost_no_retries() {
    let mut r = rig();
    for i in 0..8 {
        r.pf
            .queue_event_before_reply(PfEvent::link_change(i % 2 == 0, LinkSpeed::Speed10Gb));
    }

    assert_eq!(r.version().unwrap(), 8);
    assert_eq!(r.events.len(), 8);
    assert!(r.events[0].link_up);
    assert!(!r.events[1].link_up);
    assert_eq!(r.aq.arq_next_slot(), 9);
    // no PF poll sleep was needed
    assert_eq!(r.timer.now_us(), 10);
}

#[test]
fn test_event_renews_poll_budget() {
    let mut r = rig();
    // Four empty head checks, the event on the fifth, four more empty
    // checks, then the answer: nine misses in total, more than one budget.
    r.pf.set_reply(
        VirtchnlOp::Version,
        Reply::Delayed {
            event: PfEvent::link_change(true, LinkSpeed::Speed25Gb),
            event_on_read: 5,
            answer_on_read: 10,
        },
    );

    assert_eq!(r.version().unwrap(), 8);
    assert_eq!(r.events.len(), 1);
    assert_eq!(r.events[0].link_speed, LinkSpeed::Speed25Gb);
    assert_eq!(r.aq.arq_next_slot(), 2);
    // ATQ poll plus 4 + 4 sleeps around the event
    assert_eq!(r.timer.now_us(), 10 + 8 * 10_000);
}

#[test]
fn test_event_too_late_times_out() {
    let mut r = rig();
    r.pf.set_reply(
        VirtchnlOp::Version,
        Reply::Delayed {
            event: PfEvent::link_change(true, LinkSpeed::Speed25Gb),
            event_on_read: 6,
            answer_on_read: 7,
        },
    );

    assert!(r.version().unwrap_err().is_timeout());
    assert!(r.events.is_empty());
}

#[test]
fn test_arq_cursor_wraps_within_ring() {
    let mut r = rig();
    for _ in 0..70 {
        assert_eq!(r.version().unwrap(), 8);
        assert!(r.aq.arq_next_slot() < 64);
    }
    assert_eq!(r.aq.arq_next_slot(), 70 % 64);
    assert_eq!(r.pf.reg(aq::ARQT), 5);
}

#[test]
fn test_silent_pf_times_out() {
    let mut r = rig();
    r.pf.set_reply(VirtchnlOp::Version, Reply::Silent);

    let err = r.version().unwrap_err();
    assert_eq!(
        err,
        AvfError::Timeout {
            kind: TimeoutKind::PfResponse,
            opcode: VirtchnlOp::Version.as_u32()
        }
    );
    // ATQ poll plus four 10 ms sleeps between five head checks
    assert_eq!(r.timer.now_us(), 10 + 4 * 10_000);
}

#[test]
fn test_answer_to_other_opcode() {
    let mut r = rig();
    r.pf.set_reply(VirtchnlOp::Version, Reply::WrongOpcode(5));

    let err = r.version().unwrap_err();
    assert_eq!(
        err,
        AvfError::ProtocolMismatch(Mismatch::Opcode {
            received: 5,
            expected: VirtchnlOp::Version
        })
    );
    assert_eq!(r.aq.arq_next_slot(), 1);

    // the ring is still usable afterwards
    r.pf.set_reply(VirtchnlOp::Version, Reply::Normal);
    assert_eq!(r.version().unwrap(), 8);
}

#[test]
fn test_pf_return_code() {
    let mut r = rig();
    r.pf.set_reply(VirtchnlOp::Version, Reply::Fail(-5));
    assert_eq!(
        r.version().unwrap_err(),
        AvfError::DeviceError {
            opcode: VirtchnlOp::Version.as_u32(),
            retval: -5
        }
    );
}

#[test]
fn test_answer_truncated_to_capacity() {
    let mut r = rig();
    let body: Vec<u8> = (0..100u8).collect();
    r.pf.set_reply(VirtchnlOp::GetStats, Reply::Payload(body));

    let mut out = [0u8; 8];
    let n = r.send(VirtchnlOp::GetStats, &[], &mut out).unwrap();
    assert_eq!(n, 8);
    assert_eq!(out, [0, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn test_malformed_event() {
    let mut r = rig();
    r.pf.post_raw(VirtchnlOp::Event.as_u32(), 0, &[0u8; 4]);

    let err = r.version().unwrap_err();
    assert_eq!(
        err,
        AvfError::ProtocolMismatch(Mismatch::EventMessage { datalen: 4 })
    );
    assert!(r.events.is_empty());
}
