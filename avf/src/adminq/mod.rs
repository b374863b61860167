//! Admin queue: the VF's mailbox to the PF.
//!
//! Two rings of [`AQ_LEN`] descriptors share one layout. The transmit queue
//! (ATQ) is produced by software and completed by hardware; the receive
//! queue (ARQ) is filled by hardware and re-armed by software. Every slot
//! owns a [`AQ_BUF_SIZE`]-byte buffer for indirect payloads.
//!
//! - [`desc`]: descriptor layout and flags
//! - [`ring`]: ring memory, programming, and ATQ enqueue
//! - [`mailbox`]: virtchnl request/response on top of both rings

pub mod desc;
pub mod mailbox;
pub mod ring;

pub use desc::{AqDesc, AqFlags, AQ_DESC_LEN};
pub use ring::AdminQueue;

/// Descriptors per ring.
pub const AQ_LEN: u16 = 64;

/// Bytes per slot buffer.
pub const AQ_BUF_SIZE: usize = 512;

/// Ring and buffer alignment.
pub const AQ_ALIGN: usize = 64;

/// ATQ completion poll: delay between checks.
pub const ATQ_POLL_DELAY_US: u64 = 10;
/// ATQ completion poll: number of checks.
pub const ATQ_POLL_RETRIES: u32 = 5;

/// PF response poll: delay between head checks.
pub const PF_POLL_DELAY_MS: u64 = 10;
/// PF response poll: number of head checks.
pub const PF_POLL_RETRIES: u32 = 5;
