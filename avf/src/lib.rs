//! Intel Adaptive Virtual Function (AVF) driver.
//!
//! Control plane for an SR-IOV virtual function on Intel 700/800 series
//! NICs. The VF talks to its physical function through the admin queue
//! mailbox (virtchnl); this crate brings the VF from reset to a
//! traffic-ready state and supervises it afterwards.
//!
//! # Layout
//!
//! - [`adminq`]: admin send/receive rings and the PF request/response
//!   mailbox
//! - [`virtchnl`]: virtchnl opcodes and message layouts
//! - [`device`]: per-VF state, bring-up sequence, virtchnl operations
//! - [`queue`]: RX/TX descriptor rings
//! - [`irq`], [`process`]: interrupt entry points and the supervisor
//! - [`context`]: [`AvfMain`], the device pool with create/delete
//!
//! Hardware access goes through [`hal::RegisterIo`] and [`hal::Timer`];
//! DMA memory and packet buffers come from the `dma-pool` crate.
//!
//! # Usage
//!
//! ```ignore
//! let mut avf = AvfMain::new(AvfConfig::default(), dma, buffers, timer, notifier);
//! let args = CreateIfArgs::new(pci, 0x8086, 0x1889, bar0, xlate);
//! let dev_instance = avf.create_if(args)?;
//! avf.admin_up_down(dev_instance, true)?;
//! avf.run_process();
//! ```

#![no_std]
#![allow(dead_code)]

extern crate alloc;

pub mod adminq;
pub mod class;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod hal;
pub mod irq;
pub mod notify;
pub mod process;
pub mod queue;
pub mod regs;
pub mod trace;
pub mod virtchnl;

pub use class::{AvfClass, DeviceClass};
pub use config::{AvfConfig, CreateIfArgs, PciAddress};
pub use context::AvfMain;
pub use device::{AvfDevice, DeviceFlags, Env, InitStage};
pub use error::{AvfError, Result};
pub use hal::{RegisterIo, Timer};
pub use irq::IrqHandler;
pub use notify::{HwIfFlags, InterfaceNotifier};
pub use process::{ProcessEvent, ProcessSignal, ProcessState};
pub use virtchnl::{LinkSpeed, PfEvent, PfEventKind, VirtchnlOp};
