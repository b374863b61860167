//! Driver context: the device pool and its collaborators.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use dma_pool::{BufferAllocator, DmaAllocator};
use log::{error, info};

use crate::adminq::AdminQueue;
use crate::class::{AvfClass, DeviceClass};
use crate::config::{AvfConfig, CreateIfArgs};
use crate::device::{AvfDevice, Env};
use crate::error::{AvfError, Resource, Result};
use crate::hal::Timer;
use crate::irq::{irq_0_disable, irq_n_disable, IrqHandler};
use crate::notify::{HwIfFlags, InterfaceNotifier};
use crate::process::{ProcessEvent, ProcessSignal, ProcessState};

/// Owns every AVF device and the collaborators they share.
pub struct AvfMain {
    config: AvfConfig,
    class: AvfClass,
    devices: Vec<Option<AvfDevice>>,
    dma: Box<dyn DmaAllocator>,
    buffers: Box<dyn BufferAllocator>,
    timer: Box<dyn Timer>,
    notifier: Box<dyn InterfaceNotifier>,
    signal: Arc<ProcessSignal>,
    process: ProcessState,
}

impl AvfMain {
    pub fn new(
        config: AvfConfig,
        dma: Box<dyn DmaAllocator>,
        buffers: Box<dyn BufferAllocator>,
        timer: Box<dyn Timer>,
        notifier: Box<dyn InterfaceNotifier>,
    ) -> Self {
        Self {
            config,
            class: AvfClass,
            devices: Vec::new(),
            dma,
            buffers,
            timer,
            notifier,
            signal: Arc::new(ProcessSignal::new()),
            process: ProcessState::default(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTERFACE LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Bring up one VF and register its interface.
    ///
    /// Returns the new device instance. On any failure the partially built
    /// device is torn down and its slot stays free.
    pub fn create_if(&mut self, args: CreateIfArgs) -> Result<u32> {
        let res = self.try_create_if(&args);
        if let Err(e) = &res {
            error!("avf: pci-addr {}: {}", args.addr, e);
        }
        res
    }

    fn try_create_if(&mut self, args: &CreateIfArgs) -> Result<u32> {
        if !self.class.supports_device(args.vendor_id, args.device_id) {
            return Err(AvfError::UnsupportedDevice {
                vendor: args.vendor_id,
                device: args.device_id,
            });
        }

        let slot = match self.devices.iter().position(Option::is_none) {
            Some(slot) => slot,
            None if self.devices.len() < self.config.max_devices => {
                self.devices.push(None);
                self.devices.len() - 1
            }
            None => return Err(AvfError::ResourceExhaustion(Resource::DeviceSlots)),
        };
        let dev_instance = slot as u32;

        let adminq = AdminQueue::alloc(&*self.dma)?;
        let mut dev = AvfDevice::new(
            dev_instance,
            args.addr,
            args.regs.clone(),
            args.translate.clone(),
            adminq,
            args.enable_elog.unwrap_or(self.config.enable_elog),
        );

        let mut env = Env {
            timer: &*self.timer,
            dma: &*self.dma,
            buffers: &mut *self.buffers,
        };
        let res = dev.device_init(&mut env, self.config.n_workers).and_then(|()| {
            self.notifier
                .register_interface(dev_instance, dev.hwaddr())
                .map_err(|_| AvfError::InterfaceRegistration)
        });
        match res {
            Ok(hw_if_index) => dev.hw_if_index = Some(hw_if_index),
            Err(e) => {
                self.teardown(dev);
                return Err(e);
            }
        }

        info!(
            "{}: created (dev_instance {}, hw_if_index {:?})",
            self.class.format_device_name(&dev),
            dev_instance,
            dev.hw_if_index
        );
        self.devices[slot] = Some(dev);

        if self.device_count() == 1 {
            self.signal.signal(ProcessEvent::Start);
        }
        Ok(dev_instance)
    }

    /// Remove a device: interface gone, interrupts off, memory returned.
    pub fn delete_if(&mut self, dev_instance: u32) -> Result<()> {
        let dev = self
            .devices
            .get_mut(dev_instance as usize)
            .and_then(Option::take)
            .ok_or(AvfError::NoSuchDevice)?;
        info!("{}: deleted", self.class.format_device_name(&dev));
        self.teardown(dev);
        Ok(())
    }

    fn teardown(&mut self, dev: AvfDevice) {
        irq_0_disable(dev.regs());
        irq_n_disable(dev.regs(), 0);

        if let Some(hw) = dev.hw_if_index {
            self.notifier.set_flags(hw, HwIfFlags::empty());
            self.notifier.unregister_interface(hw);
        }
        dev.release(&*self.dma, &mut *self.buffers);
    }

    /// Administrative up/down of an interface.
    pub fn admin_up_down(&mut self, dev_instance: u32, up: bool) -> Result<()> {
        let dev = self
            .devices
            .get_mut(dev_instance as usize)
            .and_then(Option::as_mut)
            .ok_or(AvfError::NoSuchDevice)?;
        self.class.admin_up_down(dev, &mut *self.notifier, up)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // INTERRUPTS / PROCESS
    // ═══════════════════════════════════════════════════════════════════════

    /// Interrupt entry points for a device, to be wired to its MSI-X lines.
    pub fn irq_handler(&self, dev_instance: u32) -> Option<IrqHandler> {
        let dev = self.device(dev_instance)?;
        Some(IrqHandler::new(
            dev_instance,
            dev.regs.clone(),
            self.signal.clone(),
            dev.trace(),
        ))
    }

    pub fn signal(&self) -> &Arc<ProcessSignal> {
        &self.signal
    }

    pub fn process_state(&self) -> &ProcessState {
        &self.process
    }

    /// Block until the process has something to do.
    pub fn process_wait(&self) -> ProcessEvent {
        self.signal.wait(&*self.timer, self.process.next_timeout())
    }

    /// Handle one process event.
    pub fn process_run(&mut self, ev: ProcessEvent) {
        let is_irq = match ev {
            ProcessEvent::Timer => {
                self.process.last_periodic_us = self.timer.now_us();
                false
            }
            ProcessEvent::Start => {
                self.process.enabled = true;
                false
            }
            ProcessEvent::Stop => {
                self.process.enabled = false;
                return;
            }
            ProcessEvent::AqInterrupt => true,
        };

        for dev in self.devices.iter_mut().flatten() {
            dev.process(&*self.timer, &mut *self.notifier, is_irq);
        }
        self.process.last_run_duration_us =
            self.timer.now_us().saturating_sub(self.process.last_periodic_us);
    }

    /// Wait for and handle one event.
    pub fn process_step(&mut self) -> ProcessEvent {
        let ev = self.process_wait();
        self.process_run(ev);
        ev
    }

    /// The process loop. Never returns.
    pub fn run_process(&mut self) -> ! {
        loop {
            self.process_step();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════

    pub fn config(&self) -> &AvfConfig {
        &self.config
    }

    pub fn class(&self) -> &AvfClass {
        &self.class
    }

    pub fn device(&self, dev_instance: u32) -> Option<&AvfDevice> {
        self.devices.get(dev_instance as usize).and_then(Option::as_ref)
    }

    pub fn device_mut(&mut self, dev_instance: u32) -> Option<&mut AvfDevice> {
        self.devices
            .get_mut(dev_instance as usize)
            .and_then(Option::as_mut)
    }

    pub fn devices(&self) -> impl Iterator<Item = &AvfDevice> {
        self.devices.iter().flatten()
    }

    pub fn device_count(&self) -> usize {
        self.devices().count()
    }

    /// `avf-<pci address>`.
    pub fn device_name(&self, dev_instance: u32) -> Option<String> {
        self.device(dev_instance)
            .map(|d| self.class.format_device_name(d))
    }
}
