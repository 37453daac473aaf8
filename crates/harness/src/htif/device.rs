//! Device trait and registry for HTIF commands.
//!
//! This module defines the `Device` trait implemented by every HTIF endpoint. It provides:
//! 1. **Identification:** `name` for diagnostics.
//! 2. **Dispatch:** `handle` receives a decoded [`Command`] with access to target memory.
//! 3. **Lifecycle:** Optional `tick`, called once per service step.
//! 4. **Registry:** [`DeviceList`], which assigns ids in registration order.

use tracing::{debug, warn};

use super::command::Command;
use crate::common::error::{Result, SimError};
use crate::mem::MemoryPort;

/// An endpoint addressed by the device field of a `tohost` command.
///
/// All implementors must be `Send` so a whole simulation context can move to a
/// worker thread.
pub trait Device: Send {
    /// Returns a short name for this device (e.g., `"syscall_proxy"`).
    fn name(&self) -> &'static str;

    /// Handles one command.
    ///
    /// Returns the reply to enqueue for `fromhost`, or `None` if the command
    /// produces no reply.
    ///
    /// # Errors
    ///
    /// Memory errors while accessing the command block.
    fn handle(&mut self, cmd: &Command, mem: &mut dyn MemoryPort) -> Result<Option<u64>>;

    /// Advances device state by one service step.
    fn tick(&mut self) {}
}

/// Ordered set of devices; a device's id is its registration index.
#[derive(Default)]
pub struct DeviceList {
    devices: Vec<Box<dyn Device>>,
}

impl std::fmt::Debug for DeviceList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.devices.iter().map(|d| d.name()))
            .finish()
    }
}

impl DeviceList {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a device and returns its id.
    ///
    /// # Errors
    ///
    /// [`SimError::DeviceTableFull`] once 256 devices are registered.
    pub fn register(&mut self, device: Box<dyn Device>) -> Result<u8> {
        let Ok(id) = u8::try_from(self.devices.len()) else {
            return Err(SimError::DeviceTableFull {
                name: device.name(),
            });
        };
        debug!("[htif] registered device {id}: {}", device.name());
        self.devices.push(device);
        Ok(id)
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if no device is registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Routes `cmd` to its device.
    ///
    /// Commands for an unregistered id are logged and dropped.
    ///
    /// # Errors
    ///
    /// Propagates the device's error.
    pub fn handle_command(
        &mut self,
        cmd: &Command,
        mem: &mut dyn MemoryPort,
    ) -> Result<Option<u64>> {
        match self.devices.get_mut(usize::from(cmd.device())) {
            Some(device) => device.handle(cmd, mem),
            None => {
                warn!("[htif] command for unknown device ({cmd}) ignored");
                Ok(None)
            }
        }
    }

    /// Ticks every device in registration order.
    pub fn tick(&mut self) {
        for device in &mut self.devices {
            device.tick();
        }
    }
}
