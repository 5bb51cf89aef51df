//! The settings record exchanged with the external persistence layer
//! (EEPROM on the original hardware, a JSON file for the host console
//! here). The core never performs the I/O itself -- it only owns the shape
//! of the record and how it's applied to a registered pump.

use serde::{Deserialize, Serialize};

use crate::device::{PumpDevice, PumpId};
use crate::error::ManagerError;
use crate::manager::PumpManager;

/// Per-pump configuration that round-trips to external storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpSettings {
    pub id: PumpId,
    pub ctrl_addr: u8,
    pub slave_addr: u8,
    pub price: u16,
}

impl From<&PumpDevice> for PumpSettings {
    fn from(device: &PumpDevice) -> Self {
        PumpSettings {
            id: device.id,
            ctrl_addr: device.config.ctrl_addr,
            slave_addr: device.config.slave_addr,
            price: device.config.price,
        }
    }
}

impl<'a, const N: usize> PumpManager<'a, N> {
    /// Apply a previously-persisted settings record to an already-registered
    /// pump. Registration itself (binding an adapter) happens separately at
    /// startup; this only updates the configuration fields.
    pub fn apply_settings(&mut self, settings: &PumpSettings) -> Result<(), ManagerError> {
        self.set_ctrl_addr(settings.id, settings.ctrl_addr)?;
        self.set_slave_addr(settings.id, settings.slave_addr)?;
        self.set_price(settings.id, settings.price)
    }

    /// Snapshot current configuration for persistence.
    pub fn settings_for(&self, id: PumpId) -> Result<PumpSettings, ManagerError> {
        self.get(id).map(PumpSettings::from)
    }
}
