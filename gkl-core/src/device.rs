//! Cached per-pump state: identity, configuration, and everything the
//! manager has learned from events. Mutated only by
//! [`crate::manager::PumpManager`]; everyone else reads it.

use crate::clock::Instant;
use crate::error::LinkError;
use crate::event::Address;

/// Stable identifier for a registered pump, distinct from its wire address
/// so the address can be reassigned without the rest of the system caring.
pub type PumpId = u8;

/// Live status/nozzle, refreshed by every `S` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveState {
    pub status: u8,
    pub nozzle: u8,
    pub last_status_time: Instant,
}

/// Realtime volume/money during an active dispense, refreshed by `L`/`R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RealtimeState {
    pub rt_volume_dl: u32,
    pub rt_money: u32,
    pub vol_seq: u32,
    pub money_seq: u32,
}

/// Cached totalizer reading, refreshed by `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TotalizerState {
    pub totalizer_dl: u32,
    pub totalizer_nozzle: u8,
    pub tot_seq: u32,
}

/// Cached final transaction record, refreshed by `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FinalTransactionState {
    pub trx_volume_dl: u32,
    pub trx_money: u32,
    pub trx_price: u16,
    pub trx_nozzle: u8,
    pub trx_final_seq: u32,
}

/// Health counters, refreshed by `Error` events and cleared by any success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Health {
    pub last_error: Option<LinkError>,
    pub fail_count: u8,
}

/// Per-pump configuration the manager exposes for the settings interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    pub ctrl_addr: u8,
    pub slave_addr: u8,
    pub price: u16,
}

/// One registered pump: identity, config, and every cache the manager keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpDevice {
    pub id: PumpId,
    pub config: PumpConfig,
    pub live: LiveState,
    pub realtime: RealtimeState,
    pub totalizer: TotalizerState,
    pub final_trx: FinalTransactionState,
    pub health: Health,
}

impl PumpDevice {
    pub fn new(id: PumpId, ctrl_addr: u8, slave_addr: u8, price: u16) -> Self {
        PumpDevice {
            id,
            config: PumpConfig { ctrl_addr, slave_addr, price },
            live: LiveState::default(),
            realtime: RealtimeState::default(),
            totalizer: TotalizerState::default(),
            final_trx: FinalTransactionState::default(),
            health: Health::default(),
        }
    }

    pub fn address(&self) -> Address {
        Address { ctrl_addr: self.config.ctrl_addr, slave_addr: self.config.slave_addr }
    }

    /// Family membership used by the polling scheduler's adaptive cadence:
    /// true while a transaction is in flight (armed/dispensing/finishing).
    pub fn is_transaction_active(&self) -> bool {
        matches!(self.live.status, 3 | 4 | 6 | 8 | 9)
    }

    /// `true` once `fail_count` has reached the no-connect threshold and no
    /// success has cleared it since.
    pub fn no_connect(&self, threshold: u8) -> bool {
        self.health.fail_count >= threshold
    }

    pub(crate) fn clear_realtime_caches(&mut self) {
        self.realtime = RealtimeState::default();
    }
}
