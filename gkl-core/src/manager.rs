//! Pump registry, cached device state, and the adaptive polling scheduler
//! that drives every adapter's `task()` and dispatches status polls.

use crate::adapter::PumpProtocol;
use crate::clock::Instant;
use crate::device::{FinalTransactionState, Health, PumpDevice, PumpId, TotalizerState};
use crate::error::{ManagerError, SendError};
use crate::event::EventKind;

/// Registry capacity; the design requires at least 4.
pub const MAX_PUMPS: usize = 8;

/// Base polling cadence while a pump is idle-ish.
pub const DEFAULT_POLL_PERIOD_MS: u32 = 500;

/// Polling cadence while a pump is mid-transaction, for responsive realtime
/// tracking.
pub const ACTIVE_POLL_MS: u32 = 30;

struct Slot<'a> {
    device: PumpDevice,
    adapter: &'a mut dyn PumpProtocol,
    next_poll_time: Instant,
}

/// Owns the pump registry and drives every adapter each tick. `N` bounds
/// registry capacity (default [`MAX_PUMPS`]).
pub struct PumpManager<'a, const N: usize = MAX_PUMPS> {
    slots: heapless::Vec<Slot<'a>, N>,
    poll_period_ms: u32,
}

impl<'a, const N: usize> PumpManager<'a, N> {
    pub fn new(poll_period_ms: u32) -> Self {
        PumpManager { slots: heapless::Vec::new(), poll_period_ms }
    }

    fn index_of(&self, id: PumpId) -> Option<usize> {
        self.slots.iter().position(|s| s.device.id == id)
    }

    /// Register a pump bound to an already-initialized adapter. Fails if the
    /// registry is full, the id is already taken, or another pump already
    /// claims the same wire address.
    pub fn add(
        &mut self,
        id: PumpId,
        ctrl_addr: u8,
        slave_addr: u8,
        price: u16,
        adapter: &'a mut dyn PumpProtocol,
    ) -> Result<(), ManagerError> {
        if self.index_of(id).is_some() {
            return Err(ManagerError::DuplicateId);
        }
        if self.slots.iter().any(|s| s.device.config.ctrl_addr == ctrl_addr && s.device.config.slave_addr == slave_addr) {
            return Err(ManagerError::DuplicateId);
        }
        let slot = Slot {
            device: PumpDevice::new(id, ctrl_addr, slave_addr, price),
            adapter,
            next_poll_time: Instant::ZERO,
        };
        self.slots.push(slot).map_err(|_| ManagerError::RegistryFull)
    }

    pub fn get(&self, id: PumpId) -> Result<&PumpDevice, ManagerError> {
        self.index_of(id).map(|i| &self.slots[i].device).ok_or(ManagerError::PumpNotFound)
    }

    pub fn is_idle(&self, id: PumpId) -> Result<bool, ManagerError> {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        Ok(self.slots[i].adapter.is_idle())
    }

    pub fn set_price(&mut self, id: PumpId, price: u16) -> Result<(), ManagerError> {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        self.slots[i].device.config.price = price;
        Ok(())
    }

    pub fn set_slave_addr(&mut self, id: PumpId, slave_addr: u8) -> Result<(), ManagerError> {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        self.slots[i].device.config.slave_addr = slave_addr;
        Ok(())
    }

    pub fn set_ctrl_addr(&mut self, id: PumpId, ctrl_addr: u8) -> Result<(), ManagerError> {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        self.slots[i].device.config.ctrl_addr = ctrl_addr;
        Ok(())
    }

    pub fn clear_fail(&mut self, id: PumpId) -> Result<(), ManagerError> {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        self.slots[i].device.health = Health::default();
        Ok(())
    }

    pub fn request_poll_now(&mut self, id: PumpId) -> Result<(), ManagerError> {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        self.slots[i].next_poll_time = Instant::ZERO;
        Ok(())
    }

    pub fn request_poll_all_now(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.next_poll_time = Instant::ZERO;
        }
    }

    fn with_adapter<F>(&mut self, id: PumpId, f: F) -> Result<(), ManagerError>
    where
        F: FnOnce(&mut dyn PumpProtocol) -> Result<(), SendError>,
    {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        f(&mut *self.slots[i].adapter).map_err(ManagerError::from)
    }

    pub fn preset_volume(&mut self, id: PumpId, nozzle: u8, volume_dl: u32, price: u16) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.preset_volume(nozzle, volume_dl, price))
    }

    pub fn preset_money(&mut self, id: PumpId, nozzle: u8, money: u32, price: u16) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.preset_money(nozzle, money, price))
    }

    pub fn stop(&mut self, id: PumpId) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.stop())
    }

    pub fn resume(&mut self, id: PumpId) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.resume())
    }

    pub fn end(&mut self, id: PumpId) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.end())
    }

    pub fn poll_realtime_volume(&mut self, id: PumpId) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.poll_realtime_volume())
    }

    pub fn poll_realtime_money(&mut self, id: PumpId) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.poll_realtime_money())
    }

    pub fn read_totalizer(&mut self, id: PumpId, index: u8) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.read_totalizer(index))
    }

    pub fn read_transaction(&mut self, id: PumpId) -> Result<(), ManagerError> {
        self.with_adapter(id, |a| a.read_transaction())
    }

    fn apply_event(device: &mut PumpDevice, now: Instant, kind: EventKind) {
        match kind {
            EventKind::Status { status, nozzle } => {
                device.live.status = status;
                device.live.nozzle = nozzle;
                device.live.last_status_time = now;
                device.health = Health::default();
            }
            EventKind::Error { code, fail_count } => {
                device.health.last_error = Some(code);
                device.health.fail_count = fail_count;
            }
            EventKind::RealtimeVolume { volume_dl, .. } => {
                device.realtime.rt_volume_dl = volume_dl;
                device.realtime.vol_seq = device.realtime.vol_seq.wrapping_add(1);
            }
            EventKind::RealtimeMoney { money, .. } => {
                device.realtime.rt_money = money;
                device.realtime.money_seq = device.realtime.money_seq.wrapping_add(1);
            }
            EventKind::Totalizer { nozzle, totalizer_dl } => {
                device.totalizer =
                    TotalizerState { totalizer_dl, totalizer_nozzle: nozzle, tot_seq: device.totalizer.tot_seq.wrapping_add(1) };
            }
            EventKind::TransactionFinal { nozzle, volume_dl, money, price } => {
                device.final_trx = FinalTransactionState {
                    trx_volume_dl: volume_dl,
                    trx_money: money,
                    trx_price: price,
                    trx_nozzle: nozzle,
                    trx_final_seq: device.final_trx.trx_final_seq.wrapping_add(1),
                };
            }
        }
    }

    /// Reset a pump's realtime caches, used by the transaction FSM on the
    /// Closing -> Idle transition.
    pub fn clear_realtime_caches(&mut self, id: PumpId) -> Result<(), ManagerError> {
        let i = self.index_of(id).ok_or(ManagerError::PumpNotFound)?;
        self.slots[i].device.clear_realtime_caches();
        Ok(())
    }

    /// Drive every adapter, route its events into the matching device cache,
    /// then dispatch status polls whose deadline has arrived.
    pub fn task(&mut self, now: Instant) {
        for slot in self.slots.iter_mut() {
            slot.adapter.task(now);
            while let Some(event) = slot.adapter.pop_event() {
                Self::apply_event(&mut slot.device, now, event.kind);
            }
        }

        for slot in self.slots.iter_mut() {
            if now < slot.next_poll_time || !slot.adapter.is_idle() {
                continue;
            }
            if slot.adapter.poll_status().is_ok() {
                let period = if slot.device.is_transaction_active() { ACTIVE_POLL_MS } else { self.poll_period_ms };
                slot.next_poll_time = now.add_ms(period);
            }
        }
    }
}
