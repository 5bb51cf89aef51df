//! A `PumpProtocol` handle onto an adapter shared with code outside the
//! manager.
//!
//! [`gkl_core::PumpManager`] borrows its adapters for as long as the manager
//! itself is used, so nothing else can reach an adapter directly once it's
//! registered. Here the console also needs to drive `on_tx_complete`/
//! `on_rx_byte` on the same adapter every tick, standing in for the UART
//! ISR a real controller would have. `SharedAdapter` resolves that by
//! putting the adapter behind an `Rc<RefCell<..>>`: the manager gets one
//! handle, the console's tick loop keeps another clone of the same `Rc`,
//! and each takes its own non-overlapping `borrow_mut()`.

use std::cell::RefCell;
use std::rc::Rc;

use gkl_core::adapter::PumpProtocol;
use gkl_core::error::SendError;
use gkl_core::log::LogSink;
use gkl_core::{Address, Event, GklAdapter, Instant, Transport};

#[derive(Clone)]
pub struct SharedAdapter<T: Transport, L: LogSink, const N: usize>(pub Rc<RefCell<GklAdapter<T, L, N>>>);

impl<T: Transport, L: LogSink, const N: usize> PumpProtocol for SharedAdapter<T, L, N> {
    fn address(&self) -> Address {
        self.0.borrow().address()
    }
    fn task(&mut self, now: Instant) {
        self.0.borrow_mut().task(now)
    }
    fn is_idle(&self) -> bool {
        self.0.borrow().is_idle()
    }
    fn pop_event(&mut self) -> Option<Event> {
        self.0.borrow_mut().pop_event()
    }
    fn poll_status(&mut self) -> Result<(), SendError> {
        self.0.borrow_mut().poll_status()
    }
    fn preset_volume(&mut self, nozzle: u8, volume_dl: u32, price: u16) -> Result<(), SendError> {
        self.0.borrow_mut().preset_volume(nozzle, volume_dl, price)
    }
    fn preset_money(&mut self, nozzle: u8, money: u32, price: u16) -> Result<(), SendError> {
        self.0.borrow_mut().preset_money(nozzle, money, price)
    }
    fn stop(&mut self) -> Result<(), SendError> {
        self.0.borrow_mut().stop()
    }
    fn resume(&mut self) -> Result<(), SendError> {
        self.0.borrow_mut().resume()
    }
    fn end(&mut self) -> Result<(), SendError> {
        self.0.borrow_mut().end()
    }
    fn poll_realtime_volume(&mut self) -> Result<(), SendError> {
        self.0.borrow_mut().poll_realtime_volume()
    }
    fn poll_realtime_money(&mut self) -> Result<(), SendError> {
        self.0.borrow_mut().poll_realtime_money()
    }
    fn read_totalizer(&mut self, index: u8) -> Result<(), SendError> {
        self.0.borrow_mut().read_totalizer(index)
    }
    fn read_transaction(&mut self) -> Result<(), SendError> {
        self.0.borrow_mut().read_transaction()
    }
}
