//! Drives a full preset -> dispense -> complete -> close cycle through
//! `PumpManager` + `TransactionFsm`, feeding wire bytes into a `GklAdapter`
//! the same way a real UART ISR would via the `LinkEvents` seam.
//!
//! `PumpManager` holds its adapter borrowed for as long as the manager
//! itself is in use, so there is no way to reach back into a plain
//! `GklAdapter` once it has been registered. `SharedAdapter` below is the
//! same `Rc<RefCell<..>>` sharing this crate's own adapter/link tests use
//! for their mock transports, applied one level up: it lets the manager's
//! handle and this test's "IRQ driver" handle coexist as two independent
//! owners of the same adapter, each taking a non-overlapping `borrow_mut()`.

use std::cell::RefCell;
use std::rc::Rc;

use gkl_core::adapter::PumpProtocol;
use gkl_core::dispatcher::LinkDispatcher;
use gkl_core::error::SendError;
use gkl_core::fsm::TransactionFsm;
use gkl_core::link::LinkEvents;
use gkl_core::log::NoopLogSink;
use gkl_core::transport::{Transport, TransportErrorCode};
use gkl_core::{Address, Event, EventKind, GklAdapter, Instant, Link, PumpManager, TrxState};

#[derive(Default)]
struct Inner {
    tx_log: Vec<Vec<u8>>,
}

#[derive(Clone, Default)]
struct MockTransport(Rc<RefCell<Inner>>);

impl Transport for MockTransport {
    fn transmit(&mut self, buf: &[u8], len: usize) -> Result<(), TransportErrorCode> {
        self.0.borrow_mut().tx_log.push(buf[..len].to_vec());
        Ok(())
    }
    fn receive_one_byte(&mut self) -> Result<(), TransportErrorCode> {
        Ok(())
    }
}

/// A `PumpProtocol` handle onto a shared adapter. The manager gets one of
/// these; a separate clone of the same `Rc` drives `on_tx_complete`/
/// `on_rx_byte` from outside, standing in for a real UART ISR.
#[derive(Clone)]
struct SharedAdapter<const N: usize>(Rc<RefCell<GklAdapter<MockTransport, NoopLogSink, N>>>);

impl<const N: usize> PumpProtocol for SharedAdapter<N> {
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

/// Feeds `frame_body` (ctrl, slave, cmd, data...) as a full wire frame
/// (STX + body + checksum) into whatever implements `LinkEvents`, matching
/// the seam a real interrupt handler uses.
fn feed_response(events: &mut dyn LinkEvents, frame_body: &[u8]) {
    let mut wire = [0u8; 32];
    wire[0] = gkl_core::frame::STX;
    wire[1..1 + frame_body.len()].copy_from_slice(frame_body);
    let len = 1 + frame_body.len() + 1;
    wire[len - 1] = gkl_core::frame::checksum_xor(&wire, len);
    for &b in &wire[..len] {
        events.on_rx_byte(Instant::ZERO, b);
    }
}

#[test]
fn full_preset_dispense_complete_close_cycle() {
    let addr = Address { ctrl_addr: 0x00, slave_addr: 0x01 };
    let shared: Rc<RefCell<GklAdapter<MockTransport, NoopLogSink, 4>>> =
        Rc::new(RefCell::new(GklAdapter::new(Link::new(MockTransport::default()), addr)));
    shared.borrow_mut().init().unwrap();
    let mut proto: SharedAdapter<4> = SharedAdapter(shared.clone());

    let mut mgr: PumpManager<4> = PumpManager::new(500);
    mgr.add(1, 0x00, 0x01, 1122, &mut proto).unwrap();
    let mut fsm = TransactionFsm::new(1);

    // Preset 25.5 L at 11.22/unit; V is fire-and-forget so the link goes
    // straight back to idle once the transmit itself completes.
    fsm.start_volume(&mut mgr, 1, 255, 1122).unwrap();
    assert_eq!(fsm.state(), TrxState::PresetSent);
    shared.borrow_mut().on_tx_complete(Instant(1));

    // Poll #1: pump reports status 3 ("prepared") -> Armed.
    mgr.request_poll_now(1).unwrap();
    mgr.task(Instant(2));
    fsm.task(&mut mgr, Instant(2)).unwrap();
    shared.borrow_mut().on_tx_complete(Instant(3));
    feed_response(&mut *shared.borrow_mut(), &[0x00, 0x01, b'S', b'3', b'1']);
    mgr.task(Instant(4));
    fsm.task(&mut mgr, Instant(4)).unwrap();
    assert_eq!(fsm.state(), TrxState::Armed);

    // Poll #2: status 4 ("running") -> Dispensing.
    mgr.request_poll_now(1).unwrap();
    mgr.task(Instant(5));
    fsm.task(&mut mgr, Instant(5)).unwrap();
    shared.borrow_mut().on_tx_complete(Instant(6));
    feed_response(&mut *shared.borrow_mut(), &[0x00, 0x01, b'S', b'4', b'1']);
    mgr.task(Instant(7));
    fsm.task(&mut mgr, Instant(7)).unwrap();
    assert_eq!(fsm.state(), TrxState::Dispensing);

    // Poll #3: status 6. A fresh status while Dispensing starts the
    // realtime cycle: L goes out first.
    mgr.request_poll_now(1).unwrap();
    mgr.task(Instant(8));
    fsm.task(&mut mgr, Instant(8)).unwrap();
    shared.borrow_mut().on_tx_complete(Instant(9));
    feed_response(&mut *shared.borrow_mut(), &[0x00, 0x01, b'S', b'6', b'1']);
    mgr.task(Instant(10));
    fsm.task(&mut mgr, Instant(10)).unwrap();
    assert_eq!(fsm.state(), TrxState::Dispensing);

    // L answered -> vol_seq bumps -> the cycle immediately sends R.
    shared.borrow_mut().on_tx_complete(Instant(11));
    feed_response(&mut *shared.borrow_mut(), b"\x00\x01L1;00001500");
    mgr.task(Instant(12));
    fsm.task(&mut mgr, Instant(12)).unwrap();
    assert_eq!(mgr.get(1).unwrap().realtime.rt_volume_dl, 150);

    // R answered -> money_seq bumps -> the cycle loops back to WaitSR.
    shared.borrow_mut().on_tx_complete(Instant(13));
    feed_response(&mut *shared.borrow_mut(), b"\x00\x01R1;00000165");
    mgr.task(Instant(14));
    fsm.task(&mut mgr, Instant(14)).unwrap();
    assert_eq!(mgr.get(1).unwrap().realtime.rt_money, 165);

    // Poll #4: status 8 ("done") -> Complete.
    mgr.request_poll_now(1).unwrap();
    mgr.task(Instant(15));
    fsm.task(&mut mgr, Instant(15)).unwrap();
    shared.borrow_mut().on_tx_complete(Instant(16));
    feed_response(&mut *shared.borrow_mut(), &[0x00, 0x01, b'S', b'8', b'1']);
    mgr.task(Instant(17));
    fsm.task(&mut mgr, Instant(17)).unwrap();
    assert_eq!(fsm.state(), TrxState::Complete);

    // Still Complete, still idle, final record not yet requested: the FSM
    // sends T on its own without any new poll.
    mgr.task(Instant(18));
    fsm.task(&mut mgr, Instant(18)).unwrap();
    shared.borrow_mut().on_tx_complete(Instant(19));
    feed_response(&mut *shared.borrow_mut(), b"\x00\x01T1p8;005610;000500;1122");
    mgr.task(Instant(20));
    fsm.task(&mut mgr, Instant(20)).unwrap();
    assert_eq!(fsm.state(), TrxState::Complete);
    assert_eq!(mgr.get(1).unwrap().final_trx.trx_volume_dl, 50);
    assert_eq!(mgr.get(1).unwrap().final_trx.trx_money, 5610);
    assert_eq!(mgr.get(1).unwrap().final_trx.trx_price, 1122);

    // Poll #5: status 9 ("nozzle returned") -> end() sent -> Closing.
    mgr.request_poll_now(1).unwrap();
    mgr.task(Instant(21));
    fsm.task(&mut mgr, Instant(21)).unwrap();
    shared.borrow_mut().on_tx_complete(Instant(22));
    feed_response(&mut *shared.borrow_mut(), &[0x00, 0x01, b'S', b'9', b'1']);
    mgr.task(Instant(23));
    fsm.task(&mut mgr, Instant(23)).unwrap();
    assert_eq!(fsm.state(), TrxState::Closing);
    shared.borrow_mut().on_tx_complete(Instant(24)); // N is fire-and-forget.

    // Poll #6: status 1 ("idle") -> realtime caches clear -> Idle.
    mgr.request_poll_now(1).unwrap();
    mgr.task(Instant(25));
    fsm.task(&mut mgr, Instant(25)).unwrap();
    shared.borrow_mut().on_tx_complete(Instant(26));
    feed_response(&mut *shared.borrow_mut(), &[0x00, 0x01, b'S', b'1', b'0']);
    mgr.task(Instant(27));
    fsm.task(&mut mgr, Instant(27)).unwrap();
    assert_eq!(fsm.state(), TrxState::Idle);
    assert_eq!(mgr.get(1).unwrap().realtime.rt_volume_dl, 0);
    assert_eq!(mgr.get(1).unwrap().realtime.rt_money, 0);
}

/// A dispatcher can forward IRQ-style callbacks straight to an adapter, the
/// same seam a real multi-channel controller uses to wire up several pumps.
#[test]
fn dispatcher_forwards_bytes_to_the_registered_adapter() {
    let addr = Address { ctrl_addr: 0x00, slave_addr: 0x01 };
    let mut adapter: GklAdapter<MockTransport> = GklAdapter::new(Link::new(MockTransport::default()), addr);
    adapter.init().unwrap();
    adapter.poll_status().unwrap();

    let mut dispatcher: LinkDispatcher<2> = LinkDispatcher::new();
    let handle = dispatcher.register(&mut adapter).unwrap();
    dispatcher.on_tx_complete(handle, Instant::ZERO);

    let mut wire = [0u8; 32];
    wire[0] = gkl_core::frame::STX;
    let body = [0x00u8, 0x01, b'S', b'1', b'0'];
    wire[1..1 + body.len()].copy_from_slice(&body);
    let len = 1 + body.len() + 1;
    wire[len - 1] = gkl_core::frame::checksum_xor(&wire, len);
    for &b in &wire[..len] {
        dispatcher.on_rx_byte(handle, Instant::ZERO, b);
    }

    drop(dispatcher);
    adapter.task(Instant::ZERO);
    let event = adapter.pop_event().unwrap();
    assert_eq!(event, Event { addr, kind: EventKind::Status { status: 1, nozzle: 0 } });
}
