//! In-process simulated pump fleet.
//!
//! `SimTransport` stands in for the real RS-485 line: instead of talking to
//! hardware, every transmitted frame is answered synchronously by a small
//! internal state machine ([`SimPump`]) that plays out the same status
//! progression a real dispenser reports during a fill (armed, dispensing,
//! done, nozzle returned, idle). Delivery of the response back into the
//! adapter still happens through the normal `LinkEvents` seam, driven once
//! per tick from the console's main loop -- `Transport` itself only ever
//! records what *would* go out and what *will* come back.

use std::cell::RefCell;
use std::rc::Rc;

use gkl_core::frame::{self, MAX_FRAME_LEN};
use gkl_core::transport::{Transport, TransportErrorCode};

/// Ticks a preset spends "armed" before the simulated nozzle lifts.
const ARM_TICKS: u32 = 2;
/// Ticks spent "done" before the nozzle is reported returned, and again
/// before the pump settles back to idle.
const SETTLE_TICKS: u32 = 2;
const VOLUME_STEP_DL: u32 = 15;
const MONEY_STEP: u32 = 17;

#[derive(Debug, Clone, Copy, Default)]
struct Preset {
    volume_dl: u32,
    price: u16,
}

/// The simulated device's own view of the world, advanced once per console
/// tick independent of whatever the master happens to be polling for.
pub struct SimPump {
    status: u8,
    nozzle: u8,
    ticks_in_state: u32,
    preset: Preset,
    rt_volume_dl: u32,
    rt_money: u32,
}

impl SimPump {
    fn new() -> Self {
        SimPump { status: 1, nozzle: 0, ticks_in_state: 0, preset: Preset::default(), rt_volume_dl: 0, rt_money: 0 }
    }

    fn set_status(&mut self, status: u8) {
        self.status = status;
        self.ticks_in_state = 0;
    }

    /// Plays the device forward by one tick of wall-clock time, independent
    /// of whether the master polled it this tick.
    pub fn advance(&mut self) {
        self.ticks_in_state += 1;
        match self.status {
            3 if self.ticks_in_state >= ARM_TICKS => self.set_status(4),
            4 => {
                self.rt_volume_dl += VOLUME_STEP_DL;
                self.rt_money += MONEY_STEP;
                let target_reached = self.preset.volume_dl > 0 && self.rt_volume_dl >= self.preset.volume_dl;
                if target_reached || self.ticks_in_state >= ARM_TICKS * 3 {
                    self.set_status(8);
                }
            }
            8 if self.ticks_in_state >= SETTLE_TICKS => self.set_status(9),
            9 if self.ticks_in_state >= SETTLE_TICKS => {
                self.set_status(1);
                self.rt_volume_dl = 0;
                self.rt_money = 0;
                self.preset = Preset::default();
            }
            _ => {}
        }
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    /// Handles one fully-received request frame, returning the response
    /// frame bytes to hand back (`None` for fire-and-forget commands or
    /// commands this model doesn't answer).
    fn respond(&mut self, ctrl: u8, slave: u8, cmd: u8, data: &[u8]) -> Option<heapless::Vec<u8, MAX_FRAME_LEN>> {
        let mut out_data: heapless::Vec<u8, 22> = heapless::Vec::new();
        let resp_cmd = match cmd {
            b'V' => {
                let (nozzle, volume_cl, price) = parse_preset(data)?;
                self.nozzle = nozzle;
                self.preset = Preset { volume_dl: volume_cl / 10, price };
                self.set_status(3);
                return None;
            }
            b'M' => {
                let (nozzle, _money, price) = parse_preset(data)?;
                self.nozzle = nozzle;
                self.preset = Preset { volume_dl: 0, price };
                self.set_status(3);
                return None;
            }
            b'B' => {
                if self.status == 4 {
                    self.set_status(6);
                }
                return None;
            }
            b'G' => {
                if self.status == 6 {
                    self.set_status(4);
                }
                return None;
            }
            b'N' => {
                if self.status == 9 {
                    self.set_status(1);
                }
                return None;
            }
            b'S' => {
                push_digit(&mut out_data, self.status);
                push_digit(&mut out_data, self.nozzle);
                b'S'
            }
            b'L' => {
                write_nozzle_and_number(&mut out_data, self.nozzle, self.rt_volume_dl * 10);
                b'L'
            }
            b'R' => {
                write_nozzle_and_number(&mut out_data, self.nozzle, self.rt_money);
                b'R'
            }
            b'T' => {
                write_transaction(&mut out_data, self.nozzle, self.rt_money, self.rt_volume_dl * 10, self.preset.price);
                b'T'
            }
            _ => return None,
        };
        let mut wire = [0u8; MAX_FRAME_LEN];
        let len = frame::build_frame(ctrl, slave, resp_cmd, &out_data, &mut wire).ok()?;
        let mut out = heapless::Vec::new();
        out.extend_from_slice(&wire[..len]).ok()?;
        Some(out)
    }
}

fn push_digit(out: &mut heapless::Vec<u8, 22>, value: u8) {
    let _ = out.push(b'0' + (value % 10));
}

fn push_n_digit(out: &mut heapless::Vec<u8, 22>, value: u32, width: usize) {
    let mut digits = [0u8; 10];
    let mut v = value;
    for i in (0..width).rev() {
        digits[i] = b'0' + (v % 10) as u8;
        v /= 10;
    }
    let _ = out.extend_from_slice(&digits[..width]);
}

fn write_nozzle_and_number(out: &mut heapless::Vec<u8, 22>, nozzle: u8, number: u32) {
    push_digit(out, nozzle);
    let _ = out.push(b';');
    push_n_digit(out, number, 8);
}

fn write_transaction(out: &mut heapless::Vec<u8, 22>, nozzle: u8, money: u32, volume_cl: u32, price: u16) {
    push_digit(out, nozzle);
    let _ = out.extend_from_slice(b"00");
    let _ = out.push(b';');
    push_n_digit(out, money, 6);
    let _ = out.push(b';');
    push_n_digit(out, volume_cl, 6);
    let _ = out.push(b';');
    push_n_digit(out, price as u32, 4);
}

/// Parses a `V`/`M` preset payload: `<nozzle>;<amount-6digit>;<price-4digit>`.
fn parse_preset(data: &[u8]) -> Option<(u8, u32, u16)> {
    let mut parts = data.split(|&b| b == b';');
    let nozzle_part = parts.next()?;
    let amount_part = parts.next()?;
    let price_part = parts.next()?;
    if parts.next().is_some() || nozzle_part.len() != 1 {
        return None;
    }
    let nozzle = nozzle_part[0].checked_sub(b'0')?;
    let amount = digits_to_u32(amount_part)?;
    let price = digits_to_u32(price_part)? as u16;
    Some((nozzle, amount, price))
}

fn digits_to_u32(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let mut v: u32 = 0;
    for &b in bytes {
        v = v.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }
    Some(v)
}

struct Pending {
    tx_complete: bool,
    response: Option<heapless::Vec<u8, MAX_FRAME_LEN>>,
}

impl Default for Pending {
    fn default() -> Self {
        Pending { tx_complete: false, response: None }
    }
}

struct SimState {
    pump: SimPump,
    pending: Pending,
}

/// Shared handle onto one simulated pump. Cloning gives a second owner of
/// the same underlying state -- the `Transport` clone goes into the
/// `GklAdapter`'s `Link`, the other clone is kept by the console's tick loop
/// to advance device time and play the `LinkEvents` seam.
#[derive(Clone)]
pub struct SimTransport(Rc<RefCell<SimState>>);

impl SimTransport {
    pub fn new() -> Self {
        SimTransport(Rc::new(RefCell::new(SimState { pump: SimPump::new(), pending: Pending::default() })))
    }

    pub fn advance(&self) {
        self.0.borrow_mut().pump.advance();
    }

    pub fn status(&self) -> u8 {
        self.0.borrow().pump.status()
    }

    /// Takes the outcome of the last `transmit()` call, if it hasn't been
    /// taken yet: `Some(response)` once a transmit has completed, where
    /// `response` is the reply frame bytes (`None` for fire-and-forget
    /// commands). Returns `None` if nothing new has completed.
    pub fn take_pending(&self) -> Option<Option<heapless::Vec<u8, MAX_FRAME_LEN>>> {
        let mut state = self.0.borrow_mut();
        if !state.pending.tx_complete {
            return None;
        }
        state.pending.tx_complete = false;
        Some(state.pending.response.take())
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn transmit(&mut self, buf: &[u8], len: usize) -> Result<(), TransportErrorCode> {
        if len < 5 {
            return Err(0);
        }
        let ctrl = buf[1];
        let slave = buf[2];
        let cmd = buf[3];
        let data = &buf[4..len - 1];
        let mut state = self.0.borrow_mut();
        let response = state.pump.respond(ctrl, slave, cmd, data);
        state.pending = Pending { tx_complete: true, response };
        Ok(())
    }

    fn receive_one_byte(&mut self) -> Result<(), TransportErrorCode> {
        Ok(())
    }
}
