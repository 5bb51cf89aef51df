//! Per-pump transaction sequencing: preset -> armed -> dispensing -> complete
//! -> close, with the realtime L/R cycle interleaved strictly after each
//! fresh status poll. Reads only cached manager state, sequence counters,
//! and adapter idleness -- it never touches a frame directly.

use crate::clock::Instant;
use crate::device::PumpId;
use crate::error::FsmError;
use crate::manager::PumpManager;

/// Sequence counters stall the realtime cycle if a step doesn't land within
/// this long; the cycle restarts from `WaitSR` rather than erroring out.
pub const REALTIME_STEP_TIMEOUT_MS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxState {
    Idle,
    PresetSent,
    Armed,
    Dispensing,
    Paused,
    Complete,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollStep {
    WaitSR,
    WaitL,
    WaitR,
}

/// One pump's transaction sequencing state.
pub struct TransactionFsm {
    pump_id: PumpId,
    state: TrxState,
    preset_volume_dl: u32,
    preset_money: u32,
    poll_step: PollStep,
    cycle_status_time: Instant,
    wait_vol_seq: u32,
    wait_money_seq: u32,
    final_requested: bool,
    wait_trx_seq: u32,
    last_poll_time: Instant,
}

fn is_active_family(status: u8) -> bool {
    matches!(status, 3 | 4 | 6)
}

impl TransactionFsm {
    pub fn new(pump_id: PumpId) -> Self {
        TransactionFsm {
            pump_id,
            state: TrxState::Idle,
            preset_volume_dl: 0,
            preset_money: 0,
            poll_step: PollStep::WaitSR,
            cycle_status_time: Instant::ZERO,
            wait_vol_seq: 0,
            wait_money_seq: 0,
            final_requested: false,
            wait_trx_seq: 0,
            last_poll_time: Instant::ZERO,
        }
    }

    pub fn state(&self) -> TrxState {
        self.state
    }

    /// User action: preset by volume. Idempotent while already `PresetSent`
    /// with the same volume -- repeating the call is a no-op, not an error.
    pub fn start_volume<const N: usize>(
        &mut self,
        mgr: &mut PumpManager<'_, N>,
        nozzle: u8,
        volume_dl: u32,
        price: u16,
    ) -> Result<(), FsmError> {
        if self.state == TrxState::PresetSent && self.preset_volume_dl == volume_dl {
            return Ok(());
        }
        if self.state != TrxState::Idle {
            return Err(FsmError::IllegalState);
        }
        if !mgr.is_idle(self.pump_id)? {
            return Err(FsmError::AdapterBusy);
        }
        mgr.preset_volume(self.pump_id, nozzle, volume_dl, price)?;
        self.preset_volume_dl = volume_dl;
        self.preset_money = 0;
        self.state = TrxState::PresetSent;
        Ok(())
    }

    /// User action: preset by money.
    pub fn start_money<const N: usize>(
        &mut self,
        mgr: &mut PumpManager<'_, N>,
        nozzle: u8,
        money: u32,
        price: u16,
    ) -> Result<(), FsmError> {
        if self.state == TrxState::PresetSent && self.preset_money == money {
            return Ok(());
        }
        if self.state != TrxState::Idle {
            return Err(FsmError::IllegalState);
        }
        if !mgr.is_idle(self.pump_id)? {
            return Err(FsmError::AdapterBusy);
        }
        mgr.preset_money(self.pump_id, nozzle, money, price)?;
        self.preset_money = money;
        self.preset_volume_dl = 0;
        self.state = TrxState::PresetSent;
        Ok(())
    }

    /// User action: pause. Only valid while `Dispensing`.
    pub fn pause<const N: usize>(&mut self, mgr: &mut PumpManager<'_, N>) -> Result<(), FsmError> {
        if self.state != TrxState::Dispensing {
            return Err(FsmError::IllegalState);
        }
        mgr.stop(self.pump_id)?;
        self.state = TrxState::Paused;
        Ok(())
    }

    /// User action: resume. Only valid while `Paused`.
    pub fn resume<const N: usize>(&mut self, mgr: &mut PumpManager<'_, N>) -> Result<(), FsmError> {
        if self.state != TrxState::Paused {
            return Err(FsmError::IllegalState);
        }
        mgr.resume(self.pump_id)?;
        self.state = TrxState::Dispensing;
        Ok(())
    }

    /// User action: cancel. `PresetSent`/`Armed` return to `Idle` with no
    /// wire action (the preset never armed); anywhere else sends `N` and
    /// moves to `Closing`.
    pub fn cancel<const N: usize>(&mut self, mgr: &mut PumpManager<'_, N>) -> Result<(), FsmError> {
        match self.state {
            TrxState::PresetSent | TrxState::Armed => {
                self.state = TrxState::Idle;
                Ok(())
            }
            TrxState::Idle => Err(FsmError::IllegalState),
            _ => {
                mgr.end(self.pump_id)?;
                self.state = TrxState::Closing;
                Ok(())
            }
        }
    }

    fn run_realtime_cycle<const N: usize>(&mut self, mgr: &mut PumpManager<'_, N>, now: Instant, status_time: Instant, vol_seq: u32, money_seq: u32) {
        match self.poll_step {
            PollStep::WaitSR => {
                if status_time != self.cycle_status_time {
                    self.cycle_status_time = status_time;
                    self.wait_vol_seq = vol_seq;
                    if mgr.poll_realtime_volume(self.pump_id).is_ok() {
                        self.poll_step = PollStep::WaitL;
                        self.last_poll_time = now;
                    }
                }
            }
            PollStep::WaitL => {
                if vol_seq != self.wait_vol_seq {
                    self.wait_money_seq = money_seq;
                    if mgr.poll_realtime_money(self.pump_id).is_ok() {
                        self.poll_step = PollStep::WaitR;
                        self.last_poll_time = now;
                    }
                } else if now.elapsed_since(self.last_poll_time) > REALTIME_STEP_TIMEOUT_MS {
                    self.poll_step = PollStep::WaitSR;
                }
            }
            PollStep::WaitR => {
                if money_seq != self.wait_money_seq {
                    self.poll_step = PollStep::WaitSR;
                } else if now.elapsed_since(self.last_poll_time) > REALTIME_STEP_TIMEOUT_MS {
                    self.poll_step = PollStep::WaitSR;
                }
            }
        }
    }

    /// Advance the FSM from the manager's current cached state for this
    /// pump. Call every manager tick.
    pub fn task<const N: usize>(&mut self, mgr: &mut PumpManager<'_, N>, now: Instant) -> Result<(), FsmError> {
        let device = *mgr.get(self.pump_id)?;
        let status = device.live.status;
        let adapter_idle = mgr.is_idle(self.pump_id)?;

        match self.state {
            TrxState::Idle => {
                if status == 9 && adapter_idle {
                    mgr.end(self.pump_id)?;
                    self.state = TrxState::Closing;
                }
            }
            TrxState::PresetSent => {
                if is_active_family(status) {
                    self.state = TrxState::Armed;
                } else if status == 1 {
                    self.state = TrxState::Idle;
                }
            }
            TrxState::Armed => {
                if matches!(status, 4 | 6) {
                    self.state = TrxState::Dispensing;
                } else if status == 1 {
                    self.state = TrxState::Idle;
                }
            }
            TrxState::Dispensing => {
                if status == 8 {
                    self.final_requested = false;
                    self.state = TrxState::Complete;
                } else if status == 1 {
                    self.state = TrxState::Idle;
                } else if is_active_family(status) && adapter_idle {
                    self.run_realtime_cycle(
                        mgr,
                        now,
                        device.live.last_status_time,
                        device.realtime.vol_seq,
                        device.realtime.money_seq,
                    );
                }
            }
            TrxState::Paused => {
                if status == 6 {
                    self.state = TrxState::Dispensing;
                } else if status == 8 {
                    self.state = TrxState::Complete;
                } else if status == 1 {
                    self.state = TrxState::Idle;
                }
            }
            TrxState::Complete => {
                if status == 8 && !self.final_requested && adapter_idle {
                    mgr.read_transaction(self.pump_id)?;
                    self.final_requested = true;
                    self.wait_trx_seq = device.final_trx.trx_final_seq;
                } else if status == 9 && adapter_idle {
                    mgr.end(self.pump_id)?;
                    self.state = TrxState::Closing;
                }
            }
            TrxState::Closing => {
                if status == 1 {
                    mgr.clear_realtime_caches(self.pump_id)?;
                    self.state = TrxState::Idle;
                }
            }
        }
        Ok(())
    }
}
