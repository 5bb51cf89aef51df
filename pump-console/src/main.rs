//! Host-side console that drives `gkl-core` against a simulated pump fleet:
//! an in-process stand-in for the firmware main loop that would otherwise
//! run against real hardware. Ticks the manager and transaction state
//! machines on a fixed interval, accepts line-oriented commands from
//! stdin, and logs cached pump state with `tracing`.

mod commands;
mod logsink;
mod settings;
mod shared;
mod sim;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use gkl_core::fsm::TransactionFsm;
use gkl_core::link::LinkEvents;
use gkl_core::log::LogTarget;
use gkl_core::{GklAdapter, Instant, Link, PumpManager, PumpSettings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use commands::ConsoleCommand;
use logsink::TracingLogSink;
use shared::SharedAdapter;
use sim::SimTransport;

const TICK: Duration = Duration::from_millis(50);
const SETTINGS_PATH: &str = "pump-settings.json";
const MAX_PUMPS: usize = 4;

fn default_settings() -> Vec<PumpSettings> {
    vec![
        PumpSettings { id: 1, ctrl_addr: 0x00, slave_addr: 0x01, price: 1122 },
        PumpSettings { id: 2, ctrl_addr: 0x00, slave_addr: 0x02, price: 1199 },
    ]
}

/// One simulated pump's collaborators: the shared adapter handle the
/// manager drives, a second handle this loop drives as a stand-in UART ISR,
/// the transport backing both, and the transaction state machine tracking
/// this pump's fill.
struct Pump {
    adapter: Rc<RefCell<GklAdapter<SimTransport, TracingLogSink, MAX_PUMPS>>>,
    transport: SimTransport,
    fsm: TransactionFsm,
}

fn monotonic_ms(epoch: std::time::Instant) -> Instant {
    Instant(epoch.elapsed().as_millis().min(u32::MAX as u128) as u32)
}

fn print_status(mgr: &PumpManager<'_, MAX_PUMPS>, ids: &[u8]) {
    for &id in ids {
        match mgr.get(id) {
            Ok(dev) => println!(
                "pump {id}: status={} nozzle={} rt_volume_dl={} rt_money={} last_trx_money={}",
                dev.live.status, dev.live.nozzle, dev.realtime.rt_volume_dl, dev.realtime.rt_money, dev.final_trx.trx_money
            ),
            Err(e) => println!("pump {id}: {e}"),
        }
    }
}

fn print_help() {
    println!(
        "commands:\n  preset-volume <pump> <nozzle> <volume_dl> <price>\n  preset-money <pump> <nozzle> <money> <price>\n  pause <pump>\n  resume <pump>\n  cancel <pump>\n  status\n  quit"
    );
}

fn fsm_for<'p>(pumps: &'p mut [Pump], ids: &[u8], id: u8) -> Option<&'p mut TransactionFsm> {
    let index = ids.iter().position(|&pid| pid == id)?;
    Some(&mut pumps[index].fsm)
}

fn dispatch(cmd: ConsoleCommand, mgr: &mut PumpManager<'_, MAX_PUMPS>, pumps: &mut [Pump], ids: &[u8]) -> bool {
    match cmd {
        ConsoleCommand::PresetVolume { pump, nozzle, volume_dl, price } => match fsm_for(pumps, ids, pump) {
            Some(fsm) => {
                if let Err(e) = fsm.start_volume(mgr, nozzle, volume_dl, price) {
                    warn!(pump, error = %e, "preset-volume rejected");
                }
            }
            None => println!("no such pump {pump}"),
        },
        ConsoleCommand::PresetMoney { pump, nozzle, money, price } => match fsm_for(pumps, ids, pump) {
            Some(fsm) => {
                if let Err(e) = fsm.start_money(mgr, nozzle, money, price) {
                    warn!(pump, error = %e, "preset-money rejected");
                }
            }
            None => println!("no such pump {pump}"),
        },
        ConsoleCommand::Pause { pump } => match fsm_for(pumps, ids, pump) {
            Some(fsm) => {
                if let Err(e) = fsm.pause(mgr) {
                    warn!(pump, error = %e, "pause rejected");
                }
            }
            None => println!("no such pump {pump}"),
        },
        ConsoleCommand::Resume { pump } => match fsm_for(pumps, ids, pump) {
            Some(fsm) => {
                if let Err(e) = fsm.resume(mgr) {
                    warn!(pump, error = %e, "resume rejected");
                }
            }
            None => println!("no such pump {pump}"),
        },
        ConsoleCommand::Cancel { pump } => match fsm_for(pumps, ids, pump) {
            Some(fsm) => {
                if let Err(e) = fsm.cancel(mgr) {
                    warn!(pump, error = %e, "cancel rejected");
                }
            }
            None => println!("no such pump {pump}"),
        },
        ConsoleCommand::Status => print_status(mgr, ids),
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => return true,
    }
    false
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("pump console starting");

    let settings_path = PathBuf::from(SETTINGS_PATH);
    let settings = settings::load(&settings_path).unwrap_or_else(|_| {
        info!(path = SETTINGS_PATH, "no settings file found, starting from defaults");
        default_settings()
    });

    let mut shared_handles: Vec<SharedAdapter<SimTransport, TracingLogSink, MAX_PUMPS>> = Vec::new();
    let mut mgr: PumpManager<'_, MAX_PUMPS> = PumpManager::new(500);
    let mut pumps: Vec<Pump> = Vec::new();
    let mut ids: Vec<u8> = Vec::new();

    for (i, s) in settings.iter().enumerate() {
        let transport = SimTransport::new();
        let mut link = Link::new(transport.clone());
        link.init().map_err(|e| anyhow::anyhow!("link init failed: transport error {e}"))?;
        let addr = gkl_core::Address { ctrl_addr: s.ctrl_addr, slave_addr: s.slave_addr };
        let log_target = match i {
            0 => LogTarget::Trk1,
            1 => LogTarget::Trk2,
            _ => LogTarget::Both,
        };
        let adapter: Rc<RefCell<GklAdapter<SimTransport, TracingLogSink, MAX_PUMPS>>> =
            Rc::new(RefCell::new(GklAdapter::with_log_sink(link, addr, log_target, TracingLogSink)));
        shared_handles.push(SharedAdapter(adapter.clone()));
        pumps.push(Pump { adapter, transport, fsm: TransactionFsm::new(s.id) });
        ids.push(s.id);
    }
    for (s, handle) in settings.iter().zip(shared_handles.iter_mut()) {
        mgr.add(s.id, s.ctrl_addr, s.slave_addr, s.price, handle)?;
    }

    let epoch = std::time::Instant::now();

    let (tx, mut rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });

    print_help();
    let mut interval = tokio::time::interval(TICK);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = monotonic_ms(epoch);
                mgr.task(now);

                for pump in pumps.iter_mut() {
                    if let Some(response) = pump.transport.take_pending() {
                        pump.adapter.borrow_mut().on_tx_complete(now);
                        if let Some(bytes) = response {
                            for &b in bytes.iter() {
                                pump.adapter.borrow_mut().on_rx_byte(now, b);
                            }
                        }
                    }
                    pump.transport.advance();

                    if let Err(e) = pump.fsm.task(&mut mgr, now) {
                        warn!(error = %e, "fsm tick failed");
                    }
                }
            }
            line = rx.recv() => {
                let Some(line) = line else {
                    info!("stdin closed, shutting down");
                    break;
                };
                match commands::parse_line(&line) {
                    Ok(cmd) => {
                        if dispatch(cmd, &mut mgr, &mut pumps, &ids) {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c, shutting down");
                break;
            }
        }
    }

    let snapshot: Vec<PumpSettings> = ids.iter().filter_map(|&id| mgr.settings_for(id).ok()).collect();
    settings::save(&settings_path, &snapshot)?;
    Ok(())
}
