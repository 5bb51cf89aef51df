//! Master-side protocol and transaction engine for CENSTAR "GasKitLink"
//! (GKL) fuel-dispenser pumps.
//!
//! This crate is the non-blocking core described in the design: a byte-level
//! datalink ([`link`]), response decoding ([`parser`]) and request encoding
//! ([`commands`]), a per-channel protocol adapter ([`adapter`]) that turns
//! frames into [`event::Event`]s, a pump registry with an adaptive polling
//! scheduler ([`manager`]), and a per-pump transaction state machine
//! ([`fsm`]). The byte transport, settings persistence, UI, and USB log
//! transport are all external collaborators reached through the traits in
//! [`transport`], [`settings`], and [`log`].
//!
//! `no_std`, no allocation after construction. Built with `std` only for
//! `#[cfg(test)]`, since there is no portable no_std test harness for code
//! this shape.

#![cfg_attr(not(test), no_std)]

pub mod adapter;
pub mod clock;
pub mod commands;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod frame;
pub mod fsm;
pub mod link;
pub mod log;
pub mod manager;
pub mod parser;
pub mod settings;
pub mod transport;

pub use adapter::{GklAdapter, PumpProtocol};
pub use clock::Instant;
pub use device::{PumpDevice, PumpId};
pub use dispatcher::{LinkDispatcher, LinkHandle};
pub use error::{FsmError, LinkError, ManagerError, SendError};
pub use event::{Address, Event, EventKind};
pub use fsm::{TransactionFsm, TrxState};
pub use link::{Link, LinkState};
pub use manager::PumpManager;
pub use settings::PumpSettings;
pub use transport::{Transport, TransportErrorCode};
