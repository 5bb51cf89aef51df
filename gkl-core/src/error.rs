//! Error taxonomy shared across the link, manager, and transaction layers.

use crate::transport::TransportErrorCode;

/// Outcome of a completed (or attempted) request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("link has a request already in flight")]
    Busy,
    #[error("invalid request parameters")]
    Param,
    #[error("no response within the response timeout")]
    Timeout,
    #[error("checksum mismatch")]
    Crc,
    #[error("malformed or unexpected frame")]
    Format,
    #[error("transport error {0}")]
    Transport(TransportErrorCode),
}

/// Result of a [`crate::link::Link::send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("link has a request already in flight")]
    Busy,
    #[error("invalid request parameters")]
    Param,
    #[error("transport rejected the transmit request: {0}")]
    Transport(TransportErrorCode),
}

/// Errors raised synchronously by the [`crate::manager::PumpManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    #[error("no pump registered with this id")]
    PumpNotFound,
    #[error("the pump's adapter is busy with another exchange")]
    AdapterBusy,
    #[error("pump registry is full")]
    RegistryFull,
    #[error("a pump is already registered with this id")]
    DuplicateId,
    #[error("invalid request parameters")]
    Param,
    #[error("transport error {0}")]
    Transport(TransportErrorCode),
}

/// Errors raised synchronously by the [`crate::fsm::TransactionFsm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    #[error("requested action is not valid in the current transaction state")]
    IllegalState,
    #[error("the pump's adapter is busy with another exchange")]
    AdapterBusy,
    #[error("no pump registered with this id")]
    PumpNotFound,
    #[error("invalid request parameters")]
    Param,
    #[error("transport error {0}")]
    Transport(TransportErrorCode),
}

/// `Busy` is retried by the caller; `Param`/`Transport` are not, so they must
/// stay distinct from `AdapterBusy` rather than collapse into it -- an
/// invalid nozzle or totalizer index is not a condition retrying can fix.
impl From<SendError> for ManagerError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Busy => ManagerError::AdapterBusy,
            SendError::Param => ManagerError::Param,
            SendError::Transport(code) => ManagerError::Transport(code),
        }
    }
}

impl From<SendError> for FsmError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Busy => FsmError::AdapterBusy,
            SendError::Param => FsmError::Param,
            SendError::Transport(code) => FsmError::Transport(code),
        }
    }
}

impl From<ManagerError> for FsmError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::PumpNotFound => FsmError::PumpNotFound,
            ManagerError::AdapterBusy | ManagerError::RegistryFull | ManagerError::DuplicateId => FsmError::AdapterBusy,
            ManagerError::Param => FsmError::Param,
            ManagerError::Transport(code) => FsmError::Transport(code),
        }
    }
}
