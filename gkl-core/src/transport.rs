//! The byte transport interface consumed by a [`crate::link::Link`].
//!
//! The concrete serial driver (UART peripheral bring-up, DMA configuration,
//! interrupt vectoring) lives entirely outside this crate, per the
//! project's scope: this trait only captures the shape of the
//! asynchronous request/callback contract the link layer relies on.

/// A transport error code as reported by [`Transport::on_error`]/`transmit`.
///
/// The concrete meaning of the code is transport-specific (e.g. a HAL
/// `ErrorCode` bitmask); the link layer treats it as opaque diagnostics.
pub type TransportErrorCode = u32;

/// Non-blocking, callback-driven byte transport.
///
/// Implementors own a single half-duplex serial channel. `transmit` and
/// `receive_one_byte` must return immediately; completion is reported later
/// through the [`TransportEvents`] callbacks on the link that owns this
/// transport, invoked from interrupt context.
pub trait Transport {
    /// Start an asynchronous transmit of `buf[..len]`. Returns `Err` only for
    /// immediate submission failures (e.g. the DMA engine is busy); otherwise
    /// completion is signaled later via `on_tx_complete`.
    fn transmit(&mut self, buf: &[u8], len: usize) -> Result<(), TransportErrorCode>;

    /// Arm reception of exactly one byte. Completion is signaled via
    /// `on_rx_byte`, after which the caller must re-arm.
    fn receive_one_byte(&mut self) -> Result<(), TransportErrorCode>;
}

// The callback side of the contract -- on_tx_complete / on_rx_byte / on_error,
// invoked from interrupt context in a real deployment -- is `link::LinkEvents`,
// not a trait here. Those callbacks need a timestamp (there is no global
// clock in this crate, see `clock`), which put them with `Link` rather than
// alongside `Transport`.
