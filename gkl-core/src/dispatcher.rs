//! Routes transport interrupt callbacks to the right [`crate::link::Link`]
//! by opaque handle, replacing the `static GKL_Link *s_links[GKL_MAX_LINKS]`
//! global table the original firmware used to find a link from a HAL UART
//! handle. Here the registry is an explicit object the application owns and
//! wires up once at init, instead of mutable global state reached from
//! anywhere.

use crate::clock::Instant;
use crate::link::LinkEvents;
use crate::transport::TransportErrorCode;

/// Default registry capacity, matching the original firmware's `GKL_MAX_LINKS`.
pub const MAX_LINKS: usize = 4;

/// Opaque identifier for a registered link. Returned by [`LinkDispatcher::register`]
/// and handed back in by the ISR-side code on every callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkHandle(u8);

/// Binds interrupt-style transport callbacks to registered links by handle.
///
/// `N` bounds how many links this dispatcher can hold; the default matches
/// the original firmware's four-link limit but callers with fewer serial
/// channels can shrink it.
pub struct LinkDispatcher<'a, const N: usize = MAX_LINKS> {
    links: heapless::Vec<Option<&'a mut dyn LinkEvents>, N>,
}

impl<'a, const N: usize> LinkDispatcher<'a, N> {
    pub fn new() -> Self {
        let mut links = heapless::Vec::new();
        for _ in 0..N {
            // Vec::push cannot fail: capacity is exactly N.
            let _ = links.push(None);
        }
        LinkDispatcher { links }
    }

    /// Register a link, returning the handle to pass to the ISR glue for this
    /// channel. Fails if the registry is already full.
    pub fn register(&mut self, link: &'a mut dyn LinkEvents) -> Result<LinkHandle, ()> {
        for (i, slot) in self.links.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(link);
                return Ok(LinkHandle(i as u8));
            }
        }
        Err(())
    }

    pub fn on_tx_complete(&mut self, handle: LinkHandle, now: Instant) {
        if let Some(Some(link)) = self.links.get_mut(handle.0 as usize) {
            link.on_tx_complete(now);
        }
    }

    pub fn on_rx_byte(&mut self, handle: LinkHandle, now: Instant, byte: u8) {
        if let Some(Some(link)) = self.links.get_mut(handle.0 as usize) {
            link.on_rx_byte(now, byte);
        }
    }

    pub fn on_error(&mut self, handle: LinkHandle, now: Instant, code: TransportErrorCode) {
        if let Some(Some(link)) = self.links.get_mut(handle.0 as usize) {
            link.on_error(now, code);
        }
    }
}

impl<'a, const N: usize> Default for LinkDispatcher<'a, N> {
    fn default() -> Self {
        Self::new()
    }
}
