//! The GKL datalink: frame assembly, checksum validation, timeouts, and the
//! per-link state machine. One [`Link`] owns one half-duplex serial channel.

use crate::clock::Instant;
use crate::error::{LinkError, SendError};
use crate::frame::{self, Frame, MAX_DATA_LEN, MAX_FRAME_LEN};
use crate::transport::{Transport, TransportErrorCode};

/// Inter-byte timeout: a partial frame older than this is dropped.
pub const INTERBYTE_TIMEOUT_MS: u32 = 10;
/// Response timeout measured from TX-complete.
pub const RESP_TIMEOUT_MS: u32 = 200;
/// Minimum delay a well-behaved slave is expected to take before replying.
/// Documented for completeness; the master does not enforce it.
pub const RESP_DELAY_MIN_MS: u32 = 3;
/// Size of the raw-RX diagnostic ring.
pub const RAW_RX_LOG_SIZE: usize = 512;

/// Sentinel meaning "no response expected" (fire-and-forget command).
pub const NO_RESPONSE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Idle,
    TxInFlight,
    WaitResp,
    GotResp,
    Error,
}

/// A point-in-time snapshot of link health and RX diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub state: LinkState,
    pub last_error: Option<LinkError>,
    pub consecutive_fail: u8,
    pub rx_len: usize,
    pub last_rx_byte: u8,
    pub rx_total_bytes: u32,
    pub rx_total_frames: u32,
    pub rx_seen_since_tx: bool,
}

struct RawRxRing {
    buf: [u8; RAW_RX_LOG_SIZE],
    head: usize,
    tail: usize,
    overflow: bool,
}

impl RawRxRing {
    const fn new() -> Self {
        RawRxRing { buf: [0; RAW_RX_LOG_SIZE], head: 0, tail: 0, overflow: false }
    }

    fn push(&mut self, byte: u8) {
        let next = (self.head + 1) % RAW_RX_LOG_SIZE;
        if next == self.tail {
            self.overflow = true;
            return;
        }
        self.buf[self.head] = byte;
        self.head = next;
    }

    fn drain(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while self.tail != self.head && n < out.len() {
            out[n] = self.buf[self.tail];
            self.tail = (self.tail + 1) % RAW_RX_LOG_SIZE;
            n += 1;
        }
        n
    }
}

/// One half-duplex GKL channel: a [`Transport`] plus the frame/timeout state
/// machine described in the datalink design.
pub struct Link<T: Transport> {
    transport: T,

    state: LinkState,
    last_error: Option<LinkError>,
    consecutive_fail: u8,

    rx_buf: heapless::Vec<u8, MAX_FRAME_LEN>,
    rx_expected_len: Option<usize>,
    last_rx_byte_time: Instant,

    rx_seen_since_tx: bool,
    last_rx_byte: u8,
    rx_total_bytes: u32,
    rx_total_frames: u32,

    resp_ready: bool,
    last_resp: Option<Frame>,
    expected_resp_cmd: u8,

    tx_done_time: Instant,

    raw_rx: RawRxRing,
    last_transport_error: Option<TransportErrorCode>,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T) -> Self {
        Link {
            transport,
            state: LinkState::Idle,
            last_error: None,
            consecutive_fail: 0,
            rx_buf: heapless::Vec::new(),
            rx_expected_len: None,
            last_rx_byte_time: Instant::ZERO,
            rx_seen_since_tx: false,
            last_rx_byte: 0,
            rx_total_bytes: 0,
            rx_total_frames: 0,
            resp_ready: false,
            last_resp: None,
            expected_resp_cmd: NO_RESPONSE,
            tx_done_time: Instant::ZERO,
            raw_rx: RawRxRing::new(),
            last_transport_error: None,
        }
    }

    /// Arm the initial single-byte receive. Call once after construction.
    pub fn init(&mut self) -> Result<(), TransportErrorCode> {
        self.state = LinkState::Idle;
        self.rx_reset();
        self.transport.receive_one_byte()
    }

    fn rx_reset(&mut self) {
        self.rx_buf.clear();
        self.rx_expected_len = None;
    }

    fn fail(&mut self, err: LinkError) {
        self.last_error = Some(err);
        self.consecutive_fail = self.consecutive_fail.saturating_add(1);
        self.state = LinkState::Error;
        self.rx_reset();
    }

    fn succeed(&mut self) {
        self.last_error = None;
        self.consecutive_fail = 0;
    }

    /// Returns true when a new `send` would be accepted.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, LinkState::Idle | LinkState::GotResp | LinkState::Error)
    }

    /// Issue a request. See module docs for state/timing rules.
    pub fn send(
        &mut self,
        ctrl: u8,
        slave: u8,
        cmd: u8,
        data: &[u8],
        expected_resp_cmd: u8,
    ) -> Result<(), SendError> {
        if data.len() > MAX_DATA_LEN {
            return Err(SendError::Param);
        }
        if !self.is_idle() {
            return Err(SendError::Busy);
        }

        self.resp_ready = false;
        self.last_resp = None;
        self.rx_reset();
        self.rx_seen_since_tx = false;
        self.last_rx_byte = 0;
        self.last_transport_error = None;

        self.expected_resp_cmd = expected_resp_cmd;
        self.rx_expected_len = if expected_resp_cmd == NO_RESPONSE {
            None
        } else {
            frame::response_data_len(expected_resp_cmd).map(|data_len| 1 + 2 + 1 + data_len + 1)
        };

        let mut tx_buf = [0u8; MAX_FRAME_LEN];
        let tx_len = frame::build_frame(ctrl, slave, cmd, data, &mut tx_buf)
            .map_err(|_| SendError::Param)?;

        // Cache-coherence note: on a platform with non-coherent DMA, the caller's
        // Transport::transmit implementation is responsible for cleaning the
        // data cache over `tx_buf[..tx_len]` before arming the DMA engine.
        self.transport
            .transmit(&tx_buf, tx_len)
            .map_err(SendError::Transport)?;

        self.state = LinkState::TxInFlight;
        Ok(())
    }

    /// Non-blocking housekeeping: inter-byte timeout, response timeout, and
    /// the one-shot Error -> Idle auto-recovery. Call frequently from the
    /// main loop.
    pub fn task(&mut self, now: Instant) {
        // A Error latched by the *previous* task() call has now been visible
        // to one caller; clear it before evaluating anything new so Error
        // never survives more than one tick.
        if self.state == LinkState::Error {
            self.state = LinkState::Idle;
        }

        if !self.rx_buf.is_empty()
            && now.elapsed_since(self.last_rx_byte_time) > INTERBYTE_TIMEOUT_MS
        {
            self.rx_reset();
        }

        if self.state == LinkState::WaitResp
            && now.elapsed_since(self.tx_done_time) > RESP_TIMEOUT_MS
        {
            self.fail(LinkError::Timeout);
        }
    }

    pub fn has_response(&self) -> bool {
        self.resp_ready
    }

    /// Atomically consume the last response, if any, returning the link to Idle.
    pub fn get_response(&mut self) -> Option<Frame> {
        if !self.resp_ready {
            return None;
        }
        self.resp_ready = false;
        self.state = LinkState::Idle;
        self.last_resp.take()
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            state: self.state,
            last_error: self.last_error,
            consecutive_fail: self.consecutive_fail,
            rx_len: self.rx_buf.len(),
            last_rx_byte: self.last_rx_byte,
            rx_total_bytes: self.rx_total_bytes,
            rx_total_frames: self.rx_total_frames,
            rx_seen_since_tx: self.rx_seen_since_tx,
        }
    }

    pub fn drain_raw_rx(&mut self, out: &mut [u8]) -> usize {
        self.raw_rx.drain(out)
    }

    pub fn last_transport_error(&self) -> Option<TransportErrorCode> {
        self.last_transport_error
    }

    fn try_finalize(&mut self) {
        let Some(expected_len) = self.rx_expected_len else { return };
        if self.rx_buf.len() < expected_len {
            return;
        }

        let len = expected_len;
        if self.rx_buf[0] != frame::STX {
            self.fail(LinkError::Format);
            return;
        }

        let calc = frame::checksum_xor(&self.rx_buf, len);
        let recv = self.rx_buf[len - 1];
        if calc != recv {
            self.fail(LinkError::Crc);
            return;
        }

        let cmd = self.rx_buf[3];
        if self.expected_resp_cmd != NO_RESPONSE && cmd != self.expected_resp_cmd {
            self.fail(LinkError::Format);
            return;
        }

        let data_len = len - (1 + 2 + 1 + 1);
        let mut data = heapless::Vec::new();
        // data_len <= MAX_DATA_LEN is guaranteed by response_data_len's table.
        let _ = data.extend_from_slice(&self.rx_buf[4..4 + data_len]);

        self.last_resp = Some(Frame { ctrl: self.rx_buf[1], slave: self.rx_buf[2], cmd, data, checksum: recv });
        self.resp_ready = true;
        self.state = LinkState::GotResp;
        self.rx_total_frames += 1;

        self.succeed();
        self.rx_reset();
    }

    /// Transport callback: the queued transmit finished.
    pub fn on_tx_complete(&mut self, now: Instant) {
        self.tx_done_time = now;
        // Fire-and-forget requests (V/M/B/G/N) have no response to wait for;
        // latching WaitResp for them would manufacture a spurious timeout
        // 200ms later for a reply that was never coming.
        if self.expected_resp_cmd == NO_RESPONSE {
            self.state = LinkState::Idle;
        } else {
            self.state = LinkState::WaitResp;
        }
    }

    /// Transport callback: one byte has arrived.
    pub fn on_rx_byte(&mut self, now: Instant, byte: u8) {
        self.raw_rx.push(byte);
        self.last_rx_byte_time = now;
        self.rx_seen_since_tx = true;
        self.last_rx_byte = byte;
        self.rx_total_bytes += 1;

        if self.rx_buf.is_empty() && byte != frame::STX {
            let _ = self.transport.receive_one_byte();
            return;
        }

        if self.rx_buf.push(byte).is_err() {
            self.fail(LinkError::Format);
            let _ = self.transport.receive_one_byte();
            return;
        }

        self.try_finalize();
        let _ = self.transport.receive_one_byte();
    }

    /// Transport callback: a transport-level error occurred.
    pub fn on_error(&mut self, now: Instant, code: TransportErrorCode) {
        let _ = now;
        self.last_transport_error = Some(code);
        self.fail(LinkError::Transport(code));
        let _ = self.transport.receive_one_byte();
    }
}

/// Uniform callback surface a [`crate::dispatcher::LinkDispatcher`] forwards
/// transport events through, independent of the concrete [`Transport`] type.
pub trait LinkEvents {
    fn on_tx_complete(&mut self, now: Instant);
    fn on_rx_byte(&mut self, now: Instant, byte: u8);
    fn on_error(&mut self, now: Instant, code: TransportErrorCode);
}

impl<T: Transport> LinkEvents for Link<T> {
    fn on_tx_complete(&mut self, now: Instant) {
        Link::on_tx_complete(self, now)
    }

    fn on_rx_byte(&mut self, now: Instant, byte: u8) {
        Link::on_rx_byte(self, now, byte)
    }

    fn on_error(&mut self, now: Instant, code: TransportErrorCode) {
        Link::on_error(self, now, code)
    }
}
