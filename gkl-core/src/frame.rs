//! GasKitLink wire frame: build, checksum, and the on-wire layout constants.
//!
//! Frame format: `<STX> <ctrl> <slave> <cmd> <data[0..22]> <xor>`.

/// Start-of-text byte that opens every GKL frame.
pub const STX: u8 = 0x02;

/// Maximum application-layer data payload, in bytes.
pub const MAX_DATA_LEN: usize = 22;

/// Maximum full frame length: STX + ctrl + slave + cmd + data + xor.
pub const MAX_FRAME_LEN: usize = 1 + 2 + 1 + MAX_DATA_LEN + 1;

/// Fixed positions within a frame buffer.
const IDX_STX: usize = 0;
const IDX_CTRL: usize = 1;
const IDX_SLAVE: usize = 2;
const IDX_CMD: usize = 3;
const IDX_DATA: usize = 4;

/// A decoded GKL frame: one request or one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub ctrl: u8,
    pub slave: u8,
    pub cmd: u8,
    pub data: heapless::Vec<u8, MAX_DATA_LEN>,
    pub checksum: u8,
}

impl Frame {
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// XOR of `frame[1..len-1]` (i.e. everything between STX and the checksum byte,
/// inclusive of both ends of that range). `frame` must be at least 5 bytes long
/// (STX + ctrl + slave + cmd + checksum) or the result is defined as 0.
pub fn checksum_xor(frame: &[u8], len: usize) -> u8 {
    if len < 5 || frame.len() < len {
        return 0;
    }
    let mut x = 0u8;
    for &b in &frame[1..len - 1] {
        x ^= b;
    }
    x
}

/// Errors from building a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("data payload exceeds {MAX_DATA_LEN} bytes")]
    DataTooLong,
}

/// Build a frame's wire bytes into `out`, returning the number of bytes written.
///
/// `out` must be at least `MAX_FRAME_LEN` bytes.
pub fn build_frame(
    ctrl: u8,
    slave: u8,
    cmd: u8,
    data: &[u8],
    out: &mut [u8; MAX_FRAME_LEN],
) -> Result<usize, BuildError> {
    if data.len() > MAX_DATA_LEN {
        return Err(BuildError::DataTooLong);
    }

    out[IDX_STX] = STX;
    out[IDX_CTRL] = ctrl;
    out[IDX_SLAVE] = slave;
    out[IDX_CMD] = cmd;
    out[IDX_DATA..IDX_DATA + data.len()].copy_from_slice(data);

    let checksum_idx = IDX_DATA + data.len();
    let total_len = checksum_idx + 1;
    out[checksum_idx] = 0;
    out[checksum_idx] = checksum_xor(&out[..total_len], total_len);

    Ok(total_len)
}

/// Response application-layer data length for a given response command letter.
/// `None` means the length is unknown/variable and must be discovered some other way.
pub fn response_data_len(resp_cmd: u8) -> Option<usize> {
    match resp_cmd {
        b'S' => Some(2),
        b'L' => Some(10),
        b'R' => Some(10),
        b'T' => Some(22),
        b'C' => Some(11),
        b'Z' => Some(6),
        b'D' => Some(2),
        _ => None,
    }
}
