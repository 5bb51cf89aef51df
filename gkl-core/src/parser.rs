//! Decodes the ASCII application-layer payloads of S/L/R/C/T responses into
//! semantic values. Total: any malformed field yields `None` rather than a
//! partial result, so callers never have to guess which half of a struct is
//! garbage.
//!
//! Only the dominant ASCII-digit encoding is implemented; some reference
//! firmware variants use BCD for L/R/C/T instead, but that needs checking
//! against the actual pump before it is worth adding here.

/// Decoded `S` (status poll) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFields {
    pub status: u8,
    pub nozzle: u8,
}

/// Decoded `L` (realtime volume) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeVolumeFields {
    pub nozzle: u8,
    pub volume_dl: u32,
}

/// Decoded `R` (realtime money) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealtimeMoneyFields {
    pub nozzle: u8,
    pub money: u32,
}

/// Decoded `C` (totalizer) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalizerFields {
    pub nozzle: u8,
    pub totalizer_dl: u32,
}

/// Decoded `T` (final transaction) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionFields {
    pub nozzle: u8,
    pub volume_dl: u32,
    pub money: u32,
    pub price: u16,
}

fn digit_value(b: u8) -> Option<u8> {
    if b.is_ascii_digit() {
        Some(b - b'0')
    } else {
        None
    }
}

fn digits_to_u32(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() {
        return None;
    }
    let mut acc: u32 = 0;
    for &b in bytes {
        let d = digit_value(b)?;
        acc = acc.checked_mul(10)?.checked_add(d as u32)?;
    }
    Some(acc)
}

/// Splits a `"<d>;<number>"` payload into its leading nozzle digit and the
/// single numeric field after it. Used by L, R, and C, which all share this
/// shape.
fn parse_nozzle_and_number(data: &[u8]) -> Option<(u8, u32)> {
    let mut parts = data.split(|&b| b == b';');
    let nozzle_field = parts.next()?;
    let nozzle = digit_value(*nozzle_field.first()?)?;
    let number_field = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let value = digits_to_u32(number_field)?;
    Some((nozzle, value))
}

pub fn parse_status(data: &[u8]) -> Option<StatusFields> {
    if data.len() != 2 {
        return None;
    }
    Some(StatusFields { status: digit_value(data[0])?, nozzle: digit_value(data[1])? })
}

pub fn parse_realtime_volume(data: &[u8]) -> Option<RealtimeVolumeFields> {
    let (nozzle, volume_cl) = parse_nozzle_and_number(data)?;
    Some(RealtimeVolumeFields { nozzle, volume_dl: volume_cl / 10 })
}

pub fn parse_realtime_money(data: &[u8]) -> Option<RealtimeMoneyFields> {
    let (nozzle, money) = parse_nozzle_and_number(data)?;
    Some(RealtimeMoneyFields { nozzle, money })
}

pub fn parse_totalizer(data: &[u8]) -> Option<TotalizerFields> {
    let (nozzle, totalizer_cl) = parse_nozzle_and_number(data)?;
    Some(TotalizerFields { nozzle, totalizer_dl: totalizer_cl / 10 })
}

/// Parses `"<d><...>;<money>;<volume_cL>;<price>"`. Everything in the first
/// field after the leading nozzle digit is ignored (some firmware packs a
/// status letter in there); the remaining three fields must be pure digits.
pub fn parse_transaction(data: &[u8]) -> Option<TransactionFields> {
    let mut parts = data.split(|&b| b == b';');
    let nozzle_field = parts.next()?;
    let nozzle = digit_value(*nozzle_field.first()?)?;
    let money = digits_to_u32(parts.next()?)?;
    let volume_cl = digits_to_u32(parts.next()?)?;
    let price = digits_to_u32(parts.next()?)?;
    if parts.next().is_some() || price > 9999 {
        return None;
    }
    Some(TransactionFields { nozzle, volume_dl: volume_cl / 10, money, price: price as u16 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_poll_idle() {
        let f = parse_status(b"10").unwrap();
        assert_eq!(f, StatusFields { status: 1, nozzle: 0 });
    }

    #[test]
    fn status_rejects_non_digit_or_wrong_length() {
        assert!(parse_status(b"1").is_none());
        assert!(parse_status(b"1x").is_none());
        assert!(parse_status(b"100").is_none());
    }

    #[test]
    fn realtime_volume_converts_cl_to_dl() {
        let f = parse_realtime_volume(b"1;000500").unwrap();
        assert_eq!(f, RealtimeVolumeFields { nozzle: 1, volume_dl: 50 });
    }

    #[test]
    fn realtime_money_has_no_unit_conversion() {
        let f = parse_realtime_money(b"1;000055").unwrap();
        assert_eq!(f, RealtimeMoneyFields { nozzle: 1, money: 55 });
    }

    #[test]
    fn totalizer_converts_cl_to_dl() {
        let f = parse_totalizer(b"2;012345").unwrap();
        assert_eq!(f, TotalizerFields { nozzle: 2, totalizer_dl: 1234 });
    }

    #[test]
    fn transaction_final_from_reference_log() {
        let f = parse_transaction(b"1p8;005610;000500;1122").unwrap();
        assert_eq!(f, TransactionFields { nozzle: 1, volume_dl: 50, money: 5610, price: 1122 });
    }

    #[test]
    fn transaction_rejects_price_over_max() {
        assert!(parse_transaction(b"1;000000;000000;10000").is_none());
    }

    #[test]
    fn malformed_payloads_yield_none_not_partial_values() {
        assert!(parse_realtime_volume(b"x;000500").is_none());
        assert!(parse_realtime_volume(b"1;00a500").is_none());
        assert!(parse_realtime_volume(b"1;000500;extra").is_none());
        assert!(parse_transaction(b"1;5610;500").is_none());
        assert!(parse_transaction(b"").is_none());
    }
}
