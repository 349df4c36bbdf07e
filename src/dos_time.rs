//! DOS date/time packing and NTFS 100ns-tick conversion.
//!
//! The packed 32-bit DOS timestamp only covers 1980-01-01 through
//! 2107-12-31; times outside that range clamp to the nearest boundary
//! rather than failing, matching how most zip writers handle pre-epoch or
//! far-future mtimes.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

const DOS_EPOCH_YEAR: i32 = 1980;
const DOS_MAX_YEAR: i32 = 2107;

/// Packs a Unix timestamp (seconds since epoch) into a DOS date/time pair,
/// clamping to the representable range.
pub fn unix_to_dos(unix_seconds: i64) -> (u16, u16) {
    let dt = match OffsetDateTime::from_unix_timestamp(unix_seconds) {
        Ok(dt) => dt,
        Err(_) => return clamp_bound(unix_seconds),
    };
    if dt.year() < DOS_EPOCH_YEAR {
        return (dos_date(DOS_EPOCH_YEAR, Month::January, 1), 0);
    }
    if dt.year() > DOS_MAX_YEAR {
        return (
            dos_date(DOS_MAX_YEAR, Month::December, 31),
            dos_time(23, 59, 58),
        );
    }
    (
        dos_date(dt.year(), dt.month(), dt.day()),
        dos_time(dt.hour(), dt.minute(), dt.second()),
    )
}

fn clamp_bound(unix_seconds: i64) -> (u16, u16) {
    if unix_seconds < 0 {
        (dos_date(DOS_EPOCH_YEAR, Month::January, 1), 0)
    } else {
        (
            dos_date(DOS_MAX_YEAR, Month::December, 31),
            dos_time(23, 59, 58),
        )
    }
}

fn dos_date(year: i32, month: Month, day: u8) -> u16 {
    (((year - DOS_EPOCH_YEAR) as u16) << 9) | ((month as u16) << 5) | day as u16
}

fn dos_time(hour: u8, minute: u8, second: u8) -> u16 {
    ((hour as u16) << 11) | ((minute as u16) << 5) | ((second / 2) as u16)
}

/// Unpacks a DOS date/time pair into a Unix timestamp, or `None` if the
/// packed fields don't form a valid calendar date/time (some archives carry
/// zeroed or garbage timestamps).
pub fn dos_to_unix(date: u16, time: u16) -> Option<i64> {
    dos_to_primitive(date, time).map(|pdt| pdt.assume_utc().unix_timestamp())
}

fn dos_to_primitive(date: u16, time: u16) -> Option<PrimitiveDateTime> {
    let year = DOS_EPOCH_YEAR + ((date >> 9) & 0x7f) as i32;
    let month = Month::try_from(((date >> 5) & 0x0f) as u8).ok()?;
    let day = (date & 0x1f) as u8;
    let hour = ((time >> 11) & 0x1f) as u8;
    let minute = ((time >> 5) & 0x3f) as u8;
    let second = ((time & 0x1f) * 2) as u8;
    Some(PrimitiveDateTime::new(
        Date::from_calendar_date(year, month, day).ok()?,
        Time::from_hms(hour, minute, second).ok()?,
    ))
}

/// NTFS extra-field timestamps are 64-bit counts of 100ns ticks since
/// 1601-01-01 00:00:00 UTC.
const NTFS_EPOCH_OFFSET_SECONDS: i64 = 11_644_473_600;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// Converts a Unix timestamp (seconds) to an NTFS 100ns-tick count.
pub fn unix_to_ntfs(unix_seconds: i64) -> u64 {
    let ntfs_seconds = unix_seconds + NTFS_EPOCH_OFFSET_SECONDS;
    (ntfs_seconds * TICKS_PER_SECOND).max(0) as u64
}

/// Converts an NTFS 100ns-tick count to a Unix timestamp (seconds).
pub fn ntfs_to_unix(ticks: u64) -> i64 {
    (ticks as i64) / TICKS_PER_SECOND - NTFS_EPOCH_OFFSET_SECONDS
}
