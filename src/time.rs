//! ITS time base.
//!
//! `Time32` counts TAI seconds and `Time64` TAI microseconds since
//! 2004-01-01T00:00:00Z. The leap seconds inserted since that epoch are added
//! when converting from UNIX time.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Duration;

/// 2004-01-01T00:00:00Z as UNIX timestamp
pub const ITS_EPOCH_UNIX: u64 = 1_072_915_200;

/// UNIX timestamps of the leap seconds inserted after the ITS epoch
pub const LEAP_SECONDS: [u64; 5] = [
    1_136_073_600,
    1_230_768_000,
    1_341_100_800,
    1_435_708_800,
    1_483_228_800,
];

const MICROS: u64 = 1_000_000;

pub const SECONDS_PER_YEAR: u64 = 31_556_952;
pub const SECONDS_PER_SIXTY_HOURS: u64 = 216_000;

fn leap_seconds_before(unix: u64) -> u64 {
    LEAP_SECONDS.iter().filter(|leap| **leap <= unix).count() as u64
}

/// Converts UNIX seconds to `Time32`, returns 0 before the ITS epoch
#[must_use]
pub fn unix_to_its32(unix: u64) -> u32 {
    let its = unix
        .saturating_sub(ITS_EPOCH_UNIX)
        .saturating_add(leap_seconds_before(unix));
    u32::try_from(its).unwrap_or(u32::MAX)
}

/// Converts UNIX microseconds to `Time64`
#[must_use]
pub fn unix_to_its64(unix_micros: u64) -> u64 {
    let seconds = unix_micros / MICROS;
    (seconds.saturating_sub(ITS_EPOCH_UNIX) + leap_seconds_before(seconds)) * MICROS
        + unix_micros % MICROS
}

/// Converts `Time64` back to UNIX microseconds
#[must_use]
pub fn its64_to_unix(its: u64) -> u64 {
    let seconds = its / MICROS;
    let leaps = LEAP_SECONDS
        .iter()
        .enumerate()
        .filter(|(i, leap)| **leap - ITS_EPOCH_UNIX + *i as u64 + 1 <= seconds)
        .count() as u64;
    (seconds + ITS_EPOCH_UNIX - leaps) * MICROS + its % MICROS
}

#[must_use]
pub fn time32_from_64(its: u64) -> u32 {
    u32::try_from(its / MICROS).unwrap_or(u32::MAX)
}

#[must_use]
pub fn time64_from_32(its: u32) -> u64 {
    u64::from(its) * MICROS
}

/// Length of a certificate validity duration in seconds
///
/// Sub-second durations are truncated.
#[must_use]
pub fn duration_to_seconds(duration: &Duration) -> u64 {
    match duration {
        Duration::Microseconds(v) => u64::from(v.0) / MICROS,
        Duration::Milliseconds(v) => u64::from(v.0) / 1000,
        Duration::Seconds(v) => u64::from(v.0),
        Duration::Minutes(v) => u64::from(v.0) * 60,
        Duration::Hours(v) => u64::from(v.0) * 3600,
        Duration::SixtyHours(v) => u64::from(v.0) * SECONDS_PER_SIXTY_HOURS,
        Duration::Years(v) => u64::from(v.0) * SECONDS_PER_YEAR,
    }
}

#[must_use]
pub fn add_duration(start: u32, duration: &Duration) -> u32 {
    u32::try_from(u64::from(start) + duration_to_seconds(duration)).unwrap_or(u32::MAX)
}

/// Current time as `Time64`
#[must_use]
pub fn now64() -> u64 {
    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();
    unix_to_its64(u64::try_from(unix).unwrap_or(u64::MAX))
}

#[must_use]
pub fn now32() -> u32 {
    time32_from_64(now64())
}
