//! # Time-Point Conversion
//!
//! A time-point field stores a count of resolution units since the Unix
//! epoch, as an integer or a double. The SQL side wants a calendar timestamp
//! in UTC. This module does both hops:
//!
//! ```text
//! raw ticks  <-- resolution -->  (seconds, nanoseconds)  <-- civil -->  y/m/d h:m:s.f
//! ```
//!
//! Calendar math uses the era-based civil algorithms (400-year eras of
//! 146097 days), so it is exact over the whole representable range with no
//! lookup tables. Overflow anywhere is a hard error, never a wrap.

use crate::scheme::TimeResolution;
use eyre::{ensure, eyre, Result};

const NANOS_PER_SEC: i64 = 1_000_000_000;
const SECS_PER_DAY: i64 = 86_400;

/// Raw payload value of a time-point field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeValue {
    Int(i64),
    Float(f64),
}

impl TimeResolution {
    /// Seconds per tick for second-or-coarser resolutions.
    fn secs_per_tick(&self) -> Option<i64> {
        match self {
            TimeResolution::Second => Some(1),
            TimeResolution::Minute => Some(60),
            TimeResolution::Hour => Some(3600),
            TimeResolution::Day => Some(SECS_PER_DAY),
            _ => None,
        }
    }

    /// Ticks per second for sub-second resolutions.
    fn ticks_per_sec(&self) -> Option<i64> {
        match self {
            TimeResolution::Ns => Some(1_000_000_000),
            TimeResolution::Us => Some(1_000_000),
            TimeResolution::Ms => Some(1_000),
            _ => None,
        }
    }

    fn seconds_f64(&self) -> f64 {
        match self {
            TimeResolution::Ns => 1e-9,
            TimeResolution::Us => 1e-6,
            TimeResolution::Ms => 1e-3,
            TimeResolution::Second => 1.0,
            TimeResolution::Minute => 60.0,
            TimeResolution::Hour => 3600.0,
            TimeResolution::Day => SECS_PER_DAY as f64,
        }
    }
}

/// Splits a raw time-point into whole seconds and nanoseconds since the
/// epoch. Nanoseconds are always in `0..1_000_000_000`.
pub fn split_epoch(value: TimeValue, resolution: TimeResolution) -> Result<(i64, u32)> {
    match value {
        TimeValue::Int(v) => {
            if let Some(tps) = resolution.ticks_per_sec() {
                let sec = v.div_euclid(tps);
                let frac = v.rem_euclid(tps);
                let nano = frac * (NANOS_PER_SEC / tps);
                Ok((sec, nano as u32))
            } else {
                let spt = resolution.secs_per_tick().unwrap_or(1);
                let sec = v
                    .checked_mul(spt)
                    .ok_or_else(|| eyre!("time point {} overflows at {:?}", v, resolution))?;
                Ok((sec, 0))
            }
        }
        TimeValue::Float(v) => {
            ensure!(v.is_finite(), "time point is not finite");
            let seconds = v * resolution.seconds_f64();
            ensure!(
                seconds >= i64::MIN as f64 && seconds <= i64::MAX as f64,
                "time point {} out of range",
                v
            );
            let sec = seconds.floor();
            let mut nano = ((seconds - sec) * NANOS_PER_SEC as f64).round() as i64;
            let mut sec = sec as i64;
            if nano >= NANOS_PER_SEC {
                sec += 1;
                nano -= NANOS_PER_SEC;
            }
            Ok((sec, nano as u32))
        }
    }
}

/// Joins seconds and nanoseconds back into a raw tick count at the field's
/// resolution. Integer targets truncate sub-tick precision toward negative
/// infinity; the result must fit i64.
pub fn join_epoch_int(sec: i64, nano: u32, resolution: TimeResolution) -> Result<i64> {
    if let Some(tps) = resolution.ticks_per_sec() {
        let base = sec
            .checked_mul(tps)
            .ok_or_else(|| eyre!("timestamp {} overflows at {:?}", sec, resolution))?;
        let frac = i64::from(nano) / (NANOS_PER_SEC / tps);
        base.checked_add(frac)
            .ok_or_else(|| eyre!("timestamp {} overflows at {:?}", sec, resolution))
    } else {
        let spt = resolution.secs_per_tick().unwrap_or(1);
        Ok(sec.div_euclid(spt))
    }
}

pub fn join_epoch_f64(sec: i64, nano: u32, resolution: TimeResolution) -> f64 {
    (sec as f64 + nano as f64 / NANOS_PER_SEC as f64) / resolution.seconds_f64()
}

/// A broken-down UTC calendar timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Civil {
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
}

fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m as u8, d as u8)
}

fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = i64::from(month) + if month > 2 { -3 } else { 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Breaks an epoch instant into UTC calendar components.
pub fn civil_from_epoch(sec: i64, nano: u32) -> Civil {
    let days = sec.div_euclid(SECS_PER_DAY);
    let tod = sec.rem_euclid(SECS_PER_DAY);
    let (year, month, day) = civil_from_days(days);
    Civil {
        year,
        month,
        day,
        hour: (tod / 3600) as u8,
        minute: (tod % 3600 / 60) as u8,
        second: (tod % 60) as u8,
        nanosecond: nano,
    }
}

/// Composes an epoch instant from UTC calendar components.
pub fn epoch_from_civil(civil: &Civil) -> Result<(i64, u32)> {
    ensure!(
        (1..=12).contains(&civil.month) && (1..=31).contains(&civil.day),
        "invalid calendar date {}-{}-{}",
        civil.year,
        civil.month,
        civil.day
    );
    ensure!(
        civil.hour < 24 && civil.minute < 60 && civil.second < 60,
        "invalid time of day {}:{}:{}",
        civil.hour,
        civil.minute,
        civil.second
    );
    ensure!(
        civil.nanosecond < NANOS_PER_SEC as u32,
        "invalid fraction {}",
        civil.nanosecond
    );
    let days = days_from_civil(civil.year, civil.month, civil.day);
    let tod =
        i64::from(civil.hour) * 3600 + i64::from(civil.minute) * 60 + i64::from(civil.second);
    let sec = days
        .checked_mul(SECS_PER_DAY)
        .and_then(|s| s.checked_add(tod))
        .ok_or_else(|| eyre!("calendar date {} overflows the epoch range", civil.year))?;
    Ok((sec, civil.nanosecond))
}
