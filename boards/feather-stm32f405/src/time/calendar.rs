//! Unix time <-> civil date conversion for the RTC
//!
//! Howard Hinnant's `civil_from_days` / `days_from_civil`, O(1) and exact for
//! the proleptic Gregorian calendar.
//! Reference: http://howardhinnant.github.io/date_algorithms.html

use embassy_stm32::rtc::{DateTime, DayOfWeek};
use hal_abstractions::RtcError;

const SECONDS_PER_DAY: u64 = 86_400;

/// 719468 = days from 0000-03-01 to 1970-01-01
const EPOCH_SHIFT: i64 = 719_468;

/// Civil date in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 1 = Monday .. 7 = Sunday
    pub weekday: u8,
}

impl CivilTime {
    pub fn from_unix(unix_secs: u64) -> Self {
        let days = (unix_secs / SECONDS_PER_DAY) as i64;
        let secs_today = unix_secs % SECONDS_PER_DAY;
        let (year, month, day) = civil_from_days(days);
        Self {
            year,
            month,
            day,
            hour: (secs_today / 3600) as u8,
            minute: ((secs_today % 3600) / 60) as u8,
            second: (secs_today % 60) as u8,
            // 1970-01-01 was a Thursday
            weekday: ((days + 3).rem_euclid(7) + 1) as u8,
        }
    }

    pub fn to_unix(self) -> u64 {
        let days = days_from_civil(self.year, self.month, self.day);
        (days.max(0) as u64) * SECONDS_PER_DAY
            + u64::from(self.hour) * 3600
            + u64::from(self.minute) * 60
            + u64::from(self.second)
    }
}

fn day_of_week(weekday: u8) -> DayOfWeek {
    match weekday {
        1 => DayOfWeek::Monday,
        2 => DayOfWeek::Tuesday,
        3 => DayOfWeek::Wednesday,
        4 => DayOfWeek::Thursday,
        5 => DayOfWeek::Friday,
        6 => DayOfWeek::Saturday,
        _ => DayOfWeek::Sunday,
    }
}

/// Convert Unix seconds to an RTC `DateTime`
///
/// Fails for dates the RTC calendar cannot hold.
pub fn unix_to_datetime(unix_secs: u64) -> Result<DateTime, RtcError> {
    let civil = CivilTime::from_unix(unix_secs);
    DateTime::from(
        civil.year,
        civil.month,
        civil.day,
        day_of_week(civil.weekday),
        civil.hour,
        civil.minute,
        civil.second,
        0,
    )
    .map_err(|_| RtcError::HardwareError)
}

/// Convert an RTC `DateTime` to Unix seconds
pub fn datetime_to_unix(dt: &DateTime) -> u64 {
    CivilTime {
        year: dt.year(),
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
        weekday: 1,
    }
    .to_unix()
}

fn civil_from_days(days_since_epoch: i64) -> (u16, u8, u8) {
    let z = days_since_epoch + EPOCH_SHIFT;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u32; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365; // [0, 399]
    let y = i64::from(yoe) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // March = 0
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = if m <= 2 { y + 1 } else { y };
    (year as u16, m, d)
}

fn days_from_civil(year: u16, month: u8, day: u8) -> i64 {
    let (y, m) = if month <= 2 {
        (i64::from(year) - 1, u32::from(month) + 9)
    } else {
        (i64::from(year), u32::from(month) - 3)
    };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as u32;
    let doy = (153 * m + 2) / 5 + u32::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + i64::from(doe) - EPOCH_SHIFT
}
