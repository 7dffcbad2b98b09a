//! Time-related utilities

use chrono::NaiveDate;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;
pub const NANOS_PER_MICRO: i64 = 1_000;

/// Seconds since the UNIX epoch for a UTC calendar time.
///
/// Returns `None` for dates that do not exist (e.g. February 30th).
pub fn mk_time(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<i64> {
    let datetime = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, min, sec)?;
    Some(datetime.and_utc().timestamp())
}

/// Convert a microsecond delta to nanoseconds
pub fn micros_to_nanos(us: i64) -> i64 {
    us.saturating_mul(NANOS_PER_MICRO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mk_time() {
        assert_eq!(mk_time(1970, 1, 1, 0, 0, 0), Some(0));
        assert_eq!(mk_time(2020, 1, 2, 3, 4, 5), Some(1_577_934_245));
        assert_eq!(mk_time(2021, 2, 30, 0, 0, 0), None);
    }

    #[test]
    fn test_micros_to_nanos() {
        assert_eq!(micros_to_nanos(5), 5_000);
        assert_eq!(micros_to_nanos(-2), -2_000);
    }
}
