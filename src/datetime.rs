//! Numeric datetime encoding shared by every `LineBuffer` that stores a
//! datetime line (C3). A single `f64` represents days since `0001-01-01`
//! with the fractional part encoding intraday time, so datetimes compare
//! and subtract like any other line value. Time zones, when configured,
//! are applied only at display time (§6).

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

/// `0001-01-01` as a `NaiveDate`, the fixed epoch for [`to_num`]/[`from_num`].
fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).expect("epoch date is valid")
}

/// Encodes a UTC datetime as days-since-epoch with fractional intraday time.
pub fn to_num(dt: DateTime<Utc>) -> f64 {
    let naive = dt.naive_utc();
    let days = (naive.date() - epoch()).num_days() as f64;
    let secs_in_day = naive.time().num_seconds_from_midnight() as f64
        + naive.time().nanosecond() as f64 / 1_000_000_000.0;
    days + secs_in_day / 86_400.0
}

/// Decodes a numeric datetime back into a UTC `DateTime`. This is the
/// inverse of [`to_num`]: encoding then decoding a representable instant
/// is the identity (§8 round-trip law), modulo sub-microsecond rounding
/// inherent to `f64`.
pub fn from_num(value: f64) -> DateTime<Utc> {
    let days = value.floor();
    let frac = value - days;
    let date = epoch() + chrono::Duration::days(days as i64);
    let nanos_in_day = (frac * 86_400.0 * 1_000_000_000.0).round() as i64;
    let naive = NaiveDateTime::new(date, chrono::NaiveTime::MIN)
        + chrono::Duration::nanoseconds(nanos_in_day);
    Utc.from_utc_datetime(&naive)
}

/// Applies a display-only time zone conversion. Never used internally for
/// comparisons — only for rendering (e.g. in the CSV [`Writer`](crate::writer)).
pub fn display_in_tz(value: f64, tz: &chrono_tz::Tz) -> chrono::DateTime<chrono_tz::Tz> {
    from_num(value).with_timezone(tz)
}

/// The ISO week/year pair used to bucket weekly resample boundaries (§4.3).
pub fn iso_week_key(value: f64) -> (i32, u32) {
    let dt = from_num(value);
    let iso = dt.iso_week();
    (iso.year(), iso.week())
}

/// The calendar (year, month) pair used to bucket monthly boundaries.
pub fn month_key(value: f64) -> (i32, u32) {
    let dt = from_num(value);
    (dt.year(), dt.month())
}

/// The calendar year used to bucket yearly boundaries.
pub fn year_key(value: f64) -> i32 {
    from_num(value).year()
}

/// The calendar day (proleptic Gregorian ordinal) used to bucket daily
/// boundaries, independent of time-of-day.
pub fn day_key(value: f64) -> i64 {
    let dt = from_num(value);
    dt.date_naive().num_days_from_ce() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trip_identity() {
        let original = Utc.with_ymd_and_hms(2023, 6, 15, 13, 45, 30).unwrap();
        let encoded = to_num(original);
        let decoded = from_num(encoded);
        assert_eq!(original.date_naive(), decoded.date_naive());
        assert!((original.timestamp() - decoded.timestamp()).abs() <= 1);
    }

    #[test]
    fn days_increase_monotonically() {
        let a = to_num(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
        let b = to_num(Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap());
        assert!(b > a);
        assert!((b - a - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iso_week_key_groups_same_week() {
        let mon = to_num(Utc.with_ymd_and_hms(2023, 6, 12, 0, 0, 0).unwrap());
        let fri = to_num(Utc.with_ymd_and_hms(2023, 6, 16, 0, 0, 0).unwrap());
        assert_eq!(iso_week_key(mon), iso_week_key(fri));
    }
}
