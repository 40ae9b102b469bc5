//! Weekly resample/replay over three full trading weeks (Mon-Fri, 15
//! daily bars total) of strictly increasing closes, chosen so the
//! weekly aggregate is hand-checkable: each week's five closes are five
//! consecutive integers, landing the Friday closes on `14`, `19`, `24`,
//! and `SMA(2)` over those three weekly closes is trivially
//! `[NaN, 16.5, 21.5]`.

use barback::{
    data::{Bar, DataSeries, TimeFrame, TimeFrameSpec, VecFeed},
    indicator::{sma::Sma, Indicator},
    resample::{Replayer, Resampler},
};
use chrono::{TimeZone, Utc};

fn d(y: i32, m: u32, day: u32) -> f64 {
    barback::datetime::to_num(Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap())
}

fn bar(dt: f64, open: f64, close: f64) -> Bar {
    Bar {
        datetime: dt,
        open,
        high: open.max(close) + 0.5,
        low: open.min(close) - 0.5,
        close,
        volume: 10.0,
        openinterest: 0.0,
    }
}

/// Three ISO weeks of 2024 (Jan 1 is a Monday), Mon-Fri, closes counting
/// up `10..=24` so each week's five closes are five consecutive
/// integers and the Friday close is `14`, `19`, `24`. Each week's Monday
/// open is the prior week's Friday close (`9`, `14`, `19`).
fn three_weeks() -> Vec<Bar> {
    let week_starts = [(2024, 1, 1), (2024, 1, 8), (2024, 1, 15)];
    let mut bars = Vec::new();
    let mut close = 9.0;
    for &(y, m, start_day) in &week_starts {
        for day_offset in 0..5u32 {
            let open = close;
            close += 1.0;
            bars.push(bar(d(y, m, start_day + day_offset), open, close));
        }
    }
    bars
}

fn daily_source() -> DataSeries {
    let feed = VecFeed::new("daily", TimeFrameSpec::new(TimeFrame::Days, 1), three_weeks());
    let mut ds = DataSeries::new(Box::new(feed));
    ds.start().unwrap();
    ds
}

#[test]
fn resample_emits_exactly_one_bar_per_week_with_friday_closes() {
    let mut resampler = Resampler::new(
        daily_source(),
        TimeFrameSpec::new(TimeFrame::Weeks, 1),
        None,
        false,
    );
    resampler.start().unwrap();

    let week1 = resampler.fetch_next().unwrap().expect("week 1 completes once week 2 opens");
    assert_eq!(week1.close, 14.0);
    assert_eq!(week1.open, 9.0);

    let week2 = resampler.fetch_next().unwrap().expect("week 2 completes once week 3 opens");
    assert_eq!(week2.close, 19.0);
    assert_eq!(week2.open, 14.0);

    let week3 = resampler.fetch_next().unwrap().expect("trailing week 3 partial flushes on exhaustion");
    assert_eq!(week3.close, 24.0);
    assert_eq!(week3.open, 19.0);

    assert!(resampler.fetch_next().unwrap().is_none());
}

#[test]
fn sma_over_the_resampled_weekly_closes_matches_hand_computation() {
    let weekly_feed = Resampler::new(daily_source(), TimeFrameSpec::new(TimeFrame::Weeks, 1), None, false);
    let mut weekly = DataSeries::new(Box::new(weekly_feed));
    weekly.start().unwrap();
    weekly.preload().unwrap();

    let close_line = weekly.line(barback::data::OhlcvLine::Close);
    assert_eq!(close_line.borrow().size(), 3, "three completed weeks");

    let mut sma = Sma::new(close_line, 2);
    sma.set_minperiod(2);
    sma.once(0, 3);

    let out = sma.line();
    let out = out.borrow();
    assert!(out.at(0).is_nan());
    assert!((out.at(1) - 16.5).abs() < 1e-9);
    assert!((out.at(2) - 21.5).abs() < 1e-9);
}

#[test]
fn replay_seals_on_the_first_bar_of_every_week_including_the_very_first() {
    let mut replayer = Replayer::new(
        daily_source(),
        TimeFrameSpec::new(TimeFrame::Weeks, 1),
        None,
        false,
    );
    replayer.start().unwrap();

    let mut seals = Vec::new();
    while replayer.fetch_next().unwrap().is_some() {
        seals.push(replayer.sealed_previous());
    }

    assert_eq!(seals.len(), 15);
    // Monday of week1 (idx0), Monday of week2 (idx5), Monday of week3 (idx10)
    // each open a new period; every other day updates in place.
    let expected: Vec<bool> = (0..15).map(|i| i == 0 || i == 5 || i == 10).collect();
    assert_eq!(seals, expected);
}

#[test]
fn replay_updates_the_in_progress_bar_within_a_week() {
    let mut replayer = Replayer::new(
        daily_source(),
        TimeFrameSpec::new(TimeFrame::Weeks, 1),
        None,
        false,
    );
    replayer.start().unwrap();

    let mon = replayer.fetch_next().unwrap().unwrap();
    assert_eq!(mon.close, 10.0);
    assert_eq!(mon.open, 9.0);

    let tue = replayer.fetch_next().unwrap().unwrap();
    assert_eq!(tue.close, 11.0); // updated in place
    assert_eq!(tue.open, 9.0); // week's open carried forward, not reset
    assert!(!replayer.sealed_previous());
}
