use chrono::{Offset, TimeZone};
use chrono_tz::Tz;
use octograph_client::domain::RateBand;
use time::{macros::time, Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use super::schedule::{LowBand, RateSchedule};

/// Closed wall-clock interval on one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LocalInterval {
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
}

impl LocalInterval {
    fn on(date: Date, start: Time, end: Time) -> Self {
        Self {
            start: PrimitiveDateTime::new(date, start),
            end: PrimitiveDateTime::new(date, end),
        }
    }

    fn contains(&self, at: PrimitiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

const LAST_SECOND: Time = time!(23:59:59);

impl LowBand {
    /// Low-rate intervals of the local day `date`. A band crossing midnight is
    /// split at the day boundary, so both halves belong to `date`.
    fn intervals_on(&self, date: Date) -> Vec<LocalInterval> {
        if self.crosses_midnight() {
            vec![
                LocalInterval::on(date, self.start, LAST_SECOND),
                LocalInterval::on(date, Time::MIDNIGHT, self.end),
            ]
        } else {
            vec![LocalInterval::on(date, self.start, self.end)]
        }
    }
}

/// Offset of `zone` from UTC at `instant`.
fn offset_at(zone: Tz, instant: OffsetDateTime) -> UtcOffset {
    // Every `OffsetDateTime` lies inside chrono's range, so the UTC fallback
    // is unreachable in practice.
    chrono::DateTime::from_timestamp(instant.unix_timestamp(), 0)
        .map(|utc| zone.offset_from_utc_datetime(&utc.naive_utc()).fix().local_minus_utc())
        .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
        .unwrap_or(UtcOffset::UTC)
}

/// Wall-clock date and time of `instant` in `zone`.
pub fn local_datetime(instant: OffsetDateTime, zone: Tz) -> PrimitiveDateTime {
    let local = instant.to_offset(offset_at(zone, instant));
    PrimitiveDateTime::new(local.date(), local.time())
}

/// Rate band of `schedule` in force at `instant`.
pub fn resolve(schedule: &RateSchedule, instant: OffsetDateTime) -> RateBand {
    let band = match schedule {
        RateSchedule::Flat { .. } => return RateBand::Flat,
        RateSchedule::Banded { low_band: None, .. } => return RateBand::High,
        RateSchedule::Banded {
            low_band: Some(band), ..
        } => band,
    };

    if band.is_degenerate() {
        return RateBand::High;
    }

    // Band edges have whole-second resolution; drop the fraction so that
    // 23:59:59.5 still counts as the end of the day.
    let local = local_datetime(instant, band.zone);
    let local = local.replace_nanosecond(0).unwrap_or(local);

    if band.intervals_on(local.date()).iter().any(|i| i.contains(local)) {
        RateBand::Low
    } else {
        RateBand::High
    }
}
