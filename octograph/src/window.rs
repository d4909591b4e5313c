use chrono::{Days, NaiveDate, TimeZone};
use chrono_tz::Tz;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::pipeline::PipelineError;

/// Half-open query window `[from, to)` handed to the metering API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    from: OffsetDateTime,
    to: OffsetDateTime,
}

impl TimeWindow {
    pub fn new(from: OffsetDateTime, to: OffsetDateTime) -> Result<Self, PipelineError> {
        if from > to {
            return Err(PipelineError::Config(format!("window starts after it ends: {from} > {to}")));
        }
        Ok(Self { from, to })
    }

    /// Window between local midnights, `from_days`/`to_days` relative to the
    /// local date of `now` in `zone` (`-1, 0` is "yesterday").
    pub fn local_days(zone: Tz, now: OffsetDateTime, from_days: i64, to_days: i64) -> Result<Self, PipelineError> {
        let today = chrono::DateTime::from_timestamp(now.unix_timestamp(), 0)
            .map(|utc| utc.with_timezone(&zone).date_naive())
            .ok_or_else(|| PipelineError::Config(format!("{now} is out of range")))?;

        Self::new(
            local_midnight(zone, shift_days(today, from_days)?)?,
            local_midnight(zone, shift_days(today, to_days)?)?,
        )
    }

    pub fn from(&self) -> OffsetDateTime {
        self.from
    }

    pub fn to(&self) -> OffsetDateTime {
        self.to
    }

    /// `(period_from, period_to)` as RFC 3339 strings.
    pub fn to_query(&self) -> Result<(String, String), PipelineError> {
        let fmt = |ts: OffsetDateTime| {
            ts.format(&Rfc3339)
                .map_err(|e| PipelineError::Config(format!("cannot format {ts}: {e}")))
        };
        Ok((fmt(self.from)?, fmt(self.to)?))
    }
}

fn shift_days(date: NaiveDate, days: i64) -> Result<NaiveDate, PipelineError> {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| PipelineError::Config(format!("{date} shifted by {days} days is out of range")))
}

pub(crate) fn local_midnight(zone: Tz, date: NaiveDate) -> Result<OffsetDateTime, PipelineError> {
    let local = date
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| zone.from_local_datetime(&midnight).earliest())
        .ok_or_else(|| PipelineError::Config(format!("midnight of {date} does not exist in {zone}")))?;

    OffsetDateTime::from_unix_timestamp(local.timestamp())
        .map_err(|e| PipelineError::Config(format!("midnight of {date} in {zone}: {e}")))
}
