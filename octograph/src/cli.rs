use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    pipeline::PipelineError,
    window::{local_midnight, TimeWindow},
};

/// Flags shared by every binary.
#[derive(Debug, Default, Clone, PartialEq, Eq, Parser)]
pub struct RunArgs {
    /// Config file; defaults to $OCTOGRAPH_CONFIG, then octograph.toml
    #[arg(short, long)]
    pub config: Option<String>,
    /// Window start: RFC 3339 instant or YYYY-MM-DD (local midnight)
    #[arg(long)]
    pub from: Option<String>,
    /// Window end: RFC 3339 instant or YYYY-MM-DD (local midnight)
    #[arg(long)]
    pub to: Option<String>,
}

impl RunArgs {
    /// Query window from `--from`/`--to`, falling back to local midnights
    /// `default_days` relative to today in `zone`.
    pub fn window(&self, zone: Tz, now: OffsetDateTime, default_days: (i64, i64)) -> Result<TimeWindow, PipelineError> {
        let defaults = TimeWindow::local_days(zone, now, default_days.0, default_days.1)?;

        let from = match &self.from {
            Some(s) => parse_bound(s, zone)?,
            None => defaults.from(),
        };
        let to = match &self.to {
            Some(s) => parse_bound(s, zone)?,
            None => defaults.to(),
        };

        TimeWindow::new(from, to)
    }
}

/// `YYYY-MM-DD` is local midnight in `zone`; anything else must be RFC 3339.
fn parse_bound(s: &str, zone: Tz) -> Result<OffsetDateTime, PipelineError> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return local_midnight(zone, date);
    }
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| PipelineError::Config(format!("invalid time '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn parse(list: &[&str]) -> Result<RunArgs, clap::Error> {
        RunArgs::try_parse_from(std::iter::once("octograph").chain(list.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        RunArgs::command().debug_assert();
    }

    #[test]
    fn no_arguments_means_defaults() {
        assert_eq!(parse(&[]).unwrap(), RunArgs::default());
    }

    #[test]
    fn flags_accept_separate_and_inline_values() {
        let parsed = parse(&["-c", "a.toml", "--from=2023-06-01"]).unwrap();

        assert_eq!(parsed.config.as_deref(), Some("a.toml"));
        assert_eq!(parsed.from.as_deref(), Some("2023-06-01"));
        assert!(parsed.to.is_none());
    }

    #[test]
    fn missing_value_and_unknown_flag_are_rejected() {
        assert!(parse(&["--to"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }

    #[test]
    fn window_defaults_to_yesterday() {
        let w = RunArgs::default()
            .window(chrono_tz::UTC, datetime!(2023-06-01 08:00 UTC), (-1, 0))
            .unwrap();
        assert_eq!(w.from(), datetime!(2023-05-31 00:00 UTC));
        assert_eq!(w.to(), datetime!(2023-06-01 00:00 UTC));
    }

    #[test]
    fn dates_are_local_midnights_and_rfc3339_is_exact() {
        let parsed = parse(&["--from", "2023-06-01", "--to", "2023-06-01T12:00:00+01:00"]).unwrap();
        let w = parsed
            .window(chrono_tz::Europe::London, datetime!(2023-06-10 08:00 UTC), (-1, 0))
            .unwrap();

        assert_eq!(w.from(), datetime!(2023-05-31 23:00 UTC));
        assert_eq!(w.to(), datetime!(2023-06-01 11:00 UTC));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let parsed = parse(&["--from", "2023-06-02", "--to", "2023-06-01"]).unwrap();
        assert!(parsed.window(chrono_tz::UTC, datetime!(2023-06-10 08:00 UTC), (-1, 0)).is_err());
    }
}
