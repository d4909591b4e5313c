use chrono_tz::Tz;
use octograph_client::domain::RateBand;
use time::{macros::format_description, Time};

use crate::pipeline::PipelineError;

/// Tariff of one metering point.
#[derive(Debug, Clone, PartialEq)]
pub enum RateSchedule {
    /// Single rate around the clock.
    Flat { unit_rate: f64 },
    /// Two rates; `low_band` says when the low one applies. Without it the
    /// high rate applies all day.
    Banded {
        unit_rate_high: f64,
        unit_rate_low: f64,
        low_band: Option<LowBand>,
    },
}

impl RateSchedule {
    /// Static unit rate charged in `band`.
    pub fn unit_rate(&self, band: RateBand) -> f64 {
        match (self, band) {
            (Self::Flat { unit_rate }, _) => *unit_rate,
            (Self::Banded { unit_rate_low, .. }, RateBand::Low) => *unit_rate_low,
            (Self::Banded { unit_rate_high, .. }, _) => *unit_rate_high,
        }
    }
}

/// Daily low-rate period as wall-clock times in `zone`.
///
/// `start > end` means the period crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LowBand {
    pub start: Time,
    pub end: Time,
    pub zone: Tz,
}

impl LowBand {
    pub fn new(start: Time, end: Time, zone: Tz) -> Self {
        Self { start, end, zone }
    }

    pub fn crosses_midnight(&self) -> bool {
        self.start > self.end
    }

    /// A zero-length period never applies.
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }
}

/// Parses `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(s: &str) -> Result<Time, PipelineError> {
    let s = s.trim();
    Time::parse(s, format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(s, format_description!("[hour]:[minute]")))
        .map_err(|e| PipelineError::Config(format!("invalid time of day '{s}': {e}")))
}

/// Scalar applied to raw consumption before any rate logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion(f64);

impl UnitConversion {
    pub fn new(factor: f64) -> Result<Self, PipelineError> {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(PipelineError::Config(format!(
                "conversion factor must be positive, got {factor}"
            )));
        }
        Ok(Self(factor))
    }

    /// m³ to kWh for meters reporting gas volume.
    pub fn gas_volume_to_kwh(volume_correction_factor: f64, calorific_value: f64) -> Result<Self, PipelineError> {
        Self::new(volume_correction_factor * calorific_value / 3.6)
    }

    pub fn factor(&self) -> f64 {
        self.0
    }

    pub fn apply(&self, consumption: f64) -> f64 {
        consumption * self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::time;

    #[test]
    fn parses_minutes_and_seconds_forms() {
        assert_eq!(parse_time_of_day("23:30").unwrap(), time!(23:30));
        assert_eq!(parse_time_of_day(" 05:30:15 ").unwrap(), time!(05:30:15));
    }

    #[test]
    fn rejects_out_of_range_time_of_day() {
        assert!(matches!(parse_time_of_day("24:30"), Err(PipelineError::Config(_))));
        assert!(matches!(parse_time_of_day("noon"), Err(PipelineError::Config(_))));
    }

    #[test]
    fn conversion_factor_must_be_strictly_positive() {
        assert!(UnitConversion::new(0.0).is_err());
        assert!(UnitConversion::new(-1.5).is_err());
        assert!(UnitConversion::new(f64::NAN).is_err());
        assert_eq!(UnitConversion::new(2.5).unwrap().apply(10.0), 25.0);
    }

    #[test]
    fn gas_volume_factor_uses_correction_and_calorific_value() {
        let c = UnitConversion::gas_volume_to_kwh(1.02264, 40.0).unwrap();
        assert!((c.factor() - 1.02264 * 40.0 / 3.6).abs() < 1e-12);
    }

    #[test]
    fn static_rate_follows_band() {
        let banded = RateSchedule::Banded {
            unit_rate_high: 0.30,
            unit_rate_low: 0.10,
            low_band: None,
        };
        assert_eq!(banded.unit_rate(RateBand::Low), 0.10);
        assert_eq!(banded.unit_rate(RateBand::High), 0.30);

        let flat = RateSchedule::Flat { unit_rate: 0.07 };
        assert_eq!(flat.unit_rate(RateBand::Flat), 0.07);
    }
}
