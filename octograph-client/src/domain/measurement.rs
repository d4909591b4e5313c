use std::{fmt, str::FromStr};

use time::OffsetDateTime;

/// Named time series a measurement belongs to. Doubles as the QuestDB table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Series {
    Electricity,
    Gas,
}

impl Series {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tariff band that was in force for an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RateBand {
    /// The only rate of a single-rate tariff.
    Flat,
    High,
    Low,
}

impl RateBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::High => "high",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for RateBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown rate band '{0}'")]
pub struct ParseRateBandError(pub String);

impl FromStr for RateBand {
    type Err = ParseRateBandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "high" => Ok(Self::High),
            "low" => Ok(Self::Low),
            other => Err(ParseRateBandError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementTags {
    pub active_rate: RateBand,
    /// Local wall-clock time of the interval end, `HH:MM`.
    pub time_of_day: String,
}

/// Dynamic-tariff price and the cost it implies for one interval.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgileCost {
    pub rate: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementFields {
    /// Consumption after unit conversion.
    pub consumption: f64,
    /// Present only when a dynamic price series took part in enrichment.
    pub agile: Option<AgileCost>,
}

/// A consumption interval tagged with its tariff band, ready to be written.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnrichedMeasurement {
    pub series: Series,
    /// End of the metered interval.
    pub time: OffsetDateTime,
    pub tags: MeasurementTags,
    pub fields: MeasurementFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_band_round_trips_through_its_tag_value() {
        for band in [RateBand::Flat, RateBand::High, RateBand::Low] {
            assert_eq!(band.as_str().parse::<RateBand>(), Ok(band));
        }
    }

    #[test]
    fn unknown_rate_band_is_rejected() {
        let err = "unit_rate_high".parse::<RateBand>().unwrap_err();
        assert_eq!(err, ParseRateBandError("unit_rate_high".to_string()));
    }
}
