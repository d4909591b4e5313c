use time::OffsetDateTime;

/// One metered billing sub-period, typically 30 minutes long.
///
/// `consumption` is in raw meter units: kWh for electricity and SMETS1 gas,
/// m³ for SMETS2 gas.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsumptionRecord {
    pub interval_start: OffsetDateTime,
    pub interval_end: OffsetDateTime,
    pub consumption: f64,
}

/// A single half-hourly unit price of a dynamic tariff.
///
/// `valid_to` is `None` for open-ended rates at the end of a published series.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitRate {
    pub valid_from: Option<OffsetDateTime>,
    pub valid_to: Option<OffsetDateTime>,
    pub value_inc_vat: f64,
}
