use std::collections::HashMap;

use chrono_tz::Tz;
use octograph_client::domain::{
    AgileCost, ConsumptionRecord, EnrichedMeasurement, MeasurementFields, MeasurementTags, Series, UnitRate,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    pipeline::PipelineError,
    sources::{RawConsumption, RawUnitRate},
    tariff::{local_datetime, resolve, RateSchedule, UnitConversion},
};

fn parse_instant(field: &str, value: Option<&str>) -> Result<OffsetDateTime, PipelineError> {
    let value = value.ok_or_else(|| PipelineError::DataFormat(format!("missing {field}")))?;
    OffsetDateTime::parse(value.trim(), &Rfc3339)
        .map_err(|e| PipelineError::DataFormat(format!("invalid {field} '{value}': {e}")))
}

/// Turns an API consumption object into a typed record.
///
/// Rules:
/// - both interval bounds must be RFC 3339 instants;
/// - consumption must be present;
/// - the interval must not end before it starts.
pub fn validate_consumption(raw: &RawConsumption) -> Result<ConsumptionRecord, PipelineError> {
    let interval_start = parse_instant("interval_start", raw.interval_start.as_deref())?;
    let interval_end = parse_instant("interval_end", raw.interval_end.as_deref())?;
    let consumption = raw
        .consumption
        .ok_or_else(|| PipelineError::DataFormat(format!("missing consumption for interval ending {interval_end}")))?;

    if interval_end < interval_start {
        return Err(PipelineError::DataFormat(format!(
            "interval ends before it starts: {interval_start} > {interval_end}"
        )));
    }

    Ok(ConsumptionRecord {
        interval_start,
        interval_end,
        consumption,
    })
}

/// Turns an API unit-rate object into a typed rate. Either bound may be null.
pub fn validate_unit_rate(raw: &RawUnitRate) -> Result<UnitRate, PipelineError> {
    let valid_from = raw
        .valid_from
        .as_deref()
        .map(|v| parse_instant("valid_from", Some(v)))
        .transpose()?;
    let valid_to = raw
        .valid_to
        .as_deref()
        .map(|v| parse_instant("valid_to", Some(v)))
        .transpose()?;
    let value_inc_vat = raw
        .value_inc_vat
        .ok_or_else(|| PipelineError::DataFormat("missing value_inc_vat".to_string()))?;

    Ok(UnitRate {
        valid_from,
        valid_to,
        value_inc_vat,
    })
}

/// Half-hourly dynamic prices, looked up by the exact instant a price stops
/// being valid.
#[derive(Debug, Clone, Default)]
pub struct DynamicPriceSeries {
    by_valid_to: HashMap<i128, f64>,
}

impl DynamicPriceSeries {
    /// Later entries win over earlier ones with the same `valid_to`. Rates
    /// without `valid_to` can never match an interval and are dropped.
    pub fn new(rates: impl IntoIterator<Item = UnitRate>) -> Self {
        let by_valid_to = rates
            .into_iter()
            .filter_map(|r| r.valid_to.map(|to| (to.unix_timestamp_nanos(), r.value_inc_vat)))
            .collect();
        Self { by_valid_to }
    }

    pub fn from_raw(raw: &[RawUnitRate]) -> Result<Self, PipelineError> {
        let rates = raw.iter().map(validate_unit_rate).collect::<Result<Vec<_>, _>>()?;
        let open_ended = rates.iter().filter(|r| r.valid_to.is_none()).count();
        if open_ended > 0 {
            tracing::debug!(open_ended, "ignoring open-ended rates for price lookup");
        }
        Ok(Self::new(rates))
    }

    /// Price whose validity ends exactly at `valid_to`, whatever its offset.
    pub fn rate_ending_at(&self, valid_to: OffsetDateTime) -> Option<f64> {
        self.by_valid_to.get(&valid_to.unix_timestamp_nanos()).copied()
    }

    /// True when no rate can match any interval.
    pub fn is_empty(&self) -> bool {
        self.by_valid_to.is_empty()
    }
}

/// A dynamic price stored as its own point, timestamped by `valid_from`.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub series: Series,
    pub time: OffsetDateTime,
    pub agile_rate: f64,
}

/// Price points of `rates` in input order. Every rate needs a `valid_from`.
pub fn price_points(series: Series, rates: &[RawUnitRate]) -> Result<Vec<PricePoint>, PipelineError> {
    rates
        .iter()
        .map(|raw| {
            let rate = validate_unit_rate(raw)?;
            let time = rate
                .valid_from
                .ok_or_else(|| PipelineError::DataFormat("missing valid_from".to_string()))?;
            Ok(PricePoint {
                series,
                time,
                agile_rate: rate.value_inc_vat,
            })
        })
        .collect()
}

/// Tags consumption with the tariff band in force and, given dynamic prices,
/// the cost of each interval.
#[derive(Debug, Clone)]
pub struct Enricher {
    series: Series,
    schedule: RateSchedule,
    conversion: Option<UnitConversion>,
    local_zone: Tz,
}

impl Enricher {
    /// `local_zone` is where the `time_of_day` tag is read; it does not affect
    /// band resolution, which uses the schedule's own zone.
    pub fn new(series: Series, schedule: RateSchedule, local_zone: Tz) -> Self {
        Self {
            series,
            schedule,
            conversion: None,
            local_zone,
        }
    }

    pub fn with_conversion(mut self, conversion: Option<UnitConversion>) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn series(&self) -> Series {
        self.series
    }

    /// One measurement per record, in input order. A single malformed record
    /// fails the whole batch.
    pub fn enrich(
        &self,
        records: &[RawConsumption],
        prices: Option<&DynamicPriceSeries>,
    ) -> Result<Vec<EnrichedMeasurement>, PipelineError> {
        // An empty series is treated as no series at all.
        let prices = prices.filter(|p| !p.is_empty());

        let mut out = Vec::with_capacity(records.len());
        for raw in records {
            let record = validate_consumption(raw)?;
            out.push(self.enrich_record(&record, prices));
        }

        metrics::counter!("enriched_measurements_total").increment(out.len() as u64);
        Ok(out)
    }

    pub fn enrich_record(&self, record: &ConsumptionRecord, prices: Option<&DynamicPriceSeries>) -> EnrichedMeasurement {
        let consumption = match self.conversion {
            Some(c) => c.apply(record.consumption),
            None => record.consumption,
        };

        // The rate in force when an interval starts governs the whole interval.
        let active_rate = resolve(&self.schedule, record.interval_start);

        let agile = prices.map(|series| {
            // Interval boundaries drift from the price series around DST
            // changes; charge the static band rate for those intervals.
            let rate = series.rate_ending_at(record.interval_end).unwrap_or_else(|| {
                metrics::counter!("agile_rate_fallback_total").increment(1);
                tracing::debug!(
                    series = %self.series,
                    interval_end = %record.interval_end,
                    band = %active_rate,
                    "no agile rate for interval, using static rate"
                );
                self.schedule.unit_rate(active_rate)
            });
            AgileCost {
                rate,
                cost: rate * consumption,
            }
        });

        let local_end = local_datetime(record.interval_end, self.local_zone);

        EnrichedMeasurement {
            series: self.series,
            time: record.interval_end,
            tags: MeasurementTags {
                active_rate,
                time_of_day: format!("{:02}:{:02}", local_end.hour(), local_end.minute()),
            },
            fields: MeasurementFields { consumption, agile },
        }
    }
}
