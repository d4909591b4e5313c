mod consumption;
mod measurement;

pub use consumption::{ConsumptionRecord, UnitRate};
pub use measurement::{
    AgileCost, EnrichedMeasurement, MeasurementFields, MeasurementTags, ParseRateBandError, RateBand, Series,
};
