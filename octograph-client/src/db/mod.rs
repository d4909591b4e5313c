pub mod measurement_queries;

pub use measurement_queries::{cost_by_band, load_profile, BandCost, StoredMeasurement};
