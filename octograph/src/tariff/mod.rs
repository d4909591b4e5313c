//! Tariff schedules and the rate band in force at a given instant.

mod resolver;
mod schedule;

pub use resolver::{local_datetime, resolve};
pub use schedule::{parse_time_of_day, LowBand, RateSchedule, UnitConversion};
