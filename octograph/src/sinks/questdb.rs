use octograph_client::domain::EnrichedMeasurement;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder};

use super::{
    emit,
    questdb_ilp::{measurement_point_id, price_point_id},
    BatchWriter,
};
use crate::{
    pipeline::{PipelineError, Sink},
    transform::PricePoint,
};

/// Row shape of a point type in its QuestDB table.
pub trait PgInsert: Sized {
    fn table(&self) -> &'static str;

    /// Multi-row INSERT for `batch`; every row must share one table.
    fn insert_query(batch: &[Self]) -> QueryBuilder<'_, Postgres>;
}

impl PgInsert for EnrichedMeasurement {
    fn table(&self) -> &'static str {
        self.series.as_str()
    }

    fn insert_query(batch: &[Self]) -> QueryBuilder<'_, Postgres> {
        let table = batch.first().map_or("electricity", Self::table);
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {table} (ts, point_id, active_rate, time_of_day, consumption, agile_rate, agile_cost) "
        ));

        builder.push_values(batch, |mut b, m| {
            b.push_bind(m.time)
                .push_bind(measurement_point_id(m))
                .push_bind(m.tags.active_rate.as_str())
                .push_bind(m.tags.time_of_day.as_str())
                .push_bind(m.fields.consumption)
                .push_bind(m.fields.agile.map(|a| a.rate))
                .push_bind(m.fields.agile.map(|a| a.cost));
        });
        builder
    }
}

impl PgInsert for PricePoint {
    fn table(&self) -> &'static str {
        self.series.as_str()
    }

    fn insert_query(batch: &[Self]) -> QueryBuilder<'_, Postgres> {
        let table = batch.first().map_or("electricity", Self::table);
        let mut builder = QueryBuilder::<Postgres>::new(format!("INSERT INTO {table} (ts, point_id, agile_rate) "));

        builder.push_values(batch, |mut b, p| {
            b.push_bind(p.time).push_bind(price_point_id(p)).push_bind(p.agile_rate);
        });
        builder
    }
}

struct PgWriter<'a> {
    pool: &'a PgPool,
}

impl PgWriter<'_> {
    async fn insert_batch<T: PgInsert>(&self, batch: &[T]) -> Result<(), sqlx::Error> {
        for rows in batch.chunk_by(|a, b| a.table() == b.table()) {
            T::insert_query(rows).build().execute(self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<'a, T> BatchWriter<T> for PgWriter<'a>
where
    T: PgInsert + Sync,
{
    async fn write_batch(&mut self, batch: &[T]) -> Result<(), PipelineError> {
        match self.insert_batch(batch).await {
            Ok(()) => {
                metrics::counter!("questdb_ingested_records_total").increment(batch.len() as u64);
                tracing::debug!(rows = batch.len(), "flushed pgwire batch");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "questdb sink flush failed");
                metrics::counter!("questdb_sink_errors_total").increment(1);
                Err(PipelineError::SinkWrite(e.to_string()))
            }
        }
    }
}

/// Writes points as multi-row INSERTs over the PostgreSQL wire protocol.
pub struct QuestDbSink {
    pool: PgPool,
    batch_size: usize,
}

impl QuestDbSink {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }
}

#[async_trait::async_trait]
impl<T> Sink<T> for QuestDbSink
where
    T: PgInsert + Send + Sync + 'static,
{
    async fn run<S>(&self, input: S) -> Result<usize, PipelineError>
    where
        S: futures::Stream<Item = T> + Send + Unpin + 'static,
    {
        let mut writer = PgWriter { pool: &self.pool };
        emit(&mut writer, input, self.batch_size).await
    }
}

#[cfg(test)]
mod tests {
    use octograph_client::domain::{AgileCost, MeasurementFields, MeasurementTags, RateBand, Series};
    use time::macros::datetime;

    use super::*;

    fn measurement(series: Series, agile: Option<AgileCost>) -> EnrichedMeasurement {
        EnrichedMeasurement {
            series,
            time: datetime!(2023-06-01 12:00 UTC),
            tags: MeasurementTags {
                active_rate: RateBand::High,
                time_of_day: "13:00".to_string(),
            },
            fields: MeasurementFields {
                consumption: 0.4,
                agile,
            },
        }
    }

    #[test]
    fn measurement_insert_targets_series_table_with_one_placeholder_per_column() {
        let batch = vec![
            measurement(Series::Gas, None),
            measurement(Series::Gas, Some(AgileCost { rate: 0.2, cost: 0.08 })),
        ];
        let builder = EnrichedMeasurement::insert_query(&batch);
        let sql = builder.sql();

        assert!(sql.starts_with(
            "INSERT INTO gas (ts, point_id, active_rate, time_of_day, consumption, agile_rate, agile_cost) VALUES "
        ));
        assert!(sql.contains("$14"));
        assert!(!sql.contains("$15"));
    }

    #[test]
    fn price_insert_writes_rate_column_only() {
        let batch = vec![PricePoint {
            series: Series::Electricity,
            time: datetime!(2023-06-01 00:00 UTC),
            agile_rate: 14.7,
        }];
        let builder = PricePoint::insert_query(&batch);

        assert!(builder.sql().starts_with("INSERT INTO electricity (ts, point_id, agile_rate) VALUES "));
        assert!(builder.sql().contains("$3"));
    }
}
