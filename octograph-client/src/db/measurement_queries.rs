use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::Series;

/// A row of an enriched consumption table as QuestDB returns it.
///
/// Tag columns are nullable because Agile price points share the
/// `electricity` table and carry no band.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredMeasurement {
    pub ts: OffsetDateTime,
    pub active_rate: Option<String>,
    pub time_of_day: Option<String>,
    pub consumption: Option<f64>,
    pub agile_rate: Option<f64>,
    pub agile_cost: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BandCost {
    pub active_rate: String,
    pub total_consumption: f64,
    pub total_agile_cost: Option<f64>,
    pub intervals: i64,
}

// Table names cannot be bound; `Series` only renders fixed identifiers.
fn profile_sql(series: Series) -> String {
    format!(
        r#"
        SELECT
            ts,
            active_rate,
            time_of_day,
            consumption,
            agile_rate,
            agile_cost
        FROM {table}
        WHERE ts >= $1
          AND ts <  $2
          AND consumption IS NOT NULL
        ORDER BY ts
        "#,
        table = series.as_str()
    )
}

fn cost_by_band_sql(series: Series) -> String {
    format!(
        r#"
        SELECT
            active_rate,
            SUM(consumption) AS total_consumption,
            SUM(agile_cost)  AS total_agile_cost,
            COUNT(*)         AS intervals
        FROM {table}
        WHERE ts >= $1
          AND ts <  $2
          AND active_rate IS NOT NULL
        GROUP BY active_rate
        ORDER BY active_rate
        "#,
        table = series.as_str()
    )
}

/// Fetch the time-ordered consumption profile of one series.
pub async fn load_profile(
    pool: &PgPool,
    series: Series,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<StoredMeasurement>> {
    let sql = profile_sql(series);

    let rows = sqlx::query_as::<_, StoredMeasurement>(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Total consumption and Agile cost per tariff band over a window.
pub async fn cost_by_band(
    pool: &PgPool,
    series: Series,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Vec<BandCost>> {
    let sql = cost_by_band_sql(series);

    let rows = sqlx::query_as::<_, BandCost>(&sql)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
