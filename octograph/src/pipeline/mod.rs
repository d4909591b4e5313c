use futures::{stream, Stream};
use octograph_client::domain::EnrichedMeasurement;

use crate::{
    sources::{fetch_all, PageSource, RawConsumption, RawUnitRate},
    transform::{DynamicPriceSeries, Enricher},
    window::TimeWindow,
};

/// Every failure is fatal to the run that hit it; nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("data format error: {0}")]
    DataFormat(String),
    #[error("sink write error: {0}")]
    SinkWrite(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    /// Writes every item of `input`, returning how many were written.
    async fn run<S>(&self, input: S) -> Result<usize, PipelineError>
    where
        S: Stream<Item = T> + Send + Unpin + 'static;
}

/// One metering point's run: fetch, enrich, emit, strictly in that order.
pub struct Pipeline<P, R, K> {
    pub consumption: P,
    pub prices: Option<R>,
    pub enricher: Enricher,
    pub sink: K,
}

impl<P, R, K> Pipeline<P, R, K>
where
    P: PageSource<RawConsumption>,
    R: PageSource<RawUnitRate>,
    K: Sink<EnrichedMeasurement>,
{
    pub async fn run(&self, window: &TimeWindow) -> Result<usize, PipelineError> {
        let series = self.enricher.series();

        let records = fetch_all(&self.consumption, window).await?;
        tracing::info!(%series, readings = records.len(), "retrieved consumption");

        let prices = match &self.prices {
            Some(source) => {
                let raw = fetch_all(source, window).await?;
                tracing::info!(%series, rates = raw.len(), "retrieved agile rates");
                Some(DynamicPriceSeries::from_raw(&raw)?)
            }
            None => None,
        };

        let measurements = self.enricher.enrich(&records, prices.as_ref())?;
        let written = self.sink.run(stream::iter(measurements)).await?;
        tracing::info!(%series, written, "stored measurements");

        Ok(written)
    }
}
