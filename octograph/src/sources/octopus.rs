use std::{marker::PhantomData, time::Duration};

use serde::{de::DeserializeOwned, Deserialize};

use super::{Page, PageSource};
use crate::{pipeline::PipelineError, window::TimeWindow};

pub const DEFAULT_BASE_URL: &str = "https://api.octopus.energy/v1";

/// Consumption object as served by the API.
///
/// Everything is optional and timestamps stay strings so that bad values
/// are reported by enrichment instead of failing the transport.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConsumption {
    pub interval_start: Option<String>,
    pub interval_end: Option<String>,
    pub consumption: Option<f64>,
}

/// Unit-rate object of a tariff's `standard-unit-rates` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RawUnitRate {
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
    pub value_inc_vat: Option<f64>,
}

#[derive(Deserialize)]
struct PageBody<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    next: Option<String>,
}

pub fn electricity_consumption_url(base_url: &str, mpan: &str, serial_number: &str) -> String {
    format!(
        "{}/electricity-meter-points/{mpan}/meters/{serial_number}/consumption/",
        base_url.trim_end_matches('/')
    )
}

pub fn gas_consumption_url(base_url: &str, mprn: &str, serial_number: &str) -> String {
    format!(
        "{}/gas-meter-points/{mprn}/meters/{serial_number}/consumption/",
        base_url.trim_end_matches('/')
    )
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("octograph/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))
}

/// Extracts the `page` query parameter from a `next` URL.
fn page_token(next: &str) -> Result<String, PipelineError> {
    let url = reqwest::Url::parse(next)
        .map_err(|e| PipelineError::SourceUnavailable(format!("invalid next url '{next}': {e}")))?;

    url.query_pairs()
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| PipelineError::SourceUnavailable(format!("next url '{next}' has no page parameter")))
}

/// Paginated, window-filtered endpoint of the metering API.
pub struct OctopusApiSource<T> {
    client: reqwest::Client,
    url: String,
    api_key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OctopusApiSource<T> {
    pub fn new(client: reqwest::Client, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            _marker: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<T> PageSource<T> for OctopusApiSource<T>
where
    T: DeserializeOwned + Send,
{
    async fn fetch_page(&self, window: &TimeWindow, page: Option<&str>) -> Result<Page<T>, PipelineError> {
        let (period_from, period_to) = window.to_query()?;
        let mut query = vec![("period_from", period_from), ("period_to", period_to)];
        if let Some(page) = page {
            query.push(("page", page.to_string()));
        }

        let resp = self
            .client
            .get(&self.url)
            .basic_auth(&self.api_key, Some(""))
            .query(&query)
            .send()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("request to {} failed: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            tracing::error!(url = %self.url, %status, "metering API request rejected");
            return Err(PipelineError::SourceUnavailable(format!("{} returned {status}", self.url)));
        }

        let body: PageBody<T> = resp
            .json()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(format!("malformed body from {}: {e}", self.url)))?;

        Ok(Page {
            results: body.results,
            next_page: body.next.as_deref().map(page_token).transpose()?,
        })
    }
}
