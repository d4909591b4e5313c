pub mod octopus;

pub use octopus::{OctopusApiSource, RawConsumption, RawUnitRate};

use crate::{pipeline::PipelineError, window::TimeWindow};

/// One page of a cursor-paginated result set.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub results: Vec<T>,
    /// Continuation token for the following page; `None` on the last page.
    pub next_page: Option<String>,
}

#[async_trait::async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetches the page of `window` identified by `page` (`None` for the first).
    async fn fetch_page(&self, window: &TimeWindow, page: Option<&str>) -> Result<Page<T>, PipelineError>;
}

/// Follows continuation tokens until the source reports none, concatenating
/// pages in the order they were served. Any failing page fails the whole fetch.
pub async fn fetch_all<T, S>(source: &S, window: &TimeWindow) -> Result<Vec<T>, PipelineError>
where
    T: Send,
    S: PageSource<T> + ?Sized,
{
    let mut results = Vec::new();
    let mut page: Option<String> = None;

    loop {
        let Page {
            results: batch,
            next_page,
        } = source.fetch_page(window, page.as_deref()).await?;

        metrics::counter!("octopus_pages_fetched_total").increment(1);
        tracing::debug!(page = page.as_deref().unwrap_or("first"), records = batch.len(), "fetched page");

        results.extend(batch);
        match next_page {
            Some(next) => page = Some(next),
            None => break,
        }
    }

    metrics::counter!("octopus_records_fetched_total").increment(results.len() as u64);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::macros::datetime;

    use super::*;

    /// Serves `sizes.len()` pages of sequential integers, tokens "p1", "p2", ...
    struct Simulated {
        sizes: Vec<usize>,
        fail_on: Option<usize>,
        requests: AtomicUsize,
    }

    impl Simulated {
        fn new(sizes: &[usize]) -> Self {
            Self {
                sizes: sizes.to_vec(),
                fail_on: None,
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl PageSource<usize> for Simulated {
        async fn fetch_page(&self, _window: &TimeWindow, page: Option<&str>) -> Result<Page<usize>, PipelineError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let index = match page {
                None => 0,
                Some(token) => token.trim_start_matches('p').parse().unwrap(),
            };
            if self.fail_on == Some(index) {
                return Err(PipelineError::SourceUnavailable("502 Bad Gateway".to_string()));
            }

            let offset: usize = self.sizes[..index].iter().sum();
            Ok(Page {
                results: (offset..offset + self.sizes[index]).collect(),
                next_page: (index + 1 < self.sizes.len()).then(|| format!("p{}", index + 1)),
            })
        }
    }

    fn window() -> TimeWindow {
        TimeWindow::new(datetime!(2023-06-01 00:00 UTC), datetime!(2023-06-02 00:00 UTC)).unwrap()
    }

    #[tokio::test]
    async fn merges_every_page_in_order() {
        let source = Simulated::new(&[100, 100, 7]);
        let all: Vec<usize> = fetch_all(&source, &window()).await.unwrap();

        assert_eq!(all.len(), 207);
        assert_eq!(all, (0..207).collect::<Vec<_>>());
        assert_eq!(source.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_page_without_next_is_returned_as_is() {
        let source = Simulated::new(&[42]);
        let all: Vec<usize> = fetch_all(&source, &window()).await.unwrap();

        assert_eq!(all, (0..42).collect::<Vec<_>>());
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_first_page_yields_nothing() {
        let source = Simulated::new(&[0]);
        assert!(fetch_all::<usize, _>(&source, &window()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_page_fails_the_whole_fetch() {
        let mut source = Simulated::new(&[100, 100, 7]);
        source.fail_on = Some(2);

        let res = fetch_all::<usize, _>(&source, &window()).await;
        assert!(matches!(res, Err(PipelineError::SourceUnavailable(_))));
        assert_eq!(source.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn many_pages_do_not_grow_the_stack() {
        let source = Simulated::new(&vec![1; 10_000]);
        let all = fetch_all::<usize, _>(&source, &window()).await.unwrap();
        assert_eq!(all.len(), 10_000);
    }
}
