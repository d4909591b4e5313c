pub mod questdb;
pub mod questdb_ilp;

pub use questdb::{PgInsert, QuestDbSink};
pub use questdb_ilp::{IlpEncode, QuestDbIlpSink};

use std::net::SocketAddr;

use anyhow::Context;
use futures::{Stream, StreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::{
    config::{QuestDbConfig, SinkKind},
    pipeline::{PipelineError, Sink},
};

pub const DEFAULT_BATCH_SIZE: usize = 48;

/// Where points go, resolved once per process and shared by every run.
#[derive(Clone)]
pub enum SinkTarget {
    Ilp(SocketAddr),
    Pgwire(PgPool),
}

impl SinkTarget {
    /// Parses the ILP address or opens the pgwire pool, depending on `kind`.
    pub async fn connect(cfg: &QuestDbConfig, kind: SinkKind) -> anyhow::Result<Self> {
        match kind {
            SinkKind::Ilp => {
                let addr = cfg
                    .ilp_tcp_addr
                    .parse()
                    .with_context(|| format!("invalid questdb.ilp_tcp_addr {}", cfg.ilp_tcp_addr))?;
                Ok(Self::Ilp(addr))
            }
            SinkKind::Pgwire => {
                let pool = PgPoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect(&cfg.uri)
                    .await
                    .context("failed to connect to QuestDB over pgwire")?;
                Ok(Self::Pgwire(pool))
            }
        }
    }

    pub fn sink<T>(&self, batch_size: usize) -> PointSink<T> {
        match self {
            Self::Ilp(addr) => PointSink::Ilp(QuestDbIlpSink::new(*addr, batch_size)),
            Self::Pgwire(pool) => PointSink::Pgwire(QuestDbSink::new(pool.clone(), batch_size)),
        }
    }
}

pub enum PointSink<T> {
    Ilp(QuestDbIlpSink<T>),
    Pgwire(QuestDbSink),
}

#[async_trait::async_trait]
impl<T> Sink<T> for PointSink<T>
where
    T: IlpEncode + PgInsert + Send + Sync + 'static,
{
    async fn run<S>(&self, input: S) -> Result<usize, PipelineError>
    where
        S: Stream<Item = T> + Send + Unpin + 'static,
    {
        match self {
            Self::Ilp(s) => s.run(input).await,
            Self::Pgwire(s) => <QuestDbSink as Sink<T>>::run(s, input).await,
        }
    }
}

/// Destination of whole batches. One call is one write request.
#[async_trait::async_trait]
pub trait BatchWriter<T: Sync>: Send {
    async fn write_batch(&mut self, batch: &[T]) -> Result<(), PipelineError>;
}

/// Drains `input` into `writer` in batches of at most `batch_size` items.
///
/// A failed batch stops the emission; batches written before it stay written.
pub async fn emit<T, W, S>(writer: &mut W, mut input: S, batch_size: usize) -> Result<usize, PipelineError>
where
    T: Send + Sync,
    W: BatchWriter<T> + ?Sized,
    S: Stream<Item = T> + Unpin,
{
    let batch_size = batch_size.max(1);
    let mut buffer: Vec<T> = Vec::with_capacity(batch_size);
    let mut written = 0;

    while let Some(item) = input.next().await {
        buffer.push(item);
        if buffer.len() >= batch_size {
            writer.write_batch(&buffer).await?;
            written += buffer.len();
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        writer.write_batch(&buffer).await?;
        written += buffer.len();
    }

    Ok(written)
}
