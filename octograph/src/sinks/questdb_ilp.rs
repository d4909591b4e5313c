use std::{marker::PhantomData, net::SocketAddr};

use octograph_client::domain::{EnrichedMeasurement, Series};
use time::OffsetDateTime;
use tokio::{io::AsyncWriteExt, net::TcpStream};

use super::{emit, BatchWriter};
use crate::{
    pipeline::{PipelineError, Sink},
    transform::PricePoint,
};

/// Escape measurement/tag keys/tag values/field keys for ILP.
///
/// ILP requires escaping commas, spaces and equals with a backslash.
fn ilp_escape_ident(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
}

fn push_tag(out: &mut String, key: &str, value: &str) {
    out.push(',');
    ilp_escape_ident(key, out);
    out.push('=');
    ilp_escape_ident(value, out);
}

fn push_field_f64(out: &mut String, first: &mut bool, key: &str, value: f64) {
    if *first {
        *first = false;
    } else {
        out.push(',');
    }

    ilp_escape_ident(key, out);
    out.push('=');
    out.push_str(&value.to_string());
}

fn ts_to_unix_nanos(ts: OffsetDateTime) -> i128 {
    ts.unix_timestamp_nanos()
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    let len = s.len() as u32;
    hasher.update(&len.to_le_bytes());
    hasher.update(s.as_bytes());
}

/// Deterministic key of a point's coordinates: series, timestamp and tags.
/// Field values are left out so that a re-run with corrected readings lands
/// on the same key.
pub(crate) fn point_id(series: Series, ts: OffsetDateTime, tags: &[(&str, &str)]) -> String {
    let mut h = blake3::Hasher::new();
    hash_str(&mut h, series.as_str());
    h.update(&ts_to_unix_nanos(ts).to_le_bytes());
    for (key, value) in tags {
        hash_str(&mut h, key);
        hash_str(&mut h, value);
    }
    h.finalize().to_hex().to_string()
}

pub(crate) fn measurement_point_id(m: &EnrichedMeasurement) -> String {
    point_id(
        m.series,
        m.time,
        &[("active_rate", m.tags.active_rate.as_str()), ("time_of_day", m.tags.time_of_day.as_str())],
    )
}

pub(crate) fn price_point_id(p: &PricePoint) -> String {
    point_id(p.series, p.time, &[])
}

pub trait IlpEncode {
    fn write_ilp_line(&self, out: &mut String);
}

impl IlpEncode for EnrichedMeasurement {
    fn write_ilp_line(&self, out: &mut String) {
        // measurement
        out.push_str(self.series.as_str());

        // tags (SYMBOL columns)
        push_tag(out, "point_id", &measurement_point_id(self));
        push_tag(out, "active_rate", self.tags.active_rate.as_str());
        push_tag(out, "time_of_day", &self.tags.time_of_day);

        // fields
        out.push(' ');
        let mut first = true;
        push_field_f64(out, &mut first, "consumption", self.fields.consumption);
        if let Some(agile) = self.fields.agile {
            push_field_f64(out, &mut first, "agile_rate", agile.rate);
            push_field_f64(out, &mut first, "agile_cost", agile.cost);
        }

        // timestamp (nanos)
        out.push(' ');
        out.push_str(&ts_to_unix_nanos(self.time).to_string());
    }
}

impl IlpEncode for PricePoint {
    fn write_ilp_line(&self, out: &mut String) {
        out.push_str(self.series.as_str());
        push_tag(out, "point_id", &price_point_id(self));

        out.push(' ');
        let mut first = true;
        push_field_f64(out, &mut first, "agile_rate", self.agile_rate);

        out.push(' ');
        out.push_str(&ts_to_unix_nanos(self.time).to_string());
    }
}

fn encode_batch<T: IlpEncode>(batch: &[T]) -> Vec<u8> {
    // Heuristic capacity: ~160 bytes per line.
    let mut s = String::with_capacity(batch.len().saturating_mul(160));
    for item in batch {
        item.write_ilp_line(&mut s);
        s.push('\n');
    }
    s.into_bytes()
}

struct IlpWriter {
    stream: TcpStream,
}

#[async_trait::async_trait]
impl<T> BatchWriter<T> for IlpWriter
where
    T: IlpEncode + Sync,
{
    async fn write_batch(&mut self, batch: &[T]) -> Result<(), PipelineError> {
        let payload = encode_batch(batch);

        match self.stream.write_all(&payload).await {
            Ok(()) => {
                metrics::counter!("questdb_ingested_records_total").increment(batch.len() as u64);
                metrics::counter!("questdb_ilp_bytes_total").increment(payload.len() as u64);
                tracing::debug!(points = batch.len(), bytes = payload.len(), "flushed ILP batch");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "QuestDB ILP write failed");
                metrics::counter!("questdb_sink_errors_total").increment(1);
                Err(PipelineError::SinkWrite(format!("ilp write failed: {e}")))
            }
        }
    }
}

/// Writes points as InfluxDB Line Protocol over one TCP connection per run.
pub struct QuestDbIlpSink<T> {
    addr: SocketAddr,
    batch_size: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QuestDbIlpSink<T> {
    pub fn new(addr: SocketAddr, batch_size: usize) -> Self {
        Self {
            addr,
            batch_size,
            _marker: PhantomData,
        }
    }

    async fn connect(&self) -> Result<TcpStream, PipelineError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(|e| PipelineError::SinkWrite(format!("failed to connect to QuestDB ILP: {e}")))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl<T> Sink<T> for QuestDbIlpSink<T>
where
    T: IlpEncode + Send + Sync + 'static,
{
    async fn run<S>(&self, input: S) -> Result<usize, PipelineError>
    where
        S: futures::Stream<Item = T> + Send + Unpin + 'static,
    {
        let mut writer = IlpWriter {
            stream: self.connect().await?,
        };
        let written = emit(&mut writer, input, self.batch_size).await?;

        writer
            .stream
            .shutdown()
            .await
            .map_err(|e| PipelineError::SinkWrite(format!("ilp shutdown failed: {e}")))?;

        Ok(written)
    }
}
