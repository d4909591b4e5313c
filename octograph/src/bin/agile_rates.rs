use anyhow::{bail, Result};
use clap::Parser;
use futures::stream;
use octograph::{
    cli::RunArgs,
    config::AppConfig,
    metrics_server, observability,
    pipeline::Sink,
    sinks::{PointSink, SinkTarget},
    sources::{fetch_all, octopus::http_client, OctopusApiSource, RawUnitRate},
    transform::{price_points, PricePoint},
};
use octograph_client::domain::Series;
use time::OffsetDateTime;

/// Stores the published Agile price curve on its own, keyed by `valid_from`.
#[derive(Parser)]
#[command(name = "agile_rates")]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { run: args } = Cli::parse();
    observability::init_tracing();

    let cfg = AppConfig::load(args.config.as_deref())?;
    let Some(url) = cfg.electricity.agile_rate_url.as_deref() else {
        bail!("electricity.agile_rate_url is not configured");
    };

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // Prices are published ahead, so look from yesterday through tomorrow.
    let window = args.window(cfg.zone()?, OffsetDateTime::now_utc(), (-1, 1))?;
    tracing::info!(from = %window.from(), to = %window.to(), "ingesting agile rates");

    let client = http_client(cfg.octopus.request_timeout())?;
    let source = OctopusApiSource::<RawUnitRate>::new(client, url, cfg.octopus.api_key.as_str());
    let rates = fetch_all(&source, &window).await?;
    let points = price_points(Series::Electricity, &rates)?;

    let target = SinkTarget::connect(&cfg.questdb, cfg.sink.kind).await?;
    let sink: PointSink<PricePoint> = target.sink(cfg.sink.batch_size);
    let written = sink.run(stream::iter(points)).await?;
    tracing::info!(written, "stored agile rates");

    Ok(())
}
