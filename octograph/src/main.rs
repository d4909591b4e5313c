use anyhow::Result;
use clap::Parser;
use octograph::{
    cli::RunArgs,
    config::AppConfig,
    metrics_server, observability,
    pipeline::Pipeline,
    sinks::SinkTarget,
    sources::{octopus::http_client, OctopusApiSource, RawConsumption, RawUnitRate},
    transform::Enricher,
};
use octograph_client::domain::{EnrichedMeasurement, Series};
use time::OffsetDateTime;

/// Ingests yesterday's electricity and gas consumption into QuestDB.
#[derive(Parser)]
#[command(name = "octograph")]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
    /// Skip the gas meter even when one is configured
    #[arg(long)]
    no_gas: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing();

    let args = &cli.run;
    let cfg = AppConfig::load(args.config.as_deref())?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // Yesterday, local midnight to local midnight.
    let zone = cfg.zone()?;
    let window = args.window(zone, OffsetDateTime::now_utc(), (-1, 0))?;
    tracing::info!(from = %window.from(), to = %window.to(), "ingesting consumption");

    let client = http_client(cfg.octopus.request_timeout())?;
    let target = SinkTarget::connect(&cfg.questdb, cfg.sink.kind).await?;
    let base_url = cfg.octopus.base_url.as_str();
    let api_key = cfg.octopus.api_key.as_str();

    let electricity = Pipeline {
        consumption: OctopusApiSource::<RawConsumption>::new(
            client.clone(),
            cfg.electricity.consumption_url(base_url),
            api_key,
        ),
        prices: cfg
            .electricity
            .agile_rate_url
            .as_deref()
            .map(|url| OctopusApiSource::<RawUnitRate>::new(client.clone(), url, api_key)),
        enricher: Enricher::new(Series::Electricity, cfg.electricity.schedule()?, zone),
        sink: target.sink::<EnrichedMeasurement>(cfg.sink.batch_size),
    };
    electricity.run(&window).await?;

    match &cfg.gas {
        Some(_) if cli.no_gas => tracing::info!("skipping gas"),
        Some(gas) => {
            let gas_pipeline = Pipeline {
                consumption: OctopusApiSource::<RawConsumption>::new(client.clone(), gas.consumption_url(base_url), api_key),
                prices: None::<OctopusApiSource<RawUnitRate>>,
                enricher: Enricher::new(Series::Gas, gas.schedule(), zone).with_conversion(gas.conversion()?),
                sink: target.sink::<EnrichedMeasurement>(cfg.sink.batch_size),
            };
            gas_pipeline.run(&window).await?;
        }
        None => tracing::debug!("no gas meter configured"),
    }

    Ok(())
}
