use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use export_engine::{
    write_export, CancellationToken, ExportOptions, ExportPipeline, ExportSummary,
    ReqwestApiClient,
};
use export_logging::log::LevelFilter;
use export_logging::{export_debug, export_info, export_warn, LogDestination};

use crate::cli::{Cli, Dataset};
use crate::config::AppConfig;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let destination = LogDestination::parse(&cli.log)
        .ok_or_else(|| anyhow!("unknown log destination {:?}", cli.log))?;
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    export_logging::initialize(destination, level);

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply(cli.overrides.into());
    export_debug!(
        "exporting {} from {} with concurrency {}",
        cli.command.name(),
        config.base_url,
        config.max_concurrency
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let summary = runtime.block_on(export(cli.command, &config))?;

    export_info!(
        "exported {} {} rows to {}",
        summary.row_count,
        cli.command.name(),
        summary.output_path.display()
    );
    Ok(())
}

async fn export(dataset: Dataset, config: &AppConfig) -> anyhow::Result<ExportSummary> {
    let client = ReqwestApiClient::new(config.api_settings())?;
    let pipeline = ExportPipeline::new(Arc::new(client), config.fetch_settings());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            export_warn!("interrupted, cancelling outstanding requests");
            interrupt.cancel();
        }
    });

    let generated_utc = Utc::now().to_rfc3339();
    let options = ExportOptions::for_dataset(dataset.name());
    let summary = match dataset {
        Dataset::Orders => {
            let rows = pipeline.export_orders(&cancel).await?;
            write_export(&config.output_dir, &options, &rows, &generated_utc)?
        }
        Dataset::Positions => {
            let rows = pipeline.export_positions(&cancel).await?;
            write_export(&config.output_dir, &options, &rows, &generated_utc)?
        }
    };
    Ok(summary)
}
