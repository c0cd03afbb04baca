use crate::{
    commands::{Commands, RunArgs},
    config::{IngestConfig, RunSettings},
    env::EnvManager,
    error::CliError,
    output::JsonLinesObserver,
};
use clap::Parser;
use connectors::{
    gcp::GcpAuth,
    sql::{base::adapter::SourceAdapter, connect_source},
    store::{SharedStore, store_for},
    warehouse::bigquery::BigQueryClient,
};
use engine_core::{
    observer::{CompositeObserver, SharedObserver, TracingObserver},
    retry::RetryPolicy,
};
use engine_processing::retry::classify_connector_error;
use engine_runtime::{
    capability::{BulkLoadTarget, SqlExtraction},
    ingest::Ingestor,
    orchestrator::CopyOrchestrator,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod env;
mod error;
mod output;

#[derive(Parser)]
#[command(
    name = "splitsync",
    version = "0.1.0",
    about = "Incremental partitioned table export and warehouse load"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Copy { run } => {
            let settings = resolve_settings(&run, false)?;
            let pipeline = Pipeline::connect(&settings, run.events).await?;
            let copier = pipeline.copier(&settings);

            let result = copier
                .copy_table(&settings.table, &settings.destination, settings.directive)
                .await?;
            let report = output::copy_report(&result, run.json)?;
            output::emit_report(report, run.output.as_deref()).await?;
        }
        Commands::Ingest { run, force_load } => {
            let mut settings = resolve_settings(&run, true)?;
            settings.force_load |= force_load;
            let Some(warehouse) = settings.warehouse.clone() else {
                return Err(CliError::MissingConfig("TARGET_GCP_PROJECT"));
            };
            let pipeline = Pipeline::connect(&settings, run.events).await?;

            let client = Arc::new(BigQueryClient::new(
                GcpAuth::from_token(settings.access_token.clone()),
                warehouse.location.clone(),
            ));
            let target = Arc::new(BulkLoadTarget::new(
                client,
                pipeline.store.clone(),
                pipeline.retry.clone(),
                pipeline.observer.clone(),
                settings.force_load,
            ));
            let ingestor = Ingestor::new(
                pipeline.copier(&settings),
                target,
                pipeline.observer.clone(),
            );

            let result = ingestor
                .ingest_table(
                    &settings.table,
                    &settings.destination,
                    settings.directive,
                    &warehouse.table_id,
                )
                .await?;
            let report = output::ingest_report(&result, run.json)?;
            output::emit_report(report, run.output.as_deref()).await?;
        }
    }

    Ok(())
}

fn resolve_settings(run: &RunArgs, with_warehouse: bool) -> Result<RunSettings, CliError> {
    let mut env = EnvManager::from_system();
    if let Some(path) = &run.env_file {
        env.load_from_file(path)?;
    }

    let mut config = IngestConfig::load(run.config.as_deref(), &env)?;
    config.apply_env(&env)?;
    config.apply_args(run);
    config.resolve(with_warehouse)
}

/// Shared pieces of a run: the source connection, the destination store and
/// the observer every component reports to.
struct Pipeline {
    source: Arc<dyn SourceAdapter>,
    store: SharedStore,
    retry: RetryPolicy,
    observer: SharedObserver,
}

impl Pipeline {
    async fn connect(settings: &RunSettings, json_events: bool) -> Result<Self, CliError> {
        info!(
            "Connecting to {}/{}@{} and syncing table: {} to {}",
            settings.connection.username,
            settings.connection.database,
            settings.connection.host,
            settings.table,
            settings.destination
        );

        let retry = RetryPolicy::default();
        let source = retry
            .run(|| connect_source(&settings.connection), classify_connector_error)
            .await
            .map_err(|e| e.into_inner())?;

        let mut observers: Vec<SharedObserver> = vec![Arc::new(TracingObserver)];
        if json_events {
            observers.push(Arc::new(JsonLinesObserver));
        }

        Ok(Pipeline {
            source,
            store: store_for(&settings.destination, settings.access_token.clone()),
            retry,
            observer: Arc::new(CompositeObserver::new(observers)),
        })
    }

    fn copier(&self, settings: &RunSettings) -> CopyOrchestrator {
        let extraction = SqlExtraction::new(
            self.source.clone(),
            self.store.clone(),
            self.retry.clone(),
            self.observer.clone(),
            settings.extraction.clone(),
        );
        CopyOrchestrator::new(Arc::new(extraction), self.observer.clone())
    }
}
