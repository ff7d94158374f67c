use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, QueryCommand};
use lumenlake_config::ConfigError;
use lumenlake_core::error::IngestError;
use lumenlake_core::ingest::{run_ingestion, GrpcLedgerSource};
use lumenlake_core::lakehouse::Lakehouse;
use lumenlake_core::metadata::{known_datasets, MetadataPlane};
use lumenlake_reader::{ReaderError, UnifiedReader};
use lumenlake_types::BalanceFilter;

mod cli;

#[derive(thiserror::Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// 0 = normal (including a clean cancelled shutdown), 1 = unrecoverable
    /// ingestion error, 2 = configuration error.
    fn exit_code(&self) -> ExitCode {
        match self {
            AppError::Config(_) => ExitCode::from(2),
            AppError::Ingest(IngestError::Cancelled) => ExitCode::SUCCESS,
            _ => ExitCode::from(1),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                AppError::Ingest(IngestError::Cancelled) => {
                    tracing::info!("shutdown complete");
                }
                other => tracing::error!(error = %other, "exiting with failure"),
            }
            err.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Run(args) => {
            let config = args.load()?;
            let source = Arc::new(GrpcLedgerSource::new(config.source.endpoint.clone()));
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, starting graceful shutdown");
                    let _ = shutdown_tx.send(true);
                }
            });
            let report = run_ingestion(&config, source, shutdown_rx).await?;
            tracing::info!(
                ledgers = report.ledgers_ingested(),
                workers = report.workers.len(),
                "run finished"
            );
            Ok(())
        }
        Command::Init(args) => {
            let config = args.common.load()?;
            let lakehouse =
                Lakehouse::connect(&config.lakehouse).map_err(IngestError::Lakehouse)?;
            MetadataPlane::new(lakehouse)
                .register_datasets(known_datasets())
                .await?;
            tracing::info!("catalog attached, schemas and datasets are in place");
            Ok(())
        }
        Command::Query(args) => {
            let config = args.common.load()?;
            let reader_config = config.reader.clone().ok_or_else(|| {
                AppError::Other("config has no [reader] section".to_string())
            })?;
            let reader = UnifiedReader::connect(&config.lakehouse, &reader_config)?;
            let rendered = match args.query {
                QueryCommand::Balance { account_id } => {
                    serde_json::to_string_pretty(&reader.get_current(&account_id)?)
                }
                QueryCommand::Balances {
                    sort_by,
                    sort_order,
                    limit,
                    cursor,
                } => serde_json::to_string_pretty(&reader.list(
                    &BalanceFilter::default(),
                    sort_by,
                    sort_order,
                    limit,
                    cursor.as_deref(),
                )?),
            }
            .map_err(|err| AppError::Other(err.to_string()))?;
            println!("{rendered}");
            Ok(())
        }
    }
}
