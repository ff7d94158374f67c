use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use lumenlake_config::{ConfigError, PipelineConfig};
use lumenlake_types::{SortBy, SortOrder};

#[derive(Parser, Debug)]
#[command(name = "lumenlake", version, about = "Stellar ledger lakehouse pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest the configured ledger range into the lakehouse.
    Run(RunArgs),
    /// Attach the catalog, create schemas and tables, register datasets and exit.
    Init(InitArgs),
    /// Query the unified hot/cold view.
    Query(QueryArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    /// Overrides `source.start_ledger` from the config file.
    #[arg(long)]
    pub start_ledger: Option<u32>,
    /// Overrides `source.end_ledger` from the config file.
    #[arg(long)]
    pub end_ledger: Option<u32>,
    /// Overrides `source.endpoint` from the config file.
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Overrides `lakehouse.num_workers` from the config file.
    #[arg(long)]
    pub num_workers: Option<u32>,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub common: CommonArgs,
    #[command(subcommand)]
    pub query: QueryCommand,
}

#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// Current native balance of one account.
    Balance { account_id: String },
    /// Paginated balance listing.
    Balances {
        #[arg(long, value_enum, default_value_t = SortBy::Balance)]
        sort_by: SortBy,
        #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
        sort_order: SortOrder,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        cursor: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Path to the TOML configuration file.
    #[arg(long, env = "LUMENLAKE_CONFIG")]
    pub config: PathBuf,
}

impl CommonArgs {
    pub fn load(&self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig::from_toml_file(&self.config)
    }
}

impl RunArgs {
    /// Config file first, CLI flags override.
    pub fn load(&self) -> Result<PipelineConfig, ConfigError> {
        let mut config = self.common.load()?;
        if let Some(start_ledger) = self.start_ledger {
            config.source.start_ledger = start_ledger;
        }
        if let Some(end_ledger) = self.end_ledger {
            config.source.end_ledger = end_ledger;
        }
        if let Some(endpoint) = &self.endpoint {
            config.source.endpoint = endpoint.clone();
        }
        if let Some(num_workers) = self.num_workers {
            config.lakehouse.num_workers = num_workers;
        }
        config.validate()?;
        Ok(config)
    }
}
