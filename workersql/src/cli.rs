use std::fs::read_to_string;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;
use workersql_config::Config;

use crate::frontend::classifier::classify;

/// WorkerSQL is a multi-tenant SQL gateway with a
/// stale-while-revalidate cache and online shard splits.
#[derive(Parser, Debug)]
#[command(name = "workersql", version)]
pub struct Cli {
    /// Path to the configuration file. Default: "workersql.toml"
    #[arg(short, long, default_value = "workersql.toml")]
    pub config: PathBuf,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the gateway.
    Run {
        /// Serve OpenMetrics on this port.
        #[arg(long)]
        openmetrics_port: Option<u16>,

        /// Serve the health endpoint on this port.
        #[arg(long)]
        healthcheck_port: Option<u16>,
    },

    /// Check the configuration file for errors.
    Configcheck,

    /// Classify a statement: class, table, mutation flag and hint.
    Classify {
        #[arg(short, long)]
        query: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigCheckError {
    #[error("I/O error on `{0}`: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("TOML parse error in `{0}`: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("{0}")]
    Invalid(#[from] workersql_config::Error),
}

/// Confirm that the configuration file is valid.
pub fn config_check(path: &PathBuf) -> Result<(), ConfigCheckError> {
    let text = read_to_string(path).map_err(|err| ConfigCheckError::Io(path.clone(), err))?;
    let config: Config =
        toml::from_str(&text).map_err(|err| ConfigCheckError::Parse(path.clone(), err))?;
    config.check()?;
    Ok(())
}

/// Classify a statement and print the result.
#[allow(clippy::print_stdout)]
pub fn classify_query(query: &str) {
    let classification = classify(query);
    println!(
        "kind={:?} table={} mutation={} hint={:?}",
        classification.kind,
        classification.table.as_deref().unwrap_or("-"),
        classification.is_mutation,
        classification.hint,
    );
}
