pub mod toml_config;

pub use toml_config::{ReconcilerConfig, StoreKind};

#[cfg(feature = "cli")]
use crate::domain::model::Trigger;
#[cfg(feature = "cli")]
use crate::utils::error::{ReconcileError, Result};
#[cfg(feature = "cli")]
use clap::{Parser, ValueEnum};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    Install,
    Startup,
    Upgrade,
    Manual,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "realm-schema-sync")]
#[command(about = "Reconciles device-attribute LDAP schema settings across every realm")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "realm-schema-sync.toml")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    /// Report what would change without writing to the store
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, value_enum, default_value = "manual")]
    pub trigger: TriggerArg,

    /// Previously installed version, required with `--trigger upgrade`
    #[arg(long)]
    pub from_version: Option<String>,

    /// Override the number of realms reconciled concurrently
    #[arg(long)]
    pub max_concurrent_realms: Option<usize>,

    /// Write the pass report as JSON to this path
    #[arg(long)]
    pub report: Option<String>,

    /// Snapshot stores only: persist the reconciled snapshot to this path
    #[arg(long)]
    pub write_snapshot: Option<String>,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn lifecycle_trigger(&self) -> Result<Trigger> {
        Ok(match self.trigger {
            TriggerArg::Install => Trigger::Install,
            TriggerArg::Startup => Trigger::Startup,
            TriggerArg::Manual => Trigger::Manual,
            TriggerArg::Upgrade => Trigger::Upgrade {
                from_version: self.from_version.clone().ok_or_else(|| {
                    ReconcileError::MissingConfigError {
                        field: "--from-version".to_string(),
                    }
                })?,
            },
        })
    }

    /// Command-line flags take precedence over the file.
    pub fn apply_overrides(&self, config: &mut ReconcilerConfig) {
        if self.dry_run {
            config.driver.dry_run = true;
        }
        if let Some(concurrency) = self.max_concurrent_realms {
            config.driver.max_concurrent_realms = concurrency;
        }
    }
}
