use anyhow::Context;
use clap::Parser;
use realm_schema_sync::domain::ports::ConfigStore;
use realm_schema_sync::utils::{logger, validation::Validate};
use realm_schema_sync::{
    CliConfig, InMemoryConfigStore, PassReport, ReconcileError, ReconcilerConfig,
    ReconciliationDriver, RestConfigStore, StoreKind, Trigger,
};
use std::sync::Arc;

const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_PASS_WITH_ERRORS: i32 = 2;
const EXIT_ENUMERATION_FAILED: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting realm-schema-sync");
    tracing::debug!("CLI config: {:?}", cli);

    let (config, trigger) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Configuration failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let outcome = match config.store.kind {
        StoreKind::Rest => run_rest(&config, trigger).await,
        StoreKind::Snapshot => run_snapshot(&cli, &config, trigger).await,
    };

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Reconciliation failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            let code = match e.downcast_ref::<ReconcileError>() {
                Some(ReconcileError::RealmEnumeration { .. }) => EXIT_ENUMERATION_FAILED,
                _ => EXIT_CONFIG_ERROR,
            };
            std::process::exit(code);
        }
    };

    if let Some(path) = &cli.report {
        if let Err(e) = write_report(&report, path) {
            tracing::error!("Could not write report to {}: {:#}", path, e);
        }
    }

    println!(
        "✅ {} realms, {} connectors examined, {} updated, {} errors",
        report.realms_processed,
        report.sub_configs_examined,
        report.sub_configs_updated,
        report.errors.len()
    );
    for error in &report.errors {
        eprintln!(
            "⚠️  {}{}: {}",
            error.realm,
            error
                .sub_config
                .as_deref()
                .map(|s| format!(":{}", s))
                .unwrap_or_default(),
            error.message
        );
    }

    if !report.is_clean() {
        std::process::exit(EXIT_PASS_WITH_ERRORS);
    }
}

fn load_config(cli: &CliConfig) -> anyhow::Result<(ReconcilerConfig, Trigger)> {
    let mut config = ReconcilerConfig::from_file(&cli.config)
        .with_context(|| format!("failed to load config file '{}'", cli.config))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))?;
    let trigger = cli.lifecycle_trigger()?;
    Ok((config, trigger))
}

async fn run_rest(config: &ReconcilerConfig, trigger: Trigger) -> anyhow::Result<PassReport> {
    let base_url = config
        .store
        .base_url
        .clone()
        .context("store.base_url is required for rest stores")?;
    let store = RestConfigStore::new(&base_url)?.with_token_header(config.token_header());
    run_pass(Arc::new(store), config, trigger).await
}

async fn run_snapshot(
    cli: &CliConfig,
    config: &ReconcilerConfig,
    trigger: Trigger,
) -> anyhow::Result<PassReport> {
    let path = config
        .store
        .snapshot_path
        .clone()
        .context("store.snapshot_path is required for snapshot stores")?;
    let store = Arc::new(
        InMemoryConfigStore::from_json_file(&path)
            .with_context(|| format!("failed to load snapshot '{}'", path))?,
    );

    let report = run_pass(Arc::clone(&store), config, trigger).await?;

    if let Some(out) = &cli.write_snapshot {
        store
            .write_json_file(out)
            .await
            .with_context(|| format!("failed to write snapshot '{}'", out))?;
        tracing::info!("Reconciled snapshot written to {}", out);
    }
    Ok(report)
}

async fn run_pass<S: ConfigStore + 'static>(
    store: Arc<S>,
    config: &ReconcilerConfig,
    trigger: Trigger,
) -> anyhow::Result<PassReport> {
    let driver = ReconciliationDriver::new(
        store,
        Arc::new(config.token_provider()?),
        config.policy.clone(),
    )
    .with_guard(config.call_guard())
    .with_options(config.driver_options());

    Ok(driver.run_pass(trigger).await?)
}

fn write_report(report: &PassReport, path: &str) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    tracing::info!("Pass report written to {}", path);
    Ok(())
}
