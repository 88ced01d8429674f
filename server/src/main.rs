//! Respira respiratory risk scoring server.
//!
//! Usage:
//!   respira-server serve [--bind 0.0.0.0:8000]
//!   respira-server synth --count 5000 --seed 42 --out cohort.jsonl
//!   respira-server verify-model [--path models/model_xgb.json]
//!   respira-server verify-ledger --journal data/assessments.jsonl

mod config;
mod error;
mod routes;
mod state;

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use respira_audit::HashChainStore;
use respira_contracts::error::RespiraError;
use respira_ml::CohortGenerator;

use crate::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    state::AppContext,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Respira: hybrid rule/model risk scoring for asthma and COPD.
#[derive(Parser)]
#[command(name = "respira-server", about = "Respiratory risk scoring service")]
struct Cli {
    /// Configuration file. Defaults are used when the default path is absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Overrides `[server] bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Write a synthetic training cohort as JSON lines.
    Synth {
        #[arg(long, default_value_t = 5000)]
        count: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a model artifact against the configured feature contract.
    VerifyModel {
        /// Overrides `[model] path`.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Replay an assessment journal and verify its hash chain.
    VerifyLedger {
        /// Overrides `[store] journal`.
        #[arg(long)]
        journal: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Respira(#[from] RespiraError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

type CliResult<T> = Result<T, CliError>;

fn io_error(context: impl Into<String>) -> impl FnOnce(io::Error) -> CliError {
    let context = context.into();
    move |source| CliError::Io { context, source }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match load_config(cli.config) {
        Ok(config) => match cli.command {
            Command::Serve { bind } => serve(config, bind).await,
            Command::Synth { count, seed, out } => synth(count, seed, out),
            Command::VerifyModel { path } => verify_model(&config, path),
            Command::VerifyLedger { journal } => verify_ledger(&config, journal),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("respira-server: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> CliResult<AppConfig> {
    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    Ok(AppConfig::load(&path, explicit)?)
}

// ── Commands ──────────────────────────────────────────────────────────────────

async fn serve(mut config: AppConfig, bind: Option<String>) -> CliResult<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }

    let ctx = AppContext::from_config(&config)?;
    info!(
        model_loaded = ctx.model_loaded(),
        ledger_records = ctx.ledger.len(),
        "services ready"
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(io_error(format!("cannot bind {}", config.server.bind)))?;
    info!(addr = %config.server.bind, "respira listening");

    axum::serve(listener, routes::router(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .map_err(io_error("server error"))?;

    info!("respira stopped");
    Ok(())
}

fn synth(count: usize, seed: u64, out: Option<PathBuf>) -> CliResult<()> {
    let records = CohortGenerator::new(seed)?.generate(count)?;

    let (sink, label): (Box<dyn Write>, String) = match &out {
        Some(path) => (
            Box::new(File::create(path).map_err(io_error(format!("cannot create {}", path.display())))?),
            path.display().to_string(),
        ),
        None => (Box::new(io::stdout().lock()), "stdout".to_string()),
    };
    let mut writer = BufWriter::new(sink);

    for record in &records {
        let line = serde_json::to_string(record).map_err(|e| RespiraError::InvalidInput {
            reason: format!("cohort row is not serializable: {e}"),
        })?;
        writeln!(writer, "{line}").map_err(io_error(format!("cannot write {label}")))?;
    }
    writer.flush().map_err(io_error(format!("cannot write {label}")))?;

    let positives = records.iter().filter(|r| r.diagnosis == 1).count();
    info!(count = records.len(), positives, seed, out = %label, "cohort written");
    Ok(())
}

fn verify_model(config: &AppConfig, path: Option<PathBuf>) -> CliResult<()> {
    let path = path.unwrap_or_else(|| config.model.path.clone());
    let contract = config.feature_contract()?;

    let text = std::fs::read_to_string(&path).map_err(io_error(format!("cannot read {}", path.display())))?;
    let document: serde_json::Value = serde_json::from_str(&text).map_err(|e| RespiraError::ArtifactInvalid {
        reason: format!("model '{}' is not JSON: {}", path.display(), e),
    })?;

    let report = state::verify_artifact(&document, &contract);
    if report.passed {
        println!("{}: OK (contract {})", path.display(), contract.version);
        Ok(())
    } else {
        for failure in &report.failures {
            println!("  [{}] {}", failure.rule_id, failure.message);
        }
        Err(RespiraError::ArtifactInvalid {
            reason: format!("{} rule(s) failed for {}", report.failures.len(), path.display()),
        }
        .into())
    }
}

fn verify_ledger(config: &AppConfig, journal: Option<PathBuf>) -> CliResult<()> {
    let Some(path) = journal.or_else(|| config.store.journal.clone()) else {
        return Err(RespiraError::ConfigError {
            reason: "no journal given and none configured under [store]".to_string(),
        }
        .into());
    };

    if !path.exists() {
        return Err(RespiraError::ConfigError {
            reason: format!("journal '{}' does not exist", path.display()),
        }
        .into());
    }

    // Opening replays and verifies the whole chain.
    let store = HashChainStore::open(config.store.ledger_id.clone(), &path)?;
    let ledger = store.export_ledger()?;
    println!(
        "{}: {} record(s), chain intact, terminal hash {}",
        path.display(),
        ledger.events.len(),
        if ledger.terminal_hash.is_empty() { "-" } else { ledger.terminal_hash.as_str() }
    );
    Ok(())
}
