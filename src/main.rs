use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_ledger::{
    script::{self, ReplayMode},
    AccountId, LedgerConfig, LedgerSnapshot, TokenMetadata,
};

//==================== CLI ====================//

/// Replay token operations against a genesis ledger.
#[derive(Parser)]
#[command(name = "token-ledger", version, about, long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default genesis config
    Init {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "owner")]
        admin: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        decimals: Option<u8>,
    },
    /// Replay a JSON-lines operation script, printing one outcome per line
    Run {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        script: PathBuf,
        /// Write the final snapshot here
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Start from a saved snapshot instead of the genesis allocations
        #[arg(long)]
        resume: Option<PathBuf>,
        #[arg(long)]
        stop_on_error: bool,
    },
    /// Recompute a snapshot's state root and supply
    Verify {
        #[arg(long)]
        snapshot: PathBuf,
    },
}

//==================== commands ====================//

fn init_cmd(
    out: &Path,
    admin: &str,
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
) -> Result<()> {
    let admin: AccountId = admin.parse()?;
    let defaults = TokenMetadata::default();
    let mut config = LedgerConfig::new(admin);
    config.metadata = TokenMetadata {
        name: name.unwrap_or(defaults.name),
        symbol: symbol.unwrap_or(defaults.symbol),
        decimals: decimals.unwrap_or(defaults.decimals),
    };
    config
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    println!("genesis written → {}", out.display());
    Ok(())
}

fn load_snapshot(path: &Path) -> Result<LedgerSnapshot> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

fn run_cmd(
    config: &Path,
    script_path: &Path,
    snapshot_out: Option<&Path>,
    resume: Option<&Path>,
    stop_on_error: bool,
) -> Result<bool> {
    let config =
        LedgerConfig::load(config).with_context(|| format!("loading {}", config.display()))?;
    let resume = resume.map(load_snapshot).transpose()?;

    let file =
        File::open(script_path).with_context(|| format!("opening {}", script_path.display()))?;
    let steps = script::parse_script(BufReader::new(file))
        .with_context(|| format!("parsing {}", script_path.display()))?;
    let mode = if stop_on_error {
        ReplayMode::StopOnError
    } else {
        ReplayMode::Continue
    };

    let summary = script::run(&config, &steps, resume, mode)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for outcome in &summary.report.outcomes {
        serde_json::to_writer(&mut out, outcome)?;
        writeln!(out)?;
    }

    if let Some(path) = snapshot_out {
        fs::write(path, serde_json::to_vec_pretty(&summary.snapshot)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "snapshot written");
    }
    Ok(summary.succeeded())
}

fn verify_cmd(path: &Path) -> Result<()> {
    let snapshot = load_snapshot(path)?;
    snapshot
        .verify()
        .with_context(|| format!("verifying {}", path.display()))?;
    println!(
        "ok height={} supply={} root={}",
        snapshot.height,
        snapshot.total_supply,
        snapshot.state_root_hex()
    );
    Ok(())
}

//==================== main ====================//

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .without_time(),
        )
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Init {
            out,
            admin,
            name,
            symbol,
            decimals,
        } => init_cmd(&out, &admin, name, symbol, decimals)?,
        Commands::Run {
            config,
            script,
            snapshot,
            resume,
            stop_on_error,
        } => {
            let clean = run_cmd(
                &config,
                &script,
                snapshot.as_deref(),
                resume.as_deref(),
                stop_on_error,
            )?;
            if !clean {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Verify { snapshot } => verify_cmd(&snapshot)?,
    }
    Ok(ExitCode::SUCCESS)
}
