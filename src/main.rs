#![cfg(feature = "cli")]
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{info, warn, Level};

use rscdm::cdm::NoPlayReady;
use rscdm::config::Config;
use rscdm::context::CredentialContext;
use rscdm::pssh::Pssh;
use rscdm::scanner::{playready_candidate, PLAYREADY_DIR};

#[derive(Parser)]
#[command(name = "rscdm", version, about = "rscdm CLI")]
struct Cli {
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,

    /// YAML configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Working directory to scan, overriding the configuration.
    #[arg(long = "dir")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Scan the working directory and report the usable scheme.
    ///
    /// PlayReady devices are located and checked but not loaded; this build
    /// carries no PlayReady implementation.
    Status,
    /// Print the contents of a base64 PSSH.
    Inspect {
        pssh: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .init();

    info!("rscdm version {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Status => {
            let mut config = match cli.config.as_deref() {
                Some(path) => Config::from_path(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(dir) = cli.dir {
                config.working_dir = dir;
            }
            run_status(&config)
        }
        Commands::Inspect { pssh } => run_inspect(&pssh),
    }
}

fn run_status(config: &Config) -> anyhow::Result<()> {
    let working_dir = &config.working_dir;
    info!("Scanning {}", working_dir.display());

    let context = CredentialContext::from_config(config, &NoPlayReady);
    match context.active_scheme() {
        Some(scheme) => info!("[+] Active scheme: {}", scheme),
        None => warn!("[-] No usable scheme"),
    }
    info!("[+] Can decrypt: {}", context.can_decrypt());
    match context.widevine() {
        Ok(credentials) => info!("[+] Widevine credentials: {:?}", credentials),
        Err(e) => info!("[-] Widevine: {}", e),
    }

    report_playready_candidate(&working_dir.join(PLAYREADY_DIR))
}

fn report_playready_candidate(dir: &Path) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let candidate = playready_candidate(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    match candidate {
        Some(file) => info!(
            "[+] PlayReady device candidate: {} ({} bytes)",
            file.path.display(),
            file.data.len()
        ),
        None => info!("[-] No PlayReady device candidate"),
    }
    Ok(())
}

fn run_inspect(pssh_b64: &str) -> anyhow::Result<()> {
    let pssh = Pssh::from_base64(pssh_b64).context("Failed to parse PSSH")?;
    info!("version: {}", pssh.version);
    info!("flags: {}", pssh.flags);
    match pssh.system() {
        Some(system) => info!("system_id: {} ({:?})", pssh.system_id, system),
        None => info!("system_id: {}", pssh.system_id),
    }

    for kid in &pssh.key_ids {
        info!("kid: {}", kid);
    }

    if let Ok(headers) = pssh.wrm_headers() {
        for header in headers {
            let version = header.version().unwrap_or_else(|_| "unknown".to_string());
            info!("WRM header version {}", version);
            for kid in header.key_ids().context("Failed to read WRM header key ids")? {
                info!("kid: {}", kid);
            }
        }
    }

    Ok(())
}
