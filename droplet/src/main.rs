mod config;
mod output;
mod scheduler;
mod server;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{
    DEBUG_SWEEP_INTERVAL, DEFAULT_EXPIRE_DAYS, DEFAULT_LISTEN, DEFAULT_MAX_SIZE_MB,
    SWEEP_INTERVAL, Settings,
};
use droplet_core::{
    Alphabet, AllocatorConfig, CollisionPolicy, DEFAULT_TOKEN_LENGTH, Reclaimer, Retention,
    StorageRoot,
};
use output::{OutputWriter, SweepOutput};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Droplet - an ephemeral, anonymous file drop
#[derive(Parser, Debug)]
#[command(name = "droplet")]
#[command(about = "Upload files over HTTP and get a short-lived download URL", long_about = None)]
#[command(version)]
struct Cli {
    /// Storage directory (defaults to <tmp>/droplet)
    #[arg(short, long, global = true, env = "DROPLET_DIR")]
    dir: Option<PathBuf>,

    /// Debug mode: every file expires and sweeps run every 5 seconds
    #[arg(long, global = true, env = "DROPLET_DEBUG")]
    debug: bool,

    /// Length of the random directory token
    #[arg(short, long, global = true, env = "DROPLET_LENGTH", default_value_t = DEFAULT_TOKEN_LENGTH)]
    length: usize,

    /// Characters tokens are drawn from (defaults to ASCII letters and digits)
    #[arg(long, global = true, env = "DROPLET_ALPHABET")]
    alphabet: Option<Alphabet>,

    /// Delete files after this many days (0 deletes on every sweep)
    #[arg(short, long, global = true, env = "DROPLET_EXPIRE", default_value_t = DEFAULT_EXPIRE_DAYS)]
    expire: u64,

    /// Skip the existing-file check when allocating
    #[arg(long, global = true, env = "DROPLET_RELAXED")]
    relaxed: bool,

    /// Address to listen on
    #[arg(short = 'b', long, global = true, env = "DROPLET_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Max upload size in MB
    #[arg(short, long, global = true, env = "DROPLET_MAX_SIZE", default_value_t = DEFAULT_MAX_SIZE_MB)]
    max: u64,

    /// Build http:// download URLs instead of https://
    #[arg(short = 'k', long, global = true, env = "DROPLET_INSECURE")]
    insecure: bool,

    /// Seconds between sweeps (defaults to 60, or 5 in debug mode)
    #[arg(long, global = true, env = "DROPLET_SWEEP_INTERVAL")]
    sweep_interval: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Delete expired files once and exit
    Sweep {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Resolve flags into validated settings.
    fn settings(&self) -> Result<Settings> {
        let allocator = AllocatorConfig {
            alphabet: self.alphabet.clone().unwrap_or_default(),
            token_length: self.length,
            policy: if self.relaxed {
                CollisionPolicy::Relaxed
            } else {
                CollisionPolicy::Strict
            },
        };
        allocator.validate().context("Invalid token settings")?;

        if self.sweep_interval == Some(0) {
            anyhow::bail!("Sweep interval must be at least one second");
        }

        let retention = if self.debug {
            Retention::Debug
        } else {
            Retention::days(self.expire)
        };

        let sweep_interval = match self.sweep_interval {
            Some(secs) => Duration::from_secs(secs),
            None if self.debug => DEBUG_SWEEP_INTERVAL,
            None => SWEEP_INTERVAL,
        };

        let max_size = self
            .max
            .checked_mul(1 << 20)
            .with_context(|| format!("Max upload size too large: {} MB", self.max))?;

        Ok(Settings {
            root: self.dir.clone().unwrap_or_else(StorageRoot::default_path),
            debug: self.debug,
            allocator,
            retention,
            sweep_interval,
            listen: self.listen,
            max_size,
            insecure: self.insecure,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Some(Commands::Sweep { json }) => {
            let output = OutputWriter::new(json);
            if let Err(err) = cli.settings().and_then(|settings| cmd_sweep(&settings, &output)) {
                output.write_error(&err);
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Commands::Serve) | None => cmd_serve(cli.settings()?),
    }
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "droplet={0},droplet_core={0},tower_http={0}",
                default_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_serve(settings: Settings) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(server::run(settings))
}

fn cmd_sweep(settings: &Settings, output: &OutputWriter) -> Result<()> {
    let root = StorageRoot::init(&settings.root).with_context(|| {
        format!("Failed to open storage root at {}", settings.root.display())
    })?;

    let started_at = Utc::now();
    let reclaimer = Reclaimer::new(root, settings.retention);
    let stats = reclaimer
        .sweep()
        .context("Failed to sweep storage root")?;

    let data = SweepOutput {
        success: true,
        root: reclaimer.root().path().display().to_string(),
        started_at,
        retention_secs: match settings.retention {
            Retention::Age(age) => Some(age.as_secs()),
            Retention::Debug => None,
        },
        stats,
    };

    output.write_sweep(&data)
}
