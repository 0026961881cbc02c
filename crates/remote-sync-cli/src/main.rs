mod commands;
mod config;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{exit_code_for, Context};
use config::{SyncConfig, CONFIG_ENV, DEFAULT_CONFIG_FILE};
use remote_sync_core::{install_signal_handler, CancelFlag};
use remote_sync_schema::ArtifactKind;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "remote-sync",
    version,
    about = "Push, pull, and list site backups on a remote store"
)]
struct Cli {
    /// Path to the sync configuration file [default: $REMOTE_SYNC_CONFIG or remote-sync.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Remote store URL (overrides the [provider] section).
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dump the database and upload it.
    PushDatabase,
    /// Archive all registered volumes and upload the archive.
    PushVolumes,
    /// Replace the database with a remote dump.
    PullDatabase {
        /// Remote filename, as shown by list-databases.
        filename: String,
        /// Skip the local emergency dump taken before restoring.
        #[arg(long, default_value_t = false)]
        no_emergency_backup: bool,
    },
    /// Replace volume contents with a remote archive.
    PullVolumes {
        /// Remote filename, as shown by list-volumes.
        filename: String,
        /// Skip the local emergency archive taken before restoring.
        #[arg(long, default_value_t = false)]
        no_emergency_backup: bool,
    },
    /// List remote database backups, newest first.
    ListDatabases,
    /// List remote volume backups, newest first.
    ListVolumes,
    /// Delete a remote database backup.
    DeleteDatabase {
        filename: String,
    },
    /// Delete a remote volume backup.
    DeleteVolume {
        filename: String,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("REMOTE_SYNC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli);

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn run(cli: Cli) -> Result<u8, String> {
    if let Commands::Completions { shell } = cli.command {
        return commands::completions::run::<Cli>(shell);
    }

    let config_path = cli
        .config
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = SyncConfig::load(&config_path)?;

    let cancel = CancelFlag::new();
    install_signal_handler(&cancel);

    let ctx = Context {
        config: &config,
        remote: cli.remote.as_deref(),
        cancel: &cancel,
        json: cli.json,
    };

    match cli.command {
        Commands::PushDatabase => commands::push::run_database(&ctx),
        Commands::PushVolumes => commands::push::run_volumes(&ctx),
        Commands::PullDatabase {
            filename,
            no_emergency_backup,
        } => commands::pull::run_database(&ctx, &filename, !no_emergency_backup),
        Commands::PullVolumes {
            filename,
            no_emergency_backup,
        } => commands::pull::run_volumes(&ctx, &filename, !no_emergency_backup),
        Commands::ListDatabases => commands::list::run(&ctx, ArtifactKind::Database),
        Commands::ListVolumes => commands::list::run(&ctx, ArtifactKind::Volumes),
        Commands::DeleteDatabase { filename } => {
            commands::delete::run(&ctx, ArtifactKind::Database, &filename)
        }
        Commands::DeleteVolume { filename } => {
            commands::delete::run(&ctx, ArtifactKind::Volumes, &filename)
        }
        Commands::Completions { .. } => unreachable!("handled before loading config"),
    }
}
