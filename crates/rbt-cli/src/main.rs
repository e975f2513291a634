mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::run::{cmd_db_migrate, cmd_db_status, cmd_loop, cmd_pricecache_backfill, cmd_tick};
use rbt_config::ConfigError;

#[derive(Parser)]
#[command(name = "rbt")]
#[command(about = "Automated equity trading orchestrator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Orchestrator tick commands
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },

    /// Price cache maintenance commands
    Pricecache {
        #[command(subcommand)]
        cmd: PricecacheCmd,
    },
}

#[derive(Subcommand)]
enum PricecacheCmd {
    /// Backfill historical bars from a CSV export and log data-quality findings.
    Backfill {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum RunCmd {
    /// Run exactly one orchestrator tick and exit.
    Tick,
    /// Run orchestrator ticks forever, sleeping between them.
    Loop {
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    let config = match rbt_config::load_from_env() {
        Ok(config) => config,
        Err(ConfigError(message)) => {
            eprintln!("config error: {message}");
            std::process::exit(2);
        }
    };

    init_tracing(&config.log_level);

    let result = match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => cmd_db_status(&config).await,
            DbCmd::Migrate => cmd_db_migrate(&config).await,
        }
        .map(|_| 0),
        Commands::Run { cmd } => match cmd {
            RunCmd::Tick => cmd_tick(config).await,
            RunCmd::Loop { interval_secs } => cmd_loop(config, interval_secs).await,
        },
        Commands::Pricecache { cmd } => match cmd {
            PricecacheCmd::Backfill { path, symbol, timeframe } => {
                cmd_pricecache_backfill(&config, path, &symbol, &timeframe).await.map(|_| 0)
            }
        },
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(3);
        }
    }
}

fn init_tracing(default_level: &str) {
    let default_level = default_level.to_string();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();
}
