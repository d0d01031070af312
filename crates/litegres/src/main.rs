use anyhow::Result;
use clap::{Parser, ValueEnum};
use litegres::server::{Server, ServerConfig};
use pgsrv::handler::ProtocolHandler;
use pgsrv::sqlite::SqliteBackend;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LoggingMode {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl From<LoggingMode> for logutil::LoggingMode {
    fn from(mode: LoggingMode) -> Self {
        match mode {
            LoggingMode::Pretty => logutil::LoggingMode::Pretty,
            LoggingMode::Json => logutil::LoggingMode::Json,
            LoggingMode::Compact => logutil::LoggingMode::Compact,
        }
    }
}

#[derive(Parser)]
#[clap(name = "litegres")]
#[clap(version)]
#[clap(about = "Postgres wire protocol server for SQLite databases", long_about = None)]
struct Cli {
    /// TCP address to bind to. `:port` listens on all interfaces.
    #[clap(short, long, env = "LITEGRES_BIND", default_value = ":5432")]
    bind: String,

    /// Directory containing the database files.
    ///
    /// Clients pick a file in this directory with the database startup
    /// parameter. The directory must already exist.
    #[clap(short = 'f', long, env = "LITEGRES_DATA_DIR")]
    data_dir: PathBuf,

    /// Log verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format.
    #[clap(long, value_enum, default_value_t)]
    log_mode: LoggingMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logutil::init(cli.verbose, cli.log_mode.into());

    info!(version = env!("CARGO_PKG_VERSION"), "starting...");

    let config = ServerConfig::new(cli.bind, cli.data_dir);
    let handler = ProtocolHandler::new(SqliteBackend::new(&config.data_dir));
    let server = Server::open(&config, handler).await?;
    info!(
        "Connect via Postgres: postgresql://{}/<database>",
        server.local_addr()
    );

    signal::ctrl_c().await?;
    info!("shutdown triggered");
    server.close().await?;

    Ok(())
}
