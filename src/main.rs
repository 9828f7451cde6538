use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use forgecache::config::Config;
use forgecache::server::CacheServer;

/// Network-attached cache for game-engine build artifacts.
#[derive(Parser)]
#[command(name = "forgecache", version)]
struct Args {
    /// Server port.
    #[arg(short, long, default_value_t = 9966)]
    port: u16,

    /// Cache storage path.
    #[arg(long, default_value = "cache")]
    path: PathBuf,

    /// Memory tier capacity in entries; 0 disables the tier.
    #[arg(short, long, default_value_t = 0)]
    capacity: usize,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config {
        port: args.port,
        root: args.path,
        capacity: args.capacity,
    };
    let server = Arc::new(CacheServer::new(&config));
    if let Err(err) = server.listen(config.port).await {
        error!(%err, "server exited");
        process::exit(1);
    }
}
