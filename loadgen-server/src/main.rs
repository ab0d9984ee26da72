//! Control-plane binary: loads the target pool, wires the run controller to a
//! broadcast snapshot sink and serves the HTTP/WebSocket API.

mod seed;
mod server;

use clap::Parser;
use loadgen::{BroadcastSink, RunController, TargetPool};
use seed::Seeder;
use server::ServerState;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

const DEFAULT_PORT: u16 = 5002;
const DEFAULT_BACKEND: &str = "http://localhost:8080";

#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    /// Port to serve the control API on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Directory holding the mock fixture files.
    #[arg(short, long, default_value = "./mocks")]
    mocks_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let backend_address = std::env::var("BACKEND_ADDRESS").unwrap_or_else(|_| {
        warn!(
            "BACKEND_ADDRESS not set, defaulting to {}",
            DEFAULT_BACKEND
        );
        DEFAULT_BACKEND.to_string()
    });

    let pool = match TargetPool::load(cli.mocks_dir.join("bulk_clients.json")) {
        Ok(pool) => pool,
        Err(err) => {
            warn!(%err, "could not load client ids, starting with an empty pool");
            TargetPool::default()
        }
    };

    let sink = Arc::new(BroadcastSink::default());
    let controller = match RunController::new(Arc::new(pool), sink.clone()) {
        Ok(controller) => controller,
        Err(err) => {
            error!(%err, "failed to build http client");
            std::process::exit(1);
        }
    };
    let seeder = match Seeder::new(backend_address.clone(), cli.mocks_dir.clone()) {
        Ok(seeder) => seeder,
        Err(err) => {
            error!(%err, "failed to build seeding client");
            std::process::exit(1);
        }
    };

    let state = ServerState {
        controller,
        sink,
        seeder,
        backend_address,
    };

    if let Err(err) = server::serve(cli.port, state).await {
        error!(%err, "server failed");
        std::process::exit(1);
    }
}
