use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tcp_chat::{
    cli::{Cli, Command},
    client,
    registry::Registry,
    server::Server,
    signal::ExitSignals,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout belongs to the chat itself.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            let listener = TcpListener::bind(args.listen)
                .await
                .with_context(|| format!("failed to bind {}", args.listen))?;
            let registry = Arc::new(Registry::with_queue_capacity(args.queue_capacity.get()));
            let server = Server::with_registry(listener, registry);
            let addr = server.local_addr()?;
            let mut signals =
                ExitSignals::install().context("failed to install signal handlers")?;
            println!("Chat server started on {addr}");
            let stopped = async move {
                let signal = signals.recv().await;
                info!(?signal, "received exit signal");
            };
            if let Err(err) = server.run_until(stopped).await {
                warn!("server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
