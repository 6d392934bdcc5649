use anyhow::Result;
use clap::Parser;
use paizer::RelayServer;
use tracing::{info, warn};

mod cli;
mod config;

use cli::Cli;
use config::Settings;

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Settings::load(&cli)?;

    let mut builder = RelayServer::builder()
        .bind_stream(settings.stream_addr.as_str())
        .config(settings.relay.clone());
    if let Some(addr) = &settings.websocket_addr {
        builder = builder.bind_websocket(addr.as_str());
    }
    let server = builder.build().await?;

    if let Some(addr) = server.local_stream_addr() {
        info!("raw stream clients: {addr}");
    }
    if let Some(addr) = server.local_websocket_addr() {
        info!("websocket clients: ws://{addr}");
    }

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };
    server.run_until(shutdown).await?;

    info!("relay stopped");
    Ok(())
}
