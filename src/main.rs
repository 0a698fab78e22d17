use anyhow::Context;
use axum::Router;
use clap::Parser;
use lightweight_classroom_server::cli::{Args, Command};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

const RESET_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let (router, state) = lightweight_classroom_server::init_router(&args).await?;
            state.reset_tokens.spawn_sweeper(RESET_SWEEP_INTERVAL);

            info!("Starting server...");
            run(router, args.server_address)
                .await
                .context("Server failed to run")?;
        }
        Command::Gateway { address } => {
            let router = lightweight_classroom_server::init_gateway_router(&args).await?;

            info!("Starting remote store gateway...");
            run(router, address)
                .await
                .context("Gateway failed to run")?;
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::try_new(log_level)?).init();
    Ok(())
}

async fn run(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    axum::serve(listener, router.into_make_service())
        .await
        .context("Axum server error")?;
    Ok(())
}
