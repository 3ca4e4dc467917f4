use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use duelbox::auth::StaticTokenValidator;
use duelbox::config::Settings;
use duelbox::persistence::LogMatchStore;
use duelbox::problems::store::{demo_problems, InMemoryProblemStore};
use duelbox::server::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time competitive coding duel backend")]
struct Args {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Run the sandbox without privileged isolation steps
    /// (development only; unsafe for untrusted code)
    #[arg(long)]
    permissive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = Settings::from_env().context("invalid configuration")?;
    if args.permissive {
        settings.sandbox.permissive = true;
        log::warn!("permissive sandbox mode: submissions run without network isolation");
    }

    // Stand-alone wiring: dev token validator, built-in problems, logging
    // match store. Production swaps each collaborator behind its trait.
    let state = AppState::new(
        settings,
        Arc::new(StaticTokenValidator),
        Arc::new(InMemoryProblemStore::new(demo_problems())),
        Arc::new(LogMatchStore),
    );
    let app = build_router(state);

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", args.host, args.port))?;
    log::info!("listening on {}", listener.local_addr()?);

    tokio::select! {
        result = axum::serve(listener, app) => result.context("server exited with error")?,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
