//! `em serve`: run the HTTP API with the periodic sweeper.

use super::StoreContext;
use anyhow::{Context as _, Result};
use clap::Args;
use ember_server::{AppState, Server, spawn_sweeper};
use std::net::SocketAddr;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (defaults to `server.bind`).
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Seconds between sweeps (defaults to `server.sweep_interval_secs`); 0 disables.
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,
}

/// Execute `em serve` until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the config or store cannot be loaded, the runtime
/// cannot start, or the address cannot be bound.
pub fn run_serve(args: &ServeArgs, ctx: &StoreContext) -> Result<()> {
    let mut config = ctx.config()?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(secs) = args.sweep_interval_secs {
        config.server.sweep_interval_secs = secs;
    }
    let bind = config.server.bind;
    let interval = config.server.sweep_interval();
    let state = AppState::new(ctx.service_with(config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let server = Server::bind(bind, state.clone())
            .await
            .with_context(|| format!("Failed to bind {bind}"))?;
        let addr = server.local_addr()?;
        eprintln!("ember listening on http://{addr}");

        let sweeper = (!interval.is_zero()).then(|| spawn_sweeper(&state, interval));
        server.run_until(shutdown_signal()).await;
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        Ok(())
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}
