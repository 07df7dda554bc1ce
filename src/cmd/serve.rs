//! The `serve` subcommand.

use std::{net::SocketAddr, sync::Arc};

use clap::Args;
use tokio::net::TcpListener;

use crate::{api, prelude::*};

use super::BackendOpts;

/// Options for the `serve` subcommand.
#[derive(Args, Clone, Debug)]
pub struct ServeOpts {
    /// The address to listen on.
    #[clap(long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    #[clap(flatten)]
    pub backend: BackendOpts,
}

/// The `serve` subcommand: run the HTTP service.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_serve(opts: &ServeOpts) -> Result<()> {
    let pipeline = Arc::new(opts.backend.build_pipeline().await?);
    let app = api::create_router(pipeline);

    let listener = TcpListener::bind(opts.listen)
        .await
        .with_context(|| format!("failed to bind {}", opts.listen))?;
    info!("listening on {}", opts.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

/// Resolve when the process is asked to stop. In-flight processing tasks
/// are detached, so a stop during a run can leave a stuck `processing` job;
/// operational re-triggering covers that case.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
