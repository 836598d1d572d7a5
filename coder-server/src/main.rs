//! Coder server: exposes the generate → verify → review → execute cycle over HTTP.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use coder::cycle::CycleController;
use coder::io::completion::OllamaClient;
use coder::io::config::{DEFAULT_CONFIG_PATH, load_config};
use coder::io::sandbox::InterpreterSandbox;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "coder-server")]
#[command(about = "HTTP endpoint for the self-correcting code generation cycle")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3400")]
    port: u16,

    /// Config file (missing file means defaults)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coder_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    info!(
        base_url = %config.completion.base_url,
        model = %config.completion.model,
        max_cycles = config.max_cycles,
        "starting coder-server"
    );

    let completion = OllamaClient::new(&config.completion)?;
    let sandbox = InterpreterSandbox::from_config(&config.sandbox);
    let state = AppState::new(CycleController::from_config(completion, sandbox, &config));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::router(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(err = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
