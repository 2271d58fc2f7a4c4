//! `easel-worker` -- command-line front end for ComfyUI generation.
//!
//! Render settings come from `COMFY_*` environment variables (see
//! `ComfyUIConfig::from_env`); the `balance` command reads `API_TOKEN`
//! and `OPENROUTER_BASE_URL`. A `.env` file in the working directory is
//! loaded first.

use clap::Parser;
use easel_worker::cli::CliArgs;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "easel_worker=info,easel_comfyui=info,easel_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    if let Err(e) = easel_worker::run(args.command).await {
        tracing::error!(error = %e, "Command failed");
        std::process::exit(1);
    }
}
