//! Command implementations for the `easel-worker` binary.

pub mod cli;
pub mod output;

use easel_billing::{BillingConfig, BillingError, CreditsClient};
use easel_comfyui::{ComfyUIApi, ComfyUIApiError, ComfyUIConfig, ConfigError, GenerationError, Generator};
use easel_core::WorkflowError;

use crate::cli::{Command, GenerateArgs};

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Api(#[from] ComfyUIApiError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Invalid billing configuration: {0}")]
    BillingConfig(#[from] easel_billing::ConfigError),

    #[error("Failed to write images: {0}")]
    Output(#[from] std::io::Error),
}

/// Run one CLI command to completion.
pub async fn run(command: Command) -> Result<(), WorkerError> {
    match command {
        Command::Generate(args) => generate(&generator_from_env()?, args).await,
        Command::Workflows => workflows(&generator_from_env()?).await,
        Command::Balance => balance().await,
        Command::Queue => {
            let queue = generator_from_env()?.backend().queue_status().await?;
            println!(
                "running: {}, pending: {}",
                queue.queue_running.len(),
                queue.queue_pending.len()
            );
            Ok(())
        }
        Command::Interrupt => {
            generator_from_env()?.backend().interrupt().await?;
            tracing::info!("Interrupt sent");
            Ok(())
        }
    }
}

fn generator_from_env() -> Result<Generator<ComfyUIApi>, WorkerError> {
    let config = ComfyUIConfig::from_env()?;
    tracing::info!(
        server = %config.api_url(),
        workflows_dir = %config.workflows_dir.display(),
        completion = ?config.completion,
        "Loaded render configuration",
    );
    Ok(Generator::from_config(&config)?)
}

async fn generate(
    generator: &Generator<ComfyUIApi>,
    args: GenerateArgs,
) -> Result<(), WorkerError> {
    let images = generator
        .generate_with(args.workflow.as_deref(), args.overrides())
        .await?;

    let written = output::write_images(&args.out_dir, &images).await?;
    for path in &written {
        println!("{}", path.display());
    }
    tracing::info!(count = written.len(), out_dir = %args.out_dir.display(), "Saved images");
    Ok(())
}

async fn workflows(generator: &Generator<ComfyUIApi>) -> Result<(), WorkerError> {
    let registry = generator.registry();
    let active = registry.active_workflow().await?;
    for name in registry.list_workflows() {
        let marker = if name == active { "*" } else { " " };
        let defaults = registry.defaults(Some(&name)).await?;
        println!(
            "{marker} {name}\t{}",
            serde_json::to_string(&defaults).unwrap_or_default()
        );
    }
    Ok(())
}

async fn balance() -> Result<(), WorkerError> {
    let client = CreditsClient::from_config(&BillingConfig::from_env()?)?;
    let balance = client.fetch_balance().await?;
    println!(
        "{}",
        serde_json::json!({ "total": balance.total, "spent": balance.spent })
    );
    Ok(())
}
