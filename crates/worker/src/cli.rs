use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use easel_core::PromptFields;

/// Command-line arguments for the worker binary.
#[derive(Debug, Parser)]
#[command(name = "easel-worker", version, about = "ComfyUI image generation worker")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render images with a workflow template and save them to disk.
    Generate(GenerateArgs),
    /// List registered workflow templates.
    Workflows,
    /// Show the provider credit balance.
    Balance,
    /// Show the render server's queue depth.
    Queue,
    /// Interrupt the prompt currently executing on the render server.
    Interrupt,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    /// Positive prompt text. Falls back to the template's default.
    #[arg(long, short = 'p')]
    pub positive: Option<String>,

    /// Negative prompt text.
    #[arg(long, short = 'n')]
    pub negative: Option<String>,

    /// Sampler seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Template name; defaults to the active workflow.
    #[arg(long, short = 'w')]
    pub workflow: Option<String>,

    /// Directory the images are written to.
    #[arg(long = "out-dir", default_value = "output", value_hint = ValueHint::DirPath)]
    pub out_dir: PathBuf,
}

impl GenerateArgs {
    pub fn overrides(&self) -> PromptFields {
        PromptFields {
            positive: self.positive.clone(),
            negative: self.negative.clone(),
            seed: self.seed,
        }
    }
}
