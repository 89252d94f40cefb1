use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::annotator::DEFAULT_MAX_TOKENS;
use crate::tuples::DEFAULT_DELIMITER;

pub const DEFAULT_WORK_DIR: &str = ".cache/bwscale";
pub const DEFAULT_API_URL: &str = "https://api.fireworks.ai/inference/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "accounts/fireworks/models/deepseek-v3";

#[derive(Parser, Debug)]
#[command(
    name = "bwscale",
    version,
    about = "Best-Worst Scaling annotation and scoring with an LLM annotator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the batch request file from a tuple file.
    Prepare(PrepareArgs),
    /// Send batch requests to the annotator and record the answers.
    Annotate(AnnotateArgs),
    /// Aggregate annotations into per-text Best-Worst scores.
    Score(ScoreArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PrepareArgs {
    #[arg(long, default_value = DEFAULT_WORK_DIR)]
    pub work_dir: PathBuf,

    #[arg(long)]
    pub tuples_path: PathBuf,

    #[arg(long, default_value_t = DEFAULT_DELIMITER)]
    pub delimiter: char,

    #[arg(long)]
    pub requests_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[arg(long, default_value_t = 150)]
    pub max_tokens: u32,

    #[arg(long)]
    pub system_instruction: Option<String>,

    #[arg(long)]
    pub task_instruction: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AnnotateArgs {
    #[arg(long, default_value = DEFAULT_WORK_DIR)]
    pub work_dir: PathBuf,

    #[arg(long)]
    pub requests_path: Option<PathBuf>,

    #[arg(long)]
    pub annotations_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[arg(long, env = "BWS_API_KEY", hide_env_values = true)]
    pub api_key: String,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    pub default_max_tokens: u32,

    #[arg(long, default_value_t = 0.9)]
    pub temperature: f64,

    #[arg(long, default_value_t = 1.0)]
    pub top_p: f64,

    #[arg(long, default_value_t = 40)]
    pub top_k: u32,

    #[arg(long, default_value_t = 0.0)]
    pub presence_penalty: f64,

    #[arg(long, default_value_t = 0.0)]
    pub frequency_penalty: f64,

    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    #[arg(long, default_value = DEFAULT_WORK_DIR)]
    pub work_dir: PathBuf,

    #[arg(long)]
    pub tuples_path: PathBuf,

    #[arg(long, default_value_t = DEFAULT_DELIMITER)]
    pub delimiter: char,

    #[arg(long)]
    pub annotations_path: Option<PathBuf>,

    #[arg(long)]
    pub scores_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub with_counts: bool,
}
