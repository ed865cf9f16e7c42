use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mien_core::{ArtifactBundle, Pipeline};

#[derive(Parser)]
#[command(name = "mien", about = "Mien face classification CLI")]
struct Cli {
    /// Directory containing the trained artifact files
    #[arg(long, default_value = "artifacts")]
    artifacts: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the faces in an image file
    Classify {
        /// Path to the image
        path: PathBuf,
    },
    /// Print the class dictionary the artifacts were trained with
    Labels,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let bundle = ArtifactBundle::load(&cli.artifacts)
        .with_context(|| format!("loading artifacts from {}", cli.artifacts.display()))?;
    let pipeline = Pipeline::new(Arc::new(bundle));

    match cli.command {
        Commands::Classify { path } => {
            let outcomes = pipeline.classify_path(&path);
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Commands::Labels => {
            println!("{}", serde_json::to_string_pretty(pipeline.labels().dictionary())?);
        }
    }

    Ok(())
}
