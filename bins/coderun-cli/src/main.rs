mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coderun-cli")]
#[command(about = "coderun CLI - Run code in sandboxes and manage sandbox images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a source file in its language's sandbox
    Run {
        /// Language identifier (e.g., python, cpp, java)
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// File whose contents are fed to the program's stdin
        #[arg(short, long)]
        stdin: Option<PathBuf>,
    },

    /// List all supported languages
    ListLangs,

    /// Build the sandbox image for a language
    BuildImage {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Rebuild even if the image already exists
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// Build the sandbox images for every language
    BuildImages {
        /// Rebuild even if the images already exist
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            file,
            stdin,
        } => {
            commands::run(&language, &file, stdin.as_deref()).await?;
        }
        Commands::ListLangs => {
            commands::list_languages().await?;
        }
        Commands::BuildImage { name, force } => {
            commands::build_image(&name, force).await?;
        }
        Commands::BuildImages { force } => {
            commands::build_images(force).await?;
        }
    }

    Ok(())
}
