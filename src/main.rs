//! modelhub - command line entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use modelhub::config::HubSettings;
use modelhub::hub::{get_cache_size, list_cached_repos};
use modelhub::{
    ConfigOverrides, HfHubClient, Repo, Tokenizer, WordPieceConfig, WordPieceTokenizer, registry,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "modelhub")]
#[command(about = "Fetch, train and publish pretrained artifacts", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered models and preprocessors
    Registry,

    /// Download a bundle (or use a local one) and print its directory
    Fetch {
        /// Local directory, `org/name` hub id, or bare name in the configured organization
        path: String,
    },

    /// List repos present in the local cache
    Cached,

    /// Train a WordPiece tokenizer and save it as a bundle
    TrainTokenizer {
        /// Plain-text training files
        #[arg(long, required = true, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Bundle directory to write `preprocessor/` into
        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        vocab_size: Option<usize>,

        #[arg(long)]
        min_frequency: Option<u64>,
    },

    /// Push a saved tokenizer bundle to the hub
    PushTokenizer {
        /// Bundle directory containing `preprocessor/`
        dir: PathBuf,

        /// Target repo; bare names go to the configured organization
        repo_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    let settings = HubSettings::load(cli.config)?;
    settings.validate()?;

    tracing::debug!(
        endpoint = %settings.endpoint,
        organization = %settings.organization,
        cache_dir = ?settings.cache_dir,
        "Configuration loaded"
    );

    match cli.command {
        Command::Registry => {
            for registry in [registry::models(), registry::preprocessors()] {
                for name in registry.names() {
                    let entry = registry.lookup(&name)?;
                    println!("{}\t{name}\t{}", entry.kind, entry.implementation.name);
                }
            }
        }

        Command::Cached => {
            for repo_id in list_cached_repos(&settings.cache_dir) {
                let size = get_cache_size(&settings.cache_dir, &repo_id).unwrap_or(0);
                println!("{repo_id}\t{size}");
            }
        }

        Command::Fetch { path } => {
            let hub = HfHubClient::new(settings).context("Failed to create hub client")?;
            let repo = Repo::resolve(&path, &hub)
                .await
                .with_context(|| format!("Failed to fetch {}", path))?;
            println!("{}", repo.repo_dir().display());
        }

        Command::TrainTokenizer {
            files,
            output,
            vocab_size,
            min_frequency,
        } => {
            let hub = HfHubClient::new(settings).context("Failed to create hub client")?;
            let mut tokenizer = WordPieceTokenizer::from_config(
                WordPieceConfig::default(),
                &ConfigOverrides::new(),
                &hub,
            )
            .await?;

            let mut train_config = tokenizer.config().train_config.clone();
            if let Some(vocab_size) = vocab_size {
                train_config.vocab_size = vocab_size;
            }
            if let Some(min_frequency) = min_frequency {
                train_config.min_frequency = min_frequency;
            }

            tokenizer
                .train(&files, &train_config)
                .context("Failed to train tokenizer")?;
            tokenizer
                .save_pretrained(&output)
                .with_context(|| format!("Failed to save tokenizer to {:?}", output))?;

            tracing::info!(
                output = ?output,
                vocab_size = tokenizer.vocab_size(),
                "Tokenizer trained"
            );
        }

        Command::PushTokenizer { dir, repo_id } => {
            let hub = HfHubClient::new(settings).context("Failed to create hub client")?;
            let dir = dir
                .to_str()
                .with_context(|| format!("Path is not valid UTF-8: {:?}", dir))?;
            let tokenizer =
                WordPieceTokenizer::from_pretrained(dir, &ConfigOverrides::new(), &hub).await?;
            let repo_id = tokenizer
                .push_to_hub(&repo_id, &hub)
                .await
                .context("Failed to push tokenizer")?;
            println!("{repo_id}");
        }
    }

    Ok(())
}
