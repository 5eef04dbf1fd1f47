//! Codebox sandbox service
//!
//! Serves the sandbox HTTP API and provides maintenance commands for the
//! sandbox roots and their dependencies.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codebox::config::DEFAULT_CONFIG_PATH;
use codebox::{Config, DependencyManager, EXAMPLE_CONFIG, Language};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod lifecycle;

#[derive(Parser)]
#[command(name = "codebox")]
#[command(about = "A service for running untrusted Python and JavaScript in seccomp sandboxes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "CONFIG_PATH", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve,

    /// Initialize a new configuration file
    Init {
        /// Output path (default: config.yaml)
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration with the API key masked
    ShowConfig,

    /// Provision sandbox roots
    Provision {
        /// Language to provision (default: all)
        #[arg(short, long)]
        language: Option<Language>,

        /// Re-extract the isolation library even if present
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect installed dependencies
    Deps {
        #[command(subcommand)]
        command: DepsCommands,
    },
}

#[derive(Subcommand)]
enum DepsCommands {
    /// List installed packages
    List {
        /// Language ID (python3 or nodejs)
        #[arg(short, long)]
        language: Language,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { output, force } = &cli.command {
        init_logging(cli.verbose);
        return init_config(output, *force).await;
    }

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load configuration from '{}'", cli.config.display()))?;
    init_logging(cli.verbose || config.app.debug);
    debug!(path = %cli.config.display(), "configuration loaded");

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Serve => lifecycle::serve(config).await,
        Commands::ShowConfig => show_config(&config),
        Commands::Provision { language, force } => provision(&config, language, force).await,
        Commands::Deps {
            command: DepsCommands::List { language },
        } => list_dependencies(config, language).await,
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(&config.redacted()).context("failed to render configuration")?;
    print!("{yaml}");
    Ok(())
}

async fn provision(config: &Config, language: Option<Language>, force: bool) -> Result<()> {
    let languages = match language {
        Some(language) => vec![language],
        None => Language::ALL.to_vec(),
    };

    for language in languages {
        let root = codebox::SandboxRoot::from_config(config, language)
            .with_context(|| format!("failed to load the {language} isolation library"))?;
        info!(%language, root = %root.path().display(), force, "provisioning sandbox root");
        root.provision(force)
            .await
            .with_context(|| format!("failed to provision the {language} sandbox root"))?;
        println!("{language}: {}", root.path().display());
    }
    Ok(())
}

async fn list_dependencies(config: Config, language: Language) -> Result<()> {
    let config = Arc::new(config);
    let (python_root, nodejs_root) = lifecycle::load_roots(&config)?;
    let deps = DependencyManager::new(config, python_root, nodejs_root);

    let installed = deps
        .list(language)
        .await
        .with_context(|| format!("failed to list {language} dependencies"))?;
    for dep in installed {
        println!("{}=={}", dep.name, dep.version);
    }
    Ok(())
}
