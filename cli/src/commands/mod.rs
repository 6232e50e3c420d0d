//! CLI command definitions and dispatch.

mod build;
mod inspect;
mod stages;
mod version;

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use layerforge_core::config::{ForgeConfig, LogLevel};

/// Layerforge - multi-stage container image builds.
#[derive(Parser)]
#[command(name = "layerforge", version, about)]
pub struct Cli {
    /// Configuration file (YAML or JSON); flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Load the configuration file if one was given and apply global flags.
    pub fn load_config(&self) -> Result<ForgeConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ForgeConfig::from_file(path)?,
            None => ForgeConfig::default(),
        };
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Build the target stage and export its artifacts
    Build(build::BuildArgs),
    /// Show the stages of a Dockerfile and how they depend on each other
    Stages(stages::StagesArgs),
    /// List the entries of an exported layer file
    Inspect(inspect::InspectArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: ForgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Build(args) => build::execute(args, config).await,
        Command::Stages(args) => stages::execute(args, config).await,
        Command::Inspect(args) => inspect::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

/// Flags that locate the Dockerfile and select the target stage.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Build context directory
    #[arg(short = 'c', long = "context")]
    pub context: Option<PathBuf>,

    /// Path to Dockerfile (default: <CONTEXT>/Dockerfile)
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Stage to build (default: the last stage)
    #[arg(long)]
    pub target: Option<String>,

    /// Set build-time variables (KEY=VALUE), can be repeated
    #[arg(long = "build-arg")]
    pub build_arg: Vec<String>,
}

impl SourceArgs {
    /// Override configuration values with the flags that were given.
    pub fn apply(&self, config: &mut ForgeConfig) -> Result<(), String> {
        if let Some(context) = &self.context {
            config.context_dir = context.clone();
        }
        if let Some(file) = &self.file {
            config.dockerfile = file.clone();
        }
        if let Some(target) = &self.target {
            config.target = Some(target.clone());
        }
        config.build_args.extend(parse_build_args(&self.build_arg)?);
        Ok(())
    }
}

/// Parse KEY=VALUE pairs into a HashMap.
fn parse_build_args(args: &[String]) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("Invalid build arg (expected KEY=VALUE): {arg}"))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}
