//! `layerforge build` command - Build the target stage and export it.
//!
//! Runs the build pipeline: resolves the target stage, builds it with the
//! OCI-layout engine, writes config, manifest and layer files, then mirrors
//! the output directory into the cache directory.

use std::path::PathBuf;

use clap::Args;
use layerforge_core::config::ForgeConfig;
use layerforge_runtime::{BuildPipeline, BuildReport, LayoutEngine};
use serde::Serialize;

use super::SourceArgs;
use crate::output;

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Directory receiving config.json and layer files
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Directory receiving manifest.json and the mirrored output
    #[arg(long = "cache-dir")]
    pub cache_dir: Option<PathBuf>,

    /// OCI image layout written by the builder
    #[arg(long = "layout")]
    pub layout: Option<PathBuf>,

    /// Directory of base image layouts
    #[arg(long = "base-images")]
    pub base_images: Option<PathBuf>,

    /// Directory of intermediate stage layouts, one per stage index
    #[arg(long = "stage-images")]
    pub stage_images: Option<PathBuf>,

    /// Check each layer against its digest while writing it
    #[arg(long)]
    pub verify_digests: bool,

    /// Fail when any entry cannot be copied into the cache
    #[arg(long)]
    pub strict_cache: bool,

    /// Print the build summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Suppress build output
    #[arg(short, long)]
    pub quiet: bool,
}

impl BuildArgs {
    fn apply(&self, config: &mut ForgeConfig) -> Result<(), String> {
        self.source.apply(config)?;
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = dir.clone();
        }
        if let Some(layout) = &self.layout {
            config.image_layout = layout.clone();
        }
        if let Some(dir) = &self.base_images {
            config.base_images_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.stage_images {
            config.stage_images_dir = Some(dir.clone());
        }
        config.verify_digests |= self.verify_digests;
        config.strict_cache |= self.strict_cache;
        Ok(())
    }
}

/// Machine-readable build summary.
#[derive(Serialize)]
struct BuildSummary {
    target: usize,
    name: String,
    layers: Vec<String>,
    config: PathBuf,
    manifest: PathBuf,
    cached_files: usize,
    cache_failures: usize,
}

impl From<&BuildReport> for BuildSummary {
    fn from(report: &BuildReport) -> Self {
        Self {
            target: report.target.index,
            name: report.target.name.clone(),
            layers: report
                .export
                .layers
                .iter()
                .map(|l| l.digest.clone())
                .collect(),
            config: report.export.config_path.clone(),
            manifest: report.export.manifest_path.clone(),
            cached_files: report.cache.files,
            cache_failures: report.cache.failures.len(),
        }
    }
}

pub async fn execute(
    args: BuildArgs,
    mut config: ForgeConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    args.apply(&mut config)?;

    let report = BuildPipeline::new(LayoutEngine::new(), config).run().await?;

    if args.quiet {
        return Ok(());
    }

    if args.json {
        let json = serde_json::to_string_pretty(&BuildSummary::from(&report))?;
        println!("{json}");
        return Ok(());
    }

    let stage = if report.target.name.is_empty() {
        format!("stage {}", report.target.index)
    } else {
        format!("stage {} ({})", report.target.index, report.target.name)
    };
    println!("Built {stage}");

    let mut table = output::new_table(&["LAYER", "SIZE"]);
    for layer in &report.export.layers {
        table.add_row([layer.digest.clone(), output::format_bytes(layer.size)]);
    }
    println!("{table}");

    println!("Config:   {}", report.export.config_path.display());
    println!("Manifest: {}", report.export.manifest_path.display());
    if !report.cache.is_complete() {
        println!(
            "Warning: {} entries could not be copied into the cache",
            report.cache.failures.len()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: BuildArgs,
    }

    #[test]
    fn test_build_args_override_config() {
        let cli = TestCli::try_parse_from([
            "build",
            "--output-dir",
            "/out",
            "--cache-dir",
            "/cache2",
            "--layout",
            "/built",
            "--base-images",
            "/bases",
            "--verify-digests",
        ])
        .unwrap();

        let mut config = ForgeConfig::default();
        cli.args.apply(&mut config).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/out"));
        assert_eq!(config.cache_dir, PathBuf::from("/cache2"));
        assert_eq!(config.image_layout, PathBuf::from("/built"));
        assert_eq!(config.base_images_dir, Some(PathBuf::from("/bases")));
        assert_eq!(config.stage_images_dir, None);
        assert!(config.verify_digests);
        assert!(!config.strict_cache);
    }

    #[test]
    fn test_build_flags_do_not_clear_config_switches() {
        let cli = TestCli::try_parse_from(["build"]).unwrap();
        let mut config = ForgeConfig {
            strict_cache: true,
            ..Default::default()
        };
        cli.args.apply(&mut config).unwrap();
        assert!(config.strict_cache);
    }

    #[test]
    fn test_build_rejects_bad_build_arg() {
        let cli = TestCli::try_parse_from(["build", "--build-arg", "NOVALUE"]).unwrap();
        let mut config = ForgeConfig::default();
        assert!(cli.args.apply(&mut config).is_err());
    }
}
