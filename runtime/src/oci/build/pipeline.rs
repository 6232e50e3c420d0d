//! Build pipeline.
//!
//! Drives a [`BuildEngine`] through a full build: stage resolution, base
//! image inspection, the build itself, artifact export and finally the copy
//! of the output directory into the cache directory.

use std::path::Path;

use layerforge_core::config::ForgeConfig;
use layerforge_core::error::{ForgeError, Result};

use super::engine::{BuildEngine, PreparedStage};
use super::stage::{Stage, StagePlan};
use crate::fs::{copy_tree, CopyReport};
use crate::oci::export::{export_image, ExportLayout, ExportReport};
use crate::oci::image::Image;

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// The stage that was built
    pub target: Stage,
    pub plan: StagePlan,
    pub export: ExportReport,
    pub cache: CopyReport,
}

/// Runs one build with a given engine and configuration.
pub struct BuildPipeline<E: BuildEngine> {
    engine: E,
    config: ForgeConfig,
}

impl<E: BuildEngine> BuildPipeline<E> {
    pub fn new(engine: E, config: ForgeConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Run the build to completion.
    ///
    /// The first error aborts the pipeline. Failures while copying single
    /// entries into the cache are only fatal with `strict_cache`.
    pub async fn run(&self) -> Result<BuildReport> {
        let config = &self.config;
        config.validate()?;

        let (stages, meta_args) = self.engine.parse_stages(config).await?;
        let prepared = self
            .engine
            .prepare_stages(config, &stages, &meta_args)
            .await?;
        let resolved: Vec<_> = prepared.iter().map(PreparedStage::resolved_stage).collect();
        let plan = StagePlan::resolve(&resolved, config.target_name())?;
        log_plan(&plan);

        for stage in &prepared {
            self.inspect_base(stage).await?;
        }

        let image = self.engine.run_build(config).await?;

        // Export and cache copy are blocking file I/O.
        let output_config = config.clone();
        let (export, cache) =
            tokio::task::spawn_blocking(move || write_outputs(image, &output_config))
                .await
                .map_err(|e| ForgeError::BuildFailure(format!("output task failed: {}", e)))??;

        let target = plan.stages[plan.target].stage.clone();
        Ok(BuildReport {
            target,
            plan,
            export,
            cache,
        })
    }

    /// Fetch the base image of a stage and log what it is made of.
    async fn inspect_base(&self, stage: &PreparedStage) -> Result<()> {
        let Some(image) = self
            .engine
            .retrieve_source_image(stage, &self.config)
            .await?
        else {
            tracing::debug!(
                stage = stage.stage.index,
                base = %stage.base_reference,
                "No base image to inspect"
            );
            return Ok(());
        };

        let config = image.config_file()?;
        tracing::info!(
            stage = stage.stage.index,
            base = %stage.base_reference,
            architecture = ?config.architecture(),
            os = ?config.os(),
            "Retrieved base image"
        );

        for layer in image.layers()? {
            tracing::info!(
                stage = stage.stage.index,
                digest = %layer.digest()?,
                "Base image layer"
            );
        }
        Ok(())
    }
}

/// Export the image, then mirror the output directory into the cache.
fn write_outputs(image: Box<dyn Image>, config: &ForgeConfig) -> Result<(ExportReport, CopyReport)> {
    let layout = ExportLayout::new(&config.output_dir, &config.cache_dir)
        .with_verify_digests(config.verify_digests);
    let export = export_image(image.as_ref(), &layout)?;
    tracing::info!(
        output = %config.output_dir.display(),
        layers = export.layer_count(),
        "Exported image artifacts"
    );

    log_listing(&config.output_dir);

    let mut cache = copy_tree(&config.output_dir, &config.cache_dir)?;
    if config.strict_cache {
        cache = cache.into_strict()?;
    } else if !cache.is_complete() {
        tracing::warn!(
            failures = cache.failures.len(),
            cache = %config.cache_dir.display(),
            "Cache copy is incomplete"
        );
    }
    tracing::info!(
        cache = %config.cache_dir.display(),
        files = cache.files,
        directories = cache.directories,
        "Copied output to cache"
    );

    Ok((export, cache))
}

fn log_plan(plan: &StagePlan) {
    let target = &plan.stages[plan.target];
    tracing::info!(
        target = plan.target,
        name = %target.stage.name,
        stages = plan.stages.len(),
        retained = ?plan.retained(),
        "Resolved target stage"
    );
    for planned in &plan.stages {
        tracing::debug!(
            index = planned.stage.index,
            name = %planned.stage.name,
            base = %planned.stage.base_name,
            retain = planned.retain,
            base_stage = ?planned.base_stage,
            "Stage"
        );
    }
}

fn log_listing(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Cannot list directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        tracing::debug!(
            dir = %dir.display(),
            name = %entry.file_name().to_string_lossy(),
            is_dir,
            "Output entry"
        );
    }
}
