//! Build engine interface and the OCI-layout engine.
//!
//! The pipeline drives a [`BuildEngine`]: it parses stages, prepares them,
//! retrieves base images for inspection and finally runs the build.
//! [`LayoutEngine`] parses the Dockerfile itself and reads images that an
//! external builder wrote in OCI image layout form.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use layerforge_core::config::ForgeConfig;
use layerforge_core::error::{ForgeError, Result};

use super::dockerfile::{Dockerfile, MetaArg};
use super::stage::{base_image_index, save_stage, Stage};
use crate::oci::image::{Image, OciLayoutImage};

/// A stage ready for the build engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStage {
    pub stage: Stage,
    /// Base reference with meta args expanded
    pub base_reference: String,
    /// Output must be kept because a later stage builds on it
    pub retain: bool,
    /// Earlier stage this one is built from
    pub base_stage: Option<usize>,
}

/// The engine that turns a Dockerfile into an image.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Parse the Dockerfile into stages and meta args.
    async fn parse_stages(&self, config: &ForgeConfig) -> Result<(Vec<Stage>, Vec<MetaArg>)>;

    /// Engine-internal stage preparation.
    async fn prepare_stages(
        &self,
        config: &ForgeConfig,
        stages: &[Stage],
        meta_args: &[MetaArg],
    ) -> Result<Vec<PreparedStage>>;

    /// Fetch the base image of a stage, if one is available.
    async fn retrieve_source_image(
        &self,
        stage: &PreparedStage,
        config: &ForgeConfig,
    ) -> Result<Option<Box<dyn Image>>>;

    /// Run the build and return the image of the target stage.
    async fn run_build(&self, config: &ForgeConfig) -> Result<Box<dyn Image>>;
}

impl PreparedStage {
    /// The stage with its base name replaced by the expanded reference.
    pub fn resolved_stage(&self) -> Stage {
        Stage {
            base_name: self.base_reference.clone(),
            ..self.stage.clone()
        }
    }
}

/// Engine backed by OCI image layouts on disk.
///
/// - base images: `<base_images_dir>/<reference with '/', ':' and '@' replaced by '_'>`
/// - intermediate stages: `<stage_images_dir>/<stage index>`
/// - the built image: `config.image_layout`
#[derive(Debug, Default, Clone)]
pub struct LayoutEngine;

impl LayoutEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BuildEngine for LayoutEngine {
    async fn parse_stages(&self, config: &ForgeConfig) -> Result<(Vec<Stage>, Vec<MetaArg>)> {
        let path = config.dockerfile_path();
        let dockerfile = Dockerfile::from_file(&path)?;

        tracing::info!(
            dockerfile = %path.display(),
            stages = dockerfile.stages.len(),
            meta_args = dockerfile.meta_args.len(),
            "Parsed Dockerfile"
        );

        let stages = dockerfile.stage_list();
        Ok((stages, dockerfile.meta_args))
    }

    async fn prepare_stages(
        &self,
        config: &ForgeConfig,
        stages: &[Stage],
        meta_args: &[MetaArg],
    ) -> Result<Vec<PreparedStage>> {
        let args = resolve_meta_args(meta_args, &config.build_args);

        // Stage links are resolved on the expanded base names.
        let mut expanded = Vec::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            let base_name = expand_args(&stage.base_name, &args);
            if base_name.is_empty() {
                return Err(ForgeError::BuildFailure(format!(
                    "stage {} has an empty base image reference after expanding '{}'",
                    i, stage.base_name
                )));
            }
            expanded.push(Stage {
                base_name,
                ..stage.clone()
            });
        }

        Ok(stages
            .iter()
            .zip(&expanded)
            .enumerate()
            .map(|(i, (stage, resolved))| PreparedStage {
                stage: stage.clone(),
                base_reference: resolved.base_name.clone(),
                retain: save_stage(i, &expanded),
                base_stage: base_image_index(i, &expanded),
            })
            .collect())
    }

    async fn retrieve_source_image(
        &self,
        stage: &PreparedStage,
        config: &ForgeConfig,
    ) -> Result<Option<Box<dyn Image>>> {
        if let Some(base) = stage.base_stage {
            let Some(dir) = &config.stage_images_dir else {
                return Ok(None);
            };
            let path = dir.join(base.to_string());
            if !path.exists() {
                tracing::debug!(
                    stage = stage.stage.index,
                    base_stage = base,
                    "No layout for base stage, skipping"
                );
                return Ok(None);
            }
            return load_layout(&path).map(Some);
        }

        if stage.base_reference.eq_ignore_ascii_case("scratch") {
            return Ok(None);
        }

        let Some(dir) = &config.base_images_dir else {
            tracing::debug!(
                reference = %stage.base_reference,
                "No base image directory configured, skipping"
            );
            return Ok(None);
        };

        let path = base_image_path(dir, &stage.base_reference);
        if !path.exists() {
            return Err(ForgeError::BuildFailure(format!(
                "base image {} not found at {}",
                stage.base_reference,
                path.display()
            )));
        }
        load_layout(&path).map(Some)
    }

    async fn run_build(&self, config: &ForgeConfig) -> Result<Box<dyn Image>> {
        tracing::info!(layout = %config.image_layout.display(), "Loading built image");
        load_layout(&config.image_layout)
    }
}

fn load_layout(path: &Path) -> Result<Box<dyn Image>> {
    Ok(Box::new(OciLayoutImage::from_path(path)?))
}

/// Directory holding the layout of an external base image.
pub fn base_image_path(base_images_dir: &Path, reference: &str) -> PathBuf {
    let name: String = reference
        .chars()
        .map(|c| if matches!(c, '/' | ':' | '@') { '_' } else { c })
        .collect();
    base_images_dir.join(name)
}

/// Resolve meta arg values: build args override declared defaults.
fn resolve_meta_args(
    meta_args: &[MetaArg],
    build_args: &HashMap<String, String>,
) -> HashMap<String, String> {
    meta_args
        .iter()
        .filter_map(|arg| {
            build_args
                .get(&arg.name)
                .or(arg.default.as_ref())
                .map(|value| (arg.name.clone(), value.clone()))
        })
        .collect()
}

/// Expand `${VAR}` and `$VAR` references in a string using build args.
fn expand_args(s: &str, args: &HashMap<String, String>) -> String {
    // Longest names first so `$VERSION` does not clobber `$VERSION_MAJOR`.
    let mut keys: Vec<&String> = args.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut result = s.to_string();
    for key in keys {
        let value = &args[key];
        result = result.replace(&format!("${{{}}}", key), value);
        result = result.replace(&format!("${}", key), value);
    }
    result
}
