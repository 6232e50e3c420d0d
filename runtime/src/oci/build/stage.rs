//! Build stage model and stage-dependency resolution.
//!
//! Stages are kept as an ordered list and every query is a linear scan.
//! Stage counts are small (dozens at most), so no graph is precomputed.

use layerforge_core::error::{ForgeError, Result};
use serde::Serialize;

/// One stage of a multi-stage build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Stage name from `AS <name>`, empty when unnamed
    pub name: String,
    /// Image or earlier stage this stage is built from
    pub base_name: String,
    /// Position in declaration order
    pub index: usize,
}

impl Stage {
    pub fn new(name: impl Into<String>, base_name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            base_name: base_name.into(),
            index,
        }
    }
}

/// Return the index of the stage being built.
///
/// An empty `target` selects the last stage. Otherwise the first stage whose
/// name matches exactly (case-sensitive) is selected.
pub fn target_stage(stages: &[Stage], target: &str) -> Result<usize> {
    if target.is_empty() {
        return stages.len().checked_sub(1).ok_or_else(|| {
            ForgeError::ParseFailure("Dockerfile contains no stages".to_string())
        });
    }

    stages
        .iter()
        .position(|stage| stage.name == target)
        .ok_or_else(|| ForgeError::InvalidTarget {
            name: target.to_string(),
        })
}

/// Return true if a later stage is built from the stage at `index`.
///
/// Base names are lower-cased before comparison while the stage name is
/// compared as stored.
pub fn save_stage(index: usize, stages: &[Stage]) -> bool {
    let Some(current) = stages.get(index) else {
        return false;
    };

    stages.iter().skip(index + 1).any(|stage| {
        !stage.base_name.is_empty() && stage.base_name.to_lowercase() == current.name
    })
}

/// Return the index of the stage that the stage at `current` is built from.
///
/// Only stages at or before `current` are considered. `None` means the base
/// is an external image.
pub fn base_image_index(current: usize, stages: &[Stage]) -> Option<usize> {
    let base_name = stages.get(current)?.base_name.to_lowercase();

    stages
        .iter()
        .take(current + 1)
        .position(|stage| stage.name == base_name)
}

/// Resolver results for a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStage {
    pub stage: Stage,
    /// Output must be kept because a later stage builds on it
    pub retain: bool,
    /// Earlier stage this one is built from
    pub base_stage: Option<usize>,
}

/// Target and per-stage dependency information for a build.
#[derive(Debug, Clone, Serialize)]
pub struct StagePlan {
    /// Index of the target stage
    pub target: usize,
    /// Stages up to and including the target
    pub stages: Vec<PlannedStage>,
}

impl StagePlan {
    /// Resolve the target stage and the dependency facts of every stage up to it.
    pub fn resolve(stages: &[Stage], target: &str) -> Result<Self> {
        let target_index = target_stage(stages, target)?;

        let planned = stages
            .iter()
            .take(target_index + 1)
            .enumerate()
            .map(|(i, stage)| PlannedStage {
                stage: stage.clone(),
                retain: save_stage(i, stages),
                base_stage: base_image_index(i, stages),
            })
            .collect();

        Ok(Self {
            target: target_index,
            stages: planned,
        })
    }

    /// Stage indices that must be kept alive after they are built.
    pub fn retained(&self) -> Vec<usize> {
        self.stages
            .iter()
            .filter(|p| p.retain)
            .map(|p| p.stage.index)
            .collect()
    }

    /// Walk the base-stage chain backward from `index` to its root.
    ///
    /// The returned list starts with `index` and ends with the first stage
    /// whose base is an external image.
    pub fn dependency_chain(&self, index: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = Some(index);

        while let Some(i) = current {
            let Some(planned) = self.stages.get(i) else {
                break;
            };
            chain.push(i);
            // A stage named after its own base would otherwise loop forever.
            current = planned.base_stage.filter(|&base| base < i);
        }

        chain
    }
}
