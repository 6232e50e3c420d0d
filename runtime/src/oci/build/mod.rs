//! Multi-stage build support.
//!
//! Splits a Dockerfile into stages, resolves which stage is the target and
//! which stages later ones depend on, and runs the build pipeline against a
//! [`BuildEngine`].
//!
//! # Usage
//!
//! ```text
//! layerforge build --context . --target release
//! ```

pub mod dockerfile;
pub mod engine;
pub mod pipeline;
pub mod stage;

pub use dockerfile::{Dockerfile, DockerfileStage, MetaArg};
pub use engine::{BuildEngine, LayoutEngine, PreparedStage};
pub use pipeline::{BuildPipeline, BuildReport};
pub use stage::{base_image_index, save_stage, target_stage, PlannedStage, Stage, StagePlan};
