//! Layerforge Runtime - build pipeline implementation.
//!
//! This crate resolves Dockerfile stages, drives a build engine, exports the
//! resulting image as files and mirrors the output into a cache directory.

#![allow(clippy::result_large_err)]

pub mod fs;
pub mod oci;

// Re-export common types
pub use fs::{copy_tree, CopyFailure, CopyReport};
pub use oci::{export_image, ExportLayout, ExportReport, ExportedLayer};
pub use oci::{list_layer_entries, EntryKind, LayerEntry};
pub use oci::{BlobLayer, Image, Layer, OciLayoutImage};
pub use oci::{BuildEngine, BuildPipeline, BuildReport, LayoutEngine, PreparedStage};
pub use oci::{Dockerfile, MetaArg, Stage, StagePlan};

/// Layerforge Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
