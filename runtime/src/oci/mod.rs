//! OCI image support for Layerforge.
//!
//! - Image and layer traits, and an image read from an OCI image layout
//! - Export of a built image into config, manifest and layer files
//! - Layer inspection (tar.gz)
//! - The build pipeline and its engine
//!
//! # Layout
//!
//! ```text
//! image/
//! ├── oci-layout           (OCI layout marker)
//! ├── index.json           (Image index)
//! └── blobs/
//!     └── sha256/
//!         ├── <manifest>   (Image manifest)
//!         ├── <config>     (Image configuration)
//!         └── <layers>     (Filesystem layers)
//! ```

pub mod build;
mod export;
mod image;
mod layers;

pub use build::{BuildEngine, BuildPipeline, BuildReport, LayoutEngine, PreparedStage};
pub use build::{Dockerfile, MetaArg, Stage, StagePlan};
pub use export::{export_image, ExportLayout, ExportReport, ExportedLayer};
pub use image::{BlobLayer, Image, Layer, OciLayoutImage};
pub use layers::{list_layer_entries, EntryKind, LayerEntry};
