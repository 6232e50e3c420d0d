//! Image and layer abstractions, and an image backed by an OCI image layout.
//!
//! The build engine hands over its result as an [`Image`]: a configuration,
//! raw manifest bytes and an ordered list of [`Layer`]s. [`OciLayoutImage`]
//! implements it over a directory in OCI image layout form.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use layerforge_core::error::{ForgeError, Result};
use oci_spec::image::{ImageConfiguration, ImageIndex, ImageManifest};

/// A built image, consumed once by the exporter.
pub trait Image: Send + Sync {
    /// Structured image configuration.
    fn config_file(&self) -> Result<ImageConfiguration>;

    /// Manifest bytes exactly as stored.
    fn raw_manifest(&self) -> Result<Vec<u8>>;

    /// Layers in order, bottom to top.
    fn layers(&self) -> Result<Vec<Box<dyn Layer>>>;
}

/// One filesystem layer of an image.
pub trait Layer: Send + Sync {
    /// Content digest in `<algorithm>:<hex>` form.
    fn digest(&self) -> Result<String>;

    /// The compressed layer stream.
    fn compressed(&self) -> Result<Box<dyn Read + Send + '_>>;
}

/// An image read from an OCI image layout on disk.
#[derive(Debug)]
pub struct OciLayoutImage {
    /// Root directory of the OCI image layout
    root_dir: PathBuf,

    /// Manifest bytes as stored in the blob
    raw_manifest: Vec<u8>,

    /// Parsed manifest
    manifest: ImageManifest,

    /// Image configuration
    config: ImageConfiguration,
}

impl OciLayoutImage {
    /// Load an image from an OCI image layout directory.
    ///
    /// The directory must contain an `oci-layout` marker, an `index.json`
    /// and a `blobs/` directory. The first manifest of the index is used.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let root_dir = path.as_ref().to_path_buf();

        Self::validate_oci_layout(&root_dir)?;

        let index = Self::load_index(&root_dir)?;
        let manifest_digest = index
            .manifests()
            .first()
            .ok_or_else(|| {
                ForgeError::BuildFailure(format!(
                    "No manifests in {}",
                    root_dir.join("index.json").display()
                ))
            })?
            .digest()
            .to_string();

        let raw_manifest = read_blob(&root_dir, &manifest_digest, "manifest")?;
        let manifest: ImageManifest = serde_json::from_slice(&raw_manifest)
            .map_err(|e| ForgeError::BuildFailure(format!("Failed to parse manifest: {}", e)))?;

        let config_digest = manifest.config().digest().to_string();
        let config_bytes = read_blob(&root_dir, &config_digest, "config")?;
        let config: ImageConfiguration = serde_json::from_slice(&config_bytes)
            .map_err(|e| ForgeError::BuildFailure(format!("Failed to parse config: {}", e)))?;

        tracing::debug!(
            layout = %root_dir.display(),
            manifest = %manifest_digest,
            layers = manifest.layers().len(),
            "Loaded OCI image layout"
        );

        Ok(Self {
            root_dir,
            raw_manifest,
            manifest,
            config,
        })
    }

    /// Get the root directory of the layout.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Get the parsed manifest.
    pub fn manifest(&self) -> &ImageManifest {
        &self.manifest
    }

    /// Validate that the directory contains a valid OCI layout.
    fn validate_oci_layout(root_dir: &Path) -> Result<()> {
        for required in ["oci-layout", "index.json", "blobs"] {
            if !root_dir.join(required).exists() {
                return Err(ForgeError::BuildFailure(format!(
                    "Not a valid OCI layout: missing {} in {}",
                    required,
                    root_dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Load the image index from index.json.
    fn load_index(root_dir: &Path) -> Result<ImageIndex> {
        let index_path = root_dir.join("index.json");
        let content = std::fs::read_to_string(&index_path).map_err(|e| {
            ForgeError::BuildFailure(format!(
                "Failed to read index.json at {}: {}",
                index_path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| ForgeError::BuildFailure(format!("Failed to parse index.json: {}", e)))
    }
}

impl Image for OciLayoutImage {
    fn config_file(&self) -> Result<ImageConfiguration> {
        Ok(self.config.clone())
    }

    fn raw_manifest(&self) -> Result<Vec<u8>> {
        Ok(self.raw_manifest.clone())
    }

    fn layers(&self) -> Result<Vec<Box<dyn Layer>>> {
        Ok(self
            .manifest
            .layers()
            .iter()
            .map(|descriptor| {
                let digest = descriptor.digest().to_string();
                Box::new(BlobLayer {
                    path: blob_path(&self.root_dir, &digest),
                    digest,
                }) as Box<dyn Layer>
            })
            .collect())
    }
}

/// A layer stored as a blob file of an OCI layout.
#[derive(Debug, Clone)]
pub struct BlobLayer {
    digest: String,
    path: PathBuf,
}

impl BlobLayer {
    /// Path to the blob file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Layer for BlobLayer {
    fn digest(&self) -> Result<String> {
        Ok(self.digest.clone())
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send + '_>> {
        let file = File::open(&self.path).map_err(|e| {
            ForgeError::BuildFailure(format!(
                "Failed to open layer blob {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Box::new(file))
    }
}

/// Get the path to a blob by digest.
pub(crate) fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    // Digest format: "sha256:abc123..."
    let (algorithm, hash) = digest.split_once(':').unwrap_or(("sha256", digest));
    root_dir.join("blobs").join(algorithm).join(hash)
}

fn read_blob(root_dir: &Path, digest: &str, what: &str) -> Result<Vec<u8>> {
    let path = blob_path(root_dir, digest);
    std::fs::read(&path).map_err(|e| {
        ForgeError::BuildFailure(format!(
            "Failed to read {} at {}: {}",
            what,
            path.display(),
            e
        ))
    })
}
