//! Artifact export.
//!
//! Writes a built image to disk as digest-named layer files, a `config.json`
//! and the raw `manifest.json`. Any failure aborts the export: a partially
//! written artifact set is not a valid result.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use layerforge_core::error::{ForgeError, Result};
use sha2::{Digest, Sha256};

use super::image::{Image, Layer};

/// Where the exporter writes its files.
#[derive(Debug, Clone)]
pub struct ExportLayout {
    /// Receives `config.json` and `<digest>.tgz` layer files
    pub output_dir: PathBuf,
    /// Receives `manifest.json`
    pub cache_dir: PathBuf,
    /// Hash each layer stream and compare it with the declared digest
    pub verify_digests: bool,
}

impl ExportLayout {
    pub fn new(output_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            cache_dir: cache_dir.into(),
            verify_digests: false,
        }
    }

    /// Enable or disable layer digest verification.
    pub fn with_verify_digests(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    pub fn config_path(&self) -> PathBuf {
        self.output_dir.join("config.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join("manifest.json")
    }

    /// Path of the layer file for `digest`.
    pub fn layer_path(&self, digest: &str) -> PathBuf {
        self.output_dir.join(format!("{}.tgz", digest))
    }
}

/// A layer written by the exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedLayer {
    /// Digest with algorithm prefix (e.g. "sha256:abc...")
    pub digest: String,
    /// Path of the written file
    pub path: PathBuf,
    /// Bytes written
    pub size: u64,
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub config_path: PathBuf,
    pub manifest_path: PathBuf,
    pub layers: Vec<ExportedLayer>,
}

impl ExportReport {
    /// Number of layers written.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }
}

/// Export `image` into the directories of `layout`.
///
/// Existing files are overwritten. Layer files are named after their digest,
/// so exporting the same image twice produces the same files.
pub fn export_image(image: &dyn Image, layout: &ExportLayout) -> Result<ExportReport> {
    for dir in [&layout.output_dir, &layout.cache_dir] {
        std::fs::create_dir_all(dir).map_err(|e| ForgeError::export(dir, e))?;
    }

    // Image config
    let config_path = layout.config_path();
    let config = image.config_file()?;
    let mut config_json =
        serde_json::to_vec(&config).map_err(|e| ForgeError::export(&config_path, e))?;
    config_json.push(b'\n');
    std::fs::write(&config_path, &config_json).map_err(|e| ForgeError::export(&config_path, e))?;
    tracing::debug!(
        path = %config_path.display(),
        config = %String::from_utf8_lossy(&config_json).trim_end(),
        "Wrote image config"
    );

    // Raw manifest
    let manifest_path = layout.manifest_path();
    let manifest = image.raw_manifest()?;
    std::fs::write(&manifest_path, &manifest)
        .map_err(|e| ForgeError::export(&manifest_path, e))?;
    tracing::debug!(
        path = %manifest_path.display(),
        size = manifest.len(),
        "Wrote image manifest"
    );

    // Layers
    let layers = image.layers()?;
    tracing::info!(count = layers.len(), "Exporting image layers");

    let mut exported = Vec::with_capacity(layers.len());
    for layer in &layers {
        let digest = layer.digest()?;
        validate_digest(&digest, &layout.output_dir)?;

        let path = layout.layer_path(&digest);
        tracing::info!(digest = %digest, path = %path.display(), "Writing layer file");

        let size = save_layer(layer.as_ref(), &digest, &path, layout.verify_digests)?;
        exported.push(ExportedLayer { digest, path, size });
    }

    tracing::info!(
        layers = exported.len(),
        output = %layout.output_dir.display(),
        "Image export complete"
    );

    Ok(ExportReport {
        config_path,
        manifest_path,
        layers: exported,
    })
}

/// Copy one layer's compressed stream into `path`, returning the byte count.
fn save_layer(layer: &dyn Layer, digest: &str, path: &Path, verify: bool) -> Result<u64> {
    let reader = layer
        .compressed()
        .map_err(|e| ForgeError::export(path, e))?;
    let file = File::create(path).map_err(|e| ForgeError::export(path, e))?;

    // A layer file that was not fully written and checked is removed.
    stream_layer(reader, file, digest, verify).map_err(|message| {
        remove_partial(path);
        ForgeError::export(path, message)
    })
}

fn stream_layer(
    mut reader: impl io::Read,
    file: File,
    digest: &str,
    verify: bool,
) -> std::result::Result<u64, String> {
    let mut writer = DigestWriter::new(io::BufWriter::new(file));
    let size = io::copy(&mut reader, &mut writer).map_err(|e| e.to_string())?;
    let (mut inner, actual) = writer.finish();
    inner.flush().map_err(|e| e.to_string())?;
    drop(inner);

    if verify {
        let expected = digest
            .strip_prefix("sha256:")
            .ok_or_else(|| format!("cannot verify non-sha256 digest {}", digest))?;
        if expected != actual {
            return Err(format!(
                "digest mismatch: expected {}, got sha256:{}",
                digest, actual
            ));
        }
    }

    Ok(size)
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to remove partial layer file"
        );
    }
}

/// Reject digests that would not name a plain file inside `output_dir`.
fn validate_digest(digest: &str, output_dir: &Path) -> Result<()> {
    let well_formed = matches!(
        digest.split_once(':'),
        Some((alg, hex)) if !alg.is_empty()
            && !hex.is_empty()
            && alg.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '_' | '-'))
            && hex.chars().all(|c| c.is_ascii_alphanumeric())
    );

    if well_formed {
        Ok(())
    } else {
        Err(ForgeError::export(
            output_dir,
            format!("invalid layer digest '{}'", digest),
        ))
    }
}

/// Writer that hashes everything passing through it.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> DigestWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Return the inner writer and the hex SHA-256 of the bytes written.
    fn finish(self) -> (W, String) {
        (self.inner, hex::encode(self.hasher.finalize()))
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
