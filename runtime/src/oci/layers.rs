//! Layer inspection utilities.
//!
//! Reads exported layer files (gzip-compressed tar streams) and reports
//! their entries without extracting anything.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use layerforge_core::error::{ForgeError, Result};
use serde::Serialize;
use tar::{Archive, EntryType};

/// Kind of a tar entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Hardlink,
    Other,
}

impl From<EntryType> for EntryKind {
    fn from(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::Regular | EntryType::Continuous => EntryKind::File,
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            EntryType::Link => EntryKind::Hardlink,
            _ => EntryKind::Other,
        }
    }
}

/// A single entry of a layer archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerEntry {
    pub path: PathBuf,
    pub size: u64,
    pub mode: u32,
    pub kind: EntryKind,
}

/// List every entry of a layer file (*.tgz).
///
/// # Errors
///
/// Returns error if:
/// - Layer file doesn't exist
/// - The stream is not gzip-compressed tar
pub fn list_layer_entries(layer_path: &Path) -> Result<Vec<LayerEntry>> {
    let file = File::open(layer_path).map_err(|e| {
        ForgeError::BuildFailure(format!(
            "Failed to open layer file {}: {}",
            layer_path.display(),
            e
        ))
    })?;

    let mut archive = Archive::new(GzDecoder::new(file));
    let read_error = |e: std::io::Error| {
        ForgeError::BuildFailure(format!(
            "Failed to read layer {}: {}",
            layer_path.display(),
            e
        ))
    };

    let mut entries = Vec::new();
    for entry in archive.entries().map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let header = entry.header();
        let path = entry.path().map_err(read_error)?.into_owned();

        tracing::debug!(path = %path.display(), "Layer entry");

        entries.push(LayerEntry {
            size: header.size().map_err(read_error)?,
            mode: header.mode().map_err(read_error)?,
            kind: header.entry_type().into(),
            path,
        });
    }

    Ok(entries)
}
