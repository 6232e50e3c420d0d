//! Directory materialization.
//!
//! Mirrors a directory tree into a durable location, keeping permission
//! bits. The copy is best-effort per entry: a failing file or subdirectory is
//! recorded in the [`CopyReport`] and the walk moves on to its siblings.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use layerforge_core::error::{ForgeError, Result};

/// A single entry that could not be copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFailure {
    /// Source path of the entry
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of a tree copy.
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    /// Regular files copied
    pub files: usize,
    /// Directories created or updated (including the root)
    pub directories: usize,
    /// Entries that are neither files nor directories
    pub skipped: Vec<PathBuf>,
    /// Entries that failed
    pub failures: Vec<CopyFailure>,
}

impl CopyReport {
    /// True when no entry failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn the first recorded failure into an error.
    pub fn into_strict(self) -> Result<Self> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(ForgeError::copy(
                &first.path,
                format!(
                    "{} ({} of {} entries failed)",
                    first.message,
                    self.failures.len(),
                    self.files + self.directories + self.failures.len()
                ),
            )),
        }
    }

    fn merge(&mut self, other: CopyReport) {
        self.files += other.files;
        self.directories += other.directories;
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
    }
}

/// Recursively copy `src` onto `dst`.
///
/// If `dst` does not exist it is created, along with any missing parents,
/// with the permission mode of `src`. An existing `dst` keeps its mode.
/// Regular files are copied byte-for-byte and given their source mode.
/// Symlinks, sockets and devices are skipped.
///
/// Only a failure on `src`/`dst` themselves is returned as an error; failures
/// below them are collected in the report.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<CopyReport> {
    copy_dir(src, dst).map_err(|e| ForgeError::copy(src, e))
}

fn copy_dir(src: &Path, dst: &Path) -> io::Result<CopyReport> {
    let metadata = fs::metadata(src)?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "source is not a directory",
        ));
    }

    let mode = metadata.permissions().mode();
    let created = create_missing_dirs(dst)?;

    let mut report = CopyReport {
        directories: 1,
        ..Default::default()
    };

    for entry in fs::read_dir(src)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                record_failure(&mut report, src, &e);
                continue;
            }
        };

        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                record_failure(&mut report, &src_path, &e);
                continue;
            }
        };

        if file_type.is_dir() {
            match copy_dir(&src_path, &dst_path) {
                Ok(sub) => report.merge(sub),
                Err(e) => record_failure(&mut report, &src_path, &e),
            }
        } else if file_type.is_file() {
            match copy_file(&src_path, &dst_path) {
                Ok(()) => report.files += 1,
                Err(e) => record_failure(&mut report, &src_path, &e),
            }
        } else {
            tracing::debug!(path = %src_path.display(), "Skipping non-regular entry");
            report.skipped.push(src_path);
        }
    }

    // Applied last so a read-only source mode does not block the children.
    for dir in created.iter().rev() {
        if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(mode)) {
            record_failure(&mut report, dir, &e);
        }
    }

    Ok(report)
}

/// Create `dir` and its missing parents, returning the directories created
/// from the outermost down.
fn create_missing_dirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut missing: Vec<PathBuf> = dir
        .ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();

    fs::create_dir_all(dir)?;
    Ok(missing)
}

/// Copy a single file and apply the source permission mode.
fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dst)?;
    io::copy(&mut reader, &mut writer)?;

    let mode = reader.metadata()?.permissions().mode();
    writer.set_permissions(fs::Permissions::from_mode(mode))
}

fn record_failure(report: &mut CopyReport, path: &Path, error: &io::Error) {
    tracing::warn!(path = %path.display(), error = %error, "Failed to copy entry");
    report.failures.push(CopyFailure {
        path: path.to_path_buf(),
        message: error.to_string(),
    });
}
