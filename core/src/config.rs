use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{ForgeError, Result};

/// Default build output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "/kaniko";

/// Default durable cache directory.
pub const DEFAULT_CACHE_DIR: &str = "/cache";

/// Default build context directory.
pub const DEFAULT_CONTEXT_DIR: &str = "/workspace";

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Build context directory
    pub context_dir: PathBuf,

    /// Dockerfile path (relative to the context unless absolute)
    pub dockerfile: PathBuf,

    /// Target stage name (None builds the last stage)
    pub target: Option<String>,

    /// Build arguments overriding ARG defaults
    pub build_args: HashMap<String, String>,

    /// Directory receiving config.json and the layer files
    pub output_dir: PathBuf,

    /// Directory receiving manifest.json and the mirrored output tree
    pub cache_dir: PathBuf,

    /// OCI image layout holding the built image
    pub image_layout: PathBuf,

    /// Directory of OCI layouts for external base images
    pub base_images_dir: Option<PathBuf>,

    /// Directory of OCI layouts for intermediate stages, one per stage index
    pub stage_images_dir: Option<PathBuf>,

    /// Verify each layer stream against its declared digest
    pub verify_digests: bool,

    /// Treat any failed entry during the cache copy as fatal
    pub strict_cache: bool,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        let output_dir = PathBuf::from(DEFAULT_OUTPUT_DIR);
        Self {
            context_dir: PathBuf::from(DEFAULT_CONTEXT_DIR),
            dockerfile: PathBuf::from("Dockerfile"),
            target: None,
            build_args: HashMap::new(),
            image_layout: output_dir.join("image"),
            output_dir,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            base_images_dir: None,
            stage_images_dir: None,
            verify_digests: false,
            strict_cache: false,
            log_level: LogLevel::Info,
        }
    }
}

impl ForgeConfig {
    /// Load a configuration file.
    ///
    /// `.yaml` and `.yml` files are read as YAML, anything else as JSON.
    /// Missing fields take their default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        let config = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    /// Resolved Dockerfile path.
    pub fn dockerfile_path(&self) -> PathBuf {
        if self.dockerfile.is_absolute() {
            self.dockerfile.clone()
        } else {
            self.context_dir.join(&self.dockerfile)
        }
    }

    /// Target stage name, with an unset target mapped to "".
    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or("")
    }

    /// Check that the configured directories can be used together.
    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ForgeError::ConfigError(
                "output_dir must not be empty".to_string(),
            ));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(ForgeError::ConfigError(
                "cache_dir must not be empty".to_string(),
            ));
        }
        // The cache mirrors the output tree, so it cannot live inside it.
        if resolve_path(&self.cache_dir)?.starts_with(resolve_path(&self.output_dir)?) {
            return Err(ForgeError::ConfigError(format!(
                "cache_dir {} must not be inside output_dir {}",
                self.cache_dir.display(),
                self.output_dir.display()
            )));
        }
        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` folded and existing
/// symlinks followed, so two spellings of one directory compare equal.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| {
                ForgeError::ConfigError(format!("cannot resolve {}: {}", path.display(), e))
            })?
            .join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    // Only the existing part of the path can be canonicalized.
    for existing in normalized.ancestors() {
        if let Ok(real) = existing.canonicalize() {
            let rest = normalized.strip_prefix(existing).unwrap_or(Path::new(""));
            return Ok(real.join(rest));
        }
    }
    Ok(normalized)
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!(
                "unknown log level: '{}' (supported: debug, info, warn, error)",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("/kaniko"));
        assert_eq!(config.cache_dir, PathBuf::from("/cache"));
        assert_eq!(
            config.dockerfile_path(),
            PathBuf::from("/workspace/Dockerfile")
        );
        assert_eq!(config.target_name(), "");
        assert!(!config.verify_digests);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_absolute_dockerfile_is_kept() {
        let config = ForgeConfig {
            dockerfile: PathBuf::from("/srv/build/Dockerfile.release"),
            ..Default::default()
        };
        assert_eq!(
            config.dockerfile_path(),
            PathBuf::from("/srv/build/Dockerfile.release")
        );
    }

    #[test]
    fn test_cache_inside_output_rejected() {
        let config = ForgeConfig {
            output_dir: PathBuf::from("/kaniko"),
            cache_dir: PathBuf::from("/kaniko/cache"),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ForgeError::ConfigError(_)));
        assert!(err.to_string().contains("/kaniko/cache"));
    }

    #[test]
    fn test_cache_inside_output_rejected_after_normalizing() {
        let config = ForgeConfig {
            output_dir: PathBuf::from("/srv/build/../kaniko"),
            cache_dir: PathBuf::from("/srv/kaniko/./cache"),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ForgeError::ConfigError(_))
        ));

        let relative = ForgeConfig {
            output_dir: PathBuf::from("out"),
            cache_dir: PathBuf::from("./out/cache"),
            ..Default::default()
        };
        assert!(relative.validate().is_err());
    }

    #[test]
    fn test_cache_inside_output_rejected_through_missing_dirs() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("out")).unwrap();
        let config = ForgeConfig {
            output_dir: tmp.path().join("out"),
            cache_dir: tmp.path().join("missing/../out/cache"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_cache_inside_output_rejected_through_symlink() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("out")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("out"), tmp.path().join("link")).unwrap();
        let config = ForgeConfig {
            output_dir: tmp.path().join("out"),
            cache_dir: tmp.path().join("link/cache"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sibling_cache_with_shared_prefix_allowed() {
        let config = ForgeConfig {
            output_dir: PathBuf::from("/srv/out"),
            cache_dir: PathBuf::from("/srv/out-cache"),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_file_with_partial_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("forge.yaml");
        std::fs::write(
            &path,
            "target: builder\noutput_dir: /out\nverify_digests: true\nlog_level: debug\nbuild_args:\n  VERSION: \"1.2\"\n",
        )
        .unwrap();

        let config = ForgeConfig::from_file(&path).unwrap();
        assert_eq!(config.target_name(), "builder");
        assert_eq!(config.output_dir, PathBuf::from("/out"));
        assert_eq!(config.cache_dir, PathBuf::from("/cache"));
        assert!(config.verify_digests);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.build_args.get("VERSION"), Some(&"1.2".to_string()));
    }

    #[test]
    fn test_from_json_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("forge.json");
        std::fs::write(&path, r#"{"cache_dir": "/var/cache/forge", "strict_cache": true}"#)
            .unwrap();

        let config = ForgeConfig::from_file(&path).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/forge"));
        assert!(config.strict_cache);
    }

    #[test]
    fn test_from_file_missing() {
        let err = ForgeConfig::from_file(Path::new("/nonexistent/forge.yaml")).unwrap_err();
        assert!(matches!(err, ForgeError::ConfigError(_)));
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }
}
