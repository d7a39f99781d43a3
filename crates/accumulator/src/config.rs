use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{GpuBackend, GpuPowerPreference};

/// Retained-buffer hint used when the caller does not supply one.
pub const DEFAULT_RETAINED_BUFFER_COUNT: usize = 6;

/// Largest retained-buffer hint the output pool accepts.
pub const MAX_RETAINED_BUFFER_COUNT: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Construction-time settings for a [`Renderer`](crate::Renderer).
///
/// The struct can be built in code or deserialized from TOML:
///
/// ```toml
/// power = "low"
/// backend = "vulkan"
/// shader_dir = "/usr/share/stackshot/shaders"
/// retained_buffer_count = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Adapter power preference.
    pub power: GpuPowerPreference,
    /// Graphics APIs wgpu may open.
    pub backend: GpuBackend,
    /// Directory holding `accumulate.vert` / `accumulate.frag` overrides.
    pub shader_dir: Option<PathBuf>,
    /// Backpressure ceiling used by callers that do not negotiate their own.
    pub retained_buffer_count: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            power: GpuPowerPreference::default(),
            backend: GpuBackend::default(),
            shader_dir: None,
            retained_buffer_count: DEFAULT_RETAINED_BUFFER_COUNT,
        }
    }
}

impl RendererConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: RendererConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retained_buffer_count == 0 {
            return Err(ConfigError::Invalid(
                "retained_buffer_count must be at least 1".to_string(),
            ));
        }
        if self.retained_buffer_count > MAX_RETAINED_BUFFER_COUNT {
            return Err(ConfigError::Invalid(format!(
                "retained_buffer_count must be at most {MAX_RETAINED_BUFFER_COUNT}, got {}",
                self.retained_buffer_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn parses_every_field() {
        let config = RendererConfig::from_toml_str(
            r#"
                power = "low"
                backend = "gl"
                shader_dir = "/opt/shaders"
                retained_buffer_count = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.power, GpuPowerPreference::Low);
        assert_eq!(config.backend, GpuBackend::Gl);
        assert_eq!(config.shader_dir.as_deref(), Some(Path::new("/opt/shaders")));
        assert_eq!(config.retained_buffer_count, 3);
    }

    #[test]
    fn rejects_zero_retained_buffers() {
        let err = RendererConfig::from_toml_str("retained_buffer_count = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_oversized_retention() {
        let err = RendererConfig::from_toml_str("retained_buffer_count = 65").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(message) if message.contains("at most 64")));

        let config = RendererConfig {
            retained_buffer_count: usize::MAX,
            ..RendererConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(RendererConfig::from_toml_str("retained_buffer_count = 64").is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = RendererConfig::from_toml_str("antialias = \"auto\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.toml");
        std::fs::write(&path, "power = \"high\"\nretained_buffer_count = 2\n").unwrap();
        let config = RendererConfig::load(&path).unwrap();
        assert_eq!(config.retained_buffer_count, 2);

        let missing = RendererConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
