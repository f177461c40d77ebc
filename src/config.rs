use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the capture workflow
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureWorkflowConfig {
    /// Capture session settings
    pub capture: CaptureSettings,
    /// Feedback message settings
    pub messages: MessageSettings,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Directory holding one timestamped folder per capture
    pub scans_root: PathBuf,
    /// Let the engine keep taking images after a pass is complete
    pub overcapture_enabled: bool,
    /// Images required before a pass can be judged
    pub minimum_images: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            scans_root: PathBuf::from("Scans"),
            overcapture_enabled: true,
            minimum_images: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageSettings {
    /// Minimum time a feedback message stays visible
    pub minimum_duration_ms: u64,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            minimum_duration_ms: 2000,
        }
    }
}

impl MessageSettings {
    pub fn minimum_duration(&self) -> Duration {
        Duration::from_millis(self.minimum_duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl CaptureWorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (capture-workflow.toml, .capture-workflow-rc)
    /// 3. Environment variables (CAPTURE_WORKFLOW__SECTION__KEY)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`load`](Self::load) with config files looked up in `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join("capture-workflow.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".capture-workflow-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("CAPTURE_WORKFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CaptureWorkflowConfig::default();
        assert_eq!(config.capture.minimum_images, 10);
        assert!(config.capture.overcapture_enabled);
        assert_eq!(config.messages.minimum_duration(), Duration::from_secs(2));
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("capture-workflow.toml"),
            "[capture]\nminimum_images = 25\n\n[messages]\nminimum_duration_ms = 500\n",
        )
        .unwrap();

        let config = CaptureWorkflowConfig::load_from(temp.path()).unwrap();
        assert_eq!(config.capture.minimum_images, 25);
        assert_eq!(config.messages.minimum_duration(), Duration::from_millis(500));
        assert!(config.capture.overcapture_enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let mut config = CaptureWorkflowConfig::default();
        config.capture.scans_root = temp.path().join("Scans");
        config.observability.json_logs = true;

        config
            .save_to_file(temp.path().join("capture-workflow.toml"))
            .unwrap();
        let loaded = CaptureWorkflowConfig::load_from(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
