use orchestrator::{CapabilityEndpoints, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

pub const CONFIG_DIR: &str = ".pathfinder";
pub const CONFIG_FILE: &str = ".pathfinder/config.json";

/// Service configuration stored in .pathfinder/config.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Where the external capabilities live
    #[serde(default)]
    pub endpoints: CapabilityEndpoints,
    /// Pipeline overrides; missing keys keep their defaults
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl ServiceConfig {
    /// Read config from a service directory
    pub async fn read(base_path: &Path) -> Self {
        Self::read_file(&base_path.join(CONFIG_FILE)).await
    }

    /// Read config from an explicit file path
    pub async fn read_file(config_path: &Path) -> Self {
        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(config_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Write config to a service directory
    pub async fn write(&self, base_path: &Path) -> std::io::Result<()> {
        let config_dir = base_path.join(CONFIG_DIR);
        let config_path = base_path.join(CONFIG_FILE);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).await?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&config_path, content).await?;
        debug!(path = %config_path.display(), "Config saved successfully");

        Ok(())
    }
}
