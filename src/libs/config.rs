use home_config::HomeConfig;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::libs::constants::{APP_NAME, CONFIG_FILE_NAME, DEFAULT_MARKER_FILE, PASSWORD_ENV_VAR};
use crate::libs::error::{AnyResult, CloudFsError};

/**
 * Settings shared by every operation of a `CloudFs` client
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudFsConfig {
    /// Minimum delay between two remote calls, in milliseconds. 0 disables throttling.
    pub throttle_ms: u64,
    pub cache_ttl_secs: u64,
    /// How often expired cache entries are swept
    pub cache_check_period_secs: u64,
    pub page_size: usize,
    /// Name of the file recording already downloaded ids in a local folder
    pub marker_file: String,
    /// Password used by the encryption stage
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for CloudFsConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 500,
            cache_ttl_secs: 60 * 60 * 24,
            cache_check_period_secs: 60 * 60,
            page_size: 20,
            marker_file: DEFAULT_MARKER_FILE.to_string(),
            password: None,
        }
    }
}

impl CloudFsConfig {
    pub fn from_toml_str(content: &str) -> AnyResult<Self> {
        let config: CloudFsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config.with_env_overrides())
    }

    pub fn load(path: &Path) -> AnyResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| CloudFsError::local_io(path, e))?;
        info!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /**
     * Load `~/.config/cloudfs/config.toml`, falling back to the defaults when
     * the file does not exist yet
     */
    pub fn load_default() -> AnyResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            warn!("No config at {}, using defaults", path.display());
            Ok(Self::default().with_env_overrides())
        }
    }

    pub fn default_path() -> PathBuf {
        HomeConfig::with_config_dir(APP_NAME, CONFIG_FILE_NAME)
            .path()
            .to_path_buf()
    }

    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_check_period(&self) -> Duration {
        Duration::from_secs(self.cache_check_period_secs)
    }

    fn validate(&self) -> AnyResult<()> {
        if self.page_size == 0 {
            return Err(CloudFsError::Config("page_size must be at least 1".to_string()));
        }
        if self.marker_file.is_empty() || self.marker_file.contains('/') {
            return Err(CloudFsError::Config(format!(
                "marker_file must be a plain file name, got '{}'",
                self.marker_file
            )));
        }
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(password) = std::env::var(PASSWORD_ENV_VAR) {
            if !password.is_empty() {
                self.password = Some(password);
            }
        }
        self
    }
}
