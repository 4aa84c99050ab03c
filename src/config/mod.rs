use crate::models::{ToolSettings, UserConfig};
use crate::slsconfig::{self, TokenStore};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the tool's settings inside the data directory.
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Plain-text file older releases stored the custom downloader path in.
pub const LEGACY_TOOL_PATH_FILE: &str = "workshop_path.txt";

/// Configuration manager for the tool's own settings.
///
/// Manages `settings.yaml` in the data directory. When it does not exist yet,
/// the custom downloader path is taken from the legacy `workshop_path.txt`.
///
/// The SLSsteam `config.yaml` is not handled here; it is edited line by line
/// through [`ConfigMutator`](crate::slsconfig::ConfigMutator).
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    legacy_tool_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `config_dir`, creating it if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            legacy_tool_path: config_dir.join(LEGACY_TOOL_PATH_FILE),
            config_dir,
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Load the user configuration.
    ///
    /// # Returns
    /// The loaded UserConfig, or defaults (seeded from the legacy tool path
    /// file if present) when `settings.yaml` doesn't exist
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.settings_path.exists() {
            let mut config = UserConfig::default();

            if self.legacy_tool_path.exists() {
                let legacy = fs::read_to_string(&self.legacy_tool_path).with_context(|| {
                    format!("Failed to read legacy tool path: {}", self.legacy_tool_path)
                })?;
                tracing::info!("Using legacy tool path file: {}", self.legacy_tool_path);
                config.settings.workshop_tool_path = legacy.trim().to_string();
            } else {
                tracing::warn!(
                    "Settings file not found at {}, using defaults",
                    self.settings_path
                );
            }
            return Ok(config);
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        // An empty file parses as YAML null; treat it like a missing one.
        if file_contents.trim().is_empty() {
            return Ok(UserConfig::default());
        }

        let config: UserConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(config)
    }

    /// Save the user configuration.
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize settings to YAML")?;

        slsconfig::write_atomic(&self.settings_path, &yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    pub fn load_settings(&self) -> Result<ToolSettings> {
        Ok(self.load_user_config()?.settings)
    }

    /// Persist the custom downloader path (trimmed; empty clears it).
    pub fn save_workshop_tool_path(&self, path: &str) -> Result<()> {
        let mut config = self.load_user_config()?;
        config.settings.workshop_tool_path = path.trim().to_string();
        self.save_user_config(&config)?;

        tracing::info!(
            "Workshop tool path set to {:?}",
            config.settings.workshop_tool_path
        );
        Ok(())
    }

    /// The saved custom downloader path, empty if none.
    pub fn load_workshop_tool_path(&self) -> Result<String> {
        Ok(self.load_settings()?.workshop_tool_path)
    }

    /// SLSsteam config location: the settings override, else the platform
    /// default.
    pub fn sls_config_path(&self, settings: &ToolSettings) -> Result<Utf8PathBuf> {
        if let Some(path) = &settings.sls_config_path {
            return Ok(path.clone());
        }
        slsconfig::default_config_path()
            .context("Could not determine the SLSsteam config location; set it explicitly")
    }

    /// Token dataset location: the settings override, else the copy shipped
    /// with the plugin.
    pub fn token_database_path(
        &self,
        settings: &ToolSettings,
        plugin_dir: &Utf8Path,
    ) -> Option<Utf8PathBuf> {
        settings
            .token_database_path
            .clone()
            .or_else(|| TokenStore::locate(plugin_dir))
    }
}
