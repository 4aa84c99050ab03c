use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Default download parallelism hint passed to the Workshop downloader
pub const DEFAULT_MAX_DOWNLOADS: u32 = 8;

/// User configuration from settings.yaml
///
/// Contains the tool's own settings: where the downloader lives and which
/// SLSsteam config and token dataset to use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "SLSTools_Settings", default)]
    pub settings: ToolSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Custom downloader location: a directory containing the binary, or the
    /// binary itself. Empty means "use the bundled one".
    #[serde(rename = "Workshop Tool Path", default)]
    pub workshop_tool_path: String,

    /// Override for the SLSsteam config.yaml location
    #[serde(rename = "SLSsteam Config", default)]
    pub sls_config_path: Option<Utf8PathBuf>,

    /// Override for the appaccesstokens.json location
    #[serde(rename = "Token Database", default)]
    pub token_database_path: Option<Utf8PathBuf>,

    #[serde(rename = "Max Downloads", default = "default_max_downloads")]
    pub max_downloads: u32,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            workshop_tool_path: String::new(),
            sls_config_path: None,
            token_database_path: None,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            debug_mode: false,
        }
    }
}

fn default_max_downloads() -> u32 {
    DEFAULT_MAX_DOWNLOADS
}

impl ToolSettings {
    /// The configured custom downloader path, if any
    pub fn custom_tool_path(&self) -> Option<Utf8PathBuf> {
        let trimmed = self.workshop_tool_path.trim();
        (!trimmed.is_empty()).then(|| Utf8PathBuf::from(trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_settings_defaults() {
        let settings = ToolSettings::default();
        assert_eq!(settings.max_downloads, 8);
        assert!(settings.workshop_tool_path.is_empty());
        assert!(settings.sls_config_path.is_none());
        assert!(!settings.debug_mode);
    }

    #[test]
    fn test_custom_tool_path_trims_blank() {
        let mut settings = ToolSettings::default();
        assert_eq!(settings.custom_tool_path(), None);

        settings.workshop_tool_path = "   ".to_string();
        assert_eq!(settings.custom_tool_path(), None);

        settings.workshop_tool_path = " /opt/DepotDownloaderMod \n".to_string();
        assert_eq!(
            settings.custom_tool_path(),
            Some(Utf8PathBuf::from("/opt/DepotDownloaderMod"))
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "SLSTools_Settings:\n  Workshop Tool Path: /tools\n";
        let config: UserConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.settings.workshop_tool_path, "/tools");
        assert_eq!(config.settings.max_downloads, DEFAULT_MAX_DOWNLOADS);
    }
}
