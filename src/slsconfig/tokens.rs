use super::ConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;

/// File name of the bundled app access token dataset.
pub const TOKEN_DATABASE_FILE: &str = "appaccesstokens.json";

/// Anything that can produce an access token for an app id.
pub trait TokenSource {
    fn token_for(&self, app_id: u32) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn(u32) -> Option<String>,
{
    fn token_for(&self, app_id: u32) -> Option<String> {
        self(app_id)
    }
}

/// Token dataset loaded from `appaccesstokens.json`.
///
/// The file is a flat JSON object mapping app ids (as strings) to tokens:
///
/// ```json
/// { "1245620": "2f1b0c...", "1091500": "9a77e4..." }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: IndexMap<String, String>,
}

impl TokenStore {
    /// Load a dataset from an explicit path.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::TokenDatabase(format!("failed to read {}: {}", path, e))
        })?;

        let tokens: IndexMap<String, String> = serde_json::from_str(&contents).map_err(|e| {
            ConfigError::TokenDatabase(format!("failed to parse {}: {}", path, e))
        })?;

        tracing::debug!("Loaded {} app tokens from {}", tokens.len(), path);
        Ok(Self { tokens })
    }

    /// Find the dataset next to the plugin: `<plugin_dir>/backend/` first,
    /// then `<plugin_dir>/`.
    pub fn locate(plugin_dir: &Utf8Path) -> Option<Utf8PathBuf> {
        [
            plugin_dir.join("backend").join(TOKEN_DATABASE_FILE),
            plugin_dir.join(TOKEN_DATABASE_FILE),
        ]
        .into_iter()
        .find(|candidate| candidate.is_file())
    }

    /// Locate and load the dataset for a plugin directory.
    pub fn load_for_plugin(plugin_dir: &Utf8Path) -> Result<Self, ConfigError> {
        let path = Self::locate(plugin_dir).ok_or_else(|| {
            ConfigError::TokenDatabase(format!(
                "{} not found under {}",
                TOKEN_DATABASE_FILE, plugin_dir
            ))
        })?;
        Self::load(&path)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenSource for TokenStore {
    fn token_for(&self, app_id: u32) -> Option<String> {
        self.tokens
            .get(&app_id.to_string())
            .filter(|token| !token.trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn plugin_dir() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_lookup_by_app_id() {
        let (_dir, root) = plugin_dir();
        let path = root.join(TOKEN_DATABASE_FILE);
        fs::write(&path, r#"{"1245620": "abc123", "7": ""}"#).unwrap();

        let store = TokenStore::load(&path).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.token_for(1245620).as_deref(), Some("abc123"));
        assert_eq!(store.token_for(7), None);
        assert_eq!(store.token_for(1), None);
    }

    #[test]
    fn test_locate_prefers_backend_dir() {
        let (_dir, root) = plugin_dir();
        fs::create_dir_all(root.join("backend")).unwrap();
        fs::write(root.join("backend").join(TOKEN_DATABASE_FILE), "{}").unwrap();
        fs::write(root.join(TOKEN_DATABASE_FILE), "{}").unwrap();

        let found = TokenStore::locate(&root).unwrap();
        assert_eq!(found, root.join("backend").join(TOKEN_DATABASE_FILE));
    }

    #[test]
    fn test_missing_dataset_is_an_error() {
        let (_dir, root) = plugin_dir();
        let err = TokenStore::load_for_plugin(&root).unwrap_err();
        assert!(matches!(err, ConfigError::TokenDatabase(_)));
    }

    #[test]
    fn test_malformed_dataset_is_an_error() {
        let (_dir, root) = plugin_dir();
        let path = root.join(TOKEN_DATABASE_FILE);
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            TokenStore::load(&path),
            Err(ConfigError::TokenDatabase(_))
        ));
    }

    #[test]
    fn test_closure_token_source() {
        let source = |id: u32| (id == 5).then(|| "tok".to_string());
        assert_eq!(source.token_for(5).as_deref(), Some("tok"));
        assert_eq!(source.token_for(6), None);
    }
}
