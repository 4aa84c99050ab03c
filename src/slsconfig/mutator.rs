use super::section::{CHILD_INDENT, ENTRY_INDENT, key_matches};
use super::{
    APP_TOKENS_SECTION, ConfigError, DLC_DATA_SECTION, FAKE_APP_ID_VALUE, FAKE_APP_IDS_SECTION,
    LineDocument, MutationOutcome, NOTIFY_INIT, PLAY_NOT_OWNED_GAMES, SAFE_MODE, SectionEditor,
    TokenSource, VERSION_KEY, parse_bool, write_atomic, yes_no,
};
use crate::metrics::Metrics;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Default location of the SLSsteam config: `<user config dir>/SLSsteam/config.yaml`.
pub fn default_config_path() -> Option<Utf8PathBuf> {
    let base = dirs::config_dir()?;
    let base = Utf8PathBuf::try_from(base).ok()?;
    Some(base.join("SLSsteam").join("config.yaml"))
}

/// One DLC of a nested `DlcData` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlcEntry {
    pub id: u32,
    pub name: String,
}

impl DlcEntry {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Idempotent edits against an SLSsteam config file.
///
/// Every mutating call is a single read-modify-write cycle:
/// 1. Load the file (missing file = empty document)
/// 2. Apply the edit through a [`SectionEditor`]
/// 3. If anything changed, write the result with [`write_atomic`]
///
/// Calls on the same path from this process are serialized by a per-path
/// mutex so two edits can never lose each other's changes. Read-only queries
/// take no lock; the atomic rename already guarantees they see a whole file.
#[derive(Debug, Default)]
pub struct ConfigMutator {
    locks: Mutex<HashMap<Utf8PathBuf, Arc<Mutex<()>>>>,
    metrics: Option<Arc<Metrics>>,
}

impl ConfigMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mutator that records writes and no-ops into `metrics`.
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            metrics: Some(metrics),
        }
    }

    // ---------------------------------------------------------------------
    // Override flags
    // ---------------------------------------------------------------------

    /// Set a top-level `key: yes|no`, in place or appended at the end.
    pub fn set_override_flag(
        &self,
        path: &Utf8Path,
        key: &str,
        value: bool,
    ) -> Result<MutationOutcome, ConfigError> {
        self.set_override_flags(path, &[(key, value)])
    }

    /// Set several top-level flags in one atomic write.
    pub fn set_override_flags(
        &self,
        path: &Utf8Path,
        flags: &[(&str, bool)],
    ) -> Result<MutationOutcome, ConfigError> {
        self.edit(path, |editor| {
            let mut changed = false;
            for (key, value) in flags {
                changed |= editor.set_top_level(key, yes_no(*value));
            }

            let summary = flags
                .iter()
                .map(|(key, value)| format!("{}: {}", key, yes_no(*value)))
                .collect::<Vec<_>>()
                .join(", ");

            Ok(if changed {
                MutationOutcome::Applied(format!("Updated {}", summary))
            } else {
                MutationOutcome::AlreadyPresent(format!("Already set: {}", summary))
            })
        })
    }

    /// Toggle `PlayNotOwnedGames`.
    ///
    /// Enabling it also writes `NotifyInit: no` in the same edit; the start-up
    /// notification must not fire for unowned games.
    pub fn set_play_not_owned_games(
        &self,
        path: &Utf8Path,
        enabled: bool,
    ) -> Result<MutationOutcome, ConfigError> {
        if enabled {
            self.set_override_flags(path, &[(PLAY_NOT_OWNED_GAMES, true), (NOTIFY_INIT, false)])
        } else {
            self.set_override_flags(path, &[(PLAY_NOT_OWNED_GAMES, false)])
        }
    }

    pub fn set_safe_mode(
        &self,
        path: &Utf8Path,
        enabled: bool,
    ) -> Result<MutationOutcome, ConfigError> {
        self.set_override_flag(path, SAFE_MODE, enabled)
    }

    // ---------------------------------------------------------------------
    // Identifier mappings
    // ---------------------------------------------------------------------

    /// Insert `  <id>: <value>` as the first entry of `section`.
    ///
    /// Nothing is written when any line already contains both the id and the
    /// value.
    pub fn add_identifier_mapping(
        &self,
        path: &Utf8Path,
        section: &str,
        id: u32,
        value: &str,
    ) -> Result<MutationOutcome, ConfigError> {
        let id_str = id.to_string();
        self.edit(path, |editor| {
            if editor.any_line_contains_all(&[id_str.as_str(), value]) {
                return Ok(MutationOutcome::AlreadyPresent(format!(
                    "{} {} is already configured",
                    section, id
                )));
            }

            editor.insert_entries(section, vec![entry_line(&id_str, value)]);
            tracing::info!("Added {} -> {} to {}", id, value, section);
            Ok(MutationOutcome::Applied(format!(
                "Added {} ({}) to {}",
                id, value, section
            )))
        })
    }

    /// Remove the first entry of `section` keyed by `id` whose line also
    /// contains `value`.
    pub fn remove_identifier_mapping(
        &self,
        path: &Utf8Path,
        section: &str,
        id: u32,
        value: &str,
    ) -> Result<MutationOutcome, ConfigError> {
        let id_str = id.to_string();
        self.edit(path, |editor| {
            let removed = editor.remove_first_in_section_where(section, |line| {
                key_matches(line.trim(), &id_str) && line.contains(value)
            });

            Ok(match removed {
                Some(line) => {
                    tracing::info!("Removed {} entry: {}", section, line.trim());
                    MutationOutcome::Applied(format!("Removed {} from {}", id, section))
                }
                None => MutationOutcome::NotPresent,
            })
        })
    }

    pub fn add_fake_app_id(
        &self,
        path: &Utf8Path,
        app_id: u32,
    ) -> Result<MutationOutcome, ConfigError> {
        self.add_identifier_mapping(path, FAKE_APP_IDS_SECTION, app_id, FAKE_APP_ID_VALUE)
    }

    pub fn remove_fake_app_id(
        &self,
        path: &Utf8Path,
        app_id: u32,
    ) -> Result<MutationOutcome, ConfigError> {
        self.remove_identifier_mapping(path, FAKE_APP_IDS_SECTION, app_id, FAKE_APP_ID_VALUE)
    }

    // ---------------------------------------------------------------------
    // Tokens
    // ---------------------------------------------------------------------

    /// Look up the token for `app_id` and insert `  <id>: <token>` into
    /// `AppTokens`.
    pub fn add_token<S>(
        &self,
        path: &Utf8Path,
        app_id: u32,
        source: &S,
    ) -> Result<MutationOutcome, ConfigError>
    where
        S: TokenSource + ?Sized,
    {
        let token = source
            .token_for(app_id)
            .ok_or(ConfigError::TokenNotFound(app_id))?;
        let id_str = app_id.to_string();

        self.edit(path, |editor| {
            if editor.any_line_contains_all(&[id_str.as_str(), token.as_str()]) {
                return Ok(MutationOutcome::AlreadyPresent(
                    "Token is already in config.yaml".to_string(),
                ));
            }

            editor.insert_entries(APP_TOKENS_SECTION, vec![entry_line(&id_str, &token)]);
            tracing::info!("Added token for AppID {}", app_id);
            Ok(MutationOutcome::Applied(format!(
                "Token added for AppID {}",
                app_id
            )))
        })
    }

    /// Remove every `AppTokens` line keyed by `app_id`, whatever its token.
    ///
    /// Unlike [`add_token`](Self::add_token) this matches on the id alone, so
    /// stale or corrupted tokens can still be cleaned up.
    pub fn remove_token(
        &self,
        path: &Utf8Path,
        app_id: u32,
    ) -> Result<MutationOutcome, ConfigError> {
        let id_str = app_id.to_string();
        self.edit(path, |editor| {
            let removed = editor.remove_in_section_where(APP_TOKENS_SECTION, |line| {
                key_matches(line.trim(), &id_str)
            });

            Ok(if removed > 0 {
                tracing::info!("Removed {} token line(s) for AppID {}", removed, app_id);
                MutationOutcome::Applied(format!("Token removed for AppID {}", app_id))
            } else {
                MutationOutcome::NotPresent
            })
        })
    }

    // ---------------------------------------------------------------------
    // DLC blocks
    // ---------------------------------------------------------------------

    /// Insert a two-level `DlcData` block for `app_id`.
    pub fn add_dlc_block(
        &self,
        path: &Utf8Path,
        app_id: u32,
        dlcs: &[DlcEntry],
    ) -> Result<MutationOutcome, ConfigError> {
        let id_str = app_id.to_string();
        self.edit(path, |editor| {
            if editor.contains_key(DLC_DATA_SECTION, &id_str) {
                return Ok(MutationOutcome::AlreadyPresent(format!(
                    "DLC list for AppID {} is already configured",
                    app_id
                )));
            }

            let mut block = Vec::with_capacity(dlcs.len() + 1);
            block.push(format!("{}{}:", " ".repeat(ENTRY_INDENT), id_str));
            for dlc in dlcs {
                block.push(format!(
                    "{}{}: \"{}\"",
                    " ".repeat(CHILD_INDENT),
                    dlc.id,
                    escape_label(&dlc.name)
                ));
            }

            editor.insert_entries(DLC_DATA_SECTION, block);
            tracing::info!("Added {} DLC(s) for AppID {}", dlcs.len(), app_id);
            Ok(MutationOutcome::Applied(format!(
                "Added {} DLC(s) for AppID {}",
                dlcs.len(),
                app_id
            )))
        })
    }

    /// Remove the `DlcData` block for `app_id` and all of its children.
    pub fn remove_dlc_block(
        &self,
        path: &Utf8Path,
        app_id: u32,
    ) -> Result<MutationOutcome, ConfigError> {
        let id_str = app_id.to_string();
        self.edit(path, |editor| {
            let removed = editor.remove_block(DLC_DATA_SECTION, &id_str);
            Ok(if removed > 0 {
                tracing::info!("Removed DLC block for AppID {} ({} lines)", app_id, removed);
                MutationOutcome::Applied(format!("DLC list removed for AppID {}", app_id))
            } else {
                MutationOutcome::NotPresent
            })
        })
    }

    // ---------------------------------------------------------------------
    // Queries (never write)
    // ---------------------------------------------------------------------

    /// Whether `section` has a first-level entry keyed by `id`.
    pub fn check_exists(
        &self,
        path: &Utf8Path,
        section: &str,
        id: u32,
    ) -> Result<bool, ConfigError> {
        let mut doc = LineDocument::load(path)?;
        let editor = SectionEditor::new(&mut doc);
        Ok(editor.contains_key(section, &id.to_string()))
    }

    /// Whether `FakeAppIds` maps `app_id` to the fake app id value.
    pub fn has_fake_app_id(&self, path: &Utf8Path, app_id: u32) -> Result<bool, ConfigError> {
        let mut doc = LineDocument::load(path)?;
        let editor = SectionEditor::new(&mut doc);
        Ok(editor
            .find_entry(FAKE_APP_IDS_SECTION, &app_id.to_string())
            .is_some_and(|i| editor.document().lines()[i].contains(FAKE_APP_ID_VALUE)))
    }

    pub fn has_token(&self, path: &Utf8Path, app_id: u32) -> Result<bool, ConfigError> {
        self.check_exists(path, APP_TOKENS_SECTION, app_id)
    }

    pub fn has_dlc_block(&self, path: &Utf8Path, app_id: u32) -> Result<bool, ConfigError> {
        self.check_exists(path, DLC_DATA_SECTION, app_id)
    }

    /// Raw value of a top-level key (quotes and comments stripped).
    pub fn read_value(&self, path: &Utf8Path, key: &str) -> Result<Option<String>, ConfigError> {
        let mut doc = LineDocument::load(path)?;
        Ok(SectionEditor::new(&mut doc).top_level_value(key))
    }

    /// Boolean value of a top-level flag; `None` when absent or not a boolean.
    pub fn read_flag(&self, path: &Utf8Path, key: &str) -> Result<Option<bool>, ConfigError> {
        Ok(self.read_value(path, key)?.as_deref().and_then(parse_bool))
    }

    /// Version string written by the injection library, if any.
    pub fn sls_version(&self, path: &Utf8Path) -> Result<Option<String>, ConfigError> {
        Ok(self
            .read_value(path, VERSION_KEY)?
            .filter(|version| !version.is_empty()))
    }

    pub fn config_exists(&self, path: &Utf8Path) -> bool {
        path.is_file()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn edit<F>(&self, path: &Utf8Path, apply: F) -> Result<MutationOutcome, ConfigError>
    where
        F: FnOnce(&mut SectionEditor<'_>) -> Result<MutationOutcome, ConfigError>,
    {
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut doc = LineDocument::load(path)?;
        let outcome = {
            let mut editor = SectionEditor::new(&mut doc);
            apply(&mut editor)?
        };

        if outcome.wrote_file() {
            write_atomic(path, &doc.render())?;
            if let Some(metrics) = &self.metrics {
                metrics.record_config_write();
            }
        } else {
            tracing::debug!("No change needed for {}", path);
            if let Some(metrics) = &self.metrics {
                metrics.record_config_noop();
            }
        }

        Ok(outcome)
    }

    fn lock_for(&self, path: &Utf8Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn entry_line(key: &str, value: &str) -> String {
    format!("{}{}: {}", " ".repeat(ENTRY_INDENT), key, value)
}

fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
