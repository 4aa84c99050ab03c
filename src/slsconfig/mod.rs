//! SLSsteam `config.yaml` editing.
//!
//! The injection library reads `config.yaml` every time Steam launches, so
//! edits here are surgical and atomic:
//!
//! - [`LineDocument`]: raw lines of the file, unknown content kept verbatim
//! - [`SectionEditor`]: finds `Tag:` sections and their indented extent
//! - [`ConfigMutator`]: idempotent domain operations (fake app ids, tokens,
//!   DLC blocks, override flags), each written through [`write_atomic`]
//!
//! There is no general YAML model on purpose. The file has to stay as close as
//! possible to what the library and its users wrote, so only the handful of
//! lines an operation targets ever change.
//!
//! # Layout
//!
//! ```text
//! PlayNotOwnedGames: yes
//! FakeAppIds:
//!   1245620: 480
//! AppTokens:
//!   1091500: 9a77e4...
//! DlcData:
//!   1091500:
//!     2138330: "Phantom Liberty"
//! ```

pub mod atomic;
pub mod document;
pub mod mutator;
pub mod section;
pub mod tokens;

pub use atomic::{StagedWrite, write_atomic};
pub use document::LineDocument;
pub use mutator::{ConfigMutator, DlcEntry, default_config_path};
pub use section::SectionEditor;
pub use tokens::{TokenSource, TokenStore};

use camino::Utf8PathBuf;
use thiserror::Error;

/// Section mapping app ids to the Spacewar app id.
pub const FAKE_APP_IDS_SECTION: &str = "FakeAppIds";

/// Value every fake app id mapping points at.
pub const FAKE_APP_ID_VALUE: &str = "480";

/// Section holding per-app access tokens.
pub const APP_TOKENS_SECTION: &str = "AppTokens";

/// Section holding per-app DLC lists.
pub const DLC_DATA_SECTION: &str = "DlcData";

/// Allow launching games the account does not own.
pub const PLAY_NOT_OWNED_GAMES: &str = "PlayNotOwnedGames";

/// Start-up notification; forced off whenever [`PLAY_NOT_OWNED_GAMES`] is enabled.
pub const NOTIFY_INIT: &str = "NotifyInit";

pub const SAFE_MODE: &str = "SafeMode";

/// Top-level key carrying the injection library's version.
pub const VERSION_KEY: &str = "Version";

/// Errors raised while reading or editing the config file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Unreadable {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    WriteFailed {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Token not found for AppID {0}")]
    TokenNotFound(u32),

    #[error("Token database unavailable: {0}")]
    TokenDatabase(String),
}

/// What a mutating operation did to the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The file was rewritten.
    Applied(String),

    /// The requested state was already on disk; nothing was written.
    AlreadyPresent(String),

    /// Nothing matched the removal; nothing was written.
    NotPresent,
}

impl MutationOutcome {
    /// Whether the operation changed the document and needs a write.
    pub fn wrote_file(&self) -> bool {
        matches!(self, MutationOutcome::Applied(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            MutationOutcome::Applied(msg) | MutationOutcome::AlreadyPresent(msg) => Some(msg),
            MutationOutcome::NotPresent => None,
        }
    }
}

/// `yes`/`no` literal used for booleans in the config file.
pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Parse a config boolean (`yes`/`no`/`true`/`false`, any case).
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool(" no "), Some(false));
        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("1"), None);
    }

    #[test]
    fn test_outcome_write_flag() {
        assert!(MutationOutcome::Applied("x".into()).wrote_file());
        assert!(!MutationOutcome::AlreadyPresent("x".into()).wrote_file());
        assert!(!MutationOutcome::NotPresent.wrote_file());
        assert_eq!(MutationOutcome::NotPresent.message(), None);
    }
}
