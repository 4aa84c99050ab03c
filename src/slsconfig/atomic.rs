use super::ConfigError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Write `contents` to `path` through a temporary sibling and an atomic rename.
///
/// A reader opening `path` at any moment sees either the previous file or the
/// complete new one. If anything fails before the rename, the original file is
/// left exactly as it was.
pub fn write_atomic(path: &Utf8Path, contents: &str) -> Result<(), ConfigError> {
    StagedWrite::stage(path, contents)?.commit()
}

/// New file contents sitting next to their target, not yet renamed over it.
///
/// Dropping a `StagedWrite` without calling [`commit`](Self::commit) discards
/// the temporary file and leaves the target untouched.
#[derive(Debug)]
pub struct StagedWrite {
    temp: NamedTempFile,
    target: Utf8PathBuf,
}

impl StagedWrite {
    /// Write `contents` into a temporary file in the directory of `target`.
    ///
    /// The parent directory is created if needed. When `target` already exists
    /// its permissions are copied onto the temporary file so the rename does not
    /// change them.
    pub fn stage(target: &Utf8Path, contents: &str) -> Result<Self, ConfigError> {
        let parent = match target.parent() {
            Some(p) if !p.as_str().is_empty() => p.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };

        fs::create_dir_all(&parent).map_err(|e| write_failed(target, e))?;

        let file_name = target.file_name().unwrap_or("config");
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| write_failed(target, e))?;

        temp.write_all(contents.as_bytes())
            .map_err(|e| write_failed(target, e))?;
        temp.flush().map_err(|e| write_failed(target, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| write_failed(target, e))?;

        if let Ok(meta) = fs::metadata(target) {
            if let Err(e) = fs::set_permissions(temp.path(), meta.permissions()) {
                tracing::warn!("Could not carry permissions over to {}: {}", target, e);
            }
        }

        Ok(Self {
            temp,
            target: target.to_path_buf(),
        })
    }

    /// Path of the temporary file holding the staged contents.
    pub fn temp_path(&self) -> &std::path::Path {
        self.temp.path()
    }

    /// Rename the staged file over the target.
    pub fn commit(self) -> Result<(), ConfigError> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| write_failed(&target, e.error))?;
        tracing::debug!("Atomically replaced {}", target);
        Ok(())
    }
}

fn write_failed(path: &Utf8Path, source: std::io::Error) -> ConfigError {
    ConfigError::WriteFailed {
        path: path.to_path_buf(),
        source,
    }
}
