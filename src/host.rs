// Host environment collaborator
//
// The plugin host supplies the plugin's own directory (where the bundled
// downloader and token dataset live), a writable data directory, and a way
// to show a folder to the user.

use camino::{Utf8Path, Utf8PathBuf};

#[cfg_attr(test, mockall::automock)]
pub trait HostEnvironment: Send + Sync {
    /// Directory the plugin is installed in
    fn plugin_dir(&self) -> Utf8PathBuf;

    /// Directory for settings and logs
    fn data_dir(&self) -> Utf8PathBuf;

    /// Open `dir` in the desktop file manager.
    fn reveal_directory(&self, dir: &Utf8Path) -> anyhow::Result<()>;
}

/// Host backed by real directories and the desktop opener.
#[derive(Debug, Clone)]
pub struct DesktopHost {
    plugin_dir: Utf8PathBuf,
    data_dir: Utf8PathBuf,
}

impl DesktopHost {
    pub fn new(plugin_dir: impl Into<Utf8PathBuf>, data_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            data_dir: data_dir.into(),
        }
    }
}

impl HostEnvironment for DesktopHost {
    fn plugin_dir(&self) -> Utf8PathBuf {
        self.plugin_dir.clone()
    }

    fn data_dir(&self) -> Utf8PathBuf {
        self.data_dir.clone()
    }

    fn reveal_directory(&self, dir: &Utf8Path) -> anyhow::Result<()> {
        opener::open(dir.as_std_path())?;
        tracing::info!("Opened {}", dir);
        Ok(())
    }
}
