use crate::models::LOGIN_REQUIRED;
use camino::Utf8Path;
use walkdir::WalkDir;

/// Files the downloader (or the OS) leaves behind even when nothing was
/// fetched. Compared case-insensitively; directories with these names are
/// skipped entirely.
pub const HOUSEKEEPING_NAMES: [&str; 4] = [
    ".depotdownloader",
    "depotdownloader.config",
    ".ds_store",
    "thumbs.db",
];

/// Output fragments that mean the anonymous session was refused the content.
pub const AUTH_ERROR_MARKERS: [&str; 4] = [
    "access denied",
    "manifest not available",
    "no subscription",
    "purchase",
];

/// Failure detail recorded next to [`LOGIN_REQUIRED`].
pub const EMPTY_DOWNLOAD_ERROR: &str = "Download resulted in empty folder (Anonymous restriction)";

pub const COMPLETE_MESSAGE: &str = "Download Complete!";

/// What was found in the target directory after the process exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentScan {
    pub file_count: u64,
    pub total_bytes: u64,
}

impl ContentScan {
    pub fn has_valid_files(&self) -> bool {
        self.file_count > 0 && self.total_bytes > 0
    }
}

fn is_housekeeping(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    HOUSEKEEPING_NAMES.contains(&name.as_str())
}

/// Count real content files under `dir`.
///
/// A missing directory scans as empty. Unreadable entries are skipped.
pub fn scan_content_dir(dir: &Utf8Path) -> ContentScan {
    let mut scan = ContentScan::default();
    if !dir.is_dir() {
        return scan;
    }

    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_housekeeping(&entry.file_name().to_string_lossy()));

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        scan.file_count += 1;
        scan.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
    }

    tracing::debug!(
        "Scanned {}: {} files, {} bytes",
        dir,
        scan.file_count,
        scan.total_bytes
    );
    scan
}

/// Whether any retained (lowercased) output line carries an auth-error marker.
pub fn has_auth_error<S: AsRef<str>>(log: &[S]) -> bool {
    log.iter().any(|line| {
        let line = line.as_ref().to_lowercase();
        AUTH_ERROR_MARKERS.iter().any(|marker| line.contains(marker))
    })
}

/// Final classification of a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Done,

    /// Exited cleanly with nothing usable, or the log shows an auth refusal
    LoginRequired,

    /// Any other failure, with the message to show
    Failed(String),
}

impl Verdict {
    /// Message stored on the job record for this verdict.
    pub fn message(&self) -> &str {
        match self {
            Verdict::Done => COMPLETE_MESSAGE,
            Verdict::LoginRequired => LOGIN_REQUIRED,
            Verdict::Failed(message) => message,
        }
    }
}

/// Combine exit code, directory scan and log scan into a verdict.
///
/// An auth error in the log overrides a clean exit with files present.
/// `last_info_line` is the last non-progress line the process printed.
pub fn evaluate(
    exit_code: i32,
    scan: ContentScan,
    auth_error: bool,
    last_info_line: Option<&str>,
) -> Verdict {
    let has_valid_files = scan.has_valid_files();

    if exit_code == 0 && has_valid_files && !auth_error {
        Verdict::Done
    } else if auth_error || (exit_code == 0 && !has_valid_files) {
        Verdict::LoginRequired
    } else {
        Verdict::Failed(format!(
            "Error: {}",
            last_info_line.unwrap_or("Unknown Error")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use tempfile::TempDir;

    fn temp_dir() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    fn populated() -> ContentScan {
        ContentScan {
            file_count: 1,
            total_bytes: 10,
        }
    }

    #[test]
    fn test_scan_ignores_housekeeping() {
        let (_dir, root) = temp_dir();
        fs::create_dir_all(root.join(".DepotDownloader").join("staging")).unwrap();
        fs::write(root.join(".DepotDownloader").join("staging").join("chunk"), "xx").unwrap();
        fs::write(root.join("Thumbs.db"), "xx").unwrap();
        fs::write(root.join("DepotDownloader.config"), "xx").unwrap();

        let scan = scan_content_dir(&root);

        assert_eq!(scan, ContentScan::default());
        assert!(!scan.has_valid_files());
    }

    #[test]
    fn test_scan_counts_nested_content() {
        let (_dir, root) = temp_dir();
        fs::create_dir_all(root.join("maps")).unwrap();
        fs::write(root.join("maps").join("arena.bsp"), "12345").unwrap();
        fs::write(root.join("mod.json"), "{}").unwrap();
        fs::write(root.join(".DS_Store"), "junk").unwrap();

        let scan = scan_content_dir(&root);

        assert_eq!(scan.file_count, 2);
        assert_eq!(scan.total_bytes, 7);
    }

    #[test]
    fn test_zero_byte_files_are_not_valid() {
        let (_dir, root) = temp_dir();
        fs::write(root.join("empty.bin"), "").unwrap();

        let scan = scan_content_dir(&root);

        assert_eq!(scan.file_count, 1);
        assert!(!scan.has_valid_files());
    }

    #[test]
    fn test_scan_missing_dir() {
        let (_dir, root) = temp_dir();
        assert_eq!(scan_content_dir(&root.join("gone")), ContentScan::default());
    }

    #[test]
    fn test_auth_markers() {
        assert!(has_auth_error(&["Error: ACCESS DENIED for depot"]));
        assert!(has_auth_error(&["manifest not available", "ok"]));
        assert!(has_auth_error(&["Please purchase the game"]));
        assert!(!has_auth_error(&["Downloading depot 1245621", "Total downloaded: 5 bytes"]));
        assert!(!has_auth_error::<&str>(&[]));
    }

    #[test]
    fn test_verdict_done() {
        assert_eq!(evaluate(0, populated(), false, None), Verdict::Done);
        assert_eq!(Verdict::Done.message(), COMPLETE_MESSAGE);
    }

    #[test]
    fn test_verdict_empty_dir_requires_login() {
        assert_eq!(
            evaluate(0, ContentScan::default(), false, Some("Done")),
            Verdict::LoginRequired
        );
    }

    #[test]
    fn test_auth_error_overrides_success() {
        assert_eq!(evaluate(0, populated(), true, None), Verdict::LoginRequired);
        assert_eq!(evaluate(1, populated(), true, None), Verdict::LoginRequired);
    }

    #[test]
    fn test_verdict_failure_echoes_last_line() {
        assert_eq!(
            evaluate(1, ContentScan::default(), false, Some("Connection timed out")),
            Verdict::Failed("Error: Connection timed out".to_string())
        );
        assert_eq!(
            evaluate(2, populated(), false, None).message(),
            "Error: Unknown Error"
        );
    }
}
