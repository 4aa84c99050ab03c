use regex::Regex;

/// How a single line of downloader output is treated.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// A `NN.NN%` progress line, with the parsed percentage
    Progress(f32),

    /// Any other non-empty line
    Info(String),
}

/// Classifies downloader output lines.
///
/// The pattern is one to three integer digits, exactly two fraction digits and
/// a `%`, e.g. `Downloading... 42.50%`. The number must not follow another
/// digit, so `1100.00%` is not read as `100.00%`; letters and `_` may precede
/// it. Values are clamped to `[0, 100]`.
pub struct ProgressParser {
    progress_pattern: Regex,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            progress_pattern: Regex::new(r"(?:^|[^0-9])(\d{1,3}\.\d{2})%").expect("Invalid progress regex"),
        }
    }

    /// Extract the percentage from a line, if it has one.
    pub fn parse_progress(&self, line: &str) -> Option<f32> {
        let captures = self.progress_pattern.captures(line)?;
        let value: f32 = captures.get(1)?.as_str().parse().ok()?;
        Some(value.clamp(0.0, 100.0))
    }

    /// Classify a line; blank lines yield `None`.
    pub fn classify(&self, line: &str) -> Option<LineKind> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        Some(match self.parse_progress(line) {
            Some(progress) => LineKind::Progress(progress),
            None => LineKind::Info(line.to_string()),
        })
    }
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Status message shown while a download is progressing.
pub fn progress_message(progress: f32) -> String {
    format!("Downloading: {:.2}%", progress)
}
