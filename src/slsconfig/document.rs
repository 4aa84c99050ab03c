use super::ConfigError;
use camino::Utf8Path;
use std::fs;
use std::io::ErrorKind;

/// Raw lines of an SLSsteam `config.yaml`.
///
/// Nothing is interpreted at load time: comments, unknown keys and odd
/// spacing round-trip verbatim. Only the lines an edit touches change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineDocument {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl LineDocument {
    /// Parse text into lines. Line terminators are dropped; a `\r` before `\n`
    /// stays part of the line so CRLF files are written back unchanged.
    pub fn parse(text: &str) -> Self {
        if text.is_empty() {
            return Self::default();
        }

        let trailing_newline = text.ends_with('\n');
        let body = if trailing_newline {
            &text[..text.len() - 1]
        } else {
            text
        };

        Self {
            lines: body.split('\n').map(str::to_string).collect(),
            trailing_newline,
        }
    }

    /// Load a document from disk. A missing file is an empty document.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} does not exist, starting from an empty document", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn insert(&mut self, index: usize, line: String) {
        self.lines.insert(index, line);
    }

    pub fn replace(&mut self, index: usize, line: String) {
        self.lines[index] = line;
    }

    pub fn remove(&mut self, index: usize) -> String {
        self.lines.remove(index)
    }

    /// Remove the lines in `range`, returning how many were dropped.
    pub fn remove_range(&mut self, range: std::ops::Range<usize>) -> usize {
        let count = range.len();
        self.lines.drain(range);
        count
    }

    /// Append a line at the end of the document. Anything appended makes the
    /// document end with a newline.
    pub fn push(&mut self, line: String) {
        self.lines.push(line);
        self.trailing_newline = true;
    }

    /// Render the document back to file contents.
    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline && !self.lines.is_empty() {
            out.push('\n');
        }
        out
    }
}

/// Number of leading whitespace columns of a line (spaces and tabs count one).
pub fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start_matches([' ', '\t']).len()
}

/// Whether a line has no content besides whitespace.
pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}
