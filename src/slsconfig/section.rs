use super::document::{LineDocument, indent_of, is_blank};
use std::ops::Range;

/// Indentation used for first-level entries inside a section.
pub const ENTRY_INDENT: usize = 2;

/// Indentation used for children of a nested block.
pub const CHILD_INDENT: usize = 4;

/// Section-aware editing on top of a [`LineDocument`].
///
/// The grammar understood here is deliberately small:
///
/// ```text
/// Flag: yes            <- top-level key (indent 0)
/// Section:             <- section tag (indent 0, nothing after the colon)
///   <id>: <value>      <- entry (indent 1..=2)
///   <id>:              <- nested block header
///     <child>: "label" <- nested child (deeper indent)
/// ```
///
/// Anything else in the file is carried along untouched.
pub struct SectionEditor<'a> {
    doc: &'a mut LineDocument,
}

impl<'a> SectionEditor<'a> {
    pub fn new(doc: &'a mut LineDocument) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &LineDocument {
        self.doc
    }

    /// Index of the `<tag>:` line, if the section exists.
    pub fn find_section(&self, tag: &str) -> Option<usize> {
        self.doc
            .lines()
            .iter()
            .position(|line| is_section_tag(line, tag))
    }

    /// Line range of the section's body, excluding the tag line itself.
    ///
    /// The body runs over every following indented line. Blank lines inside
    /// the body are included, but blank lines after the last indented line are
    /// not: they belong to whatever comes next.
    pub fn section_body(&self, tag: &str) -> Option<Range<usize>> {
        let tag_index = self.find_section(tag)?;
        Some(self.block_extent(tag_index, 0))
    }

    /// Whether any first-level entry of the section is keyed by `key`.
    pub fn contains_key(&self, tag: &str, key: &str) -> bool {
        self.find_entry(tag, key).is_some()
    }

    /// Index of the first first-level entry keyed by `key` in the section.
    pub fn find_entry(&self, tag: &str, key: &str) -> Option<usize> {
        let mut body = self.section_body(tag)?;
        body.find(|&i| {
            let line = &self.doc.lines()[i];
            let indent = indent_of(line);
            indent > 0 && indent <= ENTRY_INDENT && key_matches(line.trim(), key)
        })
    }

    /// Raw containment check across the whole file: true when a single line
    /// contains every needle.
    pub fn any_line_contains_all(&self, needles: &[&str]) -> bool {
        self.doc
            .lines()
            .iter()
            .any(|line| needles.iter().all(|needle| line.contains(needle)))
    }

    /// Insert `entries` as the first lines of the section, creating the
    /// section at the end of the file if it does not exist.
    pub fn insert_entries(&mut self, tag: &str, entries: Vec<String>) {
        let ending = self.line_ending();
        let entries: Vec<String> = entries
            .into_iter()
            .map(|entry| format!("{}{}", entry, ending))
            .collect();
        match self.find_section(tag) {
            Some(tag_index) => {
                for (offset, entry) in entries.into_iter().enumerate() {
                    self.doc.insert(tag_index + 1 + offset, entry);
                }
            }
            None => {
                let needs_separator = self
                    .doc
                    .lines()
                    .last()
                    .is_some_and(|last| !is_blank(last));
                if needs_separator {
                    self.doc.push(ending.to_string());
                }
                self.doc.push(format!("{}:{}", tag, ending));
                for entry in entries {
                    self.doc.push(entry);
                }
            }
        }
    }

    /// Remove the first line of the section body matching `predicate`.
    pub fn remove_first_in_section_where<F>(&mut self, tag: &str, predicate: F) -> Option<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut body = self.section_body(tag)?;
        let index = body.find(|&i| predicate(self.doc.lines()[i].as_str()))?;
        Some(self.doc.remove(index))
    }

    /// Remove every line of the section body matching `predicate`.
    ///
    /// Returns the number of removed lines.
    pub fn remove_in_section_where<F>(&mut self, tag: &str, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let Some(body) = self.section_body(tag) else {
            return 0;
        };

        let mut removed = 0;
        for index in body.rev() {
            if predicate(self.doc.lines()[index].as_str()) {
                self.doc.remove(index);
                removed += 1;
            }
        }
        removed
    }

    /// Remove the entry keyed by `key` together with every deeper line under
    /// it. Deletion stops at the next non-blank line indented at most as far
    /// as the entry itself; blank lines directly before that line are kept.
    ///
    /// Returns the number of removed lines (0 when the entry is absent).
    pub fn remove_block(&mut self, tag: &str, key: &str) -> usize {
        let Some(header) = self.find_entry(tag, key) else {
            return 0;
        };
        let header_indent = indent_of(&self.doc.lines()[header]);
        let children = self.block_extent(header, header_indent);
        self.doc.remove_range(header..children.end)
    }

    /// Index of a top-level (indent 0) `key:` line.
    pub fn find_top_level(&self, key: &str) -> Option<usize> {
        self.doc
            .lines()
            .iter()
            .position(|line| indent_of(line) == 0 && key_matches(line.trim(), key))
    }

    /// Value of a top-level key with quotes and trailing comments stripped.
    pub fn top_level_value(&self, key: &str) -> Option<String> {
        let index = self.find_top_level(key)?;
        let line = &self.doc.lines()[index];
        let (_, raw) = line.split_once(':')?;
        let value = strip_comment(raw).trim();
        Some(unquote(value).to_string())
    }

    /// Set a top-level `key: value`, rewriting the line in place or appending
    /// it to the end of the file. A trailing comment and the line's `\r` are
    /// kept. Returns false when the line was already exactly as requested.
    pub fn set_top_level(&mut self, key: &str, value: &str) -> bool {
        match self.find_top_level(key) {
            Some(index) => {
                let current = &self.doc.lines()[index];
                let (body, ending) = match current.strip_suffix('\r') {
                    Some(body) => (body, "\r"),
                    None => (current.as_str(), ""),
                };
                let comment = body
                    .split_once(':')
                    .and_then(|(_, raw)| {
                        let pos = raw.find(" #")?;
                        Some(&raw[raw[..pos].trim_end().len()..])
                    })
                    .unwrap_or("");
                let rendered = format!("{}: {}{}{}", key, value, comment, ending);
                if current.trim_end() == rendered.trim_end() {
                    return false;
                }
                self.doc.replace(index, rendered);
            }
            None => {
                let ending = self.line_ending();
                self.doc.push(format!("{}: {}{}", key, value, ending));
            }
        }
        true
    }

    /// `"\r"` for a CRLF document, judged by its first line.
    fn line_ending(&self) -> &'static str {
        match self.doc.lines().first() {
            Some(line) if line.ends_with('\r') => "\r",
            _ => "",
        }
    }

    /// Lines following `start` that are nested deeper than `indent`.
    fn block_extent(&self, start: usize, indent: usize) -> Range<usize> {
        let lines = self.doc.lines();
        let body_start = start + 1;
        let mut body_end = body_start;

        for (i, line) in lines.iter().enumerate().skip(body_start) {
            if is_blank(line) {
                continue;
            }
            if indent_of(line) <= indent {
                break;
            }
            body_end = i + 1;
        }

        body_start..body_end
    }
}

/// Whether a line is the zero-indent tag line `<tag>:` (trailing comment allowed).
pub fn is_section_tag(line: &str, tag: &str) -> bool {
    if indent_of(line) != 0 {
        return false;
    }
    let content = strip_comment(line).trim_end();
    content.strip_suffix(':') == Some(tag)
}

/// Whether trimmed line content starts with `key:` in unquoted, single-quoted
/// or double-quoted form.
pub fn key_matches(trimmed: &str, key: &str) -> bool {
    ["", "'", "\""].iter().any(|quote| {
        trimmed
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_prefix(key))
            .and_then(|rest| rest.strip_prefix(quote))
            .is_some_and(|rest| rest.starts_with(':'))
    })
}

fn strip_comment(text: &str) -> &str {
    match text.find(" #") {
        Some(pos) => &text[..pos],
        None if text.starts_with('#') => "",
        None => text,
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
PlayNotOwnedGames: no
FakeAppIds:
  10: 480
  20: 480

AppTokens:
  30: abc
DlcData:
  42:
    10: \"A\"
    11: \"B\"
  43: \"C\"
";

    #[test]
    fn test_find_section() {
        let mut doc = LineDocument::parse(SAMPLE);
        let editor = SectionEditor::new(&mut doc);

        assert_eq!(editor.find_section("FakeAppIds"), Some(1));
        assert_eq!(editor.find_section("AppTokens"), Some(5));
        assert_eq!(editor.find_section("fakeappids"), None);
        assert_eq!(editor.find_section("Missing"), None);
    }

    #[test]
    fn test_section_body_excludes_trailing_blank() {
        let mut doc = LineDocument::parse(SAMPLE);
        let editor = SectionEditor::new(&mut doc);

        assert_eq!(editor.section_body("FakeAppIds"), Some(2..4));
        assert_eq!(editor.section_body("AppTokens"), Some(6..7));
        assert_eq!(editor.section_body("DlcData"), Some(8..12));
    }

    #[test]
    fn test_key_matches_quoting_styles() {
        assert!(key_matches("10: 480", "10"));
        assert!(key_matches("'10': 480", "10"));
        assert!(key_matches("\"10\": 480", "10"));
        assert!(!key_matches("100: 480", "10"));
        assert!(!key_matches("'10: 480", "10"));
    }

    #[test]
    fn test_is_section_tag() {
        assert!(is_section_tag("FakeAppIds:", "FakeAppIds"));
        assert!(is_section_tag("FakeAppIds:   # mappings", "FakeAppIds"));
        assert!(!is_section_tag("  FakeAppIds:", "FakeAppIds"));
        assert!(!is_section_tag("FakeAppIds: 1", "FakeAppIds"));
    }

    #[test]
    fn test_find_entry_ignores_nested_children() {
        let mut doc = LineDocument::parse(SAMPLE);
        let editor = SectionEditor::new(&mut doc);

        // "10" only appears as a child of block 42 inside DlcData
        assert!(!editor.contains_key("DlcData", "10"));
        assert!(editor.contains_key("DlcData", "42"));
        assert!(editor.contains_key("FakeAppIds", "10"));
    }

    #[test]
    fn test_insert_entries_existing_section() {
        let mut doc = LineDocument::parse(SAMPLE);
        let mut editor = SectionEditor::new(&mut doc);

        editor.insert_entries("FakeAppIds", vec!["  99: 480".to_string()]);

        assert_eq!(doc.lines()[2], "  99: 480");
        assert_eq!(doc.lines()[3], "  10: 480");
    }

    #[test]
    fn test_insert_entries_creates_section() {
        let mut doc = LineDocument::parse("PlayNotOwnedGames: yes\n");
        let mut editor = SectionEditor::new(&mut doc);

        editor.insert_entries("AppTokens", vec!["  5: tok".to_string()]);

        assert_eq!(doc.render(), "PlayNotOwnedGames: yes\n\nAppTokens:\n  5: tok\n");
    }

    #[test]
    fn test_insert_entries_into_empty_document() {
        let mut doc = LineDocument::default();
        let mut editor = SectionEditor::new(&mut doc);

        editor.insert_entries("FakeAppIds", vec!["  5: 480".to_string()]);

        assert_eq!(doc.render(), "FakeAppIds:\n  5: 480\n");
    }

    #[test]
    fn test_remove_block_stops_at_sibling() {
        let mut doc = LineDocument::parse("DlcData:\n  42:\n    10: \"A\"\n    11: \"B\"\n  43: \"C\"\n");
        let mut editor = SectionEditor::new(&mut doc);

        assert_eq!(editor.remove_block("DlcData", "42"), 3);
        assert_eq!(doc.render(), "DlcData:\n  43: \"C\"\n");
    }

    #[test]
    fn test_remove_block_keeps_separator_before_next_section() {
        let mut doc = LineDocument::parse("DlcData:\n  42:\n    10: \"A\"\n\nSafeMode: no\n");
        let mut editor = SectionEditor::new(&mut doc);

        editor.remove_block("DlcData", "42");

        assert_eq!(doc.render(), "DlcData:\n\nSafeMode: no\n");
    }

    #[test]
    fn test_remove_in_section_only_touches_section() {
        let mut doc = LineDocument::parse("FakeAppIds:\n  30: 480\nAppTokens:\n  30: abc\n");
        let mut editor = SectionEditor::new(&mut doc);

        let removed = editor.remove_in_section_where("AppTokens", |line| key_matches(line.trim(), "30"));

        assert_eq!(removed, 1);
        assert_eq!(doc.render(), "FakeAppIds:\n  30: 480\nAppTokens:\n");
    }

    #[test]
    fn test_remove_first_in_section_only_first_match() {
        let mut doc = LineDocument::parse("FakeAppIds:\n  7: 480\n  '7': 480\n");
        let mut editor = SectionEditor::new(&mut doc);

        let removed = editor.remove_first_in_section_where("FakeAppIds", |line| {
            key_matches(line.trim(), "7") && line.contains("480")
        });

        assert_eq!(removed.as_deref(), Some("  7: 480"));
        assert_eq!(doc.render(), "FakeAppIds:\n  '7': 480\n");
    }

    #[test]
    fn test_top_level_value_and_set() {
        let mut doc = LineDocument::parse("Version: \"2.1\"\nSafeMode: no # keep\n");
        let mut editor = SectionEditor::new(&mut doc);

        assert_eq!(editor.top_level_value("Version").as_deref(), Some("2.1"));
        assert_eq!(editor.top_level_value("SafeMode").as_deref(), Some("no"));

        assert!(editor.set_top_level("SafeMode", "yes"));
        assert!(!editor.set_top_level("SafeMode", "yes"));
        assert!(editor.set_top_level("PlayNotOwnedGames", "yes"));

        assert_eq!(
            doc.render(),
            "Version: \"2.1\"\nSafeMode: yes # keep\nPlayNotOwnedGames: yes\n"
        );
    }

    #[test]
    fn test_set_top_level_keeps_crlf_and_comment() {
        let mut doc = LineDocument::parse("SafeMode: no   # keep\r\nFakeAppIds:\r\n  7: 480\r\n");
        let mut editor = SectionEditor::new(&mut doc);

        assert!(editor.set_top_level("SafeMode", "yes"));
        assert!(!editor.set_top_level("SafeMode", "yes"));
        assert!(editor.set_top_level("NotifyInit", "no"));
        editor.insert_entries("AppTokens", vec!["  10: abc".to_string()]);

        assert_eq!(
            doc.render(),
            "SafeMode: yes   # keep\r\nFakeAppIds:\r\n  7: 480\r\nNotifyInit: no\r\n\r\nAppTokens:\r\n  10: abc\r\n"
        );
    }
}
