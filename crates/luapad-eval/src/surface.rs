//! The line-addressed text a scratchpad reads from and writes into.

use std::fmt;

/// A text surface addressed by zero-based line index.
///
/// Ranges are half-open. Implementations clamp out-of-range indices rather
/// than panicking.
pub trait TextSurface {
    /// Total number of lines.
    fn line_count(&self) -> usize;

    /// Lines in `start..end`.
    fn lines(&self, start: usize, end: usize) -> Vec<String>;

    /// Replace lines `start..end` with `replacement`. `start == end` inserts.
    fn replace_lines(&mut self, start: usize, end: usize, replacement: Vec<String>);

    /// Cursor as `(line, column)`.
    fn cursor(&self) -> (usize, usize);

    fn set_cursor(&mut self, line: usize, column: usize);

    /// A single line, if it exists.
    fn line(&self, index: usize) -> Option<String> {
        self.lines(index, index + 1).into_iter().next()
    }
}

/// In-memory surface backed by a vector of lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: Vec<String>,
    cursor: (usize, usize),
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split text into lines. A single trailing newline does not add an
    /// empty last line.
    pub fn from_text(text: &str) -> Self {
        let text = text.strip_suffix('\n').unwrap_or(text);
        if text.is_empty() {
            return Self::new();
        }
        text.split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Join lines with newlines, ending with a newline when non-empty.
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if !self.lines.is_empty() {
            text.push('\n');
        }
        text
    }

    pub fn as_lines(&self) -> &[String] {
        &self.lines
    }
}

impl FromIterator<String> for LineBuffer {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().collect(),
            cursor: (0, 0),
        }
    }
}

impl<'a> FromIterator<&'a str> for LineBuffer {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        iter.into_iter().map(str::to_string).collect()
    }
}

impl TextSurface for LineBuffer {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn lines(&self, start: usize, end: usize) -> Vec<String> {
        let end = end.min(self.lines.len());
        let start = start.min(end);
        self.lines[start..end].to_vec()
    }

    fn replace_lines(&mut self, start: usize, end: usize, replacement: Vec<String>) {
        let end = end.min(self.lines.len());
        let start = start.min(end);
        self.lines.splice(start..end, replacement);
    }

    fn cursor(&self) -> (usize, usize) {
        self.cursor
    }

    fn set_cursor(&mut self, line: usize, column: usize) {
        let line = line.min(self.lines.len().saturating_sub(1));
        self.cursor = (line, column);
    }
}

impl fmt::Display for LineBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
