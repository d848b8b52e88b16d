//! Cached source text used for breakpoint placement and frame labels.
use std::path::{Path, PathBuf};

use eyre::WrapErr;

/// A source file loaded once at launch. The cache never refreshes; the
/// debuggee is assumed not to change on disk during the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSource {
    path: PathBuf,
    lines: Vec<String>,
}

impl FileSource {
    pub fn load(path: impl Into<PathBuf>) -> eyre::Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("reading source file {}", path.display()))?;
        Ok(Self::from_contents(path, &contents))
    }

    pub fn from_contents(path: impl Into<PathBuf>, contents: &str) -> Self {
        Self {
            path: path.into(),
            lines: contents.lines().map(str::to_string).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Trimmed text of the 1-indexed `line`.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|index| self.lines.get(index))
            .map(|text| text.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_indexed_from_one() {
        let source = FileSource::from_contents("/src/user.rb", "first\n  second\nthird\n");

        assert_eq!(source.line_text(1), Some("first"));
        assert_eq!(source.line_text(2), Some("second"));
        assert_eq!(source.line_text(0), None);
        assert_eq!(source.line_text(4), None);
    }
}
