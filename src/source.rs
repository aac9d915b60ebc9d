use std::fmt;

/// Handle to a source file registered with the session's [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SourceId(u32);

/// A single source file: its contents plus the name used in diagnostics.
#[derive(Debug, Clone)]
pub struct Source {
    pub file: String,
    pub code: String,
}

/// A position in some source file. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, Eq, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub source: SourceId,
    pub line: usize,
    pub col: usize,
}

impl Span {
    pub fn new(source: SourceId, line: usize, col: usize) -> Self {
        Self { source, line, col }
    }
}

impl PartialEq for Span {
    fn eq(&self, _other: &Span) -> bool {
        // Positions never take part in structural comparison, so trees that
        // differ only in where they were written compare equal.
        true
    }
}

impl Default for Span {
    fn default() -> Self {
        Span {
            source: SourceId(0),
            line: 1,
            col: 1,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// All sources seen during one compilation, addressed by [`SourceId`].
#[derive(Debug, Default)]
pub struct SourceMap {
    sources: Vec<Source>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: impl Into<String>, code: impl Into<String>) -> SourceId {
        let id = SourceId(self.sources.len() as u32);
        self.sources.push(Source {
            file: file.into(),
            code: code.into(),
        });
        id
    }

    pub fn get(&self, id: SourceId) -> &Source {
        &self.sources[id.0 as usize]
    }

    /// The text of one line, for error rendering. Out-of-range lines come
    /// back empty, which keeps rendering total for synthesized spans.
    pub fn line(&self, id: SourceId, line: usize) -> &str {
        self.get(id)
            .code
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or("")
    }

    pub fn file_name(&self, id: SourceId) -> &str {
        &self.get(id).file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_lookup() {
        let mut map = SourceMap::new();
        let id = map.add("test.maru", "first\nsecond\nthird");

        assert_eq!(map.line(id, 1), "first");
        assert_eq!(map.line(id, 3), "third");
        assert_eq!(map.line(id, 7), "");
        assert_eq!(map.file_name(id), "test.maru");
    }
}
