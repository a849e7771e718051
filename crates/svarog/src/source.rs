//! Source text bookkeeping: compact byte ranges plus line/column rendering.

use std::fmt;

/// Half-open byte range into a source buffer.
///
/// Every syntax node and diagnostic carries one of these. Line/column
/// resolution is deferred to [`SourceMap::locate`] so the hot paths only
/// move two `u32`s around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct SourceRange {
    pub start: u32,
    pub end: u32,
}

impl SourceRange {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: u32::try_from(start).expect("source offset out of u32 range"),
            end: u32::try_from(end).expect("source offset out of u32 range"),
        }
    }

    /// Smallest range covering both `self` and `other`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Resolved position of a range for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One registered source buffer: name plus precomputed line starts.
#[derive(Debug)]
struct SourceFile {
    name: String,
    /// Byte offset of this file's text within the map's global offset space.
    base: u32,
    /// Global offsets of each line start, ascending; first entry == `base`.
    line_starts: Vec<u32>,
    len: u32,
}

/// Maps global byte offsets back to file/line/column.
///
/// Files occupy consecutive, non-overlapping offset windows in registration
/// order, so one `u32` identifies a position across every input file.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file's text and returns the global offset of its first byte.
    pub fn add_file(&mut self, name: &str, text: &str) -> u32 {
        let base = self.files.last().map_or(0, |f| f.base + f.len);
        let mut line_starts = vec![base];
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(base + u32::try_from(idx).expect("file too large") + 1);
            }
        }
        self.files.push(SourceFile {
            name: name.to_owned(),
            base,
            line_starts,
            len: u32::try_from(text.len()).expect("file too large"),
        });
        base
    }

    /// Resolves the start of a range to a file/line/column triple.
    ///
    /// Offsets that fall outside every registered file (synthetic ranges)
    /// resolve to line 0 of an `<unknown>` pseudo-file.
    #[must_use]
    pub fn locate(&self, range: SourceRange) -> SourceLoc {
        let offset = range.start;
        let file = self
            .files
            .iter()
            .find(|f| offset >= f.base && offset < f.base + f.len.max(1));
        match file {
            Some(f) => {
                let line_idx = match f.line_starts.binary_search(&offset) {
                    Ok(i) => i,
                    Err(i) => i - 1,
                };
                SourceLoc {
                    file: f.name.clone(),
                    line: u32::try_from(line_idx).unwrap_or(0) + 1,
                    column: offset - f.line_starts[line_idx] + 1,
                }
            }
            None => SourceLoc {
                file: "<unknown>".to_owned(),
                line: 0,
                column: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_spans_files() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.sv", "module m;\nendmodule\n");
        let b = map.add_file("b.sv", "module n;\nendmodule\n");
        assert_eq!(a, 0);
        assert!(b > a);

        let loc = map.locate(SourceRange::new(10, 11));
        assert_eq!(loc.file, "a.sv");
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 1);

        let loc = map.locate(SourceRange::new(b as usize, b as usize + 1));
        assert_eq!(loc.file, "b.sv");
        assert_eq!(loc.line, 1);
    }
}
