//! Byte offset to line/column conversion
//!
//! rustpython-parser 0.3 reports byte offsets through the `Ranged` trait;
//! diagnostics want 1-based lines.

use rustpython_parser::ast::Ranged;

use crate::errors::SourceLocation;

#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// Convert byte offset to (line, column), 1-indexed lines
    pub fn offset_to_position(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let column = offset.saturating_sub(self.line_starts[line]);
        (line + 1, column)
    }

    pub fn location<T: Ranged>(&self, node: &T) -> SourceLocation {
        let range = node.range();
        SourceLocation::from_range(
            self.offset_to_position(range.start().to_usize()),
            self.offset_to_position(range.end().to_usize()),
        )
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_to_position() {
        let index = LineIndex::new("class A:\n    x: int\n");
        assert_eq!(index.offset_to_position(0), (1, 0));
        assert_eq!(index.offset_to_position(9), (2, 0));
        assert_eq!(index.offset_to_position(13), (2, 4));
        assert_eq!(index.line_count(), 3);
    }
}
