//! Positions, spans and offset conversion.
//!
//! Columns are counted in UTF-16 code units everywhere, because editors
//! speak LSP and LSP positions are UTF-16 based. Byte offsets are only used
//! internally while scanning and are converted at the edges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position in a text: 0-based line, 0-based UTF-16 column.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// Position reached after walking over `text` starting here.
    pub fn advance(self, text: &str) -> Self {
        let mut pos = self;
        for ch in text.chars() {
            if ch == '\n' {
                pos.line += 1;
                pos.col = 0;
            } else {
                pos.col += ch.len_utf16() as u32;
            }
        }
        pos
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.col + 1)
    }
}

/// Half-open range `[start, end)` between two positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub const fn point(pos: Position) -> Self {
        Self { start: pos, end: pos }
    }

    /// Span covering `text` when it starts at `start`.
    pub fn of_text(start: Position, text: &str) -> Self {
        Self { start, end: start.advance(text) }
    }

    /// True if `pos` lies in the span; the end is inclusive so that a cursor
    /// sitting right after the last character still belongs to the span.
    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos <= self.end
    }

    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both.
    pub fn cover(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Convert a byte offset to a UTF-16 offset.
///
/// # Arguments
/// * `source` - The source string
/// * `byte_offset` - The byte offset to convert
///
/// # Returns
/// The UTF-16 offset corresponding to the byte offset.
pub fn byte_to_utf16(source: &str, byte_offset: usize) -> usize {
    let mut byte_offset = byte_offset.min(source.len());
    while !source.is_char_boundary(byte_offset) {
        byte_offset -= 1;
    }
    source[..byte_offset].encode_utf16().count()
}

/// Line start table for converting between byte offsets and positions.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Position of a byte offset. Offsets past the end clamp to the end.
    pub fn position(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(self.len);
        let line = self.line_starts.partition_point(|&s| s <= offset) - 1;
        let line_start = self.line_starts[line];
        let col = byte_to_utf16(&text[line_start..], offset - line_start);
        Position::new(line as u32, col as u32)
    }

    /// Byte offset of a position. Columns past the end of a line clamp to the
    /// line end; lines past the end clamp to the end of the text.
    pub fn offset(&self, text: &str, pos: Position) -> usize {
        let line = pos.line as usize;
        if line >= self.line_starts.len() {
            return self.len;
        }
        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        let line_text = &text[line_start..line_end];

        let mut units = 0u32;
        for (i, ch) in line_text.char_indices() {
            if units >= pos.col {
                return line_start + i;
            }
            units += ch.len_utf16() as u32;
        }
        line_end
    }

    /// Position one past the last character.
    pub fn end(&self, text: &str) -> Position {
        self.position(text, self.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii() {
        let source = "hello world";
        assert_eq!(byte_to_utf16(source, 0), 0);
        assert_eq!(byte_to_utf16(source, 5), 5);
        assert_eq!(byte_to_utf16(source, 11), 11);
    }

    #[test]
    fn test_emoji() {
        let source = "hello 👋 world";
        // 👋 is 4 bytes but 2 UTF-16 code units
        assert_eq!(byte_to_utf16(source, 6), 6);
        assert_eq!(byte_to_utf16(source, 10), 8);
    }

    #[test]
    fn test_multibyte() {
        let source = "café";
        assert_eq!(byte_to_utf16(source, 3), 3);
        assert_eq!(byte_to_utf16(source, 5), 4);
    }

    #[test]
    fn test_out_of_bounds() {
        let source = "hello";
        assert_eq!(byte_to_utf16(source, 100), 5);
    }

    #[test]
    fn test_inside_char_rounds_down() {
        let source = "é";
        assert_eq!(byte_to_utf16(source, 1), 0);
    }

    #[test]
    fn test_advance_over_lines() {
        let pos = Position::new(2, 4).advance("ab\ncd👋");
        assert_eq!(pos, Position::new(3, 4));
    }

    #[test]
    fn test_line_index_round_trip() {
        let text = "package main\n\ntempl 👋() {\n}\n";
        let index = LineIndex::new(text);
        for offset in [0, 5, 13, 14, 20, 25, text.len()] {
            if !text.is_char_boundary(offset) {
                continue;
            }
            let pos = index.position(text, offset);
            assert_eq!(index.offset(text, pos), offset, "offset {offset}");
        }
    }

    #[test]
    fn test_line_index_clamps() {
        let text = "ab\ncd";
        let index = LineIndex::new(text);
        assert_eq!(index.offset(text, Position::new(0, 99)), 2);
        assert_eq!(index.offset(text, Position::new(9, 0)), 5);
        assert_eq!(index.end(text), Position::new(1, 2));
    }

    #[test]
    fn test_span_contains_end_inclusive() {
        let span = Span::new(Position::new(1, 2), Position::new(1, 5));
        assert!(span.contains(Position::new(1, 5)));
        assert!(!span.contains(Position::new(1, 6)));
        assert!(!span.contains(Position::new(0, 3)));
    }
}
