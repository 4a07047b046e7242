//! Bidirectional position mapping between a template and its generated Go.
//!
//! Every entry pairs a template range with a generated range holding the
//! same text, so inside an entry a position moves by a line delta, plus a
//! column delta on the entry's first line. Positions outside every entry
//! ("no man's land") snap to the nearest entry boundary.

use crate::parser::positions::{Position, Span};
use serde::{Deserialize, Serialize};

/// One verbatim copy of template text into the generated file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapping {
    pub template: Span,
    pub generated: Span,
}

impl SourceMapping {
    fn to_generated(&self, pos: Position) -> Position {
        translate(self.template, self.generated, pos)
    }

    fn to_template(&self, pos: Position) -> Position {
        translate(self.generated, self.template, pos)
    }
}

/// Move `pos` from `from` into `to`. Both ranges hold identical text.
fn translate(from: Span, to: Span, pos: Position) -> Position {
    let pos = pos.max(from.start).min(from.end);
    let moved = if pos.line == from.start.line {
        Position::new(to.start.line, to.start.col + (pos.col - from.start.col))
    } else {
        Position::new(to.start.line + (pos.line - from.start.line), pos.col)
    };
    moved.min(to.end)
}

/// Queryable source map. Entries are kept in emission order, which is also
/// generated order; a second index orders them by template start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    entries: Vec<SourceMapping>,
    by_template: Vec<usize>,
}

/// On-disk sidecar format
#[derive(Debug, Serialize, Deserialize)]
struct SourceMapFile {
    generator: String,
    mappings: Vec<SourceMapping>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries in emission order.
    pub fn from_entries(entries: Vec<SourceMapping>) -> Self {
        let mut by_template: Vec<usize> = (0..entries.len()).collect();
        by_template.sort_by_key(|&i| (entries[i].template.start, i));
        Self { entries, by_template }
    }

    pub fn entries(&self) -> &[SourceMapping] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index (into `by_template`) one past the last entry starting at or before `pos`
    fn template_partition(&self, pos: Position) -> usize {
        self.by_template
            .partition_point(|&i| self.entries[i].template.start <= pos)
    }

    fn generated_partition(&self, pos: Position) -> usize {
        self.entries.partition_point(|e| e.generated.start <= pos)
    }

    // Entries never overlap, so only the last entries starting at or before
    // `pos` can contain it.
    fn entry_for_template(&self, pos: Position) -> Option<&SourceMapping> {
        let end = self.template_partition(pos);
        self.by_template[..end]
            .iter()
            .rev()
            .take(2)
            .map(|&i| &self.entries[i])
            .find(|e| e.template.contains(pos))
    }

    fn entry_for_generated(&self, pos: Position) -> Option<&SourceMapping> {
        let end = self.generated_partition(pos);
        self.entries[..end]
            .iter()
            .rev()
            .take(2)
            .find(|e| e.generated.contains(pos))
    }

    /// Entries whose generated span overlaps `range`, in generated order.
    pub fn entries_in_generated(&self, range: Span) -> &[SourceMapping] {
        let first = self.entries.partition_point(|e| e.generated.end <= range.start);
        let last = self.entries.partition_point(|e| e.generated.start < range.end);
        &self.entries[first..last.max(first)]
    }

    /// Template position to generated position. Never fails.
    pub fn to_generated(&self, pos: Position) -> Position {
        if let Some(entry) = self.entry_for_template(pos) {
            return entry.to_generated(pos);
        }
        let before = self.template_partition(pos);
        if before > 0 {
            return self.entries[self.by_template[before - 1]].generated.end;
        }
        self.by_template
            .first()
            .map(|&i| self.entries[i].generated.start)
            .unwrap_or_default()
    }

    /// Generated position to template position. Never fails.
    pub fn to_template(&self, pos: Position) -> Position {
        if let Some(entry) = self.entry_for_generated(pos) {
            return entry.to_template(pos);
        }
        let after = self.generated_partition(pos);
        match self.entries.get(after) {
            Some(next) => next.template.start,
            None => self.entries.last().map(|e| e.template.end).unwrap_or_default(),
        }
    }

    /// Like `to_generated`, but `None` outside every entry.
    pub fn to_generated_exact(&self, pos: Position) -> Option<Position> {
        self.entry_for_template(pos).map(|e| e.to_generated(pos))
    }

    /// Like `to_template`, but `None` in no man's land.
    pub fn to_template_exact(&self, pos: Position) -> Option<Position> {
        self.entry_for_generated(pos).map(|e| e.to_template(pos))
    }

    /// Template range to generated range. Always answers.
    pub fn range_to_generated(&self, range: Span) -> Span {
        let start = self.to_generated(range.start);
        let end = self.to_generated(range.end).max(start);
        Span::new(start, end)
    }

    /// Generated range to template range, only when both ends fall inside
    /// the same entry.
    pub fn range_to_template(&self, range: Span) -> Option<Span> {
        let entry = self.entry_for_generated(range.start)?;
        if !entry.generated.contains(range.end) {
            return None;
        }
        Some(Span::new(entry.to_template(range.start), entry.to_template(range.end)))
    }

    /// Serialize as the JSON sidecar written next to generated files.
    pub fn to_json(&self, generator: &str) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&SourceMapFile {
            generator: generator.to_string(),
            mappings: self.entries.clone(),
        })
    }

    /// Read a sidecar back. Returns the generator marker and the map.
    pub fn from_json(json: &str) -> serde_json::Result<(String, SourceMap)> {
        let file: SourceMapFile = serde_json::from_str(json)?;
        Ok((file.generator, SourceMap::from_entries(file.mappings)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, col: u32) -> Position {
        Position::new(line, col)
    }

    fn span(sl: u32, sc: u32, el: u32, ec: u32) -> Span {
        Span::new(pos(sl, sc), pos(el, ec))
    }

    /// Two single-line entries and one spanning two lines
    fn sample() -> SourceMap {
        SourceMap::from_entries(vec![
            SourceMapping {
                template: span(2, 6, 2, 24),
                generated: span(10, 5, 10, 23),
            },
            SourceMapping {
                template: span(3, 8, 3, 9),
                generated: span(25, 52, 25, 53),
            },
            SourceMapping {
                template: span(5, 2, 6, 10),
                generated: span(40, 1, 41, 10),
            },
        ])
    }

    #[test]
    fn test_inside_entry_first_line() {
        let map = sample();
        assert_eq!(map.to_generated(pos(3, 8)), pos(25, 52));
        assert_eq!(map.to_generated(pos(3, 9)), pos(25, 53));
        assert_eq!(map.to_template(pos(25, 52)), pos(3, 8));
        assert_eq!(map.to_generated(pos(2, 10)), pos(10, 9));
    }

    #[test]
    fn test_inside_entry_later_line_keeps_column() {
        let map = sample();
        assert_eq!(map.to_generated(pos(6, 4)), pos(41, 4));
        assert_eq!(map.to_template(pos(41, 4)), pos(6, 4));
    }

    #[test]
    fn test_no_mans_land() {
        let map = sample();
        // Between entries: preceding entry's generated end
        assert_eq!(map.to_generated(pos(4, 0)), pos(25, 53));
        assert_eq!(map.to_generated_exact(pos(4, 0)), None);
        // Before every entry: first entry's generated start
        assert_eq!(map.to_generated(pos(0, 0)), pos(10, 5));
        // Generated boilerplate maps to the next entry's template start
        assert_eq!(map.to_template(pos(20, 0)), pos(3, 8));
        assert_eq!(map.to_template_exact(pos(20, 0)), None);
        // Past the last entry
        assert_eq!(map.to_template(pos(90, 0)), pos(6, 10));
    }

    #[test]
    fn test_empty_map() {
        let map = SourceMap::new();
        assert_eq!(map.to_generated(pos(3, 3)), pos(0, 0));
        assert_eq!(map.to_template(pos(3, 3)), pos(0, 0));
        assert!(map.range_to_template(span(0, 0, 0, 1)).is_none());
    }

    #[test]
    fn test_range_to_template_same_entry_only() {
        let map = sample();
        assert_eq!(map.range_to_template(span(10, 5, 10, 10)), Some(span(2, 6, 2, 11)));
        assert_eq!(map.range_to_template(span(10, 5, 25, 53)), None);
        assert_eq!(map.range_to_template(span(11, 0, 11, 3)), None);
    }

    #[test]
    fn test_range_to_generated_always_answers() {
        let map = sample();
        assert_eq!(map.range_to_generated(span(3, 8, 3, 9)), span(25, 52, 25, 53));
        let r = map.range_to_generated(span(0, 0, 9, 0));
        assert!(r.start <= r.end);
    }

    #[test]
    fn test_monotonic_within_entry() {
        let map = sample();
        let mut last = pos(0, 0);
        for col in 6..=24 {
            let g = map.to_generated(pos(2, col));
            assert!(g >= last);
            last = g;
        }
    }

    #[test]
    fn test_entries_in_generated() {
        let map = sample();
        let inside = map.entries_in_generated(span(10, 0, 25, 60));
        assert_eq!(inside.len(), 2);
        assert_eq!(inside[1].template, span(3, 8, 3, 9));
        assert!(map.entries_in_generated(span(11, 0, 20, 0)).is_empty());
        // Touching the end of an entry is not overlap
        assert!(map.entries_in_generated(span(10, 23, 10, 30)).is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let map = sample();
        let json = map.to_json("templ 0.1.0").unwrap();
        assert!(json.contains("\"generator\": \"templ 0.1.0\""));
        let (generator, back) = SourceMap::from_json(&json).unwrap();
        assert_eq!(generator, "templ 0.1.0");
        assert_eq!(back, map);
    }
}
