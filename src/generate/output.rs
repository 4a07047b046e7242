use crate::parser::positions::{Position, Span};
use crate::sourcemap::{SourceMap, SourceMapping};

/// Output buffer that accumulates generated code and records a mapping for
/// every verbatim copy of template text.
pub struct Output {
    code: String,
    position: Position,
    indent: usize,
    at_line_start: bool,
    mappings: Vec<SourceMapping>,
}

impl Output {
    pub fn new() -> Self {
        Self {
            code: String::new(),
            position: Position::default(),
            indent: 0,
            at_line_start: true,
            mappings: Vec::new(),
        }
    }

    /// Current generated position (line, UTF-16 column)
    pub fn position(&self) -> Position {
        self.position
    }

    pub fn indent(&mut self) {
        self.indent += 1;
    }

    pub fn dedent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    fn write_indent(&mut self) {
        if self.at_line_start && self.indent > 0 {
            let tabs = "\t".repeat(self.indent);
            self.write_raw(&tabs);
        }
        self.at_line_start = false;
    }

    fn write_raw(&mut self, text: &str) {
        self.code.push_str(text);
        self.position = self.position.advance(text);
    }

    /// Add text without mapping
    pub fn push(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.write_indent();
        self.write_raw(text);
        self.at_line_start = text.ends_with('\n');
    }

    /// Add text copied verbatim from `template` in the source
    pub fn push_mapped(&mut self, text: &str, template: Span) {
        if text.is_empty() {
            return;
        }
        self.write_indent();
        let start = self.position;
        self.write_raw(text);
        self.at_line_start = text.ends_with('\n');
        self.mappings.push(SourceMapping {
            template,
            generated: Span::new(start, self.position),
        });
    }

    /// Add a newline
    pub fn newline(&mut self) {
        self.write_raw("\n");
        self.at_line_start = true;
    }

    /// Add a whole line of unmapped code
    pub fn line(&mut self, text: &str) {
        self.push(text);
        self.newline();
    }

    /// Finish and return the generated code with its source map
    pub fn finish(self) -> (String, SourceMap) {
        (self.code, SourceMap::from_entries(self.mappings))
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_positions_follow_indentation() {
        let mut out = Output::new();
        out.line("func A() {");
        out.indent();
        out.push("x := ");
        let template = Span::new(Position::new(3, 4), Position::new(3, 8));
        out.push_mapped("name", template);
        out.newline();
        out.dedent();
        out.line("}");

        let (code, map) = out.finish();
        assert_eq!(code, "func A() {\n\tx := name\n}\n");
        assert_eq!(map.entries().len(), 1);
        assert_eq!(
            map.entries()[0].generated,
            Span::new(Position::new(1, 6), Position::new(1, 10))
        );
    }

    #[test]
    fn test_utf16_columns() {
        let mut out = Output::new();
        out.push("s := \"👋\"; ");
        out.push_mapped("x", Span::default());
        let (_, map) = out.finish();
        // 👋 is two UTF-16 code units
        assert_eq!(map.entries()[0].generated.start, Position::new(0, 11));
    }
}
