//! Whitespace normalisation for template files.
//!
//! Only layout is touched: trailing whitespace is stripped, CRLF becomes LF,
//! runs of blank lines collapse to one, and the file ends with exactly one
//! newline. Content inside lines is never rewritten, so a formatted file
//! always parses to the same AST shape.

use crate::parser::positions::{LineIndex, Span};

pub fn format(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut blank_run = 0;

    for line in source.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if blank_run > 0 && !out.is_empty() {
            out.push('\n');
        }
        blank_run = 0;
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// A replacement of the whole document, or `None` when already formatted.
pub fn format_edit(source: &str) -> Option<(Span, String)> {
    let formatted = format(source);
    if formatted == source {
        return None;
    }
    let index = LineIndex::new(source);
    let whole = Span::new(Default::default(), index.end(source));
    Some((whole, formatted))
}
