//! Diagnostics for template documents: template errors converted to LSP,
//! and wrapped-server diagnostics translated back onto the template.

use crate::error::CompileError;
use crate::parser::positions::{Position, Span};
use crate::sourcemap::SourceMap;
use lsp_types::{Diagnostic, DiagnosticSeverity};

/// What to do with a diagnostic whose range lies entirely in generated
/// boilerplate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum NoMansLandPolicy {
    /// Drop it
    Suppress,
    /// Errors go to the top of the file, everything else is dropped
    #[default]
    AttachErrorsToTop,
    /// Everything goes to the top of the file
    AttachAllToTop,
}

pub fn position_to_lsp(pos: Position) -> lsp_types::Position {
    lsp_types::Position {
        line: pos.line,
        character: pos.col,
    }
}

pub fn position_from_lsp(pos: lsp_types::Position) -> Position {
    Position::new(pos.line, pos.character)
}

pub fn range_to_lsp(span: Span) -> lsp_types::Range {
    lsp_types::Range {
        start: position_to_lsp(span.start),
        end: position_to_lsp(span.end),
    }
}

pub fn range_from_lsp(range: lsp_types::Range) -> Span {
    Span::new(position_from_lsp(range.start), position_from_lsp(range.end))
}

/// Parser and generator errors as diagnostics
pub fn template_diagnostics(errors: &[CompileError]) -> Vec<Diagnostic> {
    errors
        .iter()
        .map(|err| Diagnostic {
            range: range_to_lsp(err.span()),
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some("templ".to_string()),
            message: err.message().to_string(),
            ..Diagnostic::default()
        })
        .collect()
}

/// Translate diagnostics on a generated file onto its template.
pub fn translate(diagnostics: Vec<Diagnostic>, map: &SourceMap, policy: NoMansLandPolicy) -> Vec<Diagnostic> {
    diagnostics
        .into_iter()
        .filter_map(|mut diagnostic| {
            let range = range_from_lsp(diagnostic.range);
            let start = map.to_template_exact(range.start);
            let end = map.to_template_exact(range.end);

            diagnostic.range = match (start, end) {
                (None, None) if !map.entries_in_generated(range).is_empty() => {
                    // Both ends in boilerplate around mapped code
                    let inside = map.entries_in_generated(range);
                    let start = inside[0].template.start;
                    let end = inside[inside.len() - 1].template.end.max(start);
                    range_to_lsp(Span::new(start, end))
                }
                (None, None) => {
                    let attach = match policy {
                        NoMansLandPolicy::Suppress => false,
                        NoMansLandPolicy::AttachErrorsToTop => diagnostic.severity == Some(DiagnosticSeverity::ERROR),
                        NoMansLandPolicy::AttachAllToTop => true,
                    };
                    if !attach {
                        tracing::trace!(message = %diagnostic.message, "diagnostic in generated code dropped");
                        return None;
                    }
                    range_to_lsp(Span::default())
                }
                _ => match map.range_to_template(range) {
                    Some(span) => range_to_lsp(span),
                    None => {
                        let start = map.to_template(range.start);
                        let end = map.to_template(range.end).max(start);
                        range_to_lsp(Span::new(start, end))
                    }
                },
            };
            Some(diagnostic)
        })
        .collect()
}
