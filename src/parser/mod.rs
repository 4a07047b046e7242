pub mod go;
pub mod positions;
pub mod tokenizer;
mod tree_builder;

pub use positions::{LineIndex, Position, Span};
pub use tokenizer::{Token, tokenize};
use tree_builder::TreeBuilder;

use crate::ast::TemplateFile;
use crate::error::SyntaxError;
use std::sync::Arc;

/// A best-effort AST plus every recoverable fault found on the way
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub file: TemplateFile,
    pub errors: Vec<SyntaxError>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse template source. Never fails: malformed input yields a partial AST
/// and one error per fault, in source order.
pub fn parse(source: &str) -> ParseResult {
    let (tokens, mut errors) = tokenize(source);
    tracing::trace!(tokens = tokens.len(), "tokenized");

    let source: Arc<str> = Arc::from(source);
    let (file, tree_errors) = TreeBuilder::new(tokens, source).build();
    errors.extend(tree_errors);
    errors.sort_by_key(|e| e.span.start);

    ParseResult { file, errors }
}
