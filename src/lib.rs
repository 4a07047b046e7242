//! Compiler from templ templates (HTML with embedded Go) to Go source, with a
//! bidirectional source map and an LSP proxy that serves template editing
//! through a language server for the generated Go.

pub mod ast;
pub mod batch;
pub mod error;
pub mod format;
pub mod generate;
pub mod html;
pub mod lsp;
pub mod parser;
pub mod sourcemap;
pub mod transform;
pub mod watch;

pub use error::{CompileError, ErrorKind, GenerationError, SyntaxError};
pub use generate::{GenerateOptions, GenerateResult, Generator, GoGenerator};
pub use parser::{ParseResult, Position, Span, parse};
pub use sourcemap::{SourceMap, SourceMapping};

use std::path::{Path, PathBuf};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Marker stored in source map sidecars
pub fn generator_marker() -> String {
    format!("templ {}", VERSION)
}

/// Result of compiling one template file.
#[derive(Debug, Clone)]
pub struct TranspileResult {
    /// Generated Go source
    pub code: String,
    pub source_map: SourceMap,
    /// Syntax errors first, then generation errors, each in source order
    pub errors: Vec<CompileError>,
}

impl TranspileResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Compile template source with default options.
pub fn transpile(source: &str) -> TranspileResult {
    transpile_with(source, &GenerateOptions::default())
}

/// Compile template source: parse, analyse, generate.
pub fn transpile_with(source: &str, options: &GenerateOptions) -> TranspileResult {
    let ParseResult { mut file, errors } = parse(source);

    let mut transformer = transform::standard_plugins();
    let metadata = transformer.transform(&mut file);
    let generated = GoGenerator.generate(&file, metadata, options);

    let generation_errors = dedup_generation_errors(&errors, generated.errors);
    tracing::debug!(
        file = %options.file_name,
        syntax_errors = errors.len(),
        generation_errors = generation_errors.len(),
        mappings = generated.source_map.len(),
        "generated"
    );

    let errors = errors
        .into_iter()
        .map(CompileError::from)
        .chain(generation_errors.into_iter().map(CompileError::from))
        .collect();

    TranspileResult {
        code: generated.code,
        source_map: generated.source_map,
        errors,
    }
}

/// The parser already reports unclosed nodes, so a synthesised brace inside
/// a node with a syntax error, or a generation error at the exact position
/// of a syntax error, is not reported twice.
fn dedup_generation_errors(syntax: &[SyntaxError], generation: Vec<GenerationError>) -> Vec<GenerationError> {
    let mut kept: Vec<GenerationError> = generation
        .into_iter()
        .filter(|gen_err| {
            !syntax.iter().any(|syn| {
                syn.span.start == gen_err.span.start || (gen_err.missing_brace && gen_err.span.contains(syn.span.start))
            })
        })
        .collect();
    kept.sort_by_key(|e| e.span.start);
    kept
}

/// `dir/x.templ` -> `dir/x_templ.go`
pub fn generated_path(template: &Path) -> PathBuf {
    let stem = template.file_stem().and_then(|s| s.to_str()).unwrap_or("templ");
    template.with_file_name(format!("{}_templ.go", stem))
}

/// `dir/x_templ.go` -> `dir/x.templ`, or `None` for other files
pub fn template_path(generated: &Path) -> Option<PathBuf> {
    let name = generated.file_name()?.to_str()?;
    let stem = name.strip_suffix("_templ.go")?;
    Some(generated.with_file_name(format!("{}.templ", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "package main\n\ntempl Hello(name string) {\n\t<div>Hello, { name }!</div>\n}\n";

    fn options() -> GenerateOptions {
        GenerateOptions {
            file_name: "hello.templ".to_string(),
            ..GenerateOptions::default()
        }
    }

    #[test]
    fn test_transpile_hello() {
        let result = transpile_with(HELLO, &options());
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.code.starts_with("// Code generated by templ - DO NOT EDIT.\n"));
        assert!(result.code.contains("package main\n"));
        assert!(result.code.contains("func Hello(name string) templ.Component {"));
        assert!(result.code.contains("templ.JoinStringErrs(name)"));
        assert!(result.code.contains("WriteString(\"<div>Hello, \")"));
        assert!(result.code.contains("WriteString(\"!</div>\")"));
        assert!(result.code.contains("FileName: \"hello.templ\", Line: 3, Col: 15"));
        assert!(!result.code.contains("templ_7745c5c3_Var1 := templ.GetChildren"));
    }

    #[test]
    fn test_expression_maps_to_exact_column() {
        let result = transpile_with(HELLO, &options());
        // `name` in `{ name }` on line 3
        let template = Position::new(3, 15);
        let generated = result.source_map.to_generated(template);
        let line = result.code.lines().nth(generated.line as usize).unwrap();
        assert_eq!(&line[generated.col as usize..generated.col as usize + 4], "name");
        assert_eq!(result.source_map.to_template(generated), template);
    }

    #[test]
    fn test_output_is_deterministic() {
        let a = transpile_with(HELLO, &options());
        let b = transpile_with(HELLO, &options());
        assert_eq!(a.code, b.code);
        assert_eq!(a.source_map, b.source_map);
    }

    #[test]
    fn test_children_and_calls() {
        let source = "package main\n\ntempl Layout() {\n\t<main>{ children... }</main>\n}\n\ntempl Page() {\n\t@Layout() {\n\t\t<p>hi</p>\n\t}\n}\n";
        let result = transpile_with(source, &options());
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.code.contains("//lint:file-ignore SA4006"));
        assert!(result.code.contains("templ_7745c5c3_Var1 := templ.GetChildren(ctx)"));
        assert!(result.code.contains("templ_7745c5c3_Err = templ_7745c5c3_Var1.Render(ctx, templ_7745c5c3_Buffer)"));
        assert!(result.code.contains("templ_7745c5c3_Var2 := templruntime.GeneratedTemplate("));
        assert!(result.code.contains("Layout().Render(templ.WithChildren(ctx, templ_7745c5c3_Var2), templ_7745c5c3_Buffer)"));
    }

    #[test]
    fn test_control_flow() {
        let source = "package main\n\ntempl List(items []string) {\n\tif len(items) == 0 {\n\t\t<p>none</p>\n\t} else {\n\t\tfor _, item := range items {\n\t\t\t<li>{ item }</li>\n\t\t}\n\t}\n}\n";
        let result = transpile_with(source, &options());
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.code.contains("if len(items) == 0 {"));
        assert!(result.code.contains("} else {"));
        assert!(result.code.contains("for _, item := range items {"));
    }

    #[test]
    fn test_unclosed_block_reported_once() {
        let source = "package main\n\ntempl A() {\n\tif x {\n\t\t<p>x</p>\n}\n";
        let result = transpile_with(source, &options());
        let unclosed = result
            .errors
            .iter()
            .filter(|e| e.message().contains("never closed") || e.message().contains("closing brace"))
            .count();
        assert!(unclosed >= 1);
        assert!(
            !result
                .errors
                .iter()
                .any(|e| matches!(e, CompileError::Generation(g) if g.missing_brace))
        );
        // Output is still produced for the partial template
        assert!(result.code.contains("if x {"));
    }

    #[test]
    fn test_empty_expression_is_generation_error() {
        let source = "package main\n\ntempl A() {\n\t<p>{ }</p>\n}\n";
        let result = transpile_with(source, &options());
        assert!(
            result
                .errors
                .iter()
                .any(|e| matches!(e, CompileError::Generation(g) if g.message == "Empty expression"))
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(generated_path(Path::new("a/b/hello.templ")), PathBuf::from("a/b/hello_templ.go"));
        assert_eq!(template_path(Path::new("a/hello_templ.go")), Some(PathBuf::from("a/hello.templ")));
        assert_eq!(template_path(Path::new("a/hello.go")), None);
    }
}
