use crate::parser::positions::Span;
use std::fmt;

/// Kind of syntax error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnclosedElement,
    MismatchedCloseTag,
    UnclosedBlock,
    UnclosedTemplate,
    UnclosedExpression,
    InvalidSignature,
    InvalidControlHeader,
    VoidElementWithContent,
    UnexpectedToken,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnclosedElement => "Unclosed element",
            ErrorKind::MismatchedCloseTag => "Mismatched close tag",
            ErrorKind::UnclosedBlock => "Unclosed block",
            ErrorKind::UnclosedTemplate => "Unclosed template",
            ErrorKind::UnclosedExpression => "Unclosed expression",
            ErrorKind::InvalidSignature => "Invalid signature",
            ErrorKind::InvalidControlHeader => "Invalid control header",
            ErrorKind::VoidElementWithContent => "Void element with content",
            ErrorKind::UnexpectedToken => "Unexpected token",
        }
    }
}

/// Recoverable error found while parsing a template file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
    pub related_span: Option<Span>,
    pub related_label: Option<String>,
    pub help: Option<String>,
}

impl SyntaxError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
            related_span: None,
            related_label: None,
            help: None,
        }
    }

    /// Add a related span (e.g. where a block was opened)
    pub fn with_related(mut self, span: Span) -> Self {
        self.related_span = Some(span);
        self
    }

    pub fn with_related_label(mut self, label: impl Into<String>) -> Self {
        self.related_label = Some(label.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the error with source context
    pub fn render(&self, source: &str, filename: &str) -> String {
        Diagnostic::from(self).render(source, filename, false)
    }

    /// Render the error with ANSI color codes
    pub fn render_color(&self, source: &str, filename: &str) -> String {
        Diagnostic::from(self).render(source, filename, true)
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span.start, self.message)
    }
}

impl std::error::Error for SyntaxError {}

/// Error found while generating Go from a (possibly partial) AST.
/// Generation always continues past these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    pub message: String,
    pub span: Span,
    /// The node was left open and the generator closed it
    pub missing_brace: bool,
}

impl GenerationError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            missing_brace: false,
        }
    }

    pub fn missing_brace(message: impl Into<String>, span: Span) -> Self {
        Self {
            missing_brace: true,
            ..Self::new(message, span)
        }
    }

    pub fn render(&self, source: &str, filename: &str) -> String {
        Diagnostic::from(self).render(source, filename, false)
    }

    pub fn render_color(&self, source: &str, filename: &str) -> String {
        Diagnostic::from(self).render(source, filename, true)
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span.start, self.message)
    }
}

impl std::error::Error for GenerationError {}

/// Any error reported against a template file
#[derive(Debug, Clone)]
pub enum CompileError {
    Syntax(SyntaxError),
    Generation(GenerationError),
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::Syntax(e) => e.span,
            CompileError::Generation(e) => e.span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::Syntax(e) => &e.message,
            CompileError::Generation(e) => &e.message,
        }
    }

    pub fn render(&self, source: &str, filename: &str) -> String {
        match self {
            CompileError::Syntax(e) => e.render(source, filename),
            CompileError::Generation(e) => e.render(source, filename),
        }
    }

    pub fn render_color(&self, source: &str, filename: &str) -> String {
        match self {
            CompileError::Syntax(e) => e.render_color(source, filename),
            CompileError::Generation(e) => e.render_color(source, filename),
        }
    }
}

impl From<SyntaxError> for CompileError {
    fn from(err: SyntaxError) -> Self {
        CompileError::Syntax(err)
    }
}

impl From<GenerationError> for CompileError {
    fn from(err: GenerationError) -> Self {
        CompileError::Generation(err)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Syntax(e) => write!(f, "{}", e),
            CompileError::Generation(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {}

/// Borrowed view shared by the renderers
struct Diagnostic<'a> {
    message: &'a str,
    span: Span,
    related_span: Option<Span>,
    related_label: Option<&'a str>,
    help: Option<&'a str>,
}

impl<'a> From<&'a SyntaxError> for Diagnostic<'a> {
    fn from(err: &'a SyntaxError) -> Self {
        Self {
            message: &err.message,
            span: err.span,
            related_span: err.related_span,
            related_label: err.related_label.as_deref(),
            help: err.help.as_deref(),
        }
    }
}

impl<'a> From<&'a GenerationError> for Diagnostic<'a> {
    fn from(err: &'a GenerationError) -> Self {
        Self {
            message: &err.message,
            span: err.span,
            related_span: None,
            related_label: None,
            help: None,
        }
    }
}

impl Diagnostic<'_> {
    fn render(&self, source: &str, filename: &str, color: bool) -> String {
        let red = if color { "\x1b[1;31m" } else { "" };
        let dim = if color { "\x1b[2m" } else { "" };
        let underline = if color { "\x1b[4m" } else { "" };
        let cyan = if color { "\x1b[1;38;5;73m" } else { "" };
        let reset = if color { "\x1b[0m" } else { "" };

        let mut output = String::new();
        output.push('\n');

        let line = self.span.start.line + 1;
        let col = self.span.start.col + 1;
        let location = format!("{}:{}:{}", filename, line, col);
        if color {
            // OSC 8 hyperlink
            let abs_path = std::path::Path::new(filename)
                .canonicalize()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| filename.to_string());
            output.push_str(&format!(
                " {}file:{} \x1b]8;;file://{}\x07{}{}{}\x1b]8;;\x07\n",
                dim, reset, abs_path, underline, location, reset
            ));
        } else {
            output.push_str(&format!(" file: {}\n", location));
        }

        output.push_str(&format!("{}error:{} {}\n", red, reset, self.message));

        if let Some(source_line) = source.lines().nth(self.span.start.line as usize) {
            let width = line.to_string().len().max(2);
            let highlighted = if color {
                highlight_go(source_line)
            } else {
                source_line.to_string()
            };
            output.push_str(&format!("{}{:>width$} |{}\n", dim, "", reset, width = width));
            output.push_str(&format!(
                "{}{:>width$} |{} {}\n",
                dim, line, reset, highlighted, width = width
            ));
            let (spaces, carets) = caret_line(&self.span, source_line);
            output.push_str(&format!(
                "{}{:>width$} |{} {}{}{}{}\n",
                dim, "", reset, spaces, red, carets, reset, width = width
            ));
        }

        if let Some(related) = self.related_span {
            let related_line = related.start.line + 1;
            if let Some(source_line) = source.lines().nth(related.start.line as usize) {
                let width = related_line.to_string().len().max(2);
                let highlighted = if color {
                    highlight_go(source_line)
                } else {
                    source_line.to_string()
                };
                output.push_str(&format!(
                    "{}{:>width$} |{} {}\n",
                    dim, related_line, reset, highlighted, width = width
                ));
                let (spaces, carets) = caret_line(&related, source_line);
                let label = self.related_label.unwrap_or("opened here");
                output.push_str(&format!(
                    "{}{:>width$} |{} {}{}{} {}{}\n",
                    dim, "", reset, spaces, dim, carets, label, reset, width = width
                ));
            }
        }

        if let Some(help) = self.help {
            output.push('\n');
            for (i, help_line) in help.lines().enumerate() {
                if i == 0 {
                    output.push_str(&format!(" {}help:{} {}\n", cyan, reset, help_line));
                } else {
                    output.push_str(&format!("       {}\n", help_line));
                }
            }
        }

        output.push('\n');
        output
    }
}

fn caret_line(span: &Span, source_line: &str) -> (String, String) {
    let start = span.start.col as usize;
    let len = if span.end.line == span.start.line {
        (span.end.col.saturating_sub(span.start.col) as usize).max(1)
    } else {
        source_line.encode_utf16().count().saturating_sub(start).max(1)
    };
    (" ".repeat(start), "^".repeat(len))
}

const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range", "return",
    "select", "struct", "switch", "type", "var", "templ", "css", "script",
];

/// Minimal highlighting for a template source line: keywords, strings and tags.
fn highlight_go(line: &str) -> String {
    const KEYWORD: &str = "\x1b[38;5;176m";
    const STRING: &str = "\x1b[38;5;108m";
    const TAG: &str = "\x1b[38;5;74m";
    const RESET: &str = "\x1b[0m";

    let chars: Vec<char> = line.chars().collect();
    let mut result = String::with_capacity(line.len() * 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '"' || c == '`' {
            result.push_str(STRING);
            result.push(c);
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' && c == '"' && i + 1 < chars.len() {
                    result.push(chars[i]);
                    i += 1;
                }
                result.push(chars[i]);
                i += 1;
            }
            if i < chars.len() {
                result.push(c);
                i += 1;
            }
            result.push_str(RESET);
            continue;
        }

        if c == '<' && i + 1 < chars.len() && (chars[i + 1].is_alphabetic() || chars[i + 1] == '/') {
            result.push_str(TAG);
            result.push(c);
            i += 1;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '/' || chars[i] == '-') {
                result.push(chars[i]);
                i += 1;
            }
            result.push_str(RESET);
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if GO_KEYWORDS.contains(&word.as_str()) {
                result.push_str(KEYWORD);
                result.push_str(&word);
                result.push_str(RESET);
            } else {
                result.push_str(&word);
            }
            continue;
        }

        result.push(c);
        i += 1;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::positions::Position;

    fn span(line: u32, start: u32, end: u32) -> Span {
        Span::new(Position::new(line, start), Position::new(line, end))
    }

    #[test]
    fn test_render_plain() {
        let source = "package main\n\ntempl Hello() {\n\t<div>\n}\n";
        let err = SyntaxError::new(ErrorKind::UnclosedElement, "<div> is never closed", span(3, 1, 6))
            .with_help("add </div>");
        let rendered = err.render(source, "hello.templ");
        assert!(rendered.contains("hello.templ:4:2"));
        assert!(rendered.contains("error: <div> is never closed"));
        assert!(rendered.contains("^^^^^"));
        assert!(rendered.contains("help: add </div>"));
        assert!(!rendered.contains('\x1b'));
    }

    #[test]
    fn test_render_related() {
        let source = "templ A() {\n\tif x {\n}\n";
        let err = SyntaxError::new(ErrorKind::UnclosedBlock, "if block is never closed", span(2, 0, 1))
            .with_related(span(1, 1, 3));
        let rendered = err.render(source, "a.templ");
        assert!(rendered.contains("opened here"));
    }

    #[test]
    fn test_display() {
        let err = GenerationError::new("empty expression", span(4, 2, 5));
        assert_eq!(err.to_string(), "5:3: empty expression");
        let err: CompileError = err.into();
        assert_eq!(err.message(), "empty expression");
    }

    #[test]
    fn test_color_highlights_keywords() {
        let out = highlight_go("templ Hello(name string) {");
        assert!(out.contains("\x1b[38;5;176mtempl"));
    }
}
