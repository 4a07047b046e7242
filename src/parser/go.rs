//! Syntax checks for Go snippets embedded in templates.
//!
//! Each snippet is wrapped in just enough boilerplate to form a Go file and
//! parsed with tree-sitter-go; a tree containing ERROR or MISSING nodes means
//! the snippet is malformed. Only syntax is checked, never types.

use tree_sitter::{Node, Parser, Tree};

/// What a parsed signature declares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub name: Option<String>,
    pub params: Vec<String>,
}

pub struct GoSyntax {
    parser: Option<Parser>,
}

impl GoSyntax {
    pub fn new() -> Self {
        let mut parser = Parser::new();
        let parser = match parser.set_language(&tree_sitter_go::LANGUAGE.into()) {
            Ok(()) => Some(parser),
            Err(err) => {
                tracing::warn!("Go grammar unavailable, embedded Go will not be checked: {}", err);
                None
            }
        };
        Self { parser }
    }

    fn parse(&mut self, text: &str) -> Option<Tree> {
        self.parser.as_mut()?.parse(text, None)
    }

    /// True unless the wrapped snippet parses with errors.
    fn is_valid(&mut self, wrapped: &str) -> bool {
        match self.parse(wrapped) {
            Some(tree) => !tree.root_node().has_error(),
            None => true,
        }
    }

    /// Parse `Name(params)` or `(r Recv) Name(params)`. Returns `None` when
    /// the signature is malformed.
    pub fn signature(&mut self, sig: &str) -> Option<Signature> {
        let wrapped = format!("package p\nfunc {} {{}}\n", sig);
        let Some(tree) = self.parse(&wrapped) else {
            return Some(fallback_signature(sig));
        };
        let root = tree.root_node();
        if root.has_error() {
            return None;
        }

        let source = wrapped.as_bytes();
        let mut cursor = root.walk();
        let decl = root
            .named_children(&mut cursor)
            .find(|n| matches!(n.kind(), "function_declaration" | "method_declaration"))?;

        let name = decl
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(source).ok())
            .map(str::to_string);
        let params = decl
            .child_by_field_name("parameters")
            .map(|list| parameter_names(list, source))
            .unwrap_or_default();

        Some(Signature { name, params })
    }

    pub fn if_condition(&mut self, cond: &str) -> bool {
        self.is_valid(&format!("package p\nfunc _() {{\nif {} {{\n}}\n}}\n", cond))
    }

    pub fn for_header(&mut self, header: &str) -> bool {
        self.is_valid(&format!("package p\nfunc _() {{\nfor {} {{\n}}\n}}\n", header))
    }

    pub fn switch_header(&mut self, expr: &str) -> bool {
        self.is_valid(&format!("package p\nfunc _() {{\nswitch {} {{\n}}\n}}\n", expr))
    }

    pub fn case_expr(&mut self, expr: &str) -> bool {
        self.is_valid(&format!("package p\nfunc _() {{\nswitch {{\ncase {}:\n}}\n}}\n", expr))
    }
}

impl Default for GoSyntax {
    fn default() -> Self {
        Self::new()
    }
}

fn parameter_names(list: Node<'_>, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = list.walk();
    for param in list.named_children(&mut cursor) {
        if !matches!(param.kind(), "parameter_declaration" | "variadic_parameter_declaration") {
            continue;
        }
        let mut inner = param.walk();
        for name in param.children_by_field_name("name", &mut inner) {
            if let Ok(text) = name.utf8_text(source) {
                names.push(text.to_string());
            }
        }
    }
    names
}

/// Best effort when no grammar is loaded
fn fallback_signature(sig: &str) -> Signature {
    let sig = sig.trim();
    let without_receiver = if sig.starts_with('(') {
        sig.find(')').map(|i| sig[i + 1..].trim_start()).unwrap_or(sig)
    } else {
        sig
    };
    let name = without_receiver
        .split(|c: char| c == '(' || c == '[')
        .next()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    Signature {
        name,
        params: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_name_and_params() {
        let mut go = GoSyntax::new();
        let sig = go.signature("Hello(name string, count int)").unwrap();
        assert_eq!(sig.name.as_deref(), Some("Hello"));
        assert_eq!(sig.params, vec!["name", "count"]);
    }

    #[test]
    fn test_method_signature() {
        let mut go = GoSyntax::new();
        let sig = go.signature("(p Page) Title()").unwrap();
        assert_eq!(sig.name.as_deref(), Some("Title"));
        assert!(sig.params.is_empty());
    }

    #[test]
    fn test_grouped_params() {
        let mut go = GoSyntax::new();
        let sig = go.signature("greet(a, b string)").unwrap();
        assert_eq!(sig.params, vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_signature() {
        let mut go = GoSyntax::new();
        assert!(go.signature("Hello(name string").is_none());
    }

    #[test]
    fn test_control_headers() {
        let mut go = GoSyntax::new();
        assert!(go.if_condition("len(items) > 0"));
        assert!(go.if_condition("err := f(); err != nil"));
        assert!(!go.if_condition("x >"));
        assert!(go.for_header("_, item := range items"));
        assert!(go.for_header("i := 0; i < 10; i++"));
        assert!(go.switch_header("x"));
        assert!(go.case_expr("1, 2"));
        assert!(!go.case_expr("1,,"));
    }

    #[test]
    fn test_fallback_signature() {
        let sig = fallback_signature("(r Recv) Name[T any](x T)");
        assert_eq!(sig.name.as_deref(), Some("Name"));
    }
}
