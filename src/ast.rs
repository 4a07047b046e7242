use std::sync::Arc;

// Re-export Position and Span so the rest of the crate has a single source
// of truth for locations.
pub use crate::parser::positions::{Position, Span};

/// A parsed `.templ` file.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateFile {
    /// Go text before the package clause (build constraints, comments).
    pub header: Vec<GoExpression>,
    /// The `package` clause, if present.
    pub package: Option<GoExpression>,
    pub nodes: Vec<TemplateFileNode>,
    pub source: Arc<str>,
}

impl TemplateFile {
    pub fn templates(&self) -> impl Iterator<Item = &HtmlTemplate> {
        self.nodes.iter().filter_map(|n| match n {
            TemplateFileNode::Html(t) => Some(t),
            _ => None,
        })
    }
}

/// Top-level item of a template file.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateFileNode {
    /// Go code passed through verbatim.
    GoCode(GoExpression),
    Html(HtmlTemplate),
    Css(CssTemplate),
    Script(ScriptTemplate),
}

impl TemplateFileNode {
    pub fn span(&self) -> Span {
        match self {
            TemplateFileNode::GoCode(code) => code.span,
            TemplateFileNode::Html(t) => t.span,
            TemplateFileNode::Css(t) => t.span,
            TemplateFileNode::Script(t) => t.span,
        }
    }
}

/// A snippet of Go copied verbatim into the output. The span covers exactly
/// `value`, so positions inside it translate one-to-one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoExpression {
    pub value: String,
    pub span: Span,
}

impl GoExpression {
    pub fn new(value: impl Into<String>, span: Span) -> Self {
        Self {
            value: value.into(),
            span,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

/// `templ Name(params) { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlTemplate {
    /// `Name(params)` or `(r Receiver) Name(params)`.
    pub signature: GoExpression,
    pub name: Option<String>,
    pub children: Vec<Node>,
    pub closed: bool,
    pub span: Span,
}

/// `css name() { prop: value; }`
#[derive(Debug, Clone, PartialEq)]
pub struct CssTemplate {
    pub signature: GoExpression,
    pub name: Option<String>,
    pub properties: Vec<CssProperty>,
    pub closed: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CssProperty {
    pub name: String,
    pub value: CssValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CssValue {
    Constant(String),
    Expression(GoExpression),
}

/// `script name(params) { js }`
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptTemplate {
    pub signature: GoExpression,
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: String,
    pub closed: bool,
    pub span: Span,
}

/// Template body node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Markup
    Element(ElementNode),
    Text(TextNode),
    Comment(CommentNode),
    Doctype(DoctypeNode),

    // Go
    Expression(ExpressionNode),
    Children(ChildrenNode),
    RawGo(RawGoNode),
    Call(CallNode),

    // Control flow
    If(IfNode),
    For(ForNode),
    Switch(SwitchNode),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Element(n) => n.span,
            Node::Text(n) => n.span,
            Node::Comment(n) => n.span,
            Node::Doctype(n) => n.span,
            Node::Expression(n) => n.span,
            Node::Children(n) => n.span,
            Node::RawGo(n) => n.span,
            Node::Call(n) => n.span,
            Node::If(n) => n.span,
            Node::For(n) => n.span,
            Node::Switch(n) => n.span,
        }
    }
}

/// HTML element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub tag_span: Span,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub self_closing: bool,
    /// False when the element was never closed in the source.
    pub closed: bool,
    pub span: Span,
}

/// Text content
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub content: String,
    /// Content of `<script>`/`<style>`; written byte for byte.
    pub raw: bool,
    pub span: Span,
}

/// `<!-- ... -->`
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub content: String,
    pub span: Span,
}

/// `<!DOCTYPE html>`
#[derive(Debug, Clone, PartialEq)]
pub struct DoctypeNode {
    pub value: String,
    pub span: Span,
}

/// `{ expr }`
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionNode {
    pub expr: GoExpression,
    pub span: Span,
}

/// `{ children... }`
#[derive(Debug, Clone, PartialEq)]
pub struct ChildrenNode {
    pub span: Span,
}

/// `{{ statements }}`
#[derive(Debug, Clone, PartialEq)]
pub struct RawGoNode {
    pub code: GoExpression,
    pub span: Span,
}

/// `@component(args)` with an optional `{ ... }` children block
#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    pub expr: GoExpression,
    pub children: Option<Vec<Node>>,
    pub closed: bool,
    pub span: Span,
}

/// if / else if / else
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: GoExpression,
    pub then_branch: Vec<Node>,
    pub else_ifs: Vec<ElseIfBranch>,
    pub else_branch: Option<Vec<Node>>,
    pub closed: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIfBranch {
    pub condition: GoExpression,
    pub body: Vec<Node>,
    pub span: Span,
}

/// for loop; `header` is everything between `for` and `{`
#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub header: GoExpression,
    pub body: Vec<Node>,
    pub closed: bool,
    pub span: Span,
}

/// switch / case / default
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchNode {
    pub expr: GoExpression,
    pub cases: Vec<CaseNode>,
    pub closed: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseNode {
    /// `None` for `default:`
    pub expr: Option<GoExpression>,
    pub body: Vec<Node>,
    pub span: Span,
}

/// Attribute on an element
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub kind: AttributeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    /// Static: class="foo"
    Constant { name: String, value: String },

    /// Boolean: disabled
    Boolean { name: String },

    /// Boolean with condition: disabled?={ expr }
    BooleanExpression { name: String, expr: GoExpression },

    /// Dynamic: class={ expr }
    Expression { name: String, expr: GoExpression },

    /// Spread: { attrs... }
    Spread { expr: GoExpression },

    /// Conditional: if cond { attrs } else { attrs }
    Conditional {
        condition: GoExpression,
        then: Vec<Attribute>,
        otherwise: Vec<Attribute>,
    },
}

impl AttributeKind {
    pub fn name(&self) -> Option<&str> {
        match self {
            AttributeKind::Constant { name, .. }
            | AttributeKind::Boolean { name }
            | AttributeKind::BooleanExpression { name, .. }
            | AttributeKind::Expression { name, .. } => Some(name),
            AttributeKind::Spread { .. } | AttributeKind::Conditional { .. } => None,
        }
    }
}
