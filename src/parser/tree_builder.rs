use super::go::GoSyntax;
use super::positions::Span;
use super::tokenizer::{ControlKind, TemplateKind, Token};
use crate::ast::*;
use crate::error::{ErrorKind, SyntaxError};
use crate::html;
use std::sync::Arc;

/// Constructs currently open around the node being parsed
#[derive(Debug, Clone, PartialEq, Eq)]
enum Open {
    Element(String),
    If,
    For,
    Switch,
    Call,
}

impl Open {
    fn is_block(&self) -> bool {
        !matches!(self, Open::Element(_))
    }
}

/// Builds an AST from a token stream, recovering from errors as it goes
pub struct TreeBuilder {
    tokens: Vec<Token>,
    pos: usize,
    source: Arc<str>,
    go: GoSyntax,
    open: Vec<Open>,
    errors: Vec<SyntaxError>,
}

impl TreeBuilder {
    pub fn new(tokens: Vec<Token>, source: Arc<str>) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            go: GoSyntax::new(),
            open: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn build(mut self) -> (TemplateFile, Vec<SyntaxError>) {
        let mut header = Vec::new();
        let mut package = None;
        let mut nodes = Vec::new();

        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Eof { .. } => break,
                Token::GoCode { code, span } => {
                    self.advance();
                    let code = GoExpression::new(code, span);
                    if package.is_none() && nodes.is_empty() {
                        header.push(code);
                    } else {
                        nodes.push(TemplateFileNode::GoCode(code));
                    }
                }
                Token::Package { code, span } => {
                    self.advance();
                    package = Some(GoExpression::new(code, span));
                }
                Token::TemplateStart {
                    kind,
                    signature,
                    signature_span,
                    span,
                } => {
                    self.advance();
                    let signature = GoExpression::new(signature, signature_span);
                    nodes.push(match kind {
                        TemplateKind::Html => TemplateFileNode::Html(self.parse_html_template(signature, span)),
                        TemplateKind::Css => TemplateFileNode::Css(self.parse_css_template(signature, span)),
                        TemplateKind::Script => {
                            TemplateFileNode::Script(self.parse_script_template(signature, span))
                        }
                    });
                }
                other => {
                    self.advance();
                    self.errors.push(SyntaxError::new(
                        ErrorKind::UnexpectedToken,
                        "Unexpected content outside of a template",
                        other.span(),
                    ));
                }
            }
        }

        let file = TemplateFile {
            header,
            package,
            nodes,
            source: self.source,
        };
        (file, self.errors)
    }

    // === Token access ===

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// End of the last consumed token
    fn prev_end(&self) -> Position {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span().end)
            .unwrap_or_default()
    }

    fn current_span(&self) -> Span {
        self.peek()
            .map(Token::span)
            .unwrap_or_else(|| Span::point(self.prev_end()))
    }

    // === Templates ===

    /// Validate a template signature and extract what the generator needs.
    fn check_signature(&mut self, signature: &GoExpression) -> (Option<String>, Vec<String>) {
        match self.go.signature(&signature.value) {
            Some(sig) => (sig.name, sig.params),
            None => {
                self.errors.push(
                    SyntaxError::new(
                        ErrorKind::InvalidSignature,
                        format!("Invalid template signature `{}`", signature.value),
                        signature.span,
                    )
                    .with_help("Signatures look like Go functions: Name(param Type, ...)"),
                );
                let name = signature
                    .value
                    .split('(')
                    .next()
                    .map(str::trim)
                    .filter(|n| !n.is_empty() && !n.contains(' '))
                    .map(str::to_string);
                (name, Vec::new())
            }
        }
    }

    /// Consume the TemplateEnd token, reporting unclosed templates.
    fn expect_template_end(&mut self, kind: &str, open_span: Span) -> (bool, Position) {
        match self.peek().cloned() {
            Some(Token::TemplateEnd { closed, span }) => {
                self.advance();
                if !closed {
                    self.errors.push(
                        SyntaxError::new(
                            ErrorKind::UnclosedTemplate,
                            format!("This {} template is never closed", kind),
                            span,
                        )
                        .with_related(open_span)
                        .with_related_label("template starts here")
                        .with_help("Close the template with } on its own line"),
                    );
                }
                (closed, span.end)
            }
            _ => {
                self.errors.push(
                    SyntaxError::new(
                        ErrorKind::UnclosedTemplate,
                        format!("This {} template is never closed", kind),
                        self.current_span(),
                    )
                    .with_related(open_span),
                );
                (false, self.prev_end())
            }
        }
    }

    fn parse_html_template(&mut self, signature: GoExpression, open_span: Span) -> HtmlTemplate {
        let (name, _) = self.check_signature(&signature);
        self.open.clear();
        let children = self.parse_children();
        let (closed, end) = self.expect_template_end("templ", open_span);

        HtmlTemplate {
            signature,
            name,
            children,
            closed,
            span: Span::new(open_span.start, end),
        }
    }

    fn parse_css_template(&mut self, signature: GoExpression, open_span: Span) -> CssTemplate {
        let (name, _) = self.check_signature(&signature);
        let mut properties = Vec::new();

        while let Some(Token::CssProperty { name, value, span }) = self.peek().cloned() {
            self.advance();
            properties.push(CssProperty { name, value, span });
        }
        let (closed, end) = self.expect_template_end("css", open_span);

        CssTemplate {
            signature,
            name,
            properties,
            closed,
            span: Span::new(open_span.start, end),
        }
    }

    fn parse_script_template(&mut self, signature: GoExpression, open_span: Span) -> ScriptTemplate {
        let (name, params) = self.check_signature(&signature);
        let mut body = String::new();

        if let Some(Token::ScriptBody { text, .. }) = self.peek().cloned() {
            self.advance();
            body = text;
        }
        let (closed, end) = self.expect_template_end("script", open_span);

        ScriptTemplate {
            signature,
            name,
            params,
            body,
            closed,
            span: Span::new(open_span.start, end),
        }
    }

    // === Template bodies ===

    /// Parse nodes until something an enclosing construct must handle.
    fn parse_children(&mut self) -> Vec<Node> {
        let mut nodes = Vec::new();

        while let Some(token) = self.peek().cloned() {
            match token {
                Token::Eof { .. } | Token::TemplateEnd { .. } => break,

                Token::ElementClose { tag, span } => {
                    if self.open.iter().any(|o| *o == Open::Element(tag.clone())) {
                        break;
                    }
                    self.advance();
                    if html::is_void_element(&tag) {
                        self.errors.push(
                            SyntaxError::new(
                                ErrorKind::VoidElementWithContent,
                                format!("<{}> is a void element and cannot have a closing tag", tag),
                                span,
                            )
                            .with_help(format!("Remove </{}>", tag)),
                        );
                    } else {
                        self.errors.push(
                            SyntaxError::new(
                                ErrorKind::MismatchedCloseTag,
                                format!("</{}> does not close any open element", tag),
                                span,
                            )
                            .with_help(self.close_tag_help()),
                        );
                    }
                }

                Token::BlockClose { span } => {
                    if self.open.iter().any(Open::is_block) {
                        break;
                    }
                    self.advance();
                    self.errors.push(SyntaxError::new(
                        ErrorKind::UnexpectedToken,
                        "} does not close any open block",
                        span,
                    ));
                }

                Token::ElseIf { span, .. } | Token::Else { span } => {
                    if self.innermost_block() == Some(&Open::If) {
                        break;
                    }
                    self.advance();
                    self.errors.push(
                        SyntaxError::new(ErrorKind::UnexpectedToken, "else without a matching if", span)
                            .with_help("Close any elements opened inside the if block before } else {"),
                    );
                }

                Token::Case { span, .. } => {
                    if self.innermost_block() == Some(&Open::Switch) {
                        break;
                    }
                    self.advance();
                    self.errors.push(SyntaxError::new(
                        ErrorKind::UnexpectedToken,
                        "case outside of a switch",
                        span,
                    ));
                }

                _ => {
                    if let Some(node) = self.parse_node() {
                        nodes.push(node);
                    }
                }
            }
        }

        nodes
    }

    fn innermost_block(&self) -> Option<&Open> {
        self.open.iter().rev().find(|o| o.is_block())
    }

    fn close_tag_help(&self) -> String {
        match self.open.iter().rev().find_map(|o| match o {
            Open::Element(tag) => Some(tag),
            _ => None,
        }) {
            Some(tag) => format!("The innermost open element is <{}>", tag),
            None => "No element is open here".to_string(),
        }
    }

    fn parse_node(&mut self) -> Option<Node> {
        let token = self.peek()?.clone();
        self.advance();

        match token {
            Token::Text { text, span } => Some(Node::Text(TextNode {
                content: text,
                raw: false,
                span,
            })),

            Token::RawText { text, span } => Some(Node::Text(TextNode {
                content: text,
                raw: true,
                span,
            })),

            Token::Expression { code, code_span, span } => Some(Node::Expression(ExpressionNode {
                expr: GoExpression::new(code, code_span),
                span,
            })),

            Token::Children { span } => Some(Node::Children(ChildrenNode { span })),

            Token::RawGo { code, code_span, span } => Some(Node::RawGo(RawGoNode {
                code: GoExpression::new(code, code_span),
                span,
            })),

            Token::Comment { text, span } => Some(Node::Comment(CommentNode { content: text, span })),

            Token::Doctype { value, span } => Some(Node::Doctype(DoctypeNode { value, span })),

            Token::ElementOpen {
                tag,
                tag_span,
                attributes,
                self_closing,
                span,
            } => Some(self.parse_element(tag, tag_span, attributes, self_closing, span)),

            Token::Call {
                code,
                code_span,
                has_children,
                span,
            } => Some(self.parse_call(GoExpression::new(code, code_span), has_children, span)),

            Token::ControlStart {
                kind,
                header,
                header_span,
                span,
            } => {
                let header = GoExpression::new(header, header_span);
                Some(match kind {
                    ControlKind::If => self.parse_if(header, span),
                    ControlKind::For => self.parse_for(header, span),
                    ControlKind::Switch => self.parse_switch(header, span),
                })
            }

            other => {
                self.errors.push(SyntaxError::new(
                    ErrorKind::UnexpectedToken,
                    "Unexpected token in template body",
                    other.span(),
                ));
                None
            }
        }
    }

    fn parse_element(
        &mut self,
        tag: String,
        tag_span: Span,
        attributes: Vec<Attribute>,
        self_closing: bool,
        open_span: Span,
    ) -> Node {
        if self_closing || html::is_void_element(&tag) {
            return Node::Element(ElementNode {
                tag,
                tag_span,
                attributes,
                children: Vec::new(),
                self_closing,
                closed: true,
                span: open_span,
            });
        }

        self.open.push(Open::Element(tag.clone()));
        let children = self.parse_children();
        self.open.pop();

        let closed = match self.peek() {
            Some(Token::ElementClose { tag: close, .. }) if *close == tag => {
                self.advance();
                true
            }
            _ => {
                self.errors.push(
                    SyntaxError::new(
                        ErrorKind::UnclosedElement,
                        format!("<{}> is never closed", tag),
                        open_span,
                    )
                    .with_help(format!("Add </{}>", tag)),
                );
                false
            }
        };

        let end = if closed {
            self.prev_end()
        } else {
            children.last().map(|c| c.span().end).unwrap_or(open_span.end)
        };

        Node::Element(ElementNode {
            tag,
            tag_span,
            attributes,
            children,
            self_closing: false,
            closed,
            span: Span::new(open_span.start, end),
        })
    }

    /// Consume the `}` closing a block. Returns whether it was present.
    fn expect_block_close(&mut self, what: &str, open_span: Span) -> bool {
        if let Some(Token::BlockClose { .. }) = self.peek() {
            self.advance();
            return true;
        }
        self.errors.push(
            SyntaxError::new(
                ErrorKind::UnclosedBlock,
                format!("This {} block is never closed", what),
                open_span,
            )
            .with_related(self.current_span())
            .with_related_label("expected } before this")
            .with_help("Close the block with } on its own line"),
        );
        false
    }

    fn check_header(&mut self, kind: ControlKind, header: &GoExpression) {
        if header.is_empty() {
            return;
        }
        let valid = match kind {
            ControlKind::If => self.go.if_condition(&header.value),
            ControlKind::For => self.go.for_header(&header.value),
            ControlKind::Switch => self.go.switch_header(&header.value),
        };
        if !valid {
            self.errors.push(SyntaxError::new(
                ErrorKind::InvalidControlHeader,
                format!("Invalid {} header `{}`", kind.keyword(), header.value),
                header.span,
            ));
        }
    }

    fn parse_if(&mut self, condition: GoExpression, open_span: Span) -> Node {
        self.check_header(ControlKind::If, &condition);
        self.open.push(Open::If);
        let then_branch = self.parse_children();

        let mut else_ifs = Vec::new();
        let mut else_branch = None;

        loop {
            match self.peek().cloned() {
                Some(Token::ElseIf {
                    condition,
                    condition_span,
                    span,
                }) => {
                    self.advance();
                    let condition = GoExpression::new(condition, condition_span);
                    self.check_header(ControlKind::If, &condition);
                    if else_branch.is_some() {
                        self.errors.push(SyntaxError::new(
                            ErrorKind::UnexpectedToken,
                            "else if after else",
                            span,
                        ));
                    }
                    let body = self.parse_children();
                    let end = body.last().map(|n| n.span().end).unwrap_or(span.end);
                    else_ifs.push(ElseIfBranch {
                        condition,
                        body,
                        span: Span::new(span.start, end),
                    });
                }
                Some(Token::Else { span }) => {
                    self.advance();
                    if else_branch.is_some() {
                        self.errors.push(SyntaxError::new(
                            ErrorKind::UnexpectedToken,
                            "Duplicate else branch",
                            span,
                        ));
                    }
                    else_branch = Some(self.parse_children());
                }
                _ => break,
            }
        }

        self.open.pop();
        let closed = self.expect_block_close("if", open_span);

        Node::If(IfNode {
            condition,
            then_branch,
            else_ifs,
            else_branch,
            closed,
            span: Span::new(open_span.start, self.prev_end().max(open_span.end)),
        })
    }

    fn parse_for(&mut self, header: GoExpression, open_span: Span) -> Node {
        self.check_header(ControlKind::For, &header);
        self.open.push(Open::For);
        let body = self.parse_children();
        self.open.pop();
        let closed = self.expect_block_close("for", open_span);

        Node::For(ForNode {
            header,
            body,
            closed,
            span: Span::new(open_span.start, self.prev_end().max(open_span.end)),
        })
    }

    fn parse_switch(&mut self, expr: GoExpression, open_span: Span) -> Node {
        self.check_header(ControlKind::Switch, &expr);
        self.open.push(Open::Switch);

        let stray = self.parse_children();
        if let Some(node) = stray.iter().find(|n| !is_blank(n)) {
            self.errors.push(
                SyntaxError::new(
                    ErrorKind::UnexpectedToken,
                    "Content inside a switch must belong to a case",
                    node.span(),
                )
                .with_help("Add a case or default: line above it"),
            );
        }

        let mut cases = Vec::new();
        while let Some(Token::Case { expr, span }) = self.peek().cloned() {
            self.advance();
            if let Some(expr) = &expr {
                if !expr.is_empty() && !self.go.case_expr(&expr.value) {
                    self.errors.push(SyntaxError::new(
                        ErrorKind::InvalidControlHeader,
                        format!("Invalid case expression `{}`", expr.value),
                        expr.span,
                    ));
                }
            }
            let body = self.parse_children();
            let end = body.last().map(|n| n.span().end).unwrap_or(span.end);
            cases.push(CaseNode {
                expr,
                body,
                span: Span::new(span.start, end),
            });
        }

        self.open.pop();
        let closed = self.expect_block_close("switch", open_span);

        Node::Switch(SwitchNode {
            expr,
            cases,
            closed,
            span: Span::new(open_span.start, self.prev_end().max(open_span.end)),
        })
    }

    fn parse_call(&mut self, expr: GoExpression, has_children: bool, open_span: Span) -> Node {
        if !has_children {
            return Node::Call(CallNode {
                expr,
                children: None,
                closed: true,
                span: open_span,
            });
        }

        self.open.push(Open::Call);
        let children = self.parse_children();
        self.open.pop();
        let closed = self.expect_block_close("component children", open_span);

        Node::Call(CallNode {
            expr,
            children: Some(children),
            closed,
            span: Span::new(open_span.start, self.prev_end().max(open_span.end)),
        })
    }
}

fn is_blank(node: &Node) -> bool {
    matches!(node, Node::Text(t) if t.content.trim().is_empty())
}
