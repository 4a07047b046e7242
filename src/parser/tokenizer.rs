use super::positions::{Position, Span};
use crate::ast::{Attribute, AttributeKind, CssValue, GoExpression};
use crate::error::{ErrorKind, SyntaxError};
use crate::html;

/// Which kind of template a declaration line starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Html,
    Css,
    Script,
}

impl TemplateKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            TemplateKind::Html => "templ",
            TemplateKind::Css => "css",
            TemplateKind::Script => "script",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    If,
    For,
    Switch,
}

impl ControlKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            ControlKind::If => "if",
            ControlKind::For => "for",
            ControlKind::Switch => "switch",
        }
    }
}

/// Tokens produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === File structure ===
    /// Go code outside templates, passed through verbatim
    GoCode { code: String, span: Span },
    /// `package name`
    Package { code: String, span: Span },
    /// `templ Name(...) {`, `css name() {`, `script name(...) {`
    TemplateStart {
        kind: TemplateKind,
        signature: String,
        signature_span: Span,
        span: Span,
    },
    /// Closing `}` of a template, or the point where an unclosed one was cut off
    TemplateEnd { closed: bool, span: Span },
    /// End of file
    Eof { position: Position },

    // === Content ===
    Text { text: String, span: Span },
    /// Body of `<script>`/`<style>`
    RawText { text: String, span: Span },
    /// `{ expr }`
    Expression { code: String, code_span: Span, span: Span },
    /// `{ children... }`
    Children { span: Span },
    /// `{{ statements }}`
    RawGo { code: String, code_span: Span, span: Span },
    /// `@expr`, optionally opening a children block
    Call {
        code: String,
        code_span: Span,
        has_children: bool,
        span: Span,
    },

    // === Control flow ===
    ControlStart {
        kind: ControlKind,
        header: String,
        header_span: Span,
        span: Span,
    },
    /// `} else if cond {`
    ElseIf { condition: String, condition_span: Span, span: Span },
    /// `} else {`
    Else { span: Span },
    /// `case expr:` or `default:`
    Case { expr: Option<GoExpression>, span: Span },
    /// `}` closing a control block or a call's children block
    BlockClose { span: Span },

    // === HTML ===
    ElementOpen {
        tag: String,
        tag_span: Span,
        attributes: Vec<Attribute>,
        self_closing: bool,
        span: Span,
    },
    ElementClose { tag: String, span: Span },
    Comment { text: String, span: Span },
    Doctype { value: String, span: Span },

    // === css / script templates ===
    CssProperty { name: String, value: CssValue, span: Span },
    ScriptBody { text: String, span: Span },
}

impl Token {
    pub fn span(&self) -> Span {
        match self {
            Token::Eof { position } => Span::point(*position),
            Token::GoCode { span, .. }
            | Token::Package { span, .. }
            | Token::TemplateStart { span, .. }
            | Token::TemplateEnd { span, .. }
            | Token::Text { span, .. }
            | Token::RawText { span, .. }
            | Token::Expression { span, .. }
            | Token::Children { span }
            | Token::RawGo { span, .. }
            | Token::Call { span, .. }
            | Token::ControlStart { span, .. }
            | Token::ElseIf { span, .. }
            | Token::Else { span }
            | Token::Case { span, .. }
            | Token::BlockClose { span }
            | Token::ElementOpen { span, .. }
            | Token::ElementClose { span, .. }
            | Token::Comment { span, .. }
            | Token::Doctype { span, .. }
            | Token::CssProperty { span, .. }
            | Token::ScriptBody { span, .. } => *span,
        }
    }
}

/// Open brace-delimited blocks inside a template body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    If,
    For,
    Switch,
    Call,
}

/// Tokenizer for templ source files
pub struct Tokenizer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    byte: usize,
    position: Position,
    /// Start of the pending text run, if any
    text_start: Option<(usize, Position)>,
    blocks: Vec<Block>,
    seen_package: bool,
    tokens: Vec<Token>,
    errors: Vec<SyntaxError>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            byte: 0,
            position: Position::default(),
            text_start: None,
            blocks: Vec::new(),
            seen_package: false,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the entire source
    pub fn tokenize(mut self) -> (Vec<Token>, Vec<SyntaxError>) {
        let mut go_start: Option<(usize, Position)> = None;

        while !self.at_eof() {
            let line = self.peek_line();

            if let Some(kind) = template_kind(line) {
                self.flush_go(go_start.take());
                self.tokenize_template(kind);
                continue;
            }

            if !self.seen_package && line.starts_with("package ") {
                self.flush_go(go_start.take());
                let start = self.position;
                let code = line.trim_end();
                self.advance_bytes(code.len());
                self.tokens.push(Token::Package {
                    code: code.to_string(),
                    span: Span::new(start, self.position),
                });
                self.seen_package = true;
                self.skip_to_eol();
                self.consume_newline();
                continue;
            }

            if go_start.is_none() {
                go_start = Some((self.byte, self.position));
            }
            self.skip_to_eol();
            self.consume_newline();
        }

        self.flush_go(go_start);
        self.tokens.push(Token::Eof { position: self.position });
        (self.tokens, self.errors)
    }

    fn flush_go(&mut self, start: Option<(usize, Position)>) {
        let Some((start_byte, start_pos)) = start else {
            return;
        };
        let text = &self.source[start_byte..self.byte];
        let code = text.trim();
        if code.is_empty() {
            return;
        }
        let lead = text.len() - text.trim_start().len();
        let code_start = start_pos.advance(&text[..lead]);
        self.tokens.push(Token::GoCode {
            code: code.to_string(),
            span: Span::of_text(code_start, code),
        });
    }

    // === Templates ===

    fn tokenize_template(&mut self, kind: TemplateKind) {
        let start = self.position;
        let line = self.peek_line().trim_end();
        let keyword_len = kind.keyword().len();
        let inner = &line[keyword_len..line.len() - 1];
        let lead = inner.len() - inner.trim_start().len();
        let signature = inner.trim();
        let signature_start = start.advance(&line[..keyword_len + lead]);

        self.advance_bytes(line.len());
        self.tokens.push(Token::TemplateStart {
            kind,
            signature: signature.to_string(),
            signature_span: Span::of_text(signature_start, signature),
            span: Span::new(start, self.position),
        });
        self.skip_to_eol();
        self.consume_newline();

        match kind {
            TemplateKind::Html => self.tokenize_html_body(),
            TemplateKind::Css => self.tokenize_css_body(),
            TemplateKind::Script => self.tokenize_script_body(),
        }
    }

    fn end_template(&mut self, closed: bool, span: Span) {
        self.flush_text();
        self.blocks.clear();
        self.tokens.push(Token::TemplateEnd { closed, span });
    }

    fn tokenize_html_body(&mut self) {
        self.blocks.clear();

        loop {
            if self.at_eof() {
                self.end_template(false, Span::point(self.position));
                return;
            }
            if template_kind(self.peek_line()).is_some() {
                self.end_template(false, Span::point(self.position));
                return;
            }

            // Indentation is part of the surrounding text run
            self.start_text();
            self.skip_whitespace_inline();
            let trimmed = self.peek_line().trim_end();

            if trimmed.starts_with("//") {
                self.flush_text();
                self.skip_to_eol();
                self.consume_newline();
                continue;
            }

            if trimmed.starts_with('}') {
                self.flush_text();
                if self.tokenize_close_line() {
                    return;
                }
            } else if let Some(kind) = control_keyword(trimmed) {
                self.flush_text();
                self.tokenize_control_start(kind);
            } else if self.blocks.last() == Some(&Block::Switch) && is_case_line(trimmed) {
                self.flush_text();
                self.tokenize_case();
            }

            self.tokenize_content_line();
        }
    }

    /// Handle a body line starting with `}`. Returns true when it closed the
    /// template itself.
    fn tokenize_close_line(&mut self) -> bool {
        let start = self.position;
        let line = self.peek_line().trim_end();
        let after = line[1..].trim_start();

        if let Some(rest) = after.strip_prefix("else") {
            let rest = rest.trim();
            if rest == "{" {
                self.advance_bytes(line.len());
                self.tokens.push(Token::Else {
                    span: Span::new(start, self.position),
                });
                return false;
            }
            if let Some(cond) = rest.strip_prefix("if ").and_then(|r| r.strip_suffix('{')) {
                let cond_offset = line.len() - rest.len() + 3;
                let raw = &line[cond_offset..line.len() - 1];
                let lead = raw.len() - raw.trim_start().len();
                let condition = cond.trim();
                let condition_start = start.advance(&line[..cond_offset + lead]);
                self.advance_bytes(line.len());
                self.tokens.push(Token::ElseIf {
                    condition: condition.to_string(),
                    condition_span: Span::of_text(condition_start, condition),
                    span: Span::new(start, self.position),
                });
                return false;
            }
        }

        self.advance_bytes(1);
        let span = Span::new(start, self.position);
        if self.blocks.pop().is_none() {
            self.tokens.push(Token::TemplateEnd { closed: true, span });
            self.skip_to_eol();
            self.consume_newline();
            return true;
        }
        self.tokens.push(Token::BlockClose { span });
        false
    }

    fn tokenize_control_start(&mut self, kind: ControlKind) {
        let start = self.position;
        let line = self.peek_line().trim_end();
        let keyword_len = kind.keyword().len();
        let raw = &line[keyword_len..line.len() - 1];
        let lead = raw.len() - raw.trim_start().len();
        let header = raw.trim();
        let header_start = start.advance(&line[..keyword_len + lead]);

        self.advance_bytes(line.len());
        self.tokens.push(Token::ControlStart {
            kind,
            header: header.to_string(),
            header_span: Span::of_text(header_start, header),
            span: Span::new(start, self.position),
        });
        self.blocks.push(match kind {
            ControlKind::If => Block::If,
            ControlKind::For => Block::For,
            ControlKind::Switch => Block::Switch,
        });
    }

    fn tokenize_case(&mut self) {
        let start = self.position;
        let line = self.peek_line().trim_end();
        let expr = line.strip_prefix("case ").map(|rest| {
            let raw = &rest[..rest.len() - 1];
            let lead = raw.len() - raw.trim_start().len();
            let value = raw.trim();
            let value_start = start.advance(&line[..5 + lead]);
            GoExpression::new(value, Span::of_text(value_start, value))
        });
        self.advance_bytes(line.len());
        self.tokens.push(Token::Case {
            expr,
            span: Span::new(start, self.position),
        });
    }

    /// Tokenize markup up to and including the end of the current line.
    /// Constructs that span lines (tags, comments, expressions) are consumed whole.
    fn tokenize_content_line(&mut self) {
        while !self.at_eof() && !self.at_newline() {
            let rest = &self.source[self.byte..];
            let next = rest.chars().nth(1);

            if rest.starts_with("<!--") {
                self.tokenize_comment();
            } else if rest.starts_with("<!") {
                self.tokenize_doctype();
            } else if rest.starts_with("</") && rest[2..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                self.tokenize_element_close();
            } else if rest.starts_with('<') && next.is_some_and(|c| c.is_ascii_alphabetic()) {
                self.tokenize_element_open();
            } else if rest.starts_with("{{") {
                self.tokenize_raw_go();
            } else if rest.starts_with('{') {
                self.tokenize_expression();
            } else if rest.starts_with('@') && self.at_word_boundary() && next.is_some_and(is_ident_start) {
                self.tokenize_call();
            } else {
                self.start_text();
                self.advance();
            }
        }

        if self.at_newline() {
            self.start_text();
            self.consume_newline();
        }
    }

    fn tokenize_comment(&mut self) {
        self.flush_text();
        let start = self.position;
        let rest = &self.source[self.byte..];
        let len = match rest.find("-->") {
            Some(end) => end + 3,
            None => {
                let len = self.peek_line().len();
                self.errors.push(
                    SyntaxError::new(
                        ErrorKind::UnclosedElement,
                        "HTML comment is never closed",
                        Span::of_text(start, &rest[..len]),
                    )
                    .with_help("Close the comment with -->"),
                );
                len
            }
        };
        let text = &rest[..len];
        self.advance_bytes(len);
        self.tokens.push(Token::Comment {
            text: text.to_string(),
            span: Span::new(start, self.position),
        });
    }

    fn tokenize_doctype(&mut self) {
        self.flush_text();
        let start = self.position;
        let line = self.peek_line();
        let len = line.find('>').map(|i| i + 1).unwrap_or(line.len());
        let value = &line[..len];
        self.advance_bytes(len);
        self.tokens.push(Token::Doctype {
            value: value.to_string(),
            span: Span::new(start, self.position),
        });
    }

    fn tokenize_element_open(&mut self) {
        self.flush_text();
        let start = self.position;
        self.advance(); // <

        let tag_start = self.position;
        let tag = self.consume_while(is_tag_char).to_string();
        let tag_span = Span::new(tag_start, self.position);

        let mut attributes = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();

            if self.at_eof() {
                self.errors.push(
                    SyntaxError::new(
                        ErrorKind::UnexpectedToken,
                        format!("<{}> open tag is never terminated", tag),
                        Span::new(start, self.position),
                    )
                    .with_help("Close the tag with > or />"),
                );
                break;
            }

            let rest = &self.source[self.byte..];
            if rest.starts_with("/>") {
                self.advance_bytes(2);
                self_closing = true;
                break;
            }
            if rest.starts_with('>') {
                self.advance();
                break;
            }

            if let Some(attr) = self.parse_attribute() {
                attributes.push(attr);
                continue;
            }

            // Malformed: skip to the next '>'
            let bad = self.position;
            let skip = rest.find('>').unwrap_or(rest.len());
            self.advance_bytes(skip);
            self.errors.push(SyntaxError::new(
                ErrorKind::UnexpectedToken,
                format!("Unexpected content in <{}> tag", tag),
                Span::new(bad, self.position),
            ));
        }

        let raw_text = !self_closing && html::is_raw_text_element(&tag);
        self.tokens.push(Token::ElementOpen {
            tag: tag.clone(),
            tag_span,
            attributes,
            self_closing,
            span: Span::new(start, self.position),
        });

        if raw_text {
            self.tokenize_raw_text(&tag);
        }
    }

    /// Contents of `<script>`/`<style>` up to the closing tag
    fn tokenize_raw_text(&mut self, tag: &str) {
        let rest = &self.source[self.byte..];
        let needle = format!("</{}", tag.to_ascii_lowercase());
        let Some(end) = rest.to_ascii_lowercase().find(&needle) else {
            return;
        };
        if end == 0 {
            return;
        }
        let start = self.position;
        let text = &rest[..end];
        self.advance_bytes(end);
        self.tokens.push(Token::RawText {
            text: text.to_string(),
            span: Span::new(start, self.position),
        });
    }

    fn tokenize_element_close(&mut self) {
        self.flush_text();
        let start = self.position;
        self.advance_bytes(2); // </
        let tag = self.consume_while(is_tag_char).to_string();
        while !self.at_eof() && !self.at_newline() && self.peek_char() != Some('>') {
            self.advance();
        }
        if self.peek_char() == Some('>') {
            self.advance();
        }
        self.tokens.push(Token::ElementClose {
            tag,
            span: Span::new(start, self.position),
        });
    }

    fn tokenize_expression(&mut self) {
        self.flush_text();
        let start = self.position;
        let (inner, inner_start) = self.consume_braced();
        let span = Span::new(start, self.position);
        let (code, code_span) = trimmed_with_span(inner, inner_start);

        if code == "children..." {
            self.tokens.push(Token::Children { span });
        } else {
            self.tokens.push(Token::Expression {
                code: code.to_string(),
                code_span,
                span,
            });
        }
    }

    fn tokenize_raw_go(&mut self) {
        self.flush_text();
        let start = self.position;
        self.advance(); // outer {
        let (inner, inner_start) = self.consume_braced();
        if self.peek_char() == Some('}') {
            self.advance();
        } else {
            self.errors.push(SyntaxError::new(
                ErrorKind::UnclosedExpression,
                "Raw Go block is not closed with }}",
                Span::new(start, self.position),
            ));
        }
        let (code, code_span) = trimmed_with_span(inner, inner_start);
        self.tokens.push(Token::RawGo {
            code: code.to_string(),
            code_span,
            span: Span::new(start, self.position),
        });
    }

    fn tokenize_call(&mut self) {
        self.flush_text();
        let start = self.position;
        self.advance(); // @

        let code_start = self.position;
        let len = scan_call_expression(&self.source[self.byte..]);
        let code = &self.source[self.byte..self.byte + len];
        self.advance_bytes(len);
        let code_span = Span::new(code_start, self.position);

        let has_children = self.peek_line().trim() == "{";
        if has_children {
            self.skip_to_eol();
            self.blocks.push(Block::Call);
        }

        self.tokens.push(Token::Call {
            code: code.to_string(),
            code_span,
            has_children,
            span: Span::new(start, self.position),
        });
    }

    /// Consume `{ ... }` starting at the `{`. Returns the inner text and its
    /// start position. An unterminated expression ends at end of line.
    fn consume_braced(&mut self) -> (&'a str, Position) {
        let start = self.position;
        self.advance(); // {
        let inner_start = self.position;
        let inner_byte = self.byte;
        let rest = &self.source[self.byte..];

        match find_closing_brace(rest, true) {
            Some(end) => {
                self.advance_bytes(end);
                self.advance(); // }
                (&self.source[inner_byte..inner_byte + end], inner_start)
            }
            None => {
                let len = self.peek_line().len();
                self.advance_bytes(len);
                self.errors.push(
                    SyntaxError::new(
                        ErrorKind::UnclosedExpression,
                        "Expression is never closed",
                        Span::new(start, self.position),
                    )
                    .with_help("Close the expression with }"),
                );
                (&self.source[inner_byte..inner_byte + len], inner_start)
            }
        }
    }

    // === Attributes ===

    fn parse_attribute(&mut self) -> Option<Attribute> {
        let start = self.position;
        let rest = &self.source[self.byte..];

        if rest.starts_with('{') {
            let (inner, inner_start) = self.consume_braced();
            let (code, code_span) = trimmed_with_span(inner, inner_start);
            let expr = match code.strip_suffix("...") {
                Some(value) => {
                    let value = value.trim_end();
                    GoExpression::new(value, Span::of_text(code_span.start, value))
                }
                None => {
                    self.errors.push(
                        SyntaxError::new(
                            ErrorKind::UnexpectedToken,
                            "Attribute spread must end with ...",
                            Span::new(start, self.position),
                        )
                        .with_help("Write { attrs... }"),
                    );
                    GoExpression::new(code, code_span)
                }
            };
            return Some(Attribute {
                kind: AttributeKind::Spread { expr },
                span: Span::new(start, self.position),
            });
        }

        if rest.starts_with("if ") {
            return Some(self.parse_conditional_attribute());
        }

        if !rest.starts_with(is_attr_name_char) {
            return None;
        }

        let name = self.consume_while(is_attr_name_char).to_string();
        let rest = &self.source[self.byte..];

        let kind = if rest.starts_with("?={") {
            self.advance_bytes(2);
            let (inner, inner_start) = self.consume_braced();
            let (code, span) = trimmed_with_span(inner, inner_start);
            AttributeKind::BooleanExpression {
                name,
                expr: GoExpression::new(code, span),
            }
        } else if rest.starts_with("={") {
            self.advance();
            let (inner, inner_start) = self.consume_braced();
            let (code, span) = trimmed_with_span(inner, inner_start);
            AttributeKind::Expression {
                name,
                expr: GoExpression::new(code, span),
            }
        } else if rest.starts_with("=\"") || rest.starts_with("='") {
            self.advance(); // =
            let quote = self.peek_char().unwrap_or('"');
            self.advance();
            let value = self.consume_until(quote).to_string();
            if self.peek_char() == Some(quote) {
                self.advance();
            }
            AttributeKind::Constant { name, value }
        } else if rest.starts_with('=') {
            self.advance();
            let value = self
                .consume_while(|c| !c.is_whitespace() && c != '>' && c != '/')
                .to_string();
            AttributeKind::Constant { name, value }
        } else {
            AttributeKind::Boolean { name }
        };

        Some(Attribute {
            kind,
            span: Span::new(start, self.position),
        })
    }

    /// `if cond { attrs } else { attrs }`
    fn parse_conditional_attribute(&mut self) -> Attribute {
        let start = self.position;
        self.advance_bytes(3); // if + space

        let cond_start = self.position;
        let line = self.peek_line();
        let cond_len = line.find('{').unwrap_or(line.len());
        let raw = &line[..cond_len];
        self.advance_bytes(cond_len);
        let (condition, condition_span) = trimmed_with_span(raw, cond_start);
        let condition = GoExpression::new(condition, condition_span);

        let then = self.parse_attribute_block();
        let mut otherwise = Vec::new();

        let checkpoint = (self.byte, self.position);
        self.skip_whitespace();
        if self.source[self.byte..].starts_with("else") {
            self.advance_bytes(4);
            self.skip_whitespace();
            otherwise = self.parse_attribute_block();
        } else {
            (self.byte, self.position) = checkpoint;
        }

        Attribute {
            kind: AttributeKind::Conditional {
                condition,
                then,
                otherwise,
            },
            span: Span::new(start, self.position),
        }
    }

    /// `{ attrs }` inside a conditional attribute
    fn parse_attribute_block(&mut self) -> Vec<Attribute> {
        let mut attributes = Vec::new();
        let open = self.position;
        if self.peek_char() != Some('{') {
            self.errors.push(SyntaxError::new(
                ErrorKind::UnexpectedToken,
                "Expected { after conditional attribute",
                Span::point(open),
            ));
            return attributes;
        }
        self.advance();

        loop {
            self.skip_whitespace();
            match self.peek_char() {
                Some('}') => {
                    self.advance();
                    break;
                }
                Some('>') | None => {
                    self.errors.push(
                        SyntaxError::new(
                            ErrorKind::UnclosedBlock,
                            "Conditional attribute block is never closed",
                            Span::point(self.position),
                        )
                        .with_related(Span::new(open, open.advance("{"))),
                    );
                    break;
                }
                Some(_) => match self.parse_attribute() {
                    Some(attr) => attributes.push(attr),
                    None => {
                        let bad = self.position;
                        self.advance();
                        self.errors.push(SyntaxError::new(
                            ErrorKind::UnexpectedToken,
                            "Unexpected character in conditional attributes",
                            Span::new(bad, self.position),
                        ));
                    }
                },
            }
        }

        attributes
    }

    // === css / script bodies ===

    fn tokenize_css_body(&mut self) {
        loop {
            if self.at_eof() || template_kind(self.peek_line()).is_some() {
                self.end_template(false, Span::point(self.position));
                return;
            }

            self.skip_whitespace_inline();
            let start = self.position;
            let line = self.peek_line().trim_end();

            if line.starts_with('}') {
                self.advance();
                self.end_template(true, Span::new(start, self.position));
                self.skip_to_eol();
                self.consume_newline();
                return;
            }

            if line.is_empty() || line.starts_with("//") {
                self.skip_to_eol();
                self.consume_newline();
                continue;
            }

            match line.find(':') {
                Some(colon) => {
                    let name = line[..colon].trim().to_string();
                    let raw = line[colon + 1..].trim_end().trim_end_matches(';');
                    let lead = raw.len() - raw.trim_start().len();
                    let value_text = raw.trim();
                    let value_start = start.advance(&line[..colon + 1 + lead]);

                    let value = if let Some(inner) =
                        value_text.strip_prefix('{').and_then(|v| v.strip_suffix('}'))
                    {
                        let (code, span) = trimmed_with_span(inner, value_start.advance("{"));
                        CssValue::Expression(GoExpression::new(code, span))
                    } else {
                        CssValue::Constant(value_text.to_string())
                    };

                    self.advance_bytes(line.len());
                    self.tokens.push(Token::CssProperty {
                        name,
                        value,
                        span: Span::new(start, self.position),
                    });
                }
                None => {
                    self.advance_bytes(line.len());
                    self.errors.push(
                        SyntaxError::new(
                            ErrorKind::UnexpectedToken,
                            "Expected a CSS property",
                            Span::new(start, self.position),
                        )
                        .with_help("Write name: value;"),
                    );
                }
            }
            self.skip_to_eol();
            self.consume_newline();
        }
    }

    fn tokenize_script_body(&mut self) {
        let start = self.position;
        let rest = &self.source[self.byte..];

        match find_closing_brace(rest, false) {
            Some(end) => {
                let body = &rest[..end];
                self.advance_bytes(end);
                self.tokens.push(Token::ScriptBody {
                    text: body.to_string(),
                    span: Span::new(start, self.position),
                });
                let close = self.position;
                self.advance();
                self.end_template(true, Span::new(close, self.position));
                self.skip_to_eol();
                self.consume_newline();
            }
            None => {
                self.advance_bytes(rest.len());
                self.tokens.push(Token::ScriptBody {
                    text: rest.to_string(),
                    span: Span::new(start, self.position),
                });
                self.end_template(false, Span::point(self.position));
            }
        }
    }

    // === Text runs ===

    fn start_text(&mut self) {
        if self.text_start.is_none() {
            self.text_start = Some((self.byte, self.position));
        }
    }

    fn flush_text(&mut self) {
        if let Some((start_byte, start_pos)) = self.text_start.take() {
            if start_byte < self.byte {
                self.tokens.push(Token::Text {
                    text: self.source[start_byte..self.byte].to_string(),
                    span: Span::new(start_pos, self.position),
                });
            }
        }
    }

    // === Low-level helpers ===

    fn at_eof(&self) -> bool {
        self.byte >= self.bytes.len()
    }

    fn at_newline(&self) -> bool {
        !self.at_eof() && matches!(self.bytes[self.byte], b'\n' | b'\r')
    }

    /// `@` only starts a call at the start of a word
    fn at_word_boundary(&self) -> bool {
        self.byte == 0 || matches!(self.bytes[self.byte - 1], b' ' | b'\t' | b'\n' | b'\r' | b'>')
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.byte..].chars().next()
    }

    /// Rest of the current line, without the line terminator
    fn peek_line(&self) -> &'a str {
        let rest = &self.source[self.byte..];
        let end = rest.find(['\n', '\r']).unwrap_or(rest.len());
        &rest[..end]
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.byte += ch.len_utf8();
            if ch == '\n' {
                self.position.line += 1;
                self.position.col = 0;
            } else {
                self.position.col += ch.len_utf16() as u32;
            }
        }
    }

    fn advance_bytes(&mut self, len: usize) {
        let end = (self.byte + len).min(self.bytes.len());
        self.position = self.position.advance(&self.source[self.byte..end]);
        self.byte = end;
    }

    fn consume_newline(&mut self) {
        if self.peek_char() == Some('\r') {
            self.advance();
        }
        if self.peek_char() == Some('\n') {
            self.advance();
        }
    }

    fn skip_to_eol(&mut self) {
        let len = self.peek_line().len();
        self.advance_bytes(len);
    }

    fn skip_whitespace_inline(&mut self) {
        while matches!(self.peek_char(), Some(' ') | Some('\t')) {
            self.advance();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn consume_until(&mut self, stop: char) -> &'a str {
        let start = self.byte;
        while !self.at_eof() && self.peek_char() != Some(stop) {
            self.advance();
        }
        &self.source[start..self.byte]
    }

    fn consume_while<F: Fn(char) -> bool>(&mut self, pred: F) -> &'a str {
        let start = self.byte;
        while self.peek_char().is_some_and(&pred) {
            self.advance();
        }
        &self.source[start..self.byte]
    }
}

/// Template declarations start at column 0 and end their line with `{`.
fn template_kind(line: &str) -> Option<TemplateKind> {
    let trimmed = line.trim_end();
    if !trimmed.ends_with('{') || !trimmed.contains('(') {
        return None;
    }
    [TemplateKind::Html, TemplateKind::Css, TemplateKind::Script]
        .into_iter()
        .find(|kind| {
            trimmed
                .strip_prefix(kind.keyword())
                .is_some_and(|rest| rest.starts_with(' '))
        })
}

/// Control keywords only count on a line ending with `{`.
fn control_keyword(trimmed: &str) -> Option<ControlKind> {
    if !trimmed.ends_with('{') {
        return None;
    }
    [ControlKind::If, ControlKind::For, ControlKind::Switch]
        .into_iter()
        .find(|kind| {
            trimmed
                .strip_prefix(kind.keyword())
                .is_some_and(|rest| rest.starts_with([' ', '{']))
        })
}

fn is_case_line(trimmed: &str) -> bool {
    trimmed == "default:" || (trimmed.starts_with("case ") && trimmed.ends_with(':'))
}

fn is_tag_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':' || c == '.'
}

fn is_attr_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '@' | '.')
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Trim `text` and return the trimmed slice with its exact span.
fn trimmed_with_span(text: &str, start: Position) -> (&str, Span) {
    let lead = text.len() - text.trim_start().len();
    let trimmed = text.trim();
    (trimmed, Span::of_text(start.advance(&text[..lead]), trimmed))
}

/// Byte offset of the `}` matching an already-consumed `{`, skipping string,
/// rune and raw string literals. With `stop_at_markup`, gives up when the
/// text runs into a line that can't continue an expression (one starting
/// with markup, a lone `}` or a template declaration).
pub(crate) fn find_closing_brace(text: &str, stop_at_markup: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 1usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'\n' if stop_at_markup => {
                let next = text[i + 1..].split(['\n', '\r']).next().unwrap_or("");
                let trimmed = next.trim();
                if trimmed.starts_with('<') || trimmed == "}" || template_kind(next).is_some() {
                    return None;
                }
            }
            _ => {}
        }
        i += 1;
    }

    None
}

/// Length of a component call expression: balanced brackets, stopping at
/// whitespace or markup at depth zero, or at a `{` that opens a children block.
fn scan_call_expression(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'"' | b'\'' | b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    if bytes[i] == b'\\' && b != b'`' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'(' | b'[' => depth += 1,
            b'{' if depth == 0 => {
                let after = text[i + 1..].split(['\n', '\r']).next().unwrap_or("");
                if after.trim().is_empty() {
                    return i;
                }
                depth += 1;
            }
            b'{' => depth += 1,
            b')' | b']' | b'}' => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
            b' ' | b'\t' | b'\n' | b'\r' | b'<' if depth == 0 => return i,
            _ => {}
        }
        i += 1;
    }

    bytes.len()
}

/// Tokenize source code
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<SyntaxError>) {
    Tokenizer::new(source).tokenize()
}
