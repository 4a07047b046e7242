use super::output::Output;
use super::{GenerateOptions, GenerateResult, Generator};
use crate::ast::*;
use crate::error::GenerationError;
use crate::html;
use crate::transform::{TemplateMetadata, TransformMetadata};
use sha2::{Digest, Sha256};

const BUFFER: &str = "templ_7745c5c3_Buffer";
const ERR: &str = "templ_7745c5c3_Err";

/// Go code generator
pub struct GoGenerator;

impl Generator for GoGenerator {
    fn generate(&self, file: &TemplateFile, metadata: &TransformMetadata, options: &GenerateOptions) -> GenerateResult {
        let mut emitter = Emitter::new(options);
        emitter.emit_file(file, metadata);
        let (code, source_map) = emitter.out.finish();
        GenerateResult {
            code,
            source_map,
            errors: emitter.errors,
        }
    }
}

struct Emitter<'a> {
    options: &'a GenerateOptions,
    out: Output,
    /// Static markup waiting to be written in one WriteString call
    pending: String,
    var_counter: usize,
    /// Variable holding the current template's children component
    children_var: Option<String>,
    errors: Vec<GenerationError>,
}

impl<'a> Emitter<'a> {
    fn new(options: &'a GenerateOptions) -> Self {
        Self {
            options,
            out: Output::new(),
            pending: String::new(),
            var_counter: 0,
            children_var: None,
            errors: Vec::new(),
        }
    }

    fn next_var(&mut self) -> String {
        self.var_counter += 1;
        format!("templ_7745c5c3_Var{}", self.var_counter)
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(GenerationError::new(message, span));
    }

    // === File level ===

    fn emit_file(&mut self, file: &TemplateFile, metadata: &TransformMetadata) {
        self.out.line("// Code generated by templ - DO NOT EDIT.");
        self.out.newline();
        if self.options.include_version {
            self.out.line(&format!("// templ: version: v{}", crate::VERSION));
        }
        if self.options.include_timestamp {
            self.out.line(&format!("// templ: timestamp: {}", chrono::Utc::now().to_rfc3339()));
        }

        for code in &file.header {
            self.out.push_mapped(&code.value, code.span);
            self.out.newline();
            self.out.newline();
        }

        match &file.package {
            Some(package) => self.out.push_mapped(&package.value, package.span),
            None => {
                self.error("Missing package clause", Span::default());
                self.out.push("package main");
            }
        }
        self.out.newline();
        self.out.newline();

        if metadata.has_calls() {
            self.out
                .line("//lint:file-ignore SA4006 This context is only used if a nested component is present.");
            self.out.newline();
        }

        let runtime = &self.options.runtime_import;
        self.out.line(&format!("import \"{}\"", runtime));
        self.out.line(&format!("import templruntime \"{}/runtime\"", runtime));
        self.out.newline();

        for (index, node) in file.nodes.iter().enumerate() {
            match node {
                TemplateFileNode::GoCode(code) => {
                    self.out.push_mapped(&code.value, code.span);
                    self.out.newline();
                    self.out.newline();
                }
                TemplateFileNode::Html(template) => self.emit_html_template(template, &metadata.template(index)),
                TemplateFileNode::Css(template) => self.emit_css_template(template),
                TemplateFileNode::Script(template) => self.emit_script_template(template),
            }
        }

        self.out.line("var _ = templruntime.GeneratedTemplate");
    }

    // === HTML templates ===

    fn emit_html_template(&mut self, template: &HtmlTemplate, metadata: &TemplateMetadata) {
        self.out.push("func ");
        self.out.push_mapped(&template.signature.value, template.signature.span);
        self.out.line(" templ.Component {");
        self.out.indent();

        self.open_component_closure("return templruntime.GeneratedTemplate(", true);
        if metadata.uses_children {
            let children = self.next_var();
            self.out.line(&format!("{} := templ.GetChildren(ctx)", children));
            self.out.line(&format!("if {} == nil {{", children));
            self.out.indent();
            self.out.line(&format!("{} = templ.NopComponent", children));
            self.out.dedent();
            self.out.line("}");
            self.children_var = Some(children);
        }
        if !metadata.call_sites.is_empty() {
            self.out.line("ctx = templ.ClearChildren(ctx)");
        }

        self.emit_nodes(&template.children);
        self.flush();
        self.children_var = None;

        self.close_component_closure("})");
        self.out.dedent();
        self.out.line("}");
        self.out.newline();

        self.missing_brace(template.closed, "Template", template.span);
    }

    /// Open a GeneratedTemplate closure with the buffer setup boilerplate.
    fn open_component_closure(&mut self, prefix: &str, check_ctx: bool) {
        self.out.line(&format!(
            "{}func(templ_7745c5c3_Input templruntime.GeneratedComponentInput) ({} error) {{",
            prefix, ERR
        ));
        self.out.indent();
        self.out
            .line("templ_7745c5c3_W, ctx := templ_7745c5c3_Input.Writer, templ_7745c5c3_Input.Context");
        if check_ctx {
            self.out.line("if templ_7745c5c3_CtxErr := ctx.Err(); templ_7745c5c3_CtxErr != nil {");
            self.out.indent();
            self.out.line("return templ_7745c5c3_CtxErr");
            self.out.dedent();
            self.out.line("}");
        }
        self.out.line(&format!(
            "{}, templ_7745c5c3_IsBuffer := templruntime.GetBuffer(templ_7745c5c3_W)",
            BUFFER
        ));
        self.out.line("if !templ_7745c5c3_IsBuffer {");
        self.out.indent();
        self.out.line("defer func() {");
        self.out.indent();
        self.out
            .line(&format!("templ_7745c5c3_BufErr := templruntime.ReleaseBuffer({})", BUFFER));
        self.out.line(&format!("if {} == nil {{", ERR));
        self.out.indent();
        self.out.line(&format!("{} = templ_7745c5c3_BufErr", ERR));
        self.out.dedent();
        self.out.line("}");
        self.out.dedent();
        self.out.line("}()");
        self.out.dedent();
        self.out.line("}");
        self.out.line("ctx = templ.InitializeContext(ctx)");
    }

    fn close_component_closure(&mut self, suffix: &str) {
        self.out.line("return nil");
        self.out.dedent();
        self.out.line(suffix);
    }

    fn check_err(&mut self) {
        self.out.line(&format!("if {} != nil {{", ERR));
        self.out.indent();
        self.out.line(&format!("return {}", ERR));
        self.out.dedent();
        self.out.line("}");
    }

    /// Write pending static markup
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        self.out.line(&format!(
            "_, {} = {}.WriteString({})",
            ERR,
            BUFFER,
            go_string_literal(&text)
        ));
        self.check_err();
    }

    fn emit_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.emit_node(node);
        }
    }

    fn emit_node(&mut self, node: &Node) {
        match node {
            Node::Text(text) => {
                if text.raw {
                    self.pending.push_str(&text.content);
                } else if let Some(normalized) = normalize_text(&text.content, text.span.start.col == 0) {
                    self.pending.push_str(&normalized);
                }
            }
            Node::Comment(comment) => self.pending.push_str(&comment.content),
            Node::Doctype(doctype) => self.pending.push_str(&doctype.value),
            Node::Element(element) => self.emit_element(element),
            Node::Expression(expr) => {
                if expr.expr.is_empty() {
                    self.error("Empty expression", expr.span);
                    return;
                }
                self.emit_string_expression(&expr.expr);
            }
            Node::Children(children) => {
                let var = match &self.children_var {
                    Some(var) => var.clone(),
                    None => {
                        self.error("children... used outside of a template body", children.span);
                        return;
                    }
                };
                self.flush();
                self.out.line(&format!("{} = {}.Render(ctx, {})", ERR, var, BUFFER));
                self.check_err();
            }
            Node::RawGo(raw) => {
                self.flush();
                if raw.code.is_empty() {
                    return;
                }
                self.out.push_mapped(&raw.code.value, raw.code.span);
                self.out.newline();
            }
            Node::Call(call) => self.emit_call(call),
            Node::If(node) => self.emit_if(node),
            Node::For(node) => self.emit_for(node),
            Node::Switch(node) => self.emit_switch(node),
        }
    }

    fn emit_element(&mut self, element: &ElementNode) {
        self.pending.push('<');
        self.pending.push_str(&element.tag);
        self.emit_attributes(&element.attributes);
        self.pending.push('>');

        if html::is_void_element(&element.tag) {
            return;
        }
        self.emit_nodes(&element.children);
        self.pending.push_str("</");
        self.pending.push_str(&element.tag);
        self.pending.push('>');
    }

    fn emit_attributes(&mut self, attributes: &[Attribute]) {
        for attr in attributes {
            match &attr.kind {
                AttributeKind::Constant { name, value } => {
                    self.pending.push_str(&format!(" {}=\"{}\"", name, html::escape_attribute_value(value)));
                }
                AttributeKind::Boolean { name } => {
                    self.pending.push(' ');
                    self.pending.push_str(name);
                }
                AttributeKind::BooleanExpression { name, expr } => {
                    if expr.is_empty() {
                        self.error("Empty boolean attribute expression", attr.span);
                        continue;
                    }
                    self.flush();
                    self.out.push("if ");
                    self.out.push_mapped(&expr.value, expr.span);
                    self.out.line(" {");
                    self.out.indent();
                    self.pending.push(' ');
                    self.pending.push_str(name);
                    self.flush();
                    self.out.dedent();
                    self.out.line("}");
                }
                AttributeKind::Expression { name, expr } => {
                    if expr.is_empty() {
                        self.error("Empty attribute expression", attr.span);
                        continue;
                    }
                    self.pending.push_str(&format!(" {}=\"", name));
                    self.emit_string_expression(expr);
                    self.pending.push('"');
                }
                AttributeKind::Spread { expr } => {
                    if expr.is_empty() {
                        self.error("Empty attribute spread", attr.span);
                        continue;
                    }
                    self.flush();
                    self.out
                        .push(&format!("{} = templ.RenderAttributes(ctx, {}, ", ERR, BUFFER));
                    self.out.push_mapped(&expr.value, expr.span);
                    self.out.line(")");
                    self.check_err();
                }
                AttributeKind::Conditional {
                    condition,
                    then,
                    otherwise,
                } => {
                    self.flush();
                    self.emit_condition("if ", condition, attr.span);
                    self.out.indent();
                    self.emit_attributes(then);
                    self.flush();
                    self.out.dedent();
                    if !otherwise.is_empty() {
                        self.out.line("} else {");
                        self.out.indent();
                        self.emit_attributes(otherwise);
                        self.flush();
                        self.out.dedent();
                    }
                    self.out.line("}");
                }
            }
        }
    }

    /// Evaluate a Go string expression and write it HTML-escaped.
    fn emit_string_expression(&mut self, expr: &GoExpression) {
        self.flush();
        let var = self.next_var();
        self.out.line(&format!("var {} string", var));
        self.out.push(&format!("{}, {} = templ.JoinStringErrs(", var, ERR));
        self.out.push_mapped(&expr.value, expr.span);
        self.out.line(")");
        self.out.line(&format!("if {} != nil {{", ERR));
        self.out.indent();
        self.out.line(&format!(
            "return templ.Error{{Err: {}, FileName: {}, Line: {}, Col: {}}}",
            ERR,
            go_string_literal(&self.options.file_name),
            expr.span.start.line,
            expr.span.start.col
        ));
        self.out.dedent();
        self.out.line("}");
        self.out.line(&format!(
            "_, {} = {}.WriteString(templ.EscapeString({}))",
            ERR, BUFFER, var
        ));
        self.check_err();
    }

    /// `<keyword><condition> {` with the condition mapped. An empty
    /// condition is reported and replaced so the output still compiles.
    fn emit_condition(&mut self, keyword: &str, condition: &GoExpression, span: Span) {
        self.out.push(keyword);
        if condition.is_empty() {
            self.error(format!("Empty {}condition", keyword.trim_start_matches("} else ")), span);
            self.out.push("false");
        } else {
            self.out.push_mapped(&condition.value, condition.span);
        }
        self.out.line(" {");
    }

    fn missing_brace(&mut self, closed: bool, what: &str, span: Span) {
        if !closed {
            self.errors
                .push(GenerationError::missing_brace(format!("{} is missing its closing brace", what), span));
        }
    }

    fn emit_call(&mut self, call: &CallNode) {
        if call.expr.is_empty() {
            self.error("Empty component call", call.span);
            return;
        }
        self.flush();

        let Some(children) = &call.children else {
            self.out.push(&format!("{} = ", ERR));
            self.out.push_mapped(&call.expr.value, call.expr.span);
            self.out.line(&format!(".Render(ctx, {})", BUFFER));
            self.check_err();
            return;
        };

        let var = self.next_var();
        self.open_component_closure(&format!("{} := templruntime.GeneratedTemplate(", var), false);
        // The closure captures the enclosing template's children variable
        self.emit_nodes(children);
        self.flush();
        self.close_component_closure("})");

        self.out.push(&format!("{} = ", ERR));
        self.out.push_mapped(&call.expr.value, call.expr.span);
        self.out
            .line(&format!(".Render(templ.WithChildren(ctx, {}), {})", var, BUFFER));
        self.check_err();
        self.missing_brace(call.closed, "Component children block", call.span);
    }

    fn emit_if(&mut self, node: &IfNode) {
        self.flush();
        self.emit_condition("if ", &node.condition, node.span);
        self.out.indent();
        self.emit_nodes(&node.then_branch);
        self.flush();
        self.out.dedent();

        for branch in &node.else_ifs {
            self.emit_condition("} else if ", &branch.condition, branch.span);
            self.out.indent();
            self.emit_nodes(&branch.body);
            self.flush();
            self.out.dedent();
        }

        if let Some(else_branch) = &node.else_branch {
            self.out.line("} else {");
            self.out.indent();
            self.emit_nodes(else_branch);
            self.flush();
            self.out.dedent();
        }
        self.out.line("}");
        self.missing_brace(node.closed, "if block", node.span);
    }

    fn emit_for(&mut self, node: &ForNode) {
        self.flush();
        self.out.push("for ");
        if !node.header.is_empty() {
            self.out.push_mapped(&node.header.value, node.header.span);
            self.out.push(" ");
        }
        self.out.line("{");
        self.out.indent();
        self.emit_nodes(&node.body);
        self.flush();
        self.out.dedent();
        self.out.line("}");
        self.missing_brace(node.closed, "for block", node.span);
    }

    fn emit_switch(&mut self, node: &SwitchNode) {
        self.flush();
        self.out.push("switch ");
        if !node.expr.is_empty() {
            self.out.push_mapped(&node.expr.value, node.expr.span);
            self.out.push(" ");
        }
        self.out.line("{");

        let mut seen_default = false;
        for case in &node.cases {
            match &case.expr {
                Some(expr) => {
                    self.out.push("case ");
                    if expr.is_empty() {
                        self.error("Empty case expression", case.span);
                        self.out.push("false");
                    } else {
                        self.out.push_mapped(&expr.value, expr.span);
                    }
                    self.out.line(":");
                }
                None if seen_default => {
                    self.error("Switch has more than one default case", case.span);
                    continue;
                }
                None => {
                    seen_default = true;
                    self.out.line("default:");
                }
            }
            self.out.indent();
            self.emit_nodes(&case.body);
            self.flush();
            self.out.dedent();
        }

        self.out.line("}");
        self.missing_brace(node.closed, "switch block", node.span);
    }

    // === css templates ===

    fn emit_css_template(&mut self, template: &CssTemplate) {
        let name = template.name.clone().unwrap_or_default();
        self.out.push("func ");
        self.out.push_mapped(&template.signature.value, template.signature.span);
        self.out.line(" templ.CSSClass {");
        self.out.indent();
        self.out.line("templ_7745c5c3_CSSBuilder := templruntime.GetBuilder()");

        for property in &template.properties {
            match &property.value {
                CssValue::Constant(value) => {
                    let css = format!("{}:{};", property.name, value);
                    self.out.line(&format!(
                        "templ_7745c5c3_CSSBuilder.WriteString({})",
                        go_string_literal(&css)
                    ));
                }
                CssValue::Expression(expr) => {
                    if expr.is_empty() {
                        self.error("Empty CSS property expression", property.span);
                        continue;
                    }
                    self.out.line(&format!(
                        "templ_7745c5c3_CSSBuilder.WriteString({})",
                        go_string_literal(&format!("{}:", property.name))
                    ));
                    self.out.push(&format!(
                        "templ_7745c5c3_CSSBuilder.WriteString(string(templ.SanitizeCSS({}, ",
                        go_string_literal(&property.name)
                    ));
                    self.out.push_mapped(&expr.value, expr.span);
                    self.out.line(")))");
                    self.out.line("templ_7745c5c3_CSSBuilder.WriteString(`;`)");
                }
            }
        }

        self.out.line(&format!(
            "templ_7745c5c3_CSSID := templ.CSSID({}, templ_7745c5c3_CSSBuilder.String())",
            go_string_literal(&name)
        ));
        self.out.line("return templ.ComponentCSSClass{");
        self.out.indent();
        self.out.line("ID:    templ_7745c5c3_CSSID,");
        self.out.line(
            "Class: templ.SafeCSS(`.` + templ_7745c5c3_CSSID + `{` + templ_7745c5c3_CSSBuilder.String() + `}`),",
        );
        self.out.dedent();
        self.out.line("}");
        self.out.dedent();
        self.out.line("}");
        self.out.newline();

        self.missing_brace(template.closed, "css template", template.span);
    }

    // === script templates ===

    fn emit_script_template(&mut self, template: &ScriptTemplate) {
        let params = template.params.join(", ");
        let body = template.body.trim();
        let function_name = script_function_name(template.name.as_deref().unwrap_or("script"), &params, body);
        let function = format!("function {}({}){{{}}}", function_name, params, body);
        let call_args = if params.is_empty() {
            String::new()
        } else {
            format!(", {}", params)
        };

        self.out.push("func ");
        self.out.push_mapped(&template.signature.value, template.signature.span);
        self.out.line(" templ.ComponentScript {");
        self.out.indent();
        self.out.line("return templ.ComponentScript{");
        self.out.indent();
        self.out.line(&format!("Name: {},", go_string_literal(&function_name)));
        self.out.line(&format!("Function: {},", go_string_literal(&function)));
        self.out.line(&format!(
            "Call: templ.SafeScript({}{}),",
            go_string_literal(&function_name),
            call_args
        ));
        self.out.line(&format!(
            "CallInline: templ.SafeScriptInline({}{}),",
            go_string_literal(&function_name),
            call_args
        ));
        self.out.dedent();
        self.out.line("}");
        self.out.dedent();
        self.out.line("}");
        self.out.newline();

        self.missing_brace(template.closed, "script template", template.span);
    }
}

/// `__templ_<name>_<first 4 hex digits of sha256(params + body)>`
fn script_function_name(name: &str, params: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.as_bytes());
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(2).map(|b| format!("{:02x}", b)).collect();
    format!("__templ_{}_{}", name, hex)
}

/// Collapse whitespace runs to single spaces. Whitespace-only text spanning
/// lines is indentation and produces nothing, as does leading whitespace of
/// text starting a line.
fn normalize_text(text: &str, line_start: bool) -> Option<String> {
    let text = if line_start { text.trim_start() } else { text };
    if text.is_empty() {
        return None;
    }
    if text.trim().is_empty() {
        return if text.contains('\n') { None } else { Some(" ".to_string()) };
    }
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    Some(out)
}

/// Quote text as an interpreted Go string literal.
pub fn go_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_string_literal() {
        assert_eq!(go_string_literal("<a href=\"x\">"), r#""<a href=\"x\">""#);
        assert_eq!(go_string_literal("a\\b\n"), r#""a\\b\n""#);
        assert_eq!(go_string_literal("\u{1}"), r#""\x01""#);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("\n\t\t", false), None);
        assert_eq!(normalize_text("  ", false), Some(" ".to_string()));
        assert_eq!(normalize_text("\t", true), None);
        assert_eq!(normalize_text("\thi  there", true), Some("hi there".to_string()));
        assert_eq!(normalize_text("Hello,\n\t\tworld ", false), Some("Hello, world ".to_string()));
    }

    #[test]
    fn test_script_function_name_is_stable() {
        let a = script_function_name("greet", "name", "alert(name);");
        let b = script_function_name("greet", "name", "alert(name);");
        let c = script_function_name("greet", "name", "alert(1);");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("__templ_greet_"));
        assert_eq!(a.len(), "__templ_greet_".len() + 4);
    }
}
