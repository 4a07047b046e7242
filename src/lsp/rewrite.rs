//! Position and URI rewriting of arbitrary LSP payloads.
//!
//! One traversal serves both directions. Ranges and positions are found by
//! shape (`{line, character}`, `{start, end}`), and the document they belong
//! to is the nearest enclosing `uri`, `textDocument.uri` or `targetUri`,
//! falling back to the document of the request being answered.

use crate::parser::positions::{Position, Span};
use crate::sourcemap::SourceMap;
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client (template) coordinates to wrapped-server (generated) coordinates
    ToGenerated,
    /// Wrapped-server coordinates back to template coordinates
    ToTemplate,
}

/// The counterpart of a document in the other coordinate space
#[derive(Debug, Clone)]
pub struct Target {
    pub uri: String,
    pub map: Arc<SourceMap>,
    /// Version of the document in the other space, when known
    pub version: Option<i32>,
}

pub trait Resolver {
    /// Counterpart of `uri`, or `None` when the document is not ours.
    fn resolve(&self, uri: &str, direction: Direction) -> Option<Target>;
}

pub struct Rewriter<'a, R: ?Sized> {
    resolver: &'a R,
    direction: Direction,
}

impl<'a, R: Resolver + ?Sized> Rewriter<'a, R> {
    pub fn new(resolver: &'a R, direction: Direction) -> Self {
        Self { resolver, direction }
    }

    /// Rewrite `value` in place. `context` is the document that URI-less
    /// positions belong to.
    pub fn rewrite(&self, value: &mut Value, context: Option<&Target>) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.rewrite(item, context);
                }
            }
            Value::Object(object) => self.rewrite_object(object, context),
            _ => {}
        }
    }

    fn resolve_str(&self, value: Option<&Value>) -> Option<Target> {
        value
            .and_then(Value::as_str)
            .and_then(|uri| self.resolver.resolve(uri, self.direction))
    }

    fn rewrite_object(&self, object: &mut Map<String, Value>, inherited: Option<&Target>) {
        if let Some(span) = read_range(object) {
            if let Some(target) = inherited {
                write_range(object, self.range(span, target));
            }
            return;
        }
        if let Some(pos) = read_position(object) {
            if let Some(target) = inherited {
                write_position(object, self.position(pos, target));
            }
            return;
        }

        let has_uri = object.get("uri").is_some_and(Value::is_string);
        let direct = if has_uri { self.resolve_str(object.get("uri")) } else { None };
        let document = object
            .get("textDocument")
            .and_then(|doc| self.resolve_str(doc.get("uri")));
        let target = self.resolve_str(object.get("targetUri"));

        let context = if has_uri {
            direct.as_ref()
        } else if object.get("textDocument").is_some_and(|doc| doc.get("uri").is_some()) {
            document.as_ref()
        } else {
            inherited
        };

        let mut drop_text_edit = false;
        for (key, child) in object.iter_mut() {
            match key.as_str() {
                "uri" => {
                    if let Some(direct) = &direct {
                        *child = json!(direct.uri);
                    }
                }
                "version" => {
                    if let Some(version) = direct.as_ref().and_then(|d| d.version) {
                        *child = json!(version);
                    }
                }
                "targetUri" => {
                    if let Some(target) = &target {
                        *child = json!(target.uri);
                    }
                }
                "targetRange" | "targetSelectionRange" => self.rewrite(child, target.as_ref()),
                "edits" | "additionalTextEdits" => self.rewrite_edits(child, context),
                "textEdit" => drop_text_edit = !self.rewrite_edit(child, context),
                "changes" => self.rewrite_changes(child),
                _ => self.rewrite(child, context),
            }
        }
        if drop_text_edit {
            object.remove("textEdit");
        }
    }

    fn rewrite_edits(&self, value: &mut Value, context: Option<&Target>) {
        match value {
            Value::Array(items) => items.retain_mut(|item| self.rewrite_edit(item, context)),
            other => self.rewrite(other, context),
        }
    }

    /// Returns false when the edit cannot be placed and must be dropped.
    fn rewrite_edit(&self, edit: &mut Value, context: Option<&Target>) -> bool {
        let Value::Object(object) = edit else {
            return true;
        };
        if !object.contains_key("range") && !object.contains_key("insert") {
            // TextDocumentEdit or a resource operation
            self.rewrite_object(object, context);
            return true;
        }
        let Some(target) = context else {
            return true;
        };
        for key in ["range", "insert", "replace"] {
            let Some(Value::Object(range)) = object.get_mut(key) else {
                continue;
            };
            let Some(span) = read_range(range) else {
                continue;
            };
            match self.edit_range(span, target) {
                Some(span) => write_range(range, span),
                None => return false,
            }
        }
        true
    }

    /// `WorkspaceEdit.changes`: a map keyed by URI
    fn rewrite_changes(&self, value: &mut Value) {
        let Value::Object(changes) = value else {
            return;
        };
        let mut rewritten = Map::new();
        for (uri, mut edits) in std::mem::take(changes) {
            let target = self.resolver.resolve(&uri, self.direction);
            self.rewrite_edits(&mut edits, target.as_ref());
            let uri = target.map(|t| t.uri).unwrap_or(uri);
            rewritten.insert(uri, edits);
        }
        *changes = rewritten;
    }

    fn position(&self, pos: Position, target: &Target) -> Position {
        match self.direction {
            Direction::ToGenerated => target.map.to_generated(pos),
            Direction::ToTemplate => target.map.to_template(pos),
        }
    }

    fn range(&self, span: Span, target: &Target) -> Span {
        match self.direction {
            Direction::ToGenerated => target.map.range_to_generated(span),
            Direction::ToTemplate => target.map.range_to_template(span).unwrap_or_else(|| {
                let start = target.map.to_template(span.start);
                Span::new(start, target.map.to_template(span.end).max(start))
            }),
        }
    }

    /// Edits must land on contiguous template text
    fn edit_range(&self, span: Span, target: &Target) -> Option<Span> {
        match self.direction {
            Direction::ToGenerated => Some(target.map.range_to_generated(span)),
            Direction::ToTemplate => target.map.range_to_template(span),
        }
    }
}

fn read_position(object: &Map<String, Value>) -> Option<Position> {
    if object.len() != 2 {
        return None;
    }
    let line = object.get("line")?.as_u64()?;
    let character = object.get("character")?.as_u64()?;
    Some(Position::new(line as u32, character as u32))
}

fn write_position(object: &mut Map<String, Value>, pos: Position) {
    object.insert("line".to_string(), json!(pos.line));
    object.insert("character".to_string(), json!(pos.col));
}

fn read_range(object: &Map<String, Value>) -> Option<Span> {
    if object.len() != 2 {
        return None;
    }
    let start = read_position(object.get("start")?.as_object()?)?;
    let end = read_position(object.get("end")?.as_object()?)?;
    Some(Span::new(start, end))
}

fn write_range(object: &mut Map<String, Value>, span: Span) {
    let mut start = Map::new();
    write_position(&mut start, span.start);
    let mut end = Map::new();
    write_position(&mut end, span.end);
    object.insert("start".to_string(), Value::Object(start));
    object.insert("end".to_string(), Value::Object(end));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcemap::SourceMapping;
    use serde_json::json;

    const TEMPLATE: &str = "file:///p/a.templ";
    const GENERATED: &str = "file:///p/a_templ.go";

    struct One(Arc<SourceMap>);

    impl Resolver for One {
        fn resolve(&self, uri: &str, direction: Direction) -> Option<Target> {
            let (from, to, version) = match direction {
                Direction::ToGenerated => (TEMPLATE, GENERATED, 7),
                Direction::ToTemplate => (GENERATED, TEMPLATE, 2),
            };
            (uri == from).then(|| Target {
                uri: to.to_string(),
                map: self.0.clone(),
                version: Some(version),
            })
        }
    }

    fn resolver() -> One {
        // template (3,8)..(3,12) `name` <-> generated (20,40)..(20,44)
        One(Arc::new(SourceMap::from_entries(vec![SourceMapping {
            template: Span::new(Position::new(3, 8), Position::new(3, 12)),
            generated: Span::new(Position::new(20, 40), Position::new(20, 44)),
        }])))
    }

    fn range(sl: u32, sc: u32, el: u32, ec: u32) -> Value {
        json!({"start": {"line": sl, "character": sc}, "end": {"line": el, "character": ec}})
    }

    #[test]
    fn test_request_params_to_generated() {
        let resolver = resolver();
        let mut params = json!({
            "textDocument": {"uri": TEMPLATE},
            "position": {"line": 3, "character": 10},
        });
        Rewriter::new(&resolver, Direction::ToGenerated).rewrite(&mut params, None);
        assert_eq!(params["textDocument"]["uri"], json!(GENERATED));
        assert_eq!(params["position"], json!({"line": 20, "character": 42}));
    }

    #[test]
    fn test_foreign_documents_untouched() {
        let resolver = resolver();
        let mut params = json!({
            "textDocument": {"uri": "file:///p/other.go"},
            "position": {"line": 3, "character": 10},
        });
        let before = params.clone();
        Rewriter::new(&resolver, Direction::ToGenerated).rewrite(&mut params, None);
        assert_eq!(params, before);
    }

    #[test]
    fn test_locations_to_template() {
        let resolver = resolver();
        let mut result = json!([
            {"uri": GENERATED, "range": range(20, 40, 20, 44)},
            {"uri": "file:///p/x.go", "range": range(20, 40, 20, 44)},
        ]);
        Rewriter::new(&resolver, Direction::ToTemplate).rewrite(&mut result, None);
        assert_eq!(result[0], json!({"uri": TEMPLATE, "range": range(3, 8, 3, 12)}));
        assert_eq!(result[1]["range"], range(20, 40, 20, 44));
    }

    #[test]
    fn test_location_link_uses_target_and_origin_documents() {
        let resolver = resolver();
        let context = resolver.resolve(GENERATED, Direction::ToTemplate);
        let mut result = json!([{
            "originSelectionRange": range(20, 41, 20, 43),
            "targetUri": GENERATED,
            "targetRange": range(20, 40, 20, 44),
            "targetSelectionRange": range(20, 40, 20, 42),
        }]);
        Rewriter::new(&resolver, Direction::ToTemplate).rewrite(&mut result, context.as_ref());
        assert_eq!(result[0]["targetUri"], json!(TEMPLATE));
        assert_eq!(result[0]["originSelectionRange"], range(3, 9, 3, 11));
        assert_eq!(result[0]["targetSelectionRange"], range(3, 8, 3, 10));
    }

    #[test]
    fn test_workspace_edit_drops_unmappable_edits() {
        let resolver = resolver();
        let mut edit = json!({
            "changes": {
                GENERATED: [
                    {"range": range(20, 40, 20, 44), "newText": "title"},
                    {"range": range(5, 0, 5, 4), "newText": "boilerplate"},
                ]
            },
            "documentChanges": [{
                "textDocument": {"uri": GENERATED, "version": 9},
                "edits": [{"range": range(20, 40, 20, 44), "newText": "title"}],
            }],
        });
        Rewriter::new(&resolver, Direction::ToTemplate).rewrite(&mut edit, None);

        let changes = edit["changes"][TEMPLATE].as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["range"], range(3, 8, 3, 12));
        assert!(edit["changes"].get(GENERATED).is_none());

        let doc = &edit["documentChanges"][0];
        assert_eq!(doc["textDocument"], json!({"uri": TEMPLATE, "version": 2}));
        assert_eq!(doc["edits"][0]["range"], range(3, 8, 3, 12));
    }

    #[test]
    fn test_uri_less_result_uses_context() {
        let resolver = resolver();
        let context = resolver.resolve(GENERATED, Direction::ToTemplate);
        let mut hover = json!({"contents": "func name()", "range": range(20, 40, 20, 44)});
        Rewriter::new(&resolver, Direction::ToTemplate).rewrite(&mut hover, context.as_ref());
        assert_eq!(hover["range"], range(3, 8, 3, 12));
    }
}
