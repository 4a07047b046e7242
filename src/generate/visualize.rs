//! Side-by-side HTML view of a template and its generated Go, with every
//! source map entry highlighted in both panes.

use crate::parser::positions::{LineIndex, Span};
use crate::sourcemap::SourceMap;

/// Render the visualisation page.
pub fn render(template: &str, generated: &str, map: &SourceMap) -> String {
    let template_index = LineIndex::new(template);
    let generated_index = LineIndex::new(generated);

    let template_spans: Vec<(usize, Span)> = map
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| (i, e.template))
        .collect();
    let generated_spans: Vec<(usize, Span)> = map
        .entries()
        .iter()
        .enumerate()
        .map(|(i, e)| (i, e.generated))
        .collect();

    let mut page = String::new();
    page.push_str(PAGE_HEAD);
    page.push_str("<div class=\"pane\"><pre>");
    page.push_str(&highlight(template, &template_index, template_spans));
    page.push_str("</pre></div>\n<div class=\"pane\"><pre>");
    page.push_str(&highlight(generated, &generated_index, generated_spans));
    page.push_str("</pre></div>\n");
    page.push_str(PAGE_TAIL);
    page
}

/// Wrap each span in a `<span data-map="i">`. Spans in one text never overlap.
fn highlight(text: &str, index: &LineIndex, mut spans: Vec<(usize, Span)>) -> String {
    spans.sort_by_key(|(_, span)| span.start);

    let mut out = String::with_capacity(text.len() * 2);
    let mut cursor = 0;
    for (i, span) in spans {
        let start = index.offset(text, span.start).max(cursor);
        let end = index.offset(text, span.end).max(start);
        out.push_str(&escape(&text[cursor..start]));
        out.push_str(&format!("<span class=\"mapped\" data-map=\"{}\">", i));
        out.push_str(&escape(&text[start..end]));
        out.push_str("</span>");
        cursor = end;
    }
    out.push_str(&escape(&text[cursor..]));
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Source map visualisation</title>
<style>
body { display: flex; margin: 0; font-family: monospace; }
.pane { flex: 1; overflow: auto; padding: 1em; border-right: 1px solid #ccc; }
.mapped { background: #e0ecff; }
.mapped.active { background: #ffd966; }
</style>
</head>
<body>
"#;

const PAGE_TAIL: &str = r#"<script>
document.querySelectorAll('.mapped').forEach(function (el) {
  el.addEventListener('mouseenter', function () {
    document.querySelectorAll('[data-map="' + el.dataset.map + '"]').forEach(function (m) { m.classList.add('active'); });
  });
  el.addEventListener('mouseleave', function () {
    document.querySelectorAll('.active').forEach(function (m) { m.classList.remove('active'); });
  });
});
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::positions::Position;
    use crate::sourcemap::SourceMapping;

    #[test]
    fn test_highlights_both_panes() {
        let map = SourceMap::from_entries(vec![SourceMapping {
            template: Span::new(Position::new(0, 2), Position::new(0, 3)),
            generated: Span::new(Position::new(1, 5), Position::new(1, 6)),
        }]);
        let page = render("{ x }", "a\nb <- x\n", &map);
        assert_eq!(page.matches("data-map=\"0\">x</span>").count(), 2);
        assert!(page.contains("b &lt;- "));
    }
}
