mod call_detect;
mod children_detect;
mod metadata;

pub use call_detect::CallDetectionPlugin;
pub use children_detect::ChildrenDetectionPlugin;
pub use metadata::{TemplateMetadata, TransformMetadata};

use crate::ast::{Node, TemplateFile, TemplateFileNode};

/// Visitor trait for template body analysis
pub trait Visitor {
    /// Called before visiting children. Return `false` to skip children.
    fn enter(&mut self, _node: &mut Node, _metadata: &mut TemplateMetadata) -> bool {
        true
    }

    /// Called after visiting children.
    fn exit(&mut self, _node: &mut Node, _metadata: &mut TemplateMetadata) {}
}

/// Transformer that applies a series of plugins to every HTML template
pub struct Transformer {
    plugins: Vec<Box<dyn Visitor + Send>>,
    pub metadata: TransformMetadata,
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
            metadata: TransformMetadata::new(),
        }
    }

    pub fn add<V: Visitor + Send + 'static>(mut self, visitor: V) -> Self {
        self.plugins.push(Box::new(visitor));
        self
    }

    pub fn transform(&mut self, file: &mut TemplateFile) -> &TransformMetadata {
        for (index, node) in file.nodes.iter_mut().enumerate() {
            let TemplateFileNode::Html(template) = node else {
                continue;
            };
            let mut template_metadata = TemplateMetadata::default();
            for plugin in &mut self.plugins {
                Self::visit_nodes(&mut template.children, plugin.as_mut(), &mut template_metadata);
            }
            self.metadata.templates.insert(index, template_metadata);
        }

        &self.metadata
    }

    fn visit_nodes(nodes: &mut [Node], visitor: &mut (dyn Visitor + Send), metadata: &mut TemplateMetadata) {
        for node in nodes {
            if visitor.enter(node, metadata) {
                match node {
                    Node::Element(el) => Self::visit_nodes(&mut el.children, visitor, metadata),
                    Node::Call(call) => {
                        if let Some(children) = &mut call.children {
                            Self::visit_nodes(children, visitor, metadata);
                        }
                    }
                    Node::If(if_node) => {
                        Self::visit_nodes(&mut if_node.then_branch, visitor, metadata);
                        for branch in &mut if_node.else_ifs {
                            Self::visit_nodes(&mut branch.body, visitor, metadata);
                        }
                        if let Some(else_branch) = &mut if_node.else_branch {
                            Self::visit_nodes(else_branch, visitor, metadata);
                        }
                    }
                    Node::For(for_node) => Self::visit_nodes(&mut for_node.body, visitor, metadata),
                    Node::Switch(switch) => {
                        for case in &mut switch.cases {
                            Self::visit_nodes(&mut case.body, visitor, metadata);
                        }
                    }
                    // Leaf nodes
                    Node::Text(_)
                    | Node::Comment(_)
                    | Node::Doctype(_)
                    | Node::Expression(_)
                    | Node::Children(_)
                    | Node::RawGo(_) => {}
                }
            }
            visitor.exit(node, metadata);
        }
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a transformer with the standard plugins
pub fn standard_plugins() -> Transformer {
    Transformer::new()
        .add(ChildrenDetectionPlugin)
        .add(CallDetectionPlugin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_metadata_per_template() {
        let mut file = parse(
            "package main\n\ntempl Layout() {\n\t<main>{ children... }</main>\n}\n\ntempl Page() {\n\t@Layout() {\n\t\t<p>hi</p>\n\t}\n}\n",
        )
        .file;
        let mut transformer = standard_plugins();
        let metadata = transformer.transform(&mut file);

        let layout = metadata.template(0);
        assert!(layout.uses_children);
        assert!(layout.call_sites.is_empty());

        let page = metadata.template(1);
        assert!(!page.uses_children);
        assert_eq!(page.call_sites.len(), 1);
        assert_eq!(page.call_sites[0].value, "Layout()");
        assert!(metadata.has_calls());
    }
}
