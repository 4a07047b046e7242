use super::{TemplateMetadata, Visitor};
use crate::ast::Node;

/// Detects `{ children... }` in a template body
pub struct ChildrenDetectionPlugin;

impl Visitor for ChildrenDetectionPlugin {
    fn enter(&mut self, node: &mut Node, metadata: &mut TemplateMetadata) -> bool {
        if let Node::Children(_) = node {
            metadata.uses_children = true;
        }
        true
    }
}
