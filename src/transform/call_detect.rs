use super::{TemplateMetadata, Visitor};
use crate::ast::Node;

/// Records component call sites
pub struct CallDetectionPlugin;

impl Visitor for CallDetectionPlugin {
    fn enter(&mut self, node: &mut Node, metadata: &mut TemplateMetadata) -> bool {
        if let Node::Call(call) = node {
            metadata.call_sites.push(call.expr.clone());
        }
        true
    }
}
