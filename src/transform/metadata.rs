use crate::ast::GoExpression;
use std::collections::BTreeMap;

/// What the analysis plugins found in one HTML template
#[derive(Debug, Clone, Default)]
pub struct TemplateMetadata {
    /// Body contains `{ children... }`
    pub uses_children: bool,
    /// Component call expressions, in source order
    pub call_sites: Vec<GoExpression>,
}

/// Metadata collected during transformation, keyed by the template's index
/// in `TemplateFile::nodes`. Used by the generator.
#[derive(Debug, Clone, Default)]
pub struct TransformMetadata {
    pub templates: BTreeMap<usize, TemplateMetadata>,
}

impl TransformMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn template(&self, index: usize) -> TemplateMetadata {
        self.templates.get(&index).cloned().unwrap_or_default()
    }

    /// True if any template renders a nested component
    pub fn has_calls(&self) -> bool {
        self.templates.values().any(|t| !t.call_sites.is_empty())
    }
}
