mod go;
mod output;
pub mod visualize;

pub use go::{GoGenerator, go_string_literal};
pub use output::Output;

use crate::ast::TemplateFile;
use crate::error::GenerationError;
use crate::sourcemap::SourceMap;
use crate::transform::TransformMetadata;

/// Generator options
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Template file name reported in runtime errors
    pub file_name: String,
    /// Emit a `// templ: version:` header line
    pub include_version: bool,
    /// Emit a `// templ: timestamp:` header line
    pub include_timestamp: bool,
    /// Import path of the templ runtime package
    pub runtime_import: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            file_name: "templ.templ".to_string(),
            include_version: true,
            include_timestamp: false,
            runtime_import: "github.com/a-h/templ".to_string(),
        }
    }
}

/// Generation result
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub code: String,
    pub source_map: SourceMap,
    pub errors: Vec<GenerationError>,
}

/// Generator trait - converts a template file to code
pub trait Generator {
    fn generate(&self, file: &TemplateFile, metadata: &TransformMetadata, options: &GenerateOptions) -> GenerateResult;
}
