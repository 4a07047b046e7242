//! LSP capability negotiation.

use lsp_types::{
    InitializeResult, OneOf, ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncOptions,
};
use serde_json::{Value, json};

/// What the proxy itself provides, regardless of the wrapped server
pub fn proxy_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
            open_close: Some(true),
            change: Some(TextDocumentSyncKind::INCREMENTAL),
            will_save: None,
            will_save_wait_until: None,
            save: None,
        })),
        document_formatting_provider: Some(OneOf::Left(true)),
        ..Default::default()
    }
}

fn server_info() -> ServerInfo {
    ServerInfo {
        name: "templ".to_string(),
        version: Some(crate::VERSION.to_string()),
    }
}

/// Initialize result when no wrapped server is available
pub fn standalone_result() -> Value {
    let result = InitializeResult {
        capabilities: proxy_capabilities(),
        server_info: Some(server_info()),
    };
    serde_json::to_value(result).unwrap_or(Value::Null)
}

/// The wrapped server's initialize result with the proxy's own capabilities
/// layered on top.
pub fn merge(mut result: Value) -> Value {
    let own = serde_json::to_value(proxy_capabilities()).unwrap_or(Value::Null);
    if !result.is_object() {
        return standalone_result();
    }
    let capabilities = result
        .as_object_mut()
        .map(|r| r.entry("capabilities").or_insert_with(|| json!({})));
    if let (Some(Value::Object(capabilities)), Value::Object(own)) = (capabilities, own) {
        for (key, value) in own {
            capabilities.insert(key, value);
        }
    }
    result["serverInfo"] = serde_json::to_value(server_info()).unwrap_or(Value::Null);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_server_features() {
        let server = json!({"capabilities": {"hoverProvider": true, "textDocumentSync": 1}});
        let merged = merge(server);
        assert_eq!(merged["capabilities"]["hoverProvider"], json!(true));
        assert_eq!(merged["capabilities"]["textDocumentSync"]["change"], json!(2));
        assert_eq!(merged["capabilities"]["documentFormattingProvider"], json!(true));
        assert_eq!(merged["serverInfo"]["name"], json!("templ"));
    }

    #[test]
    fn test_standalone() {
        let result = standalone_result();
        assert_eq!(result["capabilities"]["textDocumentSync"]["openClose"], json!(true));
        assert!(result["capabilities"].get("hoverProvider").is_none());
    }
}
