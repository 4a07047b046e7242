//! JSON-RPC message classification.
//!
//! Messages stay as `serde_json::Value` so that anything the proxy does not
//! understand is relayed without loss; this module only sorts them.

use super::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    pub fn to_value(&self) -> Value {
        match self {
            RequestId::Number(n) => json!(n),
            RequestId::String(s) => json!(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request { id: RequestId, method: String, params: Value },
    Notification { method: String, params: Value },
    Response { id: Option<RequestId>, body: Value },
}

impl Message {
    pub fn parse(value: Value) -> Result<Message, ProtocolError> {
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::InvalidRequest("message is not an object".to_string()));
        };
        let id = match object.remove("id") {
            None | Some(Value::Null) => None,
            Some(id) => Some(
                serde_json::from_value::<RequestId>(id)
                    .map_err(|_| ProtocolError::InvalidRequest("id must be a number or string".to_string()))?,
            ),
        };
        let params = object.remove("params").unwrap_or(Value::Null);

        match object.remove("method") {
            Some(Value::String(method)) => Ok(match id {
                Some(id) => Message::Request { id, method, params },
                None => Message::Notification { method, params },
            }),
            Some(_) => Err(ProtocolError::InvalidRequest("method must be a string".to_string())),
            None if object.contains_key("result") || object.contains_key("error") => {
                object.remove("jsonrpc");
                Ok(Message::Response {
                    id,
                    body: Value::Object(object),
                })
            }
            None => Err(ProtocolError::InvalidRequest("message has neither method nor result".to_string())),
        }
    }
}

pub fn request(id: &RequestId, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id.to_value(), "method": method, "params": params})
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params})
}

pub fn response(id: &RequestId, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id.to_value(), "result": result})
}

/// Re-address a response body (`result` or `error`) to `id`.
pub fn response_with_body(id: &RequestId, body: Value) -> Value {
    let mut message = body;
    if let Value::Object(object) = &mut message {
        object.insert("jsonrpc".to_string(), json!("2.0"));
        object.insert("id".to_string(), id.to_value());
    }
    message
}

pub fn error_response(id: Option<&RequestId>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.map(RequestId::to_value).unwrap_or(Value::Null),
        "error": {"code": code, "message": message},
    })
}

/// `window/showMessage` notification
pub fn show_message(kind: lsp_types::MessageType, text: &str) -> Value {
    let params = lsp_types::ShowMessageParams {
        typ: kind,
        message: text.to_string(),
    };
    notification("window/showMessage", serde_json::to_value(params).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let req = Message::parse(json!({"jsonrpc": "2.0", "id": "a", "method": "x", "params": [1]})).unwrap();
        assert_eq!(
            req,
            Message::Request {
                id: RequestId::String("a".to_string()),
                method: "x".to_string(),
                params: json!([1]),
            }
        );

        let note = Message::parse(json!({"jsonrpc": "2.0", "method": "y"})).unwrap();
        assert!(matches!(note, Message::Notification { ref method, params: Value::Null } if method == "y"));

        let resp = Message::parse(json!({"jsonrpc": "2.0", "id": 3, "result": null})).unwrap();
        assert_eq!(
            resp,
            Message::Response {
                id: Some(RequestId::Number(3)),
                body: json!({"result": null}),
            }
        );
    }

    #[test]
    fn test_invalid() {
        assert!(Message::parse(json!([1, 2])).is_err());
        assert!(Message::parse(json!({"id": 1})).is_err());
        assert!(Message::parse(json!({"id": {}, "method": "x"})).is_err());
    }

    #[test]
    fn test_readdress_response() {
        let body = json!({"result": {"x": 1}});
        let message = response_with_body(&RequestId::Number(7), body);
        assert_eq!(message, json!({"jsonrpc": "2.0", "id": 7, "result": {"x": 1}}));
    }
}
