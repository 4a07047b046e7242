//! End-to-end proxy sessions over in-memory streams, with a scripted
//! stand-in for the Go language server.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use templ_transpiler::lsp::codec::{MessageReader, MessageWriter};
use templ_transpiler::lsp::{self, Launcher, ProcessError, ProxyConfig, Transport};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const TEMPLATE_URI: &str = "file:///site/page.templ";
const GENERATED_URI: &str = "file:///site/page_templ.go";
const PAGE: &str = "package main\n\ntempl Page(x string) {\n\t<div>{ x }</div>\n}\n";
const WAIT: Duration = Duration::from_secs(5);

// === Fake Go server ===

#[derive(Clone, Copy, PartialEq)]
enum Behaviour {
    Normal,
    /// Drops the connection when asked for hover
    CrashOnHover,
    /// Cannot be started
    Missing,
    /// Answers hover only when it is cancelled
    SlowHover,
}

struct FakeLauncher {
    behaviour: Behaviour,
    launches: Arc<AtomicUsize>,
    received: mpsc::UnboundedSender<Value>,
}

impl Launcher for FakeLauncher {
    fn launch(&self) -> Result<Transport, ProcessError> {
        let launch = self.launches.fetch_add(1, Ordering::SeqCst);
        if self.behaviour == Behaviour::Missing {
            return Err(ProcessError::Spawn {
                command: "gopls".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not found"),
            });
        }
        // Only the first process misbehaves
        let behaviour = if launch == 0 { self.behaviour } else { Behaviour::Normal };

        let (proxy_side, server_side) = tokio::io::duplex(1 << 16);
        let (reader, writer) = tokio::io::split(proxy_side);
        tokio::spawn(fake_server(server_side, self.received.clone(), behaviour));
        Ok(Transport {
            reader: Box::new(reader),
            writer: Box::new(writer),
            child: None,
        })
    }
}

fn position_of(text: &str, offset: usize) -> (usize, usize) {
    let line = text[..offset].matches('\n').count();
    let col = offset - text[..offset].rfind('\n').map_or(0, |i| i + 1);
    (line, col)
}

fn word_at(text: &str, line: usize, col: usize) -> String {
    text.lines()
        .nth(line)
        .map(|l| {
            l[col.min(l.len())..]
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect()
        })
        .unwrap_or_default()
}

async fn fake_server(stream: DuplexStream, received: mpsc::UnboundedSender<Value>, behaviour: Behaviour) {
    let (read, write) = tokio::io::split(stream);
    let mut reader = MessageReader::new(read);
    let mut writer = MessageWriter::new(write);
    let mut documents: HashMap<String, String> = HashMap::new();

    while let Ok(Some(message)) = reader.read().await {
        let _ = received.send(message.clone());
        let method = message["method"].as_str().unwrap_or_default().to_string();
        let params = &message["params"];
        let reply = |result: Value| json!({"jsonrpc": "2.0", "id": message["id"], "result": result});

        match method.as_str() {
            "initialize" => {
                let result = json!({"capabilities": {"hoverProvider": true, "definitionProvider": true, "textDocumentSync": 1}});
                writer.write(&reply(result)).await.unwrap();
            }
            "textDocument/didOpen" | "textDocument/didChange" => {
                let uri = params["textDocument"]["uri"].as_str().unwrap().to_string();
                let text = if method == "textDocument/didOpen" {
                    params["textDocument"]["text"].as_str().unwrap().to_string()
                } else {
                    params["contentChanges"][0]["text"].as_str().unwrap().to_string()
                };
                // Complain about the first rendered expression
                if let Some(offset) = text.find("templ.JoinStringErrs(") {
                    let (line, col) = position_of(&text, offset + "templ.JoinStringErrs(".len());
                    let diagnostics = json!({
                        "uri": uri,
                        "diagnostics": [{
                            "range": {"start": {"line": line, "character": col}, "end": {"line": line, "character": col + 1}},
                            "severity": 1,
                            "message": "undefined: x",
                        }, {
                            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 2}},
                            "severity": 2,
                            "message": "boilerplate warning",
                        }],
                    });
                    writer
                        .write(&json!({"jsonrpc": "2.0", "method": "textDocument/publishDiagnostics", "params": diagnostics}))
                        .await
                        .unwrap();
                }
                documents.insert(uri, text);
            }
            "textDocument/hover" => {
                if behaviour == Behaviour::CrashOnHover {
                    return;
                }
                if behaviour == Behaviour::SlowHover {
                    continue;
                }
                let uri = params["textDocument"]["uri"].as_str().unwrap_or_default();
                let line = params["position"]["line"].as_u64().unwrap() as usize;
                let col = params["position"]["character"].as_u64().unwrap() as usize;
                let word = documents.get(uri).map(|t| word_at(t, line, col)).unwrap_or_default();
                let result = json!({
                    "contents": word,
                    "range": {"start": {"line": line, "character": col}, "end": {"line": line, "character": col + word.len()}},
                });
                writer.write(&reply(result)).await.unwrap();
            }
            "$/cancelRequest" => {
                let cancelled = json!({
                    "jsonrpc": "2.0",
                    "id": params["id"],
                    "error": {"code": -32800, "message": "cancelled"},
                });
                writer.write(&cancelled).await.unwrap();
            }
            "exit" => return,
            _ => {
                if message.get("id").is_some() {
                    writer.write(&reply(Value::Null)).await.unwrap();
                }
            }
        }
    }
}

// === Editor side ===

struct Session {
    reader: MessageReader<ReadHalf<DuplexStream>>,
    writer: MessageWriter<WriteHalf<DuplexStream>>,
    server_received: mpsc::UnboundedReceiver<Value>,
    launches: Arc<AtomicUsize>,
    proxy: JoinHandle<Result<(), lsp::ProtocolError>>,
    next_id: i64,
}

impl Session {
    fn start(behaviour: Behaviour) -> Self {
        let config = ProxyConfig {
            debounce: Duration::from_millis(10),
            max_restarts: 1,
            ..ProxyConfig::default()
        };
        Self::start_with(behaviour, config)
    }

    fn start_with(behaviour: Behaviour, config: ProxyConfig) -> Self {
        let (received_tx, server_received) = mpsc::unbounded_channel();
        let launches = Arc::new(AtomicUsize::new(0));
        let launcher = Arc::new(FakeLauncher {
            behaviour,
            launches: launches.clone(),
            received: received_tx,
        });

        let (client_side, proxy_side) = tokio::io::duplex(1 << 16);
        let (proxy_read, proxy_write) = tokio::io::split(proxy_side);
        let proxy = tokio::spawn(lsp::run(config, launcher, proxy_read, proxy_write));

        let (read, write) = tokio::io::split(client_side);
        Session {
            reader: MessageReader::new(read),
            writer: MessageWriter::new(write),
            server_received,
            launches,
            proxy,
            next_id: 1,
        }
    }

    async fn send(&mut self, message: Value) {
        self.writer.write(&message).await.unwrap();
    }

    async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        self.recv_until(|m| m["id"] == json!(id) && m.get("method").is_none()).await
    }

    async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    /// Next message matching `matches`; others are skipped.
    async fn recv_until(&mut self, matches: impl Fn(&Value) -> bool) -> Value {
        timeout(WAIT, async {
            loop {
                let message = self.reader.read().await.unwrap().expect("proxy closed the stream");
                if matches(&message) {
                    return message;
                }
            }
        })
        .await
        .expect("timed out waiting for the proxy")
    }

    /// Next message the fake server received with `method`
    async fn server_got(&mut self, method: &str) -> Value {
        timeout(WAIT, async {
            loop {
                let message = self.server_received.recv().await.expect("fake server gone");
                if message["method"] == json!(method) {
                    return message;
                }
            }
        })
        .await
        .expect("timed out waiting for the fake server")
    }

    async fn initialize(&mut self) -> Value {
        let response = self.request("initialize", json!({"capabilities": {}})).await;
        self.notify("initialized", json!({})).await;
        response
    }

    async fn open(&mut self, text: &str) {
        self.notify(
            "textDocument/didOpen",
            json!({"textDocument": {"uri": TEMPLATE_URI, "languageId": "templ", "version": 1, "text": text}}),
        )
        .await;
    }

    async fn finish(mut self) {
        let response = self.request("shutdown", Value::Null).await;
        assert_eq!(response["result"], Value::Null);
        self.notify("exit", Value::Null).await;
        let ended = timeout(WAIT, self.proxy).await.expect("proxy did not exit");
        assert!(ended.unwrap().is_ok());
    }
}

fn is_diagnostics_for_template(message: &Value) -> bool {
    message["method"] == json!("textDocument/publishDiagnostics") && message["params"]["uri"] == json!(TEMPLATE_URI)
}

// === Tests ===

#[tokio::test]
async fn test_initialize_merges_capabilities() {
    let mut session = Session::start(Behaviour::Normal);
    let response = session.initialize().await;

    let capabilities = &response["result"]["capabilities"];
    assert_eq!(capabilities["hoverProvider"], json!(true));
    assert_eq!(capabilities["definitionProvider"], json!(true));
    assert_eq!(capabilities["textDocumentSync"]["change"], json!(2));
    assert_eq!(capabilities["documentFormattingProvider"], json!(true));
    assert_eq!(response["result"]["serverInfo"]["name"], json!("templ"));

    session.finish().await;
}

#[tokio::test]
async fn test_open_reaches_server_as_generated_go() {
    let mut session = Session::start(Behaviour::Normal);
    session.initialize().await;
    session.open(PAGE).await;

    let opened = session.server_got("textDocument/didOpen").await;
    let document = &opened["params"]["textDocument"];
    assert_eq!(document["uri"], json!(GENERATED_URI));
    assert_eq!(document["languageId"], json!("go"));
    let text = document["text"].as_str().unwrap();
    assert!(text.starts_with("// Code generated by templ - DO NOT EDIT."));
    assert!(text.contains("func Page(x string) templ.Component {"));

    session.finish().await;
}

#[tokio::test]
async fn test_hover_round_trip() {
    let mut session = Session::start(Behaviour::Normal);
    session.initialize().await;
    session.open(PAGE).await;

    let response = session
        .request(
            "textDocument/hover",
            json!({"textDocument": {"uri": TEMPLATE_URI}, "position": {"line": 3, "character": 8}}),
        )
        .await;

    // The server saw the generated position of `x`
    let hover = session.server_got("textDocument/hover").await;
    assert_eq!(hover["params"]["textDocument"]["uri"], json!(GENERATED_URI));
    assert_eq!(response["result"]["contents"], json!("x"));
    assert_eq!(
        response["result"]["range"],
        json!({"start": {"line": 3, "character": 8}, "end": {"line": 3, "character": 9}})
    );

    session.finish().await;
}

#[tokio::test]
async fn test_server_diagnostics_translated() {
    let mut session = Session::start(Behaviour::Normal);
    session.initialize().await;
    session.open(PAGE).await;

    let published = session
        .recv_until(|m| is_diagnostics_for_template(m) && m["params"]["diagnostics"].as_array().is_some_and(|d| !d.is_empty()))
        .await;
    let diagnostics = published["params"]["diagnostics"].as_array().unwrap();

    // The boilerplate warning is dropped by the default policy
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["message"], json!("undefined: x"));
    assert_eq!(
        diagnostics[0]["range"],
        json!({"start": {"line": 3, "character": 8}, "end": {"line": 3, "character": 9}})
    );

    session.finish().await;
}

#[tokio::test]
async fn test_template_errors_published() {
    let mut session = Session::start(Behaviour::Normal);
    session.initialize().await;
    session
        .open("package main\n\ntempl Page() {\n\t<p>{ }</p>\n}\n")
        .await;

    let published = session
        .recv_until(|m| {
            is_diagnostics_for_template(m)
                && m["params"]["diagnostics"]
                    .as_array()
                    .is_some_and(|d| d.iter().any(|d| d["source"] == json!("templ")))
        })
        .await;
    let diagnostic = &published["params"]["diagnostics"][0];
    assert_eq!(diagnostic["range"]["start"], json!({"line": 3, "character": 4}));

    session.finish().await;
}

#[tokio::test]
async fn test_standalone_without_server() {
    let mut session = Session::start(Behaviour::Missing);
    let response = session.request("initialize", json!({"capabilities": {}})).await;

    let capabilities = &response["result"]["capabilities"];
    assert_eq!(capabilities["documentFormattingProvider"], json!(true));
    assert!(capabilities.get("hoverProvider").is_none());

    let warning = session
        .recv_until(|m| m["method"] == json!("window/showMessage"))
        .await;
    assert_eq!(warning["params"]["type"], json!(1));

    session.open(PAGE).await;
    let hover = session
        .request(
            "textDocument/hover",
            json!({"textDocument": {"uri": TEMPLATE_URI}, "position": {"line": 3, "character": 8}}),
        )
        .await;
    assert_eq!(hover["result"], Value::Null);

    let unknown = session.request("workspace/symbol", json!({"query": "Page"})).await;
    assert_eq!(unknown["error"]["code"], json!(-32601));

    session.finish().await;
}

#[tokio::test]
async fn test_formatting() {
    let mut session = Session::start(Behaviour::Missing);
    session.request("initialize", json!({"capabilities": {}})).await;
    session.open("package main  \n\n\n\ntempl Page() {\n\t<p>x</p>\n}").await;

    let response = session
        .request(
            "textDocument/formatting",
            json!({"textDocument": {"uri": TEMPLATE_URI}, "options": {"tabSize": 4, "insertSpaces": false}}),
        )
        .await;
    let edits = response["result"].as_array().unwrap();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0]["newText"], json!("package main\n\ntempl Page() {\n\t<p>x</p>\n}\n"));
    assert_eq!(edits[0]["range"]["start"], json!({"line": 0, "character": 0}));

    session.finish().await;
}

#[tokio::test]
async fn test_malformed_message_keeps_session() {
    let mut session = Session::start(Behaviour::Missing);
    session.send(json!({"jsonrpc": "2.0", "id": 99})).await;
    let error = session.recv_until(|m| m.get("error").is_some()).await;
    assert_eq!(error["error"]["code"], json!(-32600));

    let response = session.request("initialize", json!({"capabilities": {}})).await;
    assert!(response["result"]["capabilities"].is_object());

    session.finish().await;
}

#[tokio::test]
async fn test_server_crash_fails_request_and_restarts() {
    let mut session = Session::start(Behaviour::CrashOnHover);
    session.initialize().await;
    session.open(PAGE).await;
    session.server_got("textDocument/didOpen").await;

    let response = session
        .request(
            "textDocument/hover",
            json!({"textDocument": {"uri": TEMPLATE_URI}, "position": {"line": 3, "character": 8}}),
        )
        .await;
    assert_eq!(response["error"]["code"], json!(-32603));

    // The replacement server is initialized and gets the document again
    session.server_got("initialize").await;
    let reopened = session.server_got("textDocument/didOpen").await;
    assert_eq!(reopened["params"]["textDocument"]["uri"], json!(GENERATED_URI));
    assert_eq!(session.launches.load(Ordering::SeqCst), 2);

    let response = session
        .request(
            "textDocument/hover",
            json!({"textDocument": {"uri": TEMPLATE_URI}, "position": {"line": 3, "character": 8}}),
        )
        .await;
    assert_eq!(response["result"]["contents"], json!("x"));

    session.finish().await;
}

fn hover_params() -> Value {
    json!({"textDocument": {"uri": TEMPLATE_URI}, "position": {"line": 3, "character": 8}})
}

#[tokio::test]
async fn test_cancel_reaches_server_under_its_id() {
    let mut session = Session::start(Behaviour::SlowHover);
    session.initialize().await;
    session.open(PAGE).await;

    session
        .send(json!({"jsonrpc": "2.0", "id": "hover-1", "method": "textDocument/hover", "params": hover_params()}))
        .await;
    let hover = session.server_got("textDocument/hover").await;
    let server_id = hover["id"].clone();
    assert!(server_id.is_i64());

    session.notify("$/cancelRequest", json!({"id": "hover-1"})).await;
    let cancel = session.server_got("$/cancelRequest").await;
    assert_eq!(cancel["params"]["id"], server_id);

    let response = session.recv_until(|m| m["id"] == json!("hover-1")).await;
    assert_eq!(response["error"]["code"], json!(-32800));

    session.finish().await;
}

#[tokio::test]
async fn test_cancel_while_waiting_for_regeneration() {
    let config = ProxyConfig {
        debounce: Duration::from_millis(400),
        ..ProxyConfig::default()
    };
    let mut session = Session::start_with(Behaviour::Normal, config);
    session.initialize().await;
    session.open(PAGE).await;
    session
        .notify(
            "textDocument/didChange",
            json!({"textDocument": {"uri": TEMPLATE_URI, "version": 2}, "contentChanges": [{"text": PAGE}]}),
        )
        .await;

    session
        .send(json!({"jsonrpc": "2.0", "id": "slow", "method": "textDocument/hover", "params": hover_params()}))
        .await;
    session.notify("$/cancelRequest", json!({"id": "slow"})).await;

    let response = session.recv_until(|m| m["id"] == json!("slow")).await;
    assert_eq!(response["error"]["code"], json!(-32800));
    while let Ok(message) = session.server_received.try_recv() {
        assert_ne!(message["method"], json!("textDocument/hover"));
    }

    session.finish().await;
}

