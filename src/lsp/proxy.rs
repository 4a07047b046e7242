//! The LSP session: relays traffic between the editor and the wrapped
//! language server, translating template documents to their generated Go
//! on the way in and back on the way out.

use super::capabilities;
use super::codec::{MessageReader, MessageWriter};
use super::config::ProxyConfig;
use super::diagnostics::{self, range_to_lsp};
use super::documents::{ClosedFileMaps, Documents, Generated, Published};
use super::error::{ProcessError, ProtocolError, code};
use super::message::{self, Message, RequestId};
use super::rewrite::{Direction, Resolver, Rewriter, Target};
use super::server::Launcher;
use super::uri;
use crate::format;
use lsp_types::{
    Diagnostic, DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DocumentFormattingParams, MessageType, PublishDiagnosticsParams, TextEdit, Url,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run a proxy session until the client sends `exit` or closes the stream.
pub async fn run<R, W>(
    config: ProxyConfig,
    launcher: Arc<dyn Launcher>,
    input: R,
    output: W,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (client_tx, client_rx) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(MessageWriter::new(output), client_rx, "client"));

    let (documents, published) = Documents::new(config.debounce, config.generate.clone());
    let (restart_tx, restart_rx) = mpsc::unbounded_channel();
    let closed_maps = ClosedFileMaps::new(config.generate.clone());

    let proxy = Proxy {
        shared: Arc::new(Shared {
            config,
            launcher,
            documents,
            closed_maps,
            client: client_tx,
            server: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            server_open: Mutex::new(HashMap::new()),
            server_diagnostics: Mutex::new(HashMap::new()),
            init_params: Mutex::new(None),
            restart_tx,
            restarts: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }),
    };
    tokio::spawn(proxy.clone().publish_loop(published));
    tokio::spawn(proxy.clone().supervise(restart_rx));

    let mut reader = MessageReader::new(input);
    loop {
        let value = match reader.read().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                tracing::info!("client closed the connection");
                break;
            }
            Err(err) if err.is_fatal() => {
                proxy.stop_server();
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(error = %err, "unreadable message from client");
                proxy.send_client(message::error_response(None, err.code(), &err.to_string()));
                continue;
            }
        };
        tracing::trace!(message = %value, "client ->");

        match Message::parse(value) {
            Ok(message) => {
                if proxy.handle_client(message).await == Flow::Exit {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "invalid message from client");
                proxy.send_client(message::error_response(None, err.code(), &err.to_string()));
            }
        }
    }

    proxy.stop_server();
    Ok(())
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: MessageWriter<W>,
    mut rx: mpsc::UnboundedReceiver<Value>,
    peer: &'static str,
) {
    while let Some(message) = rx.recv().await {
        if let Err(err) = writer.write(&message).await {
            tracing::warn!(peer, error = %err, "write failed");
            break;
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// A client request the proxy has not answered yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    /// Waiting for its document to regenerate
    Waiting,
    /// Sent to the wrapped server under this id
    Forwarded(i64),
}

/// Where a wrapped-server response goes
enum Pending {
    Client {
        client_id: RequestId,
        /// Template document the request was about
        context: Option<Url>,
    },
    Internal(oneshot::Sender<Value>),
}

struct Connection {
    tx: mpsc::UnboundedSender<Value>,
    generation: u64,
    stop: CancellationToken,
}

struct Shared {
    config: ProxyConfig,
    launcher: Arc<dyn Launcher>,
    documents: Documents,
    closed_maps: ClosedFileMaps,
    client: mpsc::UnboundedSender<Value>,
    server: Mutex<Option<Connection>>,
    /// Keyed by the id the proxy sent to the wrapped server
    pending: Mutex<HashMap<i64, Pending>>,
    /// Forwardable client requests until answered or cancelled
    in_flight: Mutex<HashMap<RequestId, InFlight>>,
    next_id: AtomicI64,
    /// Generated version the wrapped server has, per open template
    server_open: Mutex<HashMap<Url, i32>>,
    /// Translated wrapped-server diagnostics per template
    server_diagnostics: Mutex<HashMap<Url, Vec<Diagnostic>>>,
    init_params: Mutex<Option<Value>>,
    restart_tx: mpsc::UnboundedSender<()>,
    restarts: AtomicU32,
    generation: AtomicU64,
    shutting_down: AtomicBool,
}

impl Resolver for Shared {
    fn resolve(&self, uri: &str, direction: Direction) -> Option<Target> {
        match direction {
            Direction::ToGenerated => {
                let generated_uri = uri::to_generated(uri)?;
                let generated = self.documents.generated(&Url::parse(uri).ok()?)?;
                Some(Target {
                    uri: generated_uri,
                    map: generated.source_map.clone(),
                    version: Some(generated.server_version),
                })
            }
            Direction::ToTemplate => {
                let template_uri = uri::to_template(uri)?;
                let template = Url::parse(&template_uri).ok()?;
                if let Some(snapshot) = self.documents.snapshot(&template) {
                    if let Some(generated) = snapshot.generated {
                        return Some(Target {
                            uri: template_uri,
                            map: generated.source_map.clone(),
                            version: Some(snapshot.version),
                        });
                    }
                }
                let path = Url::parse(uri).ok()?.to_file_path().ok()?;
                let map = self.closed_maps.for_generated(&path)?;
                Some(Target {
                    uri: template_uri,
                    map,
                    version: None,
                })
            }
        }
    }
}

#[derive(Clone)]
struct Proxy {
    shared: Arc<Shared>,
}

/// `params.textDocument.uri`
fn text_document_uri(params: &Value) -> Option<Url> {
    params
        .get("textDocument")?
        .get("uri")?
        .as_str()
        .and_then(|s| Url::parse(s).ok())
}

fn is_template(uri: &Url) -> bool {
    uri::is_template(uri.as_str())
}

impl Proxy {
    fn send_client(&self, message: Value) {
        tracing::trace!(message = %message, "<- client");
        let _ = self.shared.client.send(message);
    }

    fn respond(&self, id: &RequestId, result: Value) {
        self.send_client(message::response(id, result));
    }

    fn show_error(&self, text: &str) {
        self.send_client(message::show_message(MessageType::ERROR, text));
    }

    /// Send to the wrapped server. False when there is none.
    fn send_server(&self, message: Value) -> bool {
        tracing::trace!(message = %message, "-> server");
        match lock(&self.shared.server).as_ref() {
            Some(connection) => connection.tx.send(message).is_ok(),
            None => false,
        }
    }

    fn has_server(&self) -> bool {
        lock(&self.shared.server).is_some()
    }

    fn next_id(&self) -> i64 {
        self.shared.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn rewrite(&self, value: &mut Value, direction: Direction, context: Option<&Target>) {
        Rewriter::new(self.shared.as_ref(), direction).rewrite(value, context);
    }

    /// Map for URI-less positions in a response about `template`
    fn response_context(&self, template: Option<&Url>) -> Option<Target> {
        let generated = uri::to_generated(template?.as_str())?;
        self.shared.resolve(&generated, Direction::ToTemplate)
    }

    async fn handle_client(&self, message: Message) -> Flow {
        match message {
            Message::Request { id, method, params } => match method.as_str() {
                "initialize" => self.initialize(id, params).await,
                "shutdown" => self.shutdown(id).await,
                "textDocument/formatting" if text_document_uri(&params).is_some_and(|u| is_template(&u)) => {
                    self.format(id, params)
                }
                _ => {
                    lock(&self.shared.in_flight).insert(id.clone(), InFlight::Waiting);
                    if text_document_uri(&params).is_some_and(|u| is_template(&u)) {
                        // May wait for regeneration; keep reading meanwhile
                        let proxy = self.clone();
                        tokio::spawn(async move { proxy.forward_request(id, method, params).await });
                    } else {
                        self.forward_request(id, method, params).await;
                    }
                }
            },
            Message::Notification { method, params } => match method.as_str() {
                "exit" => {
                    self.send_server(message::notification("exit", Value::Null));
                    return Flow::Exit;
                }
                "textDocument/didOpen" => self.did_open(params),
                "textDocument/didChange" => self.did_change(params),
                "textDocument/didClose" => self.did_close(params),
                "textDocument/didSave" if text_document_uri(&params).is_some_and(|u| is_template(&u)) => {}
                "$/cancelRequest" => self.cancel(params),
                _ => self.forward_notification(&method, params),
            },
            Message::Response { id, body } => match id {
                // Answer to a request the wrapped server made
                Some(id) => {
                    self.send_server(message::response_with_body(&id, body));
                }
                None => tracing::debug!("dropping client response without id"),
            },
        }
        Flow::Continue
    }

    // === Lifecycle ===

    async fn initialize(&self, id: RequestId, params: Value) {
        *lock(&self.shared.init_params) = Some(params.clone());
        match self.start_server(params).await {
            Ok(result) => self.respond(&id, capabilities::merge(result)),
            Err(err) => {
                tracing::error!(error = %err, "running without a language server");
                self.respond(&id, capabilities::standalone_result());
                self.show_error(&format!(
                    "templ: {}. Go language features are unavailable; template diagnostics and formatting still work.",
                    err
                ));
            }
        }
    }

    /// Launch the wrapped server and run its initialize handshake.
    async fn start_server(&self, params: Value) -> Result<Value, ProcessError> {
        let transport = self.shared.launcher.launch()?;
        let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let stop = CancellationToken::new();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(MessageWriter::new(transport.writer), rx, "server"));
        *lock(&self.shared.server) = Some(Connection {
            tx,
            generation,
            stop: stop.clone(),
        });
        tokio::spawn(
            self.clone()
                .server_read_loop(MessageReader::new(transport.reader), transport.child, generation, stop),
        );

        let (reply_tx, reply_rx) = oneshot::channel();
        let id = self.next_id();
        lock(&self.shared.pending).insert(id, Pending::Internal(reply_tx));
        self.send_server(message::request(&RequestId::Number(id), "initialize", params));

        let timeout = self.shared.config.startup_timeout;
        let failure = match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(body)) => match body.get("result") {
                Some(result) => return Ok(result.clone()),
                None => ProcessError::InitializeFailed(body.get("error").map(Value::to_string).unwrap_or_default()),
            },
            Ok(Err(_)) => ProcessError::Exited,
            Err(_) => ProcessError::StartupTimeout(timeout),
        };
        lock(&self.shared.pending).remove(&id);
        self.drop_connection(generation);
        Err(failure)
    }

    /// Forget connection `generation` and stop its process.
    fn drop_connection(&self, generation: u64) -> bool {
        let mut server = lock(&self.shared.server);
        if server.as_ref().map(|c| c.generation) != Some(generation) {
            return false;
        }
        if let Some(connection) = server.take() {
            connection.stop.cancel();
        }
        true
    }

    fn stop_server(&self) {
        self.shared.shutting_down.store(true, Ordering::Relaxed);
        if let Some(connection) = lock(&self.shared.server).take() {
            connection.stop.cancel();
        }
    }

    async fn shutdown(&self, id: RequestId) {
        self.shared.shutting_down.store(true, Ordering::Relaxed);
        if self.has_server() {
            let (reply_tx, reply_rx) = oneshot::channel();
            let server_id = self.next_id();
            lock(&self.shared.pending).insert(server_id, Pending::Internal(reply_tx));
            if self.send_server(message::request(&RequestId::Number(server_id), "shutdown", Value::Null)) {
                if tokio::time::timeout(SHUTDOWN_TIMEOUT, reply_rx).await.is_err() {
                    tracing::warn!("language server did not answer shutdown");
                }
            }
            lock(&self.shared.pending).remove(&server_id);
        }
        self.respond(&id, Value::Null);
    }

    async fn server_read_loop(
        self,
        mut reader: MessageReader<Box<dyn AsyncRead + Send + Unpin>>,
        child: Option<tokio::process::Child>,
        generation: u64,
        stop: CancellationToken,
    ) {
        // Dropping the child kills the process
        let _child = child;
        loop {
            let read = tokio::select! {
                _ = stop.cancelled() => break,
                read = reader.read() => read,
            };
            match read {
                Ok(Some(value)) => {
                    tracing::trace!(message = %value, "server ->");
                    // Rewriting may read and compile closed templates
                    let proxy = self.clone();
                    if let Err(err) = tokio::task::spawn_blocking(move || proxy.handle_server(value)).await {
                        tracing::error!(error = %err, "failed to handle language server message");
                    }
                }
                Ok(None) => break,
                Err(err) if err.is_fatal() => {
                    tracing::warn!(error = %err, "language server stream failed");
                    break;
                }
                Err(err) => tracing::warn!(error = %err, "unreadable message from language server"),
            }
        }
        self.server_gone(generation);
    }

    /// The connection ended. Fail what was in flight and ask the supervisor
    /// for a restart.
    fn server_gone(&self, generation: u64) {
        if !self.drop_connection(generation) {
            return;
        }
        tracing::warn!(generation, "language server exited");

        let pending: Vec<Pending> = lock(&self.shared.pending).drain().map(|(_, p)| p).collect();
        for entry in pending {
            if let Pending::Client { client_id, .. } = entry {
                self.send_client(message::error_response(
                    Some(&client_id),
                    code::INTERNAL_ERROR,
                    "language server exited",
                ));
            }
        }
        lock(&self.shared.in_flight).retain(|_, state| *state == InFlight::Waiting);
        lock(&self.shared.server_open).clear();

        if !self.shared.shutting_down.load(Ordering::Relaxed) {
            let _ = self.shared.restart_tx.send(());
        }
    }

    async fn supervise(self, mut restarts: mpsc::UnboundedReceiver<()>) {
        while restarts.recv().await.is_some() {
            if self.shared.shutting_down.load(Ordering::Relaxed) {
                continue;
            }
            let attempt = self.shared.restarts.fetch_add(1, Ordering::Relaxed) + 1;
            if attempt > self.shared.config.max_restarts {
                self.show_error("templ: the Go language server keeps exiting and will not be restarted.");
                continue;
            }
            let Some(params) = lock(&self.shared.init_params).clone() else {
                continue;
            };

            tracing::warn!(attempt, "restarting language server");
            match self.start_server(params).await {
                Ok(_) => {
                    self.send_server(message::notification("initialized", json!({})));
                    self.reopen_documents();
                }
                Err(err) => {
                    tracing::error!(error = %err, "restart failed");
                    let _ = self.shared.restart_tx.send(());
                }
            }
        }
    }

    fn reopen_documents(&self) {
        for uri in self.shared.documents.uris() {
            if let Some(generated) = self.shared.documents.generated(&uri) {
                self.sync_server(&uri, &generated);
            }
        }
    }

    // === Documents ===

    /// Bring the wrapped server's copy of `template`'s generated file up to
    /// `generated`: open it, replace its text, or leave it when current.
    fn sync_server(&self, template: &Url, generated: &Generated) {
        let Some(generated_uri) = uri::generated_url(template) else {
            return;
        };
        let mut open = lock(&self.shared.server_open);
        let message = match open.get(template) {
            Some(&sent) if sent >= generated.server_version => return,
            Some(_) => message::notification(
                "textDocument/didChange",
                json!({
                    "textDocument": {"uri": generated_uri, "version": generated.server_version},
                    "contentChanges": [{"text": generated.text}],
                }),
            ),
            None => message::notification(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": generated_uri,
                        "languageId": "go",
                        "version": generated.server_version,
                        "text": generated.text,
                    }
                }),
            ),
        };
        if self.send_server(message) {
            open.insert(template.clone(), generated.server_version);
        }
    }

    fn did_open(&self, params: Value) {
        let parsed: DidOpenTextDocumentParams = match serde_json::from_value(params.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "malformed didOpen");
                return;
            }
        };
        let document = parsed.text_document;
        if is_template(&document.uri) {
            self.shared.documents.open(document.uri, document.text, document.version);
        } else {
            self.forward_notification("textDocument/didOpen", params);
        }
    }

    fn did_change(&self, params: Value) {
        let parsed: DidChangeTextDocumentParams = match serde_json::from_value(params.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "malformed didChange");
                return;
            }
        };
        let document = parsed.text_document;
        if !is_template(&document.uri) {
            self.forward_notification("textDocument/didChange", params);
            return;
        }
        if let Err(err) = self
            .shared
            .documents
            .change(&document.uri, document.version, parsed.content_changes)
        {
            tracing::warn!(error = %err, "didChange ignored");
        }
    }

    fn did_close(&self, params: Value) {
        let parsed: DidCloseTextDocumentParams = match serde_json::from_value(params.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "malformed didClose");
                return;
            }
        };
        let uri = parsed.text_document.uri;
        if !is_template(&uri) {
            self.forward_notification("textDocument/didClose", params);
            return;
        }

        self.shared.documents.close(&uri);
        lock(&self.shared.server_diagnostics).remove(&uri);
        if lock(&self.shared.server_open).remove(&uri).is_some() {
            if let Some(generated_uri) = uri::generated_url(&uri) {
                self.send_server(message::notification(
                    "textDocument/didClose",
                    json!({"textDocument": {"uri": generated_uri}}),
                ));
            }
        }
        self.send_diagnostics(&uri, Vec::new());
    }

    /// Push each published generation to the wrapped server and refresh
    /// the template's diagnostics.
    async fn publish_loop(self, mut published: mpsc::UnboundedReceiver<Published>) {
        while let Some(Published { uri, generated, errors }) = published.recv().await {
            if !self.shared.documents.is_open(&uri) {
                continue;
            }
            self.sync_server(&uri, &generated);
            self.publish_union(&uri, &errors);
        }
    }

    fn publish_union(&self, uri: &Url, errors: &[crate::error::CompileError]) {
        let mut all = diagnostics::template_diagnostics(errors);
        if let Some(server) = lock(&self.shared.server_diagnostics).get(uri) {
            all.extend(server.iter().cloned());
        }
        self.send_diagnostics(uri, all);
    }

    fn send_diagnostics(&self, uri: &Url, diagnostics: Vec<Diagnostic>) {
        let params = PublishDiagnosticsParams {
            uri: uri.clone(),
            diagnostics,
            version: None,
        };
        self.send_client(message::notification(
            "textDocument/publishDiagnostics",
            serde_json::to_value(params).unwrap_or(Value::Null),
        ));
    }

    // === Requests ===

    fn format(&self, id: RequestId, params: Value) {
        let edits = serde_json::from_value::<DocumentFormattingParams>(params)
            .ok()
            .and_then(|p| self.shared.documents.snapshot(&p.text_document.uri))
            .map(|snapshot| {
                format::format_edit(&snapshot.text)
                    .map(|(span, new_text)| {
                        vec![TextEdit {
                            range: range_to_lsp(span),
                            new_text,
                        }]
                    })
                    .unwrap_or_default()
            });
        match edits {
            Some(edits) => self.respond(&id, serde_json::to_value(edits).unwrap_or(Value::Null)),
            None => self.respond(&id, Value::Null),
        }
    }

    async fn forward_request(&self, id: RequestId, method: String, mut params: Value) {
        let template = text_document_uri(&params).filter(is_template);
        if let Some(uri) = &template {
            let synced = self
                .shared
                .documents
                .wait_synced(uri, self.shared.config.sync_timeout)
                .await;
            match synced {
                Some(generated) => self.sync_server(uri, &generated),
                None if self.shared.documents.is_open(uri) => {
                    lock(&self.shared.in_flight).remove(&id);
                    self.respond(&id, Value::Null);
                    return;
                }
                None => {}
            }
        }

        if !self.has_server() {
            if lock(&self.shared.in_flight).remove(&id).is_none() {
                self.respond_cancelled(&id);
            } else if template.is_some() || method.starts_with("textDocument/") {
                self.respond(&id, Value::Null);
            } else {
                let err = ProtocolError::MethodNotFound(method);
                self.send_client(message::error_response(Some(&id), err.code(), &err.to_string()));
            }
            return;
        }

        self.rewrite(&mut params, Direction::ToGenerated, None);
        let server_id = self.next_id();
        let cancelled = {
            let mut in_flight = lock(&self.shared.in_flight);
            if in_flight.contains_key(&id) {
                in_flight.insert(id.clone(), InFlight::Forwarded(server_id));
                lock(&self.shared.pending).insert(
                    server_id,
                    Pending::Client {
                        client_id: id.clone(),
                        context: template,
                    },
                );
                false
            } else {
                true
            }
        };
        if cancelled {
            self.respond_cancelled(&id);
            return;
        }

        if !self.send_server(message::request(&RequestId::Number(server_id), &method, params)) {
            lock(&self.shared.pending).remove(&server_id);
            lock(&self.shared.in_flight).remove(&id);
            self.respond(&id, Value::Null);
        }
    }

    /// Cancelled before it reached the wrapped server
    fn respond_cancelled(&self, id: &RequestId) {
        self.send_client(message::error_response(Some(id), code::REQUEST_CANCELLED, "request cancelled"));
    }

    fn forward_notification(&self, method: &str, mut params: Value) {
        self.rewrite(&mut params, Direction::ToGenerated, None);
        self.send_server(message::notification(method, params));
    }

    fn cancel(&self, params: Value) {
        let Some(id) = params.get("id").cloned().and_then(|id| serde_json::from_value::<RequestId>(id).ok()) else {
            return;
        };
        let state = lock(&self.shared.in_flight).remove(&id);
        match state {
            Some(InFlight::Forwarded(server_id)) => {
                self.send_server(message::notification("$/cancelRequest", json!({"id": server_id})));
            }
            Some(InFlight::Waiting) => tracing::debug!(?id, "cancelled before forwarding"),
            None => {}
        }
    }

    // === Wrapped server traffic ===

    fn handle_server(&self, value: Value) {
        let message = match Message::parse(value) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "invalid message from language server");
                return;
            }
        };

        match message {
            Message::Response {
                id: Some(RequestId::Number(id)),
                mut body,
            } => {
                let pending = lock(&self.shared.pending).remove(&id);
                match pending {
                    Some(Pending::Client { client_id, context }) => {
                        lock(&self.shared.in_flight).remove(&client_id);
                        if let Some(result) = body.get_mut("result") {
                            let context = self.response_context(context.as_ref());
                            self.rewrite(result, Direction::ToTemplate, context.as_ref());
                        }
                        self.send_client(message::response_with_body(&client_id, body));
                    }
                    Some(Pending::Internal(reply)) => {
                        let _ = reply.send(body);
                    }
                    None => tracing::debug!(id, "response to unknown request"),
                }
            }
            Message::Response { id, .. } => tracing::debug!(?id, "unexpected response from language server"),
            Message::Notification { method, params } if method == "textDocument/publishDiagnostics" => {
                self.server_diagnostics(params)
            }
            Message::Notification { method, mut params } => {
                self.rewrite(&mut params, Direction::ToTemplate, None);
                self.send_client(message::notification(&method, params));
            }
            Message::Request { id, method, mut params } => {
                self.rewrite(&mut params, Direction::ToTemplate, None);
                self.send_client(message::request(&id, &method, params));
            }
        }
    }

    fn server_diagnostics(&self, params: Value) {
        let parsed: PublishDiagnosticsParams = match serde_json::from_value(params.clone()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(error = %err, "malformed publishDiagnostics");
                return;
            }
        };
        let target = self.shared.resolve(parsed.uri.as_str(), Direction::ToTemplate);
        let Some(target) = target else {
            self.send_client(message::notification("textDocument/publishDiagnostics", params));
            return;
        };
        let Ok(template) = Url::parse(&target.uri) else {
            return;
        };

        let mut translated = diagnostics::translate(parsed.diagnostics, &target.map, self.shared.config.no_mans_land);
        for diagnostic in &mut translated {
            let Some(related) = diagnostic.related_information.take() else {
                continue;
            };
            let mut value = serde_json::to_value(&related).unwrap_or(Value::Null);
            self.rewrite(&mut value, Direction::ToTemplate, None);
            diagnostic.related_information = serde_json::from_value(value).ok();
        }
        lock(&self.shared.server_diagnostics).insert(template.clone(), translated);

        let errors = self
            .shared
            .documents
            .snapshot(&template)
            .map(|s| s.errors)
            .unwrap_or_default();
        self.publish_union(&template, &errors);
    }
}
