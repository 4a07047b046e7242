//! Open template documents and their generated counterparts.
//!
//! Each edit bumps the document's revision, cancels any pending
//! regeneration and schedules a new one after the debounce delay. A document
//! compiles on the blocking pool one regeneration at a time; later edits wait
//! for the running one and only publish if the revision they captured is
//! still current, so a slow compile of old text can never overwrite a newer
//! result.

use super::error::ProtocolError;
use crate::error::CompileError;
use crate::generate::GenerateOptions;
use crate::parser::positions::LineIndex;
use crate::sourcemap::SourceMap;
use crate::{generated_path, generator_marker, template_path, transpile_with};
use lsp_types::{TextDocumentContentChangeEvent, Url};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// Text changed since the last published generation
    Dirty,
    Synced,
}

/// Generated text and source map, replaced together
#[derive(Debug)]
pub struct Generated {
    pub text: String,
    pub source_map: Arc<SourceMap>,
    /// Version of the generated document as seen by the wrapped server
    pub server_version: i32,
}

#[derive(Debug)]
struct Document {
    text: String,
    /// Client version
    version: i32,
    revision: u64,
    state: DocumentState,
    generated: Option<Arc<Generated>>,
    errors: Vec<CompileError>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Handle {
    document: Mutex<Document>,
    published: watch::Sender<u64>,
    /// Held for the duration of a compile
    compiling: tokio::sync::Mutex<()>,
}

/// Sent whenever a regeneration publishes
#[derive(Debug, Clone)]
pub struct Published {
    pub uri: Url,
    pub generated: Arc<Generated>,
    pub errors: Vec<CompileError>,
}

/// Snapshot of one open document
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub text: String,
    pub version: i32,
    pub state: DocumentState,
    pub generated: Option<Arc<Generated>>,
    pub errors: Vec<CompileError>,
}

#[derive(Clone)]
pub struct Documents {
    inner: Arc<Inner>,
}

struct Inner {
    table: Mutex<HashMap<Url, Arc<Handle>>>,
    debounce: Duration,
    options: GenerateOptions,
    events: mpsc::UnboundedSender<Published>,
}

impl Documents {
    /// Create a synchronizer; published generations arrive on the receiver.
    pub fn new(debounce: Duration, options: GenerateOptions) -> (Self, mpsc::UnboundedReceiver<Published>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            table: Mutex::new(HashMap::new()),
            debounce,
            options,
            events,
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    fn handle(&self, uri: &Url) -> Option<Arc<Handle>> {
        lock(&self.inner.table).get(uri).cloned()
    }

    pub fn open(&self, uri: Url, text: String, version: i32) {
        let (published, _) = watch::channel(0);
        let handle = Arc::new(Handle {
            document: Mutex::new(Document {
                text,
                version,
                revision: 1,
                state: DocumentState::Dirty,
                generated: None,
                errors: Vec::new(),
                cancel: CancellationToken::new(),
            }),
            published,
            compiling: tokio::sync::Mutex::new(()),
        });
        if let Some(old) = lock(&self.inner.table).insert(uri.clone(), handle.clone()) {
            lock(&old.document).cancel.cancel();
        }
        tracing::debug!(%uri, version, "opened");
        self.schedule(uri, handle, Duration::ZERO);
    }

    /// Apply full or incremental changes.
    pub fn change(
        &self,
        uri: &Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<(), ProtocolError> {
        let handle = self
            .handle(uri)
            .ok_or_else(|| ProtocolError::InvalidRequest(format!("{} is not open", uri)))?;
        {
            let mut doc = lock(&handle.document);
            for change in &changes {
                apply_change(&mut doc.text, change);
            }
            doc.version = version;
            doc.revision += 1;
            doc.state = DocumentState::Dirty;
            tracing::trace!(%uri, version, revision = doc.revision, "changed");
        }
        self.schedule(uri.clone(), handle, self.inner.debounce);
        Ok(())
    }

    /// Forget a document. Returns its last generation, if any.
    pub fn close(&self, uri: &Url) -> Option<Arc<Generated>> {
        let handle = lock(&self.inner.table).remove(uri)?;
        let doc = lock(&handle.document);
        doc.cancel.cancel();
        tracing::debug!(%uri, "closed");
        doc.generated.clone()
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        lock(&self.inner.table).contains_key(uri)
    }

    pub fn uris(&self) -> Vec<Url> {
        let mut uris: Vec<Url> = lock(&self.inner.table).keys().cloned().collect();
        uris.sort();
        uris
    }

    pub fn snapshot(&self, uri: &Url) -> Option<Snapshot> {
        let handle = self.handle(uri)?;
        let doc = lock(&handle.document);
        Some(Snapshot {
            text: doc.text.clone(),
            version: doc.version,
            state: doc.state,
            generated: doc.generated.clone(),
            errors: doc.errors.clone(),
        })
    }

    /// Latest generation, without waiting.
    pub fn generated(&self, uri: &Url) -> Option<Arc<Generated>> {
        let handle = self.handle(uri)?;
        let generated = lock(&handle.document).generated.clone();
        generated
    }

    /// Wait (at most `timeout`) for the document to be Synced and return
    /// its generation. On timeout the last published generation is returned.
    pub async fn wait_synced(&self, uri: &Url, timeout: Duration) -> Option<Arc<Generated>> {
        let handle = self.handle(uri)?;
        let mut published = handle.published.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            {
                let doc = lock(&handle.document);
                if doc.state == DocumentState::Synced {
                    return doc.generated.clone();
                }
            }
            match tokio::time::timeout_at(deadline, published.changed()).await {
                Ok(Ok(())) => continue,
                _ => {
                    tracing::debug!(%uri, "timed out waiting for regeneration");
                    let generated = lock(&handle.document).generated.clone();
                    return generated;
                }
            }
        }
    }

    fn schedule(&self, uri: Url, handle: Arc<Handle>, delay: Duration) {
        let (token, revision) = {
            let mut doc = lock(&handle.document);
            doc.cancel.cancel();
            doc.cancel = CancellationToken::new();
            (doc.cancel.clone(), doc.revision)
        };
        let inner = self.inner.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let _compiling = tokio::select! {
                _ = token.cancelled() => return,
                guard = handle.compiling.lock() => guard,
            };
            if token.is_cancelled() {
                return;
            }

            let text = lock(&handle.document).text.clone();
            let mut options = inner.options.clone();
            if let Some(name) = uri.path_segments().and_then(|mut s| s.next_back()) {
                options.file_name = name.to_string();
            }
            let compiled = tokio::task::spawn_blocking(move || transpile_with(&text, &options)).await;
            let result = match compiled {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(%uri, error = %err, "regeneration failed");
                    return;
                }
            };

            let published = {
                let mut doc = lock(&handle.document);
                if token.is_cancelled() || doc.revision != revision {
                    tracing::trace!(%uri, revision, current = doc.revision, "stale regeneration discarded");
                    return;
                }
                let server_version = doc.generated.as_ref().map_or(1, |g| g.server_version + 1);
                let generated = Arc::new(Generated {
                    text: result.code,
                    source_map: Arc::new(result.source_map),
                    server_version,
                });
                doc.generated = Some(generated.clone());
                doc.errors = result.errors.clone();
                doc.state = DocumentState::Synced;
                Published {
                    uri: uri.clone(),
                    generated,
                    errors: result.errors,
                }
            };

            tracing::debug!(%uri, revision, errors = published.errors.len(), "published");
            handle.published.send_replace(revision);
            let _ = inner.events.send(published);
        });
    }
}

/// Apply one LSP content change to `text`.
pub fn apply_change(text: &mut String, change: &TextDocumentContentChangeEvent) {
    let Some(range) = change.range else {
        text.clone_from(&change.text);
        return;
    };
    let index = LineIndex::new(text);
    let start = index.offset(text, super::diagnostics::position_from_lsp(range.start));
    let end = index
        .offset(text, super::diagnostics::position_from_lsp(range.end))
        .max(start);
    text.replace_range(start..end, &change.text);
}

/// Source maps of templates that are not open.
///
/// The wrapped server reads the `_templ.go` files on disk, so a map has to
/// describe that file: a sidecar written by this version is used as is,
/// otherwise the template is recompiled with the header lines the generated
/// file actually starts with. Entries are refreshed when either file changes.
#[derive(Default)]
pub struct ClosedFileMaps {
    cache: Mutex<HashMap<PathBuf, (Stamp, Arc<SourceMap>)>>,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    template: SystemTime,
    generated: Option<SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Whether a generated file has the version and timestamp header lines
fn header_lines(generated: &str) -> (bool, bool) {
    let mut version = false;
    let mut timestamp = false;
    for line in generated
        .lines()
        .take_while(|l| l.is_empty() || l.starts_with("//"))
    {
        version |= line.starts_with("// templ: version:");
        timestamp |= line.starts_with("// templ: timestamp:");
    }
    (version, timestamp)
}

impl ClosedFileMaps {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            options,
        }
    }

    /// Source map for the template behind a generated `_templ.go` path.
    pub fn for_generated(&self, generated: &Path) -> Option<Arc<SourceMap>> {
        self.get(&template_path(generated)?)
    }

    /// Reads and may compile; call from blocking contexts.
    pub fn get(&self, template: &Path) -> Option<Arc<SourceMap>> {
        let generated = generated_path(template);
        let stamp = Stamp {
            template: modified(template)?,
            generated: modified(&generated),
        };
        if let Some((cached, map)) = lock(&self.cache).get(template) {
            if *cached == stamp {
                return Some(map.clone());
            }
        }

        let map = match read_sidecar(&generated, stamp.template) {
            Some(map) => map,
            None => self.rebuild(template, &generated)?,
        };
        let map = Arc::new(map);
        lock(&self.cache).insert(template.to_path_buf(), (stamp, map.clone()));
        tracing::trace!(path = %template.display(), "cached source map");
        Some(map)
    }

    fn rebuild(&self, template: &Path, generated: &Path) -> Option<SourceMap> {
        let source = std::fs::read_to_string(template).ok()?;
        let mut options = self.options.clone();
        if let Some(name) = template.file_name().and_then(|n| n.to_str()) {
            options.file_name = name.to_string();
        }
        if let Ok(existing) = std::fs::read_to_string(generated) {
            (options.include_version, options.include_timestamp) = header_lines(&existing);
        }
        Some(transpile_with(&source, &options).source_map)
    }
}

/// `<name>_templ.go.map.json`, if this version wrote it after the template
/// last changed
fn read_sidecar(generated: &Path, template_modified: SystemTime) -> Option<SourceMap> {
    let mut path = generated.as_os_str().to_owned();
    path.push(".map.json");
    let path = PathBuf::from(path);
    if modified(&path)? < template_modified {
        return None;
    }
    let json = std::fs::read_to_string(&path).ok()?;
    let (marker, map) = SourceMap::from_json(&json).ok()?;
    if marker != generator_marker() {
        tracing::debug!(path = %path.display(), %marker, "ignoring source map from another version");
        return None;
    }
    Some(map)
}
