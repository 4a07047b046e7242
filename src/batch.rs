//! Batch generation over files and directory trees.
//!
//! A fixed-size rayon pool runs one parse, generate and write pipeline per
//! file; outcomes are sent over a channel to the aggregating caller.

use crate::error::CompileError;
use crate::generate::{GenerateOptions, visualize};
use crate::{TranspileResult, generated_path, generator_marker, transpile_with};
use rayon::ThreadPoolBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::{fs, io};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{0} does not exist")]
    MissingPath(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to serialize source map for {path}: {source}")]
    SourceMap { path: PathBuf, source: serde_json::Error },

    #[error("failed to walk {path}: {source}")]
    Walk { path: PathBuf, source: walkdir::Error },

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Batch configuration
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker count
    pub workers: usize,
    /// Write `<name>_templ.go.map.json` next to each output
    pub source_map: bool,
    /// Write `<name>_templ_sourcemap.html` next to each output
    pub visualisations: bool,
    pub include_version: bool,
    pub include_timestamp: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            source_map: false,
            visualisations: false,
            include_version: true,
            include_timestamp: false,
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Result of generating one template file
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub output: PathBuf,
    /// Template source, kept for rendering errors
    pub source: String,
    pub errors: Vec<CompileError>,
    /// False when the output already had identical content
    pub written: bool,
}

impl FileOutcome {
    /// One `file:line:col: message` line per error
    pub fn error_lines(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(|e| {
                let start = e.span().start;
                format!("{}:{}:{}: {}", self.path.display(), start.line + 1, start.col + 1, e.message())
            })
            .collect()
    }

    /// Each error with its source line and carets under the span
    pub fn rendered_errors(&self, color: bool) -> Vec<String> {
        let filename = self.path.display().to_string();
        self.errors
            .iter()
            .map(|e| {
                if color {
                    e.render_color(&self.source, &filename)
                } else {
                    e.render(&self.source, &filename)
                }
            })
            .collect()
    }
}

/// Aggregated batch result
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    /// Files that could not be processed at all
    pub failures: Vec<BatchError>,
}

impl BatchReport {
    pub fn files(&self) -> usize {
        self.outcomes.len()
    }

    pub fn written(&self) -> usize {
        self.outcomes.iter().filter(|o| o.written).count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.errors.len()).sum()
    }
}

pub fn is_template(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "templ")
}

/// Every `.templ` file under `root`, sorted. Hidden directories are skipped.
pub fn find_templates(root: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.exists() {
        return Err(BatchError::MissingPath(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        e.depth() == 0 || !e.file_name().to_str().is_some_and(|name| name.starts_with('.'))
    });
    for entry in walker {
        let entry = entry.map_err(|source| BatchError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_template(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Write only if the content changed. Returns whether it wrote.
fn write_if_changed(path: &Path, content: &str) -> Result<bool, BatchError> {
    if fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        return Ok(false);
    }
    fs::write(path, content).map_err(|source| BatchError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// A compiled template not yet written out
#[derive(Debug)]
pub struct Compiled {
    pub path: PathBuf,
    pub source: String,
    pub result: TranspileResult,
}

/// Read and compile one file without touching the output.
pub fn compile_file(path: &Path, options: &BatchOptions) -> Result<Compiled, BatchError> {
    let source = fs::read_to_string(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("templ.templ")
        .to_string();
    let generate_options = GenerateOptions {
        file_name,
        include_version: options.include_version,
        include_timestamp: options.include_timestamp,
        ..GenerateOptions::default()
    };
    let result = transpile_with(&source, &generate_options);

    Ok(Compiled {
        path: path.to_path_buf(),
        source,
        result,
    })
}

impl Compiled {
    /// Write the Go output and requested sidecars.
    pub fn write(self, options: &BatchOptions) -> Result<FileOutcome, BatchError> {
        let Compiled { path, source, result } = self;
        let output = generated_path(&path);
        let written = write_if_changed(&output, &result.code)?;

        if options.source_map {
            let json = result
                .source_map
                .to_json(&generator_marker())
                .map_err(|source| BatchError::SourceMap {
                    path: path.clone(),
                    source,
                })?;
            let mut map_path = output.clone().into_os_string();
            map_path.push(".map.json");
            write_if_changed(Path::new(&map_path), &json)?;
        }

        if options.visualisations {
            let page = visualize::render(&source, &result.code, &result.source_map);
            let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("templ");
            let html_path = output.with_file_name(format!("{}_sourcemap.html", stem));
            write_if_changed(&html_path, &page)?;
        }

        tracing::debug!(path = %path.display(), written, errors = result.errors.len(), "generated file");

        Ok(FileOutcome {
            path,
            output,
            source,
            errors: result.errors,
            written,
        })
    }
}

/// Generate one file: read, compile, write.
pub fn generate_file(path: &Path, options: &BatchOptions) -> Result<FileOutcome, BatchError> {
    compile_file(path, options)?.write(options)
}

/// Generate every file on a pool of `options.workers` threads.
pub fn run(paths: &[PathBuf], options: &BatchOptions) -> Result<BatchReport, BatchError> {
    let pool = ThreadPoolBuilder::new().num_threads(options.workers.max(1)).build()?;
    let (tx, rx) = mpsc::channel();

    pool.scope(|scope| {
        for path in paths {
            let tx = tx.clone();
            scope.spawn(move |_| {
                // The receiver outlives the scope
                let _ = tx.send(generate_file(path, options));
            });
        }
    });
    drop(tx);

    let mut report = BatchReport::default();
    for outcome in rx {
        match outcome {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(err) => {
                tracing::warn!("{}", err);
                report.failures.push(err);
            }
        }
    }
    report.outcomes.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::info!(
        files = report.files(),
        written = report.written(),
        errors = report.error_count(),
        "batch complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_templates_skips_hidden_dirs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/.git")).unwrap();
        fs::write(temp.path().join("a/x.templ"), "package a\n").unwrap();
        fs::write(temp.path().join("a/.git/y.templ"), "package a\n").unwrap();
        fs::write(temp.path().join("a/z.go"), "package a\n").unwrap();

        let files = find_templates(temp.path()).unwrap();
        assert_eq!(files, vec![temp.path().join("a/x.templ")]);
    }

    #[test]
    fn test_missing_path() {
        let err = find_templates(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, BatchError::MissingPath(_)));
    }

    #[test]
    fn test_unchanged_output_is_not_rewritten() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.templ");
        fs::write(&path, "package main\n\ntempl Hello() {\n\t<p>hi</p>\n}\n").unwrap();

        let options = BatchOptions::default();
        assert!(generate_file(&path, &options).unwrap().written);
        assert!(!generate_file(&path, &options).unwrap().written);
        assert!(temp.path().join("hello_templ.go").exists());
    }

    #[test]
    fn test_sidecars() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("page.templ");
        fs::write(&path, "package main\n\ntempl Page(x string) {\n\t<p>{ x }</p>\n}\n").unwrap();

        let options = BatchOptions {
            source_map: true,
            visualisations: true,
            ..BatchOptions::default()
        };
        generate_file(&path, &options).unwrap();
        let json = fs::read_to_string(temp.path().join("page_templ.go.map.json")).unwrap();
        assert!(json.contains(&generator_marker()));
        assert!(temp.path().join("page_templ_sourcemap.html").exists());
    }

    #[test]
    fn test_error_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.templ");
        fs::write(&path, "package main\n\ntempl Bad() {\n\t<p>{ }</p>\n}\n").unwrap();

        let outcome = generate_file(&path, &BatchOptions::default()).unwrap();
        let lines = outcome.error_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(":4:5: Empty expression"), "{}", lines[0]);
    }

    #[test]
    fn test_rendered_errors_show_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.templ");
        fs::write(&path, "package main\n\ntempl Bad() {\n\t<p>{ }</p>\n}\n").unwrap();

        let outcome = generate_file(&path, &BatchOptions::default()).unwrap();
        let rendered = outcome.rendered_errors(false);
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].contains(" file: "), "{}", rendered[0]);
        assert!(rendered[0].contains("bad.templ:4:5"));
        assert!(rendered[0].contains("error: Empty expression"));
        assert!(rendered[0].contains(" 4 | \t<p>{ }</p>"));
        assert!(rendered[0].contains("^"));
        assert!(!rendered[0].contains('\x1b'));
    }
}
