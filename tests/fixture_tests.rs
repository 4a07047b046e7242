//! Source map properties checked over every template in `tests/fixtures`.
//!
//! Files named `error_*.templ` are expected to report errors; everything
//! else must compile cleanly.

use libtest_mimic::{Arguments, Failed, Trial};
use std::fs;
use std::path::{Path, PathBuf};
use templ_transpiler::parser::LineIndex;
use templ_transpiler::{GenerateOptions, Position, Span, TranspileResult, transpile_with};

fn main() {
    let args = Arguments::from_args();
    let pattern = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/*.templ");

    let mut trials = Vec::new();
    for path in glob::glob(pattern).expect("valid glob pattern").flatten() {
        let name = path.file_stem().unwrap().to_string_lossy().to_string();
        trials.push(Trial::test(name, move || check(&path)));
    }
    libtest_mimic::run(&args, trials).exit();
}

fn compile(path: &Path, source: &str) -> TranspileResult {
    let options = GenerateOptions {
        file_name: path.file_name().unwrap().to_string_lossy().to_string(),
        ..GenerateOptions::default()
    };
    transpile_with(source, &options)
}

fn slice<'a>(text: &'a str, span: Span) -> &'a str {
    let index = LineIndex::new(text);
    &text[index.offset(text, span.start)..index.offset(text, span.end)]
}

fn check(path: &PathBuf) -> Result<(), Failed> {
    let source = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let expect_errors = path
        .file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with("error_"));

    let result = compile(path, &source);

    if expect_errors && result.errors.is_empty() {
        return Err("expected errors, compiled cleanly".into());
    }
    if !expect_errors && !result.errors.is_empty() {
        let messages: Vec<String> = result.errors.iter().map(|e| e.message().to_string()).collect();
        return Err(format!("unexpected errors: {:?}", messages).into());
    }
    if !result.code.starts_with("// Code generated by templ - DO NOT EDIT.\n") {
        return Err("missing generated-code header".into());
    }

    check_deterministic(path, &source, &result)?;
    check_errors_within_source(&source, &result)?;
    check_entries(&source, &result)?;
    Ok(())
}

fn check_deterministic(path: &Path, source: &str, first: &TranspileResult) -> Result<(), Failed> {
    let second = compile(path, source);
    if second.code != first.code {
        return Err("generated code differs between runs".into());
    }
    if second.source_map != first.source_map {
        return Err("source map differs between runs".into());
    }
    Ok(())
}

fn check_errors_within_source(source: &str, result: &TranspileResult) -> Result<(), Failed> {
    let end = LineIndex::new(source).end(source);
    for error in &result.errors {
        let span = error.span();
        if span.start > span.end || span.end > end {
            return Err(format!("error `{}` at {:?} lies outside the source", error.message(), span).into());
        }
    }
    Ok(())
}

fn check_entries(source: &str, result: &TranspileResult) -> Result<(), Failed> {
    let map = &result.source_map;
    let mut previous: Option<Position> = None;

    for entry in map.entries() {
        // Same text on both sides
        let template = slice(source, entry.template);
        let generated = slice(&result.code, entry.generated);
        if template != generated {
            return Err(format!("entry {:?} maps {:?} to {:?}", entry, template, generated).into());
        }

        // Emission order is generated order
        if previous.is_some_and(|p| p > entry.generated.start) {
            return Err(format!("entry {:?} is out of generated order", entry).into());
        }
        previous = Some(entry.generated.end);

        // Round trip from the start of the entry
        let start = entry.template.start;
        let there = map.to_generated(start);
        let back = map.to_template(there);
        if back != start {
            return Err(format!("{:?} came back as {:?}", start, back).into());
        }
    }
    Ok(())
}
