//! JSON-lines edge import.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use netpack::{Attrs, EdgeRecord, GraphError, GraphStore, IngestOptions, IngestSummary, IntoEdge};
use serde_json::Value;

use super::CliError;

/// One input line: a parsed edge tuple, or the reason it could not be parsed.
pub struct JsonEdge {
    line: usize,
    parsed: Result<Value, serde_json::Error>,
}

impl IntoEdge for JsonEdge {
    fn into_edge(self) -> netpack::Result<EdgeRecord> {
        let value = self
            .parsed
            .map_err(|err| GraphError::InvalidEdgeShape(format!("line {}: {err}", self.line)))?;
        value.into_edge().map_err(|err| match err {
            GraphError::InvalidEdgeShape(msg) => {
                GraphError::InvalidEdgeShape(format!("line {}: {msg}", self.line))
            }
            other => other,
        })
    }
}

/// Non-blank lines of a JSON-lines file. Read failures end the iteration and
/// are kept for the caller.
pub struct JsonLines<R> {
    lines: Lines<R>,
    line: usize,
    error: Option<std::io::Error>,
}

impl<R: BufRead> JsonLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            error: None,
        }
    }

    pub fn take_error(&mut self) -> Option<std::io::Error> {
        self.error.take()
    }
}

impl<R: BufRead> Iterator for JsonLines<R> {
    type Item = JsonEdge;

    fn next(&mut self) -> Option<JsonEdge> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(err) => {
                    self.error = Some(err);
                    return None;
                }
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(JsonEdge {
                line: self.line,
                parsed: serde_json::from_str(&text),
            });
        }
    }
}

#[derive(Debug)]
pub struct ImportConfig<'a> {
    pub edges: &'a Path,
    pub batch_size: usize,
    pub layer: Option<String>,
    pub compute_length: bool,
}

/// Streams `cfg.edges` into `store`, reporting each committed batch to
/// `progress`.
pub fn run_import(
    store: &GraphStore,
    cfg: &ImportConfig<'_>,
    progress: &mut dyn FnMut(usize),
) -> Result<IngestSummary, CliError> {
    let file = File::open(cfg.edges).map_err(|source| CliError::Open {
        path: cfg.edges.to_path_buf(),
        source,
    })?;
    let mut defaults = Attrs::new();
    if let Some(layer) = &cfg.layer {
        defaults.insert(netpack::graph::LAYER_KEY, layer.as_str());
    }
    let opts = IngestOptions::from_store(store.options())
        .batch_size(cfg.batch_size)
        .defaults(defaults)
        .compute_length(cfg.compute_length);

    let mut lines = JsonLines::new(BufReader::new(file));
    let summary = store.ingest(&mut lines, &opts, Some(progress))?;
    if let Some(err) = lines.take_error() {
        return Err(CliError::Io(err));
    }
    Ok(summary)
}
