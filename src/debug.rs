use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Opt-in JSON-lines diagnostics sink. Set to a file path to capture one
/// event object per line plus a final counter summary per assembly.
pub const DIAG_ENV_VAR: &str = "OVERPRINT_DEBUG_JSON";

#[derive(Clone)]
pub struct DiagLogger {
    inner: Arc<Mutex<DiagState>>,
}

struct DiagState {
    writer: BufWriter<File>,
    counters: HashMap<String, u64>,
}

impl DiagLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DiagState {
                writer: BufWriter::new(file),
                counters: HashMap::new(),
            })),
        })
    }

    /// Logger configured from [`DIAG_ENV_VAR`], or `None` when unset. A path
    /// that cannot be created disables diagnostics rather than failing the
    /// export.
    pub fn from_env() -> Option<Self> {
        let path = std::env::var(DIAG_ENV_VAR).ok()?;
        if path.trim().is_empty() {
            return None;
        }
        DiagLogger::new(path).ok()
    }

    pub fn event(&self, kind: &str, fields: Value) {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(kind.to_string()));
        if let Value::Object(extra) = fields {
            object.extend(extra);
        }
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{}", Value::Object(object));
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Writes the counter summary and clears the counters.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts: Map<String, Value> = counters
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect();
            let line = json!({
                "type": "diag.summary",
                "context": context,
                "counts": counts,
            });
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
