use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::state::GenerationState;

/// Everything a run reports to `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        brief_chars: usize,
        reference_images: usize,
        retry_count: u32,
    },
    GenerationState(GenerationState),
    AssetFallback {
        asset: String,
        error: String,
    },
    ProductDetailsDegraded {
        slot: usize,
        error: String,
    },
    VariationDegraded {
        slot: usize,
        error: String,
    },
    RunFailed {
        message: String,
        transient: bool,
        error: String,
    },
    RunCompleted {
        store_name: String,
        products: usize,
        degraded_slots: usize,
        handoff_delay_ms: u64,
    },
}

/// Append-only writer for `events.jsonl`.
///
/// Each line is one compact object carrying `type`, `run_id` and `ts`
/// next to the event's own fields.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    run_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                run_id: run_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn emit(&self, event: &RunEvent) -> anyhow::Result<Value> {
        let Value::Object(body) = serde_json::to_value(event)? else {
            anyhow::bail!("run event did not serialize to an object");
        };
        let mut line = Map::new();
        line.insert(
            "run_id".to_string(),
            Value::String(self.inner.run_id.clone()),
        );
        line.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in body {
            line.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let encoded = serde_json::to_string(&line)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(encoded.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(line))
    }
}

/// Receives run events as the orchestrator publishes them.
pub trait RunObserver {
    fn observe(&self, event: &RunEvent);
}

impl RunObserver for EventWriter {
    fn observe(&self, event: &RunEvent) {
        if let Err(err) = self.emit(event) {
            tracing::warn!(path = %self.inner.path.display(), "event write failed: {err:#}");
        }
    }
}

impl RunObserver for Sender<RunEvent> {
    fn observe(&self, event: &RunEvent) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.send(event.clone());
    }
}

impl RunObserver for () {
    fn observe(&self, _event: &RunEvent) {}
}

impl<A: RunObserver, B: RunObserver> RunObserver for (A, B) {
    fn observe(&self, event: &RunEvent) {
        self.0.observe(event);
        self.1.observe(event);
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
