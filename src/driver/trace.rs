//! Effect traces.
//!
//! A traced run records every effect the driver performed, nested processes
//! included. Entries are appended when an effect settles, so the effects of a
//! nested process appear before the entry of the effect that started it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::effect::EffectKind;
use crate::types::Result;

/// How a recorded effect settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceOutcome {
    Resolved { value: Value },
    Rejected { error: String },
}

/// One performed effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Nesting depth of the process that yielded the effect (0 = top level).
    pub depth: u32,
    /// Name of the process that yielded the effect.
    pub process: String,
    /// Name of the function, method or nested process performed.
    pub effect: String,
    pub kind: EffectKind,
    /// Empty when argument recording is disabled.
    pub args: Vec<Value>,
    pub outcome: TraceOutcome,
    pub started_at: DateTime<Utc>,
    pub elapsed_us: u64,
}

/// Ordered record of a traced run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectTrace {
    entries: Vec<TraceEntry>,
}

impl EffectTrace {
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Effect names in settlement order.
    pub fn effect_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.effect.as_str()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Shared sink the driver appends to while a traced run is in flight.
#[derive(Debug, Clone, Default)]
pub(crate) struct TraceRecorder {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
}

/// An effect that has started but not yet settled.
#[derive(Debug)]
pub(crate) struct OpenEntry {
    depth: u32,
    process: String,
    effect: String,
    kind: EffectKind,
    args: Vec<Value>,
    started_at: DateTime<Utc>,
    clock: Instant,
}

impl TraceRecorder {
    pub(crate) fn open(
        &self,
        depth: u32,
        process: &str,
        effect: &str,
        kind: EffectKind,
        args: Vec<Value>,
    ) -> OpenEntry {
        OpenEntry {
            depth,
            process: process.to_string(),
            effect: effect.to_string(),
            kind,
            args,
            started_at: Utc::now(),
            clock: Instant::now(),
        }
    }

    pub(crate) fn close(&self, open: OpenEntry, outcome: TraceOutcome) {
        let entry = TraceEntry {
            depth: open.depth,
            process: open.process,
            effect: open.effect,
            kind: open.kind,
            args: open.args,
            outcome,
            started_at: open.started_at,
            elapsed_us: u64::try_from(open.clock.elapsed().as_micros()).unwrap_or(u64::MAX),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub(crate) fn finish(&self) -> EffectTrace {
        let entries = std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner));
        EffectTrace { entries }
    }
}
