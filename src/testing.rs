//! Deterministic collaborators for unit tests

use crate::clock::Clock;
use crate::config::Settings;
use crate::embeddings::Embedder;
use crate::index::SqliteIndex;
use crate::memory::Memories;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Embedder backed by a lookup table. Unknown texts embed to the zero vector.
pub struct TableEmbedder {
    dim: usize,
    table: RefCell<HashMap<String, Vec<f32>>>,
    failing: RefCell<HashSet<String>>,
}

impl TableEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            table: RefCell::new(HashMap::new()),
            failing: RefCell::new(HashSet::new()),
        }
    }

    pub fn set(&self, text: &str, vector: Vec<f32>) {
        self.table.borrow_mut().insert(text.to_string(), vector);
    }

    /// Make every later embedding of `text` fail
    pub fn fail_on(&self, text: &str) {
        self.failing.borrow_mut().insert(text.to_string());
    }
}

impl Embedder for TableEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        let table = self.table.borrow();
        let failing = self.failing.borrow();
        texts
            .iter()
            .map(|text| {
                if failing.contains(*text) {
                    return Err(format!("embedding refused for {:?}", text));
                }
                Ok(table.get(*text).cloned().unwrap_or_else(|| vec![0.0; self.dim]))
            })
            .collect()
    }
}

impl<E: Embedder> Embedder for Rc<E> {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, String> {
        self.as_ref().embed_batch(texts)
    }
}

/// Clock that advances by `step` every time it is read
pub struct StepClock {
    start: DateTime<Utc>,
    step: Duration,
    ticks: Cell<i32>,
}

impl StepClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            start,
            step,
            ticks: Cell::new(0),
        }
    }
}

impl Default for StepClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start, Duration::minutes(1))
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.ticks.get();
        self.ticks.set(tick + 1);
        self.start + self.step * tick
    }
}

fn assemble(embedder: Rc<TableEmbedder>, clock: StepClock, settings: Settings) -> Memories {
    let index = SqliteIndex::in_memory().unwrap();
    Memories::with_parts(Box::new(index), Box::new(embedder), Box::new(clock), settings)
}

pub fn memories_with_clock(embedder: Rc<TableEmbedder>, clock: StepClock) -> Memories {
    assemble(embedder, clock, Settings::default())
}

pub fn memories_with_settings(embedder: Rc<TableEmbedder>, settings: Settings) -> Memories {
    assemble(embedder, StepClock::default(), settings)
}

/// In-memory store with a minute-stepping clock
pub fn memories_with(embedder: Rc<TableEmbedder>) -> Memories {
    memories_with_clock(embedder, StepClock::default())
}
