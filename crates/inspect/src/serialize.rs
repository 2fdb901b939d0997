//! Budgeted, cycle-safe structural serialization.
//!
//! A `Serializer` instance represents one serialization pass: it
//! carries the shared work counter, the per-pass reference-id counter,
//! and the seen-set for cycle detection. Crossing any budget degrades
//! the remaining values to in-band tokens; nothing here throws because
//! of the shape or size of the input.

use std::cell::{Cell, RefCell};

use ahash::AHashMap;
use host::value::Value;

use crate::types::{CollectionKind, Document, Truncation};

/// Record keys that link back into the surrounding tree. Replaced with
/// short markers instead of traversed.
const OWNER_KEY: &str = "_owner";
const INTERNAL_KEYS: [&str; 3] = ["_store", "_self", "_source"];

/// Key used for the trailing overflow note in truncated records.
const OVERFLOW_KEY: &str = "@@overflow";

/// Longest string preview inside dehydration markers.
const MAX_PREVIEW_LEN: usize = 50;

/// How deep the child-content summarizer goes.
const CHILD_LEVELS: usize = 2;

/// How many child entries the summarizer keeps per sequence.
const CHILD_SEQ_LEN: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct Budgets {
    /// Total work units for the pass; one unit per serialized value.
    pub max_work: usize,
    pub max_depth: usize,
    pub max_seq_len: usize,
    pub max_keys: usize,
    pub max_entries: usize,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_work: 2_000,
            max_depth: 7,
            max_seq_len: 100,
            max_keys: 100,
            max_entries: 100,
        }
    }
}

enum Gate {
    Elide(Document),
    Descend,
}

/// One serialization pass.
pub struct Serializer {
    budgets: Budgets,
    work: Cell<usize>,
    next_ref: Cell<u32>,
    seen: RefCell<AHashMap<usize, u32>>,
}

impl Serializer {
    pub fn new(budgets: Budgets) -> Self {
        Self {
            budgets,
            work: Cell::new(0),
            next_ref: Cell::new(1),
            seen: RefCell::new(AHashMap::new()),
        }
    }

    pub fn work_spent(&self) -> usize {
        self.work.get()
    }

    /// Serialize one value at the given depth.
    pub fn serialize(&self, value: &Value, depth: usize) -> Document {
        self.work.set(self.work.get() + 1);
        match value {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(*b),
            Value::Num(n) => Document::Num(*n),
            Value::Str(s) => Document::Str(s.clone()),
            Value::Func(f) => Document::Function {
                name: f.name.clone(),
            },
            // live platform objects reduce to short descriptors; never
            // traversed into unrelated subsystems
            Value::Element(el) => Document::Str(format!("<{} />", el.tag)),
            Value::Window => Document::Str("[window]".to_string()),
            Value::Lazy(prop) => match prop.get() {
                Ok(inner) => self.serialize(&inner, depth),
                Err(err) => Document::Str(format!("[Thrown: {err}]")),
            },
            Value::Seq(_) | Value::Record(_) | Value::Map(_) | Value::Set(_) => {
                match self.gate(value, depth) {
                    Gate::Elide(doc) => doc,
                    Gate::Descend => self.descend(value, depth),
                }
            }
        }
    }

    /// Top-level props record. Child-content entries get the shallow
    /// summarization path; everything else serializes normally.
    pub fn serialize_props(&self, props: &Value) -> Document {
        match props {
            Value::Record(entries) => {
                self.work.set(self.work.get() + 1);
                match self.gate(props, 0) {
                    Gate::Elide(doc) => doc,
                    Gate::Descend => {
                        let entries = entries.borrow();
                        self.record_body(&entries, 0, true)
                    }
                }
            }
            other => self.serialize(other, 0),
        }
    }

    /// Budget and identity checks shared by every container.
    fn gate(&self, value: &Value, depth: usize) -> Gate {
        if depth >= self.budgets.max_depth {
            return Gate::Elide(self.dehydrated(value, Truncation::Depth));
        }
        if self.work.get() > self.budgets.max_work {
            return Gate::Elide(self.dehydrated(value, Truncation::Budget));
        }
        if let Some(key) = value.identity() {
            let mut seen = self.seen.borrow_mut();
            if let Some(ref_id) = seen.get(&key) {
                return Gate::Elide(Document::Circular { ref_id: *ref_id });
            }
            let ref_id = self.next_ref.replace(self.next_ref.get() + 1);
            seen.insert(key, ref_id);
        }
        Gate::Descend
    }

    fn descend(&self, value: &Value, depth: usize) -> Document {
        match value {
            Value::Seq(items) => {
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len().min(self.budgets.max_seq_len) + 1);
                for item in items.iter().take(self.budgets.max_seq_len) {
                    out.push(self.serialize(item, depth + 1));
                }
                if items.len() > self.budgets.max_seq_len {
                    out.push(Document::Overflow {
                        omitted: items.len() - self.budgets.max_seq_len,
                    });
                }
                Document::Seq(out)
            }
            Value::Record(entries) => {
                let entries = entries.borrow();
                self.record_body(&entries, depth, false)
            }
            Value::Map(entries) => {
                let entries = entries.borrow();
                let mut out = Vec::with_capacity(entries.len().min(self.budgets.max_entries) + 1);
                for (key, value) in entries.iter().take(self.budgets.max_entries) {
                    out.push(Document::Seq(vec![
                        self.serialize(key, depth + 1),
                        self.serialize(value, depth + 1),
                    ]));
                }
                if entries.len() > self.budgets.max_entries {
                    out.push(Document::Overflow {
                        omitted: entries.len() - self.budgets.max_entries,
                    });
                }
                Document::Entries {
                    kind: CollectionKind::Map,
                    size: entries.len(),
                    entries: out,
                }
            }
            Value::Set(items) => {
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len().min(self.budgets.max_entries) + 1);
                for item in items.iter().take(self.budgets.max_entries) {
                    out.push(self.serialize(item, depth + 1));
                }
                if items.len() > self.budgets.max_entries {
                    out.push(Document::Overflow {
                        omitted: items.len() - self.budgets.max_entries,
                    });
                }
                Document::Entries {
                    kind: CollectionKind::Set,
                    size: items.len(),
                    entries: out,
                }
            }
            _ => self.dehydrated(value, Truncation::Budget),
        }
    }

    fn record_body(
        &self,
        entries: &[(String, Value)],
        depth: usize,
        summarize_children: bool,
    ) -> Document {
        let mut out = Vec::with_capacity(entries.len().min(self.budgets.max_keys) + 1);
        for (key, value) in entries.iter().take(self.budgets.max_keys) {
            let doc = if key == OWNER_KEY {
                Document::Str("[Owner]".to_string())
            } else if INTERNAL_KEYS.contains(&key.as_str()) {
                Document::Str("[Internal]".to_string())
            } else if summarize_children && key == "children" {
                self.summarize_children(value)
            } else {
                self.serialize(value, depth + 1)
            };
            out.push((key.clone(), doc));
        }
        if entries.len() > self.budgets.max_keys {
            out.push((
                OVERFLOW_KEY.to_string(),
                Document::Overflow {
                    omitted: entries.len() - self.budgets.max_keys,
                },
            ));
        }
        Document::Record(out)
    }

    /// Shallow pass for child content: usually large and low-value, so
    /// it gets fewer levels and renderable elements reduce to a
    /// one-line descriptor.
    pub fn summarize_children(&self, value: &Value) -> Document {
        self.summarize_child(value, 0)
    }

    fn summarize_child(&self, value: &Value, level: usize) -> Document {
        if let Some(name) = renderable_name(value) {
            return Document::Str(format!("<{name} />"));
        }
        match value {
            Value::Seq(items) => {
                if level >= CHILD_LEVELS {
                    return self.dehydrated(value, Truncation::Depth);
                }
                let items = items.borrow();
                let mut out = Vec::with_capacity(items.len().min(CHILD_SEQ_LEN) + 1);
                for item in items.iter().take(CHILD_SEQ_LEN) {
                    out.push(self.summarize_child(item, level + 1));
                }
                if items.len() > CHILD_SEQ_LEN {
                    out.push(Document::Overflow {
                        omitted: items.len() - CHILD_SEQ_LEN,
                    });
                }
                Document::Seq(out)
            }
            Value::Record(_) | Value::Map(_) | Value::Set(_) => {
                self.dehydrated(value, Truncation::Depth)
            }
            other => self.serialize(other, self.budgets.max_depth.saturating_sub(1)),
        }
    }

    fn dehydrated(&self, value: &Value, reason: Truncation) -> Document {
        Document::Dehydrated {
            type_name: value.kind_name().to_string(),
            size: value.size(),
            preview: preview(value),
            reason,
        }
    }
}

/// Short human preview for dehydration markers.
fn preview(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Num(n) => n.to_string(),
        Value::Str(s) => format!("\"{}\"", cap_text(s, MAX_PREVIEW_LEN)),
        Value::Func(f) => format!("fn {}()", f.name),
        Value::Seq(items) => format!("Array({})", items.borrow().len()),
        Value::Record(entries) => format!("Object({})", entries.borrow().len()),
        Value::Map(entries) => format!("Map({})", entries.borrow().len()),
        Value::Set(items) => format!("Set({})", items.borrow().len()),
        Value::Lazy(_) => "(getter)".to_string(),
        Value::Element(el) => format!("<{} />", el.tag),
        Value::Window => "[window]".to_string(),
    }
}

/// Cap text at a char boundary.
fn cap_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let capped: String = text.chars().take(max_chars).collect();
    format!("{capped}…")
}

/// Renderable element shape: a record with `type` and `props` keys.
fn renderable_name(value: &Value) -> Option<String> {
    let Value::Record(entries) = value else {
        return None;
    };
    let entries = entries.borrow();
    let mut name = None;
    let mut has_props = false;
    for (key, value) in entries.iter() {
        match key.as_str() {
            "type" => {
                name = match value {
                    Value::Func(f) => Some(f.name.clone()),
                    Value::Str(s) => Some(s.clone()),
                    _ => None,
                }
            }
            "props" => has_props = true,
            _ => {}
        }
    }
    if has_props {
        name
    } else {
        None
    }
}
