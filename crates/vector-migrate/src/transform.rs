//! Record transformation between source and destination shapes.
//!
//! [`Transformer::transform`] is pure and total: it never fails and produces
//! exactly one output record per input. Fields that are missing upstream get
//! a deterministic default instead of an error, because source data is
//! heterogeneous.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::connectors::{Payload, Record};
use crate::error::{Error, Result};

/// Derives a payload field from the first non-empty of several source paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldExtraction {
    /// Destination key, dot-separated for nested objects (e.g. `metadata.title`).
    pub target: String,
    /// Source paths tried in order (e.g. `metadata.original_record.description`).
    pub candidates: Vec<String>,
    /// Value used when every candidate is missing or empty.
    #[serde(default = "empty_string")]
    pub default: Value,
    /// Maximum characters kept when the value is a string.
    #[serde(default)]
    pub max_chars: Option<usize>,
}

fn empty_string() -> Value {
    Value::String(String::new())
}

/// Transformation rules applied to every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Payload key renames (`source_field` -> `dest_field`).
    pub field_mappings: HashMap<String, String>,
    /// Keep only these payload keys (empty = keep all).
    pub payload_fields: Vec<String>,
    /// Payload keys to drop, dot-separated for nested keys
    /// (e.g. `metadata.original_record`).
    pub exclude_fields: Vec<String>,
    /// Maximum characters per string payload key (applied after renames).
    pub truncate: HashMap<String, usize>,
    /// Derived fields, evaluated against the untouched source payload.
    pub extract: Vec<FieldExtraction>,
}

impl TransformConfig {
    /// Returns true if records pass through unchanged.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self == &Self::default()
    }

    /// Validates the rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for empty targets, empty candidate lists or
    /// zero-length truncation limits.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.extract {
            if rule.target.is_empty() {
                return Err(Error::Config("extract target cannot be empty".to_string()));
            }
            if rule.candidates.is_empty() {
                return Err(Error::Config(format!(
                    "extract rule '{}' needs at least one candidate",
                    rule.target
                )));
            }
            if rule.max_chars == Some(0) {
                return Err(Error::Config(format!(
                    "extract rule '{}' has max_chars 0",
                    rule.target
                )));
            }
        }
        if let Some((field, _)) = self.truncate.iter().find(|(_, limit)| **limit == 0) {
            return Err(Error::Config(format!(
                "truncate limit for '{field}' must be greater than 0"
            )));
        }
        Ok(())
    }
}

/// Applies a [`TransformConfig`] to records.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    config: TransformConfig,
}

impl Transformer {
    /// Creates a transformer.
    #[must_use]
    pub fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// Maps one source record to its destination shape.
    #[must_use]
    pub fn transform(&self, record: Record) -> Record {
        if self.config.is_identity() {
            return record;
        }

        let Record {
            id,
            vector,
            payload: source,
        } = record;
        let cfg = &self.config;

        let derived: Vec<(&str, Value)> = cfg
            .extract
            .iter()
            .map(|rule| (rule.target.as_str(), extract_field(&source, rule)))
            .collect();

        let mut payload = Payload::new();
        for (key, value) in source {
            if !cfg.payload_fields.is_empty() && !cfg.payload_fields.contains(&key) {
                continue;
            }
            if cfg.exclude_fields.contains(&key) {
                continue;
            }
            let key = cfg.field_mappings.get(&key).cloned().unwrap_or(key);
            payload.insert(key, value);
        }
        for path in cfg.exclude_fields.iter().filter(|p| p.contains('.')) {
            remove_path(&mut payload, path);
        }

        for (target, value) in derived {
            set_path(&mut payload, target, value);
        }

        for (key, limit) in &cfg.truncate {
            if let Some(Value::String(s)) = payload.get_mut(key) {
                truncate_chars(s, *limit);
            }
        }

        Record {
            id,
            vector,
            payload,
        }
    }

    /// Transforms a batch of records, preserving order.
    #[must_use]
    pub fn transform_batch(&self, records: Vec<Record>) -> Vec<Record> {
        records.into_iter().map(|r| self.transform(r)).collect()
    }
}

fn extract_field(source: &Payload, rule: &FieldExtraction) -> Value {
    let found = rule
        .candidates
        .iter()
        .filter_map(|path| lookup_path(source, path))
        .find(|v| !is_empty_value(v))
        .cloned();

    let mut value = found.unwrap_or_else(|| rule.default.clone());
    if let (Some(limit), Value::String(s)) = (rule.max_chars, &mut value) {
        truncate_chars(s, limit);
    }
    value
}

/// Resolves a dot-separated path through nested objects.
fn lookup_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn remove_path(payload: &mut Payload, path: &str) {
    match path.split_once('.') {
        None => {
            payload.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = payload.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Inserts `value` at a dot-separated path, creating intermediate objects.
fn set_path(payload: &mut Payload, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            payload.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = payload
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Payload::new()));
            if !entry.is_object() {
                *entry = Value::Object(Payload::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Truncates to at most `limit` chars without splitting a code point.
fn truncate_chars(s: &mut String, limit: usize) {
    if let Some((byte_idx, _)) = s.char_indices().nth(limit) {
        s.truncate(byte_idx);
    }
}
