//! Normalization of vendor records into [`Destination`]s.

use crate::domain::model::{Destination, RawRecord, RejectReason, RejectedRecord};
use crate::utils::timestamps::parse_timestamp;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Field priority tables. The first non-empty match wins.
pub const ID_FIELDS: &[&str] = &["id", "destinationId"];
pub const VALUE_FIELDS: &[&str] = &["destination", "domain", "url", "value"];
pub const TIMESTAMP_FIELDS: &[&str] = &["created_at", "createdAt", "created", "dateCreated"];

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_text(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| obj.get(*field))
        .find_map(scalar_text)
}

fn first_present<'v>(obj: &'v Map<String, Value>, fields: &[&str]) -> Option<&'v Value> {
    fields
        .iter()
        .filter_map(|field| obj.get(*field))
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

pub fn normalize(list_id: &str, raw: &RawRecord) -> Result<Destination, RejectedRecord> {
    let Some(obj) = raw.as_object() else {
        return Err(RejectedRecord {
            list_id: list_id.to_string(),
            raw_id: None,
            raw_value: None,
            reason: RejectReason::NotAnObject,
        });
    };

    let id = first_text(obj, ID_FIELDS);
    let value = first_text(obj, VALUE_FIELDS);
    let reject = |reason| RejectedRecord {
        list_id: list_id.to_string(),
        raw_id: id.clone(),
        raw_value: value.clone(),
        reason,
    };

    let Some(id_text) = id.clone() else {
        return Err(reject(RejectReason::MissingId));
    };
    let Some(value_text) = value.clone() else {
        return Err(reject(RejectReason::MissingValue));
    };
    let Some(raw_ts) = first_present(obj, TIMESTAMP_FIELDS) else {
        return Err(reject(RejectReason::MissingTimestamp));
    };
    let Some(created_at) = parse_timestamp(raw_ts) else {
        let shown = raw_ts
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| raw_ts.to_string());
        return Err(reject(RejectReason::UnparseableTimestamp(shown)));
    };

    Ok(Destination {
        id: id_text,
        value: value_text,
        created_at,
        list_id: list_id.to_string(),
    })
}

/// The canonical destination set of one list for this run.
#[derive(Debug, Clone, Default)]
pub struct DestinationCatalog {
    pub list_id: String,
    pub name: Option<String>,
    pub destinations: Vec<Destination>,
    pub rejected: Vec<RejectedRecord>,
}

impl DestinationCatalog {
    pub fn build(list_id: &str, records: &[RawRecord]) -> Self {
        let mut seen = HashSet::new();
        let mut destinations = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();

        for raw in records {
            match normalize(list_id, raw) {
                Ok(destination) if seen.insert(destination.id.clone()) => {
                    destinations.push(destination)
                }
                Ok(duplicate) => rejected.push(RejectedRecord {
                    list_id: list_id.to_string(),
                    raw_id: Some(duplicate.id),
                    raw_value: Some(duplicate.value),
                    reason: RejectReason::DuplicateId,
                }),
                Err(record) => rejected.push(record),
            }
        }

        for record in &rejected {
            tracing::warn!(
                "🚫 List {}: rejected record {} ({})",
                list_id,
                record.raw_id.as_deref().unwrap_or("<no id>"),
                record.reason
            );
        }
        tracing::info!(
            "🗂️ List {}: {} destinations normalized, {} rejected",
            list_id,
            destinations.len(),
            rejected.len()
        );

        Self {
            list_id: list_id.to_string(),
            name: None,
            destinations,
            rejected,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// `"Blocked domains" (1001)`, or the bare id when the name is unknown.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("\"{}\" ({})", name, self.list_id),
            None => self.list_id.clone(),
        }
    }

    pub fn total_fetched(&self) -> usize {
        self.destinations.len() + self.rejected.len()
    }
}
