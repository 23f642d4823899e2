#![forbid(unsafe_code)]

use crate::error::Error;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Where a piece of evidence was taken from in the original request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvidenceField {
    Header,
    Query,
}

impl EvidenceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceField::Header => "header",
            EvidenceField::Query => "query",
        }
    }
}

/// One request-derived signal: a (field, key, value) triple such as an HTTP
/// header or a query parameter. The engine treats the collection as an
/// opaque input to detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Evidence {
    pub field: EvidenceField,
    pub key: String,
    pub value: String,
}

impl Evidence {
    pub fn header(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: EvidenceField::Header,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn query(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: EvidenceField::Query,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Convert one evidence record, keyed like `header.user-agent` or
/// `query.ch-ua`, into typed evidence. Keys with an unknown prefix are
/// skipped rather than rejected, since record files routinely carry fields
/// the engine does not consume.
pub fn record_from_map(map: &BTreeMap<String, String>) -> Vec<Evidence> {
    let mut record = Vec::with_capacity(map.len());
    for (key, value) in map {
        let Some((prefix, name)) = key.split_once('.') else {
            continue;
        };
        let field = match prefix {
            "header" => EvidenceField::Header,
            "query" => EvidenceField::Query,
            _ => continue,
        };
        record.push(Evidence {
            field,
            key: name.to_string(),
            value: value.clone(),
        });
    }
    record
}

/// Parse a multi-document YAML evidence file into records, one record per
/// document. Empty documents and records with no recognized keys are
/// dropped.
pub fn records_from_yaml(text: &str) -> Result<Vec<Vec<Evidence>>, Error> {
    let mut records = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let map = BTreeMap::<String, String>::deserialize(document)
            .map_err(|err| Error::InvalidPayload(format!("bad evidence record: {err}")))?;
        let record = record_from_map(&map);
        if !record.is_empty() {
            records.push(record);
        }
    }
    Ok(records)
}
