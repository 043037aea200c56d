//! Per-row outcomes and the deduplicating result set.

use indexmap::IndexMap;
use serde::Serialize;

use crate::row::Row;

/// What happened to one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    /// Rendered, compiled and uploaded in this run.
    Uploaded { url: String },
    /// The document already existed; nothing was regenerated.
    Skipped { url: String },
    /// Rendering, compiling, uploading or the existence check failed.
    Failed { reason: String },
}

impl RowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RowOutcome::Uploaded { .. } => "uploaded",
            RowOutcome::Skipped { .. } => "skipped",
            RowOutcome::Failed { .. } => "failed",
        }
    }
}

/// Result record for one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord {
    pub fields: Row,
    /// Sanitized row identity, also the document's file stem.
    pub pdf_name: String,
    /// Object key of the document; unique per record in a [`ResultSet`].
    pub derived_key: String,
    pub outcome: RowOutcome,
}

impl OutputRecord {
    pub fn document_url(&self) -> Option<&str> {
        match &self.outcome {
            RowOutcome::Uploaded { url } | RowOutcome::Skipped { url } => Some(url),
            RowOutcome::Failed { .. } => None,
        }
    }

    pub fn error_reason(&self) -> Option<&str> {
        match &self.outcome {
            RowOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, RowOutcome::Failed { .. })
    }
}

/// Records keyed by derived key, last write wins.
///
/// Export order follows the first insertion of each key; only uniqueness
/// per key is guaranteed.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    records: IndexMap<String, OutputRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = OutputRecord>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record);
        }
        set
    }

    /// Store `record`, replacing any earlier record with the same key.
    pub fn insert(&mut self, record: OutputRecord) -> Option<OutputRecord> {
        self.records.insert(record.derived_key.clone(), record)
    }

    pub fn get(&self, derived_key: &str) -> Option<&OutputRecord> {
        self.records.get(derived_key)
    }

    pub fn export(&self) -> Vec<&OutputRecord> {
        self.records.values().collect()
    }

    pub fn into_records(self) -> Vec<OutputRecord> {
        self.records.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `(uploaded, skipped, failed)` counts.
    pub fn tally(&self) -> (usize, usize, usize) {
        self.records
            .values()
            .fold((0, 0, 0), |(u, s, f), r| match r.outcome {
                RowOutcome::Uploaded { .. } => (u + 1, s, f),
                RowOutcome::Skipped { .. } => (u, s + 1, f),
                RowOutcome::Failed { .. } => (u, s, f + 1),
            })
    }
}
