//! Record data model shared across the harvest workspace
//!
//! The pipeline moves three shapes of data: [`InputRecord`]s come from the
//! input source, the collector turns each one into a [`CollectionResult`],
//! and successful results are wrapped into [`OutputRecord`] envelopes before
//! they reach the shard writer. Every type here serializes with serde so a
//! written line can be parsed back without loss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single record to collect, as yielded by the input source.
///
/// Immutable once created; the pipeline only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Opaque identifier handed to the collector (typically a URL)
    pub identifier: String,

    /// Human-readable display name
    pub name: String,

    /// Category tag used for the summary breakdown (e.g. a profession
    /// or document type)
    pub category: String,
}

impl InputRecord {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            category: category.into(),
        }
    }
}

impl std::fmt::Display for InputRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.identifier)
    }
}

/// Outcome of one collector call for one input record.
///
/// Produced exactly once per record; a `Failure` is data, not an error.
/// The scheduler counts it and moves on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CollectionResult {
    /// The record was fetched and parsed
    Success {
        /// Arbitrary structured payload as returned by the collector
        payload: serde_json::Value,

        /// When the collector captured the payload
        captured_at: DateTime<Utc>,
    },

    /// The record could not be collected
    Failure {
        /// Identifier of the record that failed
        identifier: String,

        /// Human-readable failure reason
        reason: String,
    },
}

impl CollectionResult {
    /// Build a success result captured now
    pub fn success(payload: serde_json::Value) -> Self {
        CollectionResult::Success {
            payload,
            captured_at: Utc::now(),
        }
    }

    /// Build a failure result for the given identifier
    pub fn failure(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        CollectionResult::Failure {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CollectionResult::Success { .. })
    }
}

/// Envelope written as one JSONL line per successful collection.
///
/// `record_index` is a strictly increasing, globally unique sequence number
/// across the whole run: assigned by the writer, to successes only, and
/// never reset on shard rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    /// The input record this payload was collected for
    pub source: InputRecord,

    /// Collected structured payload
    pub payload: serde_json::Value,

    /// When the payload was captured
    pub scraping_timestamp: DateTime<Utc>,

    /// 1-based number of the batch this record was collected in
    pub batch_number: u64,

    /// Writer-assigned global sequence number
    pub record_index: u64,
}

/// One failed identifier with its reason, as listed in the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub identifier: String,
    pub reason: String,

    /// Batch the failure occurred in
    pub batch_number: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_result_tagging() {
        let ok = CollectionResult::success(json!({"title": "example"}));
        assert!(ok.is_success());

        let err = CollectionResult::failure("https://example.com/a", "timeout");
        assert!(!err.is_success());

        let encoded = serde_json::to_value(&err).unwrap();
        assert_eq!(encoded["outcome"], "failure");
        assert_eq!(encoded["reason"], "timeout");
    }

    #[test]
    fn test_output_record_round_trip() {
        let record = OutputRecord {
            source: InputRecord::new("https://example.com/a", "Example", "article"),
            payload: json!({"title": "Example", "sections": [1, 2, 3]}),
            scraping_timestamp: Utc::now(),
            batch_number: 3,
            record_index: 27,
        };

        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains('\n'));

        let parsed: OutputRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.source, record.source);
        assert_eq!(parsed.payload, record.payload);
        assert_eq!(parsed.batch_number, 3);
        assert_eq!(parsed.record_index, 27);
    }
}
