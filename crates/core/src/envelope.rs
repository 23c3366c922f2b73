//! The metadata+content unit handed to the job ingestion system.
//!
//! Every record id pulled from the staging file produces exactly one
//! [`Envelope`]: either content plus metadata, or metadata carrying a
//! fatal [`Diagnostic`] with no content. The holdings-filtered harvester
//! kinds are the only place a record id yields no envelope at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a per-record diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticLevel {
    Fatal,
    Warning,
}

/// Structured failure note attached to an envelope instead of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Fatal,
            message: message.into(),
        }
    }
}

/// Metadata describing one harvested record, serialized as JSON when the
/// envelope is framed into the job datafile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub bibliographic_record_id: String,
    pub submitter_number: u32,
    pub format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_trail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

/// One harvested unit ready for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub metadata: EnvelopeMetadata,
    /// `None` iff `metadata.diagnostic` holds a fatal diagnostic.
    pub content: Option<Vec<u8>>,
}

impl Envelope {
    /// Envelope for a successfully fetched record.
    pub fn with_content(metadata: EnvelopeMetadata, content: Vec<u8>) -> Self {
        Self {
            metadata,
            content: Some(content),
        }
    }

    /// Diagnostic-only envelope for a record that failed recoverably.
    pub fn failed(mut metadata: EnvelopeMetadata, diagnostic: Diagnostic) -> Self {
        metadata.diagnostic = Some(diagnostic);
        Self {
            metadata,
            content: None,
        }
    }

    pub fn has_diagnostic(&self) -> bool {
        self.metadata.diagnostic.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_envelope_has_no_content() {
        let envelope = Envelope::failed(
            EnvelopeMetadata {
                bibliographic_record_id: "id".to_string(),
                submitter_number: 870970,
                format: "katalog".to_string(),
                ..Default::default()
            },
            Diagnostic::fatal("empty record collection returned"),
        );
        assert!(envelope.content.is_none());
        assert!(envelope.has_diagnostic());
        assert_eq!(
            envelope.metadata.diagnostic.as_ref().unwrap().level,
            DiagnosticLevel::Fatal
        );
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let metadata = EnvelopeMetadata {
            bibliographic_record_id: "51423999".to_string(),
            submitter_number: 870970,
            format: "katalog".to_string(),
            enrichment_trail: Some("191919,870970".to_string()),
            tracking_id: Some("t-1".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"bibliographicRecordId\":\"51423999\""));
        assert!(json.contains("\"submitterNumber\":870970"));
        assert!(json.contains("\"enrichmentTrail\":\"191919,870970\""));
        assert!(!json.contains("diagnostic"));
    }

    #[test]
    fn test_diagnostic_level_wire_format() {
        let json = serde_json::to_string(&DiagnosticLevel::Fatal).unwrap();
        assert_eq!(json, r#""FATAL""#);
    }
}
