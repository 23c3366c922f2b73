//! Record identity and fetched record data.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifies one record in the search index: bibliographic id plus the
/// agency that owns the record.
///
/// The textual form `bibliographicRecordId:agencyId` is both the staging
/// file line format and the id format returned by the search index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub bibliographic_record_id: String,
    pub agency_id: u32,
}

impl RecordId {
    pub fn new(bibliographic_record_id: impl Into<String>, agency_id: u32) -> Self {
        Self {
            bibliographic_record_id: bibliographic_record_id.into(),
            agency_id,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bibliographic_record_id, self.agency_id)
    }
}

/// Error parsing a `bib:agency` line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordIdParseError {
    #[error("missing ':' separator in {0:?}")]
    MissingSeparator(String),
    #[error("empty bibliographic record id in {0:?}")]
    EmptyBibliographicRecordId(String),
    #[error("non-numeric agency id in {0:?}")]
    NonNumericAgencyId(String),
}

impl FromStr for RecordId {
    type Err = RecordIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bib, agency) = s
            .split_once(':')
            .ok_or_else(|| RecordIdParseError::MissingSeparator(s.to_string()))?;
        if bib.is_empty() {
            return Err(RecordIdParseError::EmptyBibliographicRecordId(s.to_string()));
        }
        let agency_id = agency
            .trim()
            .parse()
            .map_err(|_| RecordIdParseError::NonNumericAgencyId(s.to_string()))?;
        Ok(Self::new(bib, agency_id))
    }
}
