//! Durable harvester configuration entities.
//!
//! A [`HarvestConfig`] is an immutable value carrying an explicit
//! `version` for optimistic-concurrency updates against the config
//! store: advancing the watermark produces a new value and attempts a
//! compare-and-swap persist, it never mutates a shared instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selects the fetch strategy applied to every record of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvesterKind {
    /// Expand authority records, exclude none.
    Standard,
    /// Same collection fetch, no authority expansion.
    WithoutExpansion,
    /// Per-record holdings lookup; records failing the configured
    /// [`HoldingsFilter`] are dropped from the job.
    WithHoldings,
    /// Batch-level pre-filter removing ids already known to have cover art.
    HasCover,
    /// Two-hop fetch appending the linked record's collection.
    SubjectProofing,
}

impl Default for HarvesterKind {
    fn default() -> Self {
        Self::Standard
    }
}

/// Direction of the holdings filter for [`HarvesterKind::WithHoldings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingsFilter {
    /// Emit only records that have holdings somewhere.
    WithHoldings,
    /// Emit only records without any holdings.
    WithoutHoldings,
}

/// Datafield/subfield address inside a marcXchange record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubfieldRef {
    pub tag: String,
    pub code: String,
}

impl Default for SubfieldRef {
    fn default() -> Self {
        Self {
            tag: "015".to_string(),
            code: "a".to_string(),
        }
    }
}

/// One harvester's durable settings, as persisted by the config store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub id: i64,
    /// Store version for optimistic-concurrency updates.
    pub version: i64,
    pub content: HarvestConfigContent,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HarvestConfigContent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub harvester_kind: HarvesterKind,
    /// Literal query template; mutually exclusive with `query_file_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// File-store reference to an uploaded file with one query template
    /// per line; mutually exclusive with `query`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_file_id: Option<String>,
    /// Search index collection the queries run against.
    pub collection: String,
    pub destination: String,
    pub format: String,
    pub submitter_number: u32,
    /// Cron expression (5- or 6-field) deciding when a harvest is due.
    pub schedule: String,
    /// `UTC` or a fixed `+HH:MM` / `-HH:MM` offset.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Capture instant of the last query of the last successful cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_last_harvest: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holdings_filter: Option<HoldingsFilter>,
    /// Agency set the holdings lookup is scoped to; empty means any agency.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub holdings_lookup_agencies: Vec<u32>,
    /// Where the subject-proofing link id is read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_proofing_subfield: Option<SubfieldRef>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl HarvestConfig {
    /// New value with the watermark advanced; version is untouched so the
    /// config store can detect concurrent edits.
    pub fn with_time_of_last_harvest(&self, instant: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.content.time_of_last_harvest = Some(instant);
        next
    }
}

/// Job specification template derived from a harvest config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpecification {
    pub destination: String,
    pub format: String,
    pub submitter_number: u32,
    /// Back-reference to the originating harvest config.
    pub harvest_config_id: i64,
}

impl JobSpecification {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            destination: config.content.destination.clone(),
            format: config.content.format.clone(),
            submitter_number: config.content.submitter_number,
            harvest_config_id: config.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> HarvestConfig {
        HarvestConfig {
            id: 42,
            version: 7,
            content: HarvestConfigContent {
                name: "weekly-acc".to_string(),
                enabled: true,
                harvester_kind: HarvesterKind::Standard,
                query: Some("datefield:[${__TIME_OF_LAST_HARVEST__} TO ${__NOW__}]".to_string()),
                collection: "records".to_string(),
                destination: "broend".to_string(),
                format: "katalog".to_string(),
                submitter_number: 870970,
                schedule: "0 6 * * 1".to_string(),
                timezone: "UTC".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_watermark_advance_produces_new_value() {
        let config = sample_config();
        let instant = Utc::now();
        let advanced = config.with_time_of_last_harvest(instant);
        assert_eq!(advanced.content.time_of_last_harvest, Some(instant));
        assert_eq!(advanced.version, config.version);
        // The original value is untouched.
        assert!(config.content.time_of_last_harvest.is_none());
    }

    #[test]
    fn test_harvester_kind_wire_tags() {
        let json = serde_json::to_string(&HarvesterKind::WithoutExpansion).unwrap();
        assert_eq!(json, r#""without_expansion""#);
        let parsed: HarvesterKind = serde_json::from_str(r#""subject_proofing""#).unwrap();
        assert_eq!(parsed, HarvesterKind::SubjectProofing);
    }

    #[test]
    fn test_content_defaults() {
        let json = r#"{
            "name": "minimal",
            "collection": "records",
            "destination": "broend",
            "format": "katalog",
            "submitter_number": 870970,
            "schedule": "0 6 * * 1"
        }"#;
        let content: HarvestConfigContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.harvester_kind, HarvesterKind::Standard);
        assert_eq!(content.timezone, "UTC");
        assert!(!content.enabled);
        assert!(content.time_of_last_harvest.is_none());
        assert!(content.holdings_lookup_agencies.is_empty());
    }

    #[test]
    fn test_job_specification_from_config() {
        let spec = JobSpecification::from_config(&sample_config());
        assert_eq!(spec.destination, "broend");
        assert_eq!(spec.format, "katalog");
        assert_eq!(spec.submitter_number, 870970);
        assert_eq!(spec.harvest_config_id, 42);
    }

    #[test]
    fn test_subfield_ref_default() {
        let subfield = SubfieldRef::default();
        assert_eq!(subfield.tag, "015");
        assert_eq!(subfield.code, "a");
    }
}
