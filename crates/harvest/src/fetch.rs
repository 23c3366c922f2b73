//! Per-record fetch tasks and the strategy data that varies them.
//!
//! Every harvester kind differs in exactly one of: fetch parameters,
//! record filter, or post-fetch augmentation. Those three behaviors are
//! held as data in a [`FetchPlan`] built once per cycle from the config,
//! so each kind stays independently testable.
//!
//! A fetch task converts one record id into at most one envelope and
//! never lets a recoverable error escape: connector failures, empty or
//! incomplete collections, unparsable member content, and missing or
//! malformed creation dates all become diagnostic-only envelopes. Only
//! panics propagate, and those abort the whole cycle at the batch join.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use bibharvest_connector::{HoldingsService, RecordData, RecordParams, RecordService};
use bibharvest_core::{
    Diagnostic, Envelope, EnvelopeMetadata, HarvestConfigContent, HarvesterKind, HoldingsFilter,
    RecordId, SubfieldRef,
};

use crate::marc;

/// Common agency the record service serves DBC-owned records under.
pub const DBC_COMMON_AGENCY: u32 = 191919;

/// The pluggable behaviors selected by the harvester kind.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub params: RecordParams,
    /// Per-record holdings filter; failing records are dropped from the job.
    pub holdings_filter: Option<HoldingsFilter>,
    /// Two-hop augmentation: where the linked record id is read from.
    pub subject_proofing: Option<SubfieldRef>,
    /// Batch-level cover pre-filter runs before any fetch task.
    pub cover_prefilter: bool,
}

impl FetchPlan {
    pub fn for_config(content: &HarvestConfigContent) -> Self {
        let base = Self {
            params: RecordParams {
                expand: true,
                use_parent_agency: false,
            },
            holdings_filter: None,
            subject_proofing: None,
            cover_prefilter: false,
        };
        match content.harvester_kind {
            HarvesterKind::Standard => base,
            HarvesterKind::WithoutExpansion => Self {
                params: RecordParams {
                    expand: false,
                    use_parent_agency: false,
                },
                ..base
            },
            HarvesterKind::WithHoldings => Self {
                holdings_filter: content.holdings_filter,
                ..base
            },
            HarvesterKind::HasCover => Self {
                cover_prefilter: true,
                ..base
            },
            HarvesterKind::SubjectProofing => Self {
                subject_proofing: Some(
                    content
                        .subject_proofing_subfield
                        .clone()
                        .unwrap_or_default(),
                ),
                ..base
            },
        }
    }
}

/// Outcome of one fetch task.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Success or diagnostic-only envelope, exactly one per record id.
    Envelope(Envelope),
    /// Record dropped by the holdings filter.
    Filtered(RecordId),
}

/// Recoverable per-record error, encoded as a diagnostic envelope.
struct Recoverable(String);

impl<E: std::fmt::Display> From<E> for Recoverable {
    fn from(e: E) -> Self {
        Self(e.to_string())
    }
}

#[derive(Clone)]
pub struct RecordFetcher {
    record_service: Arc<dyn RecordService>,
    holdings: Arc<dyn HoldingsService>,
    plan: FetchPlan,
    format: String,
    holdings_lookup_agencies: Arc<HashSet<u32>>,
}

impl RecordFetcher {
    pub fn new(
        record_service: Arc<dyn RecordService>,
        holdings: Arc<dyn HoldingsService>,
        plan: FetchPlan,
        content: &HarvestConfigContent,
    ) -> Self {
        Self {
            record_service,
            holdings,
            plan,
            format: content.format.clone(),
            holdings_lookup_agencies: Arc::new(
                content.holdings_lookup_agencies.iter().copied().collect(),
            ),
        }
    }

    /// Produce the outcome for one record id. Never fails: recoverable
    /// errors come back as diagnostic envelopes.
    pub async fn fetch(self, id: RecordId) -> FetchOutcome {
        match self.fetch_inner(&id).await {
            Ok(outcome) => outcome,
            Err(Recoverable(message)) => {
                warn!(record_id = %id, error = %message, "record failed, emitting diagnostic envelope");
                FetchOutcome::Envelope(Envelope::failed(
                    EnvelopeMetadata {
                        bibliographic_record_id: id.bibliographic_record_id.clone(),
                        submitter_number: id.agency_id,
                        format: self.format.clone(),
                        ..Default::default()
                    },
                    Diagnostic::fatal(message),
                ))
            }
        }
    }

    async fn fetch_inner(&self, id: &RecordId) -> Result<FetchOutcome, Recoverable> {
        if let Some(filter) = self.plan.holdings_filter {
            let has_holdings = self
                .holdings
                .has_any_holdings(&id.bibliographic_record_id, &self.holdings_lookup_agencies)
                .await?;
            let keep = match filter {
                HoldingsFilter::WithHoldings => has_holdings,
                HoldingsFilter::WithoutHoldings => !has_holdings,
            };
            if !keep {
                debug!(record_id = %id, "record dropped by holdings filter");
                return Ok(FetchOutcome::Filtered(id.clone()));
            }
        }

        let fetch_id = substitute_fetch_agency(id);
        let collection = self
            .record_service
            .get_record_collection(&fetch_id, &self.plan.params)
            .await?;
        if collection.is_empty() {
            return Err(Recoverable(format!(
                "empty record collection returned for {id}"
            )));
        }
        let record = collection
            .get(&id.bibliographic_record_id)
            .ok_or_else(|| Recoverable(format!("record {id} was not found in returned collection")))?;

        let creation_date = parse_creation_date(record, id)?;
        let submitter_number = resolve_submitter(record)?;

        // Target record first, remaining members in stable id order.
        let mut member_records = extract_member(record)?;
        let mut other_ids: Vec<&String> = collection
            .keys()
            .filter(|key| **key != id.bibliographic_record_id)
            .collect();
        other_ids.sort();
        for member_id in other_ids {
            member_records.extend(extract_member(&collection[member_id])?);
        }

        if let Some(subfield) = &self.plan.subject_proofing {
            if let Some(linked) =
                marc::subfield_value(&record.content, &subfield.tag, &subfield.code)?
            {
                let linked_id = RecordId::new(linked, DBC_COMMON_AGENCY);
                debug!(record_id = %id, linked_id = %linked_id, "appending linked record collection");
                let linked_collection = self
                    .record_service
                    .get_record_collection(&linked_id, &self.plan.params)
                    .await?;
                let mut linked_ids: Vec<&String> = linked_collection.keys().collect();
                linked_ids.sort();
                for member_id in linked_ids {
                    member_records.extend(extract_member(&linked_collection[member_id])?);
                }
            }
        }

        let metadata = EnvelopeMetadata {
            bibliographic_record_id: id.bibliographic_record_id.clone(),
            submitter_number,
            format: self.format.clone(),
            creation_date: Some(creation_date),
            enrichment_trail: record.enrichment_trail.clone(),
            tracking_id: record.tracking_id.clone(),
            diagnostic: None,
        };
        Ok(FetchOutcome::Envelope(Envelope::with_content(
            metadata,
            marc::assemble_collection(&member_records),
        )))
    }
}

/// DBC-owned records are served under the common agency.
fn substitute_fetch_agency(id: &RecordId) -> RecordId {
    if (870000..880000).contains(&id.agency_id) {
        RecordId::new(id.bibliographic_record_id.clone(), DBC_COMMON_AGENCY)
    } else {
        id.clone()
    }
}

fn parse_creation_date(record: &RecordData, id: &RecordId) -> Result<DateTime<Utc>, Recoverable> {
    let created = record
        .created
        .as_deref()
        .ok_or_else(|| Recoverable(format!("record creation date is null for {id}")))?;
    created
        .parse::<DateTime<Utc>>()
        .map_err(|e| Recoverable(format!("malformed record creation date {created:?}: {e}")))
}

/// Resolve the submitting agency from the enrichment trail.
///
/// Empty or absent trail: the record's own agency. Otherwise the first
/// `,`-separated token starting with `870` or `19000` wins; a matching
/// token that does not parse as an integer is a recoverable error, never
/// a silent default.
fn resolve_submitter(record: &RecordData) -> Result<u32, Recoverable> {
    let trail = match record.enrichment_trail.as_deref() {
        None | Some("") => return Ok(record.record_id.agency_id),
        Some(trail) => trail,
    };
    match trail
        .split(',')
        .find(|token| token.starts_with("870") || token.starts_with("19000"))
    {
        None => Ok(record.record_id.agency_id),
        Some(token) => token.trim().parse().map_err(|_| {
            Recoverable(format!(
                "enrichment trail {trail:?} holds unparsable agency {token:?}"
            ))
        }),
    }
}

fn extract_member(record: &RecordData) -> Result<Vec<String>, Recoverable> {
    let members = marc::extract_records(&record.content)
        .map_err(|e| Recoverable(format!("{e} ({})", record.record_id)))?;
    if members.is_empty() {
        return Err(Recoverable(format!(
            "member data cannot be parsed as marcXchange ({})",
            record.record_id
        )));
    }
    Ok(members)
}
