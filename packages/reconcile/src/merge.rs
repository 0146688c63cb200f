//! Composition of the authoritative table and the review list.
//!
//! The authoritative table is the baseline rows of unchanged IDs, with
//! the text they were read from, plus the accepted (score 100) rows of new
//! and changed IDs. A changed ID's baseline row is replaced wholesale.
//! Everything else that was geocoded this run goes to the review list.
//! Every new or changed ID ends up in exactly one of the two; [`merge`]
//! refuses to produce output otherwise.

use std::collections::BTreeMap;

use case_map_incident_models::{
    ChangeKind, ConfidenceScore, IncidentId, IncidentRecord, ReconciliationOutcome,
};

use crate::diff::Partition;
use crate::{IncidentTable, ReconcileError, VerbatimRow};

/// A classified full-confidence record bound for the authoritative table.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedRecord {
    /// Resolved and classified record.
    pub record: IncidentRecord,
    /// Why it was geocoded.
    pub change: ChangeKind,
}

/// A record that needs a human look.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewEntry {
    /// Today's record, with whatever resolution was obtained.
    pub record: IncidentRecord,
    /// Why it was geocoded.
    pub change: ChangeKind,
    /// [`ReconciliationOutcome::NeedsReview`] or
    /// [`ReconciliationOutcome::Failed`].
    pub outcome: ReconciliationOutcome,
}

/// Merge behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Carry baseline rows whose ID is missing from today's snapshot.
    pub retain_absent: bool,
}

/// Result of a merge.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    /// New authoritative table.
    pub table: IncidentTable,
    /// Records routed to review, in ID order.
    pub review: Vec<ReviewEntry>,
    /// One outcome per ID of today's snapshot.
    pub outcomes: BTreeMap<IncidentId, ReconciliationOutcome>,
    /// Baseline rows absent today that were carried forward.
    pub retained_absent: usize,
}

/// Builds the authoritative table and review list.
///
/// # Errors
///
/// Returns [`ReconcileError::Invariant`] if an accepted record is below
/// full confidence, an ID is disposed of twice or not at all, or a record
/// does not belong to the new/changed set it claims.
pub fn merge(
    baseline: &IncidentTable,
    partition: &Partition,
    accepted: Vec<AcceptedRecord>,
    mut review: Vec<ReviewEntry>,
    options: MergeOptions,
) -> Result<MergeOutput, ReconcileError> {
    let mut outcomes = BTreeMap::new();
    for id in &partition.unchanged {
        outcomes.insert(id.clone(), ReconciliationOutcome::Unchanged);
    }

    for entry in &accepted {
        let id = &entry.record.id;
        check_change_kind(partition, id, entry.change)?;
        if !entry
            .record
            .confidence_score()
            .is_some_and(ConfidenceScore::is_exact)
        {
            return Err(invariant(format!(
                "{id} was accepted with confidence {:?}",
                entry.record.confidence_score().map(ConfidenceScore::value)
            )));
        }
        record_outcome(&mut outcomes, id, ReconciliationOutcome::confident(entry.change))?;
    }

    for entry in &review {
        let id = &entry.record.id;
        check_change_kind(partition, id, entry.change)?;
        if !entry.outcome.needs_review() {
            return Err(invariant(format!(
                "{id} is on the review list with outcome {}",
                entry.outcome
            )));
        }
        record_outcome(&mut outcomes, id, entry.outcome)?;
    }

    if let Some((id, change)) = partition
        .needs_resolution()
        .find(|(id, _)| !outcomes.contains_key(*id))
    {
        return Err(invariant(format!("{change} ID {id} has no disposition")));
    }

    let carried = partition
        .unchanged
        .iter()
        .map(|id| {
            baseline
                .get(id)
                .map(|record| (record.clone(), baseline.verbatim(id).cloned()))
                .ok_or_else(|| invariant(format!("unchanged ID {id} is missing from the baseline")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let retained: Vec<(IncidentRecord, Option<VerbatimRow>)> = if options.retain_absent {
        partition
            .absent
            .iter()
            .filter_map(|id| {
                baseline
                    .get(id)
                    .map(|record| (record.clone(), baseline.verbatim(id).cloned()))
            })
            .collect()
    } else {
        Vec::new()
    };
    let retained_absent = retained.len();

    let table = IncidentTable::from_rows(
        "authoritative output",
        carried
            .into_iter()
            .chain(accepted.into_iter().map(|a| (a.record, None)))
            .chain(retained),
    )?;

    review.sort_by(|a, b| a.record.id.cmp(&b.record.id));

    Ok(MergeOutput {
        table,
        review,
        outcomes,
        retained_absent,
    })
}

fn check_change_kind(
    partition: &Partition,
    id: &IncidentId,
    claimed: ChangeKind,
) -> Result<(), ReconcileError> {
    match partition.change_kind(id) {
        Some(actual) if actual == claimed => Ok(()),
        Some(actual) => Err(invariant(format!(
            "{id} is {actual} but was processed as {claimed}"
        ))),
        None => Err(invariant(format!("{id} is neither new nor changed"))),
    }
}

fn record_outcome(
    outcomes: &mut BTreeMap<IncidentId, ReconciliationOutcome>,
    id: &IncidentId,
    outcome: ReconciliationOutcome,
) -> Result<(), ReconcileError> {
    if let Some(previous) = outcomes.insert(id.clone(), outcome) {
        return Err(invariant(format!(
            "{id} was disposed of twice ({previous} and {outcome})"
        )));
    }
    Ok(())
}

fn invariant(message: String) -> ReconcileError {
    ReconcileError::Invariant { message }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use case_map_incident_models::{PostalAddress, Resolution};

    use super::*;
    use crate::diff::diff;

    fn address(street: &str) -> PostalAddress {
        PostalAddress {
            address: street.to_string(),
            apt_no: String::new(),
            city: "Hayward".to_string(),
            state: "CA".to_string(),
            zip: "94541".to_string(),
        }
    }

    fn resolution(score: u8, lng: f64) -> Resolution {
        Resolution {
            matched_address: "matched".to_string(),
            matched_zip: Some("94541".to_string()),
            longitude: lng,
            latitude: 37.6,
            confidence_score: ConfidenceScore::new(score).unwrap(),
        }
    }

    fn resolved(id: &str, street: &str, score: u8, place: &str) -> IncidentRecord {
        IncidentRecord::resolved(
            IncidentId::from(id),
            address(street),
            resolution(score, -122.0),
            Some(place.to_string()),
        )
    }

    fn raw(id: &str, street: &str) -> IncidentRecord {
        IncidentRecord::snapshot(IncidentId::from(id), address(street))
    }

    fn setup() -> (IncidentTable, Partition) {
        let baseline = IncidentTable::from_records(
            "baseline",
            vec![
                resolved("1", "1 A St", 100, "Hayward"),
                resolved("2", "2 B St", 100, "Hayward"),
                resolved("9", "9 Gone St", 100, "Hayward"),
            ],
        )
        .unwrap();
        let today = IncidentTable::from_records(
            "today",
            vec![
                raw("1", "1 A St"),
                raw("2", "22 B St"),
                raw("3", "3 C St"),
                raw("4", "4 D St"),
            ],
        )
        .unwrap();
        let partition = diff(&baseline, &today);
        (baseline, partition)
    }

    fn accepted(id: &str, street: &str, change: ChangeKind) -> AcceptedRecord {
        AcceptedRecord {
            record: resolved(id, street, 100, "San Leandro"),
            change,
        }
    }

    fn review(id: &str, street: &str, outcome: ReconciliationOutcome) -> ReviewEntry {
        let record = if outcome == ReconciliationOutcome::Failed {
            raw(id, street)
        } else {
            IncidentRecord::resolved(IncidentId::from(id), address(street), resolution(70, -1.0), None)
        };
        ReviewEntry {
            record,
            change: ChangeKind::New,
            outcome,
        }
    }

    #[test]
    fn merges_unchanged_and_accepted_and_replaces_changed() {
        let (baseline, partition) = setup();
        let out = merge(
            &baseline,
            &partition,
            vec![
                accepted("2", "22 B St", ChangeKind::Changed),
                accepted("3", "3 C St", ChangeKind::New),
            ],
            vec![review("4", "4 D St", ReconciliationOutcome::Failed)],
            MergeOptions::default(),
        )
        .unwrap();

        let ids: Vec<&str> = out.table.ids().map(IncidentId::as_str).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(out.table.get(&IncidentId::from("1")), baseline.get(&IncidentId::from("1")));
        let changed = out.table.get(&IncidentId::from("2")).unwrap();
        assert_eq!(changed.address.address, "22 B St");
        assert_eq!(changed.place.as_deref(), Some("San Leandro"));

        assert_eq!(out.review.len(), 1);
        assert_eq!(out.retained_absent, 0);
        assert_eq!(out.outcomes[&IncidentId::from("1")], ReconciliationOutcome::Unchanged);
        assert_eq!(
            out.outcomes[&IncidentId::from("2")],
            ReconciliationOutcome::ChangedConfident
        );
        assert_eq!(out.outcomes[&IncidentId::from("3")], ReconciliationOutcome::NewConfident);
        assert_eq!(out.outcomes[&IncidentId::from("4")], ReconciliationOutcome::Failed);
    }

    #[test]
    fn output_and_review_are_disjoint() {
        let (baseline, partition) = setup();
        let out = merge(
            &baseline,
            &partition,
            vec![accepted("3", "3 C St", ChangeKind::New)],
            vec![
                ReviewEntry {
                    change: ChangeKind::Changed,
                    ..review("2", "22 B St", ReconciliationOutcome::NeedsReview)
                },
                review("4", "4 D St", ReconciliationOutcome::Failed),
            ],
            MergeOptions::default(),
        )
        .unwrap();

        let output: BTreeSet<&IncidentId> = out.table.ids().collect();
        let reviewed: BTreeSet<&IncidentId> = out.review.iter().map(|r| &r.record.id).collect();
        assert!(output.is_disjoint(&reviewed));
        assert!(!output.contains(&IncidentId::from("2")), "failed change must drop the old row");
    }

    #[test]
    fn low_confidence_cannot_be_accepted() {
        let (baseline, partition) = setup();
        let mut bad = accepted("3", "3 C St", ChangeKind::New);
        bad.record = resolved("3", "3 C St", 99, "Hayward");
        let err = merge(
            &baseline,
            &partition,
            vec![bad, accepted("2", "22 B St", ChangeKind::Changed)],
            vec![review("4", "4 D St", ReconciliationOutcome::Failed)],
            MergeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::Invariant { .. }));
    }

    #[test]
    fn every_new_or_changed_id_needs_a_disposition() {
        let (baseline, partition) = setup();
        let err = merge(
            &baseline,
            &partition,
            vec![accepted("3", "3 C St", ChangeKind::New)],
            vec![review("4", "4 D St", ReconciliationOutcome::Failed)],
            MergeOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Changed ID 2 has no disposition"), "{err}");
    }

    #[test]
    fn double_disposition_is_rejected() {
        let (baseline, partition) = setup();
        let err = merge(
            &baseline,
            &partition,
            vec![
                accepted("2", "22 B St", ChangeKind::Changed),
                accepted("3", "3 C St", ChangeKind::New),
            ],
            vec![
                review("3", "3 C St", ReconciliationOutcome::NeedsReview),
                review("4", "4 D St", ReconciliationOutcome::Failed),
            ],
            MergeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ReconcileError::Invariant { .. }));
    }

    #[test]
    fn unchanged_ids_cannot_be_reprocessed() {
        let (baseline, partition) = setup();
        let err = merge(
            &baseline,
            &partition,
            vec![accepted("1", "1 A St", ChangeKind::Changed)],
            Vec::new(),
            MergeOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("neither new nor changed"), "{err}");
    }

    #[test]
    fn carried_rows_keep_their_verbatim_text() {
        let (baseline, partition) = setup();
        let text = |id: &str| VerbatimRow::new(vec![id.to_string(), "-122.0800".to_string()]);
        let baseline = IncidentTable::from_rows(
            "baseline",
            baseline
                .records()
                .map(|r| (r.clone(), Some(text(r.id.as_str()))))
                .collect::<Vec<_>>(),
        )
        .unwrap();

        let out = merge(
            &baseline,
            &partition,
            vec![
                accepted("2", "22 B St", ChangeKind::Changed),
                accepted("3", "3 C St", ChangeKind::New),
            ],
            vec![review("4", "4 D St", ReconciliationOutcome::Failed)],
            MergeOptions {
                retain_absent: true,
            },
        )
        .unwrap();

        assert_eq!(out.table.verbatim(&IncidentId::from("1")), Some(&text("1")));
        assert_eq!(out.table.verbatim(&IncidentId::from("9")), Some(&text("9")));
        assert_eq!(out.table.verbatim(&IncidentId::from("2")), None, "re-geocoded rows are rewritten");
        assert_eq!(out.table.verbatim(&IncidentId::from("3")), None);
    }

    #[test]
    fn absent_rows_are_dropped_unless_retained() {
        let (baseline, partition) = setup();
        let run = |retain_absent| {
            merge(
                &baseline,
                &partition,
                vec![
                    accepted("2", "22 B St", ChangeKind::Changed),
                    accepted("3", "3 C St", ChangeKind::New),
                ],
                vec![review("4", "4 D St", ReconciliationOutcome::Failed)],
                MergeOptions { retain_absent },
            )
            .unwrap()
        };

        let dropped = run(false);
        assert!(!dropped.table.contains(&IncidentId::from("9")));
        assert!(!dropped.outcomes.contains_key(&IncidentId::from("9")));

        let kept = run(true);
        assert_eq!(kept.retained_absent, 1);
        assert_eq!(
            kept.table.get(&IncidentId::from("9")),
            baseline.get(&IncidentId::from("9"))
        );
        assert!(!kept.outcomes.contains_key(&IncidentId::from("9")));
    }
}
