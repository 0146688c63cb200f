//! End-to-end reconciliation of one snapshot against one baseline.

use std::collections::BTreeMap;
use std::sync::Arc;

use case_map_geocoder::{GeocodeOutcome, Geocoder};
use case_map_incident_models::{IncidentId, IncidentRecord, ReconciliationOutcome};
use case_map_spatial::{PlaceSource, SpatialClassifier};

use crate::diff::{Partition, diff};
use crate::merge::{AcceptedRecord, MergeOptions, ReviewEntry, merge};
use crate::progress::ProgressCallback;
use crate::resolve::resolve_pending;
use crate::{IncidentTable, ReconcileError};

/// Run-level switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Carry baseline rows whose ID is missing from today's snapshot.
    pub retain_absent: bool,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows read from the baseline table.
    pub baseline_records: usize,
    /// Rows read from today's snapshot.
    pub today_records: usize,
    /// IDs seen for the first time.
    pub new: usize,
    /// IDs whose `Address` differs from the baseline.
    pub changed: usize,
    /// IDs carried forward without geocoding.
    pub unchanged: usize,
    /// Baseline IDs missing from today's snapshot.
    pub absent: usize,
    /// Absent IDs kept in the output.
    pub absent_retained: usize,
    /// Accepted at score 100.
    pub confident: usize,
    /// Resolved below 100.
    pub needs_review: usize,
    /// No candidate.
    pub failed: usize,
    /// Accepted but outside every boundary.
    pub unplaced: usize,
    /// Accepted with an address override.
    pub overridden: usize,
    /// Carried-forward rows whose place disagrees with an address override.
    pub stale_overrides: usize,
    /// Rows in the new authoritative table.
    pub output_records: usize,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// How today's IDs relate to the baseline.
    pub partition: Partition,
    /// The new authoritative table.
    pub table: IncidentTable,
    /// Records for human review, in ID order.
    pub review: Vec<ReviewEntry>,
    /// Disposition of every ID of today's snapshot.
    pub outcomes: BTreeMap<IncidentId, ReconciliationOutcome>,
    /// Counts for the end-of-run report.
    pub summary: RunSummary,
}

/// Reconciles `today` against `baseline`.
///
/// Only new and changed records reach `geocoder`. Full-confidence results
/// are classified with `classifier` and merged into the output table;
/// everything else goes to the review list.
///
/// # Errors
///
/// * [`ReconcileError::Geocode`] if the provider fails
/// * [`ReconcileError::Spatial`] if a point lies in overlapping boundaries
/// * [`ReconcileError::Invariant`] if the merged tables are inconsistent
pub async fn reconcile(
    baseline: &IncidentTable,
    today: &IncidentTable,
    geocoder: &dyn Geocoder,
    classifier: &SpatialClassifier<'_>,
    options: &ReconcileOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Reconciliation, ReconcileError> {
    let partition = diff(baseline, today);
    let resolved = resolve_pending(geocoder, today, &partition, progress).await?;

    let mut summary = RunSummary {
        baseline_records: baseline.len(),
        today_records: today.len(),
        new: partition.new.len(),
        changed: partition.changed.len(),
        unchanged: partition.unchanged.len(),
        absent: partition.absent.len(),
        ..RunSummary::default()
    };

    let mut accepted = Vec::new();
    let mut review = Vec::new();

    for item in resolved {
        match item.outcome {
            GeocodeOutcome::Confident(candidate) => {
                let resolution = candidate.into_resolution();
                let placement = classifier.classify(
                    &item.record.address.address,
                    resolution.longitude,
                    resolution.latitude,
                )?;
                match placement.source {
                    PlaceSource::Override => summary.overridden += 1,
                    PlaceSource::Unmatched => summary.unplaced += 1,
                    PlaceSource::Boundary => {}
                }
                summary.confident += 1;
                accepted.push(AcceptedRecord {
                    record: item.record.with_resolution(resolution, placement.place),
                    change: item.change,
                });
            }
            GeocodeOutcome::LowConfidence(candidate) => {
                summary.needs_review += 1;
                review.push(ReviewEntry {
                    record: item.record.with_resolution(candidate.into_resolution(), None),
                    change: item.change,
                    outcome: ReconciliationOutcome::NeedsReview,
                });
            }
            GeocodeOutcome::Failed => {
                summary.failed += 1;
                review.push(ReviewEntry {
                    record: item.record,
                    change: item.change,
                    outcome: ReconciliationOutcome::Failed,
                });
            }
        }
    }

    let merged = merge(
        baseline,
        &partition,
        accepted,
        review,
        MergeOptions {
            retain_absent: options.retain_absent,
        },
    )?;

    summary.absent_retained = merged.retained_absent;
    summary.stale_overrides = partition
        .unchanged
        .iter()
        .chain(&partition.absent)
        .filter_map(|id| merged.table.get(id))
        .filter(|record| has_stale_override(record, classifier))
        .count();
    summary.output_records = merged.table.len();

    log::info!(
        "Reconciled {} record(s): {} confident, {} for review, {} failed",
        summary.today_records,
        summary.confident,
        summary.needs_review,
        summary.failed
    );

    Ok(Reconciliation {
        partition,
        table: merged.table,
        review: merged.review,
        outcomes: merged.outcomes,
        summary,
    })
}

/// Whether `record` sits at an override address but carries another place.
///
/// Carried-forward rows are never reclassified, so the mismatch is only
/// reported.
fn has_stale_override(record: &IncidentRecord, classifier: &SpatialClassifier<'_>) -> bool {
    let Some(forced) = classifier
        .overrides()
        .iter()
        .find(|o| o.address == record.address.address)
    else {
        return false;
    };
    if record.place.as_deref() == Some(forced.place.as_str()) {
        return false;
    }
    log::warn!(
        "Record {} at '{}' keeps place {} from the baseline; the override says {}",
        record.id,
        forced.address,
        record.place.as_deref().unwrap_or("(none)"),
        forced.place
    );
    true
}
