//! Geocoding of new and changed records.

use std::sync::Arc;

use case_map_geocoder::{GeocodeOutcome, Geocoder};
use case_map_incident_models::{ChangeKind, IncidentRecord};

use crate::diff::Partition;
use crate::progress::ProgressCallback;
use crate::{IncidentTable, ReconcileError};

/// A record of today's snapshot together with its geocoding outcome.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    /// Today's raw record.
    pub record: IncidentRecord,
    /// Why it needed resolution.
    pub change: ChangeKind,
    /// What the provider said.
    pub outcome: GeocodeOutcome,
}

/// Geocodes every new and changed record of `today`, sequentially and in
/// [`Partition::needs_resolution`] order. Unchanged records are never sent
/// to the provider.
///
/// # Errors
///
/// Returns [`ReconcileError::Geocode`] on the first provider failure; no
/// partial results are returned.
pub async fn resolve_pending(
    geocoder: &dyn Geocoder,
    today: &IncidentTable,
    partition: &Partition,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<ResolvedRecord>, ReconcileError> {
    let total = partition.resolution_count();
    progress.set_total(total as u64);

    if total > 0 {
        log::info!("Geocoding {total} record(s) with {}...", geocoder.name());
    }

    let mut resolved = Vec::with_capacity(total);
    for (id, change) in partition.needs_resolution() {
        let record = today.get(id).ok_or_else(|| ReconcileError::Invariant {
            message: format!("{change} ID {id} is missing from today's snapshot"),
        })?;

        progress.set_message(format!("Geocoding {id}"));

        let outcome = case_map_geocoder::resolve(geocoder, &record.address)
            .await
            .inspect_err(|e| log::error!("Geocoding aborted at incident {id}: {e}"))?;

        resolved.push(ResolvedRecord {
            record: record.clone(),
            change,
            outcome,
        });
        progress.inc(1);
    }

    progress.finish(format!("Geocoded {total} record(s)"));
    Ok(resolved)
}
