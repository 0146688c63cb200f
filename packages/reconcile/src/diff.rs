//! Partitioning of today's snapshot against the baseline.
//!
//! A record is *changed* when its `Address` differs from the baseline's
//! `Address`, the field its stored resolution was computed from. The
//! comparison is exact and case-sensitive; other postal fields do not
//! trigger re-geocoding.

use std::collections::BTreeSet;

use case_map_incident_models::{ChangeKind, IncidentId};

use crate::IncidentTable;

/// Today's IDs split into disjoint sets, plus baseline IDs missing today.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// In today but not in the baseline.
    pub new: BTreeSet<IncidentId>,
    /// In both, with a different `Address`.
    pub changed: BTreeSet<IncidentId>,
    /// In both, with the same `Address`.
    pub unchanged: BTreeSet<IncidentId>,
    /// In the baseline but not today. Not part of today's partition.
    pub absent: BTreeSet<IncidentId>,
}

impl Partition {
    /// IDs that must be geocoded, new ones first.
    pub fn needs_resolution(&self) -> impl Iterator<Item = (&IncidentId, ChangeKind)> {
        self.new
            .iter()
            .map(|id| (id, ChangeKind::New))
            .chain(self.changed.iter().map(|id| (id, ChangeKind::Changed)))
    }

    /// Number of IDs that must be geocoded.
    #[must_use]
    pub fn resolution_count(&self) -> usize {
        self.new.len() + self.changed.len()
    }

    /// Whether `id` is new or changed, and which.
    #[must_use]
    pub fn change_kind(&self, id: &IncidentId) -> Option<ChangeKind> {
        if self.new.contains(id) {
            Some(ChangeKind::New)
        } else if self.changed.contains(id) {
            Some(ChangeKind::Changed)
        } else {
            None
        }
    }

    /// Size of today's snapshot.
    #[must_use]
    pub fn today_count(&self) -> usize {
        self.new.len() + self.changed.len() + self.unchanged.len()
    }
}

/// Partitions `today` against `baseline`.
#[must_use]
pub fn diff(baseline: &IncidentTable, today: &IncidentTable) -> Partition {
    let mut partition = Partition::default();

    for record in today.records() {
        match baseline.get(&record.id) {
            None => {
                partition.new.insert(record.id.clone());
            }
            Some(previous) if previous.address.address != record.address.address => {
                partition.changed.insert(record.id.clone());
            }
            Some(_) => {
                partition.unchanged.insert(record.id.clone());
            }
        }
    }

    partition.absent = baseline
        .ids()
        .filter(|id| !today.contains(id))
        .cloned()
        .collect();

    log::info!(
        "{} new, {} changed, {} unchanged, {} absent from today",
        partition.new.len(),
        partition.changed.len(),
        partition.unchanged.len(),
        partition.absent.len()
    );

    partition
}

#[cfg(test)]
mod tests {
    use case_map_incident_models::{IncidentRecord, PostalAddress};

    use super::*;

    fn record(id: &str, address: &str, city: &str) -> IncidentRecord {
        IncidentRecord::snapshot(
            IncidentId::from(id),
            PostalAddress {
                address: address.to_string(),
                city: city.to_string(),
                ..PostalAddress::default()
            },
        )
    }

    fn table(records: Vec<IncidentRecord>) -> IncidentTable {
        IncidentTable::from_records("test", records).unwrap()
    }

    fn ids(set: &BTreeSet<IncidentId>) -> Vec<&str> {
        set.iter().map(IncidentId::as_str).collect()
    }

    #[test]
    fn partitions_new_changed_unchanged() {
        let baseline = table(vec![
            record("1", "123 Main St", "Hayward"),
            record("2", "9 Oak Ave", "Hayward"),
            record("3", "1 Gone Way", "Hayward"),
        ]);
        let today = table(vec![
            record("1", "123 Main St", "Hayward"),
            record("2", "11 Oak Ave", "Hayward"),
            record("4", "77 New Rd", "Hayward"),
        ]);

        let p = diff(&baseline, &today);

        assert_eq!(ids(&p.new), vec!["4"]);
        assert_eq!(ids(&p.changed), vec!["2"]);
        assert_eq!(ids(&p.unchanged), vec!["1"]);
        assert_eq!(ids(&p.absent), vec!["3"]);
    }

    #[test]
    fn partition_covers_today_without_overlap() {
        let baseline = table(vec![
            record("a", "1 A St", "X"),
            record("b", "2 B St", "X"),
            record("c", "3 C St", "X"),
        ]);
        let today = table(vec![
            record("a", "1 A St", "X"),
            record("b", "2 B Street", "X"),
            record("d", "4 D St", "X"),
            record("e", "5 E St", "X"),
        ]);

        let p = diff(&baseline, &today);

        let mut union: Vec<&IncidentId> = p
            .new
            .iter()
            .chain(p.changed.iter())
            .chain(p.unchanged.iter())
            .collect();
        let total = union.len();
        union.sort();
        union.dedup();
        assert_eq!(union.len(), total, "sets overlap");
        assert_eq!(union, today.ids().collect::<Vec<_>>());
        assert_eq!(p.today_count(), today.len());
    }

    #[test]
    fn address_comparison_is_exact_and_case_sensitive() {
        let baseline = table(vec![
            record("1", "123 Main St", "X"),
            record("2", "123 Main St", "X"),
            record("3", "123 Main St", "X"),
        ]);
        let today = table(vec![
            record("1", "123 MAIN ST", "X"),
            record("2", "123 Main St ", "X"),
            record("3", "123 Main St", "X"),
        ]);

        let p = diff(&baseline, &today);
        assert_eq!(ids(&p.changed), vec!["1", "2"]);
        assert_eq!(ids(&p.unchanged), vec!["3"]);
    }

    #[test]
    fn other_postal_fields_do_not_count_as_changes() {
        let baseline = table(vec![record("1", "123 Main St", "Hayward")]);
        let today = table(vec![record("1", "123 Main St", "San Leandro")]);
        let p = diff(&baseline, &today);
        assert!(p.changed.is_empty());
        assert_eq!(ids(&p.unchanged), vec!["1"]);
    }

    #[test]
    fn identical_snapshots_have_nothing_to_resolve() {
        let records = vec![record("1", "1 A St", "X"), record("2", "2 B St", "X")];
        let p = diff(&table(records.clone()), &table(records));
        assert_eq!(p.resolution_count(), 0);
        assert!(p.absent.is_empty());
        assert_eq!(p.unchanged.len(), 2);
    }

    #[test]
    fn new_ids_are_resolved_before_changed_ids() {
        let baseline = table(vec![record("1", "old", "X")]);
        let today = table(vec![record("1", "new", "X"), record("2", "x", "X")]);
        let p = diff(&baseline, &today);
        let order: Vec<(&str, ChangeKind)> = p
            .needs_resolution()
            .map(|(id, kind)| (id.as_str(), kind))
            .collect();
        assert_eq!(order, vec![("2", ChangeKind::New), ("1", ChangeKind::Changed)]);
        assert_eq!(p.change_kind(&IncidentId::from("1")), Some(ChangeKind::Changed));
        assert_eq!(p.change_kind(&IncidentId::from("9")), None);
    }
}
