//! Keyed incident tables.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use case_map_incident_models::{IncidentId, IncidentRecord};

use crate::ReconcileError;

/// The cells of a row exactly as read from a table file, in
/// [`crate::tsv::TABLE_HEADERS`] order.
///
/// Rows carried forward from the baseline are written back from these
/// cells, so their text survives a run unchanged even where it is not in
/// canonical form (`-122.0800`, `100.0`) or does not parse into a full
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbatimRow {
    cells: Vec<String>,
}

impl VerbatimRow {
    /// Wraps the given cells.
    #[must_use]
    pub const fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// The cells in column order.
    #[must_use]
    pub fn cells(&self) -> &[String] {
        &self.cells
    }
}

/// Incident records keyed by [`IncidentId`], iterated in ID order.
///
/// Construction rejects duplicate IDs, so a table always satisfies the
/// one-row-per-ID invariant. Records read from a file may carry their
/// [`VerbatimRow`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncidentTable {
    records: BTreeMap<IncidentId, IncidentRecord>,
    verbatim: BTreeMap<IncidentId, VerbatimRow>,
}

impl IncidentTable {
    /// Builds a table from `records`.
    ///
    /// `label` names the table in the error message.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DuplicateIncidentId`] on the first
    /// repeated ID.
    pub fn from_records(
        label: &str,
        records: impl IntoIterator<Item = IncidentRecord>,
    ) -> Result<Self, ReconcileError> {
        Self::from_rows(label, records.into_iter().map(|record| (record, None)))
    }

    /// Builds a table from records paired with the text they were read
    /// from, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DuplicateIncidentId`] on the first
    /// repeated ID.
    pub fn from_rows(
        label: &str,
        rows: impl IntoIterator<Item = (IncidentRecord, Option<VerbatimRow>)>,
    ) -> Result<Self, ReconcileError> {
        let mut records = BTreeMap::new();
        let mut verbatim = BTreeMap::new();
        for (record, text) in rows {
            match records.entry(record.id.clone()) {
                Entry::Occupied(_) => {
                    return Err(ReconcileError::DuplicateIncidentId {
                        table: label.to_string(),
                        id: record.id,
                    });
                }
                Entry::Vacant(slot) => {
                    if let Some(text) = text {
                        verbatim.insert(record.id.clone(), text);
                    }
                    slot.insert(record);
                }
            }
        }
        Ok(Self { records, verbatim })
    }

    /// Looks up a record.
    #[must_use]
    pub fn get(&self, id: &IncidentId) -> Option<&IncidentRecord> {
        self.records.get(id)
    }

    /// The text `id`'s row was read from, if it came from a file.
    #[must_use]
    pub fn verbatim(&self, id: &IncidentId) -> Option<&VerbatimRow> {
        self.verbatim.get(id)
    }

    /// Whether `id` is present.
    #[must_use]
    pub fn contains(&self, id: &IncidentId) -> bool {
        self.records.contains_key(id)
    }

    /// All IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &IncidentId> {
        self.records.keys()
    }

    /// All records in ID order.
    pub fn records(&self) -> impl Iterator<Item = &IncidentRecord> {
        self.records.values()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
