//! Tab-delimited snapshot and table files.
//!
//! Baselines are accepted in both the current header layout and the
//! legacy one (`Done_Address`, `MyX`, `MyY`, `MyZip`, `Match_addr`,
//! `Score`, ...). Output is always written in the current layout.

use std::fs::File;
use std::path::{Path, PathBuf};

use case_map_incident_models::{
    ConfidenceScore, IncidentId, IncidentRecord, PostalAddress, Resolution,
};
use serde::{Deserialize, Serialize};

use crate::merge::ReviewEntry;
use crate::{IncidentTable, ReconcileError, VerbatimRow};

/// Header of the authoritative table.
pub const TABLE_HEADERS: [&str; 12] = [
    "IncidentID",
    "Address",
    "AptNo",
    "City",
    "State",
    "Zip",
    "MatchedAddress",
    "MatchedZip",
    "Longitude",
    "Latitude",
    "ConfidenceScore",
    "Place",
];

/// Legacy name of each [`TABLE_HEADERS`] column, where one exists.
const LEGACY_TABLE_HEADERS: [Option<&str>; 12] = [
    None,
    Some("Done_Address"),
    Some("Done_AptNo"),
    Some("Done_City"),
    Some("Done_State"),
    Some("Done_Zip"),
    Some("Match_addr"),
    Some("MyZip"),
    Some("MyX"),
    Some("MyY"),
    Some("Score"),
    None,
];

/// Header of the review table.
pub const REVIEW_HEADERS: [&str; 13] = [
    "IncidentID",
    "Change",
    "Outcome",
    "Address",
    "AptNo",
    "City",
    "State",
    "Zip",
    "MatchedAddress",
    "MatchedZip",
    "Longitude",
    "Latitude",
    "ConfidenceScore",
];

#[derive(Debug, Deserialize)]
struct BaselineRow {
    #[serde(rename = "IncidentID")]
    incident_id: String,
    #[serde(rename = "Address", alias = "Done_Address")]
    address: String,
    #[serde(rename = "AptNo", alias = "Done_AptNo", default)]
    apt_no: Option<String>,
    #[serde(rename = "City", alias = "Done_City")]
    city: String,
    #[serde(rename = "State", alias = "Done_State")]
    state: String,
    #[serde(rename = "Zip", alias = "Done_Zip")]
    zip: String,
    #[serde(rename = "MatchedAddress", alias = "Match_addr", default)]
    matched_address: Option<String>,
    #[serde(rename = "MatchedZip", alias = "MyZip", default)]
    matched_zip: Option<String>,
    #[serde(rename = "Longitude", alias = "MyX", default)]
    longitude: Option<f64>,
    #[serde(rename = "Latitude", alias = "MyY", default)]
    latitude: Option<f64>,
    #[serde(rename = "ConfidenceScore", alias = "Score", default)]
    confidence_score: Option<f64>,
    #[serde(rename = "Place", default)]
    place: Option<String>,
}

impl BaselineRow {
    fn into_record(self) -> IncidentRecord {
        let address = PostalAddress {
            address: self.address,
            apt_no: self.apt_no.unwrap_or_default(),
            city: self.city,
            state: self.state,
            zip: self.zip,
        };

        let resolution = match (self.longitude, self.latitude, self.confidence_score) {
            (Some(longitude), Some(latitude), Some(score)) => Some(Resolution {
                matched_address: self.matched_address.unwrap_or_default(),
                matched_zip: self.matched_zip,
                longitude,
                latitude,
                confidence_score: ConfidenceScore::from_provider(score),
            }),
            (None, None, None) => None,
            _ => {
                log::warn!(
                    "Baseline row {} has an incomplete resolution; it is carried as read",
                    self.incident_id
                );
                None
            }
        };

        IncidentRecord {
            id: IncidentId::new(self.incident_id),
            address,
            resolution,
            place: self.place,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotRow {
    #[serde(rename = "IncidentID")]
    incident_id: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "AptNo", default)]
    apt_no: Option<String>,
    #[serde(rename = "City")]
    city: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Zip")]
    zip: String,
}

impl SnapshotRow {
    fn into_record(self) -> IncidentRecord {
        IncidentRecord::snapshot(
            IncidentId::new(self.incident_id),
            PostalAddress {
                address: self.address,
                apt_no: self.apt_no.unwrap_or_default(),
                city: self.city,
                state: self.state,
                zip: self.zip,
            },
        )
    }
}

/// Field order matches [`TABLE_HEADERS`].
#[derive(Debug, Serialize)]
struct TableRow<'a> {
    incident_id: &'a str,
    address: &'a str,
    apt_no: &'a str,
    city: &'a str,
    state: &'a str,
    zip: &'a str,
    matched_address: Option<&'a str>,
    matched_zip: Option<&'a str>,
    longitude: Option<f64>,
    latitude: Option<f64>,
    confidence_score: Option<u8>,
    place: Option<&'a str>,
}

impl<'a> From<&'a IncidentRecord> for TableRow<'a> {
    fn from(record: &'a IncidentRecord) -> Self {
        let resolution = record.resolution.as_ref();
        Self {
            incident_id: record.id.as_str(),
            address: &record.address.address,
            apt_no: &record.address.apt_no,
            city: &record.address.city,
            state: &record.address.state,
            zip: &record.address.zip,
            matched_address: resolution.map(|r| r.matched_address.as_str()),
            matched_zip: resolution.and_then(|r| r.matched_zip.as_deref()),
            longitude: resolution.map(|r| r.longitude),
            latitude: resolution.map(|r| r.latitude),
            confidence_score: resolution.map(|r| r.confidence_score.value()),
            place: record.place.as_deref(),
        }
    }
}

/// Field order matches [`REVIEW_HEADERS`].
#[derive(Debug, Serialize)]
struct ReviewRow<'a> {
    incident_id: &'a str,
    change: &'a str,
    outcome: &'a str,
    address: &'a str,
    apt_no: &'a str,
    city: &'a str,
    state: &'a str,
    zip: &'a str,
    matched_address: Option<&'a str>,
    matched_zip: Option<&'a str>,
    longitude: Option<f64>,
    latitude: Option<f64>,
    confidence_score: Option<u8>,
}

impl<'a> From<&'a ReviewEntry> for ReviewRow<'a> {
    fn from(entry: &'a ReviewEntry) -> Self {
        let record = &entry.record;
        let resolution = record.resolution.as_ref();
        Self {
            incident_id: record.id.as_str(),
            change: entry.change.as_ref(),
            outcome: entry.outcome.as_ref(),
            address: &record.address.address,
            apt_no: &record.address.apt_no,
            city: &record.address.city,
            state: &record.address.state,
            zip: &record.address.zip,
            matched_address: resolution.map(|r| r.matched_address.as_str()),
            matched_zip: resolution.and_then(|r| r.matched_zip.as_deref()),
            longitude: resolution.map(|r| r.longitude),
            latitude: resolution.map(|r| r.latitude),
            confidence_score: resolution.map(|r| r.confidence_score.value()),
        }
    }
}

/// Reads a baseline (previously merged) table.
///
/// Each record keeps the cells it was read from as a [`VerbatimRow`], so
/// an unchanged record is written back exactly as it appeared here.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a row is malformed or has
/// an empty `IncidentID`, or an ID is repeated.
pub fn read_baseline(path: &Path) -> Result<IncidentTable, ReconcileError> {
    let (headers, rows) = read_rows::<BaselineRow>(path, |row| row.incident_id.as_str())?;
    let columns = table_columns(&headers);

    let rows = rows.into_iter().map(|(row, raw)| {
        let cells = columns
            .iter()
            .map(|column| {
                column
                    .and_then(|index| raw.get(index))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();
        (row.into_record(), Some(VerbatimRow::new(cells)))
    });
    IncidentTable::from_rows(&path.display().to_string(), rows)
}

/// Reads today's raw snapshot. Columns other than the postal fields are
/// ignored.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a row is malformed or has
/// an empty `IncidentID`, or an ID is repeated.
pub fn read_snapshot(path: &Path) -> Result<IncidentTable, ReconcileError> {
    let (_, rows) = read_rows::<SnapshotRow>(path, |row| row.incident_id.as_str())?;
    let records = rows.into_iter().map(|(row, _)| row.into_record());
    IncidentTable::from_records(&path.display().to_string(), records)
}

/// Position of each [`TABLE_HEADERS`] column in `headers`, by current or
/// legacy name.
fn table_columns(headers: &csv::StringRecord) -> Vec<Option<usize>> {
    TABLE_HEADERS
        .iter()
        .zip(LEGACY_TABLE_HEADERS)
        .map(|(name, legacy)| {
            headers
                .iter()
                .position(|h| h == *name)
                .or_else(|| legacy.and_then(|legacy| headers.iter().position(|h| h == legacy)))
        })
        .collect()
}

fn read_rows<T: for<'de> Deserialize<'de>>(
    path: &Path,
    id_of: impl Fn(&T) -> &str,
) -> Result<(csv::StringRecord, Vec<(T, csv::StringRecord)>), ReconcileError> {
    let csv_error = |source| ReconcileError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;
    let headers = reader.headers().map_err(csv_error)?.clone();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let raw = result.map_err(csv_error)?;
        let row: T = raw.deserialize(Some(&headers)).map_err(csv_error)?;
        if id_of(&row).trim().is_empty() {
            return Err(ReconcileError::EmptyIncidentId {
                table: path.display().to_string(),
                line: index + 2,
            });
        }
        rows.push((row, raw));
    }

    log::debug!("{} row(s) read from {}", rows.len(), path.display());
    Ok((headers, rows))
}

/// Writes the authoritative table to `table_path` and the review list to
/// `review_path`.
///
/// Rows that carry a [`VerbatimRow`] are written from it; all others are
/// formatted from their fields.
///
/// Both files are first written next to their destination with a
/// `.partial` suffix and only renamed into place once both writes have
/// succeeded. The review list is published first, so a failure leaves the
/// previous authoritative table in place.
///
/// # Errors
///
/// Returns an error if either file cannot be written or renamed.
pub fn write_outputs(
    table_path: &Path,
    review_path: &Path,
    table: &IncidentTable,
    review: &[ReviewEntry],
) -> Result<(), ReconcileError> {
    let table_staging = staging_path(table_path);
    let review_staging = staging_path(review_path);

    let written = write_table(&table_staging, table)
        .and_then(|()| write_review(&review_staging, review));

    if let Err(e) = written {
        discard(&table_staging);
        discard(&review_staging);
        return Err(e);
    }

    if let Err(e) = publish(&review_staging, review_path) {
        discard(&table_staging);
        discard(&review_staging);
        return Err(e);
    }

    if let Err(e) = publish(&table_staging, table_path) {
        discard(&table_staging);
        log::error!(
            "{} was updated but {} was not; the previous table is still in place",
            review_path.display(),
            table_path.display()
        );
        return Err(e);
    }

    log::debug!(
        "Wrote {} and {}",
        table_path.display(),
        review_path.display()
    );
    Ok(())
}

fn write_table(path: &Path, table: &IncidentTable) -> Result<(), ReconcileError> {
    let csv_error = |source| ReconcileError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = open_writer(path, &TABLE_HEADERS)?;
    for record in table.records() {
        match table.verbatim(&record.id) {
            Some(text) => writer.write_record(text.cells()).map_err(csv_error)?,
            None => writer.serialize(TableRow::from(record)).map_err(csv_error)?,
        }
    }
    finish(writer, path)
}

fn write_review(path: &Path, review: &[ReviewEntry]) -> Result<(), ReconcileError> {
    let mut writer = open_writer(path, &REVIEW_HEADERS)?;
    for entry in review {
        writer
            .serialize(ReviewRow::from(entry))
            .map_err(|source| ReconcileError::Csv {
                path: path.display().to_string(),
                source,
            })?;
    }
    finish(writer, path)
}

fn open_writer(path: &Path, headers: &[&str]) -> Result<csv::Writer<File>, ReconcileError> {
    let csv_error = |source| ReconcileError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(csv_error)?;
    writer.write_record(headers).map_err(csv_error)?;
    Ok(writer)
}

fn finish(mut writer: csv::Writer<File>, path: &Path) -> Result<(), ReconcileError> {
    writer.flush().map_err(|e| ReconcileError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_owned();
    staged.push(".partial");
    PathBuf::from(staged)
}

fn publish(staging: &Path, destination: &Path) -> Result<(), ReconcileError> {
    std::fs::rename(staging, destination).map_err(|e| ReconcileError::Io {
        path: destination.display().to_string(),
        source: e,
    })
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            log::warn!("Failed to remove {}: {e}", path.display());
        }
        _ => {}
    }
}
