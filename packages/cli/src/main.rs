#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the daily incident reconciliation.
//!
//! Reads the previously merged table and today's snapshot, geocodes only
//! what changed, and writes the new merged table plus a review list.
//!
//! Uses `indicatif-log-bridge` (via [`case_map_cli_utils::init_logger`])
//! so log lines and the geocoding progress bar never fight for the
//! terminal.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use case_map_cli_utils::IndicatifProgress;
use case_map_geocoder::service_registry::{build_geocoder, select_service};
use case_map_reconcile::tsv::{read_baseline, read_snapshot, write_outputs};
use case_map_reconcile::{ReconcileOptions, RunSummary, reconcile};
use case_map_spatial::{BoundarySet, SpatialClassifier};
use clap::Parser;

use crate::config::{Config, ConfigError};

#[derive(Parser)]
#[command(
    name = "case_map",
    about = "Merge today's incident snapshot into the geocoded baseline"
)]
struct Cli {
    /// Previously merged table (tab-delimited)
    baseline: PathBuf,
    /// Today's snapshot (tab-delimited)
    today: PathBuf,
    /// Run configuration file (replaces the built-in defaults)
    #[arg(long)]
    config: Option<PathBuf>,
    /// GeoJSON file of place boundaries
    #[arg(long)]
    boundaries: Option<PathBuf>,
    /// Feature property holding the place label (e.g., "PL2018")
    #[arg(long)]
    place_property: Option<String>,
    /// Where to write the merged table
    #[arg(long)]
    output: Option<PathBuf>,
    /// Where to write records that need manual review
    #[arg(long)]
    review: Option<PathBuf>,
    /// Geocoding service id (e.g., "arcgis")
    #[arg(long)]
    service: Option<String>,
    /// Minimum delay between geocoding calls, in milliseconds
    #[arg(long)]
    rate_limit_ms: Option<u64>,
    /// Keep baseline records that are missing from today's snapshot
    #[arg(long)]
    retain_absent: bool,
}

impl Cli {
    fn apply_to(&self, mut config: Config) -> Config {
        if let Some(path) = &self.boundaries {
            config.boundaries.path.clone_from(path);
        }
        if let Some(property) = &self.place_property {
            config.boundaries.place_property.clone_from(property);
        }
        if let Some(path) = &self.output {
            config.outputs.table.clone_from(path);
        }
        if let Some(path) = &self.review {
            config.outputs.review.clone_from(path);
        }
        if self.service.is_some() {
            config.geocoder.service.clone_from(&self.service);
        }
        if self.rate_limit_ms.is_some() {
            config.geocoder.rate_limit_ms = self.rate_limit_ms;
        }
        config.retain_absent |= self.retain_absent;
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let multi = case_map_cli_utils::init_logger();

    let config = cli.apply_to(Config::load(cli.config.as_deref())?);

    let baseline = read_baseline(&cli.baseline)?;
    println!(
        "{} record(s) read from {}",
        baseline.len(),
        cli.baseline.display()
    );

    let today = read_snapshot(&cli.today)?;
    println!("{} record(s) read from {}", today.len(), cli.today.display());

    let boundaries =
        BoundarySet::load_geojson(&config.boundaries.path, &config.boundaries.place_property)?;
    if boundaries.is_empty() {
        log::warn!("No boundaries loaded; accepted records will have no place");
    }

    let service = match config.geocoder.service.as_deref() {
        Some(id) => select_service(Some(id))
            .ok_or_else(|| ConfigError::UnknownService(id.to_string()))?,
        None => select_service(None).ok_or(ConfigError::NoService)?,
    };
    let geocoder = build_geocoder(
        &service,
        config.geocoder.rate_limit_ms.map(Duration::from_millis),
    )?;

    let classifier = SpatialClassifier::new(&boundaries, config.place_overrides());
    let progress = IndicatifProgress::geocode_bar(&multi, "Geocoding");

    let run = reconcile(
        &baseline,
        &today,
        &geocoder,
        &classifier,
        &ReconcileOptions {
            retain_absent: config.retain_absent,
        },
        &progress,
    )
    .await?;

    print_summary(&run.summary);

    write_outputs(
        &config.outputs.table,
        &config.outputs.review,
        &run.table,
        &run.review,
    )?;
    println!(
        "Merged data ({} record(s)) written to {}",
        run.table.len(),
        config.outputs.table.display()
    );
    println!(
        "{} record(s) written to {}",
        run.review.len(),
        config.outputs.review.display()
    );

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("{} new record(s) found", summary.new);
    println!("{} address(es) with changes", summary.changed);
    println!("{} record(s) unchanged", summary.unchanged);
    if summary.absent > 0 {
        println!(
            "{} baseline record(s) missing from today ({} retained)",
            summary.absent, summary.absent_retained
        );
    }
    println!("{} record(s) geocoded with full confidence", summary.confident);
    if summary.overridden > 0 {
        println!("{} record(s) placed by address override", summary.overridden);
    }
    if summary.stale_overrides > 0 {
        println!(
            "{} carried-forward record(s) disagree with an address override",
            summary.stale_overrides
        );
    }
    if summary.unplaced > 0 {
        println!("{} record(s) outside every boundary", summary.unplaced);
    }
    if summary.needs_review > 0 {
        println!("{} record(s) need review (score < 100)", summary.needs_review);
    }
    if summary.failed > 0 {
        println!("Unable to geocode {} record(s)", summary.failed);
    }
}
