//! Dive-computer export ingestion.
//!
//! A source hands over loosely typed rows; [`ingest`] validates each one into
//! a [`DiveRecord`]. Schema problems abort the import, row problems skip the
//! row and are collected into the [`ImportReport`].

pub mod memory;
pub mod shearwater;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::LocationAliases;
use crate::error::{ImportError, InvalidDiveData};
use crate::models::{ComputerInfo, DiveId, DiveRecord, AIR_O2_PERCENT};
use crate::timestamp::parse_timestamp;

pub use memory::MemorySource;
pub use shearwater::ShearwaterDb;

/// One dive as read from a source, already in canonical units.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawDiveRow {
    pub id: Option<i64>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_sec: Option<i64>,
    pub location: Option<String>,
    pub site: Option<String>,
    pub max_depth_m: Option<f64>,
    pub avg_depth_m: Option<f64>,
    pub water_temp_c: Option<f64>,
    pub o2_percent: Option<f64>,
    pub start_pressure_bar: Option<f64>,
    pub end_pressure_bar: Option<f64>,
    pub gf99_end: Option<f64>,
}

pub trait ImportSource {
    /// Check that everything the source needs is present before any row is read.
    fn verify_schema(&self) -> Result<(), ImportError>;
    fn dive_rows(&self) -> Result<Vec<RawDiveRow>, ImportError>;
    fn computer_info(&self) -> Result<ComputerInfo, ImportError>;
}

#[derive(Clone, Debug, Default)]
pub struct ImportReport {
    pub dives: Vec<DiveRecord>,
    pub skipped: Vec<InvalidDiveData>,
    pub computer: ComputerInfo,
    pub rows_read: usize,
}

impl ImportReport {
    pub fn summary(&self) -> String {
        format!(
            "read {} rows: {} dives accepted, {} skipped",
            self.rows_read,
            self.dives.len(),
            self.skipped.len()
        )
    }

    /// Move dives whose id is already taken into the skipped list.
    pub fn reject_existing(&mut self, is_taken: impl Fn(DiveId) -> bool) {
        let (taken, fresh): (Vec<_>, Vec<_>) =
            self.dives.drain(..).partition(|d| is_taken(d.id));
        for dive in taken {
            tracing::warn!(dive = %dive.id, "dive already in project, skipping");
            self.skipped.push(InvalidDiveData::DuplicateId {
                dive: dive.id.to_string(),
            });
        }
        self.dives = fresh;
    }
}

/// Read and validate every row of `source`.
pub fn ingest<S: ImportSource + ?Sized>(
    source: &S,
    aliases: &LocationAliases,
) -> Result<ImportReport, ImportError> {
    source.verify_schema()?;
    let computer = source.computer_info()?;
    let rows = source.dive_rows()?;

    let mut report = ImportReport {
        computer,
        rows_read: rows.len(),
        ..ImportReport::default()
    };
    let mut seen = BTreeSet::new();

    for row in &rows {
        match validate_row(row, aliases) {
            Ok(dive) if !seen.insert(dive.id) => {
                tracing::warn!(dive = %dive.id, "duplicate dive id in import, skipping");
                report.skipped.push(InvalidDiveData::DuplicateId {
                    dive: dive.id.to_string(),
                });
            }
            Ok(dive) => report.dives.push(dive),
            Err(err) => {
                tracing::warn!(%err, "skipping dive row");
                report.skipped.push(err);
            }
        }
    }

    tracing::info!(
        rows = report.rows_read,
        accepted = report.dives.len(),
        skipped = report.skipped.len(),
        "import finished"
    );
    Ok(report)
}

fn validate_row(row: &RawDiveRow, aliases: &LocationAliases) -> Result<DiveRecord, InvalidDiveData> {
    let Some(raw_id) = row.id else {
        return Err(InvalidDiveData::MissingField {
            dive: "<unnumbered>".to_string(),
            field: "id",
        });
    };
    let id = DiveId(raw_id);
    let label = id.to_string();
    let missing = |field: &'static str| InvalidDiveData::MissingField {
        dive: label.clone(),
        field,
    };
    let timestamp = |value: &str| {
        parse_timestamp(value).map_err(|_| InvalidDiveData::BadTimestamp {
            dive: label.clone(),
            value: value.to_string(),
        })
    };

    let start = timestamp(row.start_time.as_deref().ok_or_else(|| missing("startTime"))?)?;
    let location = aliases.normalize(row.location.as_deref().unwrap_or_default());

    let dive = match (&row.end_time, row.duration_sec) {
        (Some(end), _) => DiveRecord::with_window(id, start, timestamp(end.as_str())?, location)?,
        (None, Some(duration)) => DiveRecord::new(id, start, duration, location)?,
        (None, None) => return Err(missing("duration")),
    };

    let max_depth = row.max_depth_m.ok_or_else(|| missing("maxDepth"))?;
    let avg_depth = row.avg_depth_m.ok_or_else(|| missing("avgDepth"))?;
    let start_pressure = row.start_pressure_bar.ok_or_else(|| missing("startPressure"))?;
    let end_pressure = row.end_pressure_bar.ok_or_else(|| missing("endPressure"))?;

    Ok(dive
        .with_site(row.site.as_deref().unwrap_or_default().trim())
        .with_depths(max_depth, avg_depth)
        .with_pressures(start_pressure, end_pressure)
        .with_o2_percent(row.o2_percent.unwrap_or(AIR_O2_PERCENT))
        .with_water_temp(row.water_temp_c)
        .with_gf99(row.gf99_end))
}
