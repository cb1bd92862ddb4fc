use serde::Deserialize;

use crate::error::ImportError;
use crate::import::{ImportSource, RawDiveRow};
use crate::models::ComputerInfo;

/// Rows decoded by the host (or a test) instead of read from a database.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemorySource {
    pub rows: Vec<RawDiveRow>,
    pub computer: ComputerInfo,
}

impl MemorySource {
    pub fn new(rows: Vec<RawDiveRow>) -> Self {
        Self {
            rows,
            computer: ComputerInfo::default(),
        }
    }

    /// Parse `{ "rows": [...], "computer": {...} }`.
    pub fn from_json(text: &str) -> Result<Self, ImportError> {
        serde_json::from_str(text).map_err(|e| ImportError::Malformed(e.to_string()))
    }

    /// Three Bonaire dives on one day.
    pub fn with_sample_data() -> Self {
        let dive = |id: i64, start: &str, duration: i64, start_bar: f64, end_bar: f64| RawDiveRow {
            id: Some(id),
            start_time: Some(start.to_string()),
            duration_sec: Some(duration),
            location: Some("Bonaire".to_string()),
            site: Some("Salt Pier".to_string()),
            max_depth_m: Some(22.0),
            avg_depth_m: Some(12.5),
            water_temp_c: Some(27.5),
            o2_percent: Some(32.0),
            start_pressure_bar: Some(start_bar),
            end_pressure_bar: Some(end_bar),
            gf99_end: Some(48.0),
            ..RawDiveRow::default()
        };
        Self {
            rows: vec![
                dive(1, "2024-03-15 08:00:00", 3000, 210.0, 60.0),
                dive(2, "2024-03-15 11:00:00", 2400, 200.0, 70.0),
                dive(3, "2024-03-15 15:00:00", 3600, 220.0, 80.0),
            ],
            computer: ComputerInfo {
                serial: "PERDIX-0001".to_string(),
                firmware: "92".to_string(),
            },
        }
    }
}

impl ImportSource for MemorySource {
    fn verify_schema(&self) -> Result<(), ImportError> {
        Ok(())
    }

    fn dive_rows(&self) -> Result<Vec<RawDiveRow>, ImportError> {
        Ok(self.rows.clone())
    }

    fn computer_info(&self) -> Result<ComputerInfo, ImportError> {
        Ok(self.computer.clone())
    }
}
