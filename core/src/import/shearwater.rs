//! Reader for Shearwater Cloud SQLite exports.
//!
//! Summary fields live in `dive_details`; tank pressures and gas come from a
//! JSON blob in `TankProfileData`, and average depth, temperature and GF99
//! from the JSON in `log_data.calculated_values_from_samples`. The export
//! stores pressures in PSI, average depth in feet and temperature in °F.

use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value as Json;

use crate::error::ImportError;
use crate::import::{ImportSource, RawDiveRow};
use crate::models::ComputerInfo;
use crate::units::{fahrenheit_to_celsius, feet_to_meters, psi_to_bar};

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "dive_details",
        &[
            "DiveId",
            "DiveNumber",
            "DiveDate",
            "Location",
            "Site",
            "Depth",
            "DiveLengthTime",
            "TankProfileData",
        ],
    ),
    ("log_data", &["log_id", "calculated_values_from_samples"]),
];

const COMPUTER_TABLE: &str = "StoredDiveComputer";

const DIVE_QUERY: &str = "SELECT d.DiveNumber, d.DiveDate, d.Location, d.Site, d.Depth, \
     d.DiveLengthTime, d.TankProfileData, l.calculated_values_from_samples \
     FROM dive_details d \
     LEFT JOIN log_data l ON d.DiveId = l.log_id \
     ORDER BY d.DiveDate";

pub struct ShearwaterDb {
    conn: Connection,
}

impl ShearwaterDb {
    /// Open an export read-only.
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        if !path.is_file() {
            return Err(ImportError::SourceNotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    fn table_exists(&self, table: &str) -> Result<bool, ImportError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, ImportError> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

impl ImportSource for ShearwaterDb {
    fn verify_schema(&self) -> Result<(), ImportError> {
        for (table, required) in REQUIRED_COLUMNS {
            if !self.table_exists(table)? {
                return Err(ImportError::MissingTable(table.to_string()));
            }
            let present = self.columns(table)?;
            if let Some(column) = required.iter().find(|c| !present.iter().any(|p| p == *c)) {
                return Err(ImportError::MissingColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn dive_rows(&self) -> Result<Vec<RawDiveRow>, ImportError> {
        let mut stmt = self.conn.prepare(DIVE_QUERY)?;
        let raw = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(8);
                for i in 0..8 {
                    values.push(row.get::<_, Value>(i)?);
                }
                Ok(values)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(raw.iter().map(|values| convert_row(values)).collect())
    }

    fn computer_info(&self) -> Result<ComputerInfo, ImportError> {
        if !self.table_exists(COMPUTER_TABLE)? {
            tracing::debug!("no dive computer table in export");
            return Ok(ComputerInfo::default());
        }
        let row = self
            .conn
            .query_row(
                "SELECT SerialNumber, Firmware FROM StoredDiveComputer LIMIT 1",
                [],
                |row| Ok((row.get::<_, Value>(0)?, row.get::<_, Value>(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((serial, firmware)) => ComputerInfo {
                serial: value_text(&serial).unwrap_or_else(|| ComputerInfo::default().serial),
                firmware: value_text(&firmware).unwrap_or_default(),
            },
            None => ComputerInfo::default(),
        })
    }
}

fn convert_row(values: &[Value]) -> RawDiveRow {
    let id = values.first().and_then(value_i64);
    let tank = values.get(6).and_then(|v| embedded_json(v, id, "TankProfileData"));
    let calc = values
        .get(7)
        .and_then(|v| embedded_json(v, id, "calculated_values_from_samples"));

    let first_tank = tank
        .as_ref()
        .and_then(|t| t.get("TankData"))
        .and_then(|t| t.get(0));
    let tank_psi = |key: &str| first_tank.and_then(|t| t.get(key)).and_then(json_f64);
    // A tank with only one reading records no gas use.
    let (start_psi, end_psi) = match (tank_psi("StartPressurePSI"), tank_psi("EndPressurePSI")) {
        (Some(start), Some(end)) => (start, end),
        (start, end) => {
            if start.is_some() || end.is_some() {
                tracing::debug!(dive = ?id, "tank has a single pressure reading, recording no gas use");
            }
            (0.0, 0.0)
        }
    };
    let calc_field = |key: &str| calc.as_ref().and_then(|c| c.get(key)).and_then(json_f64);

    RawDiveRow {
        id,
        start_time: values.get(1).and_then(value_text),
        end_time: None,
        duration_sec: values.get(5).and_then(value_i64),
        location: values.get(2).and_then(value_text),
        site: values.get(3).and_then(value_text),
        max_depth_m: values.get(4).and_then(value_f64),
        avg_depth_m: Some(feet_to_meters(calc_field("AverageDepth").unwrap_or(0.0))),
        water_temp_c: calc_field("AverageTemp").map(fahrenheit_to_celsius),
        o2_percent: first_tank
            .and_then(|t| t.get("GasProfile"))
            .and_then(|g| g.get("O2Percent"))
            .and_then(json_f64),
        start_pressure_bar: Some(psi_to_bar(start_psi)),
        end_pressure_bar: Some(psi_to_bar(end_psi)),
        gf99_end: calc_field("EndGF99"),
    }
}

fn embedded_json(value: &Value, dive: Option<i64>, column: &str) -> Option<Json> {
    let text = value_text(value)?;
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&text) {
        Ok(json) => Some(json),
        Err(err) => {
            tracing::warn!(?dive, column, %err, "ignoring malformed embedded JSON");
            None
        }
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(r) => Some(r.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Real(r) => Some(r.round() as i64),
        Value::Text(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        Value::Null | Value::Blob(_) => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(r) => Some(*r),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Null | Value::Blob(_) => None,
    }
}

fn json_f64(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationAliases;
    use crate::error::InvalidDiveData;
    use crate::import::ingest;
    use crate::models::DiveId;

    fn fixture(path: &Path, with_computer: bool) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE dive_details (DiveId TEXT, DiveNumber INTEGER, DiveDate TEXT, \
                Location TEXT, Site TEXT, Depth REAL, DiveLengthTime INTEGER, TankProfileData TEXT);
             CREATE TABLE log_data (log_id TEXT, calculated_values_from_samples TEXT);",
        )
        .unwrap();
        if with_computer {
            conn.execute_batch(
                "CREATE TABLE StoredDiveComputer (SerialNumber TEXT, Firmware TEXT);
                 INSERT INTO StoredDiveComputer VALUES ('A1B2C3', '92');",
            )
            .unwrap();
        }
        let tank = r#"{"TankData":[{"StartPressurePSI":"3000","EndPressurePSI":1000,"GasProfile":{"O2Percent":32}}]}"#;
        let calc = r#"{"AverageTemp":82,"AverageDepth":45,"EndGF99":63}"#;
        conn.execute(
            "INSERT INTO dive_details VALUES ('d1', 1, '2024-03-15 09:00:00', 'Curaco', 'Tugboat', 24.5, 3000, ?1)",
            [tank],
        )
        .unwrap();
        conn.execute("INSERT INTO log_data VALUES ('d1', ?1)", [calc]).unwrap();
        conn.execute(
            "INSERT INTO dive_details VALUES ('d2', 2, '2024-03-15 13:00:00', '', 'Shore', 12.0, 2400, NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO dive_details VALUES ('d3', 3, '2024-03-16 09:00:00', 'Bonaire', 'Pier', 18.0, 0, NULL)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_read_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.db");
        fixture(&path, true);

        let db = ShearwaterDb::open(&path).unwrap();
        let report = ingest(&db, &LocationAliases::default()).unwrap();

        assert_eq!(report.rows_read, 3);
        assert_eq!(report.dives.len(), 2);
        assert!(matches!(
            report.skipped[0],
            InvalidDiveData::NonPositiveDuration { .. }
        ));
        assert_eq!(report.computer.serial, "A1B2C3");
        assert_eq!(report.computer.firmware, "92");

        let first = &report.dives[0];
        assert_eq!(first.id, DiveId(1));
        assert_eq!(first.location_name, "Curacao");
        assert_eq!(first.site_name, "Tugboat");
        assert_eq!(first.max_depth_m, 24.5);
        assert!((first.avg_depth_m - 13.716).abs() < 1e-3);
        assert!((first.start_pressure_bar - 206.843).abs() < 1e-3);
        assert!((first.end_pressure_bar - 68.948).abs() < 1e-3);
        assert_eq!(first.o2_percent, 32.0);
        assert!((first.water_temp_c.unwrap() - 27.778).abs() < 1e-3);
        assert_eq!(first.gf99_end, Some(63.0));

        let second = &report.dives[1];
        assert_eq!(second.location_name, "Unknown");
        assert_eq!(second.start_pressure_bar, 0.0);
        assert_eq!(second.avg_depth_m, 0.0);
        assert_eq!(second.o2_percent, 21.0);
        assert!(second.water_temp_c.is_none());
    }

    #[test]
    fn test_missing_computer_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.db");
        fixture(&path, false);

        let db = ShearwaterDb::open(&path).unwrap();
        let info = db.computer_info().unwrap();
        assert_eq!(info, ComputerInfo::default());
        assert!(!info.is_known());
    }

    #[test]
    fn test_schema_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let db = ShearwaterDb::from_connection(conn);
        assert!(matches!(
            db.verify_schema(),
            Err(ImportError::MissingTable(t)) if t == "dive_details"
        ));

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE dive_details (DiveId TEXT, DiveNumber INTEGER, DiveDate TEXT, \
                Location TEXT, Site TEXT, DiveLengthTime INTEGER, TankProfileData TEXT);
             CREATE TABLE log_data (log_id TEXT, calculated_values_from_samples TEXT);",
        )
        .unwrap();
        let db = ShearwaterDb::from_connection(conn);
        let err = ingest(&db, &LocationAliases::default()).unwrap_err();
        assert!(matches!(
            err,
            ImportError::MissingColumn { ref column, .. } if column == "Depth"
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.db");
        assert!(matches!(
            ShearwaterDb::open(&path),
            Err(ImportError::SourceNotFound(p)) if p == path
        ));
    }

    #[test]
    fn test_single_tank_reading_records_no_gas_use() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE dive_details (DiveId TEXT, DiveNumber INTEGER, DiveDate TEXT,
                Location TEXT, Site TEXT, Depth REAL, DiveLengthTime INTEGER, TankProfileData TEXT);
             CREATE TABLE log_data (log_id TEXT, calculated_values_from_samples TEXT);
             INSERT INTO dive_details VALUES ('a', 1, '2024-01-02 10:00:00', 'Cozumel', '', 20.0, 1800,
                '{"TankData":[{"StartPressurePSI":3000}]}');
             INSERT INTO dive_details VALUES ('b', 2, '2024-01-02 13:00:00', 'Cozumel', '', 18.0, 1800,
                '{"TankData":[{"EndPressurePSI":700}]}');"#,
        )
        .unwrap();
        let db = ShearwaterDb::from_connection(conn);
        let report = ingest(&db, &LocationAliases::default()).unwrap();

        assert_eq!(report.dives.len(), 2);
        for dive in &report.dives {
            assert_eq!(dive.start_pressure_bar, 0.0);
            assert_eq!(dive.end_pressure_bar, 0.0);
            assert_eq!(dive.gas_used_bar(), 0.0);
        }
    }

    #[test]
    fn test_malformed_embedded_json_is_ignored() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE dive_details (DiveId TEXT, DiveNumber INTEGER, DiveDate TEXT, \
                Location TEXT, Site TEXT, Depth REAL, DiveLengthTime INTEGER, TankProfileData TEXT);
             CREATE TABLE log_data (log_id TEXT, calculated_values_from_samples TEXT);
             INSERT INTO dive_details VALUES ('x', 9, '2024-01-02 10:00:00', 'Cozumel', '', 20.0, 1800, '{broken');",
        )
        .unwrap();
        let db = ShearwaterDb::from_connection(conn);
        let rows = db.dive_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].start_pressure_bar, Some(0.0));
        assert_eq!(rows[0].o2_percent, None);
    }
}
