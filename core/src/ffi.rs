//! Foreign-function surface for the GUI shell.
//!
//! Everything crossing the boundary is a flat record in display units, with
//! timestamps as `YYYY-MM-DD HH:MM:SS` local wall-clock strings.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;

use crate::aggregate::{DepthClass, DiveStats, GlobalStats, TripStats};
use crate::config::CoreConfig;
use crate::error::{CoreError, StoreError};
use crate::import::{ImportReport, MemorySource};
use crate::models::{DiveId, DiveRecord, PhotoAsset};
use crate::photo::{slideshow_file_name, SlideshowEntry, SlideshowFormat};
use crate::profile::{ProfilePoint, SynthesizedProfile};
use crate::project::ProjectState;
use crate::store::{DiveQuery, DiveSortField, SortDirection};
use crate::timestamp::parse_timestamp;
use crate::units::{from_display_depth, to_display_depth, to_display_pressure, DepthUnit, PressureUnit, UnitPrefs};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_time(t: NaiveDateTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct DiveRow {
    pub id: i64,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    pub site: String,
    pub max_depth: f64,
    pub avg_depth: f64,
    pub duration_min: f64,
    pub water_temp: Option<f64>,
    pub o2_percent: f64,
    pub start_pressure: f64,
    pub end_pressure: f64,
    pub gas_used: f64,
    /// Pressure units per minute.
    pub consumption_rate: f64,
    pub gf99_end: Option<f64>,
    pub depth_class: DepthClass,
}

impl DiveRow {
    fn from_record(dive: &DiveRecord, units: &UnitPrefs) -> Self {
        let stats = DiveStats::compute(dive);
        Self {
            id: dive.id.0,
            start_time: format_time(dive.start_time()),
            end_time: format_time(dive.end_time()),
            location: dive.location_name.clone(),
            site: dive.site_name.clone(),
            max_depth: units.depth(dive.max_depth_m),
            avg_depth: units.depth(dive.avg_depth_m),
            duration_min: stats.duration_min,
            water_temp: dive.water_temp_c.map(|c| units.temperature(c)),
            o2_percent: dive.o2_percent,
            start_pressure: units.pressure(dive.start_pressure_bar),
            end_pressure: units.pressure(dive.end_pressure_bar),
            gas_used: units.pressure(stats.gas_used_bar),
            consumption_rate: units.rate(stats.consumption_bar_min),
            gf99_end: dive.gf99_end,
            depth_class: stats.depth_class,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct DiveFilter {
    pub location: Option<String>,
    /// Display depth units.
    pub min_depth: Option<f64>,
    pub max_depth: Option<f64>,
    pub sort_by: DiveSortField,
    pub direction: SortDirection,
}

impl DiveFilter {
    fn to_query(&self, unit: DepthUnit) -> DiveQuery {
        DiveQuery {
            location: self.location.clone(),
            min_depth_m: self.min_depth.map(|d| from_display_depth(d, unit)),
            max_depth_m: self.max_depth.map(|d| from_display_depth(d, unit)),
            sort_by: self.sort_by,
            direction: self.direction,
            ..DiveQuery::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct TripSummary {
    pub location: String,
    pub dive_count: u32,
    pub total_hours: f64,
    pub max_depth: f64,
    pub avg_gas_used: f64,
    pub avg_consumption_rate: f64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub has_imported_data: bool,
    pub photo_count: u32,
}

impl TripSummary {
    fn from_stats(stats: &TripStats, units: &UnitPrefs) -> Self {
        Self {
            location: stats.location_name.clone(),
            dive_count: stats.dive_count,
            total_hours: stats.total_hours,
            max_depth: units.depth(stats.max_depth_m),
            avg_gas_used: units.pressure(stats.avg_gas_used_bar),
            avg_consumption_rate: units.rate(stats.avg_consumption_bar_min),
            start_date: stats.start_date.map(|d| d.to_string()),
            end_date: stats.end_date.map(|d| d.to_string()),
            has_imported_data: stats.has_imported_data,
            photo_count: stats.photo_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct GlobalSummary {
    pub dive_count: u32,
    pub trip_count: u32,
    pub total_hours: f64,
    pub max_depth: f64,
    pub avg_gas_used: f64,
    pub avg_consumption_rate: f64,
    pub primary_gas: String,
    pub computer_serial: String,
    pub computer_firmware: String,
}

impl GlobalSummary {
    fn from_stats(stats: &GlobalStats, state: &ProjectState) -> Self {
        let units = state.units();
        Self {
            dive_count: stats.dive_count,
            trip_count: stats.trip_count,
            total_hours: stats.total_hours,
            max_depth: units.depth(stats.max_depth_m),
            avg_gas_used: units.pressure(stats.avg_gas_used_bar),
            avg_consumption_rate: units.rate(stats.avg_consumption_bar_min),
            primary_gas: stats.primary_gas.clone(),
            computer_serial: state.computer().serial.clone(),
            computer_firmware: state.computer().firmware.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct ChartPoint {
    pub elapsed_sec: i64,
    pub value: f64,
}

impl From<ProfilePoint> for ChartPoint {
    fn from(p: ProfilePoint) -> Self {
        Self {
            elapsed_sec: p.elapsed_sec,
            value: p.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct PhotoRow {
    pub path: String,
    pub capture_time: String,
    pub keep: bool,
    pub caption: Option<String>,
    pub assigned_dive: Option<i64>,
    pub file_missing: bool,
}

impl From<&PhotoAsset> for PhotoRow {
    fn from(photo: &PhotoAsset) -> Self {
        Self {
            path: photo.file_path.display().to_string(),
            capture_time: format_time(photo.capture_time),
            keep: photo.keep,
            caption: photo.caption.clone(),
            assigned_dive: photo.assigned_dive.map(|id| id.0),
            file_missing: photo.file_missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct SlideshowItem {
    pub path: String,
    pub caption: Option<String>,
}

impl From<SlideshowEntry> for SlideshowItem {
    fn from(entry: SlideshowEntry) -> Self {
        Self {
            path: entry.file_path.display().to_string(),
            caption: entry.caption,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct ImportSummary {
    pub accepted: u32,
    pub rows_read: u32,
    /// One message per skipped row.
    pub skipped: Vec<String>,
    pub computer_serial: String,
}

impl From<&ImportReport> for ImportSummary {
    fn from(report: &ImportReport) -> Self {
        Self {
            accepted: report.dives.len() as u32,
            rows_read: report.rows_read as u32,
            skipped: report.skipped.iter().map(|e| e.to_string()).collect(),
            computer_serial: report.computer.serial.clone(),
        }
    }
}

#[derive(uniffi::Object)]
pub struct DiveStudio {
    state: Mutex<ProjectState>,
}

impl DiveStudio {
    fn state(&self) -> MutexGuard<'_, ProjectState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn profile_points(
        &self,
        dive_id: i64,
        points: impl Fn(&SynthesizedProfile, &UnitPrefs) -> Vec<ChartPoint>,
    ) -> Result<Vec<ChartPoint>, CoreError> {
        let state = self.state();
        let profile = state.profile(DiveId(dive_id))?;
        Ok(points(&profile, &state.units()))
    }
}

fn load_config(config_path: Option<String>) -> Result<CoreConfig, CoreError> {
    match config_path {
        Some(path) => Ok(CoreConfig::load(Path::new(&path))?),
        None => Ok(CoreConfig::default()),
    }
}

#[uniffi::export]
impl DiveStudio {
    #[uniffi::constructor]
    pub fn new(config_path: Option<String>) -> Result<Arc<Self>, CoreError> {
        let config = load_config(config_path)?;
        Ok(Arc::new(Self {
            state: Mutex::new(ProjectState::new(config)),
        }))
    }

    /// Open a saved project. Missing photo files are flagged on the photo rows.
    #[uniffi::constructor]
    pub fn open_project(path: String, config_path: Option<String>) -> Result<Arc<Self>, CoreError> {
        let config = load_config(config_path)?;
        let (state, _missing) = ProjectState::open(Path::new(&path), config)?;
        Ok(Arc::new(Self {
            state: Mutex::new(state),
        }))
    }

    pub fn import_database(&self, path: String) -> Result<ImportSummary, CoreError> {
        let report = self.state().import_from_path(Path::new(&path))?;
        Ok(ImportSummary::from(&report))
    }

    /// Import rows the host has already decoded, as `{ "rows": [...] }` JSON.
    pub fn import_rows_json(&self, json: String) -> Result<ImportSummary, CoreError> {
        let source = MemorySource::from_json(&json)?;
        let report = self.state().import(&source)?;
        Ok(ImportSummary::from(&report))
    }

    pub fn list_dives(&self, filter: DiveFilter) -> Vec<DiveRow> {
        let state = self.state();
        let units = state.units();
        state
            .list_dives(&filter.to_query(units.depth))
            .into_iter()
            .map(|d| DiveRow::from_record(d, &units))
            .collect()
    }

    pub fn trip_summaries(&self) -> Vec<TripSummary> {
        let state = self.state();
        let units = state.units();
        state
            .trip_report()
            .trips
            .iter()
            .map(|t| TripSummary::from_stats(t, &units))
            .collect()
    }

    pub fn global_summary(&self) -> GlobalSummary {
        let state = self.state();
        let report = state.trip_report();
        GlobalSummary::from_stats(&report.global, &state)
    }

    pub fn depth_profile(&self, dive_id: i64) -> Result<Vec<ChartPoint>, CoreError> {
        self.profile_points(dive_id, |profile, units| {
            profile
                .depth_points()
                .map(|p| p.map_value(|m| units.depth(m)).into())
                .collect()
        })
    }

    pub fn pressure_profile(&self, dive_id: i64) -> Result<Vec<ChartPoint>, CoreError> {
        self.profile_points(dive_id, |profile, units| {
            profile
                .pressure_points()
                .map(|p| p.map_value(|bar| units.pressure(bar)).into())
                .collect()
        })
    }

    /// Returns false when the path was already managed.
    pub fn add_photo(
        &self,
        trip: String,
        path: String,
        exif_timestamp: String,
        keep: bool,
    ) -> Result<bool, CoreError> {
        let photo = PhotoAsset::from_exif(path, &exif_timestamp, keep)?;
        let added = self.state().add_photos(&trip, vec![photo])?;
        Ok(added > 0)
    }

    pub fn remove_photo(&self, path: String) -> Result<(), CoreError> {
        self.state().remove_photo(Path::new(&path))?;
        Ok(())
    }

    pub fn set_caption(&self, path: String, caption: Option<String>) -> Result<(), CoreError> {
        self.state().set_photo_caption(Path::new(&path), caption)?;
        Ok(())
    }

    pub fn set_keep(&self, path: String, keep: bool) -> Result<(), CoreError> {
        self.state().set_photo_keep(Path::new(&path), keep)?;
        Ok(())
    }

    pub fn photos_for_dive(&self, dive_id: i64) -> Vec<PhotoRow> {
        self.state()
            .photos_for_dive(DiveId(dive_id))
            .into_iter()
            .map(PhotoRow::from)
            .collect()
    }

    pub fn trip_photos(&self, trip: String) -> Result<Vec<PhotoRow>, CoreError> {
        let state = self.state();
        let trip = state
            .store()
            .trip(&trip)
            .ok_or_else(|| StoreError::UnknownTrip(trip.clone()))?;
        Ok(trip.photos.iter().map(PhotoRow::from).collect())
    }

    pub fn trip_slideshow(&self, trip: String) -> Result<Vec<SlideshowItem>, CoreError> {
        let entries = self.state().trip_slideshow(&trip)?;
        Ok(entries.into_iter().map(SlideshowItem::from).collect())
    }

    pub fn dive_slideshow(&self, dive_id: i64) -> Result<Vec<SlideshowItem>, CoreError> {
        let entries = self.state().dive_slideshow(DiveId(dive_id))?;
        Ok(entries.into_iter().map(SlideshowItem::from).collect())
    }

    /// Create an empty trip for photos. Dates are `YYYY-MM-DD`.
    pub fn create_trip(&self, name: String, start_date: String, end_date: String) -> Result<(), CoreError> {
        let start = parse_timestamp(&start_date)?.date();
        let end = parse_timestamp(&end_date)?.date();
        self.state().create_trip(&name, start, end)?;
        Ok(())
    }

    pub fn rename_trip(&self, old_name: String, new_name: String) -> Result<(), CoreError> {
        self.state().rename_trip(&old_name, &new_name)?;
        Ok(())
    }

    pub fn delete_trip(&self, name: String) -> Result<(), CoreError> {
        self.state().delete_trip(&name)?;
        Ok(())
    }

    pub fn set_site_name(&self, dive_id: i64, site: String) -> Result<(), CoreError> {
        self.state().set_site_name(DiveId(dive_id), &site)?;
        Ok(())
    }

    pub fn set_dive_location(&self, dive_id: i64, location: String) -> Result<(), CoreError> {
        self.state().set_dive_location(DiveId(dive_id), &location)?;
        Ok(())
    }

    pub fn units(&self) -> UnitPrefs {
        self.state().units()
    }

    pub fn set_units(&self, units: UnitPrefs) {
        self.state().set_units(units);
    }

    pub fn set_background(&self, image_bytes: Vec<u8>) -> Result<(), CoreError> {
        self.state().set_background_image(&image_bytes)?;
        Ok(())
    }

    pub fn background_data_uri(&self) -> Option<String> {
        self.state().background().map(|b| b.data_uri())
    }

    pub fn save_project(&self, path: String) -> Result<(), CoreError> {
        self.state().save_to_path(Path::new(&path))?;
        Ok(())
    }

    /// Replace the open project. Returns one message per missing photo file.
    pub fn load_project(&self, path: String) -> Result<Vec<String>, CoreError> {
        let missing = self.state().load_from_path(Path::new(&path))?;
        Ok(missing.iter().map(|e| e.to_string()).collect())
    }

    /// Re-check photo files on disk, returning the paths that are missing.
    pub fn missing_photos(&self) -> Vec<String> {
        self.state()
            .check_photos()
            .into_iter()
            .map(|e| e.path.display().to_string())
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.state().is_dirty()
    }
}

#[uniffi::export]
pub fn display_depth(meters: f64, unit: DepthUnit) -> f64 {
    to_display_depth(meters, unit)
}

#[uniffi::export]
pub fn display_pressure(bar: f64, unit: PressureUnit) -> f64 {
    to_display_pressure(bar, unit)
}

#[uniffi::export]
pub fn slideshow_name(trip: String, site: Option<String>, format: SlideshowFormat) -> String {
    slideshow_file_name(&trip, site.as_deref(), format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::FEET_PER_METER;

    const ROWS: &str = r#"{
        "rows": [
            {"id": 1, "startTime": "2024-03-15 08:00:00", "durationSec": 3000, "location": "Bonaire",
             "site": "Salt Pier", "maxDepthM": 20.0, "avgDepthM": 12.0,
             "startPressureBar": 210, "endPressureBar": 60},
            {"id": 2, "startTime": "2024-03-15 11:00:00", "durationSec": 2400, "location": "Bonaire",
             "site": "Karpata", "maxDepthM": 30.0, "avgDepthM": 15.0,
             "startPressureBar": 200, "endPressureBar": 70},
            {"id": 3, "startTime": "2024-03-15 15:00:00", "durationSec": 0, "location": "Bonaire",
             "maxDepthM": 10.0, "avgDepthM": 5.0, "startPressureBar": 200, "endPressureBar": 70}
        ],
        "computer": {"serial": "ABC123", "firmware": "81"}
    }"#;

    fn studio() -> Arc<DiveStudio> {
        let studio = DiveStudio::new(None).unwrap();
        studio.import_rows_json(ROWS.to_string()).unwrap();
        studio
    }

    fn all_dives() -> DiveFilter {
        DiveFilter {
            location: None,
            min_depth: None,
            max_depth: None,
            sort_by: DiveSortField::Id,
            direction: SortDirection::Ascending,
        }
    }

    #[test]
    fn test_import_summary() {
        let studio = DiveStudio::new(None).unwrap();
        let summary = studio.import_rows_json(ROWS.to_string()).unwrap();
        assert_eq!(summary.accepted, 2);
        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.skipped.len(), 1);
        assert_eq!(summary.computer_serial, "ABC123");
        assert!(studio.is_dirty());
    }

    #[test]
    fn test_rows_follow_units() {
        let studio = studio();
        let rows = studio.list_dives(all_dives());
        assert_eq!(rows[0].max_depth, 20.0);
        // Default pressure unit is PSI.
        assert!((rows[0].start_pressure - 210.0 * 14.5038).abs() < 1e-6);
        assert_eq!(rows[0].start_time, "2024-03-15 08:00:00");
        assert_eq!(rows[0].end_time, "2024-03-15 08:50:00");

        studio.set_units(UnitPrefs::new(DepthUnit::Imperial, PressureUnit::Bar));
        let rows = studio.list_dives(all_dives());
        assert!((rows[0].max_depth - 20.0 * FEET_PER_METER).abs() < 1e-9);
        assert_eq!(rows[0].gas_used, 150.0);
        assert!((rows[0].consumption_rate - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_filter_in_display_units() {
        let studio = studio();
        studio.set_units(UnitPrefs::new(DepthUnit::Imperial, PressureUnit::Bar));
        let filter = DiveFilter {
            min_depth: Some(80.0),
            sort_by: DiveSortField::MaxDepth,
            direction: SortDirection::Descending,
            ..all_dives()
        };
        let rows = studio.list_dives(filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 2);
    }

    #[test]
    fn test_profiles() {
        let studio = studio();
        let depth = studio.depth_profile(1).unwrap();
        assert_eq!(depth.first().map(|p| (p.elapsed_sec, p.value)), Some((0, 0.0)));
        assert_eq!(depth.last().map(|p| (p.elapsed_sec, p.value)), Some((3000, 0.0)));

        studio.set_units(UnitPrefs::new(DepthUnit::Metric, PressureUnit::Bar));
        let pressure = studio.pressure_profile(1).unwrap();
        assert_eq!(pressure.first().map(|p| p.value), Some(210.0));
        assert_eq!(pressure.last().map(|p| p.value), Some(60.0));

        assert!(studio.depth_profile(42).is_err());
    }

    #[test]
    fn test_photos_and_slideshows() {
        let studio = studio();
        assert!(studio
            .add_photo("Bonaire".into(), "/p/a.jpg".into(), "2024:03:15 08:20:00".into(), true)
            .unwrap());
        assert!(!studio
            .add_photo("Bonaire".into(), "/p/a.jpg".into(), "2024:03:15 08:20:00".into(), true)
            .unwrap());
        studio
            .add_photo("Bonaire".into(), "/p/b.jpg".into(), "2024:03:15 08:10:00".into(), false)
            .unwrap();
        studio
            .set_caption("/p/a.jpg".into(), Some("Seahorse".into()))
            .unwrap();

        let photos = studio.photos_for_dive(1);
        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0].path, "/p/b.jpg");
        assert_eq!(photos[1].assigned_dive, Some(1));

        let show = studio.dive_slideshow(1).unwrap();
        assert_eq!(show.len(), 1);
        assert_eq!(show[0].caption.as_deref(), Some("Seahorse"));
        assert_eq!(studio.trip_photos("Bonaire".into()).unwrap().len(), 2);

        assert!(studio
            .add_photo("Bonaire".into(), "/p/c.jpg".into(), "whenever".into(), true)
            .is_err());
    }

    #[test]
    fn test_trip_edits_and_summaries() {
        let studio = studio();
        studio
            .create_trip("Roatan".into(), "2024-06-01".into(), "2024-06-08".into())
            .unwrap();
        assert_eq!(studio.trip_summaries().len(), 2);

        studio.rename_trip("Roatan".into(), "Bonaire".into()).unwrap();
        let trips = studio.trip_summaries();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].dive_count, 2);
        assert_eq!(trips[0].end_date.as_deref(), Some("2024-06-08"));

        let global = studio.global_summary();
        assert_eq!(global.dive_count, 2);
        assert_eq!(global.computer_serial, "ABC123");
        assert_eq!(global.primary_gas, "Air");
    }

    #[test]
    fn test_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trip.json").display().to_string();

        let studio = studio();
        studio
            .add_photo("Bonaire".into(), "/gone/a.jpg".into(), "2024:03:15 08:20:00".into(), true)
            .unwrap();
        studio.save_project(path.clone()).unwrap();
        assert!(!studio.is_dirty());

        let reopened = DiveStudio::open_project(path.clone(), None).unwrap();
        assert_eq!(reopened.list_dives(all_dives()).len(), 2);
        assert!(reopened.photos_for_dive(1)[0].file_missing);
        assert_eq!(reopened.missing_photos(), vec!["/gone/a.jpg".to_string()]);

        let fresh = DiveStudio::new(None).unwrap();
        let missing = fresh.load_project(path).unwrap();
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_free_functions() {
        assert!((display_depth(10.0, DepthUnit::Imperial) - 32.8084).abs() < 1e-9);
        assert_eq!(display_pressure(10.0, PressureUnit::Bar), 10.0);
        assert_eq!(
            slideshow_name("Bonaire".into(), Some("Salt Pier".into()), SlideshowFormat::Html),
            "Bonaire_Salt_Pier_slideshow.html"
        );
    }
}
