//! Project state and its JSON file format.
//!
//! `ProjectState` owns the store plus everything else that is saved:
//! computer info, unit preferences and the optional background image. Every
//! mutation recomputes photo assignments and marks the project dirty.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::aggregate::{DiveStats, TripReport};
use crate::config::{BackgroundSettings, CoreConfig};
use crate::conversion::ConversionOutcome;
use crate::correlate::correlate_photos;
use crate::error::{CoreError, ImportError, PersistenceError, PhotoAccessError, StoreError};
use crate::import::{ingest, ImportReport, ImportSource, ShearwaterDb};
use crate::models::{ComputerInfo, DiveId, DiveRecord, PhotoAsset, Trip};
use crate::photo::{check_availability, dive_slideshow, trip_slideshow, SlideshowEntry};
use crate::profile::SynthesizedProfile;
use crate::store::{DiveQuery, DiveRecordStore, RenameOutcome};
use crate::units::UnitPrefs;

/// Newest project file layout this build reads and the one it writes.
pub const SCHEMA_VERSION: u32 = 1;

/// The background image, re-encoded as JPEG at the canonical size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundImage {
    pub media_type: String,
    pub width: u32,
    pub height: u32,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl BackgroundImage {
    /// Decode any supported image, crop-resize it to the canonical size and
    /// re-encode it as JPEG.
    pub fn from_image_bytes(bytes: &[u8], settings: &BackgroundSettings) -> Result<Self, PersistenceError> {
        let img = image::load_from_memory(bytes)?;
        let resized = img.resize_to_fill(settings.width, settings.height, FilterType::Lanczos3);
        let rgb = resized.to_rgb8();

        let mut buffer = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, settings.quality);
        encoder.encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )?;

        Ok(Self {
            media_type: "image/jpeg".to_string(),
            width: rgb.width(),
            height: rgb.height(),
            data: buffer.into_inner(),
        })
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, BASE64.encode(&self.data))
    }

    fn validate(&self) -> Result<(), PersistenceError> {
        if self.data.is_empty() {
            return Err(PersistenceError::Background("empty image data".to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(PersistenceError::Background(format!(
                "invalid size {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text.as_bytes()).map_err(de::Error::custom)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFileRef<'a> {
    schema_version: u32,
    computer_info: &'a ComputerInfo,
    units: UnitPrefs,
    dives: Vec<&'a DiveRecord>,
    trips: Vec<&'a Trip>,
    background: Option<&'a BackgroundImage>,
    saved_at: NaiveDateTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFile {
    #[serde(default)]
    computer_info: ComputerInfo,
    #[serde(default)]
    units: UnitPrefs,
    #[serde(default)]
    dives: Vec<DiveRecord>,
    #[serde(default)]
    trips: Vec<Trip>,
    #[serde(default)]
    background: Option<BackgroundImage>,
}

/// Read before the full document so newer files fail with a clear error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    schema_version: u32,
}

#[derive(Debug, Clone)]
pub struct ProjectState {
    store: DiveRecordStore,
    computer: ComputerInfo,
    units: UnitPrefs,
    background: Option<BackgroundImage>,
    dirty: bool,
    config: CoreConfig,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl ProjectState {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            store: DiveRecordStore::new(),
            computer: ComputerInfo::default(),
            units: config.default_units,
            background: None,
            dirty: false,
            config,
        }
    }

    pub fn store(&self) -> &DiveRecordStore {
        &self.store
    }

    pub fn computer(&self) -> &ComputerInfo {
        &self.computer
    }

    pub fn units(&self) -> UnitPrefs {
        self.units
    }

    pub fn background(&self) -> Option<&BackgroundImage> {
        self.background.as_ref()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn touch(&mut self) {
        correlate_photos(&mut self.store);
        self.dirty = true;
    }

    /// Ingest `source` and commit the accepted dives. Dives already in the
    /// project are reported as skipped.
    pub fn import<S: ImportSource + ?Sized>(&mut self, source: &S) -> Result<ImportReport, ImportError> {
        let mut report = ingest(source, &self.config.location_aliases)?;
        report.reject_existing(|id| self.store.contains_dive(id));
        self.store.add_dives(report.dives.clone())?;
        if report.computer.is_known() || !self.computer.is_known() {
            self.computer = report.computer.clone();
        }
        self.touch();
        tracing::info!(summary = %report.summary(), "import committed");
        Ok(report)
    }

    pub fn import_from_path(&mut self, path: &Path) -> Result<ImportReport, ImportError> {
        let db = ShearwaterDb::open(path)?;
        self.import(&db)
    }

    pub fn remove_dive(&mut self, id: DiveId) -> Result<DiveRecord, StoreError> {
        let dive = self.store.remove_dive(id)?;
        self.touch();
        Ok(dive)
    }

    pub fn set_site_name(&mut self, id: DiveId, site: &str) -> Result<(), StoreError> {
        self.store.set_site_name(id, site)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_dive_location(&mut self, id: DiveId, location: &str) -> Result<(), StoreError> {
        self.store.set_dive_location(id, location)?;
        self.touch();
        Ok(())
    }

    pub fn create_trip(
        &mut self,
        name: &str,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    ) -> Result<(), StoreError> {
        self.store.create_trip(name, start, end)?;
        self.touch();
        Ok(())
    }

    pub fn rename_trip(&mut self, old_name: &str, new_name: &str) -> Result<RenameOutcome, StoreError> {
        let outcome = self.store.rename_trip(old_name, new_name)?;
        self.touch();
        Ok(outcome)
    }

    pub fn delete_trip(&mut self, name: &str) -> Result<Trip, StoreError> {
        let trip = self.store.delete_trip(name)?;
        self.touch();
        Ok(trip)
    }

    pub fn add_photos(&mut self, trip: &str, photos: Vec<PhotoAsset>) -> Result<usize, StoreError> {
        let added = self.store.add_photos(trip, photos)?;
        self.touch();
        Ok(added)
    }

    pub fn remove_photo(&mut self, path: &Path) -> Result<PhotoAsset, StoreError> {
        let photo = self.store.remove_photo(path)?;
        self.touch();
        Ok(photo)
    }

    pub fn set_photo_keep(&mut self, path: &Path, keep: bool) -> Result<(), StoreError> {
        self.store.set_photo_keep(path, keep)?;
        self.dirty = true;
        Ok(())
    }

    pub fn set_photo_caption(&mut self, path: &Path, caption: Option<String>) -> Result<(), StoreError> {
        self.store.set_photo_caption(path, caption)?;
        self.dirty = true;
        Ok(())
    }

    /// Add the successfully converted files of a RAW batch to a trip.
    pub fn apply_conversions(
        &mut self,
        trip: &str,
        outcomes: Vec<ConversionOutcome>,
    ) -> Result<usize, StoreError> {
        let photos = outcomes
            .into_iter()
            .filter_map(ConversionOutcome::into_photo)
            .collect();
        self.add_photos(trip, photos)
    }

    /// Switch display units. Stored values are untouched.
    pub fn set_units(&mut self, units: UnitPrefs) {
        if units != self.units {
            self.units = units;
            self.dirty = true;
        }
    }

    pub fn set_background_image(&mut self, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.background = Some(BackgroundImage::from_image_bytes(bytes, &self.config.background)?);
        self.dirty = true;
        Ok(())
    }

    pub fn clear_background(&mut self) {
        if self.background.take().is_some() {
            self.dirty = true;
        }
    }

    /// Re-check photo files on disk. Does not mark the project dirty.
    pub fn check_photos(&mut self) -> Vec<PhotoAccessError> {
        check_availability(&mut self.store)
    }

    pub fn list_dives(&self, query: &DiveQuery) -> Vec<&DiveRecord> {
        self.store.list_dives(query)
    }

    pub fn trip_report(&self) -> TripReport {
        TripReport::compute(&self.store)
    }

    pub fn dive_stats(&self, id: DiveId) -> Option<DiveStats> {
        self.store.dive(id).map(DiveStats::compute)
    }

    pub fn profile(&self, id: DiveId) -> Result<SynthesizedProfile, CoreError> {
        let dive = self.store.dive(id).ok_or(StoreError::UnknownDive(id))?;
        Ok(SynthesizedProfile::synthesize(dive, &self.config.profile)?)
    }

    pub fn photos_for_dive(&self, id: DiveId) -> Vec<&PhotoAsset> {
        self.store.photos_for_dive(id)
    }

    pub fn trip_slideshow(&self, trip: &str) -> Result<Vec<SlideshowEntry>, StoreError> {
        trip_slideshow(&self.store, trip)
    }

    pub fn dive_slideshow(&self, id: DiveId) -> Result<Vec<SlideshowEntry>, StoreError> {
        dive_slideshow(&self.store, id)
    }

    pub fn serialize(&self) -> Result<String, PersistenceError> {
        let file = ProjectFileRef {
            schema_version: SCHEMA_VERSION,
            computer_info: &self.computer,
            units: self.units,
            dives: self.store.dives().collect(),
            trips: self.store.trips().collect(),
            background: self.background.as_ref(),
            saved_at: chrono::Local::now().naive_local(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Rebuild a project from its JSON text. Returns the photos whose files
    /// could not be found alongside the state.
    pub fn restore(
        text: &str,
        config: CoreConfig,
    ) -> Result<(Self, Vec<PhotoAccessError>), PersistenceError> {
        let probe: VersionProbe = serde_json::from_str(text)?;
        if probe.schema_version > SCHEMA_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: probe.schema_version,
                supported: SCHEMA_VERSION,
            });
        }

        let file: ProjectFile = serde_json::from_str(text)?;
        for dive in &file.dives {
            if dive.duration_sec() <= 0 {
                return Err(PersistenceError::Inconsistent(format!(
                    "dive {} has a non-positive duration",
                    dive.id
                )));
            }
        }
        if let Some(background) = &file.background {
            background.validate()?;
        }
        let store = DiveRecordStore::from_parts(file.dives, file.trips)
            .map_err(|e| PersistenceError::Inconsistent(e.to_string()))?;

        let mut state = Self {
            store,
            computer: file.computer_info,
            units: file.units,
            background: file.background,
            dirty: false,
            config,
        };
        correlate_photos(&mut state.store);
        let missing = check_availability(&mut state.store);
        tracing::info!(
            dives = state.store.dive_count(),
            trips = state.store.trip_count(),
            missing_photos = missing.len(),
            "project restored"
        );
        Ok((state, missing))
    }

    /// Replace this project with the one in `text`. On error nothing changes.
    pub fn load_from_str(&mut self, text: &str) -> Result<Vec<PhotoAccessError>, PersistenceError> {
        let (state, missing) = Self::restore(text, self.config.clone())?;
        *self = state;
        Ok(missing)
    }

    pub fn open(path: &Path, config: CoreConfig) -> Result<(Self, Vec<PhotoAccessError>), PersistenceError> {
        let text = fs::read_to_string(path)?;
        Self::restore(&text, config)
    }

    pub fn load_from_path(&mut self, path: &Path) -> Result<Vec<PhotoAccessError>, PersistenceError> {
        let text = fs::read_to_string(path)?;
        self.load_from_str(&text)
    }

    pub fn save_to_path(&mut self, path: &Path) -> Result<(), PersistenceError> {
        let text = self.serialize()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, text)?;
        self.dirty = false;
        tracing::info!(path = %path.display(), dives = self.store.dive_count(), "project saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::MemorySource;
    use crate::units::{DepthUnit, PressureUnit};
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .unwrap()
    }

    fn small_config() -> CoreConfig {
        let mut config = CoreConfig::default();
        config.background = BackgroundSettings {
            width: 32,
            height: 18,
            quality: 80,
        };
        config
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 4) as u8, 128])
        });
        let mut buffer = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    fn imported() -> ProjectState {
        let mut state = ProjectState::new(small_config());
        state.import(&MemorySource::with_sample_data()).unwrap();
        state
    }

    #[test]
    fn test_import_commits_and_aggregates() {
        let state = imported();
        assert!(state.is_dirty());
        assert_eq!(state.store().dive_count(), 3);
        assert_eq!(state.computer().serial, "PERDIX-0001");

        let report = state.trip_report();
        let bonaire = report.trip("Bonaire").unwrap();
        assert_eq!(bonaire.dive_count, 3);
        assert!((bonaire.avg_gas_used_bar - 140.0).abs() < 1e-9);
        assert_eq!(report.global.primary_gas, "EAN32");
    }

    #[test]
    fn test_reimport_skips_existing_dives() {
        let mut state = imported();
        let report = state.import(&MemorySource::with_sample_data()).unwrap();
        assert!(report.dives.is_empty());
        assert_eq!(report.skipped.len(), 3);
        assert_eq!(state.store().dive_count(), 3);
    }

    #[test]
    fn test_unknown_computer_does_not_overwrite_known() {
        let mut state = imported();
        state.import(&MemorySource::new(Vec::new())).unwrap();
        assert_eq!(state.computer().serial, "PERDIX-0001");
    }

    #[test]
    fn test_mutations_recorrelate() {
        let mut state = imported();
        // Dive 2 runs 11:00-11:40.
        state
            .add_photos(
                "Bonaire",
                vec![
                    PhotoAsset::new("/p/a.jpg", at(11, 40)),
                    PhotoAsset::new("/p/b.jpg", at(12, 0)),
                ],
            )
            .unwrap();
        assert_eq!(state.photos_for_dive(DiveId(2)).len(), 1);

        state.remove_dive(DiveId(2)).unwrap();
        assert!(state.photos_for_dive(DiveId(2)).is_empty());
        assert!(state
            .store()
            .photo(Path::new("/p/a.jpg"))
            .unwrap()
            .assigned_dive
            .is_none());
    }

    #[test]
    fn test_rename_keeps_assignments() {
        let mut state = imported();
        state.create_trip("Klein Bonaire", at(0, 0).date(), at(0, 0).date()).unwrap();
        state
            .add_photos("Klein Bonaire", vec![PhotoAsset::new("/p/k.jpg", at(8, 30))])
            .unwrap();
        assert_eq!(state.photos_for_dive(DiveId(1)).len(), 1);

        let outcome = state.rename_trip("Klein Bonaire", "Bonaire").unwrap();
        assert!(outcome.merged);
        assert_eq!(state.store().trip_count(), 1);
        assert_eq!(state.photos_for_dive(DiveId(1)).len(), 1);
        assert!(state.store().trip("Bonaire").unwrap().manual);
    }

    #[test]
    fn test_profile_lookup() {
        let state = imported();
        let profile = state.profile(DiveId(1)).unwrap();
        assert_eq!(profile.duration_sec(), 3000);
        assert!(matches!(
            state.profile(DiveId(99)),
            Err(CoreError::Store(StoreError::UnknownDive(DiveId(99))))
        ));
        assert!(state.dive_stats(DiveId(99)).is_none());
    }

    #[test]
    fn test_units_do_not_change_stored_values() {
        let mut state = imported();
        let before = state.store().dive(DiveId(1)).unwrap().max_depth_m;
        state.set_units(UnitPrefs::new(DepthUnit::Imperial, PressureUnit::Bar));
        assert_eq!(state.store().dive(DiveId(1)).unwrap().max_depth_m, before);
        assert_eq!(state.units().depth, DepthUnit::Imperial);
    }

    #[test]
    fn test_background_is_resized_and_embedded() {
        let mut state = imported();
        state.set_background_image(&png_bytes(64, 64)).unwrap();
        let background = state.background().unwrap();
        assert_eq!((background.width, background.height), (32, 18));
        assert_eq!(background.media_type, "image/jpeg");
        assert!(background.data_uri().starts_with("data:image/jpeg;base64,"));

        assert!(state.set_background_image(b"not an image").is_err());
        assert!(state.background().is_some());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.jpg");
        fs::write(&present, b"jpeg").unwrap();
        let absent = dir.path().join("absent.jpg");

        let mut state = imported();
        state
            .add_photos(
                "Bonaire",
                vec![
                    PhotoAsset::new(&present, at(8, 10)),
                    PhotoAsset::new(&absent, at(15, 5)),
                    PhotoAsset::new(dir.path().join("x.jpg"), at(20, 0)),
                ],
            )
            .unwrap();
        fs::write(dir.path().join("x.jpg"), b"jpeg").unwrap();
        state
            .set_photo_caption(&present, Some("Frogfish".to_string()))
            .unwrap();
        state.set_photo_keep(&absent, false).unwrap();
        state.set_units(UnitPrefs::new(DepthUnit::Imperial, PressureUnit::Bar));
        state.set_background_image(&png_bytes(40, 40)).unwrap();

        let text = state.serialize().unwrap();
        let (restored, missing) = ProjectState::restore(&text, small_config()).unwrap();

        assert!(!restored.is_dirty());
        assert_eq!(restored.store().dive_count(), 3);
        let names: Vec<_> = restored.store().trips().map(|t| t.location_name.clone()).collect();
        assert_eq!(names, vec!["Bonaire".to_string()]);
        assert_eq!(restored.units(), state.units());
        assert_eq!(restored.computer(), state.computer());
        assert_eq!(restored.background(), state.background());

        for photo in state.store().photos() {
            let other = restored.store().photo(&photo.file_path).unwrap();
            assert_eq!(other.assigned_dive, photo.assigned_dive);
            assert_eq!(other.caption, photo.caption);
            assert_eq!(other.keep, photo.keep);
        }
        assert_eq!(restored.photos_for_dive(DiveId(1)).len(), 1);
        assert_eq!(restored.photos_for_dive(DiveId(3)).len(), 1);

        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].path, absent);
        assert!(restored.store().photo(&absent).unwrap().file_missing);
    }

    #[test]
    fn test_save_and_load_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects").join("bonaire.json");

        let mut state = imported();
        state.save_to_path(&path).unwrap();
        assert!(!state.is_dirty());

        let mut other = ProjectState::new(small_config());
        let missing = other.load_from_path(&path).unwrap();
        assert!(missing.is_empty());
        assert_eq!(other.store().dive_count(), 3);

        let (opened, _) = ProjectState::open(&path, small_config()).unwrap();
        assert_eq!(opened.store(), other.store());
    }

    #[test]
    fn test_failed_load_leaves_state_untouched() {
        let mut state = imported();

        let err = state.load_from_str(r#"{"schemaVersion": 2, "dives": []}"#).unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::UnsupportedVersion {
                found: 2,
                supported: 1
            }
        ));
        assert!(matches!(
            state.load_from_str("{ nope"),
            Err(PersistenceError::Json(_))
        ));
        assert_eq!(state.store().dive_count(), 3);
        assert!(state.is_dirty());
    }

    #[test]
    fn test_restore_rejects_inconsistent_files() {
        let orphan = r#"{
            "schemaVersion": 1,
            "dives": [{"id": 1, "startTime": "2024-03-15T09:00:00", "endTime": "2024-03-15T09:50:00",
                       "locationName": "Bonaire", "maxDepthM": 20.0, "avgDepthM": 10.0, "o2Percent": 21.0,
                       "startPressureBar": 200.0, "endPressureBar": 60.0}],
            "trips": []
        }"#;
        assert!(matches!(
            ProjectState::restore(orphan, CoreConfig::default()),
            Err(PersistenceError::Inconsistent(_))
        ));

        let inverted = orphan
            .replace("\"trips\": []", "\"trips\": [{\"locationName\": \"Bonaire\"}]")
            .replace("09:50:00", "08:50:00");
        assert!(matches!(
            ProjectState::restore(&inverted, CoreConfig::default()),
            Err(PersistenceError::Inconsistent(_))
        ));

        let bad_background = r#"{"schemaVersion": 1,
            "background": {"mediaType": "image/jpeg", "width": 10, "height": 10, "data": "***"}}"#;
        assert!(matches!(
            ProjectState::restore(bad_background, CoreConfig::default()),
            Err(PersistenceError::Json(_))
        ));
    }

    #[test]
    fn test_apply_conversions() {
        let mut state = imported();
        let outcomes = vec![
            ConversionOutcome {
                source: PathBuf::from("/raw/a.orf"),
                capture_time: at(8, 20),
                result: Ok(PathBuf::from("/jpg/a.jpg")),
            },
            ConversionOutcome {
                source: PathBuf::from("/raw/b.orf"),
                capture_time: at(8, 25),
                result: Err(crate::error::ConversionError::WorkerPanicked),
            },
        ];
        assert_eq!(state.apply_conversions("Bonaire", outcomes).unwrap(), 1);
        assert_eq!(state.photos_for_dive(DiveId(1)).len(), 1);
    }
}
