//! Photo intake, availability checks and slideshow ordering.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::{PhotoAccessError, StoreError, TimestampError};
use crate::models::{DiveId, PhotoAsset};
use crate::store::DiveRecordStore;
use crate::timestamp::parse_timestamp;

impl PhotoAsset {
    /// Build an asset from a camera `DateTimeOriginal` string.
    pub fn from_exif(
        file_path: impl Into<PathBuf>,
        timestamp: &str,
        keep: bool,
    ) -> Result<Self, TimestampError> {
        let capture_time = parse_timestamp(timestamp)?;
        Ok(PhotoAsset::new(file_path, capture_time).with_keep(keep))
    }
}

/// Check every managed photo on disk and flag the ones that cannot be read.
pub fn check_availability(store: &mut DiveRecordStore) -> Vec<PhotoAccessError> {
    let mut errors = Vec::new();
    for photo in store.photos_mut() {
        match probe(&photo.file_path) {
            Ok(()) => photo.file_missing = false,
            Err(reason) => {
                tracing::warn!(path = %photo.file_path.display(), %reason, "photo unavailable");
                photo.file_missing = true;
                errors.push(PhotoAccessError {
                    path: photo.file_path.clone(),
                    reason,
                });
            }
        }
    }
    errors
}

fn probe(path: &Path) -> Result<(), String> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err("not a regular file".to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err("file missing".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideshowEntry {
    pub file_path: PathBuf,
    pub capture_time: NaiveDateTime,
    pub caption: Option<String>,
}

impl From<&PhotoAsset> for SlideshowEntry {
    fn from(photo: &PhotoAsset) -> Self {
        Self {
            file_path: photo.file_path.clone(),
            capture_time: photo.capture_time,
            caption: photo.caption.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SlideshowFormat {
    Html,
    Mp4,
}

impl SlideshowFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SlideshowFormat::Html => "html",
            SlideshowFormat::Mp4 => "mp4",
        }
    }
}

fn showable(photo: &PhotoAsset) -> bool {
    photo.keep && !photo.file_missing
}

/// Kept photos of a trip in the order they were added.
pub fn trip_slideshow(store: &DiveRecordStore, trip: &str) -> Result<Vec<SlideshowEntry>, StoreError> {
    let trip = store
        .trip(trip)
        .ok_or_else(|| StoreError::UnknownTrip(trip.to_string()))?;
    Ok(trip
        .photos
        .iter()
        .filter(|p| showable(p))
        .map(SlideshowEntry::from)
        .collect())
}

/// Kept photos taken during one dive, in capture order.
pub fn dive_slideshow(store: &DiveRecordStore, dive: DiveId) -> Result<Vec<SlideshowEntry>, StoreError> {
    if !store.contains_dive(dive) {
        return Err(StoreError::UnknownDive(dive));
    }
    Ok(store
        .photos_for_dive(dive)
        .into_iter()
        .filter(|p| showable(p))
        .map(SlideshowEntry::from)
        .collect())
}

/// `Bonaire_slideshow.html`, or `Bonaire_Salt_Pier_slideshow.mp4` when
/// scoped to a site.
pub fn slideshow_file_name(trip: &str, site: Option<&str>, format: SlideshowFormat) -> String {
    let trip = trip.trim();
    let stem = match site.map(str::trim).filter(|s| !s.is_empty()) {
        Some(site) => format!("{trip}_{site}"),
        None if trip.is_empty() => "trip".to_string(),
        None => trip.to_string(),
    };
    format!("{}_slideshow.{}", stem.replace(' ', "_"), format.extension())
}
