//! In-memory store of dives and trips.
//!
//! Trips are keyed by location name. After every mutation the store is
//! reconciled so that each dive location has a trip, `has_imported_data`
//! reflects the dive set, and derived trips carry the min/max dive date.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::StoreError;
use crate::models::{DiveId, DiveRecord, PhotoAsset, Trip};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, uniffi::Enum)]
pub enum DiveSortField {
    #[default]
    Id,
    StartTime,
    Location,
    Site,
    MaxDepth,
    AvgDepth,
    Duration,
    WaterTemp,
    O2Percent,
    StartPressure,
    EndPressure,
    GasUsed,
    ConsumptionRate,
    Gf99,
}

impl DiveSortField {
    fn compare(self, a: &DiveRecord, b: &DiveRecord) -> Ordering {
        match self {
            DiveSortField::Id => a.id.cmp(&b.id),
            DiveSortField::StartTime => a.start_time().cmp(&b.start_time()),
            DiveSortField::Location => a.location_name.cmp(&b.location_name),
            DiveSortField::Site => a.site_name.cmp(&b.site_name),
            DiveSortField::MaxDepth => a.max_depth_m.total_cmp(&b.max_depth_m),
            DiveSortField::AvgDepth => a.avg_depth_m.total_cmp(&b.avg_depth_m),
            DiveSortField::Duration => a.duration_sec().cmp(&b.duration_sec()),
            DiveSortField::WaterTemp => cmp_optional(a.water_temp_c, b.water_temp_c),
            DiveSortField::O2Percent => a.o2_percent.total_cmp(&b.o2_percent),
            DiveSortField::StartPressure => a.start_pressure_bar.total_cmp(&b.start_pressure_bar),
            DiveSortField::EndPressure => a.end_pressure_bar.total_cmp(&b.end_pressure_bar),
            DiveSortField::GasUsed => a.gas_used_bar().total_cmp(&b.gas_used_bar()),
            DiveSortField::ConsumptionRate => a
                .consumption_rate_bar_min()
                .total_cmp(&b.consumption_rate_bar_min()),
            DiveSortField::Gf99 => cmp_optional(a.gf99_end, b.gf99_end),
        }
    }
}

/// Absent values sort first.
fn cmp_optional(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, uniffi::Enum)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Filter and ordering for [`DiveRecordStore::list_dives`].
#[derive(Clone, Debug, Default)]
pub struct DiveQuery {
    pub location: Option<String>,
    pub start_time_min: Option<NaiveDateTime>,
    pub start_time_max: Option<NaiveDateTime>,
    pub min_depth_m: Option<f64>,
    pub max_depth_m: Option<f64>,
    pub sort_by: DiveSortField,
    pub direction: SortDirection,
}

impl DiveQuery {
    pub fn at_location(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, field: DiveSortField, direction: SortDirection) -> Self {
        self.sort_by = field;
        self.direction = direction;
        self
    }

    fn matches(&self, dive: &DiveRecord) -> bool {
        if let Some(location) = &self.location {
            if &dive.location_name != location {
                return false;
            }
        }
        if self.start_time_min.is_some_and(|min| dive.start_time() < min) {
            return false;
        }
        if self.start_time_max.is_some_and(|max| dive.start_time() > max) {
            return false;
        }
        if self.min_depth_m.is_some_and(|min| dive.max_depth_m < min) {
            return false;
        }
        if self.max_depth_m.is_some_and(|max| dive.max_depth_m > max) {
            return false;
        }
        true
    }
}

/// What a trip rename touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenameOutcome {
    pub dives_moved: usize,
    pub photos_moved: usize,
    /// The new name already existed and the trips were merged.
    pub merged: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiveRecordStore {
    dives: BTreeMap<DiveId, DiveRecord>,
    trips: BTreeMap<String, Trip>,
}

impl DiveRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from saved parts, checking every invariant.
    pub fn from_parts(dives: Vec<DiveRecord>, trips: Vec<Trip>) -> Result<Self, StoreError> {
        let mut store = Self::new();

        let mut seen_photos = BTreeSet::new();
        for trip in trips {
            if trip.location_name.trim().is_empty() {
                return Err(StoreError::EmptyLocationName);
            }
            if let (Some(start), Some(end)) = (trip.start_date, trip.end_date) {
                if start > end {
                    return Err(StoreError::InvalidDateRange { start, end });
                }
            }
            for photo in &trip.photos {
                if !seen_photos.insert(photo.file_path.clone()) {
                    return Err(StoreError::DuplicatePhoto(photo.file_path.clone()));
                }
            }
            if store.trips.contains_key(&trip.location_name) {
                return Err(StoreError::TripExists(trip.location_name));
            }
            store.trips.insert(trip.location_name.clone(), trip);
        }

        for dive in dives {
            if dive.location_name.trim().is_empty() {
                return Err(StoreError::EmptyLocationName);
            }
            if !store.trips.contains_key(&dive.location_name) {
                return Err(StoreError::UnknownTrip(dive.location_name));
            }
            if store.dives.contains_key(&dive.id) {
                return Err(StoreError::DuplicateDive(dive.id));
            }
            store.dives.insert(dive.id, dive);
        }

        store.reconcile();
        Ok(store)
    }

    pub fn dive_count(&self) -> usize {
        self.dives.len()
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    /// Dives in id order.
    pub fn dives(&self) -> impl Iterator<Item = &DiveRecord> {
        self.dives.values()
    }

    pub fn dive(&self, id: DiveId) -> Option<&DiveRecord> {
        self.dives.get(&id)
    }

    pub fn contains_dive(&self, id: DiveId) -> bool {
        self.dives.contains_key(&id)
    }

    /// Trips in name order.
    pub fn trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips.values()
    }

    pub fn trip(&self, name: &str) -> Option<&Trip> {
        self.trips.get(name)
    }

    pub fn dives_at<'a>(&'a self, location: &'a str) -> impl Iterator<Item = &'a DiveRecord> + 'a {
        self.dives
            .values()
            .filter(move |d| d.location_name == location)
    }

    /// Insert a batch of dives. Nothing is inserted if any dive is rejected.
    pub fn add_dives(&mut self, dives: Vec<DiveRecord>) -> Result<usize, StoreError> {
        let mut batch = BTreeSet::new();
        for dive in &dives {
            if dive.location_name.trim().is_empty() {
                return Err(StoreError::EmptyLocationName);
            }
            if self.dives.contains_key(&dive.id) || !batch.insert(dive.id) {
                return Err(StoreError::DuplicateDive(dive.id));
            }
        }
        let added = dives.len();
        for dive in dives {
            self.dives.insert(dive.id, dive);
        }
        self.reconcile();
        Ok(added)
    }

    pub fn remove_dive(&mut self, id: DiveId) -> Result<DiveRecord, StoreError> {
        let dive = self.dives.remove(&id).ok_or(StoreError::UnknownDive(id))?;
        self.reconcile();
        Ok(dive)
    }

    pub fn set_site_name(&mut self, id: DiveId, site: &str) -> Result<(), StoreError> {
        let dive = self.dives.get_mut(&id).ok_or(StoreError::UnknownDive(id))?;
        dive.site_name = site.trim().to_string();
        Ok(())
    }

    /// Move one dive to another location, creating its trip when needed.
    pub fn set_dive_location(&mut self, id: DiveId, location: &str) -> Result<(), StoreError> {
        let location = non_empty(location)?;
        let dive = self.dives.get_mut(&id).ok_or(StoreError::UnknownDive(id))?;
        dive.location_name = location;
        self.reconcile();
        Ok(())
    }

    /// Create a trip with explicit bounds, for photo-only trips.
    pub fn create_trip(
        &mut self,
        name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(), StoreError> {
        let name = non_empty(name)?;
        if start > end {
            return Err(StoreError::InvalidDateRange { start, end });
        }
        if self.trips.contains_key(&name) {
            return Err(StoreError::TripExists(name));
        }
        self.trips.insert(name.clone(), Trip::manual(name, start, end));
        self.reconcile();
        Ok(())
    }

    /// Rename a trip and every dive under it. Merges into `new_name` when
    /// that trip already exists.
    pub fn rename_trip(&mut self, old_name: &str, new_name: &str) -> Result<RenameOutcome, StoreError> {
        let new_name = non_empty(new_name)?;
        if !self.trips.contains_key(old_name) {
            return Err(StoreError::UnknownTrip(old_name.to_string()));
        }
        if old_name == new_name {
            return Ok(RenameOutcome::default());
        }

        let Some(mut source) = self.trips.remove(old_name) else {
            return Err(StoreError::UnknownTrip(old_name.to_string()));
        };

        let mut outcome = RenameOutcome {
            photos_moved: source.photos.len(),
            ..RenameOutcome::default()
        };
        for dive in self.dives.values_mut() {
            if dive.location_name == old_name {
                dive.location_name = new_name.clone();
                outcome.dives_moved += 1;
            }
        }

        match self.trips.get_mut(&new_name) {
            Some(target) => {
                outcome.merged = true;
                target.photos.append(&mut source.photos);
                target.start_date = min_date(target.start_date, source.start_date);
                target.end_date = max_date(target.end_date, source.end_date);
                target.manual |= source.manual;
            }
            None => {
                source.location_name = new_name.clone();
                self.trips.insert(new_name, source);
            }
        }

        self.reconcile();
        Ok(outcome)
    }

    /// Remove a trip with its photos and every dive at its location.
    pub fn delete_trip(&mut self, name: &str) -> Result<Trip, StoreError> {
        let trip = self
            .trips
            .remove(name)
            .ok_or_else(|| StoreError::UnknownTrip(name.to_string()))?;
        self.dives.retain(|_, d| d.location_name != name);
        self.reconcile();
        Ok(trip)
    }

    /// Attach photos to a trip. Paths already managed anywhere are skipped.
    pub fn add_photos(&mut self, trip: &str, photos: Vec<PhotoAsset>) -> Result<usize, StoreError> {
        if !self.trips.contains_key(trip) {
            return Err(StoreError::UnknownTrip(trip.to_string()));
        }
        let mut managed: BTreeSet<PathBuf> = self.photos().map(|p| p.file_path.clone()).collect();
        let fresh: Vec<PhotoAsset> = photos
            .into_iter()
            .filter(|p| managed.insert(p.file_path.clone()))
            .collect();
        let added = fresh.len();
        if let Some(target) = self.trips.get_mut(trip) {
            target.photos.extend(fresh);
        }
        self.reconcile();
        Ok(added)
    }

    pub fn remove_photo(&mut self, path: &Path) -> Result<PhotoAsset, StoreError> {
        let photo = self
            .trips
            .values_mut()
            .find_map(|trip| {
                let pos = trip.photos.iter().position(|p| p.file_path == path)?;
                Some(trip.photos.remove(pos))
            })
            .ok_or_else(|| StoreError::UnknownPhoto(path.to_path_buf()))?;
        self.reconcile();
        Ok(photo)
    }

    pub fn set_photo_keep(&mut self, path: &Path, keep: bool) -> Result<(), StoreError> {
        self.photo_mut(path)?.keep = keep;
        Ok(())
    }

    pub fn set_photo_caption(&mut self, path: &Path, caption: Option<String>) -> Result<(), StoreError> {
        self.photo_mut(path)?.caption = caption.filter(|c| !c.trim().is_empty());
        Ok(())
    }

    pub fn photo(&self, path: &Path) -> Option<&PhotoAsset> {
        self.photos().find(|p| p.file_path == path)
    }

    /// Every managed photo, grouped by trip.
    pub fn photos(&self) -> impl Iterator<Item = &PhotoAsset> {
        self.trips.values().flat_map(|t| t.photos.iter())
    }

    pub(crate) fn photos_mut(&mut self) -> impl Iterator<Item = &mut PhotoAsset> {
        self.trips.values_mut().flat_map(|t| t.photos.iter_mut())
    }

    /// Photos assigned to a dive, in capture order.
    pub fn photos_for_dive(&self, id: DiveId) -> Vec<&PhotoAsset> {
        let mut photos: Vec<&PhotoAsset> = self
            .photos()
            .filter(|p| p.assigned_dive == Some(id))
            .collect();
        photos.sort_by(|a, b| {
            a.capture_time
                .cmp(&b.capture_time)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        photos
    }

    /// Filter and sort dives. Ties are broken by ascending dive id.
    pub fn list_dives(&self, query: &DiveQuery) -> Vec<&DiveRecord> {
        let mut dives: Vec<&DiveRecord> = self.dives.values().filter(|d| query.matches(d)).collect();
        dives.sort_by(|a, b| {
            let ord = query.sort_by.compare(a, b);
            let ord = match query.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });
        dives
    }

    fn photo_mut(&mut self, path: &Path) -> Result<&mut PhotoAsset, StoreError> {
        self.photos_mut()
            .find(|p| p.file_path == path)
            .ok_or_else(|| StoreError::UnknownPhoto(path.to_path_buf()))
    }

    fn reconcile(&mut self) {
        let mut bounds: BTreeMap<&str, (NaiveDate, NaiveDate)> = BTreeMap::new();
        for dive in self.dives.values() {
            let date = dive.date();
            bounds
                .entry(dive.location_name.as_str())
                .and_modify(|(start, end)| {
                    *start = (*start).min(date);
                    *end = (*end).max(date);
                })
                .or_insert((date, date));
        }

        for location in bounds.keys() {
            if !self.trips.contains_key(*location) {
                self.trips
                    .insert(location.to_string(), Trip::derived(*location));
            }
        }

        for trip in self.trips.values_mut() {
            let dive_bounds = bounds.get(trip.location_name.as_str()).copied();
            trip.has_imported_data = dive_bounds.is_some();
            if trip.manual {
                // Manual ranges only ever widen to cover their dives.
                if let Some((start, end)) = dive_bounds {
                    trip.start_date = min_date(trip.start_date, Some(start));
                    trip.end_date = max_date(trip.end_date, Some(end));
                }
                continue;
            }
            match dive_bounds {
                Some((start, end)) => {
                    trip.start_date = Some(start);
                    trip.end_date = Some(end);
                }
                None => {
                    trip.start_date = trip.photos.iter().map(|p| p.capture_time.date()).min();
                    trip.end_date = trip.photos.iter().map(|p| p.capture_time.date()).max();
                }
            }
        }

        self.trips
            .retain(|_, t| t.manual || t.has_imported_data || !t.photos.is_empty());
    }
}

fn non_empty(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::EmptyLocationName);
    }
    Ok(name.to_string())
}

fn min_date(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_date(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
