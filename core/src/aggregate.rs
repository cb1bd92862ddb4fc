//! Per-dive, per-trip and global statistics.
//!
//! Pure functions over the store; nothing here mutates state. Trips without
//! imported dives are still listed (photo browsing) but never feed the
//! dive-based numbers.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{DiveId, DiveRecord, Trip, AIR_O2_PERCENT};
use crate::store::DiveRecordStore;
use crate::units::PSI_PER_BAR;

/// Classification of dive depth ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum DepthClass {
    /// 0-18m (0-60ft) - recreational limit
    Recreational,
    /// 18-40m (60-130ft) - deep recreational
    Deep,
    /// 40-60m (130-200ft) - extended range / technical
    Extended,
    /// 60m+ (200ft+) - extreme technical
    Extreme,
}

impl DepthClass {
    pub fn from_depth_m(depth: f64) -> Self {
        if depth <= 18.0 {
            DepthClass::Recreational
        } else if depth <= 40.0 {
            DepthClass::Deep
        } else if depth <= 60.0 {
            DepthClass::Extended
        } else {
            DepthClass::Extreme
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DepthClass::Recreational => "Recreational",
            DepthClass::Deep => "Deep",
            DepthClass::Extended => "Extended Range",
            DepthClass::Extreme => "Extreme",
        }
    }
}

/// Tissue loading at the end of a dive, from the GF99 reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum Gf99Band {
    /// <= 50%
    Low,
    /// <= 70%
    Medium,
    High,
}

impl Gf99Band {
    pub fn from_gf99(gf99: f64) -> Self {
        if gf99 > 70.0 {
            Gf99Band::High
        } else if gf99 > 50.0 {
            Gf99Band::Medium
        } else {
            Gf99Band::Low
        }
    }
}

/// Gas consumption band. Thresholds are in PSI/min.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ConsumptionBand {
    /// <= 30 PSI/min
    Low,
    /// <= 40 PSI/min
    Medium,
    High,
}

impl ConsumptionBand {
    pub fn from_rate_bar_min(rate: f64) -> Self {
        let psi_min = rate * PSI_PER_BAR;
        if psi_min > 40.0 {
            ConsumptionBand::High
        } else if psi_min > 30.0 {
            ConsumptionBand::Medium
        } else {
            ConsumptionBand::Low
        }
    }
}

/// Derived numbers for one dive.
#[derive(Debug, Clone, PartialEq)]
pub struct DiveStats {
    pub id: DiveId,
    pub duration_min: f64,
    pub gas_used_bar: f64,
    pub consumption_bar_min: f64,
    pub depth_class: DepthClass,
    pub gf99_band: Option<Gf99Band>,
    pub consumption_band: ConsumptionBand,
}

impl DiveStats {
    pub fn compute(dive: &DiveRecord) -> Self {
        let consumption_bar_min = dive.consumption_rate_bar_min();
        Self {
            id: dive.id,
            duration_min: dive.duration_min(),
            gas_used_bar: dive.gas_used_bar(),
            consumption_bar_min,
            depth_class: DepthClass::from_depth_m(dive.max_depth_m),
            gf99_band: dive.gf99_end.map(Gf99Band::from_gf99),
            consumption_band: ConsumptionBand::from_rate_bar_min(consumption_bar_min),
        }
    }
}

/// Running sums over a set of dives.
#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    dive_count: u32,
    total_sec: i64,
    max_depth_m: f64,
    gas_used_sum: f64,
    consumption_sum: f64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl Totals {
    fn add(&mut self, dive: &DiveRecord) {
        self.dive_count += 1;
        self.total_sec += dive.duration_sec();
        if dive.max_depth_m > self.max_depth_m {
            self.max_depth_m = dive.max_depth_m;
        }
        self.gas_used_sum += dive.gas_used_bar();
        self.consumption_sum += dive.consumption_rate_bar_min();

        let date = dive.date();
        self.start_date = Some(self.start_date.map_or(date, |d| d.min(date)));
        self.end_date = Some(self.end_date.map_or(date, |d| d.max(date)));
    }

    fn total_hours(&self) -> f64 {
        self.total_sec as f64 / 3600.0
    }

    fn mean(&self, sum: f64) -> f64 {
        if self.dive_count == 0 {
            0.0
        } else {
            sum / self.dive_count as f64
        }
    }
}

/// Summary for one trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TripStats {
    pub location_name: String,
    pub dive_count: u32,
    pub total_hours: f64,
    pub max_depth_m: f64,
    pub avg_gas_used_bar: f64,
    pub avg_consumption_bar_min: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub has_imported_data: bool,
    pub photo_count: u32,
}

impl TripStats {
    pub fn compute<'a>(trip: &Trip, dives: impl IntoIterator<Item = &'a DiveRecord>) -> Self {
        let mut totals = Totals::default();
        if trip.has_imported_data {
            for dive in dives {
                totals.add(dive);
            }
        }
        Self {
            location_name: trip.location_name.clone(),
            dive_count: totals.dive_count,
            total_hours: totals.total_hours(),
            max_depth_m: totals.max_depth_m,
            avg_gas_used_bar: totals.mean(totals.gas_used_sum),
            avg_consumption_bar_min: totals.mean(totals.consumption_sum),
            start_date: trip.start_date,
            end_date: trip.end_date,
            has_imported_data: trip.has_imported_data,
            photo_count: trip.photos.len() as u32,
        }
    }
}

/// Numbers across every trip with imported dives.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStats {
    pub dive_count: u32,
    /// Trips that contributed dives.
    pub trip_count: u32,
    pub total_hours: f64,
    pub max_depth_m: f64,
    pub avg_gas_used_bar: f64,
    pub avg_consumption_bar_min: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// `EAN32` style label for the most used nitrox mix, or `Air`.
    pub primary_gas: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripReport {
    pub trips: Vec<TripStats>,
    pub global: GlobalStats,
}

impl TripReport {
    pub fn compute(store: &DiveRecordStore) -> Self {
        let mut trips = Vec::with_capacity(store.trip_count());
        let mut totals = Totals::default();
        let mut trip_count = 0;
        let mut o2_counts: BTreeMap<u32, u32> = BTreeMap::new();

        for trip in store.trips() {
            trips.push(TripStats::compute(trip, store.dives_at(&trip.location_name)));
            if !trip.has_imported_data {
                continue;
            }
            trip_count += 1;
            for dive in store.dives_at(&trip.location_name) {
                totals.add(dive);
                if dive.o2_percent > AIR_O2_PERCENT {
                    *o2_counts.entry(dive.o2_percent.round() as u32).or_insert(0) += 1;
                }
            }
        }

        let global = GlobalStats {
            dive_count: totals.dive_count,
            trip_count,
            total_hours: totals.total_hours(),
            max_depth_m: totals.max_depth_m,
            avg_gas_used_bar: totals.mean(totals.gas_used_sum),
            avg_consumption_bar_min: totals.mean(totals.consumption_sum),
            start_date: totals.start_date,
            end_date: totals.end_date,
            primary_gas: primary_gas_label(&o2_counts),
        };
        Self { trips, global }
    }

    pub fn trip(&self, location: &str) -> Option<&TripStats> {
        self.trips.iter().find(|t| t.location_name == location)
    }
}

/// Most frequent mix wins; ties go to the leaner mix.
fn primary_gas_label(o2_counts: &BTreeMap<u32, u32>) -> String {
    let mut best: Option<(u32, u32)> = None;
    for (&o2, &count) in o2_counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((o2, count));
        }
    }
    match best {
        Some((o2, _)) => format!("EAN{o2}"),
        None => "Air".to_string(),
    }
}
