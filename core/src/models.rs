use std::fmt;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::InvalidDiveData;

/// Oxygen fraction of air, in percent.
pub const AIR_O2_PERCENT: f64 = 21.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiveId(pub i64);

impl fmt::Display for DiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One logged dive in canonical units (meters, bar, Celsius).
///
/// The time window is fixed at construction. Labels (site, location) stay
/// editable through the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiveRecord {
    pub id: DiveId,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    pub location_name: String,
    #[serde(default)]
    pub site_name: String,
    pub max_depth_m: f64,
    pub avg_depth_m: f64,
    #[serde(default)]
    pub water_temp_c: Option<f64>,
    pub o2_percent: f64,
    pub start_pressure_bar: f64,
    pub end_pressure_bar: f64,
    #[serde(default)]
    pub gf99_end: Option<f64>,
}

impl DiveRecord {
    /// Create a dive lasting `duration_sec` from `start_time`.
    pub fn new(
        id: DiveId,
        start_time: NaiveDateTime,
        duration_sec: i64,
        location_name: impl Into<String>,
    ) -> Result<Self, InvalidDiveData> {
        if duration_sec <= 0 {
            return Err(InvalidDiveData::NonPositiveDuration {
                dive: id.to_string(),
                duration_sec,
            });
        }
        let end_time = Duration::try_seconds(duration_sec)
            .and_then(|d| start_time.checked_add_signed(d))
            .ok_or_else(|| InvalidDiveData::DurationOutOfRange {
                dive: id.to_string(),
                duration_sec,
            })?;
        Self::with_window(id, start_time, end_time, location_name)
    }

    /// Create a dive spanning `[start_time, end_time]`.
    pub fn with_window(
        id: DiveId,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        location_name: impl Into<String>,
    ) -> Result<Self, InvalidDiveData> {
        let duration_sec = (end_time - start_time).num_seconds();
        if duration_sec <= 0 {
            return Err(InvalidDiveData::NonPositiveDuration {
                dive: id.to_string(),
                duration_sec,
            });
        }
        let location_name = location_name.into().trim().to_string();
        if location_name.is_empty() {
            return Err(InvalidDiveData::MissingField {
                dive: id.to_string(),
                field: "location",
            });
        }
        Ok(Self {
            id,
            start_time,
            end_time,
            location_name,
            site_name: String::new(),
            max_depth_m: 0.0,
            avg_depth_m: 0.0,
            water_temp_c: None,
            o2_percent: AIR_O2_PERCENT,
            start_pressure_bar: 0.0,
            end_pressure_bar: 0.0,
            gf99_end: None,
        })
    }

    pub fn with_site(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = site_name.into();
        self
    }

    pub fn with_depths(mut self, max_depth_m: f64, avg_depth_m: f64) -> Self {
        self.max_depth_m = max_depth_m;
        self.avg_depth_m = avg_depth_m;
        self
    }

    pub fn with_pressures(mut self, start_bar: f64, end_bar: f64) -> Self {
        self.start_pressure_bar = start_bar;
        self.end_pressure_bar = end_bar;
        self
    }

    pub fn with_o2_percent(mut self, o2_percent: f64) -> Self {
        self.o2_percent = o2_percent;
        self
    }

    pub fn with_water_temp(mut self, celsius: Option<f64>) -> Self {
        self.water_temp_c = celsius;
        self
    }

    pub fn with_gf99(mut self, gf99: Option<f64>) -> Self {
        self.gf99_end = gf99;
        self
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.end_time
    }

    pub fn date(&self) -> NaiveDate {
        self.start_time.date()
    }

    pub fn duration_sec(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }

    pub fn duration_min(&self) -> f64 {
        self.duration_sec() as f64 / 60.0
    }

    /// Pressure drop over the dive. Negative when the end reading is higher.
    pub fn gas_used_bar(&self) -> f64 {
        self.start_pressure_bar - self.end_pressure_bar
    }

    /// Surface-independent pressure drop per minute (bar/min).
    pub fn consumption_rate_bar_min(&self) -> f64 {
        let minutes = self.duration_min();
        if minutes > 0.0 {
            self.gas_used_bar() / minutes
        } else {
            0.0
        }
    }

    /// Whether `t` falls inside the dive window, both ends inclusive.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start_time <= t && t <= self.end_time
    }
}

/// A named grouping of dives and photos, keyed by location name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub location_name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Created by the user with explicit bounds rather than derived from dives.
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub has_imported_data: bool,
    #[serde(default)]
    pub photos: Vec<PhotoAsset>,
}

impl Trip {
    pub fn derived(location_name: impl Into<String>) -> Self {
        Self {
            location_name: location_name.into(),
            start_date: None,
            end_date: None,
            manual: false,
            has_imported_data: false,
            photos: Vec::new(),
        }
    }

    pub fn manual(location_name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
            manual: true,
            ..Self::derived(location_name)
        }
    }

    pub fn is_photo_only(&self) -> bool {
        !self.has_imported_data && !self.photos.is_empty()
    }
}

/// A photograph managed by path. Pixel data is never held here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAsset {
    pub file_path: PathBuf,
    pub capture_time: NaiveDateTime,
    #[serde(default = "default_keep")]
    pub keep: bool,
    #[serde(default)]
    pub assigned_dive: Option<DiveId>,
    #[serde(default)]
    pub caption: Option<String>,
    /// Set when the file could not be found on the last availability check.
    #[serde(skip)]
    pub file_missing: bool,
}

fn default_keep() -> bool {
    true
}

impl PhotoAsset {
    pub fn new(file_path: impl Into<PathBuf>, capture_time: NaiveDateTime) -> Self {
        Self {
            file_path: file_path.into(),
            capture_time,
            keep: true,
            assigned_dive: None,
            caption: None,
            file_missing: false,
        }
    }

    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

/// The dive computer the export came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerInfo {
    pub serial: String,
    #[serde(default)]
    pub firmware: String,
}

impl Default for ComputerInfo {
    fn default() -> Self {
        Self {
            serial: "Unknown".to_string(),
            firmware: String::new(),
        }
    }
}

impl ComputerInfo {
    pub fn is_known(&self) -> bool {
        !self.serial.is_empty() && self.serial != "Unknown"
    }
}
