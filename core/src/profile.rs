//! Synthetic depth and pressure curves for a single dive.
//!
//! Exports only carry summary fields (max/avg depth, duration, start/end
//! pressure), so the curve is an estimate for charts, not a measurement:
//!
//! 1. descent: linear ramp from the surface to max depth
//! 2. bottom: a baseline sliding from max depth toward average depth, with a
//!    gentle oscillation that fades out at both ends of the phase
//! 3. ascent: linear ramp back to the surface, holding a safety stop on
//!    dives deeper than the configured threshold
//!
//! Pressure falls linearly from start to end pressure (constant consumption).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::InvalidDiveData;
use crate::models::DiveRecord;

/// Descent and ascent together never take more than this share of a dive.
const MAX_TRANSIT_SHARE: f64 = 0.8;

/// Tunable shape of the synthetic profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileParams {
    /// Share of the dive spent descending.
    pub descent_fraction: f64,
    /// Descent floor in seconds; the effective floor is `min(this, duration / 10)`.
    pub min_descent_sec: f64,
    /// Minimum share of the dive spent ascending.
    pub ascent_fraction: f64,
    /// Ascent speed used to size the ascent phase (m/min).
    pub ascent_rate_m_min: f64,
    pub safety_stop_depth_m: f64,
    pub safety_stop_sec: f64,
    /// Dives with a max depth beyond this get a safety stop.
    pub safety_stop_threshold_m: f64,
    /// Peak amplitude of the bottom-phase oscillation (m).
    pub oscillation_amplitude_m: f64,
    pub oscillation_period_sec: f64,
    /// Spacing between emitted points (s).
    pub sample_interval_sec: i64,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self {
            descent_fraction: 0.10,
            min_descent_sec: 60.0,
            ascent_fraction: 0.10,
            ascent_rate_m_min: 9.0,
            safety_stop_depth_m: 5.0,
            safety_stop_sec: 180.0,
            safety_stop_threshold_m: 10.0,
            oscillation_amplitude_m: 1.5,
            oscillation_period_sec: 360.0,
            sample_interval_sec: 10,
        }
    }
}

/// One chart point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePoint {
    pub elapsed_sec: i64,
    pub value: f64,
}

impl ProfilePoint {
    /// Apply a unit conversion to the value.
    pub fn map_value(self, f: impl FnOnce(f64) -> f64) -> Self {
        Self {
            elapsed_sec: self.elapsed_sec,
            value: f(self.value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SafetyStop {
    depth: f64,
    arrive: f64,
    leave: f64,
}

/// Phase boundaries and depths, all in seconds/meters.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DepthShape {
    duration: f64,
    max_depth: f64,
    bottom_end_depth: f64,
    descent_end: f64,
    ascent_start: f64,
    amplitude: f64,
    period: f64,
    stop: Option<SafetyStop>,
}

impl DepthShape {
    fn new(dive: &DiveRecord, duration: f64, params: &ProfileParams) -> Self {
        let max_depth = dive.max_depth_m.max(0.0);
        let bottom_end_depth = if dive.avg_depth_m > 0.0 {
            dive.avg_depth_m.min(max_depth)
        } else {
            max_depth
        };

        let descent_floor = params.min_descent_sec.min(duration / 10.0);
        let mut descent = (params.descent_fraction * duration).max(descent_floor);

        let wants_stop = max_depth > params.safety_stop_threshold_m
            && params.safety_stop_depth_m > 0.0
            && params.safety_stop_sec > 0.0
            && bottom_end_depth > params.safety_stop_depth_m;
        let travel_needed = if params.ascent_rate_m_min > 0.0 {
            bottom_end_depth / params.ascent_rate_m_min * 60.0
        } else {
            0.0
        };
        let stop_needed = if wants_stop { params.safety_stop_sec } else { 0.0 };
        let mut ascent = (params.ascent_fraction * duration).max(travel_needed + stop_needed);

        let transit_cap = MAX_TRANSIT_SHARE * duration;
        if descent + ascent > transit_cap {
            let scale = transit_cap / (descent + ascent);
            descent *= scale;
            ascent *= scale;
        }

        let ascent_start = duration - ascent;
        let stop = wants_stop.then(|| {
            // Shrinks with the ascent when the transit cap compressed it.
            let planned = travel_needed + params.safety_stop_sec;
            let hold = (params.safety_stop_sec * (ascent / planned).min(1.0)).min(ascent * 0.9);
            let travel = ascent - hold;
            let first_leg = travel * (bottom_end_depth - params.safety_stop_depth_m) / bottom_end_depth;
            let arrive = ascent_start + first_leg;
            SafetyStop {
                depth: params.safety_stop_depth_m,
                arrive,
                leave: arrive + hold,
            }
        });

        Self {
            duration,
            max_depth,
            bottom_end_depth,
            descent_end: descent,
            ascent_start,
            amplitude: params.oscillation_amplitude_m.max(0.0),
            period: params.oscillation_period_sec,
            stop,
        }
    }

    fn depth_at(&self, t: f64) -> f64 {
        if t <= 0.0 || t >= self.duration {
            return 0.0;
        }
        if t < self.descent_end {
            return self.max_depth * t / self.descent_end;
        }
        if t < self.ascent_start {
            return self.bottom_depth_at(t);
        }
        self.ascent_depth_at(t)
    }

    fn bottom_depth_at(&self, t: f64) -> f64 {
        let span = self.ascent_start - self.descent_end;
        let progress = if span > 0.0 {
            (t - self.descent_end) / span
        } else {
            1.0
        };
        let baseline = lerp(self.max_depth, self.bottom_end_depth, progress);
        let wobble = if self.period > 0.0 {
            let phase = 2.0 * PI * (t - self.descent_end) / self.period;
            self.amplitude * phase.sin() * (PI * progress).sin()
        } else {
            0.0
        };
        (baseline + wobble).clamp(0.0, self.max_depth)
    }

    fn ascent_depth_at(&self, t: f64) -> f64 {
        match self.stop {
            Some(stop) if t < stop.arrive => {
                let progress = (t - self.ascent_start) / (stop.arrive - self.ascent_start);
                lerp(self.bottom_end_depth, stop.depth, progress)
            }
            Some(stop) if t < stop.leave => stop.depth,
            Some(stop) => {
                let progress = (t - stop.leave) / (self.duration - stop.leave);
                lerp(stop.depth, 0.0, progress)
            }
            None => {
                let progress = (t - self.ascent_start) / (self.duration - self.ascent_start);
                lerp(self.bottom_end_depth, 0.0, progress)
            }
        }
    }
}

fn lerp(from: f64, to: f64, progress: f64) -> f64 {
    from + (to - from) * progress.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Curve {
    Depth,
    Pressure,
}

/// Estimated depth and pressure curves for one dive.
///
/// Point sequences are produced lazily and can be restarted by calling
/// [`depth_points`](Self::depth_points) or
/// [`pressure_points`](Self::pressure_points) again.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedProfile {
    duration_sec: i64,
    interval_sec: i64,
    start_pressure_bar: f64,
    end_pressure_bar: f64,
    shape: DepthShape,
}

impl SynthesizedProfile {
    pub fn synthesize(dive: &DiveRecord, params: &ProfileParams) -> Result<Self, InvalidDiveData> {
        let duration_sec = dive.duration_sec();
        if duration_sec <= 0 {
            return Err(InvalidDiveData::NonPositiveDuration {
                dive: dive.id.to_string(),
                duration_sec,
            });
        }
        Ok(Self {
            duration_sec,
            interval_sec: params.sample_interval_sec.clamp(1, duration_sec),
            start_pressure_bar: dive.start_pressure_bar,
            end_pressure_bar: dive.end_pressure_bar,
            shape: DepthShape::new(dive, duration_sec as f64, params),
        })
    }

    pub fn duration_sec(&self) -> i64 {
        self.duration_sec
    }

    /// Second at which max depth is first reached.
    pub fn descent_end_sec(&self) -> f64 {
        self.shape.descent_end
    }

    pub fn ascent_start_sec(&self) -> f64 {
        self.shape.ascent_start
    }

    /// `(arrive, leave)` seconds of the safety stop, when the dive has one.
    pub fn safety_stop_window(&self) -> Option<(f64, f64)> {
        self.shape.stop.map(|s| (s.arrive, s.leave))
    }

    pub fn depth_at(&self, elapsed_sec: f64) -> f64 {
        self.shape.depth_at(elapsed_sec)
    }

    pub fn pressure_at(&self, elapsed_sec: f64) -> f64 {
        let duration = self.duration_sec as f64;
        if elapsed_sec <= 0.0 {
            self.start_pressure_bar
        } else if elapsed_sec >= duration {
            self.end_pressure_bar
        } else {
            lerp(self.start_pressure_bar, self.end_pressure_bar, elapsed_sec / duration)
        }
    }

    /// Number of points each sequence yields.
    pub fn point_count(&self) -> usize {
        points_from(0, self.duration_sec, self.interval_sec)
    }

    pub fn depth_points(&self) -> ProfilePoints<'_> {
        ProfilePoints::new(self, Curve::Depth)
    }

    pub fn pressure_points(&self) -> ProfilePoints<'_> {
        ProfilePoints::new(self, Curve::Pressure)
    }

    fn value_at(&self, curve: Curve, elapsed_sec: f64) -> f64 {
        match curve {
            Curve::Depth => self.depth_at(elapsed_sec),
            Curve::Pressure => self.pressure_at(elapsed_sec),
        }
    }
}

fn points_from(t: i64, duration: i64, interval: i64) -> usize {
    if t >= duration {
        return 1;
    }
    let remaining = duration - t;
    ((remaining - 1) / interval) as usize + 2
}

/// Evenly spaced points from `0` to the dive duration. The final point
/// always lands exactly on the duration.
#[derive(Debug, Clone)]
pub struct ProfilePoints<'a> {
    profile: &'a SynthesizedProfile,
    curve: Curve,
    next_t: Option<i64>,
}

impl<'a> ProfilePoints<'a> {
    fn new(profile: &'a SynthesizedProfile, curve: Curve) -> Self {
        Self {
            profile,
            curve,
            next_t: Some(0),
        }
    }
}

impl Iterator for ProfilePoints<'_> {
    type Item = ProfilePoint;

    fn next(&mut self) -> Option<ProfilePoint> {
        let t = self.next_t?;
        let duration = self.profile.duration_sec;
        self.next_t = if t >= duration {
            None
        } else {
            Some((t + self.profile.interval_sec).min(duration))
        };
        Some(ProfilePoint {
            elapsed_sec: t,
            value: self.profile.value_at(self.curve, t as f64),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next_t {
            Some(t) => points_from(t, self.profile.duration_sec, self.profile.interval_sec),
            None => 0,
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ProfilePoints<'_> {}
