//! Photo-to-dive assignment by capture time.
//!
//! A photo belongs to the dive whose inclusive `[start, end]` window holds
//! its capture time. When windows overlap the dive with the earliest start
//! wins (then the lowest id).

use chrono::NaiveDateTime;

use crate::models::{DiveId, DiveRecord};
use crate::store::DiveRecordStore;

/// Dive windows sorted by start, with a running maximum of end times so a
/// lookup is two binary searches.
#[derive(Debug, Clone, Default)]
pub struct DiveIndex {
    windows: Vec<(NaiveDateTime, NaiveDateTime, DiveId)>,
    /// `reach[i]` is the latest end time among `windows[..=i]`.
    reach: Vec<NaiveDateTime>,
}

impl DiveIndex {
    pub fn new<'a>(dives: impl IntoIterator<Item = &'a DiveRecord>) -> Self {
        let mut windows: Vec<_> = dives
            .into_iter()
            .map(|d| (d.start_time(), d.end_time(), d.id))
            .collect();
        windows.sort_by(|a, b| a.0.cmp(&b.0).then(a.2.cmp(&b.2)));

        let mut reach = Vec::with_capacity(windows.len());
        let mut latest: Option<NaiveDateTime> = None;
        for (_, end, _) in &windows {
            let next = latest.map_or(*end, |l| l.max(*end));
            reach.push(next);
            latest = Some(next);
        }
        Self { windows, reach }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// The dive containing `t`, if any.
    pub fn locate(&self, t: NaiveDateTime) -> Option<DiveId> {
        // Candidates started at or before t.
        let started = self.windows.partition_point(|(start, _, _)| *start <= t);
        // First candidate whose window (or an earlier one) reaches t. Since
        // reach is monotonic, the first index where it reaches t is the
        // earliest-starting dive still open at t.
        let first = self.reach[..started].partition_point(|end| *end < t);
        self.windows.get(first).filter(|_| first < started).map(|w| w.2)
    }
}

/// Result of a correlation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrelationSummary {
    pub assigned: usize,
    pub unassigned: usize,
    /// Photos whose assignment differs from before the pass.
    pub changed: usize,
}

/// Recompute `assigned_dive` for every photo in the store.
pub fn correlate_photos(store: &mut DiveRecordStore) -> CorrelationSummary {
    let index = DiveIndex::new(store.dives());
    let mut summary = CorrelationSummary::default();

    for photo in store.photos_mut() {
        let assigned = index.locate(photo.capture_time);
        if assigned != photo.assigned_dive {
            summary.changed += 1;
            photo.assigned_dive = assigned;
        }
        match assigned {
            Some(_) => summary.assigned += 1,
            None => summary.unassigned += 1,
        }
    }

    tracing::debug!(
        dives = index.len(),
        assigned = summary.assigned,
        unassigned = summary.unassigned,
        changed = summary.changed,
        "photos correlated"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhotoAsset;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    fn dive(id: i64, start: NaiveDateTime, minutes: i64) -> DiveRecord {
        DiveRecord::new(DiveId(id), start, minutes * 60, "Bonaire").unwrap()
    }

    #[test]
    fn test_locate_inside_and_outside() {
        let dives = [dive(1, at(9, 0, 0), 50), dive(2, at(13, 0, 0), 40)];
        let index = DiveIndex::new(&dives);

        assert_eq!(index.locate(at(9, 25, 0)), Some(DiveId(1)));
        assert_eq!(index.locate(at(13, 39, 59)), Some(DiveId(2)));
        assert_eq!(index.locate(at(8, 59, 59)), None);
        assert_eq!(index.locate(at(11, 0, 0)), None);
        assert_eq!(index.locate(at(14, 0, 1)), None);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let dives = [dive(1, at(9, 0, 0), 50)];
        let index = DiveIndex::new(&dives);
        assert_eq!(index.locate(at(9, 0, 0)), Some(DiveId(1)));
        assert_eq!(index.locate(at(9, 50, 0)), Some(DiveId(1)));
        assert_eq!(index.locate(at(9, 50, 1)), None);
    }

    #[test]
    fn test_overlap_prefers_earliest_start() {
        // A long dive 5 overlapping a later short dive 2.
        let dives = [
            dive(2, at(9, 30, 0), 10),
            dive(5, at(9, 0, 0), 120),
            dive(7, at(12, 0, 0), 30),
        ];
        let index = DiveIndex::new(&dives);
        assert_eq!(index.locate(at(9, 35, 0)), Some(DiveId(5)));
        assert_eq!(index.locate(at(10, 30, 0)), Some(DiveId(5)));
        assert_eq!(index.locate(at(12, 10, 0)), Some(DiveId(7)));
    }

    #[test]
    fn test_overlap_skips_closed_earlier_dives() {
        // Dive 1 ends before t; dive 2 is still open and started before dive 3.
        let dives = [
            dive(1, at(9, 0, 0), 10),
            dive(2, at(9, 5, 0), 60),
            dive(3, at(9, 20, 0), 60),
        ];
        let index = DiveIndex::new(&dives);
        assert_eq!(index.locate(at(9, 30, 0)), Some(DiveId(2)));
        assert_eq!(index.locate(at(10, 10, 0)), Some(DiveId(3)));
    }

    #[test]
    fn test_same_start_prefers_lower_id() {
        let dives = [dive(9, at(9, 0, 0), 30), dive(4, at(9, 0, 0), 30)];
        let index = DiveIndex::new(&dives);
        assert_eq!(index.locate(at(9, 10, 0)), Some(DiveId(4)));
    }

    #[test]
    fn test_empty_index() {
        let index = DiveIndex::new(std::iter::empty());
        assert!(index.is_empty());
        assert_eq!(index.locate(at(9, 0, 0)), None);
    }

    #[test]
    fn test_correlate_store() {
        let mut store = DiveRecordStore::new();
        store
            .add_dives(vec![dive(1, at(9, 0, 0), 50), dive(2, at(13, 0, 0), 40)])
            .unwrap();
        store
            .add_photos(
                "Bonaire",
                vec![
                    PhotoAsset::new("/p/1.jpg", at(9, 10, 0)),
                    PhotoAsset::new("/p/2.jpg", at(13, 40, 0)),
                    PhotoAsset::new("/p/3.jpg", at(11, 0, 0)),
                ],
            )
            .unwrap();

        let summary = correlate_photos(&mut store);
        assert_eq!(
            summary,
            CorrelationSummary {
                assigned: 2,
                unassigned: 1,
                changed: 2
            }
        );
        assert_eq!(store.photos_for_dive(DiveId(2)).len(), 1);

        // Idempotent.
        assert_eq!(correlate_photos(&mut store).changed, 0);

        store.remove_dive(DiveId(2)).unwrap();
        let summary = correlate_photos(&mut store);
        assert_eq!(summary.changed, 1);
        assert!(store.photos_for_dive(DiveId(2)).is_empty());
    }
}
