//! Interval merger, marker, and suppressor (SPEC_FULL.md §4.8), grounded on
//! `geo_data.hpp`'s `IntervalMarker` class in the reference implementation:
//! sort-and-sweep merge of overlapping intervals, then a single
//! pointer-walk that tags each sample with its covering interval.

use std::rc::Rc;

use crate::data::sample::{Interval, IntervalKind};
use crate::data::trace::Trace;

/// Sort by `(left, right)` and merge any interval that starts at or before
/// the current merge-end into it, unioning tag sets.
fn merge(mut intervals: Vec<Interval>) -> Vec<Interval> {
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|iv| (iv.left, iv.right));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    let mut iter = intervals.into_iter();
    let mut current = iter.next().unwrap();

    for next in iter {
        if next.left <= current.right {
            current.right = current.right.max(next.right);
            for tag in next.tags {
                if !current.tags.contains(&tag) {
                    current.tags.push(tag);
                }
            }
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    merged
}

/// Merge critical and privacy intervals independently, then walk the trace
/// once assigning `sample.interval`. A sample already covered by a critical
/// interval is never overwritten by a privacy interval.
pub fn mark(trace: &mut Trace, critical: Vec<Interval>, privacy: Vec<Interval>) {
    let critical = merge(critical);
    let privacy = merge(privacy);

    assign(trace, &critical);
    assign_if_unset(trace, &privacy);
}

fn assign(trace: &mut Trace, sorted_merged: &[Interval]) {
    let mut cursor = 0;
    for sample in trace.samples.iter_mut() {
        while cursor < sorted_merged.len() && sorted_merged[cursor].right <= sample.index {
            cursor += 1;
        }
        if cursor < sorted_merged.len() && sorted_merged[cursor].contains(sample.index) {
            sample.interval = Some(Rc::new(sorted_merged[cursor].clone()));
        }
    }
}

fn assign_if_unset(trace: &mut Trace, sorted_merged: &[Interval]) {
    let mut cursor = 0;
    for sample in trace.samples.iter_mut() {
        while cursor < sorted_merged.len() && sorted_merged[cursor].right <= sample.index {
            cursor += 1;
        }
        if sample.interval.is_some() {
            continue;
        }
        if cursor < sorted_merged.len() && sorted_merged[cursor].contains(sample.index) {
            sample.interval = Some(Rc::new(sorted_merged[cursor].clone()));
        }
    }
}

/// Counts used for the batch runner's aggregate report (SPEC_FULL.md §4.9):
/// how many of this trace's samples ended up suppressed by each interval
/// kind, after marking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuppressionStats {
    pub critical_samples: u64,
    pub privacy_samples: u64,
}

pub fn suppression_stats(trace: &Trace) -> SuppressionStats {
    let mut stats = SuppressionStats::default();
    for sample in &trace.samples {
        match sample.interval.as_deref().map(|iv| iv.kind) {
            Some(IntervalKind::Critical) => stats.critical_samples += 1,
            Some(IntervalKind::Privacy) => stats.privacy_samples += 1,
            None => {}
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{Sample, SampleErrorKind};
    use crate::data::trace::TraceStats;
    use crate::geo::Point;

    fn sample(idx: usize) -> Sample {
        Sample {
            uid: "u".into(),
            index: idx,
            raw_index: idx,
            timestamp: idx as i64,
            point: Point::new(0.0, 0.0),
            azimuth: None,
            speed: 0.0,
            record: format!("row{}", idx),
            valid: true,
            error_kind: SampleErrorKind::None,
            matched_edge: None,
            fit_edge: None,
            is_explicit_fit: false,
            interval: None,
            out_degree: 0,
        }
    }

    fn trace(n: usize) -> Trace {
        Trace {
            uid: "u".into(),
            samples: (0..n).map(sample).collect(),
            stats: TraceStats::default(),
        }
    }

    #[test]
    fn overlapping_intervals_merge_tags() {
        let merged = merge(vec![
            Interval::new(0, 3, IntervalKind::Critical, "stop"),
            Interval::new(2, 5, IntervalKind::Critical, "ta"),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].left, 0);
        assert_eq!(merged[0].right, 5);
        assert!(merged[0].tags.contains(&"stop".to_string()));
        assert!(merged[0].tags.contains(&"ta".to_string()));
    }

    #[test]
    fn critical_wins_over_privacy_on_collision() {
        let mut t = trace(5);
        let critical = vec![Interval::new(1, 3, IntervalKind::Critical, "stop")];
        let privacy = vec![Interval::new(0, 4, IntervalKind::Privacy, "min")];
        mark(&mut t, critical, privacy);

        assert_eq!(t.samples[0].interval.as_ref().unwrap().kind, IntervalKind::Privacy);
        assert_eq!(t.samples[1].interval.as_ref().unwrap().kind, IntervalKind::Critical);
        assert_eq!(t.samples[2].interval.as_ref().unwrap().kind, IntervalKind::Critical);
        assert_eq!(t.samples[3].interval.as_ref().unwrap().kind, IntervalKind::Privacy);
        assert!(t.samples[4].interval.is_none());
    }

    #[test]
    fn suppression_emits_only_unsuppressed_samples() {
        let mut t = trace(4);
        mark(&mut t, vec![Interval::new(1, 2, IntervalKind::Critical, "stop")], vec![]);
        let kept: Vec<usize> = t.samples.iter().filter(|s| !s.is_suppressed()).map(|s| s.index).collect();
        assert_eq!(kept, vec![0, 2, 3]);
    }
}
