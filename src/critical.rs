//! Critical-interval detectors (SPEC_FULL.md §4.6): start/end markers, the
//! stop detector, and the turn-around detector. Grounded on
//! `cvdi.hpp`/`cvdi.cpp`'s `StopFinder`/`TAFinder` classes in the
//! reference implementation; ported here as index-based queues per
//! SPEC_FULL.md §9 Design Notes instead of iterator deques.

use std::collections::VecDeque;

use crate::area::Area;
use crate::data::sample::{Interval, IntervalKind};
use crate::data::trace::Trace;
use crate::geo;
use crate::graph::edge::EdgeId;
use crate::graph::RoadGraph;

/// Default blacklist of highway classes the stop detector ignores
/// (motorway, motorway_link, trunk, trunk_link, primary, primary_link),
/// matching the class ids assigned in SPEC_FULL.md's road-network loader.
pub const DEFAULT_STOP_BLACKLIST: [i32; 6] = [1, 2, 3, 4, 5, 6];

/// `[0,1)` tagged `start_pt` and `[N-1,N)` tagged `end_pt`, both type
/// `Critical`. For a one-sample trace both cover `[0,1)` and later merge.
pub fn start_end(trace: &Trace) -> Vec<Interval> {
    let n = trace.len();
    if n == 0 {
        return Vec::new();
    }
    vec![
        Interval::new(0, 1, IntervalKind::Critical, "start_pt"),
        Interval::new(n - 1, n, IntervalKind::Critical, "end_pt"),
    ]
}

#[derive(Debug, Clone)]
pub struct StopDetectorConfig {
    pub max_time_us: i64,
    pub min_distance: f64,
    pub max_speed: f64,
    pub blacklist_classes: Vec<i32>,
}

impl Default for StopDetectorConfig {
    fn default() -> Self {
        StopDetectorConfig {
            max_time_us: 1_000_000,
            min_distance: 50.0,
            max_speed: 2.5,
            blacklist_classes: DEFAULT_STOP_BLACKLIST.to_vec(),
        }
    }
}

fn stop_eligible(sample: &crate::data::sample::Sample, graph: &RoadGraph, cfg: &StopDetectorConfig) -> bool {
    if sample.speed >= cfg.max_speed {
        return false;
    }
    if sample.is_explicit_fit {
        if let Some(edge) = sample.fit_edge {
            if cfg.blacklist_classes.contains(&graph.edge(edge).class_id) {
                return false;
            }
        }
    }
    true
}

/// Sliding window of eligible sample indices: push back, and whenever the
/// window's time span exceeds `max_time`, either emit a stop (straight-line
/// span within `min_distance`) or shrink the window from the front.
pub fn detect_stops(trace: &Trace, graph: &RoadGraph, cfg: &StopDetectorConfig) -> Vec<Interval> {
    let mut intervals = Vec::new();
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut i = 0;

    while i < trace.len() {
        let sample = &trace.samples[i];
        if !stop_eligible(sample, graph, cfg) {
            i += 1;
            continue;
        }

        queue.push_back(i);

        loop {
            let front = *queue.front().unwrap();
            let back = *queue.back().unwrap();
            let dt = trace.samples[back].timestamp - trace.samples[front].timestamp;
            if dt <= cfg.max_time_us {
                break;
            }

            let cover = geo::distance(trace.samples[front].point, trace.samples[back].point);
            if cover <= cfg.min_distance {
                intervals.push(Interval::new(front, back + 1, IntervalKind::Critical, "stop"));
                queue.clear();
                break;
            }

            while queue.len() > 1 {
                let f = *queue.front().unwrap();
                let b = *queue.back().unwrap();
                if geo::distance(trace.samples[f].point, trace.samples[b].point) > cfg.min_distance {
                    queue.pop_front();
                } else {
                    break;
                }
            }
            while let Some(&f) = queue.front() {
                if !stop_eligible(&trace.samples[f], graph, cfg) {
                    queue.pop_front();
                } else {
                    break;
                }
            }
            if queue.is_empty() {
                break;
            }
        }

        i += 1;
    }

    intervals
}

#[derive(Debug, Clone)]
pub struct TurnAroundConfig {
    pub max_q: usize,
    pub area_width: f64,
    pub max_speed: f64,
    pub heading_delta: f64,
}

impl Default for TurnAroundConfig {
    fn default() -> Self {
        TurnAroundConfig {
            max_q: 20,
            area_width: 30.0,
            max_speed: 100.0,
            heading_delta: 90.0,
        }
    }
}

struct QueueEntry {
    area: Area,
    index: usize,
}

/// Tracks explicit-fit areas recently left behind, and flags either a
/// heading reversal on re-entering explicit fit (`ta_fit`) or driving back
/// into a previously-visited area while still unmatched (`ta`).
pub fn detect_turnarounds(trace: &Trace, graph: &RoadGraph, cfg: &TurnAroundConfig) -> Vec<Interval> {
    let mut intervals = Vec::new();
    let mut deque: VecDeque<QueueEntry> = VecDeque::new();
    let mut fit_exit: Option<(usize, f64)> = None;
    let mut prev_explicit: Option<(EdgeId, usize)> = None;
    let mut was_explicit = false;

    for (i, sample) in trace.samples.iter().enumerate() {
        let explicit = sample.is_explicit_fit;

        if was_explicit && !explicit {
            let exit_az = trace.samples[i - 1].azimuth.unwrap_or(0.0);
            fit_exit = Some((i - 1, exit_az));
        }

        if !was_explicit && explicit {
            if let Some((exit_idx, exit_az)) = fit_exit.take() {
                if let Some(az) = sample.azimuth {
                    if geo::heading_delta(az, exit_az) >= cfg.heading_delta {
                        intervals.push(Interval::new(exit_idx, i, IntervalKind::Critical, "ta_fit"));
                    }
                }
            }
        }

        if explicit {
            let edge = sample.fit_edge.expect("explicit fit implies a fit edge");
            match prev_explicit {
                Some((pe, pidx)) if pe != edge => {
                    let area = Area::for_edge(&graph.edge(pe).line_string, cfg.area_width, 0.0);
                    deque.push_back(QueueEntry { area, index: pidx });
                    while deque.len() > cfg.max_q {
                        deque.pop_front();
                    }
                    prev_explicit = Some((edge, i));
                }
                None => prev_explicit = Some((edge, i)),
                _ => {}
            }
        } else if deque.len() > 1 {
            let most_recent = deque.len() - 1;
            let mut hit = None;
            for (qi, entry) in deque.iter().enumerate() {
                if qi == most_recent {
                    continue;
                }
                if entry.area.contains(sample.point) && sample.speed < cfg.max_speed {
                    hit = Some(entry.index);
                    break;
                }
            }
            if let Some(from_idx) = hit {
                intervals.push(Interval::new(from_idx, i, IntervalKind::Critical, "ta"));
                deque.clear();
            }
        }

        was_explicit = explicit;
    }

    intervals
}
