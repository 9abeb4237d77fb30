//! Hidden Markov Model map matcher (SPEC_FULL.md §4.3), grounded on the
//! reference `hmm_mm.cpp`'s `RoadMap::candidates`/`transitions` and
//! `Matcher::map_match`, restructured per SPEC_FULL.md §9 Design Notes as
//! two trellis layers plus a back-pointer array instead of ref-counted
//! `RoadPoint` chains.

pub mod router;

use std::collections::HashMap;

use crate::data::sample::Sample;
use crate::data::trace::Trace;
use crate::geo::{self, Point};
use crate::graph::edge::Heading;
use crate::graph::{EdgeId, RoadGraph};

/// Tunable matcher parameters (SPEC_FULL.md §4.3, §6).
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// GPS noise std-dev in meters (`sigma` in the emission model).
    pub sigma_z: f64,
    /// Heading noise std-dev in degrees, fixed at 10.0 per spec.
    pub sigma_a: f64,
    /// Candidate search radius in meters.
    pub radius: f64,
    /// Route cost decay; `0.0` means `beta = max(1, dt_seconds)`.
    pub lambda: f64,
    /// `D_max`: the outer cap on the route-search distance bound.
    pub max_route_distance: f64,
    pub shorten_turns: bool,
    /// Minimum distance (m) to the last accepted sample before a new one
    /// is considered (keeps the model "warm" on near-duplicate fixes).
    pub min_sample_distance: f64,
    /// Minimum elapsed time (microseconds) before a new sample is
    /// considered, same intent as `min_sample_distance`.
    pub min_sample_time_us: i64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            sigma_z: 10.0,
            sigma_a: 10.0,
            radius: 200.0,
            lambda: 0.0,
            max_route_distance: 15_000.0,
            shorten_turns: true,
            min_sample_distance: 0.0,
            min_sample_time_us: 0,
        }
    }
}

#[derive(Debug, Clone)]
struct RawCandidate {
    edge: EdgeId,
    fraction: f64,
    point: Point,
    azimuth: f64,
}

#[derive(Debug, Clone)]
struct CandState {
    edge: EdgeId,
    fraction: f64,
    point: Point,
    azimuth: f64,
    filter_prob: f64,
    seq_prob: f64,
    predecessor: Option<usize>,
}

fn gaussian(d: f64, sigma: f64) -> f64 {
    let sig2 = sigma * sigma;
    (1.0 / (2.0 * std::f64::consts::PI * sig2).sqrt()) * (-(d * d) / (2.0 * sig2)).exp()
}

fn emission_prob(sample: &Sample, candidate: &RawCandidate, cfg: &MatcherConfig) -> f64 {
    let dz = geo::distance(sample.point, candidate.point);
    let mut p = gaussian(dz, cfg.sigma_z);
    if let Some(az) = sample.azimuth {
        let da = geo::heading_delta(az, candidate.azimuth);
        p *= gaussian(da, cfg.sigma_a).max(0.01);
    }
    p
}

/// `radius` + `minset`, then the predecessor-preference swap described in
/// SPEC_FULL.md §4.3: a predecessor candidate on the same edge, ahead of
/// the raw candidate in the direction of travel and within `sigma_z` of
/// its geometry, takes the raw candidate's place.
fn generate_candidates(
    graph: &RoadGraph,
    sample: &Sample,
    predecessors: &[CandState],
    cfg: &MatcherConfig,
) -> Vec<RawCandidate> {
    let found = graph.radius(sample.point, cfg.radius);
    let min = graph.minset(&found);

    let mut by_edge: HashMap<EdgeId, RawCandidate> = HashMap::with_capacity(min.len());
    for c in &min {
        let edge = graph.edge(c.edge);
        let point = geo::interpolate_line(&edge.line_string, c.fraction);
        let azimuth = geo::heading_at_fraction(&edge.line_string, c.fraction);
        by_edge.insert(
            c.edge,
            RawCandidate {
                edge: c.edge,
                fraction: c.fraction,
                point,
                azimuth,
            },
        );
    }

    if !predecessors.is_empty() {
        for pred in predecessors {
            let Some(rc) = by_edge.get(&pred.edge) else {
                continue;
            };
            let is_better_distance = geo::distance(rc.point, pred.point) < cfg.sigma_z;
            let heading = graph.edge(pred.edge).heading;
            let is_ahead = match heading {
                Heading::Forward => rc.fraction < pred.fraction,
                Heading::Backward => rc.fraction > pred.fraction,
            };
            if is_better_distance && is_ahead {
                by_edge.insert(
                    pred.edge,
                    RawCandidate {
                        edge: pred.edge,
                        fraction: pred.fraction,
                        point: pred.point,
                        azimuth: pred.azimuth,
                    },
                );
            }
        }
    }

    by_edge.into_values().collect()
}

/// Fresh-start layer: filter/sequence probability from emission alone,
/// candidates with zero emission dropped (no predecessor to transition
/// from, so there is nothing else to rank them by).
fn emission_only_layer(raw: &[RawCandidate], sample: &Sample, cfg: &MatcherConfig) -> Vec<CandState> {
    let mut out = Vec::with_capacity(raw.len());
    let mut norm = 0.0;
    for rc in raw {
        let emission = emission_prob(sample, rc, cfg);
        if emission <= 0.0 {
            continue;
        }
        norm += emission;
        out.push(CandState {
            edge: rc.edge,
            fraction: rc.fraction,
            point: rc.point,
            azimuth: rc.azimuth,
            filter_prob: emission,
            seq_prob: emission.ln(),
            predecessor: None,
        });
    }
    if norm > 0.0 {
        for c in out.iter_mut() {
            c.filter_prob /= norm;
        }
    }
    out
}

/// One Viterbi step: emission x transition from every predecessor
/// candidate, argmax sequence probability, filter probability normalised
/// to sum to 1. Returns `None` if no candidate has a surviving transition
/// (a matcher break, SPEC_FULL.md §4.3).
fn viterbi_step(
    graph: &RoadGraph,
    predecessors: &[CandState],
    raw: &[RawCandidate],
    sample: &Sample,
    predecessor_sample: &Sample,
    cfg: &MatcherConfig,
) -> Option<Vec<CandState>> {
    let dt_seconds = ((sample.timestamp - predecessor_sample.timestamp) as f64 / 1_000_000.0).max(0.0);
    let bound = (cfg.max_route_distance.min(dt_seconds * 100.0)).max(1000.0);
    let beta = if cfg.lambda == 0.0 {
        dt_seconds.max(1.0)
    } else {
        1.0 / cfg.lambda
    };

    let mut next_layer = Vec::with_capacity(raw.len());
    for rc in raw {
        let emission = emission_prob(sample, rc, cfg);
        let mut best_seq = f64::NEG_INFINITY;
        let mut best_pred = None;
        let mut filter_sum = 0.0;

        for (pi, pred) in predecessors.iter().enumerate() {
            let Some(mut r) = router::route(graph, pred.edge, pred.fraction, rc.edge, rc.fraction, bound) else {
                continue;
            };
            if cfg.shorten_turns {
                router::shorten_turn(graph, &mut r.path, &mut r.cost);
            }
            let transition_prob = (1.0 / beta) * (-r.cost / beta).exp();
            if transition_prob <= 0.0 {
                continue;
            }
            filter_sum += transition_prob * pred.filter_prob;
            if emission <= 0.0 {
                continue;
            }
            let seq = pred.seq_prob + transition_prob.ln() + emission.ln();
            if seq > best_seq {
                best_seq = seq;
                best_pred = Some(pi);
            }
        }

        let Some(best_pred) = best_pred else {
            continue;
        };
        let filter_prob = filter_sum * emission;
        if filter_prob <= 0.0 {
            continue;
        }
        next_layer.push(CandState {
            edge: rc.edge,
            fraction: rc.fraction,
            point: rc.point,
            azimuth: rc.azimuth,
            filter_prob,
            seq_prob: best_seq,
            predecessor: Some(best_pred),
        });
    }

    if next_layer.is_empty() {
        return None;
    }
    let norm: f64 = next_layer.iter().map(|c| c.filter_prob).sum();
    if norm > 0.0 {
        for c in next_layer.iter_mut() {
            c.filter_prob /= norm;
        }
    }
    Some(next_layer)
}

struct Segment {
    layers: Vec<Vec<CandState>>,
    layer_sample_idx: Vec<usize>,
}

/// Build one HMM run starting at `start`, stopping on a break or at the end
/// of the trace. Returns the finished segment (possibly empty, if no
/// sample from `start` onward ever produced a candidate) and the trace
/// index to resume scanning from.
fn build_segment(trace: &Trace, graph: &RoadGraph, cfg: &MatcherConfig, start: usize) -> (Segment, usize) {
    let mut layers: Vec<Vec<CandState>> = Vec::new();
    let mut layer_sample_idx: Vec<usize> = Vec::new();
    let mut last_accepted: Option<(Point, i64)> = None;
    let mut idx = start;

    while idx < trace.len() {
        let sample = &trace.samples[idx];
        if !sample.valid {
            idx += 1;
            continue;
        }
        if let Some((plast, tlast)) = last_accepted {
            let too_close = geo::distance(sample.point, plast) < cfg.min_sample_distance.max(0.0);
            let too_soon = sample.timestamp - tlast < cfg.min_sample_time_us.max(0);
            if too_close || too_soon {
                idx += 1;
                continue;
            }
        }

        let predecessor_layer: &[CandState] = layers.last().map(|v| v.as_slice()).unwrap_or(&[]);
        let raw = generate_candidates(graph, sample, predecessor_layer, cfg);

        if raw.is_empty() {
            idx += 1;
            if layers.is_empty() {
                continue;
            }
            break;
        }

        if predecessor_layer.is_empty() {
            let layer = emission_only_layer(&raw, sample, cfg);
            if layer.is_empty() {
                idx += 1;
                continue;
            }
            layers.push(layer);
            layer_sample_idx.push(idx);
            last_accepted = Some((sample.point, sample.timestamp));
            idx += 1;
            continue;
        }

        let predecessor_sample = &trace.samples[*layer_sample_idx.last().unwrap()];
        match viterbi_step(graph, predecessor_layer, &raw, sample, predecessor_sample, cfg) {
            Some(layer) => {
                layers.push(layer);
                layer_sample_idx.push(idx);
                last_accepted = Some((sample.point, sample.timestamp));
                idx += 1;
            }
            None => break, // case A: retry from the same sample with a fresh model
        }
    }

    (
        Segment {
            layers,
            layer_sample_idx,
        },
        idx,
    )
}

fn backtrace_and_assign(trace: &mut Trace, segment: &Segment) {
    let Some(last_layer) = segment.layers.last() else {
        return;
    };
    let mut best_i = 0;
    let mut best_filter = f64::NEG_INFINITY;
    for (i, c) in last_layer.iter().enumerate() {
        if c.filter_prob > best_filter {
            best_filter = c.filter_prob;
            best_i = i;
        }
    }

    let mut layer_i = segment.layers.len() - 1;
    let mut cand_i = best_i;
    loop {
        let cand = &segment.layers[layer_i][cand_i];
        let sample_idx = segment.layer_sample_idx[layer_i];
        trace.samples[sample_idx].matched_edge = Some(cand.edge);
        match cand.predecessor {
            Some(p) => {
                cand_i = p;
                layer_i -= 1;
            }
            None => break,
        }
    }
}

/// Map-match every valid sample of `trace` against `graph`, assigning
/// `Sample::matched_edge` in place. Samples with `error_kind != None` are
/// skipped entirely and never receive a matched edge.
pub fn map_match(trace: &mut Trace, graph: &RoadGraph, cfg: &MatcherConfig) {
    let mut i = 0;
    while i < trace.len() {
        let (segment, next_i) = build_segment(trace, graph, cfg, i);
        if !segment.layers.is_empty() {
            backtrace_and_assign(trace, &segment);
        }
        i = if next_i > i { next_i } else { i + 1 };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::SampleErrorKind;
    use crate::graph::road::Road;

    fn road(gid: u64, source: i64, target: i64, pts: Vec<Point>) -> Road {
        Road {
            gid,
            osm_id: gid as i64,
            source,
            target,
            reverse: 0,
            class_id: 3,
            priority: 1.0,
            maxspeed_forward: 50.0,
            maxspeed_backward: 50.0,
            width: 7.0,
            excluded: false,
            line_string: pts,
            valid: true,
            error_msg: String::new(),
        }
    }

    fn straight_graph() -> RoadGraph {
        let r1 = road(1, 1, 2, vec![Point::new(-83.930, 35.960), Point::new(-83.920, 35.960)]);
        let r2 = road(2, 2, 3, vec![Point::new(-83.920, 35.960), Point::new(-83.910, 35.960)]);
        RoadGraph::build(vec![r1, r2]).unwrap()
    }

    fn sample(idx: usize, ts: i64, lon: f64, lat: f64, heading: f64) -> Sample {
        Sample {
            uid: "u".to_string(),
            index: idx,
            raw_index: idx,
            timestamp: ts,
            point: Point::new(lon, lat),
            azimuth: Some(heading),
            speed: 10.0,
            record: String::new(),
            valid: true,
            error_kind: SampleErrorKind::None,
            matched_edge: None,
            fit_edge: None,
            is_explicit_fit: false,
            interval: None,
            out_degree: 0,
        }
    }

    #[test]
    fn matches_samples_travelling_along_the_road() {
        let graph = straight_graph();
        let samples = vec![
            sample(0, 0, -83.929, 35.9601, 90.0),
            sample(1, 3_000_000, -83.924, 35.9601, 90.0),
            sample(2, 6_000_000, -83.915, 35.9601, 90.0),
        ];
        let mut trace = Trace {
            uid: "u".to_string(),
            samples,
            stats: Default::default(),
        };
        let cfg = MatcherConfig::default();
        map_match(&mut trace, &graph, &cfg);
        assert!(trace.samples.iter().all(|s| s.matched_edge.is_some()));
    }

    #[test]
    fn invalid_samples_never_get_matched() {
        let graph = straight_graph();
        let mut s = sample(0, 0, -83.929, 35.9601, 90.0);
        s.valid = false;
        s.error_kind = SampleErrorKind::Geo;
        let mut trace = Trace {
            uid: "u".to_string(),
            samples: vec![s],
            stats: Default::default(),
        };
        map_match(&mut trace, &graph, &MatcherConfig::default());
        assert!(trace.samples[0].matched_edge.is_none());
    }
}
