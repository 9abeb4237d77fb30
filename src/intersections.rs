//! Intersection counter (SPEC_FULL.md §4.5): cumulative out-degree
//! annotation along a trace, derived from the road graph's
//! successor/neighbor adjacency built in `graph::RoadGraph`.

use crate::data::trace::Trace;
use crate::graph::road::VertexId;
use crate::graph::RoadGraph;

/// Walk `trace` in order, crediting a vertex's `out_degree - 1` to the
/// running cumulative each time the fit edge changes between two
/// explicitly-fit samples and the shared vertex differs from the last one
/// credited. Every sample (explicit or not) is annotated with the current
/// cumulative value, so it is non-decreasing along the whole trace.
pub fn annotate(trace: &mut Trace, graph: &RoadGraph) {
    let mut cumulative: u64 = 0;
    let mut last_credited: Option<VertexId> = None;
    let mut prev_explicit_edge = None;

    for sample in trace.samples.iter_mut() {
        if sample.is_explicit_fit {
            let cur_edge = sample.fit_edge;
            if let (Some(prev), Some(cur)) = (prev_explicit_edge, cur_edge) {
                if prev != cur {
                    if let Some(v) = graph.shared_vertex(prev, cur) {
                        if Some(v) != last_credited {
                            let od = graph.out_degree_at_target(prev);
                            cumulative += od.saturating_sub(1) as u64;
                            last_credited = Some(v);
                        }
                    }
                }
            }
            prev_explicit_edge = cur_edge;
        }
        sample.out_degree = cumulative;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sample::{Sample, SampleErrorKind};
    use crate::data::trace::TraceStats;
    use crate::geo::Point;
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

    fn sample(idx: usize, edge: Option<u32>, explicit: bool) -> crate::data::sample::Sample {
        Sample {
            uid: "u".into(),
            index: idx,
            raw_index: idx,
            timestamp: idx as i64,
            point: Point::new(0.0, 0.0),
            azimuth: None,
            speed: 0.0,
            record: String::new(),
            valid: true,
            error_kind: SampleErrorKind::None,
            matched_edge: edge,
            fit_edge: edge,
            is_explicit_fit: explicit,
            interval: None,
            out_degree: 0,
        }
    }

    #[test]
    fn out_degree_is_non_decreasing_and_credits_once_per_vertex() {
        // A 3-way intersection: road1 (1->2), road2 (2->3), road3 (2->4).
        let r1 = road(1, 1, 2, vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0)]);
        let r2 = road(2, 2, 3, vec![Point::new(1.0, 0.0), Point::new(2.0, 0.0)]);
        let r3 = road(3, 2, 4, vec![Point::new(1.0, 0.0), Point::new(1.0, 1.0)]);
        let graph = RoadGraph::build(vec![r1, r2, r3]).unwrap();

        // forward edges: road1->2, road2->4, road3->6
        let mut trace = Trace {
            uid: "u".into(),
            samples: vec![
                sample(0, Some(2), true),
                sample(1, Some(2), true),
                sample(2, Some(4), true),
                sample(3, Some(4), true),
            ],
            stats: TraceStats::default(),
        };
        annotate(&mut trace, &graph);
        let degrees: Vec<u64> = trace.samples.iter().map(|s| s.out_degree).collect();
        for w in degrees.windows(2) {
            assert!(w[1] >= w[0]);
        }
        assert!(degrees[3] > degrees[0]);
    }
}
