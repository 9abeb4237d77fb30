//! Bounded Dijkstra route cost between two road points, used by the HMM
//! transition probability (SPEC_FULL.md §4.3). Grounded on `Router::route`/
//! `Router::route_cost` in the reference `hmm_mm.cpp`: edges are weighted
//! by a time cost, expansion is bounded by cumulative *distance* rather
//! than cost, and the two run on separate accumulators per edge.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::graph::{EdgeId, RoadGraph};

const MAX_HEURISTIC_SPEED_KMH: f64 = 130.0;
const MIN_HEURISTIC_PRIORITY: f64 = 1.0;
/// Quantization applied before pushing costs onto an integer-keyed heap,
/// following the teacher's `BinaryHeap<Reverse<(u32, u32)>>` idiom for
/// float-weighted Dijkstra (`tools/butterfly-route/src/nbg_ch/query.rs`).
const COST_SCALE: f64 = 1_000.0;

/// Time, in seconds, to traverse `edge` at its capped max speed, penalised
/// by its routing priority. `length(e) * 3.6 / min(maxspeed(e), 130) *
/// max(1.0, priority(e))`.
pub fn time_cost(graph: &RoadGraph, edge: EdgeId) -> f64 {
    let e = graph.edge(edge);
    let speed = e.maxspeed.min(MAX_HEURISTIC_SPEED_KMH).max(1e-6);
    e.length() * 3.6 / speed * e.priority.max(MIN_HEURISTIC_PRIORITY)
}

fn quantize(cost: f64) -> u64 {
    (cost.max(0.0) * COST_SCALE).round() as u64
}

/// A least-time path from `(source_edge, source_fraction)` to
/// `(target_edge, target_fraction)`, plus its time cost.
pub struct Route {
    pub path: Vec<EdgeId>,
    pub cost: f64,
}

/// Bounded single-target Dijkstra over the edge arena: expand successors in
/// non-decreasing time-cost order, bounded by cumulative traversed
/// *distance* `max_dist` meters. Mirrors the reference's `bounding_cost`
/// early-exit; unlike the reference's shared multi-target search (an
/// implementation-level batching optimisation), this runs one search per
/// candidate pair, which is affordable given the small candidate counts
/// `minset` produces per sample.
pub fn route(
    graph: &RoadGraph,
    source_edge: EdgeId,
    source_fraction: f64,
    target_edge: EdgeId,
    target_fraction: f64,
    max_dist: f64,
) -> Option<Route> {
    let mut best_cost: HashMap<EdgeId, f64> = HashMap::new();
    let mut best_bound: HashMap<EdgeId, f64> = HashMap::new();
    let mut pred: HashMap<EdgeId, EdgeId> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(u64, EdgeId)>> = BinaryHeap::new();

    let start_cost = time_cost(graph, source_edge) * (1.0 - source_fraction);
    let start_bound = graph.edge(source_edge).length() * (1.0 - source_fraction);
    best_cost.insert(source_edge, start_cost);
    best_bound.insert(source_edge, start_bound);
    heap.push(Reverse((quantize(start_cost), source_edge)));

    while let Some(Reverse((qcost, current))) = heap.pop() {
        let cost = best_cost[&current];
        if quantize(cost) != qcost {
            continue; // stale entry, a cheaper one was already processed
        }
        let bound = best_bound[&current];

        if current == target_edge {
            let tc = time_cost(graph, current);
            let reach_cost = cost - tc * (1.0 - target_fraction);
            let reach_bound = bound - graph.edge(current).length() * (1.0 - target_fraction);
            if reach_bound > max_dist {
                return None;
            }
            let mut path = vec![current];
            let mut cur = current;
            while let Some(&p) = pred.get(&cur) {
                path.push(p);
                cur = p;
            }
            path.reverse();
            return Some(Route { path, cost: reach_cost });
        }

        if bound > max_dist {
            continue; // do not expand further along this branch
        }

        for next in graph.out_edges(current) {
            let new_cost = cost + time_cost(graph, next);
            let new_bound = bound + graph.edge(next).length();
            let better = best_cost.get(&next).map_or(true, |&c| new_cost < c);
            if better {
                best_cost.insert(next, new_cost);
                best_bound.insert(next, new_bound);
                pred.insert(next, current);
                heap.push(Reverse((quantize(new_cost), next)));
            }
        }
    }

    None
}

/// Sum of `time_cost` along `route`'s edges, minus the unwalked tail.
/// `route_cost` already returns this value directly; `route_cost_raw` is
/// exposed for tests and for recomputing cost after `shorten_turn`.
pub fn route_cost_raw(graph: &RoadGraph, path: &[EdgeId]) -> f64 {
    path.iter().map(|&e| time_cost(graph, e)).sum()
}

/// If `shorten_turns` collapses a trailing U-turn on a single road (the
/// path's last two edges are the two directions of the same road), drop
/// the return leg and subtract its cost.
pub fn shorten_turn(graph: &RoadGraph, path: &mut Vec<EdgeId>, cost: &mut f64) {
    if path.len() < 2 {
        return;
    }
    let last = path[path.len() - 1];
    let penultimate = path[path.len() - 2];
    let last_e = graph.edge(last);
    let penult_e = graph.edge(penultimate);
    if last != penultimate && last_e.road_id.is_some() && last_e.road_id == penult_e.road_id {
        *cost -= time_cost(graph, last);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn chain_graph() -> RoadGraph {
        let r1 = road(1, 1, 2, vec![Point::new(-83.93, 35.96), Point::new(-83.92, 35.96)]);
        let r2 = road(2, 2, 3, vec![Point::new(-83.92, 35.96), Point::new(-83.91, 35.96)]);
        RoadGraph::build(vec![r1, r2]).unwrap()
    }

    #[test]
    fn routes_forward_across_shared_vertex() {
        let g = chain_graph();
        // forward edges: road1 -> id 2, road2 -> id 4.
        let r = route(&g, 2, 0.5, 4, 0.5, 5000.0).expect("should route");
        assert_eq!(r.path.first().copied(), Some(2));
        assert_eq!(r.path.last().copied(), Some(4));
        assert!(r.cost > 0.0);
    }

    #[test]
    fn bound_too_small_fails() {
        let g = chain_graph();
        let r = route(&g, 2, 0.5, 4, 0.5, 1.0);
        assert!(r.is_none());
    }

    #[test]
    fn same_edge_ahead_is_direct() {
        let g = chain_graph();
        let r = route(&g, 2, 0.1, 2, 0.9, 5000.0).expect("direct on same edge");
        assert_eq!(r.path, vec![2]);
    }
}
