//! The road graph: an arena of directed `Edge`s split from `Road`s, wired
//! into successor/neighbor adjacency lists, backed by an R-tree spatial
//! index keyed by each road's bounding rectangle.

pub mod edge;
pub mod road;

use std::collections::HashMap;

use rstar::{RTree, RTreeObject, AABB};

use crate::error::{AppError, Result};
use crate::geo::{self, Point};
pub use edge::{Edge, EdgeId, Heading, IMPLICIT_TYPE};
pub use road::{Road, RoadId, VertexId};

/// A candidate road point produced by a spatial-index query: a position on
/// an edge plus its distance from the query point.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub edge: EdgeId,
    pub fraction: f64,
    pub distance: f64,
}

struct IndexedRoad {
    road_idx: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRoad {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

pub struct RoadGraph {
    roads: Vec<Road>,
    edges: Vec<Edge>,
    /// edge id -> position in `edges`. Ids are `2*gid`/`2*gid+1`
    /// (SPEC_FULL.md §3) and are neither contiguous nor arena-position-
    /// aligned in general, so lookups always go through this map rather
    /// than indexing `edges` directly by id.
    edge_pos: HashMap<EdgeId, usize>,
    /// road index -> the edge ids split from it, forward first.
    road_edges: Vec<Vec<EdgeId>>,
    index: RTree<IndexedRoad>,
}

impl RoadGraph {
    /// Build the graph from a list of roads. Roads that are invalid or
    /// excluded are skipped entirely (never appear in the graph or index).
    pub fn build(roads: Vec<Road>) -> Result<Self> {
        let mut edges: Vec<Edge> = Vec::new();
        let mut road_edges: Vec<Vec<EdgeId>> = Vec::with_capacity(roads.len());
        let mut by_source: HashMap<VertexId, Vec<EdgeId>> = HashMap::new();
        let mut usable_roads: Vec<Road> = Vec::new();

        for road in roads {
            if !road.is_usable() {
                continue;
            }
            usable_roads.push(road);
        }

        if usable_roads.is_empty() {
            return Err(AppError::InvalidInput(
                "road graph has no usable roads".to_string(),
            ));
        }

        for road in &usable_roads {
            let forward_id = edge::forward_edge_id(road.gid) as EdgeId;
            let backward_id = if road.is_one_way() {
                None
            } else {
                Some(edge::backward_edge_id(road.gid) as EdgeId)
            };

            let split = edge::split_road(road, forward_id, backward_id);
            let mut ids = Vec::with_capacity(split.len());
            for e in split {
                ids.push(e.id);
                by_source.entry(e.source).or_default().push(e.id);
                edges.push(e);
            }
            road_edges.push(ids);
        }

        // neighbor: circular list of edges sharing the same source
        let mut neighbor_of: HashMap<EdgeId, EdgeId> = HashMap::new();
        for ids in by_source.values() {
            for w in 0..ids.len() {
                let this = ids[w];
                let next = ids[(w + 1) % ids.len()];
                neighbor_of.insert(this, next);
            }
        }

        // successor of edge e is the first outgoing edge at e.target, i.e.
        // the first edge whose *source* is e.target.
        let successor_of: HashMap<VertexId, EdgeId> = by_source
            .iter()
            .filter_map(|(v, ids)| ids.first().map(|id| (*v, *id)))
            .collect();

        for e in edges.iter_mut() {
            e.successor = successor_of.get(&e.target).copied();
            e.neighbor = neighbor_of.get(&e.id).copied();
        }

        let mut entries = Vec::with_capacity(usable_roads.len());
        for (idx, road) in usable_roads.iter().enumerate() {
            let rect = road.bounding_rect();
            entries.push(IndexedRoad {
                road_idx: idx,
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            });
        }
        let index = RTree::bulk_load(entries);

        let edge_pos: HashMap<EdgeId, usize> = edges.iter().enumerate().map(|(pos, e)| (e.id, pos)).collect();

        Ok(RoadGraph {
            roads: usable_roads,
            edges,
            edge_pos,
            road_edges,
            index,
        })
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        let pos = self.edge_pos[&id];
        &self.edges[pos]
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        let pos = self.edge_pos[&id];
        &mut self.edges[pos]
    }

    pub fn road(&self, idx: usize) -> &Road {
        &self.roads[idx]
    }

    pub fn edges_len(&self) -> usize {
        self.edges.len()
    }

    /// Number of outgoing edges at `edge`'s target vertex: `successor`
    /// plus the `neighbor` chain starting at `successor`.
    pub fn out_degree_at_target(&self, edge: EdgeId) -> usize {
        let e = self.edge(edge);
        let Some(first) = e.successor else {
            return 0;
        };
        let mut count = 1;
        let mut cur = first;
        loop {
            let next = self.edge(cur).neighbor;
            match next {
                Some(n) if n != first => {
                    count += 1;
                    cur = n;
                }
                _ => break,
            }
        }
        count
    }

    /// All edges outgoing from `edge`'s target vertex: `successor` plus the
    /// `neighbor` chain starting at `successor`. Used by the map matcher's
    /// route search.
    pub fn out_edges(&self, edge: EdgeId) -> Vec<EdgeId> {
        let e = self.edge(edge);
        let Some(first) = e.successor else {
            return Vec::new();
        };
        let mut out = vec![first];
        let mut cur = first;
        loop {
            match self.edge(cur).neighbor {
                Some(n) if n != first => {
                    out.push(n);
                    cur = n;
                }
                _ => break,
            }
        }
        out
    }

    /// Does `a` and `b` share a vertex (a.target intersecting b)?
    pub fn shared_vertex(&self, a: EdgeId, b: EdgeId) -> Option<VertexId> {
        let ea = self.edge(a);
        let eb = self.edge(b);
        for v in [ea.source, ea.target] {
            if eb.source == v || eb.target == v {
                return Some(v);
            }
        }
        None
    }

    /// All candidate road points within `r` meters of `p`, built from both
    /// directions of every road whose bounding rect intersects the query
    /// envelope.
    pub fn radius(&self, p: Point, r: f64) -> Vec<Candidate> {
        let env = geo::envelope_for_radius(p, r);
        let query = AABB::from_corners([env.min().x, env.min().y], [env.max().x, env.max().y]);

        let mut out = Vec::new();
        for entry in self.index.locate_in_envelope_intersecting(&query) {
            for &edge_id in &self.road_edges[entry.road_idx] {
                let edge = self.edge(edge_id);
                let (frac, dist) = geo::intercept_line(&edge.line_string, p);
                if dist <= r {
                    out.push(Candidate {
                        edge: edge_id,
                        fraction: frac.clamp(0.0, 1.0),
                        distance: dist,
                    });
                }
            }
        }
        out
    }

    /// Grow a search radius (start 100 m, double) until at least one road's
    /// projected point is within; return all candidates whose projected
    /// distance equals that minimum.
    pub fn nearest(&self, p: Point) -> Vec<Candidate> {
        let mut r = 100.0;
        let mut found;
        loop {
            found = self.radius(p, r);
            if !found.is_empty() || r > 200_000.0 {
                break;
            }
            r *= 2.0;
        }
        if found.is_empty() {
            return found;
        }
        let min_dist = found
            .iter()
            .map(|c| c.distance)
            .fold(f64::INFINITY, f64::min);
        found
            .into_iter()
            .filter(|c| (c.distance - min_dist).abs() <= geo::EPSILON.max(1e-6))
            .collect()
    }

    /// Remove candidates dominated by a neighbour candidate with fraction 0
    /// on the successor edge (same point, start of next edge duplicates end
    /// of previous), to avoid double counting at vertices.
    pub fn minset(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let mut keep = Vec::with_capacity(candidates.len());
        'outer: for (i, c) in candidates.iter().enumerate() {
            if c.fraction >= 1.0 - 1e-9 {
                let edge = self.edge(c.edge);
                if let Some(succ) = edge.successor {
                    for (j, other) in candidates.iter().enumerate() {
                        if j != i && other.edge == succ && other.fraction <= 1e-9 {
                            continue 'outer;
                        }
                    }
                }
            }
            keep.push(*c);
        }
        keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn road(gid: RoadId, source: VertexId, target: VertexId, one_way: bool, pts: Vec<Point>) -> Road {
        Road {
            gid,
            osm_id: gid as i64,
            source,
            target,
            reverse: if one_way { -1 } else { 0 },
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

    fn two_segment_graph() -> RoadGraph {
        // vertex 1 -> 2 -> 3, two-way roads.
        let r1 = road(
            1,
            1,
            2,
            false,
            vec![Point::new(-83.93, 35.96), Point::new(-83.92, 35.96)],
        );
        let r2 = road(
            2,
            2,
            3,
            false,
            vec![Point::new(-83.92, 35.96), Point::new(-83.91, 35.96)],
        );
        RoadGraph::build(vec![r1, r2]).unwrap()
    }

    #[test]
    fn successor_chains_through_shared_vertex() {
        let g = two_segment_graph();
        // forward edge of road 1 (id 2) targets vertex 2; road 2's forward
        // edge (id 4) sources at vertex 2, so it should be the successor.
        let e1_fwd = g.edge(2);
        assert_eq!(e1_fwd.target, 2);
        assert_eq!(g.edge(e1_fwd.successor.unwrap()).source, 2);
    }

    #[test]
    fn out_degree_counts_all_edges_at_target() {
        let g = two_segment_graph();
        // vertex 2 has: road2-forward (2->3) and road1-backward (2->1) outgoing.
        let e1_fwd = 2;
        assert_eq!(g.out_degree_at_target(e1_fwd), 2);
    }

    #[test]
    fn nearest_finds_candidate_on_either_road() {
        let g = two_segment_graph();
        let p = Point::new(-83.925, 35.9601);
        let cands = g.nearest(p);
        assert!(!cands.is_empty());
    }

    #[test]
    fn radius_respects_bound() {
        let g = two_segment_graph();
        let p = Point::new(-83.93, 35.96);
        let close = g.radius(p, 5.0);
        let far = g.radius(p, 5000.0);
        assert!(far.len() >= close.len());
    }
}
