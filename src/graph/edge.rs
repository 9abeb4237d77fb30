//! `Edge`: one directed traversal of a `Road`, held in an index-based
//! arena per SPEC_FULL.md §9 Design Notes (avoids the cyclic
//! `shared_ptr` successor/neighbor graph of the reference implementation).

use super::road::{Road, RoadId, VertexId};
use crate::geo::Point;

pub type EdgeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    Forward,
    Backward,
}

/// Synthetic type id used by implicit (map-matcher-unmatched) edges.
pub const IMPLICIT_TYPE: i32 = -1;

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    /// `None` for implicit edges (they are not split from a `Road`).
    pub road_id: Option<RoadId>,
    pub heading: Heading,
    pub source: VertexId,
    pub target: VertexId,
    pub class_id: i32,
    pub priority: f64,
    pub maxspeed: f64,
    pub width: f64,
    pub line_string: Vec<Point>,
    pub successor: Option<EdgeId>,
    pub neighbor: Option<EdgeId>,
}

impl Edge {
    pub fn is_implicit(&self) -> bool {
        self.road_id.is_none()
    }

    pub fn length(&self) -> f64 {
        crate::geo::length(&self.line_string)
    }
}

/// Derive the forward/backward edge ids from a road id, matching the
/// `2*road_id` / `2*road_id + 1` convention named in SPEC_FULL.md §3.
pub fn forward_edge_id(road_id: RoadId) -> u64 {
    2 * road_id
}

pub fn backward_edge_id(road_id: RoadId) -> u64 {
    2 * road_id + 1
}

/// Split a road into one edge (one-way) or two edges (two-way).
pub fn split_road(road: &Road, forward_id: EdgeId, backward_id: Option<EdgeId>) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(2);

    edges.push(Edge {
        id: forward_id,
        road_id: Some(road.gid),
        heading: Heading::Forward,
        source: road.source,
        target: road.target,
        class_id: road.class_id,
        priority: road.priority,
        maxspeed: road.maxspeed_forward,
        width: road.width,
        line_string: road.line_string.clone(),
        successor: None,
        neighbor: None,
    });

    if !road.is_one_way() {
        if let Some(backward_id) = backward_id {
            let mut reversed = road.line_string.clone();
            reversed.reverse();
            edges.push(Edge {
                id: backward_id,
                road_id: Some(road.gid),
                heading: Heading::Backward,
                source: road.target,
                target: road.source,
                class_id: road.class_id,
                priority: road.priority,
                maxspeed: road.maxspeed_backward,
                width: road.width,
                line_string: reversed,
                successor: None,
                neighbor: None,
            });
        }
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Point;

    fn sample_road(one_way: bool) -> Road {
        Road {
            gid: 1,
            osm_id: 100,
            source: 10,
            target: 20,
            reverse: if one_way { -1 } else { 0 },
            class_id: 3,
            priority: 1.0,
            maxspeed_forward: 50.0,
            maxspeed_backward: 50.0,
            width: 7.0,
            excluded: false,
            line_string: vec![Point::new(-83.93, 35.96), Point::new(-83.92, 35.97)],
            valid: true,
            error_msg: String::new(),
        }
    }

    #[test]
    fn one_way_road_splits_into_one_edge() {
        let road = sample_road(true);
        let edges = split_road(&road, 2, Some(3));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].heading, Heading::Forward);
    }

    #[test]
    fn two_way_road_splits_into_two_edges_with_reversed_geometry() {
        let road = sample_road(false);
        let edges = split_road(&road, 2, Some(3));
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[1].heading, Heading::Backward);
        assert_eq!(edges[1].source, road.target);
        assert_eq!(edges[1].target, road.source);
        assert_eq!(edges[1].line_string[0], road.line_string[1]);
    }
}
