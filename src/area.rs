//! Area fitter (SPEC_FULL.md §4.4): per-sample explicit/implicit fit
//! decision and implicit-edge synthesis, grounded on `geo.hpp`'s `Area`
//! (offset rectangle rings around an edge polyline) from the reference
//! implementation.

use crate::data::sample::Sample;
use crate::data::trace::Trace;
use crate::geo::{self, Point};
use crate::graph::edge::{Edge, EdgeId, IMPLICIT_TYPE};
use crate::graph::road::VertexId;
use crate::graph::RoadGraph;

#[derive(Debug, Clone)]
pub struct AreaFitterConfig {
    /// Extension (m) added past each end of an explicit edge's rectangle.
    pub fit_ext: f64,
    /// Scale applied to a road's width before building its area.
    pub map_fit_scale: f64,
    /// Number of heading sectors an implicit edge's direction is bucketed
    /// into (`K` in SPEC_FULL.md §4.4, default 36).
    pub n_heading_groups: u32,
    /// Minimum accumulated samples before an implicit edge may be closed
    /// off on a heading-sector change.
    pub min_edge_trip_points: u32,
}

impl Default for AreaFitterConfig {
    fn default() -> Self {
        AreaFitterConfig {
            fit_ext: 0.0,
            map_fit_scale: 1.0,
            n_heading_groups: 36,
            min_edge_trip_points: 1,
        }
    }
}

/// One or more rectangular rings covering an edge's polyline.
#[derive(Debug, Clone)]
pub struct Area {
    pub rings: Vec<Vec<Point>>,
}

impl Area {
    pub fn for_edge(line: &[Point], width: f64, ext: f64) -> Self {
        let rings = line
            .windows(2)
            .map(|w| geo::rect_ring(w[0], w[1], width, ext))
            .collect();
        Area { rings }
    }

    pub fn contains(&self, p: Point) -> bool {
        self.rings.iter().any(|ring| geo::point_in_ring(ring, p))
    }
}

/// A synthetic, two-point edge synthesised when a sample falls outside
/// every explicit-edge area. `road_id = None`, `class_id = IMPLICIT_TYPE`.
/// Owned by the trace's implicit-edge arena; mutated while it is the
/// "current" implicit edge, then frozen.
#[derive(Debug, Clone)]
pub struct ImplicitEdge {
    pub start: Point,
    pub end: Point,
    pub sector: u32,
    pub point_count: u32,
}

impl ImplicitEdge {
    pub fn line(&self) -> Vec<Point> {
        vec![self.start, self.end]
    }

    pub fn to_edge(&self, id: EdgeId) -> Edge {
        Edge {
            id,
            road_id: None,
            heading: crate::graph::edge::Heading::Forward,
            source: VertexId::MIN,
            target: VertexId::MIN,
            class_id: IMPLICIT_TYPE,
            priority: 1.0,
            maxspeed: 0.0,
            width: 0.0,
            line_string: self.line(),
            successor: None,
            neighbor: None,
        }
    }
}

fn heading_sector(azimuth: f64, n_groups: u32) -> u32 {
    let bucket = (azimuth / (360.0 / n_groups as f64)).floor() as i64;
    bucket.rem_euclid(n_groups as i64) as u32
}

/// Result of the area-fitting pass: per-sample fit decisions plus the
/// frozen implicit-edge arena (indices referenced by `Sample::fit_edge`
/// are offset past the road graph's real edge id space).
pub struct FitResult {
    pub implicit_edges: Vec<ImplicitEdge>,
    pub explicit_areas: Vec<(EdgeId, Area)>,
}

/// Fit every valid sample of `trace` to an explicit edge area (from its
/// matched edge) or, failing that, an implicit edge, per SPEC_FULL.md
/// §4.4. `implicit_base` is the id offset implicit edges are numbered from
/// (past the real edge arena) so `Sample::fit_edge` stays a flat `EdgeId`
/// space; callers resolve it via `sample.is_explicit_fit` (`graph.edge` for
/// explicit, `FitResult::implicit_edges[id - implicit_base]` for implicit),
/// since a real edge's `2*gid`/`2*gid+1` id is not bounded by the edge
/// count and so cannot be told apart from an implicit id by magnitude.
pub fn fit(trace: &mut Trace, graph: &RoadGraph, cfg: &AreaFitterConfig, implicit_base: EdgeId) -> FitResult {
    let mut implicit_edges: Vec<ImplicitEdge> = Vec::new();
    let mut explicit_area_cache: std::collections::HashMap<EdgeId, Area> = std::collections::HashMap::new();
    let mut current: Option<usize> = None; // index into implicit_edges

    for sample in trace.samples.iter_mut() {
        if !sample.valid {
            continue;
        }

        if let Some(matched) = sample.matched_edge {
            let area = explicit_area_cache.entry(matched).or_insert_with(|| {
                let e = graph.edge(matched);
                Area::for_edge(&e.line_string, e.width * cfg.map_fit_scale, cfg.fit_ext)
            });
            if area.contains(sample.point) {
                sample.fit_edge = Some(matched);
                sample.is_explicit_fit = true;
                current = None;
                continue;
            }
        }

        sample.is_explicit_fit = false;
        let azimuth = sample.azimuth.unwrap_or(0.0);
        let sector = heading_sector(azimuth, cfg.n_heading_groups);

        match current {
            None => {
                implicit_edges.push(ImplicitEdge {
                    start: sample.point,
                    end: sample.point,
                    sector,
                    point_count: 1,
                });
                current = Some(implicit_edges.len() - 1);
            }
            Some(idx) => {
                let ie = &mut implicit_edges[idx];
                if ie.sector != sector && ie.point_count >= cfg.min_edge_trip_points {
                    ie.end = sample.point;
                    implicit_edges.push(ImplicitEdge {
                        start: sample.point,
                        end: sample.point,
                        sector,
                        point_count: 1,
                    });
                    current = Some(implicit_edges.len() - 1);
                } else {
                    ie.end = sample.point;
                    ie.point_count += 1;
                }
            }
        }
        sample.fit_edge = Some(implicit_base + current.unwrap() as EdgeId);
    }

    let explicit_areas: Vec<(EdgeId, Area)> = explicit_area_cache.into_iter().collect();
    FitResult {
        implicit_edges,
        explicit_areas,
    }
}

/// Materialise `Area` objects for all finished implicit edges (used for
/// rendering and by the turn-around/privacy detectors).
pub fn implicit_areas(implicit_edges: &[ImplicitEdge], width: f64, ext: f64) -> Vec<Area> {
    implicit_edges
        .iter()
        .map(|ie| Area::for_edge(&ie.line(), width, ext))
        .collect()
}

/// Length of `sample`'s fit edge, explicit or implicit. Classified by
/// `sample.is_explicit_fit` rather than comparing `fit_edge` against
/// `implicit_base`: a real edge's id is `2*gid`/`2*gid+1` (SPEC_FULL.md §3),
/// which is not bounded by the graph's edge count, so magnitude alone
/// cannot tell explicit and implicit ids apart.
pub fn fit_edge_length(sample: &Sample, graph: &RoadGraph, implicit_edges: &[ImplicitEdge], implicit_base: EdgeId) -> f64 {
    match sample.fit_edge {
        None => 0.0,
        Some(id) if sample.is_explicit_fit => graph.edge(id).length(),
        Some(id) => {
            let ie = &implicit_edges[(id - implicit_base) as usize];
            geo::distance(ie.start, ie.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_sector_wraps_at_360() {
        assert_eq!(heading_sector(0.0, 36), 0);
        assert_eq!(heading_sector(359.9, 36), 35);
        assert_eq!(heading_sector(-1.0, 36), 35);
    }

    #[test]
    fn area_contains_segment_midpoint() {
        let a = Point::new(-83.93, 35.96);
        let b = Point::new(-83.92, 35.97);
        let area = Area::for_edge(&[a, b], 20.0, 0.0);
        let mid = geo::interpolate(a, b, 0.5);
        assert!(area.contains(mid));
    }
}
