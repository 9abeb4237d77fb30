//! `Road`: an undirected real-world roadway segment, as read from the
//! road CSV input (see SPEC_FULL.md §6).

use crate::geo::{self as geomath, Point};

pub type RoadId = u64;
pub type VertexId = i64;

#[derive(Debug, Clone)]
pub struct Road {
    pub gid: RoadId,
    pub osm_id: i64,
    pub source: VertexId,
    pub target: VertexId,
    /// `reverse < 0` means one-way (forward only).
    pub reverse: i32,
    pub class_id: i32,
    pub priority: f64,
    pub maxspeed_forward: f64,
    pub maxspeed_backward: f64,
    pub width: f64,
    pub excluded: bool,
    pub line_string: Vec<Point>,
    pub valid: bool,
    pub error_msg: String,
}

impl Road {
    pub fn is_one_way(&self) -> bool {
        self.reverse < 0
    }

    /// A road is usable in the graph iff it is valid, not excluded, and its
    /// polyline has at least two points.
    pub fn is_usable(&self) -> bool {
        self.valid && !self.excluded && self.line_string.len() >= 2
    }

    pub fn bounding_rect(&self) -> geo::Rect<f64> {
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &self.line_string {
            min_x = min_x.min(p.x());
            min_y = min_y.min(p.y());
            max_x = max_x.max(p.x());
            max_y = max_y.max(p.y());
        }
        geo::Rect::new(
            geo::coord! { x: min_x, y: min_y },
            geo::coord! { x: max_x, y: max_y },
        )
    }

    pub fn length(&self) -> f64 {
        geomath::length(&self.line_string)
    }
}
