//! `Sample`: one GPS fix, plus the mutable annotations the pipeline
//! stages attach to it as they run.

use crate::geo::Point;
use crate::graph::edge::EdgeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleErrorKind {
    None,
    Field,
    Geo,
    Heading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    Critical,
    Privacy,
}

/// `[left, right)` over trace indices, with a tag set describing which
/// detector(s) produced it.
#[derive(Debug, Clone)]
pub struct Interval {
    pub left: usize,
    pub right: usize,
    pub kind: IntervalKind,
    pub tags: Vec<String>,
}

impl Interval {
    pub fn new(left: usize, right: usize, kind: IntervalKind, tag: impl Into<String>) -> Self {
        assert!(left < right, "interval must have left < right");
        Interval {
            left,
            right,
            kind,
            tags: vec![tag.into()],
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.left && index < self.right
    }
}

#[derive(Debug, Clone)]
pub struct Sample {
    pub uid: String,
    pub index: usize,
    pub raw_index: usize,
    pub timestamp: i64,
    pub point: Point,
    /// `None` when the source row had no usable heading field.
    pub azimuth: Option<f64>,
    pub speed: f64,
    pub record: String,
    pub valid: bool,
    pub error_kind: SampleErrorKind,

    pub matched_edge: Option<EdgeId>,
    pub fit_edge: Option<EdgeId>,
    pub is_explicit_fit: bool,
    pub interval: Option<std::rc::Rc<Interval>>,
    pub out_degree: u64,
}

impl Sample {
    pub fn lat(&self) -> f64 {
        self.point.y()
    }

    pub fn lon(&self) -> f64 {
        self.point.x()
    }

    pub fn is_suppressed(&self) -> bool {
        self.interval.is_some()
    }
}
