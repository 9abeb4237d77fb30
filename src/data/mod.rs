//! The pipeline's core data model: `Sample`, `Trace`, `Interval`, and the
//! CSV/WKB wire formats they are read from and written back to.

pub mod road_csv;
pub mod sample;
pub mod trace;
pub mod wkb;

pub use sample::{Interval, IntervalKind, Sample, SampleErrorKind};
pub use trace::{make_trace, write_trace, Trace, TraceStats};
