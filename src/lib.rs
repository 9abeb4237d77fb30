//! `trace_deident`: de-identifies sequential vehicle GPS traces by
//! map-matching them against a road network, then detecting and
//! suppressing the privacy-sensitive subsequences around trip endpoints,
//! stops, and turn-arounds.
//!
//! The pipeline per trace is: [`matcher::map_match`] -> [`area::fit`] ->
//! [`intersections::annotate`] -> the critical-interval detectors in
//! [`critical`] -> [`privacy::find_privacy_intervals`] -> [`suppress::mark`].
//! [`batch`] drives this over a trip-file list with a worker pool;
//! [`config`] holds every tunable the stages read.

pub mod area;
pub mod batch;
pub mod config;
pub mod critical;
pub mod data;
pub mod error;
pub mod geo;
pub mod graph;
pub mod intersections;
pub mod matcher;
pub mod privacy;
pub mod suppress;

pub use error::{AppError, Result};
