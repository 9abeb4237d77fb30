//! Batch runner (SPEC_FULL.md §4.9/§5): a bounded MPMC queue of trip-file
//! descriptors drained by a fixed worker pool, each running the full
//! per-trace pipeline and writing its de-identified output, with a
//! mutex-guarded aggregate counter updated once per finished trace.
//!
//! Grounded on the reference implementation's thread-pool batch driver,
//! restructured around `crossbeam-channel`'s bounded MPMC channel per
//! SPEC_FULL.md §9 Design Notes (a sentinel is pushed once per worker
//! instead of a shared atomic "done" flag).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::area;
use crate::config::Config;
use crate::critical;
use crate::data::trace::{self, TraceStats};
use crate::error::{AppError, Result};
use crate::graph::RoadGraph;
use crate::intersections;
use crate::matcher;
use crate::privacy;
use crate::suppress;

/// One trip file to process, identified by its path; the output file name
/// is derived from the trace's uid once it has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripDescriptor {
    pub path: PathBuf,
}

enum Task {
    Trip(TripDescriptor),
    Shutdown,
}

/// Aggregate point counters across every trace in the batch, reported at
/// the end of the run (SPEC_FULL.md §4.9).
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchStats {
    pub traces: u64,
    pub traces_failed: u64,
    pub total_points: u64,
    pub invalid_field: u64,
    pub invalid_geo: u64,
    pub invalid_heading: u64,
    pub critical_points: u64,
    pub privacy_points: u64,
}

impl BatchStats {
    fn add_trace(&mut self, stats: &TraceStats, suppression: suppress::SuppressionStats) {
        self.traces += 1;
        self.total_points += stats.total;
        self.invalid_field += stats.invalid_field;
        self.invalid_geo += stats.invalid_geo;
        self.invalid_heading += stats.invalid_heading;
        self.critical_points += suppression.critical_samples;
        self.privacy_points += suppression.privacy_samples;
    }
}

/// Read the batch file (one trip-file path per line, blank lines and
/// `#`-prefixed comments ignored).
pub fn read_batch_file(path: &Path) -> Result<Vec<TripDescriptor>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::InvalidInput(format!("cannot read batch file {}: {}", path.display(), e)))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| TripDescriptor { path: PathBuf::from(l) })
        .collect())
}

/// Run the full per-trace pipeline (map match, area fit, intersection
/// count, critical/privacy interval detection, merge, mark) and write the
/// de-identified CSV to `out_dir/<uid>.csv`.
fn process_trip(descriptor: &TripDescriptor, graph: &RoadGraph, cfg: &Config, out_dir: &Path) -> Result<(TraceStats, suppress::SuppressionStats)> {
    let file = std::fs::File::open(&descriptor.path).map_err(AppError::from)?;
    let mut trace = trace::make_trace(file)?;

    if trace.is_empty() {
        log::warn!("{}: empty after filtering, no output written", descriptor.path.display());
        return Err(AppError::EmptyTrace);
    }

    let matcher_cfg = cfg.matcher_config();
    matcher::map_match(&mut trace, graph, &matcher_cfg);

    let area_cfg = cfg.area_config();
    let implicit_base = graph.edges_len() as crate::graph::EdgeId;
    let fit = area::fit(&mut trace, graph, &area_cfg, implicit_base);

    intersections::annotate(&mut trace, graph);

    let mut critical = critical::start_end(&trace);
    critical.extend(critical::detect_stops(&trace, graph, &cfg.stop_config()));
    critical.extend(critical::detect_turnarounds(&trace, graph, &cfg.turnaround_config()));

    let mut rng = rand::rng();
    let privacy_cfg = cfg.privacy_config();
    let privacy_intervals = privacy::find_privacy_intervals(
        &trace,
        graph,
        &fit.implicit_edges,
        implicit_base,
        &critical,
        &privacy_cfg,
        &mut rng,
    );

    suppress::mark(&mut trace, critical, privacy_intervals);
    let suppression = suppress::suppression_stats(&trace);

    let out_path = out_dir.join(format!("{}.csv", trace.uid));
    let out_file = std::fs::File::create(&out_path).map_err(AppError::from)?;
    trace::write_trace(out_file, &trace)?;

    Ok((trace.stats.clone(), suppression))
}

fn worker_loop(
    rx: crossbeam_channel::Receiver<Task>,
    graph: Arc<RoadGraph>,
    cfg: Arc<Config>,
    out_dir: Arc<PathBuf>,
    stats: Arc<Mutex<BatchStats>>,
) {
    while let Ok(task) = rx.recv() {
        let descriptor = match task {
            Task::Trip(d) => d,
            Task::Shutdown => break,
        };

        match process_trip(&descriptor, &graph, &cfg, &out_dir) {
            Ok((trace_stats, suppression)) => {
                let mut s = stats.lock().unwrap();
                s.add_trace(&trace_stats, suppression);
            }
            Err(AppError::EmptyTrace) => {
                // already logged in process_trip; not counted as a failure.
            }
            Err(e) => {
                log::warn!("{}: {}", descriptor.path.display(), e);
                let mut s = stats.lock().unwrap();
                s.traces_failed += 1;
            }
        }
    }
}

/// Run the batch: spawn `thread_count` workers sharing `graph` read-only,
/// push one task per trip descriptor, then one shutdown sentinel per
/// worker, and join.
pub fn run(descriptors: Vec<TripDescriptor>, graph: RoadGraph, cfg: Config, out_dir: &Path) -> Result<BatchStats> {
    std::fs::create_dir_all(out_dir).map_err(AppError::from)?;

    let thread_count = cfg.thread_count.max(1);
    let graph = Arc::new(graph);
    let cfg = Arc::new(cfg);
    let out_dir = Arc::new(out_dir.to_path_buf());
    let stats = Arc::new(Mutex::new(BatchStats::default()));

    let (tx, rx) = crossbeam_channel::bounded::<Task>(thread_count * 4);

    let handles: Vec<_> = (0..thread_count)
        .map(|_| {
            let rx = rx.clone();
            let graph = Arc::clone(&graph);
            let cfg = Arc::clone(&cfg);
            let out_dir = Arc::clone(&out_dir);
            let stats = Arc::clone(&stats);
            thread::spawn(move || worker_loop(rx, graph, cfg, out_dir, stats))
        })
        .collect();

    for descriptor in descriptors {
        tx.send(Task::Trip(descriptor)).expect("workers outlive the sender");
    }
    for _ in 0..thread_count {
        tx.send(Task::Shutdown).expect("workers outlive the sender");
    }
    drop(tx);

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    let final_stats = *stats.lock().unwrap();
    Ok(final_stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_batch_file_skipping_blank_and_comment_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# a trip list\n/tmp/trip1.csv\n\n/tmp/trip2.csv\n").unwrap();
        let descriptors = read_batch_file(f.path()).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].path, PathBuf::from("/tmp/trip1.csv"));
    }

    #[test]
    fn missing_batch_file_is_invalid_input() {
        let result = read_batch_file(Path::new("/nonexistent/batch.txt"));
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn empty_batch_runs_cleanly_with_zero_traces() {
        use crate::geo::Point;
        use crate::graph::road::Road;

        let road = Road {
            gid: 1,
            osm_id: 1,
            source: 1,
            target: 2,
            reverse: 0,
            class_id: 3,
            priority: 1.0,
            maxspeed_forward: 50.0,
            maxspeed_backward: 50.0,
            width: 7.0,
            excluded: false,
            line_string: vec![Point::new(-83.93, 35.96), Point::new(-83.92, 35.96)],
            valid: true,
            error_msg: String::new(),
        };
        let graph = RoadGraph::build(vec![road]).unwrap();
        let cfg = Config::default();
        let dir = tempfile::tempdir().unwrap();
        let stats = run(vec![], graph, cfg, dir.path()).unwrap();
        assert_eq!(stats.traces, 0);
    }
}
