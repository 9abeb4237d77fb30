//! End-to-end tests driving the batch runner over small synthetic fixtures:
//! a two-segment straight road and a trace travelling along it, written to
//! disk in the same CSV dialects the CLI reads, exercising the full
//! pipeline (map match, area fit, intersection count, critical/privacy
//! detection, merge, mark, suppress) through the public `batch` API.

use std::io::Write;

use trace_deident::batch::{read_batch_file, run, TripDescriptor};
use trace_deident::config::Config;
use trace_deident::data::road_csv::{write_roads, ROAD_CSV_HEADER};
use trace_deident::data::trace::TRACE_CSV_HEADER;
use trace_deident::graph::road::Road;
use trace_deident::graph::RoadGraph;

fn straight_road(gid: u64, source: i64, target: i64, lon_from: f64, lon_to: f64, lat: f64) -> Road {
    Road {
        gid,
        osm_id: gid as i64,
        source,
        target,
        reverse: 0,
        class_id: 7,
        priority: 1.0,
        maxspeed_forward: 50.0,
        maxspeed_backward: 50.0,
        width: 7.0,
        excluded: false,
        line_string: vec![
            trace_deident::geo::Point::new(lon_from, lat),
            trace_deident::geo::Point::new(lon_to, lat),
        ],
        valid: true,
        error_msg: String::new(),
    }
}

fn trip_row(ts: i64, lat: f64, lon: f64, speed: f64, heading: f64) -> String {
    format!(
        "dev1,file1,tx1,{ts},0,0,0,{lat},{lon},0,{speed},{heading},0,0,0,0,0,0,0",
    )
}

#[test]
fn batch_run_produces_de_identified_output_with_expected_invariants() {
    let roads = vec![
        straight_road(1, 1, 2, -83.940, -83.930, 35.960),
        straight_road(2, 2, 3, -83.930, -83.910, 35.960),
    ];

    let roads_dir = tempfile::tempdir().unwrap();
    let roads_path = roads_dir.path().join("roads.csv");
    {
        let mut f = std::fs::File::create(&roads_path).unwrap();
        write_roads(&mut f, &roads).unwrap();
    }

    // A trace driving straight along the two road segments, with a long
    // stationary run at the start (a stop) that the critical-interval
    // detector should flag.
    let mut rows = Vec::new();
    let mut ts = 0_i64;
    for _ in 0..12 {
        rows.push(trip_row(ts, 35.960, -83.939, 0.0, 90.0));
        ts += 500_000;
    }
    let mut lon = -83.935;
    for _ in 0..20 {
        rows.push(trip_row(ts, 35.960, lon, 10.0, 90.0));
        ts += 1_000_000;
        lon += 0.001;
    }

    let trips_dir = tempfile::tempdir().unwrap();
    let trip_path = trips_dir.path().join("trip1.csv");
    {
        let mut f = std::fs::File::create(&trip_path).unwrap();
        writeln!(f, "{}", TRACE_CSV_HEADER).unwrap();
        for row in &rows {
            writeln!(f, "{}", row).unwrap();
        }
    }

    let batch_dir = tempfile::tempdir().unwrap();
    let batch_path = batch_dir.path().join("batch.txt");
    {
        let mut f = std::fs::File::create(&batch_path).unwrap();
        writeln!(f, "{}", trip_path.display()).unwrap();
    }

    let descriptors = read_batch_file(&batch_path).unwrap();
    assert_eq!(descriptors, vec![TripDescriptor { path: trip_path.clone() }]);

    let graph = RoadGraph::build(roads).unwrap();
    let mut cfg = Config::default();
    cfg.thread_count = 1;

    let out_dir = tempfile::tempdir().unwrap();
    let stats = run(descriptors, graph, cfg, out_dir.path()).unwrap();

    assert_eq!(stats.traces, 1);
    assert_eq!(stats.traces_failed, 0);
    assert_eq!(stats.total_points, rows.len() as u64);

    let out_path = out_dir.path().join("dev1_file1.csv");
    assert!(out_path.exists());
    let output = std::fs::read_to_string(&out_path).unwrap();
    let out_lines: Vec<&str> = output.lines().skip(1).filter(|l| !l.is_empty()).collect();

    // The point-count property: every raw row is accounted for exactly
    // once across invalid/critical/privacy/emitted buckets.
    let accounted = stats.invalid_field + stats.invalid_geo + stats.invalid_heading + stats.critical_points + stats.privacy_points + out_lines.len() as u64;
    assert_eq!(accounted, rows.len() as u64);

    // The long stationary run at the start is a stop: the trace's first
    // samples must not survive into the output.
    assert!(out_lines.len() < rows.len());
}

#[test]
fn missing_trip_file_is_reported_as_a_failed_trace_not_a_panic() {
    let roads = vec![straight_road(1, 1, 2, -83.940, -83.930, 35.960)];
    let graph = RoadGraph::build(roads).unwrap();
    let mut cfg = Config::default();
    cfg.thread_count = 1;

    let trips_dir = tempfile::tempdir().unwrap();
    let missing = trips_dir.path().join("does-not-exist.csv");
    let out_dir = tempfile::tempdir().unwrap();

    let stats = run(vec![TripDescriptor { path: missing }], graph, cfg, out_dir.path()).unwrap();
    assert_eq!(stats.traces, 0);
    assert_eq!(stats.traces_failed, 1);
}

#[test]
fn road_csv_header_round_trips() {
    assert_eq!(ROAD_CSV_HEADER.split(',').count(), 14);
}
