//! `Trace`: an ordered sequence of `Sample`s from one trip, read from the
//! BSMP1 CSV dialect (SPEC_FULL.md §6) and written back in the same
//! dialect, containing only the unsuppressed rows.

use std::io::{Read, Write};

use crate::data::sample::{Sample, SampleErrorKind};
use crate::error::{AppError, Result};
use crate::geo::Point;

pub const TRACE_CSV_HEADER: &str = "RxDevice,FileId,TxDevice,Gentime,TxRandom,MsgCount,DSecond,Latitude,Longitude,Elevation,Speed,Heading,Ax,Ay,Az,Yawrate,PathCount,RadiusOfCurve,Confidence";
pub const TRACE_CSV_NUM_FIELDS: usize = 19;

#[derive(Debug, Default, Clone)]
pub struct TraceStats {
    pub total: u64,
    pub invalid_field: u64,
    pub invalid_geo: u64,
    pub invalid_heading: u64,
}

#[derive(Debug, Clone)]
pub struct Trace {
    pub uid: String,
    pub samples: Vec<Sample>,
    pub stats: TraceStats,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Parse a single BSMP1 row into a `Sample`, validating the fields the
/// pipeline uses per SPEC_FULL.md §6. `raw_index` is the row's 0-based
/// position in the original file (including rows later dropped).
fn parse_row(fields: &[&str], raw_index: usize, record: &str) -> (String, Sample) {
    let mut error_kind = SampleErrorKind::None;
    let mut valid = true;

    if fields.len() != TRACE_CSV_NUM_FIELDS {
        return (
            String::new(),
            invalid_sample(raw_index, record, SampleErrorKind::Field),
        );
    }

    let device = fields[0];
    let file_id = fields[1];
    let uid = format!("{}_{}", device, file_id);

    let timestamp: i64 = match fields[3].trim().parse() {
        Ok(v) => v,
        Err(_) => return (uid, invalid_sample(raw_index, record, SampleErrorKind::Field)),
    };
    let lat: f64 = match fields[7].trim().parse() {
        Ok(v) => v,
        Err(_) => return (uid, invalid_sample(raw_index, record, SampleErrorKind::Field)),
    };
    let lon: f64 = match fields[8].trim().parse() {
        Ok(v) => v,
        Err(_) => return (uid, invalid_sample(raw_index, record, SampleErrorKind::Field)),
    };
    let speed: f64 = match fields[10].trim().parse() {
        Ok(v) => v,
        Err(_) => return (uid, invalid_sample(raw_index, record, SampleErrorKind::Field)),
    };
    let heading: f64 = match fields[11].trim().parse() {
        Ok(v) => v,
        Err(_) => return (uid, invalid_sample(raw_index, record, SampleErrorKind::Field)),
    };

    if !(-84.0..=80.0).contains(&lat) || lon <= -180.0 || lon >= 180.0 || (lat == 0.0 && lon == 0.0) {
        error_kind = SampleErrorKind::Geo;
        valid = false;
    } else if !(0.0..=360.0).contains(&heading) {
        error_kind = SampleErrorKind::Heading;
        valid = false;
    }

    let azimuth = if valid { Some(heading) } else { None };

    let sample = Sample {
        uid: uid.clone(),
        index: 0, // assigned after filtering
        raw_index,
        timestamp,
        point: Point::new(lon, lat),
        azimuth,
        speed,
        record: record.to_string(),
        valid,
        error_kind,
        matched_edge: None,
        fit_edge: None,
        is_explicit_fit: false,
        interval: None,
        out_degree: 0,
    };

    (uid, sample)
}

fn invalid_sample(raw_index: usize, record: &str, kind: SampleErrorKind) -> Sample {
    Sample {
        uid: String::new(),
        index: 0,
        raw_index,
        timestamp: 0,
        point: Point::new(0.0, 0.0),
        azimuth: None,
        speed: 0.0,
        record: record.to_string(),
        valid: false,
        error_kind: kind,
        matched_edge: None,
        fit_edge: None,
        is_explicit_fit: false,
        interval: None,
        out_degree: 0,
    }
}

/// Read a trip file and produce a `Trace` of only the valid, de-duplicated,
/// index-renumbered samples, alongside the raw-row statistics used for the
/// point-count property (SPEC_FULL.md §8).
pub fn make_trace<R: Read>(reader: R) -> Result<Trace> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut stats = TraceStats::default();
    let mut uid = String::new();
    let mut accepted: Vec<Sample> = Vec::new();
    let mut last_timestamp: Option<i64> = None;

    for (raw_index, result) in rdr.records().enumerate() {
        let record = result?;
        let record_text = record.iter().collect::<Vec<_>>().join(",");
        let fields: Vec<&str> = record.iter().collect();

        stats.total += 1;
        let (row_uid, sample) = parse_row(&fields, raw_index, &record_text);
        if uid.is_empty() && !row_uid.is_empty() {
            uid = row_uid;
        }

        if !sample.valid {
            match sample.error_kind {
                SampleErrorKind::Field => stats.invalid_field += 1,
                SampleErrorKind::Geo => stats.invalid_geo += 1,
                SampleErrorKind::Heading => stats.invalid_heading += 1,
                SampleErrorKind::None => {}
            }
            continue;
        }

        if let Some(last) = last_timestamp {
            if sample.timestamp == last {
                // duplicate fix time: drop at model entry.
                continue;
            }
        }
        last_timestamp = Some(sample.timestamp);
        accepted.push(sample);
    }

    for (i, s) in accepted.iter_mut().enumerate() {
        s.index = i;
    }

    Ok(Trace {
        uid,
        samples: accepted,
        stats,
    })
}

/// Write the unsuppressed subsequence of `trace` back out in the input's
/// CSV dialect, preserving raw record bytes and ordering.
pub fn write_trace<W: Write>(writer: W, trace: &Trace) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(TRACE_CSV_HEADER.split(','))
        .map_err(AppError::from)?;
    for sample in &trace.samples {
        if sample.is_suppressed() {
            continue;
        }
        wtr.write_record(sample.record.split(',')).map_err(AppError::from)?;
    }
    wtr.flush().map_err(AppError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_row(lat: f64, lon: f64, heading: f64, ts: i64) -> String {
        format!(
            "dev,file,tx,{},0,0,0,{},{},0,5.0,{},0,0,0,0,0,0,0",
            ts, lat, lon, heading
        )
    }

    #[test]
    fn parses_valid_rows_and_renumbers_index() {
        let mut csv = String::from(TRACE_CSV_HEADER);
        csv.push('\n');
        csv.push_str(&csv_row(35.96, -83.93, 90.0, 1000));
        csv.push('\n');
        csv.push_str(&csv_row(35.97, -83.92, 91.0, 2000));
        csv.push('\n');

        let trace = make_trace(csv.as_bytes()).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.samples[0].index, 0);
        assert_eq!(trace.samples[1].index, 1);
        assert_eq!(trace.stats.total, 2);
    }

    #[test]
    fn drops_rows_with_bad_geo_and_heading() {
        let mut csv = String::from(TRACE_CSV_HEADER);
        csv.push('\n');
        csv.push_str(&csv_row(0.0, 0.0, 90.0, 1000)); // geo error
        csv.push('\n');
        csv.push_str(&csv_row(35.96, -83.93, 400.0, 2000)); // heading error
        csv.push('\n');

        let trace = make_trace(csv.as_bytes()).unwrap();
        assert_eq!(trace.len(), 0);
        assert_eq!(trace.stats.invalid_geo, 1);
        assert_eq!(trace.stats.invalid_heading, 1);
    }

    #[test]
    fn drops_duplicate_consecutive_timestamps() {
        let mut csv = String::from(TRACE_CSV_HEADER);
        csv.push('\n');
        csv.push_str(&csv_row(35.96, -83.93, 90.0, 1000));
        csv.push('\n');
        csv.push_str(&csv_row(35.96, -83.93, 90.0, 1000));
        csv.push('\n');

        let trace = make_trace(csv.as_bytes()).unwrap();
        assert_eq!(trace.len(), 1);
    }
}
