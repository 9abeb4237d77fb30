//! Road CSV reader/writer for the `gid,source,target,...` dialect
//! (SPEC_FULL.md §6), grounded on `kRoadCSVHeader`/`kRoadCSVNumFields` in
//! the reference implementation.

use std::io::{Read, Write};

use crate::data::wkb;
use crate::error::{AppError, Result};
use crate::graph::road::Road;

pub const ROAD_CSV_HEADER: &str = "gid,source,target,osm_id,reverse,class_id,priority,maxspeed_forward,maxspeed_backward,width,excluded,geom_wkb_hex,valid,error";
pub const ROAD_CSV_NUM_FIELDS: usize = 14;

pub fn read_roads<R: Read>(reader: R) -> Result<Vec<Road>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut roads = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.len() != ROAD_CSV_NUM_FIELDS {
            continue;
        }
        let fields: Vec<&str> = record.iter().collect();
        roads.push(parse_road_row(&fields)?);
    }
    Ok(roads)
}

fn parse_road_row(fields: &[&str]) -> Result<Road> {
    let parse_f64 = |s: &str| -> Result<f64> {
        s.trim()
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("bad numeric field '{s}' in road CSV")))
    };
    let parse_i64 = |s: &str| -> Result<i64> {
        s.trim()
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("bad integer field '{s}' in road CSV")))
    };

    let gid: u64 = parse_i64(fields[0])? as u64;
    let source = parse_i64(fields[1])?;
    let target = parse_i64(fields[2])?;
    let osm_id = parse_i64(fields[3])?;
    let reverse = parse_i64(fields[4])? as i32;
    let class_id = parse_i64(fields[5])? as i32;
    let priority = parse_f64(fields[6])?;
    let maxspeed_forward = parse_f64(fields[7])?;
    let maxspeed_backward = parse_f64(fields[8])?;
    let width = parse_f64(fields[9])?;
    let excluded = fields[10].trim() != "0" && !fields[10].trim().is_empty() && fields[10].trim().to_lowercase() != "false";
    let line_string = wkb::decode_line_string_hex(fields[11]).unwrap_or_default();
    let valid = fields[12].trim() != "0" && fields[12].trim().to_lowercase() != "false";
    let error_msg = fields[13].to_string();

    Ok(Road {
        gid,
        osm_id,
        source,
        target,
        reverse,
        class_id,
        priority,
        maxspeed_forward,
        maxspeed_backward,
        width,
        excluded,
        line_string,
        valid,
        error_msg,
    })
}

pub fn write_roads<W: Write>(writer: W, roads: &[Road]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(ROAD_CSV_HEADER.split(','))?;
    for road in roads {
        wtr.write_record(&[
            road.gid.to_string(),
            road.source.to_string(),
            road.target.to_string(),
            road.osm_id.to_string(),
            road.reverse.to_string(),
            road.class_id.to_string(),
            road.priority.to_string(),
            road.maxspeed_forward.to_string(),
            road.maxspeed_backward.to_string(),
            road.width.to_string(),
            (road.excluded as i32).to_string(),
            wkb::encode_line_string_hex(&road.line_string),
            (road.valid as i32).to_string(),
            road.error_msg.clone(),
        ])?;
    }
    wtr.flush().map_err(AppError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_two_way_road() {
        let line = wkb::encode_line_string_hex(&[
            crate::geo::Point::new(-83.93, 35.96),
            crate::geo::Point::new(-83.92, 35.97),
        ]);
        let mut csv = String::from(ROAD_CSV_HEADER);
        csv.push('\n');
        csv.push_str(&format!("1,10,20,100,0,3,1.0,50,50,7.0,0,{},1,\n", line));

        let roads = read_roads(csv.as_bytes()).unwrap();
        assert_eq!(roads.len(), 1);
        assert!(!roads[0].is_one_way());
        assert_eq!(roads[0].line_string.len(), 2);
    }

    #[test]
    fn one_way_flag_from_negative_reverse() {
        let line = wkb::encode_line_string_hex(&[
            crate::geo::Point::new(-83.93, 35.96),
            crate::geo::Point::new(-83.92, 35.97),
        ]);
        let mut csv = String::from(ROAD_CSV_HEADER);
        csv.push('\n');
        csv.push_str(&format!("1,10,20,100,-1,3,1.0,50,50,7.0,0,{},1,\n", line));

        let roads = read_roads(csv.as_bytes()).unwrap();
        assert!(roads[0].is_one_way());
    }
}
