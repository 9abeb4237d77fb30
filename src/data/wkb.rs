//! Minimal WKB LineString decoder for the `geom_wkb_hex` road CSV field:
//! a `0x`-prefixed hex string encoding a standard WKB `LINESTRING` in
//! WGS-84 lon/lat order.

use crate::error::{AppError, Result};
use crate::geo::Point;

const WKB_LINESTRING: u32 = 2;

pub fn decode_line_string_hex(hex: &str) -> Result<Vec<Point>> {
    let hex = hex.trim();
    let hex = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")).unwrap_or(hex);
    let bytes = decode_hex(hex)?;
    decode_line_string(&bytes)
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(AppError::InvalidInput("odd-length WKB hex string".to_string()));
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    let bytes = hex.as_bytes();
    for chunk in bytes.chunks(2) {
        let s = std::str::from_utf8(chunk).map_err(|_| AppError::InvalidInput("invalid WKB hex".to_string()))?;
        let byte = u8::from_str_radix(s, 16).map_err(|_| AppError::InvalidInput("invalid WKB hex".to_string()))?;
        out.push(byte);
    }
    Ok(out)
}

fn decode_line_string(bytes: &[u8]) -> Result<Vec<Point>> {
    if bytes.len() < 9 {
        return Err(AppError::InvalidInput("WKB too short".to_string()));
    }
    let little_endian = bytes[0] == 1;
    let read_u32 = |b: &[u8]| -> u32 {
        if little_endian {
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        } else {
            u32::from_be_bytes([b[0], b[1], b[2], b[3]])
        }
    };
    let read_f64 = |b: &[u8]| -> f64 {
        let arr: [u8; 8] = b[..8].try_into().unwrap();
        if little_endian {
            f64::from_le_bytes(arr)
        } else {
            f64::from_be_bytes(arr)
        }
    };

    let geom_type = read_u32(&bytes[1..5]);
    if geom_type != WKB_LINESTRING {
        return Err(AppError::InvalidInput(format!(
            "expected WKB LineString (type 2), got type {geom_type}"
        )));
    }

    let num_points = read_u32(&bytes[5..9]) as usize;
    let mut offset = 9;
    let mut points = Vec::with_capacity(num_points);
    for _ in 0..num_points {
        if offset + 16 > bytes.len() {
            return Err(AppError::InvalidInput("WKB truncated".to_string()));
        }
        let x = read_f64(&bytes[offset..offset + 8]);
        let y = read_f64(&bytes[offset + 8..offset + 16]);
        points.push(Point::new(x, y));
        offset += 16;
    }
    Ok(points)
}

/// Encode a polyline back into the same little-endian WKB LineString hex
/// form, for round-trip tests and the byte-equal re-serialisation property.
pub fn encode_line_string_hex(points: &[Point]) -> String {
    let mut bytes = Vec::with_capacity(9 + points.len() * 16);
    bytes.push(1u8); // little-endian
    bytes.extend_from_slice(&WKB_LINESTRING.to_le_bytes());
    bytes.extend_from_slice(&(points.len() as u32).to_le_bytes());
    for p in points {
        bytes.extend_from_slice(&p.x().to_le_bytes());
        bytes.extend_from_slice(&p.y().to_le_bytes());
    }
    let mut hex = String::with_capacity(2 + bytes.len() * 2);
    hex.push_str("0x");
    for b in bytes {
        hex.push_str(&format!("{:02x}", b));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_line_string() {
        let pts = vec![Point::new(-83.93, 35.96), Point::new(-83.92, 35.97)];
        let hex = encode_line_string_hex(&pts);
        let decoded = decode_line_string_hex(&hex).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!((decoded[0].x() - pts[0].x()).abs() < 1e-12);
        assert!((decoded[1].y() - pts[1].y()).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_linestring_types() {
        // geom type 1 = Point, should be rejected.
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        bytes.extend_from_slice(&0.0f64.to_le_bytes());
        let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        assert!(decode_line_string_hex(&format!("0x{hex}")).is_err());
    }
}
