//! WGS-84 geodesic primitives: distance, bearing, interpolation, the
//! perpendicular-foot intercept, and the rectangle construction used by
//! the area fitter and turn-around detector.

use geo::{Bearing, Destination, Distance, Haversine};

/// Mean earth radius in meters, as used throughout the geodesic helpers.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Tolerance for comparing doubles that are not GPS coordinates.
pub const EPSILON: f64 = 1e-14;

/// Tolerance for comparing GPS coordinates (looser: 100 * machine epsilon).
pub const GPS_EPSILON: f64 = f64::EPSILON * 100.0;

/// Stop tolerance for the `intercept` iteration, in degrees of lat/lon.
pub const INTERCEPT_EPSILON: f64 = 1e-8; // sqrt(EPSILON) * 0.01, rounded for readability

pub type Point = geo::Point<f64>;

pub fn doubles_are_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON
}

pub fn points_are_equal(a: Point, b: Point) -> bool {
    (a.x() - b.x()).abs() <= GPS_EPSILON && (a.y() - b.y()).abs() <= GPS_EPSILON
}

/// Geodesic distance in meters between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    Haversine.distance(a, b)
}

/// Length in meters of a polyline.
pub fn length(line: &[Point]) -> f64 {
    line.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Bearing in degrees from north, `[0,360)`, along the geodesic A->B at the
/// given fraction. `fraction <= 0` returns the initial bearing; `fraction
/// >= 1` returns the final bearing (identical to the initial bearing for a
/// single geodesic segment, since a great circle has one course).
pub fn bearing(a: Point, b: Point, _fraction: f64) -> f64 {
    normalize_bearing(Haversine.bearing(a, b))
}

pub fn normalize_bearing(deg: f64) -> f64 {
    let b = deg % 360.0;
    if b < 0.0 {
        b + 360.0
    } else {
        b
    }
}

/// Minimum circular difference between two bearings, in `[0,180]`.
pub fn heading_delta(a: f64, b: f64) -> f64 {
    let d = (normalize_bearing(a) - normalize_bearing(b)).abs();
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// The point at fraction `f` along the geodesic A->B, clamped to the
/// endpoints for `f` outside `[0,1]`.
pub fn interpolate(a: Point, b: Point, f: f64) -> Point {
    let f = f.clamp(0.0, 1.0);
    if f <= 0.0 {
        return a;
    }
    if f >= 1.0 {
        return b;
    }
    let d = distance(a, b);
    if d <= EPSILON {
        return a;
    }
    let brg = Haversine.bearing(a, b);
    Haversine.destination(a, brg, d * f)
}

/// The point at fraction `f` of a polyline's geodesic length.
pub fn interpolate_line(line: &[Point], f: f64) -> Point {
    assert!(line.len() >= 2, "polyline must have at least two points");
    let f = f.clamp(0.0, 1.0);
    let total = length(line);
    if total <= EPSILON {
        return line[0];
    }
    let target = total * f;
    let mut covered = 0.0;
    for w in line.windows(2) {
        let seg_len = distance(w[0], w[1]);
        if covered + seg_len >= target || seg_len <= EPSILON {
            let local_f = if seg_len > EPSILON {
                (target - covered) / seg_len
            } else {
                0.0
            };
            return interpolate(w[0], w[1], local_f);
        }
        covered += seg_len;
    }
    *line.last().unwrap()
}

/// Fractional position on segment A->B of the foot of the geodesic
/// perpendicular from C. Values in `[0,1]` mean C projects onto the
/// segment; outside that range it projects beyond an endpoint.
///
/// Implemented by Gnomonic projection centred on the current estimate of
/// the foot, iterating to convergence.
pub fn intercept(a: Point, b: Point, c: Point) -> f64 {
    let seg_len = distance(a, b);
    if seg_len <= EPSILON {
        return 0.0;
    }

    // Initial estimate: equirectangular projection onto the chord.
    let mut f = equirectangular_fraction(a, b, c);

    for _ in 0..10 {
        let foot = interpolate(a, b, f);
        // Gnomonic projection centred on `foot`: locally linearise the
        // geodesic through `foot` with bearing A->B, project C onto it.
        let brg = Haversine.bearing(a, b);
        let d_to_c = distance(foot, c);
        if d_to_c <= EPSILON {
            break;
        }
        let brg_to_c = Haversine.bearing(foot, c);
        let along = d_to_c * (brg_to_c - brg).to_radians().cos();
        let df = along / seg_len;
        let new_f = f + df;
        if (new_f - f).abs() < INTERCEPT_EPSILON {
            f = new_f;
            break;
        }
        f = new_f;
    }
    f
}

fn equirectangular_fraction(a: Point, b: Point, c: Point) -> f64 {
    let dx = b.x() - a.x();
    let dy = b.y() - a.y();
    let len2 = dx * dx + dy * dy;
    if len2 <= EPSILON {
        return 0.0;
    }
    ((c.x() - a.x()) * dx + (c.y() - a.y()) * dy) / len2
}

/// Fractional position along the full polyline minimising point-to-line
/// distance: compute the clamped foot on each segment, pick the minimum.
/// Returns the fraction of total polyline length, and the distance to C.
pub fn intercept_line(line: &[Point], c: Point) -> (f64, f64) {
    assert!(line.len() >= 2, "polyline must have at least two points");
    let total = length(line);
    if total <= EPSILON {
        return (0.0, distance(line[0], c));
    }

    let mut best_frac = 0.0;
    let mut best_dist = f64::INFINITY;
    let mut covered = 0.0;

    for w in line.windows(2) {
        let seg_len = distance(w[0], w[1]);
        let local_f = intercept(w[0], w[1], c).clamp(0.0, 1.0);
        let foot = interpolate(w[0], w[1], local_f);
        let d = distance(foot, c);
        if d < best_dist {
            best_dist = d;
            best_frac = (covered + seg_len * local_f) / total;
        }
        covered += seg_len;
    }

    (best_frac, best_dist)
}

/// Bearing of the polyline segment containing fraction `f` of its total
/// geodesic length, for computing a candidate road point's azimuth.
pub fn heading_at_fraction(line: &[Point], f: f64) -> f64 {
    assert!(line.len() >= 2, "polyline must have at least two points");
    let f = f.clamp(0.0, 1.0);
    let total = length(line);
    if total <= EPSILON {
        return bearing(line[0], line[1], 0.0);
    }
    let target = total * f;
    let mut covered = 0.0;
    for w in line.windows(2) {
        let seg_len = distance(w[0], w[1]);
        if covered + seg_len >= target || seg_len <= EPSILON {
            return bearing(w[0], w[1], 0.0);
        }
        covered += seg_len;
    }
    bearing(line[line.len() - 2], line[line.len() - 1], 0.0)
}

/// Axis-aligned bounding rectangle (in lat/lon) covering all points within
/// `r` meters of `p`.
pub fn envelope_for_radius(p: Point, r: f64) -> geo::Rect<f64> {
    let north = Haversine.destination(p, 0.0, r);
    let south = Haversine.destination(p, 180.0, r);
    let east = Haversine.destination(p, 90.0, r);
    let west = Haversine.destination(p, 270.0, r);
    geo::Rect::new(
        geo::coord! { x: west.x(), y: south.y() },
        geo::coord! { x: east.x(), y: north.y() },
    )
}

/// A 5-vertex closed rectangle ring whose two long edges are parallel to
/// the A->B geodesic, offset by `width/2` on each side, with ends
/// optionally extended by `ext` meters.
pub fn rect_ring(a: Point, b: Point, width: f64, ext: f64) -> Vec<Point> {
    let brg = Haversine.bearing(a, b);
    let half = width / 2.0;

    let start = if ext > 0.0 {
        Haversine.destination(a, brg + 180.0, ext)
    } else {
        a
    };
    let end = if ext > 0.0 {
        Haversine.destination(b, brg, ext)
    } else {
        b
    };

    let left_brg = normalize_bearing(brg - 90.0);
    let right_brg = normalize_bearing(brg + 90.0);

    let p1 = Haversine.destination(start, left_brg, half);
    let p2 = Haversine.destination(end, left_brg, half);
    let p3 = Haversine.destination(end, right_brg, half);
    let p4 = Haversine.destination(start, right_brg, half);

    vec![p1, p2, p3, p4, p1]
}

/// Point-in-ring test via the standard even-odd crossing rule, operated
/// directly on lon/lat as planar coordinates (adequate at the ring scales
/// used here, tens to low hundreds of meters).
pub fn point_in_ring(ring: &[Point], p: Point) -> bool {
    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i].x(), ring[i].y());
        let (xj, yj) = (ring[j].x(), ring[j].y());
        let intersects =
            ((yi > p.y()) != (yj > p.y())) && (p.x() < (xj - xi) * (p.y() - yi) / (yj - yi) + xi);
        if intersects {
            inside = !inside;
        }
        j = i;
    }
    inside
}
