//! Small-scale geometry helpers.
//!
//! Coordinates are `geo::Coord` values with `x` = longitude and `y` = latitude, in degrees.
//! Distances between nearby points use the straight chord through a spherical Earth rather
//! than a geodesic; at the scale of a road segment the difference is negligible.

use geo::{Coord, Distance, Haversine, Point, Rect};

/// Mean Earth radius used by the chord approximation (km)
pub const EARTH_RADIUS_KM: f64 = 6371.8;

/// Meters per degree of latitude on the same sphere
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_KM * 1000.0 * std::f64::consts::PI / 180.0;

/// Position on the sphere in Earth-centered Cartesian coordinates (km)
pub fn to_cartesian(coord: Coord<f64>) -> [f64; 3] {
    let lat = coord.y.to_radians();
    let lon = coord.x.to_radians();
    [
        EARTH_RADIUS_KM * lat.cos() * lon.cos(),
        EARTH_RADIUS_KM * lat.cos() * lon.sin(),
        EARTH_RADIUS_KM * lat.sin(),
    ]
}

/// Straight-line distance through the sphere between two coordinates, in meters
pub fn chord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let ra = to_cartesian(a);
    let rb = to_cartesian(b);
    let dx = ra[0] - rb[0];
    let dy = ra[1] - rb[1];
    let dz = ra[2] - rb[2];
    1000.0 * (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Planar distance from `p` to the segment `a`-`b`, in the units of the inputs.
///
/// The projection of `p` onto the segment's line is clamped to the segment, so points beyond
/// either end measure to that end.
pub fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let v = b - a;
    let w = p - a;

    let c1 = w.x * v.x + w.y * v.y;
    if c1 <= 0.0 {
        return planar_distance(p, a);
    }

    let c2 = v.x * v.x + v.y * v.y;
    if c2 <= c1 {
        return planar_distance(p, b);
    }

    let t = c1 / c2;
    planar_distance(p, a + v * t)
}

pub fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let d = a - b;
    (d.x * d.x + d.y * d.y).sqrt()
}

/// Distance from `p` to the nearest side of `rect`, in meters.
///
/// The rectangle's corners are projected onto a local equirectangular plane centered on `p`,
/// then each side is measured with [`point_segment_distance`]. A point outside `rect` lies in
/// unfetched territory and scores 0.
pub fn boundary_distance(p: Coord<f64>, rect: Rect<f64>) -> f64 {
    if !rect_contains(&rect, p) {
        return 0.0;
    }
    let scale_x = METERS_PER_DEGREE * p.y.to_radians().cos();
    let project = |c: Coord<f64>| Coord {
        x: (c.x - p.x) * scale_x,
        y: (c.y - p.y) * METERS_PER_DEGREE,
    };

    let min = rect.min();
    let max = rect.max();
    let corners = [
        project(min),
        project(Coord { x: max.x, y: min.y }),
        project(max),
        project(Coord { x: min.x, y: max.y }),
    ];
    let origin = Coord { x: 0.0, y: 0.0 };

    (0..4)
        .map(|i| point_segment_distance(origin, corners[i], corners[(i + 1) % 4]))
        .fold(f64::INFINITY, f64::min)
}

/// Bounding rectangle of a set of coordinates, `None` when empty
pub fn bounding_rect<I>(coords: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = Coord<f64>>,
{
    let mut iter = coords.into_iter();
    let first = iter.next()?;
    let (mut min, mut max) = (first, first);
    for c in iter {
        min.x = min.x.min(c.x);
        min.y = min.y.min(c.y);
        max.x = max.x.max(c.x);
        max.y = max.y.max(c.y);
    }
    Some(Rect::new(min, max))
}

/// Grow a rectangle by `delta` degrees on every side
pub fn expand_rect(rect: Rect<f64>, delta: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: rect.min().x - delta,
            y: rect.min().y - delta,
        },
        Coord {
            x: rect.max().x + delta,
            y: rect.max().y + delta,
        },
    )
}

/// Rectangle of the given extents centered on `center`
pub fn centered_rect(center: Coord<f64>, width: f64, height: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: center.x - width / 2.0,
            y: center.y - height / 2.0,
        },
        Coord {
            x: center.x + width / 2.0,
            y: center.y + height / 2.0,
        },
    )
}

/// Inclusive containment test; `geo::Contains` excludes the boundary
pub fn rect_contains(rect: &Rect<f64>, c: Coord<f64>) -> bool {
    c.x >= rect.min().x && c.x <= rect.max().x && c.y >= rect.min().y && c.y <= rect.max().y
}

/// Haversine length of a polyline in meters
pub fn polyline_length(coords: &[Coord<f64>]) -> f64 {
    coords
        .windows(2)
        .map(|w| Haversine.distance(Point::from(w[0]), Point::from(w[1])))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn c(lat: f64, lon: f64) -> Coord<f64> {
        Coord { x: lon, y: lat }
    }

    #[test]
    fn test_chord_distance_same_point() {
        let p = c(46.5, 6.6);
        assert_eq!(chord_distance(p, p), 0.0);
    }

    #[test]
    fn test_chord_matches_haversine_at_small_scale() {
        let a = c(46.5, 6.6);
        let b = c(46.501, 6.601);
        let chord = chord_distance(a, b);
        let arc = polyline_length(&[a, b]);
        assert!(approx_eq(chord, arc, 0.5), "chord {chord} arc {arc}");
    }

    #[test]
    fn test_point_segment_projection() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 10.0, y: 0.0 };
        assert!(approx_eq(point_segment_distance(Coord { x: 5.0, y: 3.0 }, a, b), 3.0, 1e-12));
        assert!(approx_eq(point_segment_distance(Coord { x: -4.0, y: 3.0 }, a, b), 5.0, 1e-12));
        assert!(approx_eq(point_segment_distance(Coord { x: 13.0, y: 4.0 }, a, b), 5.0, 1e-12));
    }

    #[test]
    fn test_point_segment_degenerate_segment() {
        let a = Coord { x: 1.0, y: 1.0 };
        assert!(approx_eq(point_segment_distance(Coord { x: 4.0, y: 5.0 }, a, a), 5.0, 1e-12));
    }

    #[test]
    fn test_boundary_distance_picks_nearest_side() {
        let rect = Rect::new(c(46.0, 6.0), c(46.1, 6.1));
        let near_south = c(46.001, 6.05);
        let d = boundary_distance(near_south, rect);
        // 0.001 degree of latitude
        assert!(approx_eq(d, 111.2, 1.0), "got {d}");

        let center = c(46.05, 6.05);
        assert!(boundary_distance(center, rect) > d);
    }

    #[test]
    fn test_boundary_distance_outside_rect_is_zero() {
        let rect = Rect::new(c(46.0, 6.0), c(46.1, 6.1));
        assert_eq!(boundary_distance(c(46.05, 6.102), rect), 0.0);
        assert_eq!(boundary_distance(c(45.9, 5.9), rect), 0.0);
        assert!(boundary_distance(c(46.05, 6.098), rect) > 100.0);
    }

    #[test]
    fn test_bounding_rect_and_expand() {
        assert!(bounding_rect(Vec::<Coord<f64>>::new()).is_none());
        let rect = bounding_rect(vec![c(1.0, 2.0), c(3.0, -1.0)]).unwrap();
        assert_eq!(rect.min(), c(1.0, -1.0));
        assert_eq!(rect.max(), c(3.0, 2.0));

        let grown = expand_rect(rect, 0.5);
        assert_eq!(grown.min(), c(0.5, -1.5));
        assert!(rect_contains(&grown, c(3.5, 2.5)));
        assert!(!rect_contains(&grown, c(3.6, 2.5)));
    }
}
