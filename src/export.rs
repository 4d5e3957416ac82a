use std::io::Write;

use serde_json::{Value, json};

use crate::error::Result;
use crate::segments::{ElementarySegment, SegmentRecord};

const JOIN_EPSILON: f64 = 1e-9;

/// Matched route as a GeoJSON FeatureCollection with a single LineString.
///
/// Consecutive segments sharing an endpoint are joined without repeating the vertex.
pub fn route_to_geojson(segments: &[ElementarySegment]) -> Value {
    let mut coordinates: Vec<[f64; 2]> = Vec::with_capacity(segments.len() + 1);

    for segment in segments {
        let joined = coordinates.last().is_some_and(|last| {
            (last[0] - segment.start.x).abs() <= JOIN_EPSILON
                && (last[1] - segment.start.y).abs() <= JOIN_EPSILON
        });
        if !joined {
            coordinates.push([segment.start.x, segment.start.y]);
        }
        coordinates.push([segment.end.x, segment.end.y]);
    }

    let length: f64 = segments.iter().map(|s| s.osm_length_share).sum();
    json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {
                "type": "matched_route",
                "segments": segments.len(),
                "length": length
            },
            "geometry": {
                "type": "LineString",
                "coordinates": coordinates
            }
        }]
    })
}

/// Segment table with columns `x0,y0,x1,y1,cartesianLength,osmLengthShare,highway,surface,tracktype`
pub fn write_segments_csv<W: Write>(writer: W, segments: &[ElementarySegment]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for segment in segments {
        csv_writer.serialize(SegmentRecord::from(segment))?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn segment(x0: f64, x1: f64) -> ElementarySegment {
        ElementarySegment {
            start: Coord { x: x0, y: 46.5 },
            end: Coord { x: x1, y: 46.5 },
            cartesian_length: 10.0,
            osm_length_share: 10.0,
            highway: "residential".to_string(),
            surface: Some("asphalt".to_string()),
            tracktype: None,
        }
    }

    #[test]
    fn test_geojson_joins_shared_vertices() {
        let geojson = route_to_geojson(&[segment(6.0, 6.1), segment(6.1, 6.2), segment(7.0, 7.1)]);
        let coords = geojson["features"][0]["geometry"]["coordinates"]
            .as_array()
            .unwrap();
        assert_eq!(coords.len(), 5);
        assert_eq!(coords[0][0], 6.0);
        assert_eq!(coords[0][1], 46.5);
        assert_eq!(geojson["features"][0]["properties"]["length"], 30.0);
    }

    #[test]
    fn test_csv_columns() {
        let mut out = Vec::new();
        write_segments_csv(&mut out, &[segment(6.0, 6.1)]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("x0,y0,x1,y1,cartesianLength,osmLengthShare,highway,surface,tracktype")
        );
        assert_eq!(lines.next(), Some("46.5,6.0,46.5,6.1,10.0,10.0,residential,asphalt,"));
    }
}
