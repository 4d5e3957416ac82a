use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use geo::Coord;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// A raw location sample; `index` is its 0-based position in the trace
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub index: usize,
    pub coord: Coord<f64>,
}

impl TracePoint {
    pub fn new(index: usize, latitude: f64, longitude: f64) -> Self {
        Self {
            index,
            coord: Coord {
                x: longitude,
                y: latitude,
            },
        }
    }

    pub fn latitude(&self) -> f64 {
        self.coord.y
    }

    pub fn longitude(&self) -> f64 {
        self.coord.x
    }
}

/// Number `(latitude, longitude)` pairs into trace points
pub fn trace_from_latlon(points: &[(f64, f64)]) -> Vec<TracePoint> {
    points
        .iter()
        .enumerate()
        .map(|(i, &(lat, lon))| TracePoint::new(i, lat, lon))
        .collect()
}

/// Check that indices are 0-based and contiguous
pub fn validate_trace(points: &[TracePoint]) -> Result<()> {
    if points.is_empty() {
        return Err(MatchError::EmptyTrace);
    }
    for (expected, point) in points.iter().enumerate() {
        if point.index != expected {
            return Err(MatchError::InvalidTrace(format!(
                "point at position {} has index {}",
                expected, point.index
            )));
        }
        if !point.coord.x.is_finite() || !point.coord.y.is_finite() {
            return Err(MatchError::InvalidTrace(format!(
                "point {} has a non-finite coordinate",
                expected
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TraceRow {
    latitude: f64,
    longitude: f64,
}

/// Read a trace from a GPX or `latitude,longitude[,elevation]` CSV file, chosen by extension
pub fn load_trace(path: impl AsRef<Path>) -> Result<Vec<TracePoint>> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path)?);
    let is_gpx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));

    let points = if is_gpx {
        read_gpx(file)?
    } else {
        read_csv(file)?
    };
    info!("Loaded {} trace points from {:?}", points.len(), path);
    Ok(points)
}

/// Track points of every track segment, in file order. Elevation is ignored.
pub fn read_gpx<R: Read>(reader: R) -> Result<Vec<TracePoint>> {
    let gpx = gpx::read(reader)?;
    let coords = gpx
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(|waypoint| waypoint.point());

    Ok(coords
        .enumerate()
        .map(|(index, point)| TracePoint {
            index,
            coord: point.0,
        })
        .collect())
}

pub fn read_csv<R: Read>(reader: R) -> Result<Vec<TracePoint>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut points = Vec::new();
    for (index, row) in csv_reader.deserialize::<TraceRow>().enumerate() {
        let row = row?;
        points.push(TracePoint::new(index, row.latitude, row.longitude));
    }
    Ok(points)
}
