use geo::Coord;
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use crate::geometry::chord_distance;
use crate::network::{EdgeLookup, NodeId, RoadEdge, RoadNetwork};

/// Smallest straight piece of a road polyline, with the parent edge's attributes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementarySegment {
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    /// Chord length between the two vertices (meters)
    pub cartesian_length: f64,
    /// Even share of the parent edge's authoritative length (meters)
    pub osm_length_share: f64,
    pub highway: String,
    pub surface: Option<String>,
    pub tracktype: Option<String>,
}

/// Flat row form shared by checkpoints and the exported segment table.
///
/// `x` columns hold latitudes and `y` columns longitudes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    #[serde(rename = "cartesianLength")]
    pub cartesian_length: f64,
    #[serde(rename = "osmLengthShare")]
    pub osm_length_share: f64,
    pub highway: String,
    pub surface: Option<String>,
    pub tracktype: Option<String>,
}

impl From<&ElementarySegment> for SegmentRecord {
    fn from(segment: &ElementarySegment) -> Self {
        Self {
            x0: segment.start.y,
            y0: segment.start.x,
            x1: segment.end.y,
            y1: segment.end.x,
            cartesian_length: segment.cartesian_length,
            osm_length_share: segment.osm_length_share,
            highway: segment.highway.clone(),
            surface: segment.surface.clone(),
            tracktype: segment.tracktype.clone(),
        }
    }
}

impl From<SegmentRecord> for ElementarySegment {
    fn from(record: SegmentRecord) -> Self {
        Self {
            start: Coord {
                x: record.y0,
                y: record.x0,
            },
            end: Coord {
                x: record.y1,
                y: record.x1,
            },
            cartesian_length: record.cartesian_length,
            osm_length_share: record.osm_length_share,
            highway: record.highway,
            surface: record.surface,
            tracktype: record.tracktype,
        }
    }
}

/// Split an edge's polyline into elementary segments, optionally walking it backwards.
///
/// The authoritative length is apportioned evenly over the segments; only the total is
/// trusted, not the per-vertex distances.
pub fn edge_segments(edge: &RoadEdge, reversed: bool) -> Vec<ElementarySegment> {
    let mut coords = edge.geometry.clone();
    if reversed {
        coords.reverse();
    }

    let count = coords.len().saturating_sub(1);
    if count == 0 {
        return Vec::new();
    }
    let share = edge.length / count as f64;

    coords
        .windows(2)
        .map(|w| ElementarySegment {
            start: w[0],
            end: w[1],
            cartesian_length: chord_distance(w[0], w[1]),
            osm_length_share: share,
            highway: edge.tags.highway.clone(),
            surface: edge.tags.surface.clone(),
            tracktype: edge.tags.tracktype.clone(),
        })
        .collect()
}

/// Elementary segments travelling from `from` to `to`.
///
/// Uses the `(from, to)` record when present, otherwise the `(to, from)` record reversed.
pub fn extract_segments(
    network: &RoadNetwork,
    from: NodeId,
    to: NodeId,
) -> Result<Vec<ElementarySegment>> {
    match network.lookup_edge(from, to) {
        EdgeLookup::Forward(edge) => Ok(edge_segments(edge, false)),
        EdgeLookup::Reverse(edge) => Ok(edge_segments(edge, true)),
        EdgeLookup::Missing => Err(MatchError::GraphIntegrity(format!(
            "no edge between nodes {} and {} in either direction",
            from, to
        ))),
    }
}

/// Elementary segments along a node path, consecutive pair by consecutive pair
pub fn path_segments(network: &RoadNetwork, path: &[NodeId]) -> Result<Vec<ElementarySegment>> {
    let mut segments = Vec::new();
    for pair in path.windows(2) {
        segments.extend(extract_segments(network, pair[0], pair[1])?);
    }
    Ok(segments)
}
