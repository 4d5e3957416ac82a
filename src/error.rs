use std::path::PathBuf;

use crate::network::NodeId;

/// Errors raised while matching a trace onto the road network
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("No road edge found near trace point {point_index}")]
    UnmatchedPoint { point_index: usize },

    #[error("Node {node} is not in the loaded subgraph")]
    NodeNotInSubgraph { node: NodeId },

    #[error("No path found from node {from} to node {to}")]
    NoPathFound { from: NodeId, to: NodeId },

    #[error("Network provider error: {0}")]
    Provider(String),

    #[error("Graph integrity error: {0}")]
    GraphIntegrity(String),

    #[error("Corrupt cache artifact {path:?}: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    #[error(
        "Trace point {point_index} matched a node {distance:.1} m from the fetched boundary after {attempts} attempts"
    )]
    BoundaryRetriesExhausted {
        point_index: usize,
        attempts: u32,
        distance: f64,
    },

    #[error("Trace is empty")]
    EmptyTrace,

    #[error("Invalid trace: {0}")]
    InvalidTrace(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GPX parsing error: {0}")]
    Gpx(#[from] gpx::errors::GpxError),

    #[error("OSM extract error: {0}")]
    Osm(#[from] osmpbf::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MatchError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, MatchError::Provider(_))
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        MatchError::CacheCorruption {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
