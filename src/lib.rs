//! Offline map matching of GPS traces onto a road network.
//!
//! Trace points are snapped to graph nodes batch by batch, the node sequence is collapsed into
//! node-to-node pieces, and every piece is resolved to the best of a few shortest paths. The
//! result is an ordered list of elementary road segments carrying the road's tags.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod kpaths;
pub mod matcher;
pub mod network;
pub mod network_cache;
pub mod osm;
pub mod pieces;
pub mod provider;
pub mod router;
pub mod segments;
pub mod snapping;
pub mod trace;

pub use checkpoint::{BatchId, CheckpointStore, CsvCheckpointStore};
pub use config::MatcherConfig;
pub use error::{MatchError, Result};
pub use matcher::{MatchedRoute, RoadMatcher};
pub use network::{Node, NodeId, RoadEdge, RoadNetwork, RoadTags};
pub use network_cache::CachedNetworkProvider;
pub use pieces::Piece;
pub use provider::{NetworkProvider, RetryingProvider, StaticNetworkProvider};
pub use router::PieceOutcome;
pub use segments::ElementarySegment;
pub use snapping::NodeMatch;
pub use trace::TracePoint;
