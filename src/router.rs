use geo::Coord;
use log::{debug, trace, warn};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::checkpoint::BatchId;
use crate::config::MatcherConfig;
use crate::error::{MatchError, Result};
use crate::geometry::{bounding_rect, expand_rect, point_segment_distance};
use crate::network::{NodeId, RoadNetwork};
use crate::pieces::Piece;
use crate::provider::NetworkProvider;
use crate::segments::{ElementarySegment, path_segments};
use crate::trace::TracePoint;

/// One scored path considered for a piece
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateRoute {
    pub nodes: Vec<NodeId>,
    pub segments: Vec<ElementarySegment>,
    /// Sum of squared planar distances (degrees²) from the piece's points to the polyline
    pub path_error: f64,
    /// Sum of the segments' authoritative lengths (meters)
    pub path_length: f64,
}

impl CandidateRoute {
    pub fn new(nodes: Vec<NodeId>, segments: Vec<ElementarySegment>, points: &[Coord<f64>]) -> Self {
        let path_error = path_error(&segments, points);
        let path_length = path_length(&segments);
        Self {
            nodes,
            segments,
            path_error,
            path_length,
        }
    }
}

/// Summary of how one piece was resolved
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PieceOutcome {
    pub piece: Piece,
    pub candidates: usize,
    pub selected: usize,
    pub path_error: f64,
    pub path_length: f64,
    pub weight: f64,
}

/// Sum over `points` of the squared distance to the closest segment
pub fn path_error(segments: &[ElementarySegment], points: &[Coord<f64>]) -> f64 {
    points
        .iter()
        .map(|p| {
            let d = segments
                .iter()
                .map(|s| point_segment_distance(*p, s.start, s.end))
                .fold(f64::INFINITY, f64::min);
            d * d
        })
        .sum()
}

pub fn path_length(segments: &[ElementarySegment]) -> f64 {
    segments.iter().map(|s| s.osm_length_share).sum()
}

/// Weight of each candidate; lower is better.
///
/// Pieces with fewer than `short_threshold` points carry too little shape to compare, so the
/// weight is the length alone. Otherwise the shape error is scaled by `exp(length / dmin)`,
/// `dmin` being the shortest candidate length.
pub fn candidate_weights(
    candidates: &[CandidateRoute],
    point_count: usize,
    short_threshold: usize,
) -> Vec<f64> {
    if point_count < short_threshold {
        return candidates.iter().map(|c| c.path_length).collect();
    }

    let dmin = candidates
        .iter()
        .map(|c| c.path_length)
        .fold(f64::INFINITY, f64::min);
    candidates
        .iter()
        .map(|c| {
            if dmin > 0.0 {
                c.path_error * (c.path_length / dmin).exp()
            } else {
                c.path_error
            }
        })
        .collect()
}

/// Index of the first minimum weight
pub fn select_candidate(weights: &[f64]) -> Option<usize> {
    weights
        .iter()
        .enumerate()
        .min_by_key(|&(i, w)| (OrderedFloat(*w), i))
        .map(|(i, _)| i)
}

struct RouteWindow {
    batch: BatchId,
    covered_end: usize,
    attempt: u32,
    network: RoadNetwork,
}

/// Resolves pieces into segments against a network window that follows the trace batch by batch
pub struct PieceRouter<'a, P: ?Sized> {
    provider: &'a P,
    config: &'a MatcherConfig,
    points: &'a [TracePoint],
    window: Option<RouteWindow>,
}

impl<'a, P: NetworkProvider + ?Sized> PieceRouter<'a, P> {
    pub fn new(provider: &'a P, config: &'a MatcherConfig, points: &'a [TracePoint]) -> Self {
        Self {
            provider,
            config,
            points,
            window: None,
        }
    }

    /// Pick the best of up to K shortest paths for `piece` and return its segments.
    ///
    /// A missing node or path triggers a re-fetch with the window grown by one `delta`, at most
    /// `max_fetch_retries` times; the last failure is returned after that.
    pub fn route_piece(&mut self, piece: &Piece) -> Result<(Vec<ElementarySegment>, PieceOutcome)> {
        let batch = BatchId::containing(
            piece.start_index,
            self.config.points_per_batch,
            self.points.len(),
        );
        let covered_end = batch.end.max(piece.end_index + 1).min(self.points.len());

        let reused = self
            .window
            .as_ref()
            .filter(|w| w.batch == batch && w.covered_end >= covered_end)
            .map(|w| w.attempt);
        let mut attempt = match reused {
            Some(attempt) => attempt,
            None => {
                self.load_window(batch, covered_end, 0)?;
                0
            }
        };

        loop {
            let Some(window) = self.window.as_ref() else {
                return Err(MatchError::Provider("route window not loaded".to_string()));
            };
            let error = match self.provider.shortest_paths(
                &window.network,
                piece.start_node,
                piece.end_node,
                self.config.candidate_paths,
            ) {
                Ok(paths) if !paths.is_empty() => {
                    return self.select_path(piece, &window.network, paths);
                }
                Ok(_) => MatchError::NoPathFound {
                    from: piece.start_node,
                    to: piece.end_node,
                },
                Err(e @ MatchError::NodeNotInSubgraph { .. }) => e,
                Err(e) => return Err(e),
            };

            if attempt >= self.config.max_fetch_retries {
                return Err(error);
            }
            attempt += 1;
            warn!(
                "{} for piece {}..={}, widening route window (retry {}/{})",
                error,
                piece.start_index,
                piece.end_index,
                attempt,
                self.config.max_fetch_retries
            );
            let covered_end = self.window.as_ref().map_or(covered_end, |w| w.covered_end);
            self.load_window(batch, covered_end, attempt)?;
        }
    }

    fn load_window(&mut self, batch: BatchId, covered_end: usize, attempt: u32) -> Result<()> {
        let covered = &self.points[batch.start..covered_end];
        let Some(rect) = bounding_rect(covered.iter().map(|p| p.coord)) else {
            return Err(MatchError::InvalidTrace(format!(
                "no trace points in route batch {}..{}",
                batch.start, covered_end
            )));
        };
        let grow = (attempt + 1) as f64 * self.config.delta;
        let network = self.provider.fetch_network(expand_rect(rect, grow))?;
        debug!(
            "Route window for points {}..{} (attempt {}): {} nodes, {} edges",
            batch.start,
            covered_end,
            attempt,
            network.node_count(),
            network.edge_count()
        );
        self.window = Some(RouteWindow {
            batch,
            covered_end,
            attempt,
            network,
        });
        Ok(())
    }

    fn select_path(
        &self,
        piece: &Piece,
        network: &RoadNetwork,
        paths: Vec<Vec<NodeId>>,
    ) -> Result<(Vec<ElementarySegment>, PieceOutcome)> {
        let points: Vec<Coord<f64>> = self.points[piece.point_range()]
            .iter()
            .map(|p| p.coord)
            .collect();

        let mut candidates = Vec::with_capacity(paths.len());
        for nodes in paths {
            let segments = path_segments(network, &nodes)?;
            candidates.push(CandidateRoute::new(nodes, segments, &points));
        }

        let weights = candidate_weights(
            &candidates,
            piece.point_count(),
            self.config.short_piece_threshold,
        );
        let selected = select_candidate(&weights).ok_or(MatchError::NoPathFound {
            from: piece.start_node,
            to: piece.end_node,
        })?;

        for (i, (candidate, weight)) in candidates.iter().zip(&weights).enumerate() {
            trace!(
                "Piece {}->{} candidate {}: {} nodes, error {:.3e}, length {:.1} m, weight {:.3e}",
                piece.start_node,
                piece.end_node,
                i,
                candidate.nodes.len(),
                candidate.path_error,
                candidate.path_length,
                weight
            );
        }

        let outcome = PieceOutcome {
            piece: *piece,
            candidates: candidates.len(),
            selected,
            path_error: candidates[selected].path_error,
            path_length: candidates[selected].path_length,
            weight: weights[selected],
        };
        let segments = candidates.swap_remove(selected).segments;
        Ok((segments, outcome))
    }
}
