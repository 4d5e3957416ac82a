use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{BatchId, CheckpointStore};
use crate::config::MatcherConfig;
use crate::error::{MatchError, Result};
use crate::pieces::{Piece, segment_node_runs};
use crate::provider::NetworkProvider;
use crate::router::{PieceOutcome, PieceRouter};
use crate::segments::ElementarySegment;
use crate::snapping::{NodeMatch, TraceSnapper};
use crate::trace::{TracePoint, validate_trace};

/// Everything produced by matching one trace
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchedRoute {
    pub node_matches: Vec<NodeMatch>,
    pub pieces: Vec<Piece>,
    /// One per routed piece; pieces restored from checkpoints have none
    pub outcomes: Vec<PieceOutcome>,
    pub segments: Vec<ElementarySegment>,
}

impl MatchedRoute {
    /// Sum of authoritative segment lengths (meters)
    pub fn total_osm_length(&self) -> f64 {
        self.segments.iter().map(|s| s.osm_length_share).sum()
    }

    pub fn total_cartesian_length(&self) -> f64 {
        self.segments.iter().map(|s| s.cartesian_length).sum()
    }
}

/// Snap, segment and route a trace against a network provider
pub struct RoadMatcher<P> {
    provider: P,
    config: MatcherConfig,
    checkpoints: Option<Box<dyn CheckpointStore>>,
    show_progress: bool,
}

impl<P: NetworkProvider> RoadMatcher<P> {
    pub fn new(provider: P, config: MatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            config,
            checkpoints: None,
            show_progress: false,
        })
    }

    /// Persist finished batches and restore them on later runs
    pub fn with_checkpoints(mut self, store: impl CheckpointStore + 'static) -> Self {
        self.checkpoints = Some(Box::new(store));
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn match_trace(&self, points: &[TracePoint]) -> Result<MatchedRoute> {
        validate_trace(points)?;
        let start = Instant::now();
        info!("Matching trace of {} points", points.len());

        let node_matches = self.snap_trace(points)?;
        let pieces = segment_node_runs(&node_matches);
        info!(
            "Snapped {} points into {} pieces in {:?}",
            node_matches.len(),
            pieces.len(),
            start.elapsed()
        );

        let (segments, outcomes) = self.route_pieces(points, &pieces)?;
        let route = MatchedRoute {
            node_matches,
            pieces,
            outcomes,
            segments,
        };
        info!(
            "Matched route: {} segments, {:.1} m, in {:?}",
            route.segments.len(),
            route.total_osm_length(),
            start.elapsed()
        );
        Ok(route)
    }

    /// One node match per trace point, in trace order.
    ///
    /// Batches are independent and run on the rayon pool when `parallel_batches` is set.
    pub fn snap_trace(&self, points: &[TracePoint]) -> Result<Vec<NodeMatch>> {
        let batches = BatchId::batches(points.len(), self.config.points_per_batch);
        let pb = self.progress_bar(batches.len(), "Snapping trace points");
        let snapper = TraceSnapper::new(&self.provider, &self.config);

        let snap = |batch: &BatchId| -> Result<Vec<NodeMatch>> {
            let matches = self.snap_batch(&snapper, points, batch)?;
            pb.inc(1);
            Ok(matches)
        };
        let per_batch: Vec<Vec<NodeMatch>> = if self.config.parallel_batches {
            batches.par_iter().map(snap).collect::<Result<_>>()?
        } else {
            batches.iter().map(snap).collect::<Result<_>>()?
        };
        pb.finish_and_clear();

        Ok(per_batch.into_iter().flatten().collect())
    }

    fn snap_batch(
        &self,
        snapper: &TraceSnapper<'_, P>,
        points: &[TracePoint],
        batch: &BatchId,
    ) -> Result<Vec<NodeMatch>> {
        if let Some(store) = &self.checkpoints {
            if let Some(matches) = store.load_node_matches(batch)? {
                debug!("Restored node matches for points {}..{}", batch.start, batch.end);
                return Ok(matches);
            }
        }

        let matches = snapper.snap_batch(&points[batch.start..batch.end])?;
        if matches.len() != batch.len() {
            return Err(MatchError::InvalidTrace(format!(
                "batch {}..{} produced {} matches",
                batch.start,
                batch.end,
                matches.len()
            )));
        }
        if let Some(store) = &self.checkpoints {
            store.save_node_matches(batch, &matches)?;
        }
        Ok(matches)
    }

    /// Route every piece in order.
    ///
    /// Pieces are grouped by the batch holding their start point; with checkpoints enabled a
    /// batch is either restored whole or routed whole and then saved.
    pub fn route_pieces(
        &self,
        points: &[TracePoint],
        pieces: &[Piece],
    ) -> Result<(Vec<ElementarySegment>, Vec<PieceOutcome>)> {
        let mut router = PieceRouter::new(&self.provider, &self.config, points);
        let mut segments = Vec::new();
        let mut outcomes = Vec::with_capacity(pieces.len());
        let pb = self.progress_bar(pieces.len(), "Routing pieces");

        let mut remaining = pieces;
        for batch in BatchId::batches(points.len(), self.config.points_per_batch) {
            let split = remaining
                .iter()
                .position(|piece| !batch.contains(piece.start_index))
                .unwrap_or(remaining.len());
            let (batch_pieces, rest) = remaining.split_at(split);
            remaining = rest;

            if let Some(store) = &self.checkpoints {
                if let Some(restored) = store.load_segments(&batch)? {
                    debug!(
                        "Restored {} segments for points {}..{}",
                        restored.len(),
                        batch.start,
                        batch.end
                    );
                    segments.extend(restored);
                    pb.inc(batch_pieces.len() as u64);
                    continue;
                }
            }

            let mut batch_segments = Vec::new();
            for piece in batch_pieces {
                let (piece_segments, outcome) = router.route_piece(piece)?;
                debug!(
                    "Piece {}->{} (points {}..={}): candidate {} of {}, {:.1} m",
                    piece.start_node,
                    piece.end_node,
                    piece.start_index,
                    piece.end_index,
                    outcome.selected + 1,
                    outcome.candidates,
                    outcome.path_length
                );
                batch_segments.extend(piece_segments);
                outcomes.push(outcome);
                pb.inc(1);
            }

            if let Some(store) = &self.checkpoints {
                store.save_segments(&batch, &batch_segments)?;
            }
            segments.extend(batch_segments);
        }
        pb.finish_and_clear();

        Ok((segments, outcomes))
    }

    fn progress_bar(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        pb.set_style(style);
        pb.set_message(message);
        pb
    }
}
