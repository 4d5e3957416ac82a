use std::ops::RangeInclusive;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::network::NodeId;
use crate::snapping::NodeMatch;

/// Run of trace points attributed to travel between two graph nodes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub start_index: usize,
    /// Inclusive; shared with the next piece's `start_index`
    pub end_index: usize,
}

impl Piece {
    pub fn point_range(&self) -> RangeInclusive<usize> {
        self.start_index..=self.end_index
    }

    pub fn point_count(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

/// Collapse the per-point node sequence into node-to-node transition pieces.
///
/// From `j0`, skip ahead to the first different node (`node1` at `j1`), then follow the run of
/// `node1` to `j2`. Both scans step over a single stray reading that is followed by a return to
/// the node being followed, so a lone reading never opens a piece. The piece ends at the
/// sample in `[j1, j2)` closest to `node1`, or at the last point if the run reaches the end.
/// Trailing points that never leave the last node are folded into the previous piece.
/// A trace that stays on one node throughout yields no pieces.
pub fn segment_node_runs(matches: &[NodeMatch]) -> Vec<Piece> {
    let n = matches.len();
    let mut pieces: Vec<Piece> = Vec::new();
    if n < 2 {
        return pieces;
    }

    let node_at = |j: usize| matches[j].node_id;

    let mut j0 = 0;
    while j0 < n - 1 {
        let node0 = node_at(j0);

        let mut j1 = j0 + 1;
        while j1 < n {
            if node_at(j1) == node0 {
                j1 += 1;
            } else if j1 + 1 < n && node_at(j1 + 1) == node0 {
                j1 += 2;
            } else {
                break;
            }
        }
        if j1 == n {
            if let Some(last) = pieces.last_mut() {
                last.end_index = n - 1;
            }
            break;
        }
        let node1 = node_at(j1);

        let mut j2 = j1 + 1;
        while j2 < n {
            if node_at(j2) == node1 {
                j2 += 1;
            } else if j2 + 1 < n && node_at(j2 + 1) == node1 {
                j2 += 2;
            } else {
                break;
            }
        }

        let j3 = if j2 >= n {
            n - 1
        } else {
            (j1..j2)
                .filter(|&j| node_at(j) == node1)
                .min_by_key(|&j| (OrderedFloat(matches[j].point_distance), j))
                .unwrap_or(j1)
        };

        pieces.push(Piece {
            start_node: node0,
            end_node: node1,
            start_index: j0,
            end_index: j3,
        });
        j0 = j3;
    }

    pieces
}
