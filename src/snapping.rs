use geo::{Coord, Rect};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::config::MatcherConfig;
use crate::error::{MatchError, Result};
use crate::geometry::{
    boundary_distance, bounding_rect, centered_rect, chord_distance, expand_rect,
};
use crate::network::{EdgeKey, Node, NodeId, RoadNetwork};
use crate::provider::NetworkProvider;
use crate::trace::TracePoint;

/// Graph node assigned to one trace point
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeMatch {
    pub point_index: usize,
    pub node_id: NodeId,
    pub node_coord: Coord<f64>,
    /// Trace point to node (meters)
    pub point_distance: f64,
    /// Node to the nearest side of the fetched region (meters)
    pub boundary_distance: f64,
}

/// Endpoint of `edge` closer to `point` by chord distance; ties go to the edge's end node
pub fn nearest_edge_end(
    network: &RoadNetwork,
    edge: EdgeKey,
    point: Coord<f64>,
) -> Result<Node> {
    let record = network.edge(edge).ok_or_else(|| {
        MatchError::GraphIntegrity(format!("edge ({}, {}) not in network", edge.0, edge.1))
    })?;

    let (Some(first), Some(last)) = (record.geometry.first(), record.geometry.last()) else {
        return Err(MatchError::GraphIntegrity(format!(
            "edge ({}, {}) has no geometry",
            edge.0, edge.1
        )));
    };

    let id = if chord_distance(*first, point) < chord_distance(*last, point) {
        record.from
    } else {
        record.to
    };

    network
        .node(id)
        .copied()
        .ok_or_else(|| MatchError::GraphIntegrity(format!("edge endpoint {} not in network", id)))
}

/// Snaps trace points to graph nodes, one batch per network fetch
pub struct TraceSnapper<'a, P: ?Sized> {
    provider: &'a P,
    config: &'a MatcherConfig,
}

impl<'a, P: NetworkProvider + ?Sized> TraceSnapper<'a, P> {
    pub fn new(provider: &'a P, config: &'a MatcherConfig) -> Self {
        Self { provider, config }
    }

    /// Snap one batch: fetch the batch's expanded bounding box, snap each point, and re-snap
    /// any point whose node sits too close to the fetched boundary.
    pub fn snap_batch(&self, batch: &[TracePoint]) -> Result<Vec<NodeMatch>> {
        let Some(points_rect) = bounding_rect(batch.iter().map(|p| p.coord)) else {
            return Ok(Vec::new());
        };
        let bbox = expand_rect(points_rect, self.config.delta);
        let network = self.provider.fetch_network(bbox)?;
        debug!(
            "Snapping {} points against {} nodes / {} edges",
            batch.len(),
            network.node_count(),
            network.edge_count()
        );

        let mut matches = Vec::with_capacity(batch.len());
        for point in batch {
            let node_match = self
                .snap_point(&network, bbox, point)?
                .ok_or(MatchError::UnmatchedPoint {
                    point_index: point.index,
                })?;
            trace!(
                "Point {} -> node {} ({:.1} m, {:.1} m from boundary)",
                point.index,
                node_match.node_id,
                node_match.point_distance,
                node_match.boundary_distance
            );
            matches.push(node_match);
        }

        for node_match in matches.iter_mut() {
            if node_match.boundary_distance < self.config.min_boundary_distance {
                let point = &batch[node_match.point_index - batch[0].index];
                *node_match = self.resnap_away_from_boundary(point, bbox)?;
            }
        }

        Ok(matches)
    }

    /// Snap `point` against an already fetched network covering `bbox`
    pub fn snap_point(
        &self,
        network: &RoadNetwork,
        bbox: Rect<f64>,
        point: &TracePoint,
    ) -> Result<Option<NodeMatch>> {
        let Some(edge) = self.provider.nearest_edge(network, point.coord) else {
            return Ok(None);
        };
        let node = nearest_edge_end(network, edge, point.coord)?;
        Ok(Some(NodeMatch {
            point_index: point.index,
            node_id: node.id,
            node_coord: node.coord,
            point_distance: chord_distance(point.coord, node.coord),
            boundary_distance: boundary_distance(node.coord, bbox),
        }))
    }

    /// Re-center a window of the batch's extent on the point and grow it by one `delta` per
    /// attempt until the matched node is far enough from the boundary.
    ///
    /// Fails with `UnmatchedPoint` if no window holds an edge near the point.
    fn resnap_away_from_boundary(
        &self,
        point: &TracePoint,
        batch_bbox: Rect<f64>,
    ) -> Result<NodeMatch> {
        warn!(
            "Point {} matched close to the fetched boundary, refetching around it",
            point.index
        );

        let mut closest = None;
        let attempts = self.config.max_boundary_retries + 1;
        for attempt in 0..attempts {
            let grow = 2.0 * attempt as f64 * self.config.delta;
            let window = centered_rect(
                point.coord,
                batch_bbox.width() + grow,
                batch_bbox.height() + grow,
            );
            let network = self.provider.fetch_network(window)?;

            let min_distance = self.config.min_boundary_distance;
            match self.snap_point(&network, window, point)? {
                Some(node_match) if node_match.boundary_distance >= min_distance => {
                    debug!(
                        "Point {} re-snapped to node {} on attempt {}",
                        point.index,
                        node_match.node_id,
                        attempt + 1
                    );
                    return Ok(node_match);
                }
                Some(node_match) => {
                    debug!(
                        "Point {} still {:.1} m from boundary on attempt {}",
                        point.index,
                        node_match.boundary_distance,
                        attempt + 1
                    );
                    closest = Some(node_match.boundary_distance);
                }
                None => debug!(
                    "No edges around point {} on attempt {}",
                    point.index,
                    attempt + 1
                ),
            }
        }

        match closest {
            Some(distance) => Err(MatchError::BoundaryRetriesExhausted {
                point_index: point.index,
                attempts,
                distance,
            }),
            None => Err(MatchError::UnmatchedPoint {
                point_index: point.index,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{RoadEdge, RoadTags};

    fn network() -> RoadNetwork {
        let a = Node {
            id: 1,
            coord: Coord { x: 0.0, y: 0.0 },
        };
        let b = Node {
            id: 2,
            coord: Coord { x: 0.001, y: 0.0 },
        };
        let edge = RoadEdge {
            from: 1,
            to: 2,
            geometry: vec![a.coord, Coord { x: 0.0005, y: 0.0002 }, b.coord],
            length: 115.0,
            tags: RoadTags::default(),
            oneway: false,
        };
        RoadNetwork::new(None, vec![a, b], vec![edge]).unwrap()
    }

    #[test]
    fn test_nearest_edge_end_picks_closer_endpoint() {
        let network = network();
        let near_a = Coord { x: 0.0003, y: 0.0001 };
        let near_b = Coord { x: 0.0008, y: -0.0001 };
        assert_eq!(nearest_edge_end(&network, (1, 2), near_a).unwrap().id, 1);
        assert_eq!(nearest_edge_end(&network, (1, 2), near_b).unwrap().id, 2);
    }

    #[test]
    fn test_unknown_edge() {
        let network = network();
        assert!(nearest_edge_end(&network, (2, 1), Coord { x: 0.0, y: 0.0 }).is_err());
    }
}
