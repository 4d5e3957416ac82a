use std::collections::BTreeMap;
use std::fmt;

use geo::{Coord, Rect};
use log::{debug, warn};
use petgraph::graphmap::DiGraphMap;
use rstar::RTree;
use rstar::primitives::{GeomWithData, Line};
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use crate::geometry::{bounding_rect, rect_contains};

/// Graph-provider-assigned node identifier (OSM node ids)
pub type NodeId = i64;

/// Directed edge key `(from, to)`
pub type EdgeKey = (NodeId, NodeId);

type IndexedLine = GeomWithData<Line<[f64; 2]>, EdgeKey>;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub coord: Coord<f64>,
}

/// Road attributes carried onto every elementary segment
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadTags {
    pub highway: String,
    pub surface: Option<String>,
    pub tracktype: Option<String>,
}

/// A directed road edge between two graph nodes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// Polyline from `from` to `to`, at least two coordinates
    pub geometry: Vec<Coord<f64>>,
    /// Authoritative length of the whole polyline (meters)
    pub length: f64,
    pub tags: RoadTags,
    /// Only traversable from `from` to `to`
    #[serde(default)]
    pub oneway: bool,
}

impl RoadEdge {
    pub fn key(&self) -> EdgeKey {
        (self.from, self.to)
    }
}

/// Result of looking up a directed node pair
#[derive(Debug, Clone, Copy)]
pub enum EdgeLookup<'a> {
    /// Edge stored as `(from, to)`
    Forward(&'a RoadEdge),
    /// Only `(to, from)` is stored; geometry must be reversed
    Reverse(&'a RoadEdge),
    Missing,
}

/// Plain serializable form of a network, used for JSON files and the disk cache
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    #[serde(default)]
    pub bbox: Option<Rect<f64>>,
    pub nodes: Vec<Node>,
    pub edges: Vec<RoadEdge>,
}

/// Road network fetched for one bounding box.
///
/// Nodes and edges live in ordered maps so iteration (and everything built from it, such as
/// the routing graph) is deterministic.
#[derive(Clone)]
pub struct RoadNetwork {
    bbox: Rect<f64>,
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeKey, RoadEdge>,
    index: RTree<IndexedLine>,
    graph: DiGraphMap<NodeId, f64>,
}

impl RoadNetwork {
    /// Build a network, validating that every edge has a usable polyline and known endpoints.
    ///
    /// When both a record and a duplicate for the same ordered pair are given, the shorter one
    /// is kept. `bbox` defaults to the bounding rectangle of the nodes.
    pub fn new(
        bbox: Option<Rect<f64>>,
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = RoadEdge>,
    ) -> Result<Self> {
        let nodes: BTreeMap<NodeId, Node> = nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut edge_map: BTreeMap<EdgeKey, RoadEdge> = BTreeMap::new();
        for edge in edges {
            if edge.geometry.len() < 2 {
                return Err(MatchError::GraphIntegrity(format!(
                    "edge ({}, {}) has {} polyline coordinates",
                    edge.from,
                    edge.to,
                    edge.geometry.len()
                )));
            }
            for endpoint in [edge.from, edge.to] {
                if !nodes.contains_key(&endpoint) {
                    return Err(MatchError::GraphIntegrity(format!(
                        "edge ({}, {}) references unknown node {}",
                        edge.from, edge.to, endpoint
                    )));
                }
            }

            match edge_map.get(&edge.key()) {
                Some(existing) if existing.length <= edge.length => {
                    debug!("Dropping parallel edge ({}, {})", edge.from, edge.to);
                }
                _ => {
                    edge_map.insert(edge.key(), edge);
                }
            }
        }

        let bbox = bbox
            .or_else(|| bounding_rect(nodes.values().map(|n| n.coord)))
            .unwrap_or_else(|| Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 }));

        let index = RTree::bulk_load(
            edge_map
                .values()
                .flat_map(|edge| {
                    let key = edge.key();
                    edge.geometry.windows(2).map(move |w| {
                        GeomWithData::new(Line::new([w[0].x, w[0].y], [w[1].x, w[1].y]), key)
                    })
                })
                .collect(),
        );

        let mut graph = DiGraphMap::new();
        for node in nodes.keys() {
            graph.add_node(*node);
        }
        for edge in edge_map.values() {
            add_min_edge(&mut graph, edge.from, edge.to, edge.length);
            if !edge.oneway {
                add_min_edge(&mut graph, edge.to, edge.from, edge.length);
            }
        }

        Ok(Self {
            bbox,
            nodes,
            edges: edge_map,
            index,
            graph,
        })
    }

    pub fn from_snapshot(snapshot: NetworkSnapshot) -> Result<Self> {
        Self::new(snapshot.bbox, snapshot.nodes, snapshot.edges)
    }

    pub fn to_snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            bbox: Some(self.bbox),
            nodes: self.nodes.values().copied().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Extent this network was fetched for
    pub fn bbox(&self) -> Rect<f64> {
        self.bbox
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&RoadEdge> {
        self.edges.get(&key)
    }

    pub fn edges(&self) -> impl Iterator<Item = &RoadEdge> {
        self.edges.values()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Look up the edge joining `from` to `to`: forward record first, then the reverse record
    pub fn lookup_edge(&self, from: NodeId, to: NodeId) -> EdgeLookup<'_> {
        if let Some(edge) = self.edges.get(&(from, to)) {
            EdgeLookup::Forward(edge)
        } else if let Some(edge) = self.edges.get(&(to, from)) {
            EdgeLookup::Reverse(edge)
        } else {
            EdgeLookup::Missing
        }
    }

    /// Edge whose polyline passes closest to `point` (planar, in degrees)
    pub fn nearest_edge(&self, point: Coord<f64>) -> Option<EdgeKey> {
        self.index
            .nearest_neighbor(&[point.x, point.y])
            .map(|line| line.data)
    }

    /// Routing graph weighted by authoritative length; two-way edges appear in both directions
    pub fn graph(&self) -> &DiGraphMap<NodeId, f64> {
        &self.graph
    }

    /// Sub-network of the edges with at least one endpoint inside `bbox`
    pub fn clip(&self, bbox: Rect<f64>) -> Result<RoadNetwork> {
        let edges: Vec<RoadEdge> = self
            .edges
            .values()
            .filter(|edge| {
                [edge.from, edge.to].iter().any(|id| {
                    self.nodes
                        .get(id)
                        .is_some_and(|n| rect_contains(&bbox, n.coord))
                })
            })
            .cloned()
            .collect();

        let mut nodes: BTreeMap<NodeId, Node> = self
            .nodes
            .values()
            .filter(|n| rect_contains(&bbox, n.coord))
            .map(|n| (n.id, *n))
            .collect();
        for edge in &edges {
            for id in [edge.from, edge.to] {
                if let Some(node) = self.nodes.get(&id) {
                    nodes.entry(id).or_insert(*node);
                } else {
                    warn!("Edge ({}, {}) lost endpoint {} while clipping", edge.from, edge.to, id);
                }
            }
        }

        RoadNetwork::new(Some(bbox), nodes.into_values(), edges)
    }
}

impl fmt::Debug for RoadNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoadNetwork")
            .field("bbox", &self.bbox)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

fn add_min_edge(graph: &mut DiGraphMap<NodeId, f64>, from: NodeId, to: NodeId, length: f64) {
    match graph.edge_weight(from, to) {
        Some(existing) if *existing <= length => {}
        _ => {
            graph.add_edge(from, to, length);
        }
    }
}
