use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use geo::Coord;
use log::{debug, info, warn};
use osmpbf::{Element, ElementReader};

use crate::error::Result;
use crate::geometry::polyline_length;
use crate::network::{NetworkSnapshot, Node, NodeId, RoadEdge, RoadNetwork, RoadTags};

/// A highway way as read from the extract, before splitting into edges
#[derive(Clone, Debug, PartialEq)]
pub struct OsmWay {
    pub id: i64,
    /// Node references in travel order (already flipped for `oneway=-1`)
    pub refs: Vec<NodeId>,
    pub tags: RoadTags,
    pub oneway: bool,
}

impl OsmWay {
    /// Build from raw tags; `None` unless the way carries a `highway` tag
    pub fn from_tags<'a>(
        id: i64,
        refs: Vec<NodeId>,
        tags: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Option<Self> {
        let tags: HashMap<&str, &str> = tags.into_iter().collect();
        let highway = tags.get("highway")?;

        let mut refs = refs;
        let oneway = match tags.get("oneway").copied() {
            Some("yes" | "1" | "true") => true,
            Some("-1" | "reverse") => {
                refs.reverse();
                true
            }
            Some("no" | "0" | "false") => false,
            _ => *highway == "motorway" || tags.get("junction") == Some(&"roundabout"),
        };

        Some(Self {
            id,
            refs,
            tags: RoadTags {
                highway: highway.to_string(),
                surface: tags.get("surface").map(|s| s.to_string()),
                tracktype: tags.get("tracktype").map(|s| s.to_string()),
            },
            oneway,
        })
    }
}

/// Read highway ways and their nodes from an OSM PBF extract into a routable network
pub fn import_pbf(path: impl AsRef<Path>) -> Result<RoadNetwork> {
    let path = path.as_ref();
    let start = Instant::now();
    info!("Reading highway ways from {:?}", path);

    let mut ways = Vec::new();
    ElementReader::from_path(path)?.for_each(|element| {
        if let Element::Way(way) = element {
            let refs: Vec<NodeId> = way.refs().collect();
            if refs.len() < 2 {
                return;
            }
            if let Some(osm_way) = OsmWay::from_tags(way.id(), refs, way.tags()) {
                ways.push(osm_way);
            }
        }
    })?;
    info!("Found {} highway ways in {:?}", ways.len(), start.elapsed());

    let wanted: HashSet<NodeId> = ways.iter().flat_map(|w| w.refs.iter().copied()).collect();
    let mut coords: HashMap<NodeId, Coord<f64>> = HashMap::with_capacity(wanted.len());
    ElementReader::from_path(path)?.for_each(|element| {
        let (id, coord) = match element {
            Element::Node(node) => (node.id(), Coord { x: node.lon(), y: node.lat() }),
            Element::DenseNode(node) => (node.id(), Coord { x: node.lon(), y: node.lat() }),
            _ => return,
        };
        if wanted.contains(&id) {
            coords.insert(id, coord);
        }
    })?;
    info!(
        "Resolved {} of {} way nodes in {:?}",
        coords.len(),
        wanted.len(),
        start.elapsed()
    );

    let (nodes, edges) = ways_to_edges(&ways, &coords);
    info!(
        "Built network with {} nodes and {} edges in {:?}",
        nodes.len(),
        edges.len(),
        start.elapsed()
    );
    RoadNetwork::new(None, nodes, edges)
}

/// Split ways into graph edges at their ends and at every node shared with another way.
///
/// Ways referencing nodes missing from `coords` are dropped. A stretch that starts and ends on
/// the same graph node is split at its middle vertex so the loop stays routable.
pub fn ways_to_edges(
    ways: &[OsmWay],
    coords: &HashMap<NodeId, Coord<f64>>,
) -> (Vec<Node>, Vec<RoadEdge>) {
    let mut usage: HashMap<NodeId, usize> = HashMap::new();
    for way in ways {
        for id in &way.refs {
            *usage.entry(*id).or_insert(0) += 1;
        }
    }

    let mut graph_nodes: HashMap<NodeId, Node> = HashMap::new();
    let mut edges = Vec::new();
    let mut dropped = 0;

    for way in ways {
        let Some(geometry) = way
            .refs
            .iter()
            .map(|id| coords.get(id).copied())
            .collect::<Option<Vec<_>>>()
        else {
            dropped += 1;
            continue;
        };

        let last = way.refs.len() - 1;
        let mut from = 0;
        for i in 1..=last {
            let id = way.refs[i];
            if i != last && usage.get(&id).copied().unwrap_or(0) < 2 {
                continue;
            }
            if way.refs[from] != id {
                push_edge(way, &geometry, from, i, &mut graph_nodes, &mut edges);
            } else if i - from >= 2 {
                let mid = from + (i - from) / 2;
                debug!(
                    "Splitting loop at node {} in way {} at node {}",
                    id, way.id, way.refs[mid]
                );
                push_edge(way, &geometry, from, mid, &mut graph_nodes, &mut edges);
                push_edge(way, &geometry, mid, i, &mut graph_nodes, &mut edges);
            } else {
                debug!("Skipping repeated node {} in way {}", id, way.id);
            }
            from = i;
        }
    }

    if dropped > 0 {
        warn!("Dropped {} ways with nodes missing from the extract", dropped);
    }

    let mut nodes: Vec<Node> = graph_nodes.into_values().collect();
    nodes.sort_by_key(|n| n.id);
    (nodes, edges)
}

fn push_edge(
    way: &OsmWay,
    geometry: &[Coord<f64>],
    from: usize,
    to: usize,
    graph_nodes: &mut HashMap<NodeId, Node>,
    edges: &mut Vec<RoadEdge>,
) {
    let (a, b) = (way.refs[from], way.refs[to]);
    let polyline = geometry[from..=to].to_vec();
    graph_nodes.insert(a, Node { id: a, coord: geometry[from] });
    graph_nodes.insert(b, Node { id: b, coord: geometry[to] });
    edges.push(RoadEdge {
        from: a,
        to: b,
        length: polyline_length(&polyline),
        geometry: polyline,
        tags: way.tags.clone(),
        oneway: way.oneway,
    });
}

/// Load a network from an OSM PBF extract or from the JSON snapshot form, by extension
pub fn load_network(path: impl AsRef<Path>) -> Result<RoadNetwork> {
    let path = path.as_ref();
    let is_pbf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pbf"));
    if is_pbf {
        return import_pbf(path);
    }

    let snapshot: NetworkSnapshot = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let network = RoadNetwork::from_snapshot(snapshot)?;
    info!(
        "Loaded network from {:?}: {} nodes, {} edges",
        path,
        network.node_count(),
        network.edge_count()
    );
    Ok(network)
}

pub fn save_network_json(network: &RoadNetwork, path: impl AsRef<Path>) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(writer, &network.to_snapshot())?;
    Ok(())
}
