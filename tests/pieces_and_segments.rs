mod common;

use common::*;
use roadmatch::pieces::segment_node_runs;
use roadmatch::segments::{edge_segments, extract_segments};
use roadmatch::{NodeMatch, RoadEdge, RoadNetwork, RoadTags};

fn node_matches(nodes: &[i64]) -> Vec<NodeMatch> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, &node_id)| NodeMatch {
            point_index: i,
            node_id,
            node_coord: coord(LAT, LON),
            point_distance: ((i * 7919) % 13) as f64,
            boundary_distance: 500.0,
        })
        .collect()
}

/// Noisy node sequences from a fixed linear congruential generator
fn noisy_sequences() -> Vec<Vec<i64>> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        state >> 33
    };

    (0..200)
        .map(|_| {
            let len = 2 + (next() % 40) as usize;
            let mut node = 1 + (next() % 4) as i64;
            (0..len)
                .map(|_| {
                    if next() % 3 == 0 {
                        node = 1 + (next() % 4) as i64;
                    }
                    node
                })
                .collect()
        })
        .collect()
}

/// Every reading away from the first node is a lone reading followed by a return to it
fn never_leaves_first_node(sequence: &[i64]) -> bool {
    let first = sequence[0];
    sequence
        .iter()
        .enumerate()
        .all(|(i, &node)| node == first || sequence.get(i + 1) == Some(&first))
}

#[test]
fn test_pieces_partition_trace() {
    for sequence in noisy_sequences() {
        let matches = node_matches(&sequence);
        let pieces = segment_node_runs(&matches);
        let n = sequence.len();

        if never_leaves_first_node(&sequence) {
            assert!(pieces.is_empty(), "{sequence:?}");
            continue;
        }

        assert_eq!(pieces[0].start_index, 0, "{sequence:?}");
        assert_eq!(pieces[pieces.len() - 1].end_index, n - 1, "{sequence:?}");
        for piece in &pieces {
            assert!(piece.start_index < piece.end_index, "{sequence:?}");
            assert_ne!(piece.start_node, piece.end_node, "{sequence:?}");
            assert_eq!(sequence[piece.start_index], piece.start_node, "{sequence:?}");
        }
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].end_index, pair[1].start_index, "{sequence:?}");
            assert_eq!(pair[0].end_node, pair[1].start_node, "{sequence:?}");
        }
    }
}

#[test]
fn test_single_transient_reading_adds_no_boundary() {
    // B registers once between the A and C runs
    let pieces = segment_node_runs(&node_matches(&[1, 1, 2, 3, 3]));
    assert_eq!(pieces.len(), 2);
    assert_eq!(pieces[0].end_node, 2);
    assert_eq!(pieces[1].end_node, 3);
    assert_eq!(pieces[1].end_index, 4);
}

#[test]
fn test_stray_reading_after_closest_sample_adds_no_detour() {
    let distances = [1.0, 0.1, 0.5, 2.0, 1.0];
    let matches: Vec<NodeMatch> = node_matches(&[1, 2, 9, 2, 3])
        .into_iter()
        .zip(distances)
        .map(|(m, point_distance)| NodeMatch { point_distance, ..m })
        .collect();

    let pieces = segment_node_runs(&matches);
    let hops: Vec<_> = pieces.iter().map(|p| (p.start_node, p.end_node)).collect();
    assert_eq!(hops, vec![(1, 2), (2, 3)]);
    assert!(pieces.iter().all(|p| p.start_node != 9 && p.end_node != 9));
    assert_eq!(pieces[1].end_index, 4);
}

fn long_edge(from: i64, to: i64) -> RoadEdge {
    RoadEdge {
        from,
        to,
        geometry: vec![
            coord(LAT, LON),
            coord(LAT + 0.0004, LON + 0.0003),
            coord(LAT + 0.0006, LON + 0.0009),
            coord(LAT + 0.0011, LON + 0.0010),
            coord(LAT + 0.0012, LON + 0.0016),
        ],
        length: 187.3,
        tags: RoadTags {
            highway: "track".to_string(),
            surface: Some("gravel".to_string()),
            tracktype: Some("grade2".to_string()),
        },
        oneway: true,
    }
}

fn network_with(edge: RoadEdge) -> RoadNetwork {
    let first = edge.geometry[0];
    let last = edge.geometry[edge.geometry.len() - 1];
    let nodes = vec![
        roadmatch::Node {
            id: edge.from,
            coord: first,
        },
        roadmatch::Node {
            id: edge.to,
            coord: last,
        },
    ];
    RoadNetwork::new(None, nodes, vec![edge]).unwrap()
}

#[test]
fn test_length_shares_sum_to_edge_length() {
    let edge = long_edge(1, 2);
    for reversed in [false, true] {
        let segments = edge_segments(&edge, reversed);
        assert_eq!(segments.len(), 4);
        let total: f64 = segments.iter().map(|s| s.osm_length_share).sum();
        assert!(approx_eq(total, edge.length, 1e-9));
    }
}

#[test]
fn test_one_way_fallback_reverses_polyline() {
    let edge = long_edge(2, 1);
    let network = network_with(edge.clone());

    let segments = extract_segments(&network, 1, 2).unwrap();
    assert_eq!(segments.len(), 4);
    assert_eq!(segments[0].start, edge.geometry[4]);
    assert_eq!(segments[3].end, edge.geometry[0]);
    for (segment, window) in segments.iter().zip(edge.geometry.windows(2).rev()) {
        assert_eq!(segment.start, window[1]);
        assert_eq!(segment.end, window[0]);
        assert_eq!(segment.highway, "track");
        assert_eq!(segment.surface.as_deref(), Some("gravel"));
        assert_eq!(segment.tracktype.as_deref(), Some("grade2"));
    }

    let forward = extract_segments(&network, 2, 1).unwrap();
    assert_eq!(forward[0].start, edge.geometry[0]);
}
