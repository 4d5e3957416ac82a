//! Small hand-made networks shared by the integration tests

#![allow(dead_code)]

use geo::{Coord, Rect};
use roadmatch::{
    MatchError, MatcherConfig, NetworkProvider, Node, NodeId, RoadEdge, RoadNetwork, RoadTags,
    StaticNetworkProvider,
};
use std::sync::atomic::{AtomicU32, Ordering};

pub const LAT: f64 = 46.5;
pub const LON: f64 = 6.6;

pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}

pub fn coord(lat: f64, lon: f64) -> Coord<f64> {
    Coord { x: lon, y: lat }
}

pub fn node(id: NodeId, lat: f64, lon: f64) -> Node {
    Node {
        id,
        coord: coord(lat, lon),
    }
}

pub fn tags(highway: &str) -> RoadTags {
    RoadTags {
        highway: highway.to_string(),
        surface: None,
        tracktype: None,
    }
}

/// Straight two-way edge between two nodes
pub fn edge(from: &Node, to: &Node, length: f64) -> RoadEdge {
    RoadEdge {
        from: from.id,
        to: to.id,
        geometry: vec![from.coord, to.coord],
        length,
        tags: tags("residential"),
        oneway: false,
    }
}

pub fn test_config() -> MatcherConfig {
    MatcherConfig {
        points_per_batch: 50,
        delta: 0.005,
        min_boundary_distance: 50.0,
        provider_backoff_ms: 1,
        parallel_batches: false,
        ..Default::default()
    }
}

/// Three collinear nodes A(1) - B(2) - C(3) with 10 m edges
pub fn collinear_network() -> RoadNetwork {
    let a = node(1, LAT, LON);
    let b = node(2, LAT, LON + 0.0001);
    let c = node(3, LAT, LON + 0.0002);
    let edges = vec![edge(&a, &b, 10.0), edge(&b, &c, 10.0)];
    RoadNetwork::new(None, vec![a, b, c], edges).unwrap()
}

/// Two routes from S(1) to T(2): south through U(3), north through V(4)
pub fn diamond_network(south_length: f64, north_length: f64) -> RoadNetwork {
    let s = node(1, LAT, LON);
    let t = node(2, LAT, LON + 0.002);
    let u = node(3, LAT - 0.001, LON + 0.001);
    let v = node(4, LAT + 0.001, LON + 0.001);
    let edges = vec![
        edge(&s, &u, south_length / 2.0),
        edge(&u, &t, south_length / 2.0),
        edge(&s, &v, north_length / 2.0),
        edge(&v, &t, north_length / 2.0),
    ];
    RoadNetwork::new(None, vec![s, t, u, v], edges).unwrap()
}

/// Points spaced evenly along the northern route of [`diamond_network`], endpoints included
pub fn north_route_points(count: usize) -> Vec<(f64, f64)> {
    (0..count)
        .map(|i| {
            let t = i as f64 / (count - 1) as f64;
            let lon = LON + 0.002 * t;
            let lat = if t <= 0.5 {
                LAT + 0.002 * t
            } else {
                LAT + 0.002 * (1.0 - t)
            };
            (lat, lon)
        })
        .collect()
}

/// Wraps a provider and counts fetches
pub struct CountingProvider<P> {
    pub inner: P,
    pub fetches: AtomicU32,
}

impl<P> CountingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            fetches: AtomicU32::new(0),
        }
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl<P: NetworkProvider> NetworkProvider for CountingProvider<P> {
    fn fetch_network(&self, bbox: Rect<f64>) -> roadmatch::Result<RoadNetwork> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_network(bbox)
    }
}

/// A provider whose service is down
pub struct UnavailableProvider;

impl NetworkProvider for UnavailableProvider {
    fn fetch_network(&self, _bbox: Rect<f64>) -> roadmatch::Result<RoadNetwork> {
        Err(MatchError::Provider("service unavailable".to_string()))
    }
}

pub fn static_provider(network: RoadNetwork) -> CountingProvider<StaticNetworkProvider> {
    CountingProvider::new(StaticNetworkProvider::new(network))
}
