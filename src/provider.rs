use std::time::Duration;

use geo::{Coord, Rect};
use log::{debug, warn};

use crate::error::{MatchError, Result};
use crate::kpaths::k_shortest_paths;
use crate::network::{EdgeKey, NodeId, RoadNetwork};

/// Source of road networks and the graph queries run against them.
///
/// Only `fetch_network` must be supplied; nearest-edge and K-shortest-path queries default to
/// the network's own R-tree and Yen's algorithm.
pub trait NetworkProvider: Send + Sync {
    /// Network covering `bbox`
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<RoadNetwork>;

    /// Edge nearest to `point`, `None` if the network has no edges
    fn nearest_edge(&self, network: &RoadNetwork, point: Coord<f64>) -> Option<EdgeKey> {
        network.nearest_edge(point)
    }

    /// Up to `k` distinct simple paths from `from` to `to`, by increasing length.
    ///
    /// Fails with `NodeNotInSubgraph` when either node is absent from `network`; an empty
    /// result means both nodes are present but not connected.
    fn shortest_paths(
        &self,
        network: &RoadNetwork,
        from: NodeId,
        to: NodeId,
        k: usize,
    ) -> Result<Vec<Vec<NodeId>>> {
        for node in [from, to] {
            if !network.contains_node(node) {
                return Err(MatchError::NodeNotInSubgraph { node });
            }
        }
        Ok(k_shortest_paths(network.graph(), from, to, k)
            .into_iter()
            .map(|path| path.nodes)
            .collect())
    }
}

impl<P: NetworkProvider + ?Sized> NetworkProvider for Box<P> {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<RoadNetwork> {
        (**self).fetch_network(bbox)
    }

    fn nearest_edge(&self, network: &RoadNetwork, point: Coord<f64>) -> Option<EdgeKey> {
        (**self).nearest_edge(network, point)
    }

    fn shortest_paths(
        &self,
        network: &RoadNetwork,
        from: NodeId,
        to: NodeId,
        k: usize,
    ) -> Result<Vec<Vec<NodeId>>> {
        (**self).shortest_paths(network, from, to, k)
    }
}

/// Serves clipped views of one fully loaded network
pub struct StaticNetworkProvider {
    network: RoadNetwork,
}

impl StaticNetworkProvider {
    pub fn new(network: RoadNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &RoadNetwork {
        &self.network
    }
}

impl NetworkProvider for StaticNetworkProvider {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<RoadNetwork> {
        let clipped = self.network.clip(bbox)?;
        debug!(
            "Clipped network to {:?}: {} nodes, {} edges",
            bbox,
            clipped.node_count(),
            clipped.edge_count()
        );
        Ok(clipped)
    }
}

/// Retries transient fetch failures with exponential backoff
pub struct RetryingProvider<P> {
    inner: P,
    max_retries: u32,
    backoff: Duration,
}

impl<P: NetworkProvider> RetryingProvider<P> {
    pub fn new(inner: P, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: NetworkProvider> NetworkProvider for RetryingProvider<P> {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<RoadNetwork> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch_network(bbox) {
                Ok(network) => return Ok(network),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let wait = self.backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        "Network fetch failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt + 1,
                        self.max_retries,
                        wait
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn nearest_edge(&self, network: &RoadNetwork, point: Coord<f64>) -> Option<EdgeKey> {
        self.inner.nearest_edge(network, point)
    }

    fn shortest_paths(
        &self,
        network: &RoadNetwork,
        from: NodeId,
        to: NodeId,
        k: usize,
    ) -> Result<Vec<Vec<NodeId>>> {
        self.inner.shortest_paths(network, from, to, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
    }

    impl NetworkProvider for FlakyProvider {
        fn fetch_network(&self, bbox: Rect<f64>) -> Result<RoadNetwork> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(MatchError::Provider(format!("unavailable (call {call})")))
            } else {
                RoadNetwork::new(Some(bbox), vec![], vec![])
            }
        }
    }

    fn bbox() -> Rect<f64> {
        Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 })
    }

    #[test]
    fn test_retries_transient_failures() {
        let provider = RetryingProvider::new(
            FlakyProvider {
                failures: 2,
                calls: AtomicU32::new(0),
            },
            3,
            Duration::from_millis(1),
        );
        assert!(provider.fetch_network(bbox()).is_ok());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_after_cap() {
        let provider = RetryingProvider::new(
            FlakyProvider {
                failures: 10,
                calls: AtomicU32::new(0),
            },
            2,
            Duration::from_millis(1),
        );
        assert!(matches!(
            provider.fetch_network(bbox()),
            Err(MatchError::Provider(_))
        ));
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_shortest_paths_reports_missing_node() {
        let provider = FlakyProvider {
            failures: 0,
            calls: AtomicU32::new(0),
        };
        let network = provider.fetch_network(bbox()).unwrap();
        assert!(matches!(
            provider.shortest_paths(&network, 1, 2, 3),
            Err(MatchError::NodeNotInSubgraph { node: 1 })
        ));
    }
}
