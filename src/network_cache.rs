use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use geo::{Coord, Rect};
use log::{debug, warn};

use crate::error::{MatchError, Result};
use crate::network::{EdgeKey, NetworkSnapshot, NodeId, RoadNetwork};
use crate::provider::NetworkProvider;

/// Caches fetched networks in memory (LRU) and on disk, keyed by their bounding box
pub struct CachedNetworkProvider<P> {
    inner: P,
    cache_dir: PathBuf,
    memory: Mutex<NetworkLru>,
}

struct NetworkLru {
    networks: HashMap<String, RoadNetwork>,
    lru_queue: VecDeque<String>,
    capacity: usize,
}

impl NetworkLru {
    fn get(&mut self, key: &str) -> Option<RoadNetwork> {
        let network = self.networks.get(key)?.clone();
        self.touch(key);
        Some(network)
    }

    fn insert(&mut self, key: String, network: RoadNetwork) {
        if self.capacity == 0 {
            return;
        }
        if !self.networks.contains_key(&key) && self.networks.len() >= self.capacity {
            if let Some(oldest) = self.lru_queue.pop_front() {
                debug!("Evicting LRU network {}", oldest);
                self.networks.remove(&oldest);
            }
        }
        self.networks.insert(key.clone(), network);
        self.touch(&key);
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.lru_queue.iter().position(|k| k == key) {
            self.lru_queue.remove(pos);
        }
        self.lru_queue.push_back(key.to_string());
    }
}

impl<P: NetworkProvider> CachedNetworkProvider<P> {
    pub fn new(inner: P, cache_dir: impl Into<PathBuf>, max_cached_networks: usize) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            inner,
            cache_dir,
            memory: Mutex::new(NetworkLru {
                networks: HashMap::with_capacity(max_cached_networks),
                lru_queue: VecDeque::with_capacity(max_cached_networks),
                capacity: max_cached_networks,
            }),
        })
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Cache key for a bounding box, quantized to about a meter
    pub fn cache_key(bbox: &Rect<f64>) -> String {
        format!(
            "{:.5}_{:.5}_{:.5}_{:.5}",
            bbox.min().x,
            bbox.min().y,
            bbox.max().x,
            bbox.max().y
        )
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.bin", key))
    }

    fn read_cached(&self, path: &Path) -> Result<Option<RoadNetwork>> {
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(path)?;
        let config = bincode::config::standard();
        let (snapshot, _): (NetworkSnapshot, _) =
            bincode::serde::decode_from_slice(&bytes, config)
                .map_err(|e| MatchError::corrupt(path, e))?;
        let network =
            RoadNetwork::from_snapshot(snapshot).map_err(|e| MatchError::corrupt(path, e))?;
        Ok(Some(network))
    }

    fn write_cached(&self, path: &Path, network: &RoadNetwork) -> Result<()> {
        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(network.to_snapshot(), config)
            .map_err(|e| MatchError::Provider(format!("failed to encode network: {}", e)))?;

        // Unique temp name so concurrent batches never interleave writes
        let tmp = path.with_extension(format!(
            "bin.{}.{:?}.tmp",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl<P: NetworkProvider> NetworkProvider for CachedNetworkProvider<P> {
    fn fetch_network(&self, bbox: Rect<f64>) -> Result<RoadNetwork> {
        let key = Self::cache_key(&bbox);

        if let Some(network) = self.lock_memory().get(&key) {
            debug!("Network {} served from memory", key);
            return Ok(network);
        }

        let path = self.cache_path(&key);
        let load_start = Instant::now();
        let network = match self.read_cached(&path) {
            Ok(Some(network)) => {
                debug!("Network {} loaded from disk in {:?}", key, load_start.elapsed());
                network
            }
            Ok(None) => {
                let network = self.inner.fetch_network(bbox)?;
                self.write_cached(&path, &network)?;
                debug!("Network {} fetched and cached in {:?}", key, load_start.elapsed());
                network
            }
            Err(e @ MatchError::CacheCorruption { .. }) => {
                warn!("{}; refetching", e);
                let network = self.inner.fetch_network(bbox)?;
                self.write_cached(&path, &network)?;
                network
            }
            Err(e) => return Err(e),
        };

        self.lock_memory().insert(key, network.clone());
        Ok(network)
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

impl<P> CachedNetworkProvider<P> {
    fn lock_memory(&self) -> std::sync::MutexGuard<'_, NetworkLru> {
        // A poisoned cache only holds clones; keep using it
        self.memory
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Node, RoadEdge, RoadTags};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: AtomicU32,
    }

    impl NetworkProvider for CountingProvider {
        fn fetch_network(&self, bbox: Rect<f64>) -> Result<RoadNetwork> {
            self.calls.fetch_add(1, Ordering::SeqCst);
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
                geometry: vec![a.coord, b.coord],
                length: 111.0,
                tags: RoadTags {
                    highway: "track".to_string(),
                    surface: Some("gravel".to_string()),
                    tracktype: Some("grade2".to_string()),
                },
                oneway: false,
            };
            RoadNetwork::new(Some(bbox), vec![a, b], vec![edge])
        }
    }

    fn bbox() -> Rect<f64> {
        Rect::new(Coord { x: -0.01, y: -0.01 }, Coord { x: 0.01, y: 0.01 })
    }

    #[test]
    fn test_second_fetch_hits_memory() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CachedNetworkProvider::new(
            CountingProvider {
                calls: AtomicU32::new(0),
            },
            dir.path(),
            4,
        )
        .unwrap();
        provider.fetch_network(bbox()).unwrap();
        provider.fetch_network(bbox()).unwrap();
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disk_cache_survives_new_provider() {
        let dir = tempfile::tempdir().unwrap();
        let first = CachedNetworkProvider::new(
            CountingProvider {
                calls: AtomicU32::new(0),
            },
            dir.path(),
            0,
        )
        .unwrap();
        let original = first.fetch_network(bbox()).unwrap();

        let second = CachedNetworkProvider::new(
            CountingProvider {
                calls: AtomicU32::new(0),
            },
            dir.path(),
            0,
        )
        .unwrap();
        let restored = second.fetch_network(bbox()).unwrap();
        assert_eq!(second.inner().calls.load(Ordering::SeqCst), 0);
        assert_eq!(restored.to_snapshot(), original.to_snapshot());
    }

    #[test]
    fn test_corrupt_file_is_refetched() {
        let dir = tempfile::tempdir().unwrap();
        let key = CachedNetworkProvider::<CountingProvider>::cache_key(&bbox());
        std::fs::write(dir.path().join(format!("{}.bin", key)), b"not a network").unwrap();

        let provider = CachedNetworkProvider::new(
            CountingProvider {
                calls: AtomicU32::new(0),
            },
            dir.path(),
            0,
        )
        .unwrap();
        assert!(provider.fetch_network(bbox()).is_ok());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }
}
