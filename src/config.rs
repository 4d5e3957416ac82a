use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// Core road matching configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Number of trace points per network fetch
    pub points_per_batch: usize,
    /// Bounding box expansion around a batch (degrees)
    pub delta: f64,
    /// Minimum distance between a matched node and the fetched boundary (meters)
    pub min_boundary_distance: f64,
    /// Maximum re-fetches for a node matched too close to the boundary
    pub max_boundary_retries: u32,
    /// Number of candidate paths considered per piece
    pub candidate_paths: usize,
    /// Maximum enlarged re-fetches when a piece cannot be routed
    pub max_fetch_retries: u32,
    /// Pieces with fewer trace points than this are scored on length alone
    pub short_piece_threshold: usize,
    /// Retries for transient provider failures
    pub provider_retries: u32,
    /// Base backoff between provider retries (milliseconds)
    pub provider_backoff_ms: u64,
    /// Snap batches concurrently
    pub parallel_batches: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            points_per_batch: 100,
            delta: 0.005,
            min_boundary_distance: 50.0,
            max_boundary_retries: 5,
            candidate_paths: 3,
            max_fetch_retries: 4,
            short_piece_threshold: 4,
            provider_retries: 3,
            provider_backoff_ms: 250,
            parallel_batches: true,
        }
    }
}

impl MatcherConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read(path)?;
        let config: MatcherConfig = serde_json::from_slice(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.points_per_batch == 0 {
            return Err(MatchError::InvalidConfig(
                "points_per_batch must be at least 1".to_string(),
            ));
        }
        if self.candidate_paths == 0 {
            return Err(MatchError::InvalidConfig(
                "candidate_paths must be at least 1".to_string(),
            ));
        }
        if self.delta.is_nan() || self.delta <= 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "delta must be positive, got {}",
                self.delta
            )));
        }
        if self.min_boundary_distance < 0.0 {
            return Err(MatchError::InvalidConfig(format!(
                "min_boundary_distance must not be negative, got {}",
                self.min_boundary_distance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(MatcherConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = MatcherConfig {
            points_per_batch: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_delta() {
        let config = MatcherConfig {
            delta: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MatcherConfig =
            serde_json::from_str(r#"{"candidate_paths": 5, "delta": 0.01}"#).unwrap();
        assert_eq!(config.candidate_paths, 5);
        assert_eq!(config.delta, 0.01);
        assert_eq!(config.points_per_batch, 100);
    }
}
