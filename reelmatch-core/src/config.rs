//! Engine configuration.
//!
//! Loaded from environment variables with sensible defaults; every value
//! falls back rather than failing, so a bare environment runs the engine
//! with its tuned defaults.

use crate::index::MAX_GUARANTEED_DISTANCE;
use crate::matcher::MatcherConfig;

/// Tunables for matching and sweeping.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum Hamming distance between global hashes (default: 8)
    pub max_hamming: u32,
    /// Minimum alignment similarity to declare a duplicate (default: 0.85)
    pub min_similarity: f64,
    /// Per-row gap cost in the alignment, in bits (default: 48)
    pub gap_cost: u32,
    /// Signature rows participating in alignment (default: 512)
    pub max_rows: usize,
    /// Minutes between retention sweeps, for the external scheduler
    /// (default: 60)
    pub sweep_interval_mins: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hamming: 8,
            min_similarity: 0.85,
            gap_cost: 48,
            max_rows: 512,
            sweep_interval_mins: 60,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_hamming = std::env::var("MAX_HAMMING_DISTANCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_hamming);

        let min_similarity = std::env::var("MIN_ALIGNMENT_SIMILARITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_similarity);

        let gap_cost = std::env::var("ALIGNMENT_GAP_COST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.gap_cost);

        let max_rows = std::env::var("MAX_SIGNATURE_ROWS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_rows);

        let sweep_interval_mins = std::env::var("SWEEP_INTERVAL_MINS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.sweep_interval_mins);

        Self {
            max_hamming,
            min_similarity,
            gap_cost,
            max_rows,
            sweep_interval_mins,
        }
    }

    /// Matcher view of this configuration. The Hamming bound is capped at
    /// what the candidate index can guarantee; beyond that the index could
    /// silently drop true matches.
    pub fn matcher(&self) -> MatcherConfig {
        let mut max_hamming = self.max_hamming;
        if max_hamming > MAX_GUARANTEED_DISTANCE {
            tracing::warn!(
                requested = max_hamming,
                capped = MAX_GUARANTEED_DISTANCE,
                "Hamming bound exceeds index guarantee, capping"
            );
            max_hamming = MAX_GUARANTEED_DISTANCE;
        }
        MatcherConfig {
            max_hamming,
            min_similarity: self.min_similarity,
            gap_cost: self.gap_cost,
            max_rows: self.max_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_hamming, 8);
        assert_eq!(config.min_similarity, 0.85);
        assert_eq!(config.gap_cost, 48);
        assert_eq!(config.sweep_interval_mins, 60);
    }

    #[test]
    fn test_matcher_view_caps_hamming_to_index_guarantee() {
        let config = EngineConfig {
            max_hamming: 40,
            ..EngineConfig::default()
        };
        assert_eq!(config.matcher().max_hamming, MAX_GUARANTEED_DISTANCE);
    }

    #[test]
    fn test_matcher_view_keeps_in_bound_hamming() {
        let config = EngineConfig::default();
        assert_eq!(config.matcher().max_hamming, 8);
    }
}
