//! Configuration for the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Which chunking strategy the local parser applies.
///
/// Selected once at configuration time, never per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Cut at paragraph boundaries, hard-capped at `max_chunk_size`.
    #[default]
    Paragraph,
    /// Accumulate whole sentences up to `max_chunk_size`.
    Sentence,
    /// Split on a configurable regex delimiter.
    Dynamic,
    /// Sentence-based, but keeps sentences sharing a named entity together.
    EntityAware,
}

/// Configuration parameters for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Minimum chunk size in characters. Candidate slices below this are
    /// carried forward or merged backward, never emitted alone.
    pub min_chunk_size: usize,
    /// Maximum chunk size in characters (hard cap).
    pub max_chunk_size: usize,
    /// Overlap in characters, passed through to layout-aware providers.
    pub overlap: usize,
    /// Chunking strategy used by the local parser.
    pub strategy: ChunkingStrategy,
    /// Name of the parsing provider, resolved against the registry at build time.
    pub parsing_provider: String,
    /// Number of embedding records per upsert call.
    pub chunk_batch: usize,
    /// Number of nearest neighbors fetched from the vector store.
    pub top_k: usize,
    /// Number of results requested from the reranker.
    pub top_n: usize,
    /// Minimum relevance score; results with `score >= threshold` survive.
    pub relevance_threshold: f32,
    /// Fixed delay between embedding calls, in milliseconds.
    pub embed_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: 256,
            max_chunk_size: 1024,
            overlap: 100,
            strategy: ChunkingStrategy::Paragraph,
            parsing_provider: "local".to_string(),
            chunk_batch: 150,
            top_k: 10,
            top_n: 5,
            relevance_threshold: 0.0,
            embed_delay_ms: 13,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for constructing a [`PipelineConfig`].
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the minimum chunk size in characters.
    pub fn min_chunk_size(mut self, size: usize) -> Self {
        self.config.min_chunk_size = size;
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    /// Set the overlap passed to layout-aware parsing providers.
    pub fn overlap(mut self, overlap: usize) -> Self {
        self.config.overlap = overlap;
        self
    }

    /// Set the chunking strategy.
    pub fn strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the parsing provider name.
    pub fn parsing_provider(mut self, name: impl Into<String>) -> Self {
        self.config.parsing_provider = name.into();
        self
    }

    /// Set the upsert batch size.
    pub fn chunk_batch(mut self, batch: usize) -> Self {
        self.config.chunk_batch = batch;
        self
    }

    /// Set the number of nearest neighbors fetched per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the number of results requested from the reranker.
    pub fn top_n(mut self, n: usize) -> Self {
        self.config.top_n = n;
        self
    }

    /// Set the minimum relevance score for retrieved context.
    pub fn relevance_threshold(mut self, threshold: f32) -> Self {
        self.config.relevance_threshold = threshold;
        self
    }

    /// Set the fixed delay between embedding calls, in milliseconds.
    pub fn embed_delay_ms(mut self, ms: u64) -> Self {
        self.config.embed_delay_ms = ms;
        self
    }

    /// Build the [`PipelineConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ConfigError`] if:
    /// - `min_chunk_size == 0` or `min_chunk_size >= max_chunk_size`
    /// - `overlap >= max_chunk_size`
    /// - `chunk_batch == 0`, `top_k == 0`, or `top_n == 0`
    /// - `relevance_threshold` is not a finite value in `[0, 1]`
    pub fn build(self) -> Result<PipelineConfig> {
        let c = &self.config;
        if c.min_chunk_size == 0 {
            return Err(PipelineError::ConfigError(
                "min_chunk_size must be greater than zero".to_string(),
            ));
        }
        if c.min_chunk_size >= c.max_chunk_size {
            return Err(PipelineError::ConfigError(format!(
                "min_chunk_size ({}) must be less than max_chunk_size ({})",
                c.min_chunk_size, c.max_chunk_size
            )));
        }
        if c.overlap >= c.max_chunk_size {
            return Err(PipelineError::ConfigError(format!(
                "overlap ({}) must be less than max_chunk_size ({})",
                c.overlap, c.max_chunk_size
            )));
        }
        if c.chunk_batch == 0 {
            return Err(PipelineError::ConfigError(
                "chunk_batch must be greater than zero".to_string(),
            ));
        }
        if c.top_k == 0 {
            return Err(PipelineError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if c.top_n == 0 {
            return Err(PipelineError::ConfigError("top_n must be greater than zero".to_string()));
        }
        if !c.relevance_threshold.is_finite()
            || !(0.0..=1.0).contains(&c.relevance_threshold)
        {
            return Err(PipelineError::ConfigError(format!(
                "relevance_threshold ({}) must be within [0, 1]",
                c.relevance_threshold
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn rejects_min_not_below_max() {
        let err = PipelineConfig::builder().min_chunk_size(512).max_chunk_size(512).build();
        assert!(matches!(err, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn rejects_overlap_at_max() {
        let err = PipelineConfig::builder().max_chunk_size(200).overlap(200).build();
        assert!(matches!(err, Err(PipelineError::ConfigError(_))));
    }

    #[test]
    fn rejects_zero_top_k_and_batch() {
        assert!(PipelineConfig::builder().top_k(0).build().is_err());
        assert!(PipelineConfig::builder().chunk_batch(0).build().is_err());
        assert!(PipelineConfig::builder().top_n(0).build().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(PipelineConfig::builder().relevance_threshold(1.5).build().is_err());
        assert!(PipelineConfig::builder().relevance_threshold(f32::NAN).build().is_err());
    }
}
