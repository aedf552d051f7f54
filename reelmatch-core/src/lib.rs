//! Reelmatch Core - Campaign video fingerprint matching and retention engine
//!
//! This crate answers two questions about a growing corpus of campaign
//! videos, efficiently and correctly:
//!
//! - Has a video substantially similar to this one already been ingested,
//!   within its campaign or globally?
//! - Which fingerprints are past their campaign's retention date and must
//!   be purged, together with their underlying media?
//!
//! # Features
//!
//! - 64-bit perceptual hash model with a banded candidate index (no
//!   false negatives within the configured Hamming bound)
//! - Temporal sequence signatures scored by row alignment, tolerant of
//!   trimmed or padded duplicates
//! - Retention sweeper with injected clock, media-first deletion ordering,
//!   and idempotent retries
//! - Async repository and media-store ports; PostgreSQL adapter in
//!   `reelmatch-store`, memory-backed ports in [`testing`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reelmatch_core::{
//!     CampaignId, CandidateIndex, DedupEngine, EngineConfig, Fingerprint,
//!     GlobalHash, SequenceSignature, testing::MemoryRepository,
//! };
//!
//! # async fn example() -> reelmatch_core::Result<()> {
//! let repository = Arc::new(MemoryRepository::new());
//! let index = Arc::new(CandidateIndex::new());
//! let engine = DedupEngine::new(repository, index, &EngineConfig::from_env());
//!
//! // Hash extraction happens upstream; the engine consumes fixed-width
//! // values.
//! let fingerprint = Fingerprint::new(
//!     CampaignId::new("summer-launch"),
//!     "https://cdn.example.com/videos/teaser.mp4",
//!     GlobalHash::new(0xA5A5_5A5A_0F0F_F0F0),
//!     SequenceSignature::new(vec![0xBEEF; 12])?,
//!     34.5,
//! )?;
//!
//! let outcome = engine.ingest_scoped(fingerprint).await?;
//! assert!(!outcome.is_duplicate());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod matcher;
pub mod repository;
pub mod retention;
pub mod testing;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use engine::{DedupEngine, IngestOutcome};
pub use error::{EngineError, Result};
pub use fingerprint::{
    CampaignId, Fingerprint, GlobalHash, SequenceSignature, VideoId, GLOBAL_HASH_SIZE,
    SIGNATURE_COLUMNS,
};
pub use index::{CandidateIndex, BANDS, MAX_GUARANTEED_DISTANCE};
pub use matcher::{
    DuplicateMatch, MatchScope, MatchScore, MatchVerdict, Matcher, MatcherConfig,
};
pub use repository::FingerprintRepository;
pub use retention::{
    DeletionEvent, MediaStore, RetentionRecord, RetentionSweeper, SweepReport,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use testing::MemoryRepository;

    /// Integration test: ingest a fingerprint, re-check it, observe the
    /// duplicate verdict.
    #[tokio::test]
    async fn test_ingest_then_recheck_reports_duplicate() {
        let repository = Arc::new(MemoryRepository::new());
        let index = Arc::new(CandidateIndex::new());
        let engine = DedupEngine::new(repository, index, &EngineConfig::default());

        let original = Fingerprint::new(
            CampaignId::new("c1"),
            "https://cdn.example.com/videos/original.mp4",
            GlobalHash::new(0x1234_5678_9ABC_DEF0),
            SequenceSignature::new(vec![10, 20, 30, 40]).unwrap(),
            18.0,
        )
        .unwrap();

        let outcome = engine.ingest_scoped(original.clone()).await.unwrap();
        assert!(!outcome.is_duplicate());

        // Same content re-uploaded under a different URL: one flipped hash
        // bit, identical signature.
        let reupload = Fingerprint::new(
            CampaignId::new("c1"),
            "https://cdn.example.com/videos/reupload.mp4",
            GlobalHash::new(0x1234_5678_9ABC_DEF1),
            SequenceSignature::new(vec![10, 20, 30, 40]).unwrap(),
            18.0,
        )
        .unwrap();

        let verdict = engine
            .check(&reupload, MatchScope::campaign_of(&reupload))
            .await
            .unwrap();
        match verdict {
            MatchVerdict::Duplicate(found) => assert_eq!(found.video_id, original.video_id),
            MatchVerdict::Distinct => panic!("expected reupload to match"),
        }
    }
}
