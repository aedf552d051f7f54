//! Ingestion pipeline.
//!
//! Binds the candidate index, matcher, and repository behind one entry
//! point: shortlist via the index, fetch and score the survivors, and on a
//! distinct verdict persist then index — in that order, so a concurrent
//! match query never observes an indexed id that durable storage does not
//! have.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::index::CandidateIndex;
use crate::matcher::{DuplicateMatch, MatchScope, MatchVerdict, Matcher};
use crate::repository::FingerprintRepository;

/// What happened to an ingested fingerprint.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    /// Persisted and indexed.
    Ingested,
    /// A duplicate was found; nothing was persisted.
    Duplicate(DuplicateMatch),
}

impl IngestOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Duplicate-detection engine over a shared candidate index and a
/// repository.
pub struct DedupEngine {
    repository: Arc<dyn FingerprintRepository>,
    index: Arc<CandidateIndex>,
    matcher: Matcher,
}

impl DedupEngine {
    pub fn new(
        repository: Arc<dyn FingerprintRepository>,
        index: Arc<CandidateIndex>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            repository,
            index,
            matcher: Matcher::new(config.matcher()),
        }
    }

    pub fn index(&self) -> &Arc<CandidateIndex> {
        &self.index
    }

    /// Answer "has a substantially similar video already been ingested?"
    /// without persisting anything.
    pub async fn check(&self, fingerprint: &Fingerprint, scope: MatchScope) -> Result<MatchVerdict> {
        let shortlist = self.index.candidates(fingerprint.global_hash);
        let mut candidates = Vec::with_capacity(shortlist.len());
        for video_id in shortlist {
            // An id evicted between the index read and this fetch is simply
            // skipped; storage stays authoritative.
            let Some(candidate) = self.repository.find(&video_id).await? else {
                continue;
            };
            if let MatchScope::Campaign(campaign_id) = &scope {
                if candidate.campaign_id != *campaign_id {
                    continue;
                }
            }
            candidates.push(candidate);
        }
        tracing::debug!(
            video_id = %fingerprint.video_id,
            shortlisted = candidates.len(),
            "scoring duplicate candidates"
        );
        self.matcher.rank(fingerprint, &candidates)
    }

    /// Check, then persist on a distinct verdict.
    ///
    /// The fingerprint is saved before it is indexed; a save failure
    /// (including [`crate::EngineError::DuplicateUrl`]) leaves the index
    /// untouched.
    pub async fn ingest(&self, fingerprint: Fingerprint, scope: MatchScope) -> Result<IngestOutcome> {
        match self.check(&fingerprint, scope).await? {
            MatchVerdict::Duplicate(found) => {
                tracing::info!(
                    video_id = %fingerprint.video_id,
                    duplicate_of = %found.video_id,
                    similarity = found.similarity,
                    "duplicate rejected"
                );
                Ok(IngestOutcome::Duplicate(found))
            }
            MatchVerdict::Distinct => {
                self.repository.save(&fingerprint).await?;
                self.index
                    .insert(fingerprint.video_id.clone(), fingerprint.global_hash);
                tracing::debug!(
                    video_id = %fingerprint.video_id,
                    campaign = %fingerprint.campaign_id,
                    "fingerprint ingested"
                );
                Ok(IngestOutcome::Ingested)
            }
        }
    }

    /// Ingest with the default scope: dedupe within the fingerprint's own
    /// campaign.
    pub async fn ingest_scoped(&self, fingerprint: Fingerprint) -> Result<IngestOutcome> {
        let scope = MatchScope::campaign_of(&fingerprint);
        self.ingest(fingerprint, scope).await
    }

    /// Repopulate the candidate index from storage. The index is a cache;
    /// after a restart this restores lookup latency, never correctness.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let all = self.repository.find_all().await?;
        self.index.clear();
        for fingerprint in &all {
            self.index
                .insert(fingerprint.video_id.clone(), fingerprint.global_hash);
        }
        tracing::info!(fingerprints = all.len(), "candidate index rebuilt");
        Ok(all.len())
    }
}
