//! Duplicate scoring.
//!
//! A candidate survives two gates before it is declared a duplicate: exact
//! Hamming distance between global hashes, then a row-alignment distance
//! over the sequence signatures. The alignment is a classic edit distance
//! on rows — substituting a row costs the Hamming distance between the two
//! 64-bit rows, inserting or deleting a row costs a fixed gap — so trimmed,
//! padded, or slightly re-timed duplicates still score high where a single
//! global hash would miss them.
//!
//! Scoring is pure: the caller decides what to do with a verdict.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::fingerprint::{CampaignId, Fingerprint, SequenceSignature, VideoId, SIGNATURE_COLUMNS};

/// Matching thresholds and bounds.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Maximum Hamming distance between global hashes for a candidate to
    /// stay in play (bits out of 64).
    pub max_hamming: u32,
    /// Minimum normalized alignment similarity to declare a duplicate.
    pub min_similarity: f64,
    /// Cost of leaving one signature row unmatched, in bits. 48 puts two
    /// padding rows out of twelve at similarity 0.875.
    pub gap_cost: u32,
    /// Rows of each signature participating in alignment; bounds the DP at
    /// `max_rows * max_rows` cells.
    pub max_rows: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_hamming: 8,
            min_similarity: 0.85,
            gap_cost: 48,
            max_rows: 512,
        }
    }
}

/// Which part of the corpus a duplicate check runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchScope {
    /// Only fingerprints of one campaign. This is the default scope used
    /// at ingestion: re-submissions are policed within a campaign.
    Campaign(CampaignId),
    /// Every campaign.
    Global,
}

impl MatchScope {
    /// Scope covering the fingerprint's own campaign.
    pub fn campaign_of(fingerprint: &Fingerprint) -> Self {
        Self::Campaign(fingerprint.campaign_id.clone())
    }
}

/// Raw comparison of one candidate against the query.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchScore {
    /// Bits differing between the global hashes.
    pub hamming: u32,
    /// Normalized alignment similarity in [0, 1]; 1.0 means the signatures
    /// align perfectly.
    pub similarity: f64,
}

/// A candidate that passed both gates.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMatch {
    pub video_id: VideoId,
    pub campaign_id: CampaignId,
    pub url: String,
    pub hamming: u32,
    pub similarity: f64,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a duplicate check. `Distinct` is a normal result, not an
/// error — an empty corpus simply yields `Distinct`.
#[derive(Debug, Clone, Serialize)]
pub enum MatchVerdict {
    Duplicate(DuplicateMatch),
    Distinct,
}

impl MatchVerdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// Stateless scorer configured with thresholds.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Compare one candidate against the query.
    pub fn score(&self, query: &Fingerprint, candidate: &Fingerprint) -> MatchScore {
        let hamming = query.global_hash.hamming_distance(&candidate.global_hash);
        let similarity = self.alignment_similarity(&query.signature, &candidate.signature);
        MatchScore { hamming, similarity }
    }

    /// Score every candidate and return the best duplicate, if any.
    ///
    /// A candidate is a duplicate when its Hamming distance is within
    /// `max_hamming` AND its alignment similarity reaches `min_similarity`.
    /// The highest similarity wins; ties go to the earliest `created_at`.
    pub fn rank(&self, query: &Fingerprint, candidates: &[Fingerprint]) -> Result<MatchVerdict> {
        if query.signature.row_count() == 0 {
            return Err(EngineError::InvalidFingerprint(
                "query signature has zero rows".into(),
            ));
        }

        let mut best: Option<DuplicateMatch> = None;
        for candidate in candidates {
            let score = self.score(query, candidate);
            if score.hamming > self.config.max_hamming {
                continue;
            }
            if score.similarity < self.config.min_similarity {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    score.similarity > current.similarity
                        || (score.similarity == current.similarity
                            && candidate.created_at < current.created_at)
                }
            };
            if better {
                best = Some(DuplicateMatch {
                    video_id: candidate.video_id.clone(),
                    campaign_id: candidate.campaign_id.clone(),
                    url: candidate.url.clone(),
                    hamming: score.hamming,
                    similarity: score.similarity,
                    created_at: candidate.created_at,
                });
            }
        }

        match best {
            Some(found) => {
                tracing::debug!(
                    duplicate_of = %found.video_id,
                    hamming = found.hamming,
                    similarity = found.similarity,
                    "duplicate candidate accepted"
                );
                Ok(MatchVerdict::Duplicate(found))
            }
            None => Ok(MatchVerdict::Distinct),
        }
    }

    /// Normalized alignment similarity between two signatures.
    ///
    /// The edit cost is normalized by the worst case of substituting every
    /// row of the longer signature (64 bits each) and clamped into [0, 1].
    fn alignment_similarity(&self, a: &SequenceSignature, b: &SequenceSignature) -> f64 {
        let cap = self.config.max_rows;
        let a = &a.rows()[..a.row_count().min(cap)];
        let b = &b.rows()[..b.row_count().min(cap)];
        let cost = alignment_cost(a, b, self.config.gap_cost);
        let worst = (SIGNATURE_COLUMNS * a.len().max(b.len())) as f64;
        (1.0 - cost as f64 / worst).clamp(0.0, 1.0)
    }
}

/// Row-alignment edit distance between two hash sequences.
///
/// Standard two-row dynamic program: substitution costs the Hamming
/// distance between rows, insert/delete costs `gap` per row.
fn alignment_cost(a: &[u64], b: &[u64], gap: u32) -> u64 {
    let gap = u64::from(gap);
    let mut prev: Vec<u64> = (0..=b.len() as u64).map(|j| j * gap).collect();
    let mut curr = vec![0u64; b.len() + 1];
    for (i, row_a) in a.iter().enumerate() {
        curr[0] = (i as u64 + 1) * gap;
        for (j, row_b) in b.iter().enumerate() {
            let substitute = prev[j] + u64::from((row_a ^ row_b).count_ones());
            let delete = prev[j + 1] + gap;
            let insert = curr[j] + gap;
            curr[j + 1] = substitute.min(delete).min(insert);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
