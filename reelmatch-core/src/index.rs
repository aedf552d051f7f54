//! Candidate index: banded locality-sensitive bucketing of global hashes.
//!
//! Similarity search against the whole corpus would be O(n) Hamming
//! comparisons per query. Instead the 64-bit global hash is cut into 16
//! bands of 4 bits and every fingerprint is registered under one bucket per
//! band. Two hashes within Hamming distance 15 differ in at most 15 bands,
//! so at least one band is untouched and the pair shares a bucket: for any
//! configured distance bound up to [`MAX_GUARANTEED_DISTANCE`] the candidate
//! set is a superset of the true matches. False positives are expected and
//! filtered by the matcher.
//!
//! The index is a rebuildable cache over the repository, never a source of
//! truth; losing it costs latency until repopulated, not correctness.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::fingerprint::{GlobalHash, VideoId};

/// Number of bands the 64-bit hash is cut into.
pub const BANDS: usize = 16;

/// Bits per band.
const BAND_BITS: usize = 64 / BANDS;

/// Largest Hamming distance for which `candidates` returns every true
/// match (pigeonhole over the bands).
pub const MAX_GUARANTEED_DISTANCE: u32 = (BANDS - 1) as u32;

/// Bucket keys for a hash: one per band, band number in the high bits so
/// keys never collide across bands. The key space is BANDS * 2^BAND_BITS
/// (256), so buckets are never pruned.
fn band_keys(hash: GlobalHash) -> [u16; BANDS] {
    let bits = hash.bits();
    let mut keys = [0u16; BANDS];
    for (band, key) in keys.iter_mut().enumerate() {
        let window = ((bits >> (band * BAND_BITS)) & ((1 << BAND_BITS) - 1)) as u16;
        *key = ((band as u16) << BAND_BITS) | window;
    }
    keys
}

/// Concurrent map from hash bands to the video ids registered under them.
///
/// Readers and writers contend only per dashmap shard, so match queries run
/// concurrently with ingestion inserts and sweeper evictions.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    buckets: DashMap<u16, HashSet<VideoId>>,
    hashes: DashMap<VideoId, GlobalHash>,
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a video under every band of its hash. Idempotent; re-inserting
    /// an id under a different hash first evicts the stale registration.
    pub fn insert(&self, video_id: VideoId, hash: GlobalHash) {
        if let Some(previous) = self.hashes.insert(video_id.clone(), hash) {
            if previous != hash {
                tracing::warn!(%video_id, "hash changed on re-insert, evicting stale bands");
                self.evict(&video_id, previous);
            }
        }
        for key in band_keys(hash) {
            self.buckets.entry(key).or_default().insert(video_id.clone());
        }
    }

    /// Ids sharing at least one band with the query hash: a superset of the
    /// corpus entries within [`MAX_GUARANTEED_DISTANCE`] of it.
    pub fn candidates(&self, hash: GlobalHash) -> HashSet<VideoId> {
        let mut out = HashSet::new();
        for key in band_keys(hash) {
            if let Some(bucket) = self.buckets.get(&key) {
                out.extend(bucket.iter().cloned());
            }
        }
        out
    }

    /// Evict a video from all bands. No-op if absent.
    pub fn remove(&self, video_id: &VideoId) {
        if let Some((_, hash)) = self.hashes.remove(video_id) {
            self.evict(video_id, hash);
        }
    }

    pub fn contains(&self, video_id: &VideoId) -> bool {
        self.hashes.contains_key(video_id)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Drop every registration, e.g. before a rebuild from the repository.
    pub fn clear(&self) {
        self.buckets.clear();
        self.hashes.clear();
    }

    fn evict(&self, video_id: &VideoId, hash: GlobalHash) {
        for key in band_keys(hash) {
            if let Some(mut bucket) = self.buckets.get_mut(&key) {
                bucket.remove(video_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vid(n: u32) -> VideoId {
        VideoId::derive(&format!("https://cdn.example.com/videos/{n}.mp4"))
    }

    /// Flip `count` bits of `bits`, spread across the word so flips land in
    /// different bands as often as possible.
    fn flip_bits(bits: u64, count: u32) -> u64 {
        let mut out = bits;
        for i in 0..count {
            out ^= 1 << ((i * 13 + 5) % 64);
        }
        out
    }

    #[test]
    fn test_band_keys_are_distinct_per_band() {
        let keys = band_keys(GlobalHash::new(0));
        let unique: HashSet<u16> = keys.iter().copied().collect();
        assert_eq!(unique.len(), BANDS);
    }

    #[test]
    fn test_exact_match_is_candidate() {
        let index = CandidateIndex::new();
        let hash = GlobalHash::new(0xA5A5_5A5A_0F0F_F0F0);
        index.insert(vid(1), hash);
        assert!(index.candidates(hash).contains(&vid(1)));
    }

    #[test]
    fn test_no_false_negatives_within_guaranteed_distance() {
        let index = CandidateIndex::new();
        let base = GlobalHash::new(0x0123_4567_89AB_CDEF);
        index.insert(vid(1), base);

        // Every single-bit flip.
        for bit in 0..64 {
            let query = GlobalHash::new(base.bits() ^ (1 << bit));
            assert!(
                index.candidates(query).contains(&vid(1)),
                "missed single-bit flip at {bit}"
            );
        }

        // Spread multi-bit flips up to the guaranteed bound.
        for distance in 2..=MAX_GUARANTEED_DISTANCE {
            let query = GlobalHash::new(flip_bits(base.bits(), distance));
            assert!(
                base.hamming_distance(&query) <= distance,
                "flip helper exceeded the intended distance"
            );
            assert!(
                index.candidates(query).contains(&vid(1)),
                "missed {distance}-bit flip"
            );
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let index = CandidateIndex::new();
        let hash = GlobalHash::new(42);
        index.insert(vid(1), hash);
        let once = index.candidates(hash);
        index.insert(vid(1), hash);
        assert_eq!(index.candidates(hash), once);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_evicts_all_bands() {
        let index = CandidateIndex::new();
        let hash = GlobalHash::new(u64::MAX);
        index.insert(vid(1), hash);
        index.remove(&vid(1));
        assert!(index.candidates(hash).is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let index = CandidateIndex::new();
        index.insert(vid(1), GlobalHash::new(7));
        index.remove(&vid(2));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_reinsert_with_new_hash_evicts_stale_bands() {
        let index = CandidateIndex::new();
        let old = GlobalHash::new(0);
        let new = GlobalHash::new(u64::MAX);
        index.insert(vid(1), old);
        index.insert(vid(1), new);
        assert!(!index.candidates(old).contains(&vid(1)));
        assert!(index.candidates(new).contains(&vid(1)));
    }

    #[test]
    fn test_clear_empties_everything() {
        let index = CandidateIndex::new();
        for n in 0..10 {
            index.insert(vid(n), GlobalHash::new(n as u64 * 977));
        }
        index.clear();
        assert!(index.is_empty());
        assert!(index.candidates(GlobalHash::new(0)).is_empty());
    }
}
