//! Fingerprint data model.
//!
//! A [`Fingerprint`] is the immutable record produced when a campaign video
//! is ingested: a 64-bit perceptual summary of the whole video plus an
//! ordered sequence of per-time-window 64-bit hashes capturing its temporal
//! structure. Hash extraction from decoded frames happens upstream; this
//! module only deals in the fixed-width values and their wire encodings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::error::{EngineError, Result};

/// Number of bit columns in every sequence-signature row.
pub const SIGNATURE_COLUMNS: usize = 64;

/// Wire size of a global hash in bytes (64 bits).
pub const GLOBAL_HASH_SIZE: usize = 8;

/// Bytes of the SHA3-256 digest kept when deriving a video id from its URL.
const VIDEO_ID_DIGEST_BYTES: usize = 20;

/// Identifier of an ingested video, derived deterministically from its
/// source URL so the same source always maps to the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoId(String);

impl VideoId {
    /// Derive the canonical id for a source URL: the first 20 bytes of
    /// SHA3-256 over the URL, hex-encoded.
    pub fn derive(url: &str) -> Self {
        let digest = Sha3_256::digest(url.as_bytes());
        Self(hex::encode(&digest[..VIDEO_ID_DIGEST_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for VideoId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the campaign that owns a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(String);

impl CampaignId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed 64-bit perceptual hash of an entire video.
///
/// Order-independent summary, robust to re-encoding. Encoded on the wire as
/// 8 big-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalHash(u64);

impl GlobalHash {
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    /// Decode from the 8-byte wire encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; GLOBAL_HASH_SIZE] = bytes.try_into().map_err(|_| {
            EngineError::InvalidFingerprint(format!(
                "global hash must be {} bytes, got {}",
                GLOBAL_HASH_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(u64::from_be_bytes(arr)))
    }

    pub fn to_bytes(&self) -> [u8; GLOBAL_HASH_SIZE] {
        self.0.to_be_bytes()
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| EngineError::InvalidFingerprint(format!("invalid hex string: {e}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Count of differing bits between two hashes.
    pub fn hamming_distance(&self, other: &Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// Ordered matrix of per-time-window hashes, one 64-bit row per sampled
/// window, in playback order.
///
/// The column count is fixed at 64 and the row count must be positive;
/// both are enforced at every construction site, so a value of this type
/// is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct SequenceSignature {
    rows: Vec<u64>,
}

impl SequenceSignature {
    pub fn new(rows: Vec<u64>) -> Result<Self> {
        if rows.is_empty() {
            return Err(EngineError::InvalidFingerprint(
                "sequence signature has zero rows".into(),
            ));
        }
        Ok(Self { rows })
    }

    /// Decode from the packed wire encoding: `rows` big-endian 8-byte words.
    ///
    /// `columns` is carried separately in the persisted record and must be
    /// exactly 64.
    pub fn from_bytes(data: &[u8], rows: usize, columns: usize) -> Result<Self> {
        if columns != SIGNATURE_COLUMNS {
            return Err(EngineError::InvalidFingerprint(format!(
                "sequence signature has {columns} columns, expected {SIGNATURE_COLUMNS}"
            )));
        }
        if rows == 0 {
            return Err(EngineError::InvalidFingerprint(
                "sequence signature has zero rows".into(),
            ));
        }
        if data.len() != rows * GLOBAL_HASH_SIZE {
            return Err(EngineError::InvalidFingerprint(format!(
                "sequence signature buffer is {} bytes, expected {}",
                data.len(),
                rows * GLOBAL_HASH_SIZE
            )));
        }
        let rows = data
            .chunks_exact(GLOBAL_HASH_SIZE)
            .map(|chunk| {
                let arr: [u8; GLOBAL_HASH_SIZE] = chunk.try_into().unwrap_or_default();
                u64::from_be_bytes(arr)
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.rows
            .iter()
            .flat_map(|row| row.to_be_bytes())
            .collect()
    }

    pub fn rows(&self) -> &[u64] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub const fn column_count(&self) -> usize {
        SIGNATURE_COLUMNS
    }
}

impl TryFrom<Vec<u64>> for SequenceSignature {
    type Error = EngineError;

    fn try_from(rows: Vec<u64>) -> Result<Self> {
        Self::new(rows)
    }
}

impl From<SequenceSignature> for Vec<u64> {
    fn from(signature: SequenceSignature) -> Self {
        signature.rows
    }
}

/// Immutable record of an ingested video's perceptual features.
///
/// Created once at ingestion, never mutated, deleted only by the retention
/// sweeper or explicit removal of the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub video_id: VideoId,
    pub campaign_id: CampaignId,
    pub url: String,
    pub global_hash: GlobalHash,
    pub signature: SequenceSignature,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

impl Fingerprint {
    /// Build a fingerprint for a freshly analyzed video. The video id is
    /// derived from the URL and `created_at` is stamped now.
    pub fn new(
        campaign_id: CampaignId,
        url: impl Into<String>,
        global_hash: GlobalHash,
        signature: SequenceSignature,
        duration_seconds: f64,
    ) -> Result<Self> {
        let url = url.into();
        let video_id = VideoId::derive(&url);
        Self::from_parts(
            video_id,
            campaign_id,
            url,
            global_hash,
            signature,
            duration_seconds,
            Utc::now(),
        )
    }

    /// Rehydrate a fingerprint from stored fields, re-validating the
    /// invariants the persisted shape promises.
    pub fn from_parts(
        video_id: VideoId,
        campaign_id: CampaignId,
        url: impl Into<String>,
        global_hash: GlobalHash,
        signature: SequenceSignature,
        duration_seconds: f64,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if !(duration_seconds > 0.0) {
            return Err(EngineError::InvalidFingerprint(format!(
                "duration must be positive, got {duration_seconds}"
            )));
        }
        Ok(Self {
            video_id,
            campaign_id,
            url: url.into(),
            global_hash,
            signature,
            duration_seconds,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(rows: Vec<u64>) -> SequenceSignature {
        SequenceSignature::new(rows).unwrap()
    }

    #[test]
    fn test_video_id_is_deterministic() {
        let a = VideoId::derive("https://cdn.example.com/videos/a.mp4");
        let b = VideoId::derive("https://cdn.example.com/videos/a.mp4");
        let c = VideoId::derive("https://cdn.example.com/videos/b.mp4");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), VIDEO_ID_DIGEST_BYTES * 2);
    }

    #[test]
    fn test_global_hash_hex_roundtrip() {
        let hash = GlobalHash::new(0xDEAD_BEEF_CAFE_BABE);
        let hex = hash.to_hex();
        assert_eq!(hex, "deadbeefcafebabe");
        assert_eq!(GlobalHash::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn test_global_hash_rejects_short_buffer() {
        assert!(GlobalHash::from_bytes(&[0u8; 5]).is_err());
        assert!(GlobalHash::from_hex("abcd").is_err());
        assert!(GlobalHash::from_hex("not hex").is_err());
    }

    #[test]
    fn test_hamming_distance() {
        let zero = GlobalHash::new(0);
        assert_eq!(zero.hamming_distance(&zero), 0);
        assert_eq!(zero.hamming_distance(&GlobalHash::new(u64::MAX)), 64);
        assert_eq!(zero.hamming_distance(&GlobalHash::new(0b1011)), 3);
    }

    #[test]
    fn test_signature_rejects_zero_rows() {
        assert!(SequenceSignature::new(vec![]).is_err());
        assert!(SequenceSignature::from_bytes(&[], 0, SIGNATURE_COLUMNS).is_err());
    }

    #[test]
    fn test_signature_rejects_wrong_columns() {
        let err = SequenceSignature::from_bytes(&[0u8; 8], 1, 32).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFingerprint(_)));
    }

    #[test]
    fn test_signature_rejects_truncated_buffer() {
        assert!(SequenceSignature::from_bytes(&[0u8; 12], 2, SIGNATURE_COLUMNS).is_err());
    }

    #[test]
    fn test_signature_byte_codec() {
        let original = signature(vec![0xDEAD_BEEF_CAFE_BABE, 0, u64::MAX]);
        let bytes = original.to_bytes();
        assert_eq!(bytes.len(), 24);
        let decoded = SequenceSignature::from_bytes(&bytes, 3, SIGNATURE_COLUMNS).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_signature_json_rejects_empty() {
        let ok: SequenceSignature = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(ok.row_count(), 3);
        assert!(serde_json::from_str::<SequenceSignature>("[]").is_err());
    }

    #[test]
    fn test_fingerprint_rejects_bad_duration() {
        let sig = signature(vec![1, 2]);
        for duration in [0.0, -3.5, f64::NAN] {
            let result = Fingerprint::new(
                CampaignId::new("c1"),
                "https://cdn.example.com/v.mp4",
                GlobalHash::new(7),
                sig.clone(),
                duration,
            );
            assert!(result.is_err(), "duration {duration} should be rejected");
        }
    }

    #[test]
    fn test_fingerprint_id_comes_from_url() {
        let fp = Fingerprint::new(
            CampaignId::new("c1"),
            "https://cdn.example.com/v.mp4",
            GlobalHash::new(7),
            signature(vec![1]),
            12.5,
        )
        .unwrap();
        assert_eq!(fp.video_id, VideoId::derive("https://cdn.example.com/v.mp4"));
    }
}
