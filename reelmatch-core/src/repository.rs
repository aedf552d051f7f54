//! Persistence boundary.
//!
//! The engine never assumes a storage backend; everything durable goes
//! through [`FingerprintRepository`]. `reelmatch-store` provides the
//! PostgreSQL implementation, [`crate::testing`] a memory-backed one.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::fingerprint::{CampaignId, Fingerprint, VideoId};
use crate::retention::RetentionRecord;

/// Durable storage for fingerprints and retention records.
///
/// Storage failures surface as [`crate::EngineError::StorageUnavailable`];
/// callers retry, nothing is silently dropped.
#[async_trait]
pub trait FingerprintRepository: Send + Sync {
    /// Persist a new fingerprint. Fails with
    /// [`crate::EngineError::DuplicateUrl`] when another fingerprint
    /// already references the same source URL; no partial state is left
    /// behind in that case.
    async fn save(&self, fingerprint: &Fingerprint) -> Result<()>;

    async fn find(&self, video_id: &VideoId) -> Result<Option<Fingerprint>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Fingerprint>>;

    async fn find_by_campaign(&self, campaign_id: &CampaignId) -> Result<Vec<Fingerprint>>;

    /// Every stored fingerprint, used to repopulate the candidate index at
    /// process start.
    async fn find_all(&self) -> Result<Vec<Fingerprint>>;

    /// Retention records whose end date lies strictly before `today`.
    async fn find_expired(&self, today: NaiveDate) -> Result<Vec<RetentionRecord>>;

    /// Delete a fingerprint. Returns whether a record was removed.
    async fn delete(&self, video_id: &VideoId) -> Result<bool>;

    /// Create or update a campaign's retention window. An update touches
    /// `updated_at` and leaves `created_at` alone.
    async fn upsert_retention(&self, record: &RetentionRecord) -> Result<()>;

    /// Drop a campaign's retention record once its fingerprints are gone.
    /// Returns whether a record was removed.
    async fn delete_retention(&self, campaign_id: &CampaignId) -> Result<bool>;
}
