//! Retention windows and the sweep that enforces them.
//!
//! Each campaign carries a [`RetentionRecord`] naming the date after which
//! its fingerprints must be purged. [`RetentionSweeper::sweep`] walks the
//! expired campaigns, confirms media deletion through the [`MediaStore`]
//! port, then deletes the fingerprint record and evicts it from the
//! candidate index. A fingerprint record is never deleted before its media
//! deletion is confirmed, and media failures keep the record alive for the
//! next sweep — the two sides must not diverge.
//!
//! The sweeper holds no clock: `now` is injected, which keeps sweeps
//! deterministic and testable.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::fingerprint::{CampaignId, VideoId};
use crate::index::CandidateIndex;
use crate::repository::FingerprintRepository;

/// A campaign's retention window. One record per campaign; fingerprints of
/// campaigns without a record never expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionRecord {
    pub campaign_id: CampaignId,
    /// Date after which owned fingerprints become eligible for deletion.
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RetentionRecord {
    pub fn new(campaign_id: CampaignId, end_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            campaign_id,
            end_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the retention window, touching `updated_at`.
    pub fn extend(&mut self, end_date: NaiveDate) {
        self.end_date = end_date;
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.end_date < today
    }
}

/// Signal to the external media-storage service that a fingerprint's
/// underlying file must be deleted. One event per deleted fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionEvent {
    pub video_id: VideoId,
    pub url: String,
}

/// Port to the external media-storage collaborator.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Delete the media object behind a fingerprint. Deleting media that is
    /// already gone must succeed, so interrupted sweeps can be retried.
    /// Failures surface as [`crate::EngineError::MediaDeletionFailed`].
    async fn delete(&self, event: &DeletionEvent) -> Result<()>;
}

/// What one sweep accomplished.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Identifier of this sweep run, for correlating logs and retries.
    pub run_id: Uuid,
    /// Campaigns whose retention window had elapsed.
    pub campaigns_expired: usize,
    /// Campaigns fully purged, retention record included.
    pub campaigns_cleared: usize,
    pub fingerprints_deleted: usize,
    /// Fingerprints kept alive because their media deletion failed; retried
    /// on the next sweep.
    pub media_failures: Vec<(VideoId, String)>,
}

impl SweepReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            campaigns_expired: 0,
            campaigns_cleared: 0,
            fingerprints_deleted: 0,
            media_failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.media_failures.is_empty()
    }
}

/// Enforces retention windows against the repository, media store, and
/// candidate index.
pub struct RetentionSweeper {
    repository: Arc<dyn FingerprintRepository>,
    media: Arc<dyn MediaStore>,
    index: Arc<CandidateIndex>,
    // At most one sweep in flight; ingestion is not blocked.
    gate: Mutex<()>,
}

impl RetentionSweeper {
    pub fn new(
        repository: Arc<dyn FingerprintRepository>,
        media: Arc<dyn MediaStore>,
        index: Arc<CandidateIndex>,
    ) -> Self {
        Self {
            repository,
            media,
            index,
            gate: Mutex::new(()),
        }
    }

    /// Purge everything owned by campaigns whose retention window elapsed
    /// before `now`'s date.
    ///
    /// Per fingerprint the order is fixed: media deletion is confirmed
    /// first, then the record is deleted and the id evicted from the index.
    /// A campaign's retention record is dropped only once every owned
    /// fingerprint is gone, so a partially failed sweep resumes cleanly.
    /// Idempotent: a second sweep with no new ingestion deletes nothing.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let _running = self.gate.lock().await;

        let today = now.date_naive();
        let expired = self.repository.find_expired(today).await?;
        let mut report = SweepReport::new();
        report.campaigns_expired = expired.len();
        if expired.is_empty() {
            return Ok(report);
        }

        tracing::info!(
            run_id = %report.run_id,
            campaigns = expired.len(),
            %today,
            "retention sweep started"
        );

        for record in &expired {
            let owned = self.repository.find_by_campaign(&record.campaign_id).await?;
            let mut kept = 0usize;
            for fingerprint in owned {
                let event = DeletionEvent {
                    video_id: fingerprint.video_id.clone(),
                    url: fingerprint.url.clone(),
                };
                if let Err(err) = self.media.delete(&event).await {
                    tracing::warn!(
                        run_id = %report.run_id,
                        video_id = %event.video_id,
                        error = %err,
                        "media deletion failed, keeping fingerprint for retry"
                    );
                    report.media_failures.push((event.video_id, err.to_string()));
                    kept += 1;
                    continue;
                }
                self.repository.delete(&fingerprint.video_id).await?;
                self.index.remove(&fingerprint.video_id);
                report.fingerprints_deleted += 1;
            }
            if kept == 0 {
                self.repository.delete_retention(&record.campaign_id).await?;
                report.campaigns_cleared += 1;
                tracing::debug!(
                    run_id = %report.run_id,
                    campaign = %record.campaign_id,
                    "campaign fully purged"
                );
            }
        }

        tracing::info!(
            run_id = %report.run_id,
            deleted = report.fingerprints_deleted,
            cleared = report.campaigns_cleared,
            failures = report.media_failures.len(),
            "retention sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_expiry_is_strictly_after_end_date() {
        let record = RetentionRecord::new(
            CampaignId::new("c1"),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(!record.is_expired(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert!(record.is_expired(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
    }

    #[test]
    fn test_extend_touches_updated_at() {
        let mut record = RetentionRecord::new(
            CampaignId::new("c1"),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        let before = record.updated_at;
        record.extend(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(
            record.end_date,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );
        assert!(record.updated_at >= before);
    }

    #[test]
    fn test_deletion_event_wire_shape() {
        let event = DeletionEvent {
            video_id: VideoId::derive("https://cdn.example.com/v.mp4"),
            url: "https://cdn.example.com/v.mp4".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["url"], "https://cdn.example.com/v.mp4");
        assert!(json["video_id"].is_string());
    }
}
