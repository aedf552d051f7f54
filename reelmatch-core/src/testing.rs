//! Memory-backed port implementations for tests and local development.
//!
//! [`MemoryRepository`] honors the same contracts as the PostgreSQL store
//! (URL uniqueness, upsert semantics, strict expiry), and
//! [`RecordingMediaStore`] captures deletion events so sweeps can be
//! asserted against; it can also be told to fail specific videos to
//! exercise the media-failure path.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;

use crate::error::{EngineError, Result};
use crate::fingerprint::{CampaignId, Fingerprint, VideoId};
use crate::repository::FingerprintRepository;
use crate::retention::{DeletionEvent, MediaStore, RetentionRecord};

/// In-memory [`FingerprintRepository`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    fingerprints: DashMap<VideoId, Fingerprint>,
    urls: DashMap<String, VideoId>,
    retention: DashMap<CampaignId, RetentionRecord>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn retention_count(&self) -> usize {
        self.retention.len()
    }
}

#[async_trait]
impl FingerprintRepository for MemoryRepository {
    async fn save(&self, fingerprint: &Fingerprint) -> Result<()> {
        if self.urls.contains_key(&fingerprint.url) {
            return Err(EngineError::DuplicateUrl(fingerprint.url.clone()));
        }
        self.urls
            .insert(fingerprint.url.clone(), fingerprint.video_id.clone());
        self.fingerprints
            .insert(fingerprint.video_id.clone(), fingerprint.clone());
        Ok(())
    }

    async fn find(&self, video_id: &VideoId) -> Result<Option<Fingerprint>> {
        Ok(self.fingerprints.get(video_id).map(|entry| entry.clone()))
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Fingerprint>> {
        let Some(video_id) = self.urls.get(url).map(|entry| entry.clone()) else {
            return Ok(None);
        };
        self.find(&video_id).await
    }

    async fn find_by_campaign(&self, campaign_id: &CampaignId) -> Result<Vec<Fingerprint>> {
        Ok(self
            .fingerprints
            .iter()
            .filter(|entry| entry.campaign_id == *campaign_id)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<Fingerprint>> {
        Ok(self.fingerprints.iter().map(|entry| entry.clone()).collect())
    }

    async fn find_expired(&self, today: NaiveDate) -> Result<Vec<RetentionRecord>> {
        Ok(self
            .retention
            .iter()
            .filter(|entry| entry.is_expired(today))
            .map(|entry| entry.clone())
            .collect())
    }

    async fn delete(&self, video_id: &VideoId) -> Result<bool> {
        let Some((_, fingerprint)) = self.fingerprints.remove(video_id) else {
            return Ok(false);
        };
        self.urls.remove(&fingerprint.url);
        Ok(true)
    }

    async fn upsert_retention(&self, record: &RetentionRecord) -> Result<()> {
        self.retention
            .entry(record.campaign_id.clone())
            .and_modify(|existing| {
                existing.end_date = record.end_date;
                existing.updated_at = Utc::now();
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn delete_retention(&self, campaign_id: &CampaignId) -> Result<bool> {
        Ok(self.retention.remove(campaign_id).is_some())
    }
}

/// Media store that records every deletion event and can be told to fail
/// specific videos.
#[derive(Debug, Default)]
pub struct RecordingMediaStore {
    events: Mutex<Vec<DeletionEvent>>,
    denied: Mutex<HashSet<VideoId>>,
}

impl RecordingMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletion events confirmed so far, in order.
    pub fn events(&self) -> Vec<DeletionEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Make deletions of this video fail until [`Self::allow`] is called.
    pub fn deny(&self, video_id: VideoId) {
        if let Ok(mut denied) = self.denied.lock() {
            denied.insert(video_id);
        }
    }

    pub fn allow(&self, video_id: &VideoId) {
        if let Ok(mut denied) = self.denied.lock() {
            denied.remove(video_id);
        }
    }
}

#[async_trait]
impl MediaStore for RecordingMediaStore {
    async fn delete(&self, event: &DeletionEvent) -> Result<()> {
        let denied = self
            .denied
            .lock()
            .map(|denied| denied.contains(&event.video_id))
            .unwrap_or(false);
        if denied {
            return Err(EngineError::MediaDeletionFailed {
                video_id: event.video_id.to_string(),
                reason: "storage backend rejected the delete".into(),
            });
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}
