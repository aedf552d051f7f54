//! PostgreSQL-backed fingerprint repository.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use reelmatch_core::{
    CampaignId, EngineError, Fingerprint, FingerprintRepository, GlobalHash, Result,
    RetentionRecord, SequenceSignature, VideoId,
};

/// SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Durable store for fingerprints and retention records.
///
/// Runs migrations automatically on connection.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// Row type for `video_features` queries.
#[derive(FromRow)]
struct FeatureRow {
    video_id: String,
    campaign_id: String,
    url: String,
    global_hash: Vec<u8>,
    sequence_signature: Vec<u8>,
    rows: i32,
    columns: i32,
    duration_seconds: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<FeatureRow> for Fingerprint {
    type Error = EngineError;

    fn try_from(row: FeatureRow) -> Result<Self> {
        let global_hash = GlobalHash::from_bytes(&row.global_hash)?;
        let signature = SequenceSignature::from_bytes(
            &row.sequence_signature,
            usize::try_from(row.rows).unwrap_or(0),
            usize::try_from(row.columns).unwrap_or(0),
        )?;
        Fingerprint::from_parts(
            VideoId::from(row.video_id),
            CampaignId::new(row.campaign_id),
            row.url,
            global_hash,
            signature,
            row.duration_seconds,
            row.created_at,
        )
    }
}

/// Row type for `campaign_retention` queries.
#[derive(FromRow)]
struct RetentionRow {
    campaign_id: String,
    end_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RetentionRow> for RetentionRecord {
    fn from(row: RetentionRow) -> Self {
        Self {
            campaign_id: CampaignId::new(row.campaign_id),
            end_date: row.end_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresStore {
    /// Connect with the given database URL and apply migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| EngineError::StorageUnavailable(format!("connection failed: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| EngineError::StorageUnavailable(format!("migration failed: {e}")))?;

        tracing::info!("fingerprint store connected and migrations applied");

        Ok(Self { pool })
    }

    /// Wrap an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FingerprintRepository for PostgresStore {
    async fn save(&self, fingerprint: &Fingerprint) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO video_features
                (video_id, campaign_id, url, global_hash, sequence_signature,
                 rows, columns, duration_seconds, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(fingerprint.video_id.as_str())
        .bind(fingerprint.campaign_id.as_str())
        .bind(&fingerprint.url)
        .bind(fingerprint.global_hash.to_bytes().to_vec())
        .bind(fingerprint.signature.to_bytes())
        .bind(fingerprint.signature.row_count() as i32)
        .bind(fingerprint.signature.column_count() as i32)
        .bind(fingerprint.duration_seconds)
        .bind(fingerprint.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::debug!(video_id = %fingerprint.video_id, "stored fingerprint");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                Err(EngineError::DuplicateUrl(fingerprint.url.clone()))
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn find(&self, video_id: &VideoId) -> Result<Option<Fingerprint>> {
        let row: Option<FeatureRow> = sqlx::query_as(
            r#"
            SELECT video_id, campaign_id, url, global_hash, sequence_signature,
                   rows, columns, duration_seconds, created_at
            FROM video_features
            WHERE video_id = $1
            "#,
        )
        .bind(video_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Fingerprint::try_from).transpose()
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Fingerprint>> {
        let row: Option<FeatureRow> = sqlx::query_as(
            r#"
            SELECT video_id, campaign_id, url, global_hash, sequence_signature,
                   rows, columns, duration_seconds, created_at
            FROM video_features
            WHERE url = $1
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Fingerprint::try_from).transpose()
    }

    async fn find_by_campaign(&self, campaign_id: &CampaignId) -> Result<Vec<Fingerprint>> {
        let rows: Vec<FeatureRow> = sqlx::query_as(
            r#"
            SELECT video_id, campaign_id, url, global_hash, sequence_signature,
                   rows, columns, duration_seconds, created_at
            FROM video_features
            WHERE campaign_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(campaign_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Fingerprint::try_from).collect()
    }

    async fn find_all(&self) -> Result<Vec<Fingerprint>> {
        let rows: Vec<FeatureRow> = sqlx::query_as(
            r#"
            SELECT video_id, campaign_id, url, global_hash, sequence_signature,
                   rows, columns, duration_seconds, created_at
            FROM video_features
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.into_iter().map(Fingerprint::try_from).collect()
    }

    async fn find_expired(&self, today: NaiveDate) -> Result<Vec<RetentionRecord>> {
        let rows: Vec<RetentionRow> = sqlx::query_as(
            r#"
            SELECT campaign_id, end_date, created_at, updated_at
            FROM campaign_retention
            WHERE end_date < $1
            ORDER BY end_date
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(RetentionRecord::from).collect())
    }

    async fn delete(&self, video_id: &VideoId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM video_features WHERE video_id = $1")
            .bind(video_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_retention(&self, record: &RetentionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaign_retention (campaign_id, end_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (campaign_id) DO UPDATE SET
                end_date = EXCLUDED.end_date,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.campaign_id.as_str())
        .bind(record.end_date)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        tracing::debug!(
            campaign = %record.campaign_id,
            end_date = %record.end_date,
            "retention window upserted"
        );
        Ok(())
    }

    async fn delete_retention(&self, campaign_id: &CampaignId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM campaign_retention WHERE campaign_id = $1")
            .bind(campaign_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }
}

fn storage_error(e: sqlx::Error) -> EngineError {
    EngineError::StorageUnavailable(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_row(rows: i32, columns: i32, signature: Vec<u8>) -> FeatureRow {
        FeatureRow {
            video_id: "abc123".into(),
            campaign_id: "c1".into(),
            url: "https://cdn.example.com/v.mp4".into(),
            global_hash: 0xDEAD_BEEF_CAFE_BABE_u64.to_be_bytes().to_vec(),
            sequence_signature: signature,
            rows,
            columns,
            duration_seconds: 12.5,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_roundtrips_to_fingerprint() {
        let signature = SequenceSignature::new(vec![1, 2, 3]).unwrap();
        let row = feature_row(3, 64, signature.to_bytes());
        let fp = Fingerprint::try_from(row).unwrap();
        assert_eq!(fp.video_id.as_str(), "abc123");
        assert_eq!(fp.global_hash, GlobalHash::new(0xDEAD_BEEF_CAFE_BABE));
        assert_eq!(fp.signature, signature);
    }

    #[test]
    fn test_corrupt_column_count_is_rejected() {
        let row = feature_row(1, 32, vec![0u8; 8]);
        let err = Fingerprint::try_from(row).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFingerprint(_)));
    }

    #[test]
    fn test_truncated_signature_buffer_is_rejected() {
        let row = feature_row(2, 64, vec![0u8; 9]);
        assert!(Fingerprint::try_from(row).is_err());
    }

    #[test]
    fn test_negative_row_count_is_rejected() {
        let row = feature_row(-1, 64, vec![]);
        assert!(Fingerprint::try_from(row).is_err());
    }
}
