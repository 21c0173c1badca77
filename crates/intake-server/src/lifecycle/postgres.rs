//! PostgreSQL lifecycle store
//!
//! Conditional writes map onto single statements: an absent expectation is an
//! `INSERT ... ON CONFLICT DO NOTHING`, an observed one is an `UPDATE` guarded
//! by the observed status and version. Zero affected rows means contention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intake_common::{ColumnSchema, FileFingerprint, LifecycleError};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use super::record::{Expected, FileLifecycleRecord};
use super::store::{LifecycleStore, PutOutcome, StoreError, StoreResult};

const SELECT_RECORD: &str = r#"
    SELECT fingerprint, status, target_table, source_location, attempt_count,
           last_error, row_count_raw, row_count_repaired, artifact_ref, schema,
           version, created_at, updated_at
    FROM file_lifecycle
    WHERE fingerprint = $1
"#;

const INSERT_RECORD: &str = r#"
    INSERT INTO file_lifecycle (
        fingerprint, status, target_table, source_location, attempt_count,
        last_error, row_count_raw, row_count_repaired, artifact_ref, schema,
        version, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (fingerprint) DO NOTHING
"#;

const UPDATE_RECORD: &str = r#"
    UPDATE file_lifecycle
    SET status = $2, target_table = $3, source_location = $4, attempt_count = $5,
        last_error = $6, row_count_raw = $7, row_count_repaired = $8,
        artifact_ref = $9, schema = $10, version = $11, updated_at = $12
    WHERE fingerprint = $1
      AND status = $13
      AND version = $14
"#;

#[derive(Debug, sqlx::FromRow)]
struct LifecycleRow {
    fingerprint: String,
    status: String,
    target_table: String,
    source_location: String,
    attempt_count: i32,
    last_error: Option<Json<LifecycleError>>,
    row_count_raw: Option<i64>,
    row_count_repaired: Option<i64>,
    artifact_ref: Option<String>,
    schema: Option<Json<Vec<ColumnSchema>>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LifecycleRow> for FileLifecycleRecord {
    type Error = StoreError;

    fn try_from(row: LifecycleRow) -> Result<Self, Self::Error> {
        let corrupt = |message: String| StoreError::Corrupt {
            fingerprint: row.fingerprint.clone(),
            message,
        };

        let fingerprint: FileFingerprint = row.fingerprint.parse().map_err(|e| corrupt(format!("{e}")))?;
        let status = row.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let attempt_count = u32::try_from(row.attempt_count).map_err(|e| corrupt(e.to_string()))?;
        let row_count_raw = row
            .row_count_raw
            .map(u64::try_from)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let row_count_repaired = row
            .row_count_repaired
            .map(u64::try_from)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(FileLifecycleRecord {
            fingerprint,
            status,
            target_table: row.target_table,
            source_location: row.source_location,
            attempt_count,
            last_error: row.last_error.map(|e| e.0),
            row_count_raw,
            row_count_repaired,
            artifact_ref: row.artifact_ref,
            schema: row.schema.map(|s| s.0),
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgLifecycleStore {
    pool: PgPool,
}

impl PgLifecycleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the workspace migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))
    }

    /// Bind the shared columns `$1..$11`
    fn bind_record<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        record: &'q FileLifecycleRecord,
    ) -> StoreResult<sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>> {
        let to_i64 = |v: u64| {
            i64::try_from(v).map_err(|e| StoreError::Corrupt {
                fingerprint: record.fingerprint.to_string(),
                message: e.to_string(),
            })
        };
        let attempt_count = i32::try_from(record.attempt_count).map_err(|e| StoreError::Corrupt {
            fingerprint: record.fingerprint.to_string(),
            message: e.to_string(),
        })?;

        Ok(query
            .bind(record.fingerprint.as_str())
            .bind(record.status.as_str())
            .bind(&record.target_table)
            .bind(&record.source_location)
            .bind(attempt_count)
            .bind(record.last_error.as_ref().map(Json))
            .bind(record.row_count_raw.map(to_i64).transpose()?)
            .bind(record.row_count_repaired.map(to_i64).transpose()?)
            .bind(&record.artifact_ref)
            .bind(record.schema.as_ref().map(Json))
            .bind(record.version))
    }
}

#[async_trait]
impl LifecycleStore for PgLifecycleStore {
    #[instrument(skip(self), fields(fingerprint = %fingerprint))]
    async fn get(&self, fingerprint: &FileFingerprint) -> StoreResult<Option<FileLifecycleRecord>> {
        let row = sqlx::query_as::<_, LifecycleRow>(SELECT_RECORD)
            .bind(fingerprint.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(FileLifecycleRecord::try_from).transpose()
    }

    #[instrument(skip(self, record), fields(fingerprint = %record.fingerprint, status = %record.status))]
    async fn put(&self, record: &FileLifecycleRecord, expected: Expected) -> StoreResult<PutOutcome> {
        let result = match expected {
            Expected::Absent => {
                Self::bind_record(sqlx::query(INSERT_RECORD), record)?
                    .bind(record.created_at)
                    .bind(record.updated_at)
                    .execute(&self.pool)
                    .await?
            },
            Expected::Observed { status, version } => {
                Self::bind_record(sqlx::query(UPDATE_RECORD), record)?
                    .bind(record.updated_at)
                    .bind(status.as_str())
                    .bind(version)
                    .execute(&self.pool)
                    .await?
            },
        };

        if result.rows_affected() == 1 {
            Ok(PutOutcome::Written(record.clone()))
        } else {
            tracing::debug!("Conditional write lost");
            Ok(PutOutcome::Contended(self.get(&record.fingerprint).await?))
        }
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
