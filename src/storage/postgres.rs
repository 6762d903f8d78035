//! PostgreSQL storage backend

use super::{StorageBackend, StorageGateway};
use crate::error::StorageError;
use crate::types::{AnalysisResult, AnalysisSummary, AnalysisTotals, StatusCheck, UserSettings};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tracing::info;

/// Durable store backed by a connection pool
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Connect, probe with `SELECT 1` under `probe_timeout`, then apply migrations
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        probe_timeout: Duration,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(probe_timeout)
            .connect_lazy(database_url)?;

        tokio::time::timeout(probe_timeout, sqlx::query("SELECT 1").execute(&pool))
            .await
            .map_err(|_| {
                StorageError::Unavailable(format!(
                    "probe timed out after {} ms",
                    probe_timeout.as_millis()
                ))
            })??;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Apply the migrations in `migrations/`
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl StorageGateway for PostgresStore {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Postgres
    }

    async fn insert_analysis(&self, result: &AnalysisResult) -> Result<(), StorageError> {
        let profile = &result.analysis;
        sqlx::query(
            r#"
            INSERT INTO text_analyses (
                text, regret_score, should_warn, threshold, processing_time,
                toxicity, severe_toxicity, obscene, threat, insult, identity_attack,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&result.text)
        .bind(result.regret_score)
        .bind(result.should_warn)
        .bind(result.threshold)
        .bind(result.processing_time.as_secs_f64())
        .bind(profile.toxicity)
        .bind(profile.severe_toxicity)
        .bind(profile.obscene)
        .bind(profile.threat)
        .bind(profile.insult)
        .bind(profile.identity_attack)
        .bind(result.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn analysis_totals(&self) -> Result<AnalysisTotals, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE should_warn) AS warned,
                   COALESCE(SUM(processing_time), 0) AS processing_time_sum
            FROM text_analyses
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AnalysisTotals {
            total: row.try_get::<i64, _>("total")? as u64,
            warned: row.try_get::<i64, _>("warned")? as u64,
            processing_time_sum: row.try_get::<f64, _>("processing_time_sum")?,
        })
    }

    async fn recent_analyses(&self, limit: usize) -> Result<Vec<AnalysisSummary>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT text, regret_score, should_warn, created_at
            FROM text_analyses
            ORDER BY created_at DESC, seq DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<AnalysisSummary, StorageError> {
                Ok(AnalysisSummary {
                    text: r.try_get("text")?,
                    regret_score: r.try_get("regret_score")?,
                    should_warn: r.try_get("should_warn")?,
                    timestamp: r.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect()
    }

    async fn upsert_settings(&self, settings: &UserSettings) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, id, threshold, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET id = EXCLUDED.id,
                threshold = EXCLUDED.threshold,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&settings.user_id)
        .bind(&settings.id)
        .bind(settings.threshold)
        .bind(settings.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_settings(&self, user_id: &str) -> Result<Option<UserSettings>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, threshold, updated_at
            FROM user_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(UserSettings {
                id: r.try_get("id")?,
                user_id: r.try_get("user_id")?,
                threshold: r.try_get("threshold")?,
                timestamp: r.try_get::<DateTime<Utc>, _>("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn insert_status_check(&self, check: &StatusCheck) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO status_checks (id, client_name, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&check.id)
        .bind(&check.client_name)
        .bind(check.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_status_checks(&self) -> Result<Vec<StatusCheck>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id, client_name, created_at
            FROM status_checks
            ORDER BY seq
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<StatusCheck, StorageError> {
                Ok(StatusCheck {
                    id: r.try_get("id")?,
                    client_name: r.try_get("client_name")?,
                    timestamp: r.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect()
    }
}

/// Run against a real server when `TEST_DATABASE_URL` is set; each test gets
/// its own schema so they can run in parallel.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisRequest, ToxicityProfile};
    use chrono::Duration as ChronoDuration;
    use sqlx::{Connection, Executor, PgConnection};

    struct TestDb {
        store: PostgresStore,
        schema: String,
    }

    impl TestDb {
        async fn teardown(self) {
            let sql = format!("DROP SCHEMA {} CASCADE", self.schema);
            sqlx::query(&sql).execute(self.store.pool()).await.ok();
        }
    }

    async fn fresh_db() -> Option<TestDb> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        };

        let schema = format!("regret_test_{}", uuid::Uuid::new_v4().simple());
        let mut conn = PgConnection::connect(&url).await.unwrap();
        conn.execute(format!("CREATE SCHEMA {schema}").as_str())
            .await
            .unwrap();
        conn.close().await.ok();

        let search_path = format!("SET search_path TO {schema}");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .after_connect(move |conn, _meta| {
                let sql = search_path.clone();
                Box::pin(async move {
                    conn.execute(sql.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .unwrap();

        let store = PostgresStore::from_pool(pool);
        store.migrate().await.unwrap();
        Some(TestDb { store, schema })
    }

    fn analysis(text: &str, score: f64, secs: f64) -> AnalysisResult {
        let request = AnalysisRequest::new(text, 0.5).unwrap();
        AnalysisResult::new(
            &request,
            score,
            ToxicityProfile::neutral(),
            Duration::from_secs_f64(secs),
        )
    }

    #[tokio::test]
    async fn test_empty_tables() {
        let Some(db) = fresh_db().await else { return };
        let store = &db.store;

        assert_eq!(store.analysis_totals().await.unwrap(), AnalysisTotals::default());
        assert!(store.recent_analyses(10).await.unwrap().is_empty());
        assert!(store.list_status_checks().await.unwrap().is_empty());
        assert!(store.find_settings("u").await.unwrap().is_none());

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_totals() {
        let Some(db) = fresh_db().await else { return };
        let store = &db.store;
        store.insert_analysis(&analysis("a", 0.9, 0.5)).await.unwrap();
        store.insert_analysis(&analysis("b", 0.1, 1.5)).await.unwrap();

        let totals = store.analysis_totals().await.unwrap();
        assert_eq!(totals.total, 2);
        assert_eq!(totals.warned, 1);
        assert!((totals.processing_time_sum - 2.0).abs() < 1e-9);

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_recent_newest_first_with_insertion_tiebreak() {
        let Some(db) = fresh_db().await else { return };
        let store = &db.store;
        let base = crate::types::analysis::now_micros();

        for i in 0..12 {
            let mut result = analysis(&format!("text {i}"), 0.2, 0.1);
            result.timestamp = base + ChronoDuration::seconds(i);
            store.insert_analysis(&result).await.unwrap();
        }
        let mut tie = analysis("tie", 0.2, 0.1);
        tie.timestamp = base + ChronoDuration::seconds(11);
        store.insert_analysis(&tie).await.unwrap();

        let recent = store.recent_analyses(10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].text, "tie");
        assert_eq!(recent[1].text, "text 11");
        assert_eq!(recent[9].text, "text 3");
        // Stored timestamps come back unchanged
        assert_eq!(recent[0].timestamp, tie.timestamp);

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_same_results_as_memory_store() {
        let Some(db) = fresh_db().await else { return };
        let memory = crate::storage::MemoryStore::new();

        for (i, score) in [0.9, 0.1, 0.6, 0.3].into_iter().enumerate() {
            let result = analysis(&format!("message {i}"), score, 0.25);
            db.store.insert_analysis(&result).await.unwrap();
            memory.insert_analysis(&result).await.unwrap();
        }

        assert_eq!(
            db.store.recent_analyses(10).await.unwrap(),
            memory.recent_analyses(10).await.unwrap()
        );
        assert_eq!(
            db.store.analysis_totals().await.unwrap(),
            memory.analysis_totals().await.unwrap()
        );

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_settings_upsert_replaces() {
        let Some(db) = fresh_db().await else { return };
        let store = &db.store;
        store.upsert_settings(&UserSettings::new("u1", 0.3)).await.unwrap();
        let latest = UserSettings::new("u1", 0.75);
        store.upsert_settings(&latest).await.unwrap();

        assert_eq!(store.find_settings("u1").await.unwrap(), Some(latest));
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_settings")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        db.teardown().await;
    }

    #[tokio::test]
    async fn test_status_checks_append_in_order() {
        let Some(db) = fresh_db().await else { return };
        let store = &db.store;
        let first = StatusCheck::new("monitor");
        let second = StatusCheck::new("monitor");
        store.insert_status_check(&first).await.unwrap();
        store.insert_status_check(&second).await.unwrap();

        assert_eq!(store.list_status_checks().await.unwrap(), vec![first, second]);

        db.teardown().await;
    }
}
