use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::models::{AnalysisRecord, AnalysisStatus, NewAnalysis, ReportRecord, ReportType};
use crate::storage::AnalysisStore;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_db()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_db()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_db(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS patent_analyses (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                technical_field TEXT NOT NULL DEFAULT '',
                technical_content TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS analysis_reports (
                id INTEGER PRIMARY KEY,
                analysis_id TEXT NOT NULL,
                report_type TEXT NOT NULL,
                content TEXT NOT NULL,
                score REAL NOT NULL DEFAULT 0,
                metadata_json TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(analysis_id, report_type)
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_user_id ON patent_analyses(user_id);
            CREATE INDEX IF NOT EXISTS idx_reports_analysis_id ON analysis_reports(analysis_id);
            "#,
        )?;

        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for SqliteStore {
    async fn create_analysis(&self, analysis: &NewAnalysis) -> Result<AnalysisRecord> {
        let now = Utc::now();
        self.conn().execute(
            r#"
            INSERT INTO patent_analyses
                (id, user_id, title, description, technical_field, technical_content, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
            params![
                analysis.id,
                analysis.user_id,
                analysis.title,
                analysis.description,
                analysis.technical_field,
                analysis.technical_content,
                AnalysisStatus::Pending.as_str(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(AnalysisRecord {
            id: analysis.id.clone(),
            user_id: analysis.user_id.clone(),
            title: analysis.title.clone(),
            description: analysis.description.clone(),
            technical_field: analysis.technical_field.clone(),
            technical_content: analysis.technical_content.clone(),
            status: AnalysisStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_analysis(&self, analysis_id: &str) -> Result<Option<AnalysisRecord>> {
        let record = self
            .conn()
            .query_row(
                r#"
                SELECT id, user_id, title, description, technical_field, technical_content,
                       status, error_message, created_at, updated_at
                FROM patent_analyses
                WHERE id = ?1
                "#,
                params![analysis_id],
                analysis_from_row,
            )
            .optional()?;

        Ok(record)
    }

    async fn list_analyses(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AnalysisRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, title, description, technical_field, technical_content,
                   status, error_message, created_at, updated_at
            FROM patent_analyses
            WHERE user_id = ?1
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )?;

        let records = stmt.query_map(params![user_id, limit, offset], analysis_from_row)?;
        records
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    async fn upsert_report(
        &self,
        analysis_id: &str,
        report_type: ReportType,
        content: &str,
        score: f64,
        metadata: &Value,
    ) -> Result<()> {
        let metadata_json = serde_json::to_string(metadata)?;
        let now = Utc::now().to_rfc3339();

        self.conn().execute(
            r#"
            INSERT INTO analysis_reports
                (analysis_id, report_type, content, score, metadata_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(analysis_id, report_type) DO UPDATE SET
                content = excluded.content,
                score = excluded.score,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            "#,
            params![
                analysis_id,
                report_type.as_str(),
                content,
                score,
                metadata_json,
                now,
            ],
        )?;

        Ok(())
    }

    async fn update_status(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let updated = self.conn().execute(
            r#"
            UPDATE patent_analyses
            SET status = ?2, error_message = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
            params![
                analysis_id,
                status.as_str(),
                error_message,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(Error::AnalysisNotFound(analysis_id.to_string()));
        }
        Ok(())
    }

    async fn get_reports(&self, analysis_id: &str) -> Result<Vec<ReportRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT analysis_id, report_type, content, score, metadata_json, created_at, updated_at
            FROM analysis_reports
            WHERE analysis_id = ?1
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map(params![analysis_id], |row| {
            Ok((
                row.get::<_, String>(0)?,         // analysis_id
                row.get::<_, String>(1)?,         // report_type
                row.get::<_, String>(2)?,         // content
                row.get::<_, f64>(3)?,            // score
                row.get::<_, Option<String>>(4)?, // metadata_json
                row.get::<_, String>(5)?,         // created_at
                row.get::<_, String>(6)?,         // updated_at
            ))
        })?;

        let mut reports = Vec::new();
        for row in rows {
            let (analysis_id, report_type, content, score, metadata_json, created_at, updated_at) =
                row?;

            let Ok(report_type) = report_type.parse::<ReportType>() else {
                tracing::warn!("Skipping report with unknown type: {}", report_type);
                continue;
            };

            reports.push(ReportRecord {
                analysis_id,
                report_type,
                content,
                score,
                metadata: metadata_json
                    .and_then(|json| serde_json::from_str(&json).ok())
                    .unwrap_or(Value::Null),
                created_at: parse_timestamp(&created_at),
                updated_at: parse_timestamp(&updated_at),
            });
        }

        Ok(reports)
    }
}

fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRecord> {
    let status: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(AnalysisRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        technical_field: row.get(4)?,
        technical_content: row.get(5)?,
        status: status.parse().unwrap_or(AnalysisStatus::Failed),
        error_message: row.get(7)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_analysis(id: &str, user_id: &str) -> NewAnalysis {
        NewAnalysis {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: "Heat pump controller".to_string(),
            description: "Adaptive defrost".to_string(),
            technical_field: "HVAC".to_string(),
            technical_content: "Predicts frost build-up".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_analysis() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_analysis(&new_analysis("a1", "u1")).await.unwrap();

        let record = store.get_analysis("a1").await.unwrap().unwrap();
        assert_eq!(record.title, "Heat pump controller");
        assert_eq!(record.status, AnalysisStatus::Pending);
        assert!(store.get_analysis("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_report_keeps_one_row_per_key() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_analysis(&new_analysis("a1", "u1")).await.unwrap();

        store
            .upsert_report("a1", ReportType::Novelty, "first draft", 0.4, &json!({"v": 1}))
            .await
            .unwrap();
        store
            .upsert_report("a1", ReportType::Novelty, "final", 0.8, &json!({"v": 2}))
            .await
            .unwrap();

        let reports = store.get_reports("a1").await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].content, "final");
        assert_eq!(reports[0].score, 0.8);
        assert_eq!(reports[0].metadata, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_update_status_records_error() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_analysis(&new_analysis("a1", "u1")).await.unwrap();

        store
            .update_status("a1", AnalysisStatus::Failed, Some("search failed"))
            .await
            .unwrap();

        let record = store.get_analysis("a1").await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("search failed"));
    }

    #[tokio::test]
    async fn test_update_status_unknown_analysis() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .update_status("nope", AnalysisStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AnalysisNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_and_progress() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_analysis(&new_analysis("a1", "u1")).await.unwrap();
        store.create_analysis(&new_analysis("a2", "u1")).await.unwrap();
        store.create_analysis(&new_analysis("b1", "u2")).await.unwrap();

        let listed = store.list_analyses("u1", 20, 0).await.unwrap();
        assert_eq!(listed.len(), 2);

        for report_type in [ReportType::Novelty, ReportType::Utility, ReportType::Comprehensive] {
            store
                .upsert_report("a1", report_type, "text", 0.5, &Value::Null)
                .await
                .unwrap();
        }

        let progress = store.get_progress("a1").await.unwrap().unwrap();
        assert_eq!(progress.progress, 40);
        assert!(store.get_progress("zzz").await.unwrap().is_none());
    }
}
