use super::models::ViewRecord;
use super::schema::VIEW_VERSIONED_SCHEMAS;
use super::ViewStore;
use crate::sqlite_persistence::VersionedSchema;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct SqliteViewStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteViewStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open views database")?;
        let latest_schema = VIEW_VERSIONED_SCHEMAS
            .last()
            .context("No views database schema defined")?;

        if is_new_db {
            info!("Creating new views database at {:?}", path);
            latest_schema.create(&conn)?;
        } else {
            let db_version = VersionedSchema::stored_version(&conn)?;
            if db_version != latest_schema.version as i64 {
                anyhow::bail!(
                    "Views database version {} is not supported (expected {})",
                    db_version,
                    latest_schema.version
                );
            }
            latest_schema.validate(&conn).with_context(|| {
                format!(
                    "Views database schema validation failed for version {}",
                    db_version
                )
            })?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Views database connection mutex poisoned"))
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn row_to_view_record(row: &rusqlite::Row) -> rusqlite::Result<ViewRecord> {
        let viewed_at_str: String = row.get("viewed_at")?;
        Ok(ViewRecord {
            user_id: row.get("user_id")?,
            post_id: row.get("post_id")?,
            viewed_at: DateTime::parse_from_rfc3339(&viewed_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        })
    }
}

impl ViewStore for SqliteViewStore {
    fn bulk_insert_ignore_duplicates(&self, records: &[ViewRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO post_views (user_id, post_id, viewed_at) VALUES (?1, ?2, ?3)",
            )?;
            for record in records {
                inserted += stmt.execute(params![
                    record.user_id,
                    record.post_id,
                    Self::format_datetime(&record.viewed_at),
                ])?;
            }
        }
        tx.commit().context("Failed to commit view records")?;
        Ok(inserted)
    }

    fn has_view(&self, user_id: i64, post_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM post_views WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    fn get_view(&self, user_id: i64, post_id: i64) -> Result<Option<ViewRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT user_id, post_id, viewed_at FROM post_views WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
                Self::row_to_view_record,
            )
            .optional()?;
        Ok(record)
    }

    fn get_viewed_post_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT post_id FROM post_views WHERE user_id = ?1 ORDER BY post_id")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    fn count_views(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM post_views", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
