//! SQLite-backed image record store.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{Action, ImageFilter, ImageRecord, ImageStatus, ImageStore, ImageStoreError, NewImage};

const SELECT_COLUMNS: &str =
    "SELECT id, original_id, filename, path, action, params, status, created_at FROM images";

/// SQLite-backed image store.
pub struct SqliteImageStore {
    conn: Mutex<Connection>,
}

impl SqliteImageStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, ImageStoreError> {
        let conn = Connection::open(path).map_err(|e| ImageStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite image store (useful for testing).
    pub fn in_memory() -> Result<Self, ImageStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ImageStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ImageStoreError> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| ImageStoreError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY,
                original_id TEXT NULL,
                filename TEXT NOT NULL,
                path TEXT NOT NULL,
                action TEXT NOT NULL,
                params TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_images_original_id ON images(original_id);
            CREATE INDEX IF NOT EXISTS idx_images_status ON images(status);
            CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at);
            "#,
        )
        .map_err(|e| ImageStoreError::Database(e.to_string()))
    }

    fn build_where_clause(filter: &ImageFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if filter.originals_only {
            conditions.push("original_id IS NULL");
        }

        if let Some(before) = filter.created_before {
            conditions.push("created_at < ?");
            params.push(Box::new(format_timestamp(&before)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ImageRecord> {
        let id: String = row.get(0)?;
        let original_id: Option<String> = row.get(1)?;
        let filename: String = row.get(2)?;
        let path: String = row.get(3)?;
        let action_name: String = row.get(4)?;
        let params_json: String = row.get(5)?;
        let status: String = row.get(6)?;
        let created_at: String = row.get(7)?;

        let id = Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?;
        let original_id = original_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| conversion_error(1, e))?;

        let params: Value = serde_json::from_str(&params_json).map_err(|e| conversion_error(5, e))?;
        let action: Action = serde_json::from_value(json!({"name": action_name, "params": params}))
            .map_err(|e| conversion_error(4, e))?;

        let status: ImageStatus = status.parse().map_err(|e: String| conversion_error(6, e))?;

        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(7, e))?;

        Ok(ImageRecord {
            id,
            original_id,
            filename,
            path,
            action,
            status,
            created_at,
        })
    }

    fn select_by_id(conn: &Connection, id: Uuid) -> Result<Option<ImageRecord>, ImageStoreError> {
        conn.query_row(
            &format!("{} WHERE id = ?", SELECT_COLUMNS),
            params![id.to_string()],
            Self::row_to_record,
        )
        .optional()
        .map_err(|e| ImageStoreError::Database(e.to_string()))
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn action_params(action: &Action) -> Result<String, ImageStoreError> {
    let mut value =
        serde_json::to_value(action).map_err(|e| ImageStoreError::Database(e.to_string()))?;
    let params = value
        .get_mut("params")
        .map(Value::take)
        .unwrap_or_else(|| json!({}));
    Ok(params.to_string())
}

impl ImageStore for SqliteImageStore {
    fn insert(&self, image: NewImage) -> Result<ImageRecord, ImageStoreError> {
        let conn = self.conn.lock().unwrap();

        let id = Uuid::new_v4();
        // Stored with microsecond precision, so round before handing it back.
        let created_at = Utc::now().trunc_subsecs(6);
        let params_json = action_params(&image.action)?;

        conn.execute(
            "INSERT INTO images (id, original_id, filename, path, action, params, status, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id.to_string(),
                image.original_id.map(|o| o.to_string()),
                image.filename,
                image.path,
                image.action.name(),
                params_json,
                image.status.as_str(),
                format_timestamp(&created_at),
            ],
        )
        .map_err(|e| ImageStoreError::Database(e.to_string()))?;

        Ok(ImageRecord {
            id,
            original_id: image.original_id,
            filename: image.filename,
            path: image.path,
            action: image.action,
            status: image.status,
            created_at,
        })
    }

    fn get(&self, id: Uuid) -> Result<Option<ImageRecord>, ImageStoreError> {
        let conn = self.conn.lock().unwrap();
        Self::select_by_id(&conn, id)
    }

    fn delete(&self, id: Uuid) -> Result<ImageRecord, ImageStoreError> {
        let conn = self.conn.lock().unwrap();

        let record = Self::select_by_id(&conn, id)?
            .ok_or_else(|| ImageStoreError::NotFound(id.to_string()))?;

        conn.execute("DELETE FROM images WHERE id = ?", params![id.to_string()])
            .map_err(|e| ImageStoreError::Database(e.to_string()))?;

        Ok(record)
    }

    fn update_status(
        &self,
        id: Uuid,
        status: ImageStatus,
    ) -> Result<ImageRecord, ImageStoreError> {
        let conn = self.conn.lock().unwrap();

        let changed = conn
            .execute(
                "UPDATE images SET status = ? WHERE id = ?",
                params![status.as_str(), id.to_string()],
            )
            .map_err(|e| ImageStoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(ImageStoreError::NotFound(id.to_string()));
        }

        Self::select_by_id(&conn, id)?.ok_or_else(|| ImageStoreError::NotFound(id.to_string()))
    }

    fn find_derived(&self, original_id: Uuid) -> Result<Option<ImageRecord>, ImageStoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!(
                "{} WHERE original_id = ? ORDER BY created_at ASC LIMIT 1",
                SELECT_COLUMNS
            ),
            params![original_id.to_string()],
            Self::row_to_record,
        )
        .optional()
        .map_err(|e| ImageStoreError::Database(e.to_string()))
    }

    fn list(&self, filter: &ImageFilter) -> Result<Vec<ImageRecord>, ImageStoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "{} {} ORDER BY created_at ASC, rowid ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ImageStoreError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)
            .map_err(|e| ImageStoreError::Database(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| ImageStoreError::Database(e.to_string()))
    }

    fn count(&self, filter: &ImageFilter) -> Result<i64, ImageStoreError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM images {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| ImageStoreError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{Dimensions, WatermarkParams};

    fn create_test_store() -> SqliteImageStore {
        SqliteImageStore::in_memory().unwrap()
    }

    fn original(filename: &str) -> NewImage {
        NewImage::original(
            filename,
            format!("original/{}", filename),
            Action::Resize(Dimensions::new(200, 100)),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = create_test_store();
        let record = store.insert(original("cat.png")).unwrap();

        assert_eq!(record.status, ImageStatus::Pending);
        assert!(record.original_id.is_none());

        let fetched = store.get(record.id).unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[test]
    fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_insert_assigns_distinct_ids() {
        let store = create_test_store();
        let a = store.insert(original("same.png")).unwrap();
        let b = store.insert(original("same.png")).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_watermark_params_persist() {
        let store = create_test_store();
        let record = store
            .insert(NewImage::original(
                "logo.png",
                "original/logo.png",
                Action::Watermark(WatermarkParams::new("Copyright")),
            ))
            .unwrap();

        let fetched = store.get(record.id).unwrap().unwrap();
        assert_eq!(
            fetched.action,
            Action::Watermark(WatermarkParams::new("Copyright"))
        );
    }

    #[test]
    fn test_delete_returns_record() {
        let store = create_test_store();
        let record = store.insert(original("cat.png")).unwrap();

        let deleted = store.delete(record.id).unwrap();
        assert_eq!(deleted.id, record.id);
        assert!(store.get(record.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_nonexistent() {
        let store = create_test_store();
        let result = store.delete(Uuid::new_v4());
        assert!(matches!(result, Err(ImageStoreError::NotFound(_))));
    }

    #[test]
    fn test_update_status() {
        let store = create_test_store();
        let record = store.insert(original("cat.png")).unwrap();

        let updated = store.update_status(record.id, ImageStatus::Failed).unwrap();
        assert_eq!(updated.status, ImageStatus::Failed);
        assert_eq!(
            store.get(record.id).unwrap().unwrap().status,
            ImageStatus::Failed
        );

        let missing = store.update_status(Uuid::new_v4(), ImageStatus::Failed);
        assert!(matches!(missing, Err(ImageStoreError::NotFound(_))));
    }

    #[test]
    fn test_find_derived() {
        let store = create_test_store();
        let source = store.insert(original("cat.png")).unwrap();
        assert!(store.find_derived(source.id).unwrap().is_none());

        let derived = store
            .insert(NewImage::derived(&source, "resized/cat.png"))
            .unwrap();

        let found = store.find_derived(source.id).unwrap().unwrap();
        assert_eq!(found.id, derived.id);
        assert_eq!(found.original_id, Some(source.id));
        assert_eq!(found.status, ImageStatus::Processed);
    }

    #[test]
    fn test_deleting_original_keeps_derived_link() {
        let store = create_test_store();
        let source = store.insert(original("cat.png")).unwrap();
        let derived = store
            .insert(NewImage::derived(&source, "resized/cat.png"))
            .unwrap();

        store.delete(source.id).unwrap();

        let orphan = store.get(derived.id).unwrap().unwrap();
        assert_eq!(orphan.original_id, Some(source.id));
        assert!(orphan.is_derived());
        assert_eq!(store.find_derived(source.id).unwrap().unwrap().id, derived.id);

        let originals = store.list(&ImageFilter::new().originals_only()).unwrap();
        assert!(originals.is_empty());
    }

    #[test]
    fn test_list_filters() {
        let store = create_test_store();
        let a = store.insert(original("a.png")).unwrap();
        let b = store.insert(original("b.png")).unwrap();
        store.insert(NewImage::derived(&a, "resized/a.png")).unwrap();
        store.update_status(b.id, ImageStatus::Failed).unwrap();

        let all = store.list(&ImageFilter::new()).unwrap();
        assert_eq!(all.len(), 3);

        let originals = store.list(&ImageFilter::new().originals_only()).unwrap();
        assert_eq!(originals.len(), 2);

        let pending = store
            .list(
                &ImageFilter::new()
                    .with_status(ImageStatus::Pending)
                    .originals_only(),
            )
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        assert_eq!(
            store
                .count(&ImageFilter::new().with_status(ImageStatus::Processed))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_list_created_before() {
        let store = create_test_store();
        store.insert(original("a.png")).unwrap();

        let past = Utc::now() - chrono::Duration::hours(1);
        let future = Utc::now() + chrono::Duration::hours(1);

        assert!(store
            .list(&ImageFilter::new().with_created_before(past))
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .list(&ImageFilter::new().with_created_before(future))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_list_pagination() {
        let store = create_test_store();
        for i in 0..5 {
            store.insert(original(&format!("{}.png", i))).unwrap();
        }

        let page = store
            .list(&ImageFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].filename, "4.png");

        assert_eq!(store.count(&ImageFilter::new().with_limit(1)).unwrap(), 5);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("images.db");

        let id = {
            let store = SqliteImageStore::new(&db_path).unwrap();
            store.insert(original("cat.png")).unwrap().id
        };

        assert!(db_path.exists());

        let reopened = SqliteImageStore::new(&db_path).unwrap();
        assert!(reopened.get(id).unwrap().is_some());
    }
}
