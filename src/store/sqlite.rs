use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{KindFilter, Property, Record, RecordId, RecordKind, RecordStore, Value};

/// Name of the root record every vendor hangs off
const ROOT_NAME: &str = "marketplace";

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: lookup of records by kind (descendant queries during cleanup)
    &["CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind)"],
];

pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn new(db_path: &Path) -> Result<Self, StoreError> {
        info!("Initializing record store at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn)
    }

    /// Store that lives only as long as the returned value
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        // Child records and properties are removed through ON DELETE CASCADE
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
        };

        store.create_schema()?;
        debug!("Record store ready");

        Ok(store)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        debug!("Creating record store schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES records(id) ON DELETE CASCADE,
                UNIQUE(parent_id, name)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_parent_id ON records(parent_id)",
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS properties (
                record_id INTEGER NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE,
                PRIMARY KEY (record_id, key)
            )
            "#,
            [],
        )?;

        Self::apply_migrations(&conn)?;

        // The root has no parent, so UNIQUE(parent_id, name) does not guard it
        let root_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE parent_id IS NULL AND name = ?1)",
            [ROOT_NAME],
            |row| row.get(0),
        )?;
        if !root_exists {
            conn.execute(
                "INSERT INTO records (parent_id, name, kind) VALUES (NULL, ?1, ?2)",
                (ROOT_NAME, RecordKind::Storage.as_str()),
            )?;
            debug!("Created storage root");
        }

        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), StoreError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let id: i64 = row.get(0)?;
        let name: String = row.get(1)?;
        let kind: String = row.get(2)?;
        let kind = kind.parse::<RecordKind>().map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown record kind {kind}").into(),
            )
        })?;
        Ok(Record {
            id: RecordId(id),
            name,
            kind,
        })
    }

    fn kinds_placeholder(filter: KindFilter, offset: usize) -> String {
        (0..filter.kinds().len())
            .map(|i| format!("?{}", i + offset))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        anchor: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let mut stmt = conn.prepare(sql)?;

        // Build params: anchor id followed by all kind names
        let kinds: Vec<&str> = filter.kinds().iter().map(|k| k.as_str()).collect();
        let params: Vec<&dyn rusqlite::ToSql> = std::iter::once(&anchor.0 as &dyn rusqlite::ToSql)
            .chain(kinds.iter().map(|k| k as &dyn rusqlite::ToSql))
            .collect();

        let records = stmt
            .query_map(params.as_slice(), Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn ensure_exists(conn: &Connection, record: RecordId) -> Result<(), StoreError> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1)",
            [record.0],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::RecordNotFound(record))
        }
    }
}

impl RecordStore for SqliteRecordStore {
    fn root(&self) -> Result<Record, StoreError> {
        let conn = self.lock_conn()?;
        let record = conn.query_row(
            "SELECT id, name, kind FROM records WHERE parent_id IS NULL AND name = ?1",
            [ROOT_NAME],
            Self::row_to_record,
        )?;
        Ok(record)
    }

    fn find_child(&self, parent: RecordId, name: &str) -> Result<Option<Record>, StoreError> {
        let conn = self.lock_conn()?;
        let record = conn
            .query_row(
                "SELECT id, name, kind FROM records WHERE parent_id = ?1 AND name = ?2",
                (parent.0, name),
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn create_child(
        &self,
        parent: RecordId,
        name: &str,
        kind: RecordKind,
    ) -> Result<Record, StoreError> {
        let conn = self.lock_conn()?;
        Self::ensure_exists(&conn, parent)?;

        conn.execute(
            "INSERT INTO records (parent_id, name, kind) VALUES (?1, ?2, ?3)",
            (parent.0, name, kind.as_str()),
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created {} record {} under {}", kind.as_str(), name, parent);

        Ok(Record {
            id: RecordId(id),
            name: name.to_string(),
            kind,
        })
    }

    fn get_property(&self, record: RecordId, key: Property) -> Result<Option<Value>, StoreError> {
        let conn = self.lock_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM properties WHERE record_id = ?1 AND key = ?2",
                (record.0, key.as_str()),
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| serde_json::from_str(&raw).map_err(StoreError::from))
            .transpose()
    }

    fn set_property(
        &self,
        record: RecordId,
        key: Property,
        value: Value,
    ) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        Self::ensure_exists(&conn, record)?;

        if value == Value::Null {
            conn.execute(
                "DELETE FROM properties WHERE record_id = ?1 AND key = ?2",
                (record.0, key.as_str()),
            )?;
            return Ok(());
        }

        let encoded = serde_json::to_string(&value)?;
        conn.execute(
            r#"
            INSERT INTO properties (record_id, key, value)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(record_id, key) DO UPDATE SET value = excluded.value
            "#,
            (record.0, key.as_str(), encoded),
        )?;
        Ok(())
    }

    fn list_children(
        &self,
        parent: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT id, name, kind FROM records WHERE parent_id = ?1 AND kind IN ({}) ORDER BY id",
            Self::kinds_placeholder(filter, 2)
        );
        Self::query_records(&conn, &sql, parent, filter)
    }

    fn find_descendants(
        &self,
        ancestor: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError> {
        let conn = self.lock_conn()?;
        let sql = format!(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM records WHERE parent_id = ?1
                UNION ALL
                SELECT r.id FROM records r JOIN subtree s ON r.parent_id = s.id
            )
            SELECT r.id, r.name, r.kind FROM records r
            JOIN subtree s ON r.id = s.id
            WHERE r.kind IN ({})
            ORDER BY r.id
            "#,
            Self::kinds_placeholder(filter, 2)
        );
        Self::query_records(&conn, &sql, ancestor, filter)
    }

    fn remove(&self, record: RecordId) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        let removed = conn.execute("DELETE FROM records WHERE id = ?1", [record.0])?;
        if removed == 0 {
            return Err(StoreError::RecordNotFound(record));
        }
        debug!("Removed record {}", record);
        Ok(())
    }

    fn change_kind(&self, record: RecordId, kind: RecordKind) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        let updated = conn.execute(
            "UPDATE records SET kind = ?1 WHERE id = ?2",
            (kind.as_str(), record.0),
        )?;
        if updated == 0 {
            return Err(StoreError::RecordNotFound(record));
        }
        Ok(())
    }
}
