//! SQLite database for work packages and their custom values

use crate::types::{
    CustomFieldDefinition, CustomFieldId, CustomOption, CustomOptionId, FieldFormat, FieldValue,
    WorkPackage, WorkPackageId, WorkPackageSummary,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Database wrapper for state persistence
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        info!("Opened database at {:?}", path.as_ref());
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Custom field definitions
            CREATE TABLE IF NOT EXISTS custom_fields (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                field_format TEXT NOT NULL,
                is_required INTEGER NOT NULL DEFAULT 0,
                min_length INTEGER,
                max_length INTEGER,
                created_at INTEGER NOT NULL
            );

            -- Possible values of list custom fields
            CREATE TABLE IF NOT EXISTS custom_options (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                custom_field_id INTEGER NOT NULL,
                value TEXT NOT NULL,
                position INTEGER NOT NULL,
                FOREIGN KEY(custom_field_id) REFERENCES custom_fields(id)
            );
            CREATE INDEX IF NOT EXISTS idx_custom_options_field ON custom_options(custom_field_id);

            -- Work packages
            CREATE TABLE IF NOT EXISTS work_packages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                lock_version INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            -- Custom values, canonical text form
            CREATE TABLE IF NOT EXISTS custom_values (
                work_package_id INTEGER NOT NULL,
                custom_field_id INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (work_package_id, custom_field_id),
                FOREIGN KEY(work_package_id) REFERENCES work_packages(id),
                FOREIGN KEY(custom_field_id) REFERENCES custom_fields(id)
            );
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    // ========================================================================
    // Custom fields
    // ========================================================================

    /// Insert a custom field with its options; ids in `def` are ignored and
    /// assigned by the database.
    pub fn insert_custom_field(&self, def: &CustomFieldDefinition) -> Result<CustomFieldDefinition> {
        let mut conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO custom_fields (name, field_format, is_required, min_length, max_length, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                def.name,
                def.format.as_str(),
                def.is_required,
                def.min_length,
                def.max_length,
                now,
            ],
        )?;
        let field_id = CustomFieldId(tx.last_insert_rowid() as u64);

        let mut possible_values = Vec::with_capacity(def.possible_values.len());
        for (index, option) in def.possible_values.iter().enumerate() {
            let position = index as u32 + 1;
            tx.execute(
                "INSERT INTO custom_options (custom_field_id, value, position) VALUES (?1, ?2, ?3)",
                params![field_id.0, option.value, position],
            )?;
            possible_values.push(CustomOption {
                id: CustomOptionId(tx.last_insert_rowid() as u64),
                custom_field_id: field_id,
                value: option.value.clone(),
                position,
            });
        }
        tx.commit()?;

        debug!("Inserted custom field {} ({}) with id {}", def.name, def.format, field_id);
        Ok(CustomFieldDefinition {
            id: field_id,
            possible_values,
            ..def.clone()
        })
    }

    /// Get a custom field by ID
    pub fn get_custom_field(&self, id: CustomFieldId) -> Result<Option<CustomFieldDefinition>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, name, field_format, is_required, min_length, max_length
                 FROM custom_fields WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(RawField {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        format: row.get(2)?,
                        is_required: row.get(3)?,
                        min_length: row.get(4)?,
                        max_length: row.get(5)?,
                    })
                },
            )
            .optional()?;

        match row {
            Some(raw) => {
                let options = load_options(&conn, id)?;
                Ok(Some(raw.parse(options)?))
            }
            None => Ok(None),
        }
    }

    /// List all custom fields
    pub fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, field_format, is_required, min_length, max_length
             FROM custom_fields ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawField {
                id: row.get(0)?,
                name: row.get(1)?,
                format: row.get(2)?,
                is_required: row.get(3)?,
                min_length: row.get(4)?,
                max_length: row.get(5)?,
            })
        })?;

        let mut raws = Vec::new();
        for row in rows {
            raws.push(row?);
        }

        let mut results = Vec::with_capacity(raws.len());
        for raw in raws {
            let options = load_options(&conn, CustomFieldId(raw.id as u64))?;
            results.push(raw.parse(options)?);
        }
        Ok(results)
    }

    /// Get a custom option by ID
    pub fn get_custom_option(&self, id: CustomOptionId) -> Result<Option<CustomOption>> {
        let conn = self.conn.lock();
        let option = conn
            .query_row(
                "SELECT id, custom_field_id, value, position FROM custom_options WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(CustomOption {
                        id: CustomOptionId(row.get::<_, i64>(0)? as u64),
                        custom_field_id: CustomFieldId(row.get::<_, i64>(1)? as u64),
                        value: row.get(2)?,
                        position: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(option)
    }

    // ========================================================================
    // Work packages
    // ========================================================================

    /// Create an empty work package
    pub fn create_work_package(&self, subject: &str) -> Result<WorkPackageId> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO work_packages (subject, lock_version, created_at, updated_at)
             VALUES (?1, 0, ?2, ?3)",
            params![subject, now, now],
        )?;
        let id = WorkPackageId(conn.last_insert_rowid() as u64);
        debug!("Created work package {} with id {}", subject, id);
        Ok(id)
    }

    /// Get a work package with all its custom values
    pub fn get_work_package(&self, id: WorkPackageId) -> Result<Option<WorkPackage>> {
        let conn = self.conn.lock();
        let header = conn
            .query_row(
                "SELECT subject, lock_version, created_at, updated_at FROM work_packages WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((subject, lock_version, created_at, updated_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT cv.custom_field_id, cf.field_format, cv.value
             FROM custom_values cv JOIN custom_fields cf ON cf.id = cv.custom_field_id
             WHERE cv.work_package_id = ?1",
        )?;
        let rows = stmt.query_map(params![id.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut custom_values = BTreeMap::new();
        for row in rows {
            let (field_id, format, raw) = row?;
            let format: FieldFormat = format.parse()?;
            let value = FieldValue::from_canonical(format, &raw)?;
            if !value.is_unset() {
                custom_values.insert(CustomFieldId(field_id as u64), value);
            }
        }

        Ok(Some(WorkPackage {
            id,
            subject,
            lock_version,
            custom_values,
            created_at,
            updated_at,
        }))
    }

    /// Store a custom value; an unset value removes it. Bumps the work
    /// package's lock version and returns the new one.
    pub fn set_custom_value(
        &self,
        work_package_id: WorkPackageId,
        custom_field_id: CustomFieldId,
        value: &FieldValue,
    ) -> Result<i64> {
        self.set_custom_values(work_package_id, &[(custom_field_id, value.clone())])
    }

    /// Store several custom values in one transaction with a single lock
    /// version bump. Either every value is written or none is.
    pub fn set_custom_values(
        &self,
        work_package_id: WorkPackageId,
        values: &[(CustomFieldId, FieldValue)],
    ) -> Result<i64> {
        let mut conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE work_packages SET lock_version = lock_version + 1, updated_at = ?1 WHERE id = ?2",
            params![now, work_package_id.0],
        )?;
        if rows == 0 {
            return Err(Error::not_found("work_package", work_package_id));
        }

        for (custom_field_id, value) in values {
            if value.is_unset() {
                tx.execute(
                    "DELETE FROM custom_values WHERE work_package_id = ?1 AND custom_field_id = ?2",
                    params![work_package_id.0, custom_field_id.0],
                )?;
            } else {
                tx.execute(
                    "INSERT INTO custom_values (work_package_id, custom_field_id, value) VALUES (?1, ?2, ?3)
                     ON CONFLICT(work_package_id, custom_field_id) DO UPDATE SET value = excluded.value",
                    params![work_package_id.0, custom_field_id.0, value.canonical_string()],
                )?;
            }
        }

        let lock_version: i64 = tx.query_row(
            "SELECT lock_version FROM work_packages WHERE id = ?1",
            params![work_package_id.0],
            |row| row.get(0),
        )?;
        tx.commit()?;

        debug!(
            "Set {} custom value(s) on work package {} (lock version {})",
            values.len(),
            work_package_id,
            lock_version
        );
        Ok(lock_version)
    }

    /// Work packages whose id starts with `term` or whose subject contains
    /// it, lowest id first
    pub fn search_work_packages(&self, term: &str, limit: usize) -> Result<Vec<WorkPackageSummary>> {
        let conn = self.conn.lock();
        let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let mut stmt = conn.prepare(
            "SELECT id, subject FROM work_packages
             WHERE CAST(id AS TEXT) LIKE ?1 ESCAPE '\\' OR subject LIKE ?2 ESCAPE '\\'
             ORDER BY id LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![format!("{}%", escaped), format!("%{}%", escaped), limit as i64],
            |row| {
                Ok(WorkPackageSummary {
                    id: WorkPackageId(row.get::<_, i64>(0)? as u64),
                    subject: row.get(1)?,
                })
            },
        )?;

        let mut found = Vec::new();
        for row in rows {
            found.push(row?);
        }
        Ok(found)
    }

    /// Subject of a work package, if it exists
    pub fn work_package_subject(&self, id: WorkPackageId) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let subject = conn
            .query_row(
                "SELECT subject FROM work_packages WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(subject)
    }
}

fn load_options(conn: &Connection, field_id: CustomFieldId) -> Result<Vec<CustomOption>> {
    let mut stmt = conn.prepare(
        "SELECT id, value, position FROM custom_options WHERE custom_field_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![field_id.0], |row| {
        Ok(CustomOption {
            id: CustomOptionId(row.get::<_, i64>(0)? as u64),
            custom_field_id: field_id,
            value: row.get(1)?,
            position: row.get(2)?,
        })
    })?;

    let mut options = Vec::new();
    for row in rows {
        options.push(row?);
    }
    Ok(options)
}

/// Raw row from the custom_fields table
struct RawField {
    id: i64,
    name: String,
    format: String,
    is_required: bool,
    min_length: Option<u32>,
    max_length: Option<u32>,
}

impl RawField {
    fn parse(self, possible_values: Vec<CustomOption>) -> Result<CustomFieldDefinition> {
        Ok(CustomFieldDefinition {
            id: CustomFieldId(self.id as u64),
            name: self.name,
            format: self.format.parse()?,
            is_required: self.is_required,
            min_length: self.min_length,
            max_length: self.max_length,
            possible_values,
        })
    }
}
