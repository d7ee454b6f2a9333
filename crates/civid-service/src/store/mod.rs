//! `SQLite` storage gateway for the identity service.
//!
//! The [`Store`] wraps a single long-lived `SQLite` connection and
//! executes parameterized operations against the three logical tables:
//! `identity_registry`, `health_records`, and `access_credentials`. All
//! values are passed as bound arguments; no value is ever concatenated
//! into query text.
//!
//! # Retry policy
//!
//! On a detected transient failure (`SQLITE_BUSY` / `SQLITE_LOCKED`) the
//! gateway reconnects and retries exactly once before propagating the
//! failure. This is the only retry policy in the system and applies
//! uniformly to reads and writes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension};
use thiserror::Error;
use tracing::warn;

use civid_core::domain::{
    AttributeValue, HealthAttribute, HealthPatch, HealthRecord, Identity, PersonId,
};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Errors from the storage gateway.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Transient connectivity failure that persisted through the single
    /// reconnect-and-retry.
    #[error("storage connectivity failure after retry: {details}")]
    ConnectivityExhausted {
        /// Description of the failure that survived the retry.
        details: String,
    },

    /// A stored row failed to decode into its domain type.
    #[error("invalid stored row: {details}")]
    InvalidRow {
        /// Description of the malformed column.
        details: String,
    },
}

/// Storage handle over the three logical tables.
///
/// The connection is a shared, long-lived resource held behind the handle;
/// lifecycle (open, reconnect-on-failure) is an explicit contract on this
/// type rather than ambient module state.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Opens or creates the database at `path` and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Self::connect(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    fn connect(path: &Path) -> Result<Connection, StorageError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(conn)
    }

    /// Runs `op` against the connection, reconnecting and retrying exactly
    /// once on a transient failure.
    fn with_conn<T>(
        &self,
        op: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StorageError> {
        let mut guard = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match op(&guard) {
            Ok(value) => Ok(value),
            Err(err) if is_transient(&err) => {
                warn!(error = %err, "transient storage failure, reconnecting once");
                if let Some(path) = &self.path {
                    *guard = Self::connect(path)?;
                }
                op(&guard).map_err(|retry_err| StorageError::ConnectivityExhausted {
                    details: retry_err.to_string(),
                })
            },
            Err(err) => Err(StorageError::Database(err)),
        }
    }

    // ---- identity_registry ----

    /// Point existence check against the identity table.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn identity_exists(&self, id: PersonId) -> Result<bool, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM identity_registry WHERE id = ?1",
                params![id.value()],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|count| count > 0)
    }

    /// Inserts a row into the identity registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails (including a primary-key
    /// collision, the storage-level backstop for duplicate identifiers).
    pub fn insert_identity(&self, identity: &Identity) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO identity_registry (id, name) VALUES (?1, ?2)",
                params![identity.id.value(), identity.name],
            )
        })?;
        Ok(())
    }

    // ---- health_records ----

    /// Point existence check against the health table.
    ///
    /// This is the canonical dedup predicate: a row with this id either
    /// exists or it does not.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn health_record_exists(&self, id: PersonId) -> Result<bool, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM health_records WHERE id = ?1",
                params![id.value()],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|count| count > 0)
    }

    /// Inserts a health record row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn insert_health_record(&self, record: &HealthRecord) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO health_records \
                 (id, registered_doctor, has_asthma, has_registered_disability, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id.value(),
                    record.registered_doctor,
                    record.has_asthma,
                    record.has_registered_disability,
                    record.updated_at.to_rfc3339(),
                ],
            )
        })?;
        Ok(())
    }

    /// Writes the non-`None` fields of `patch` to the row for `id` and
    /// refreshes `updated_at`.
    ///
    /// The `SET` clause is assembled from fixed column fragments; the
    /// values themselves are always bound arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn update_health_record(
        &self,
        id: PersonId,
        patch: &HealthPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(doctor) = &patch.registered_doctor {
            columns.push("registered_doctor");
            values.push(Value::Text(doctor.clone()));
        }
        if let Some(has_asthma) = patch.has_asthma {
            columns.push("has_asthma");
            values.push(Value::Integer(i64::from(has_asthma)));
        }
        if let Some(has_disability) = patch.has_registered_disability {
            columns.push("has_registered_disability");
            values.push(Value::Integer(i64::from(has_disability)));
        }
        columns.push("updated_at");
        values.push(Value::Text(updated_at.to_rfc3339()));

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE health_records SET {} WHERE id = ?{}",
            assignments.join(", "),
            columns.len() + 1,
        );
        values.push(Value::Integer(i64::from(id.value())));

        self.with_conn(|conn| conn.execute(&sql, params_from_iter(values.iter())))?;
        Ok(())
    }

    /// Single-column point projection of one attribute for `id`.
    ///
    /// Returns `None` if no health record exists for the identifier. The
    /// projected column comes from the closed [`HealthAttribute`] enum,
    /// never from caller-supplied text.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn fetch_attribute(
        &self,
        id: PersonId,
        attribute: HealthAttribute,
    ) -> Result<Option<AttributeValue>, StorageError> {
        let sql = format!(
            "SELECT {} FROM health_records WHERE id = ?1",
            attribute.column_name(),
        );
        self.with_conn(|conn| {
            conn.query_row(&sql, params![id.value()], |row| match attribute {
                HealthAttribute::RegisteredDoctor => {
                    row.get::<_, String>(0).map(AttributeValue::Text)
                },
                HealthAttribute::HasAsthma | HealthAttribute::HasRegisteredDisability => {
                    row.get::<_, bool>(0).map(AttributeValue::Flag)
                },
            })
            .optional()
        })
    }

    /// Fetches the full health record for `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored row is malformed.
    pub fn fetch_health_record(
        &self,
        id: PersonId,
    ) -> Result<Option<HealthRecord>, StorageError> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT registered_doctor, has_asthma, has_registered_disability, updated_at \
                 FROM health_records WHERE id = ?1",
                params![id.value()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
        })?;

        let Some((registered_doctor, has_asthma, has_registered_disability, updated_at)) = row
        else {
            return Ok(None);
        };

        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| StorageError::InvalidRow {
                details: format!("updated_at for id {id}: {e}"),
            })?
            .with_timezone(&Utc);

        Ok(Some(HealthRecord {
            id,
            registered_doctor,
            has_asthma,
            has_registered_disability,
            updated_at,
        }))
    }

    // ---- access_credentials ----

    /// Fetches the stored password for `name`, or `None` if the name is
    /// not provisioned.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn fetch_credential_password(&self, name: &str) -> Result<Option<String>, StorageError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT password FROM access_credentials WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
    }

    /// Provisions (or re-provisions) a department credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_credential(&self, name: &str, password: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO access_credentials (name, password) VALUES (?1, ?2) \
                 ON CONFLICT(name) DO UPDATE SET password = excluded.password",
                params![name, password],
            )
        })?;
        Ok(())
    }
}

/// `SQLITE_BUSY` and `SQLITE_LOCKED` are the transient classes the single
/// reconnect-and-retry applies to.
fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn temp_store() -> (Store, TempDir) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let store = Store::open(dir.path().join("test.db")).expect("failed to open store");
        (store, dir)
    }

    #[test]
    fn test_open_creates_schema() {
        let (store, _dir) = temp_store();
        assert!(!store.identity_exists(PersonId::new(1)).expect("exists"));
    }

    #[test]
    fn test_identity_insert_and_exists() {
        let store = Store::in_memory().expect("in-memory store");
        let identity = Identity::new(PersonId::new(7459), "david");

        assert!(!store.identity_exists(identity.id).expect("exists"));
        store.insert_identity(&identity).expect("insert");
        assert!(store.identity_exists(identity.id).expect("exists"));
    }

    #[test]
    fn test_duplicate_identity_insert_fails_at_storage() {
        let store = Store::in_memory().expect("in-memory store");
        let identity = Identity::new(PersonId::new(1), "david");

        store.insert_identity(&identity).expect("first insert");
        let err = store.insert_identity(&identity).unwrap_err();
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[test]
    fn test_health_record_roundtrip() {
        let store = Store::in_memory().expect("in-memory store");
        store
            .insert_identity(&Identity::new(PersonId::new(2), "ada"))
            .expect("identity");

        let record = HealthRecord::new(PersonId::new(2), "doctor1", false, true);
        store.insert_health_record(&record).expect("insert");

        let fetched = store
            .fetch_health_record(PersonId::new(2))
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.registered_doctor, "doctor1");
        assert!(!fetched.has_asthma);
        assert!(fetched.has_registered_disability);
    }

    #[test]
    fn test_update_touches_only_patched_columns() {
        let store = Store::in_memory().expect("in-memory store");
        store
            .insert_identity(&Identity::new(PersonId::new(3), "bo"))
            .expect("identity");
        store
            .insert_health_record(&HealthRecord::new(PersonId::new(3), "doctor1", true, false))
            .expect("insert");

        let patch = HealthPatch {
            registered_doctor: Some("doctor243".to_string()),
            has_asthma: None,
            has_registered_disability: Some(true),
        };
        store
            .update_health_record(PersonId::new(3), &patch, Utc::now())
            .expect("update");

        let record = store
            .fetch_health_record(PersonId::new(3))
            .expect("fetch")
            .expect("present");
        assert_eq!(record.registered_doctor, "doctor243");
        assert!(record.has_asthma, "unpatched column must keep its value");
        assert!(record.has_registered_disability);
    }

    #[test]
    fn test_update_refreshes_updated_at() {
        let store = Store::in_memory().expect("in-memory store");
        store
            .insert_identity(&Identity::new(PersonId::new(4), "cy"))
            .expect("identity");
        let record = HealthRecord::new(PersonId::new(4), "doctor1", false, false);
        store.insert_health_record(&record).expect("insert");

        let later = record.updated_at + chrono::Duration::seconds(90);
        let patch = HealthPatch {
            has_asthma: Some(true),
            ..HealthPatch::default()
        };
        store
            .update_health_record(PersonId::new(4), &patch, later)
            .expect("update");

        let fetched = store
            .fetch_health_record(PersonId::new(4))
            .expect("fetch")
            .expect("present");
        assert_eq!(fetched.updated_at, later);
    }

    #[test]
    fn test_fetch_attribute_projects_one_column() {
        let store = Store::in_memory().expect("in-memory store");
        store
            .insert_identity(&Identity::new(PersonId::new(5), "di"))
            .expect("identity");
        store
            .insert_health_record(&HealthRecord::new(PersonId::new(5), "doctor9", true, false))
            .expect("insert");

        assert_eq!(
            store
                .fetch_attribute(PersonId::new(5), HealthAttribute::RegisteredDoctor)
                .expect("fetch"),
            Some(AttributeValue::Text("doctor9".to_string()))
        );
        assert_eq!(
            store
                .fetch_attribute(PersonId::new(5), HealthAttribute::HasAsthma)
                .expect("fetch"),
            Some(AttributeValue::Flag(true))
        );
        assert_eq!(
            store
                .fetch_attribute(PersonId::new(99), HealthAttribute::HasAsthma)
                .expect("fetch"),
            None
        );
    }

    #[test]
    fn test_credential_lookup_and_upsert() {
        let store = Store::in_memory().expect("in-memory store");

        assert_eq!(
            store.fetch_credential_password("welfare_dept").expect("fetch"),
            None
        );
        store
            .upsert_credential("welfare_dept", "welfare")
            .expect("seed");
        assert_eq!(
            store.fetch_credential_password("welfare_dept").expect("fetch"),
            Some("welfare".to_string())
        );

        // Re-provisioning replaces the stored password.
        store
            .upsert_credential("welfare_dept", "welfare2")
            .expect("reseed");
        assert_eq!(
            store.fetch_credential_password("welfare_dept").expect("fetch"),
            Some("welfare2".to_string())
        );
    }

    #[test]
    fn test_store_reopens_existing_database() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("persist.db");

        {
            let store = Store::open(&path).expect("open");
            store
                .insert_identity(&Identity::new(PersonId::new(6), "ed"))
                .expect("insert");
        }

        let store = Store::open(&path).expect("reopen");
        assert!(store.identity_exists(PersonId::new(6)).expect("exists"));
    }
}
