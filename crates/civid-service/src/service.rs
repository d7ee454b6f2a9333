//! Service facade: operation orchestration and audit completeness.
//!
//! [`CivIdService`] owns the storage handle and the audit sinks and
//! exposes the four externally-observable operations: registration,
//! health-record insert, partial update, and credential-gated
//! disclosure. Every attempt, including failures and denials, produces
//! exactly one audit event in its category sink.

use std::path::PathBuf;

use serde_json::json;
use thiserror::Error;
use tracing::info;

use civid_core::audit::{AuditCategory, AuditEvent};
use civid_core::config::ServiceConfig;
use civid_core::domain::{
    AttributeValue, HealthAttribute, HealthPatch, HealthRecord, PersonId,
};

use crate::access::AccessGate;
use crate::audit::AuditLog;
use crate::records::{RecordError, RecordStore};
use crate::registry::{IdentityRegistry, RegistryError};
use crate::store::{StorageError, Store};

/// Errors from service construction.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// The storage gateway failed to open.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A service directory could not be created or opened.
    #[error("failed to prepare {path}: {source}")]
    Io {
        /// The path that could not be prepared.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Outcome of a disclosure request.
///
/// A denial carries no record content; a grant carries the single
/// requested attribute value, or `None` when no record exists for the
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disclosure {
    /// Access was granted; the value is the requested attribute.
    Granted(Option<AttributeValue>),
    /// Access was denied. No data access was performed.
    Denied,
}

/// The identity-registration and attribute-disclosure service.
pub struct CivIdService {
    store: Store,
    audit: AuditLog,
}

impl CivIdService {
    /// Opens the service against the configured database and audit
    /// directory, creating both as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or the audit directory cannot be
    /// opened.
    pub fn open(config: &ServiceConfig) -> Result<Self, ServiceError> {
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| ServiceError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let store = Store::open(&config.database_path)?;
        let audit = AuditLog::open(&config.audit_dir).map_err(|source| ServiceError::Io {
            path: config.audit_dir.clone(),
            source,
        })?;
        Ok(Self { store, audit })
    }

    /// Registers a new identity: allocates a free identifier and inserts
    /// the `(id, name)` row.
    ///
    /// The attempt is audited on every path, including allocation
    /// failures.
    ///
    /// # Errors
    ///
    /// Returns the allocation or registration failure; see
    /// [`RegistryError`].
    pub fn register(&self, name: &str) -> Result<PersonId, RegistryError> {
        let registry = IdentityRegistry::new(&self.store);

        let id = match registry.allocate(name) {
            Ok(id) => id,
            Err(err) => {
                self.audit.record(&AuditEvent::new(
                    AuditCategory::Registration,
                    name,
                    json!({ "id": null, "name": name }),
                    false,
                ));
                return Err(err);
            },
        };

        let outcome = registry.register(id, name);
        self.audit.record(&AuditEvent::new(
            AuditCategory::Registration,
            name,
            json!({ "id": id, "name": name }),
            outcome.is_ok(),
        ));
        outcome?;
        info!(%id, name, "registration complete");
        Ok(id)
    }

    /// Inserts a health record for a registered identity.
    ///
    /// # Errors
    ///
    /// Returns the insert failure; see [`RecordError`]. Nothing is
    /// written on any failure path.
    pub fn insert(&self, record: &HealthRecord) -> Result<(), RecordError> {
        let outcome = RecordStore::new(&self.store).insert(record);
        self.audit.record(&AuditEvent::new(
            AuditCategory::Insert,
            record.id.to_string(),
            json!({
                "id": record.id,
                "registered_doctor": record.registered_doctor,
                "has_asthma": record.has_asthma,
                "has_registered_disability": record.has_registered_disability,
            }),
            outcome.is_ok(),
        ));
        outcome
    }

    /// Applies a partial update to the health record for `id`.
    ///
    /// `updated_by` names the acting party and is carried in the audit
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns the update failure; see [`RecordError`].
    pub fn update(
        &self,
        updated_by: &str,
        id: PersonId,
        patch: &HealthPatch,
    ) -> Result<(), RecordError> {
        let outcome = RecordStore::new(&self.store).update(id, patch);
        self.audit.record(&AuditEvent::new(
            AuditCategory::Update,
            updated_by,
            json!({
                "updated_by": updated_by,
                "record_updated": id,
                "updated_to": patch,
            }),
            outcome.is_ok(),
        ));
        outcome
    }

    /// Credential-gated disclosure of a single attribute.
    ///
    /// The access gate runs first; on denial no data access is performed
    /// and the attempt is still audited. On grant, a single-column point
    /// lookup returns the attribute value (or `None` when no record
    /// exists).
    ///
    /// # Errors
    ///
    /// Returns a storage error if the gate lookup or the granted read
    /// fails; the failed attempt is audited before the error surfaces.
    pub fn disclose(
        &self,
        requester: &str,
        password: &str,
        attribute: HealthAttribute,
        id: PersonId,
    ) -> Result<Disclosure, StorageError> {
        let payload = json!({
            "queried_by": requester,
            "attribute": attribute,
            "id": id,
        });

        let granted = match AccessGate::new(&self.store).authorize(requester, password) {
            Ok(granted) => granted,
            Err(err) => {
                self.audit.record(&AuditEvent::new(
                    AuditCategory::Query,
                    requester,
                    payload,
                    false,
                ));
                return Err(err);
            },
        };

        if !granted {
            self.audit.record(&AuditEvent::new(
                AuditCategory::Query,
                requester,
                payload,
                false,
            ));
            return Ok(Disclosure::Denied);
        }

        match RecordStore::new(&self.store).fetch_attribute(id, attribute) {
            Ok(value) => {
                self.audit.record(&AuditEvent::new(
                    AuditCategory::Query,
                    requester,
                    payload,
                    true,
                ));
                Ok(Disclosure::Granted(value))
            },
            Err(err) => {
                self.audit.record(&AuditEvent::new(
                    AuditCategory::Query,
                    requester,
                    payload,
                    false,
                ));
                Err(err)
            },
        }
    }

    /// Provisions (or re-provisions) a department credential.
    ///
    /// Provisioning is an operator concern, outside the audited
    /// operation set.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn seed_credential(&self, name: &str, password: &str) -> Result<(), StorageError> {
        self.store.upsert_credential(name, password)
    }

    /// Read accessor for the full health record of `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn health_record(&self, id: PersonId) -> Result<Option<HealthRecord>, StorageError> {
        self.store.fetch_health_record(id)
    }
}
