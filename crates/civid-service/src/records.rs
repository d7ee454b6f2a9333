//! Record store: health-record insert, partial update, and projection.
//!
//! The record store owns all health-record mutation. Two invariants hold
//! at this layer: a record may be inserted only for a registered
//! identity, and at most one record may exist per identifier. Updates
//! are partial: only the `Some` fields of a [`HealthPatch`] are written,
//! and an all-`None` patch is rejected without touching storage.

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use civid_core::domain::{
    validate_doctor_name, AttributeValue, HealthAttribute, HealthPatch, HealthRecord, PersonId,
    ValidationError,
};

use crate::registry::IdentityRegistry;
use crate::store::{StorageError, Store};

/// Errors from health-record operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// The record input does not match the declared shape.
    #[error("invalid record input: {0}")]
    Validation(#[from] ValidationError),

    /// A health-record write was attempted for an unregistered identity.
    #[error("identity {id} is not registered")]
    UnregisteredIdentity {
        /// The unregistered identifier.
        id: PersonId,
    },

    /// A health record for this identifier already exists.
    #[error("health record for identity {id} already exists")]
    DuplicateRecord {
        /// The identifier with the existing row.
        id: PersonId,
    },

    /// An update targeted an identifier with no health record.
    #[error("no health record exists for identity {id}")]
    RecordNotFound {
        /// The identifier with no row.
        id: PersonId,
    },

    /// Every field of the update patch was unset.
    #[error("nothing to update: every patch field is unset")]
    NothingToUpdate,

    /// The storage gateway failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Owner of health-record mutation.
///
/// Consults the identity registry before any insert; updates check the
/// record's own existence in the health table instead.
pub struct RecordStore<'a> {
    store: &'a Store,
    registry: IdentityRegistry<'a>,
}

impl<'a> RecordStore<'a> {
    /// Creates a record store over the given storage handle.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self {
            store,
            registry: IdentityRegistry::new(store),
        }
    }

    /// Inserts a health record.
    ///
    /// Preconditions, checked in order: the identity must be registered,
    /// and no record may already exist for the identifier. On success the
    /// row is written with the record's `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::UnregisteredIdentity`],
    /// [`RecordError::DuplicateRecord`], [`RecordError::Validation`] for
    /// an empty doctor name, or a storage error. Nothing is written on
    /// any failure path.
    pub fn insert(&self, record: &HealthRecord) -> Result<(), RecordError> {
        validate_doctor_name(&record.registered_doctor)?;

        if !self.registry.exists(record.id)? {
            return Err(RecordError::UnregisteredIdentity { id: record.id });
        }
        if self.store.health_record_exists(record.id)? {
            return Err(RecordError::DuplicateRecord { id: record.id });
        }

        self.store.insert_health_record(record)?;
        info!(id = %record.id, "inserted health record");
        Ok(())
    }

    /// Applies the non-`None` fields of `patch` to the record for `id`
    /// and refreshes `updated_at`.
    ///
    /// An all-`None` patch is a no-op and reports failure without
    /// touching storage. The identity registry is not re-checked here;
    /// the record's own existence in the health table is the guard.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NothingToUpdate`] for an empty patch,
    /// [`RecordError::RecordNotFound`] if no record exists for `id`,
    /// [`RecordError::Validation`] for an empty doctor name, or a
    /// storage error.
    pub fn update(&self, id: PersonId, patch: &HealthPatch) -> Result<(), RecordError> {
        if patch.is_empty() {
            return Err(RecordError::NothingToUpdate);
        }
        if let Some(doctor) = &patch.registered_doctor {
            validate_doctor_name(doctor)?;
        }

        if !self.store.health_record_exists(id)? {
            return Err(RecordError::RecordNotFound { id });
        }

        self.store.update_health_record(id, patch, Utc::now())?;
        info!(%id, "updated health record");
        Ok(())
    }

    /// Single-column point projection of one attribute.
    ///
    /// Returns `None` if no record exists for `id`. Disclosure is bounded
    /// to the requested column by the closed attribute enum.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn fetch_attribute(
        &self,
        id: PersonId,
        attribute: HealthAttribute,
    ) -> Result<Option<AttributeValue>, StorageError> {
        self.store.fetch_attribute(id, attribute)
    }

    /// Fetches the full record for `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn fetch(&self, id: PersonId) -> Result<Option<HealthRecord>, StorageError> {
        self.store.fetch_health_record(id)
    }
}
