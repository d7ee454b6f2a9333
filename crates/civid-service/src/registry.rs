//! Identity registry: identifier allocation and registration.
//!
//! The registry is the sole allocation authority for the identifier
//! namespace. Allocation draws candidates uniformly from the fixed
//! address space and retries internally up to a bounded number of draws
//! on collision, a strict improvement over a one-draw "try again"
//! protocol. Registration is a check-then-insert; the two steps are not
//! atomic (see the crate docs), with the primary key as the storage-level
//! backstop.

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use civid_core::domain::{validate_registrant_name, Identity, PersonId, ValidationError, ID_SPACE};

use crate::store::{StorageError, Store};

/// Maximum number of candidate draws before allocation gives up.
///
/// With a 10 000-slot space the draw only starts colliding noticeably as
/// the registry fills; 32 draws keeps the failure probability negligible
/// until the space is nearly exhausted.
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 32;

/// Errors from identity allocation and registration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The registrant input does not match the declared shape.
    #[error("invalid registrant input: {0}")]
    Validation(#[from] ValidationError),

    /// An identity with this identifier already exists.
    #[error("identity {id} is already registered")]
    DuplicateIdentity {
        /// The colliding identifier.
        id: PersonId,
    },

    /// Every candidate draw collided with an existing identifier.
    #[error("no free identifier found after {attempts} draws")]
    IdSpaceExhausted {
        /// Number of draws attempted.
        attempts: u32,
    },

    /// The storage gateway failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Allocation authority and existence oracle for the identity namespace.
pub struct IdentityRegistry<'a> {
    store: &'a Store,
}

impl<'a> IdentityRegistry<'a> {
    /// Creates a registry over the given storage handle.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Allocates a free identifier for `name`.
    ///
    /// The name is validated first; the draw itself does not depend on
    /// it. Candidates are drawn uniformly from `[0, ID_SPACE)`; a
    /// candidate already in use is discarded and redrawn, up to
    /// [`MAX_ALLOCATION_ATTEMPTS`] times.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Validation`] for an empty name,
    /// [`RegistryError::IdSpaceExhausted`] if every draw collided, or a
    /// storage error from the existence checks.
    pub fn allocate(&self, name: &str) -> Result<PersonId, RegistryError> {
        validate_registrant_name(name)?;

        let mut rng = rand::thread_rng();
        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let candidate = PersonId::new(rng.gen_range(0..ID_SPACE));
            if self.exists(candidate)? {
                debug!(%candidate, attempt, "candidate identifier in use, redrawing");
                continue;
            }
            return Ok(candidate);
        }

        Err(RegistryError::IdSpaceExhausted {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }

    /// Point existence check against the identity table.
    ///
    /// This is the canonical guard used before registration and before
    /// any health-record write.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    pub fn exists(&self, id: PersonId) -> Result<bool, StorageError> {
        self.store.identity_exists(id)
    }

    /// Inserts `(id, name)` iff no identity with `id` exists at call time.
    ///
    /// The check and the insert are two separate storage operations; a
    /// concurrent registration for the same id can pass the check before
    /// either writes and surface as a storage failure instead.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateIdentity`] if the identifier is
    /// already registered, [`RegistryError::Validation`] for an empty
    /// name, or a storage error.
    pub fn register(&self, id: PersonId, name: &str) -> Result<(), RegistryError> {
        validate_registrant_name(name)?;

        if self.exists(id)? {
            return Err(RegistryError::DuplicateIdentity { id });
        }

        self.store.insert_identity(&Identity::new(id, name))?;
        info!(%id, name, "registered identity");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn registry_fixture() -> Store {
        Store::in_memory().expect("in-memory store")
    }

    #[test]
    fn test_allocate_rejects_empty_name() {
        let store = registry_fixture();
        let registry = IdentityRegistry::new(&store);

        let err = registry.allocate("").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Validation(ValidationError::EmptyName)
        ));
    }

    #[test]
    fn test_allocate_returns_id_in_space() {
        let store = registry_fixture();
        let registry = IdentityRegistry::new(&store);

        let id = registry.allocate("david").expect("allocate");
        assert!(id.value() < ID_SPACE);
    }

    #[test]
    fn test_register_then_exists() {
        let store = registry_fixture();
        let registry = IdentityRegistry::new(&store);

        let id = registry.allocate("david").expect("allocate");
        registry.register(id, "david").expect("register");
        assert!(registry.exists(id).expect("exists"));
    }

    #[test]
    fn test_register_duplicate_id_fails() {
        let store = registry_fixture();
        let registry = IdentityRegistry::new(&store);

        let id = PersonId::new(7459);
        registry.register(id, "david").expect("first register");
        let err = registry.register(id, "erin").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIdentity { id: dup } if dup == id));
    }

    #[test]
    fn test_successful_allocations_are_unique() {
        let store = registry_fixture();
        let registry = IdentityRegistry::new(&store);

        let mut seen = HashSet::new();
        for i in 0..100 {
            let id = registry.allocate(&format!("person{i}")).expect("allocate");
            registry.register(id, &format!("person{i}")).expect("register");
            assert!(seen.insert(id), "identifier {id} allocated twice");
        }
    }

    #[test]
    fn test_allocation_skips_ids_in_use() {
        let store = registry_fixture();
        let registry = IdentityRegistry::new(&store);

        // Pre-register a large block; allocation must still land on a
        // free identifier.
        for raw in 0..64 {
            registry
                .register(PersonId::new(raw), &format!("taken{raw}"))
                .expect("register");
        }
        let id = registry.allocate("newcomer").expect("allocate");
        assert!(
            !registry.exists(id).expect("exists"),
            "allocate returned an identifier already in use"
        );
    }
}
