//! Access-control gate for cross-party attribute disclosure.
//!
//! Validates a requesting department's name/password pair against the
//! provisioned credentials. The gate fails closed: an unknown name and a
//! wrong password both deny, and the returned boolean never reveals
//! which check failed. Credentials are stored and compared as plaintext,
//! a preserved contract of the system, documented as a known weakness
//! rather than silently replaced with hashing.

use subtle::ConstantTimeEq;
use tracing::info;

use crate::store::{StorageError, Store};

/// Credential verifier over the `access_credentials` table.
///
/// Owns verification logic only; credential provisioning is external.
pub struct AccessGate<'a> {
    store: &'a Store,
}

impl<'a> AccessGate<'a> {
    /// Creates a gate over the given storage handle.
    #[must_use]
    pub const fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Returns `true` iff `name` is provisioned and `password` matches
    /// the stored password exactly.
    ///
    /// The comparison is constant-time over the raw bytes; observable
    /// behavior is exact string equality.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential lookup fails.
    pub fn authorize(&self, name: &str, password: &str) -> Result<bool, StorageError> {
        let Some(stored) = self.store.fetch_credential_password(name)? else {
            info!(requester = name, "access denied: requester not registered");
            return Ok(false);
        };

        let granted: bool = stored.as_bytes().ct_eq(password.as_bytes()).into();
        if !granted {
            info!(requester = name, "access denied: incorrect password");
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_fixture() -> Store {
        let store = Store::in_memory().expect("in-memory store");
        store
            .upsert_credential("welfare_dept", "welfare")
            .expect("seed credential");
        store
    }

    #[test]
    fn test_valid_credentials_grant_access() {
        let store = gate_fixture();
        let gate = AccessGate::new(&store);
        assert!(gate.authorize("welfare_dept", "welfare").expect("authorize"));
    }

    #[test]
    fn test_unknown_name_denies() {
        let store = gate_fixture();
        let gate = AccessGate::new(&store);
        assert!(!gate.authorize("housing_dept", "welfare").expect("authorize"));
    }

    #[test]
    fn test_wrong_password_denies() {
        let store = gate_fixture();
        let gate = AccessGate::new(&store);
        assert!(!gate.authorize("welfare_dept", "wrong").expect("authorize"));
    }

    #[test]
    fn test_denial_reason_is_not_observable_in_result() {
        let store = gate_fixture();
        let gate = AccessGate::new(&store);

        let unknown_name = gate.authorize("nobody", "welfare").expect("authorize");
        let wrong_password = gate.authorize("welfare_dept", "nope").expect("authorize");
        assert_eq!(unknown_name, wrong_password);
    }

    #[test]
    fn test_password_comparison_is_exact() {
        let store = gate_fixture();
        let gate = AccessGate::new(&store);

        assert!(!gate.authorize("welfare_dept", "Welfare").expect("authorize"));
        assert!(!gate.authorize("welfare_dept", "welfare ").expect("authorize"));
        assert!(!gate.authorize("welfare_dept", "").expect("authorize"));
    }
}
