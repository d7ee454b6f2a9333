//! civid-service - Storage and service layer for the civid identity
//! service.
//!
//! The service issues unique identifiers to registrants, stores
//! per-identity health attributes, and discloses a single attribute to a
//! credentialed department on request. Every operation attempt is
//! recorded in an append-only, per-category audit trail.
//!
//! # Modules
//!
//! - [`store`]: `SQLite` storage gateway over the three logical tables
//! - [`registry`]: identifier allocation and registration
//! - [`records`]: health-record insert, partial update, and projection
//! - [`access`]: credential gate for cross-party disclosure
//! - [`audit`]: per-category JSON-lines audit sinks
//! - [`service`]: the facade composing the above
//!
//! # Concurrency
//!
//! The service is a single-threaded, synchronous request-response
//! system. The existence-check-then-write sequences in registration and
//! record insert are not atomic; under concurrent callers the race is
//! backstopped by the storage layer's primary-key constraints and
//! surfaces as a storage error.

pub mod access;
pub mod audit;
pub mod records;
pub mod registry;
pub mod service;
pub mod store;

pub use service::{CivIdService, Disclosure, ServiceError};
