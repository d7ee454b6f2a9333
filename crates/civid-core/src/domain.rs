//! Core domain types for identity registration and health records.
//!
//! An [`Identity`] binds a unique [`PersonId`] to a registrant name. A
//! [`HealthRecord`] may exist only for a registered identity, at most once
//! per identifier. Updates are expressed as a [`HealthPatch`] where each
//! field is an explicit `Option`: `None` means "leave this column
//! unchanged", never "clear it". Disclosure is bounded to a single
//! [`HealthAttribute`] per request by construction.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the identifier address space. Identifiers are drawn uniformly
/// from `[0, ID_SPACE)`.
pub const ID_SPACE: u32 = 10_000;

/// Input that does not match the declared shape for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// Registrant name is empty or whitespace-only.
    #[error("registrant name must be a non-empty string")]
    EmptyName,

    /// Doctor name is empty or whitespace-only.
    #[error("registered doctor must be a non-empty string")]
    EmptyDoctor,

    /// Attribute name does not name a disclosable health column.
    #[error("unknown health attribute: {name}")]
    UnknownAttribute {
        /// The attribute name as supplied by the caller.
        name: String,
    },
}

/// Unique identifier issued to a registrant.
///
/// Identifiers are allocated by the identity registry and never reused,
/// mutated, or deleted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PersonId(u32);

impl PersonId {
    /// Wraps a raw identifier value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An allocated identifier bound to a registrant name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// The allocated identifier.
    pub id: PersonId,

    /// The registrant's name.
    pub name: String,
}

impl Identity {
    /// Creates an identity binding `id` to `name`.
    #[must_use]
    pub fn new(id: PersonId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Per-identity health attributes.
///
/// All four logical fields are required at insert time; the booleans are
/// non-nullable. `updated_at` is stamped on creation and refreshed on
/// every successful mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Identifier of the registered identity this record belongs to.
    pub id: PersonId,

    /// Name of the registered doctor.
    pub registered_doctor: String,

    /// Whether the person has asthma.
    pub has_asthma: bool,

    /// Whether the person has a registered disability.
    pub has_registered_disability: bool,

    /// Time of the last successful mutation.
    pub updated_at: DateTime<Utc>,
}

impl HealthRecord {
    /// Creates a record with `updated_at` stamped to the current time.
    #[must_use]
    pub fn new(
        id: PersonId,
        registered_doctor: impl Into<String>,
        has_asthma: bool,
        has_registered_disability: bool,
    ) -> Self {
        Self {
            id,
            registered_doctor: registered_doctor.into(),
            has_asthma,
            has_registered_disability,
            updated_at: Utc::now(),
        }
    }
}

/// Partial update of a [`HealthRecord`].
///
/// Each field is an explicit `Option`: `Some(v)` sets the column to `v`,
/// `None` leaves it unchanged. "Unset" and "set to `false`" are therefore
/// unambiguous at the type level. An all-`None` patch is a no-op and is
/// rejected by the record store without touching storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPatch {
    /// New doctor name, if the column is to change.
    pub registered_doctor: Option<String>,

    /// New asthma flag, if the column is to change.
    pub has_asthma: Option<bool>,

    /// New disability flag, if the column is to change.
    pub has_registered_disability: Option<bool>,
}

impl HealthPatch {
    /// Returns `true` if every field is `None` (nothing to update).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.registered_doctor.is_none()
            && self.has_asthma.is_none()
            && self.has_registered_disability.is_none()
    }
}

/// The disclosable columns of a health record.
///
/// Disclosure requests name exactly one attribute; the closed enum bounds
/// a query to the requested column plus the identifier. The attribute is
/// never interpolated from caller-supplied text into a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthAttribute {
    /// The `registered_doctor` column.
    RegisteredDoctor,
    /// The `has_asthma` column.
    HasAsthma,
    /// The `has_registered_disability` column.
    HasRegisteredDisability,
}

impl HealthAttribute {
    /// The storage column this attribute projects.
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::RegisteredDoctor => "registered_doctor",
            Self::HasAsthma => "has_asthma",
            Self::HasRegisteredDisability => "has_registered_disability",
        }
    }
}

impl FromStr for HealthAttribute {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered_doctor" => Ok(Self::RegisteredDoctor),
            "has_asthma" => Ok(Self::HasAsthma),
            "has_registered_disability" => Ok(Self::HasRegisteredDisability),
            other => Err(ValidationError::UnknownAttribute {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for HealthAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A disclosed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A textual column value.
    Text(String),
    /// A boolean column value.
    Flag(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Flag(b) => b.fmt(f),
        }
    }
}

/// Validates a registrant name against the registration input shape.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyName`] if the name is empty or
/// whitespace-only.
pub fn validate_registrant_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(())
}

/// Validates a doctor name for insert and update inputs.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyDoctor`] if the name is empty or
/// whitespace-only.
pub fn validate_doctor_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyDoctor);
    }
    Ok(())
}
