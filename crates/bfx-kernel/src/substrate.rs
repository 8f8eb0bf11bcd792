//! Substrates: immutable values bound to their identities
//!
//! A [`Substrate`] pairs a structured value with the identity derived from
//! its canonical encoding. The pair is constructed together and never
//! diverges; mutation means constructing a new substrate.

use serde_json::Value;

use crate::delta::Delta;
use crate::identity::{IdentityError, SubstrateId};
use crate::lens::{Lens, LensError};

/// An immutable value and the identity it hashes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substrate {
    id: SubstrateId,
    value: Value,
}

impl Substrate {
    /// Bind a value to its canonical identity
    ///
    /// # Errors
    /// Returns an error if the value cannot be canonically encoded
    pub fn new(value: Value) -> Result<Self, IdentityError> {
        let id = SubstrateId::of_value(&value)?;
        Ok(Self { id, value })
    }

    /// Parse a JSON byte payload into a substrate
    ///
    /// # Errors
    /// Returns an error if the payload is not valid JSON
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::new(value)
    }

    /// The substrate identity
    #[inline]
    #[must_use]
    pub const fn id(&self) -> SubstrateId {
        self.id
    }

    /// The underlying value
    #[inline]
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the substrate, yielding its value
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Canonical byte encoding (object keys sorted)
    ///
    /// # Errors
    /// Returns an error if the value cannot be serialized
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, IdentityError> {
        Ok(serde_json::to_vec(&self.value)?)
    }

    /// Re-derive the identity and compare (true for any substrate built
    /// through [`Substrate::new`])
    #[must_use]
    pub fn verify(&self) -> bool {
        SubstrateId::of_value(&self.value).is_ok_and(|id| id == self.id)
    }

    /// Project a view through a lens
    ///
    /// # Errors
    /// Returns the lens's projection error
    pub fn view(&self, lens: &dyn Lens) -> Result<Value, LensError> {
        lens.project(&self.value)
    }

    /// Identity delta from this substrate to another
    #[inline]
    #[must_use]
    pub fn delta(&self, other: &Self) -> Delta {
        Delta::between(self.id, other.id)
    }
}
