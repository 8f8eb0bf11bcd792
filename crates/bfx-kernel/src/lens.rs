//! Lenses: named, deterministic projections over structured values
//!
//! A lens extracts a view from a substrate value without mutating it.
//! Lenses are registered by name in a [`LensRegistry`] so stores and tools
//! can resolve projections dynamically. Every lens must be deterministic:
//! the same input value always yields the same projection.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::path::LensPath;

/// A named, deterministic projection over a JSON value
pub trait Lens: Send + Sync {
    /// Registry name of this lens
    fn name(&self) -> &str;

    /// Project a view out of `value`
    ///
    /// # Errors
    /// Returns an error if the value does not have the shape the lens
    /// expects
    fn project(&self, value: &Value) -> Result<Value, LensError>;
}

/// The whole-value lens
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityLens;

impl Lens for IdentityLens {
    fn name(&self) -> &str {
        "identity"
    }

    fn project(&self, value: &Value) -> Result<Value, LensError> {
        Ok(value.clone())
    }
}

/// Projects a dotted path into nested objects
#[derive(Debug, Clone)]
pub struct FieldLens {
    path: LensPath,
    name: String,
}

impl FieldLens {
    /// Create a field lens for `path`
    #[must_use]
    pub fn new(path: LensPath) -> Self {
        let name = format!("field:{path}");
        Self { path, name }
    }

    /// The path this lens follows
    #[must_use]
    pub fn path(&self) -> &LensPath {
        &self.path
    }
}

impl Lens for FieldLens {
    fn name(&self) -> &str {
        &self.name
    }

    fn project(&self, value: &Value) -> Result<Value, LensError> {
        let mut current = value;
        for seg in self.path.iter() {
            let obj = current.as_object().ok_or_else(|| LensError::TypeMismatch {
                expected: "object",
                at: seg.to_string(),
            })?;
            current = obj.get(seg).ok_or_else(|| LensError::MissingField {
                path: self.path.to_string(),
                field: seg.to_string(),
            })?;
        }
        Ok(current.clone())
    }
}

/// Projects one element out of an array
#[derive(Debug, Clone)]
pub struct IndexLens {
    index: usize,
    name: String,
}

impl IndexLens {
    /// Create an index lens for element `index`
    #[must_use]
    pub fn new(index: usize) -> Self {
        let name = format!("index:{index}");
        Self { index, name }
    }
}

impl Lens for IndexLens {
    fn name(&self) -> &str {
        &self.name
    }

    fn project(&self, value: &Value) -> Result<Value, LensError> {
        let arr = value.as_array().ok_or(LensError::TypeMismatch {
            expected: "array",
            at: self.name.clone(),
        })?;
        arr.get(self.index)
            .cloned()
            .ok_or(LensError::IndexOutOfBounds {
                index: self.index,
                len: arr.len(),
            })
    }
}

/// Applies a sequence of lenses, feeding each projection into the next
pub struct ChainLens {
    stages: Vec<Arc<dyn Lens>>,
    name: String,
}

impl ChainLens {
    /// Create a chain from lens stages, applied left to right
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Lens>>) -> Self {
        let name = stages
            .iter()
            .map(|l| l.name().to_string())
            .collect::<Vec<_>>()
            .join("|");
        Self { stages, name }
    }
}

impl Lens for ChainLens {
    fn name(&self) -> &str {
        &self.name
    }

    fn project(&self, value: &Value) -> Result<Value, LensError> {
        let mut current = value.clone();
        for stage in &self.stages {
            current = stage.project(&current)?;
        }
        Ok(current)
    }
}

/// Concurrent registry of lenses by name
///
/// Thread-safe; registration and lookup can happen from any task.
pub struct LensRegistry {
    lenses: DashMap<String, Arc<dyn Lens>>,
}

impl LensRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            lenses: DashMap::new(),
        }
    }

    /// Create a registry with the built-in identity lens registered
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(IdentityLens));
        registry
    }

    /// Register a lens under its own name, replacing any previous entry
    pub fn register(&self, lens: Arc<dyn Lens>) {
        self.lenses.insert(lens.name().to_string(), lens);
    }

    /// Look up a lens by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Lens>> {
        self.lenses.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a lens is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lenses.contains_key(name)
    }

    /// Project `value` through the named lens
    ///
    /// # Errors
    /// Returns [`LensError::UnknownLens`] if no lens has that name, or the
    /// lens's own projection error
    pub fn project_with(&self, name: &str, value: &Value) -> Result<Value, LensError> {
        let lens = self
            .get(name)
            .ok_or_else(|| LensError::UnknownLens(name.to_string()))?;
        lens.project(value)
    }

    /// Names of all registered lenses, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lenses.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered lenses
    #[must_use]
    pub fn len(&self) -> usize {
        self.lenses.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lenses.is_empty()
    }
}

impl Default for LensRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Errors that can occur during lens projection
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LensError {
    /// No lens registered under the requested name
    #[error("unknown lens: {0}")]
    UnknownLens(String),

    /// A path segment was absent
    #[error("missing field '{field}' while projecting '{path}'")]
    MissingField { path: String, field: String },

    /// Array projection out of range
    #[error("index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Value shape did not match the lens
    #[error("expected {expected} at '{at}'")]
    TypeMismatch { expected: &'static str, at: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_lens_clones_value() {
        let value = json!({"a": 1});
        let projected = IdentityLens.project(&value).unwrap();
        assert_eq!(projected, value);
    }

    #[test]
    fn field_lens_projects_nested_path() {
        let value = json!({"profile": {"address": {"city": "Berlin"}}});
        let lens = FieldLens::new("profile.address.city".parse().unwrap());
        assert_eq!(lens.project(&value).unwrap(), json!("Berlin"));
        assert_eq!(lens.name(), "field:profile.address.city");
    }

    #[test]
    fn field_lens_missing_field() {
        let value = json!({"profile": {}});
        let lens = FieldLens::new("profile.address".parse().unwrap());
        assert_eq!(
            lens.project(&value),
            Err(LensError::MissingField {
                path: "profile.address".to_string(),
                field: "address".to_string(),
            })
        );
    }

    #[test]
    fn field_lens_type_mismatch() {
        let value = json!([1, 2, 3]);
        let lens = FieldLens::new("a".parse().unwrap());
        assert!(matches!(
            lens.project(&value),
            Err(LensError::TypeMismatch { expected: "object", .. })
        ));
    }

    #[test]
    fn index_lens_projects_element() {
        let value = json!(["x", "y", "z"]);
        let lens = IndexLens::new(1);
        assert_eq!(lens.project(&value).unwrap(), json!("y"));
    }

    #[test]
    fn index_lens_out_of_bounds() {
        let value = json!([1]);
        let lens = IndexLens::new(5);
        assert_eq!(
            lens.project(&value),
            Err(LensError::IndexOutOfBounds { index: 5, len: 1 })
        );
    }

    #[test]
    fn chain_lens_composes_stages() {
        let value = json!({"items": ["a", "b"]});
        let chain = ChainLens::new(vec![
            Arc::new(FieldLens::new("items".parse().unwrap())),
            Arc::new(IndexLens::new(0)),
        ]);
        assert_eq!(chain.project(&value).unwrap(), json!("a"));
        assert_eq!(chain.name(), "field:items|index:0");
    }

    #[test]
    fn registry_defaults_include_identity() {
        let registry = LensRegistry::with_defaults();
        assert!(registry.contains("identity"));
        let value = json!(42);
        assert_eq!(registry.project_with("identity", &value).unwrap(), value);
    }

    #[test]
    fn registry_register_and_project() {
        let registry = LensRegistry::with_defaults();
        registry.register(Arc::new(FieldLens::new("name".parse().unwrap())));
        let value = json!({"name": "fx"});
        assert_eq!(
            registry.project_with("field:name", &value).unwrap(),
            json!("fx")
        );
    }

    #[test]
    fn registry_unknown_lens() {
        let registry = LensRegistry::new();
        let result = registry.project_with("nope", &json!(null));
        assert_eq!(result, Err(LensError::UnknownLens("nope".to_string())));
    }

    #[test]
    fn registry_names_sorted() {
        let registry = LensRegistry::with_defaults();
        registry.register(Arc::new(IndexLens::new(0)));
        registry.register(Arc::new(FieldLens::new("a".parse().unwrap())));
        assert_eq!(registry.names(), vec!["field:a", "identity", "index:0"]);
    }

    #[test]
    fn projection_is_deterministic() {
        let value = json!({"k": [1, 2, 3]});
        let lens = FieldLens::new("k".parse().unwrap());
        assert_eq!(lens.project(&value), lens.project(&value));
    }
}
