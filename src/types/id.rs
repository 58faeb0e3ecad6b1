// ABOUTME: Phantom-typed identifiers for backend resources.
// ABOUTME: A ContainerId cannot be passed where a PodId is expected.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

pub enum ContainerMarker {}
pub enum PodMarker {}

/// Identifier of a backend resource, tagged with the resource kind.
#[must_use = "IDs reference resources and should not be ignored"]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

// T is only a marker, so none of these may require bounds on it.

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Id").field(&self.value).finish()
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> std::fmt::Display for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Engine-assigned container ID (or name, which the engine accepts interchangeably).
pub type ContainerId = Id<ContainerMarker>;
/// Cluster pod name.
pub type PodId = Id<PodMarker>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_compare_by_value() {
        let a = ContainerId::new("abc");
        assert_eq!(a, ContainerId::new("abc".to_string()));
        assert_ne!(a, ContainerId::new("def"));
        assert_eq!(a.to_string(), "abc");
    }

    #[test]
    fn ids_hash_by_value() {
        let set: HashSet<PodId> = [PodId::new("p-1"), PodId::new("p-1"), PodId::new("p-2")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }
}
