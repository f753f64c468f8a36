//! The workflow registry.
//!
//! Holds two populations:
//!
//! - **Registered** workflows, loaded once at start-up and read-only afterwards,
//!   keyed by [`WorkflowName`].
//! - **Ephemeral** workflows, each built for one remote node call and keyed by
//!   the [`RequestId`] of that call. They live in a concurrent map with
//!   explicit insert/remove operations that report whether they took effect.
//!
//! An ephemeral entry is owned by an [`EphemeralRegistration`], which removes
//! it when dropped. Whatever way a request ends (success, error, panic, or
//! the request future being dropped mid-flight) its entry is gone afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::{DispatchError, RequestId, ResolvedWorkflow, WorkflowDefinition, WorkflowName};

/// Which workflow a request runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchTarget {
    Registered(WorkflowName),
    /// The ephemeral workflow registered under this request id.
    Ephemeral(RequestId),
}

impl std::fmt::Display for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registered(name) => write!(f, "{name}"),
            Self::Ephemeral(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    registered: HashMap<WorkflowName, ResolvedWorkflow>,
    ephemeral: DashMap<RequestId, ResolvedWorkflow>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a workflow under `name`.
    ///
    /// Returns `false` and keeps the existing definition if the name is taken.
    pub fn register(&mut self, name: WorkflowName, workflow: WorkflowDefinition) -> bool {
        match self.registered.entry(name) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(Arc::new(workflow));
                true
            }
        }
    }

    pub fn registered(&self, name: &WorkflowName) -> Option<ResolvedWorkflow> {
        self.registered.get(name).cloned()
    }

    /// Names of all registered workflows, sorted.
    pub fn registered_names(&self) -> Vec<&WorkflowName> {
        let mut names: Vec<_> = self.registered.keys().collect();
        names.sort();
        names
    }

    /// Inserts an ephemeral workflow.
    ///
    /// Returns `false` without touching the map if `id` is already in flight.
    pub fn insert_ephemeral(&self, id: RequestId, workflow: WorkflowDefinition) -> bool {
        match self.ephemeral.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(workflow));
                true
            }
        }
    }

    /// Removes the ephemeral workflow for `id`. Returns `false` if none existed.
    pub fn remove_ephemeral(&self, id: &RequestId) -> bool {
        self.ephemeral.remove(id).is_some()
    }

    pub fn ephemeral(&self, id: &RequestId) -> Option<ResolvedWorkflow> {
        self.ephemeral.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of ephemeral workflows currently in flight.
    pub fn ephemeral_len(&self) -> usize {
        self.ephemeral.len()
    }

    pub fn resolve(&self, target: &DispatchTarget) -> Option<ResolvedWorkflow> {
        match target {
            DispatchTarget::Registered(name) => self.registered(name),
            DispatchTarget::Ephemeral(id) => self.ephemeral(id),
        }
    }
}

/// Ownership of one ephemeral registry entry.
///
/// Created by [`EphemeralRegistration::acquire`]; the entry is removed by
/// [`EphemeralRegistration::release`] or, failing that, on drop.
#[derive(Debug)]
pub struct EphemeralRegistration {
    registry: Arc<WorkflowRegistry>,
    id: RequestId,
    released: bool,
}

impl EphemeralRegistration {
    /// Inserts `workflow` under `id`.
    ///
    /// Fails with [`DispatchError::DuplicateRequest`] if another request holds
    /// the id; the other request's entry is left untouched.
    pub fn acquire(
        registry: Arc<WorkflowRegistry>,
        id: RequestId,
        workflow: WorkflowDefinition,
    ) -> Result<Self, DispatchError> {
        if !registry.insert_ephemeral(id.clone(), workflow) {
            return Err(DispatchError::DuplicateRequest(id));
        }
        Ok(Self {
            registry,
            id,
            released: false,
        })
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn target(&self) -> DispatchTarget {
        DispatchTarget::Ephemeral(self.id.clone())
    }

    /// Removes the entry now. Returns whether an entry was removed.
    pub fn release(mut self) -> bool {
        self.released = true;
        self.registry.remove_ephemeral(&self.id)
    }
}

impl Drop for EphemeralRegistration {
    fn drop(&mut self) {
        if !self.released && self.registry.remove_ephemeral(&self.id) {
            tracing::debug!(request_id = %self.id, "ephemeral workflow removed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Trigger;
    use serde_json::Map;

    fn workflow(name: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            name: name.to_owned(),
            version: "1.0.0".into(),
            description: String::new(),
            trigger: Trigger {
                kind: "http".into(),
                config: Map::new(),
            },
            steps: Vec::new(),
        }
    }

    fn id(value: &str) -> RequestId {
        RequestId::new(value).unwrap()
    }

    #[test]
    fn insert_and_remove_report_success() {
        let registry = WorkflowRegistry::new();
        assert!(registry.insert_ephemeral(id("a"), workflow("a")));
        assert!(!registry.insert_ephemeral(id("a"), workflow("other")));
        assert_eq!(registry.ephemeral(&id("a")).unwrap().name, "a");
        assert!(registry.remove_ephemeral(&id("a")));
        assert!(!registry.remove_ephemeral(&id("a")));
    }

    #[test]
    fn registration_names_are_first_come() {
        let mut registry = WorkflowRegistry::new();
        let name = WorkflowName::new("countries").unwrap();
        assert!(registry.register(name.clone(), workflow("first")));
        assert!(!registry.register(name.clone(), workflow("second")));
        assert_eq!(registry.registered(&name).unwrap().name, "first");
    }

    #[test]
    fn release_removes_the_entry() {
        let registry = Arc::new(WorkflowRegistry::new());
        let registration =
            EphemeralRegistration::acquire(Arc::clone(&registry), id("r1"), workflow("r1")).unwrap();
        assert!(registry.resolve(&registration.target()).is_some());
        assert!(registration.release());
        assert_eq!(registry.ephemeral_len(), 0);
    }

    #[test]
    fn drop_removes_the_entry() {
        let registry = Arc::new(WorkflowRegistry::new());
        {
            let _registration =
                EphemeralRegistration::acquire(Arc::clone(&registry), id("r1"), workflow("r1"))
                    .unwrap();
            assert_eq!(registry.ephemeral_len(), 1);
        }
        assert!(registry.ephemeral(&id("r1")).is_none());
    }

    #[test]
    fn duplicate_acquire_leaves_the_original_entry() {
        let registry = Arc::new(WorkflowRegistry::new());
        let first =
            EphemeralRegistration::acquire(Arc::clone(&registry), id("dup"), workflow("first"))
                .unwrap();
        let second =
            EphemeralRegistration::acquire(Arc::clone(&registry), id("dup"), workflow("second"));
        assert!(matches!(second, Err(DispatchError::DuplicateRequest(_))));
        assert_eq!(registry.ephemeral(&id("dup")).unwrap().name, "first");
        drop(first);
        assert_eq!(registry.ephemeral_len(), 0);
    }

    #[test]
    fn ephemeral_and_registered_targets_do_not_collide() {
        let mut registry = WorkflowRegistry::new();
        registry.register(WorkflowName::new("same").unwrap(), workflow("registered"));
        registry.insert_ephemeral(id("same"), workflow("ephemeral"));
        let registered = DispatchTarget::Registered(WorkflowName::new("same").unwrap());
        let ephemeral = DispatchTarget::Ephemeral(id("same"));
        assert_eq!(registry.resolve(&registered).unwrap().name, "registered");
        assert_eq!(registry.resolve(&ephemeral).unwrap().name, "ephemeral");
    }
}
