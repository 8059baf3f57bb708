//! Entity Reconciliation
//!
//! Surge and bed-space records pushed by the gateway, and the ordered
//! collections they are merged into.
//!
//! # Design
//!
//! Records are kept as the JSON objects the gateway sends, wrapped with their
//! extracted identity. Each [`EntityCollection`] is insertion ordered and keyed
//! by identity:
//!
//! - an upsert replaces an existing record in place, or appends a new one
//! - a snapshot replaces the whole collection
//!
//! Readers get an `Arc` of the current vector. Writers clone-on-write via
//! [`Arc::make_mut`], so a snapshot handed out earlier is never mutated.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::domain::events::{EventKind, NormalizedEvent};

// =============================================================================
// Entity Family
// =============================================================================

/// Kind of record an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityFamily {
    /// Surge (emergency event) records.
    Surge,
    /// Bed-space records.
    Bedspace,
}

impl EntityFamily {
    /// Payload key holding a single record (`surge`, `bedspace`).
    #[must_use]
    pub const fn singular_key(&self) -> &'static str {
        match self {
            Self::Surge => "surge",
            Self::Bedspace => "bedspace",
        }
    }

    /// Payload key holding a full collection (`surges`, `bedspaces`).
    #[must_use]
    pub const fn collection_key(&self) -> &'static str {
        match self {
            Self::Surge => "surges",
            Self::Bedspace => "bedspaces",
        }
    }

    /// Get the family label used for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.singular_key()
    }
}

// =============================================================================
// Entity
// =============================================================================

/// A record identified by a stable external id.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    id: String,
    fields: Map<String, Value>,
}

impl Entity {
    /// Build an entity from a JSON value.
    ///
    /// Returns `None` unless the value is an object carrying `_id` or `id`
    /// as a non-empty string or a number.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        let id = ["_id", "id"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(scalar_string))?;
        Some(Self {
            id,
            fields: fields.clone(),
        })
    }

    /// Stable identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hospital association: `hospital` (id or object with `_id`), then `hospitalId`.
    #[must_use]
    pub fn hospital_id(&self) -> Option<String> {
        let from_hospital = self.fields.get("hospital").and_then(|hospital| match hospital {
            Value::Object(obj) => obj
                .get("_id")
                .or_else(|| obj.get("id"))
                .and_then(scalar_string),
            other => scalar_string(other),
        });
        from_hospital.or_else(|| self.fields.get("hospitalId").and_then(scalar_string))
    }

    /// Status field, if present.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.fields.get("status").and_then(Value::as_str)
    }

    /// Bed availability, if present.
    #[must_use]
    pub fn available_beds(&self) -> Option<i64> {
        self.fields.get("availableBeds").and_then(Value::as_i64)
    }

    /// Look up an arbitrary field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All fields as received.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Convert back into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Stringify a JSON string or number; empty strings are not identities.
pub(crate) fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Active Status Policy
// =============================================================================

/// Status values that count as "in progress".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStatusPolicy {
    statuses: HashSet<String>,
}

impl Default for ActiveStatusPolicy {
    fn default() -> Self {
        Self::new(["pending", "active", "in-progress"])
    }
}

impl ActiveStatusPolicy {
    /// Create a policy from a list of statuses (case-insensitive).
    pub fn new<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            statuses: statuses
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Whether the entity's status is one of the active statuses.
    #[must_use]
    pub fn is_active(&self, entity: &Entity) -> bool {
        entity
            .status()
            .is_some_and(|status| self.statuses.contains(&status.to_ascii_lowercase()))
    }
}

// =============================================================================
// Entity Collection
// =============================================================================

#[derive(Debug, Default)]
struct CollectionState {
    entries: Arc<Vec<Entity>>,
    index: HashMap<String, usize>,
}

impl CollectionState {
    fn upsert(&mut self, entity: Entity) {
        let entries = Arc::make_mut(&mut self.entries);
        if let Some(&position) = self.index.get(entity.id()) {
            entries[position] = entity;
        } else {
            self.index.insert(entity.id().to_string(), entries.len());
            entries.push(entity);
        }
    }
}

/// Insertion-ordered collection keyed by entity identity.
#[derive(Debug, Default)]
pub struct EntityCollection {
    state: RwLock<CollectionState>,
}

impl EntityCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full collection. Duplicate ids collapse: later value, first position.
    pub fn apply_snapshot<I>(&self, entities: I)
    where
        I: IntoIterator<Item = Entity>,
    {
        let mut next = CollectionState::default();
        for entity in entities {
            next.upsert(entity);
        }
        *self.state.write() = next;
    }

    /// Insert or replace by identity, keeping the original position on replace.
    pub fn apply_upsert(&self, entity: Entity) {
        self.state.write().upsert(entity);
    }

    /// Consistent snapshot of the collection in insertion order.
    #[must_use]
    pub fn collection(&self) -> Arc<Vec<Entity>> {
        Arc::clone(&self.state.read().entries)
    }

    /// Entities whose status the policy considers active.
    #[must_use]
    pub fn active_entities(&self, policy: &ActiveStatusPolicy) -> Vec<Entity> {
        self.collection()
            .iter()
            .filter(|entity| policy.is_active(entity))
            .cloned()
            .collect()
    }

    /// Look up an entity by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Entity> {
        let state = self.state.read();
        state.index.get(id).map(|&position| state.entries[position].clone())
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entity.
    pub fn clear(&self) {
        *self.state.write() = CollectionState::default();
    }
}

// =============================================================================
// Entity Store
// =============================================================================

/// One collection per entity family plus the active-status policy.
#[derive(Debug, Default)]
pub struct EntityStore {
    surges: EntityCollection,
    bedspaces: EntityCollection,
    policy: ActiveStatusPolicy,
}

impl EntityStore {
    /// Create an empty store with the given policy.
    #[must_use]
    pub fn new(policy: ActiveStatusPolicy) -> Self {
        Self {
            surges: EntityCollection::new(),
            bedspaces: EntityCollection::new(),
            policy,
        }
    }

    /// Collection for a family.
    #[must_use]
    pub const fn family(&self, family: EntityFamily) -> &EntityCollection {
        match family {
            EntityFamily::Surge => &self.surges,
            EntityFamily::Bedspace => &self.bedspaces,
        }
    }

    /// Active entities of a family.
    #[must_use]
    pub fn active(&self, family: EntityFamily) -> Vec<Entity> {
        self.family(family).active_entities(&self.policy)
    }

    /// Merge a normalized event into the matching collection.
    ///
    /// Broadcasts and events without a family leave the store untouched.
    pub fn reconcile(&self, event: &NormalizedEvent) {
        let Some(family) = event.family else {
            return;
        };
        let collection = self.family(family);
        match event.kind {
            EventKind::Snapshot => collection.apply_snapshot(event.entities.iter().cloned()),
            EventKind::Created | EventKind::Updated => {
                for entity in &event.entities {
                    collection.apply_upsert(entity.clone());
                }
            }
            EventKind::Broadcast => {}
        }
    }

    /// Empty both collections.
    pub fn clear(&self) {
        self.surges.clear();
        self.bedspaces.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
