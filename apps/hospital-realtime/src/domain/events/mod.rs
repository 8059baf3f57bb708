//! Event Normalization
//!
//! Maps the gateway's open-ended set of push event names onto four canonical
//! kinds and pulls entity records out of payloads whose shape varies.
//!
//! # Alias resolution
//!
//! Each entity family has a [`FamilyProfile`] listing the raw names observed
//! for "created", "updated" and "initial snapshot". Any name not found in a
//! profile is a [`EventKind::Broadcast`] and is passed through untouched.
//!
//! # Extraction
//!
//! Strategies are tried in order and the first that yields a record with an
//! identity wins:
//!
//! 1. snapshots only: the collection key (`surges`), then `data.surges`
//! 2. the singular key (`surge`), then `entity`, then `data.surge`, then `data.entity`
//! 3. the payload itself as an array of records
//! 4. the payload itself as a bare record
//!
//! When nothing matches the event is rejected with
//! [`NormalizeError::NoEntity`]; the caller logs and drops it.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::entity::{Entity, EntityFamily, scalar_string};

// =============================================================================
// Canonical Events
// =============================================================================

/// Canonical event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Full replacement of a family's collection.
    Snapshot,
    /// A record was created.
    Created,
    /// A record was updated.
    Updated,
    /// Anything else, passed through opaquely.
    Broadcast,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Snapshot, Self::Created, Self::Updated, Self::Broadcast];

    /// Get the label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Broadcast => "broadcast",
        }
    }
}

/// A gateway event after alias resolution and entity extraction.
#[derive(Debug, Clone)]
pub struct NormalizedEvent {
    /// Canonical kind.
    pub kind: EventKind,
    /// Entity family; `None` for broadcasts.
    pub family: Option<EntityFamily>,
    /// Extracted records. Empty for broadcasts and clearing snapshots.
    pub entities: Vec<Entity>,
    /// Hospital the event concerns, when known.
    pub hospital_id: Option<String>,
    /// Event name as received.
    pub raw_event_name: String,
    /// Payload as received.
    pub payload: Value,
    /// Time the event was classified.
    pub timestamp: DateTime<Utc>,
}

impl NormalizedEvent {
    /// First extracted record.
    #[must_use]
    pub fn entity(&self) -> Option<&Entity> {
        self.entities.first()
    }
}

/// Normalization failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// A known entity event carried no extractable record.
    #[error("no entity could be extracted from '{event}'")]
    NoEntity {
        /// Raw event name.
        event: String,
    },
}

// =============================================================================
// Alias Tables
// =============================================================================

/// Raw event names observed for one entity family.
#[derive(Debug, Clone)]
pub struct FamilyProfile {
    /// Family the names belong to.
    pub family: EntityFamily,
    /// Names meaning "created".
    pub created: &'static [&'static str],
    /// Names meaning "updated".
    pub updated: &'static [&'static str],
    /// Names meaning "initial snapshot".
    pub snapshot: &'static [&'static str],
}

impl FamilyProfile {
    /// Surge aliases.
    pub const SURGE: Self = Self {
        family: EntityFamily::Surge,
        created: &[
            "surge_created",
            "new_surge",
            "surge.created",
            "hospital_surge_created",
            "regional_surge_created",
            "emergency_surge",
            "global_surge_created",
        ],
        updated: &[
            "surge_updated",
            "surge.updated",
            "hospital_surge_updated",
            "global_surge_updated",
        ],
        snapshot: &[
            "initial_surge_data",
            "hospital_surges_initial",
            "regional_surges_initial",
        ],
    };

    /// Bed-space aliases.
    pub const BEDSPACE: Self = Self {
        family: EntityFamily::Bedspace,
        created: &["bedspace_created", "bedSpaceCreated", "bedspace.created"],
        updated: &[
            "bedspace_updated",
            "bedSpaceUpdated",
            "bedspace.updated",
            "hospital_bedspace_updated",
        ],
        snapshot: &[
            "initial_bedspace_data",
            "initialBedspaceData",
            "hospital_bedspaces_initial",
        ],
    };

    fn resolve(&self, name: &str) -> Option<EventKind> {
        if self.created.contains(&name) {
            Some(EventKind::Created)
        } else if self.updated.contains(&name) {
            Some(EventKind::Updated)
        } else if self.snapshot.contains(&name) {
            Some(EventKind::Snapshot)
        } else {
            None
        }
    }
}

// =============================================================================
// Normalizer
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Strategy {
    CollectionKey,
    DataCollectionKey,
    SingularKey,
    EntityField,
    DataSingularKey,
    DataEntityField,
    Array,
    Bare,
}

const SNAPSHOT_STRATEGIES: &[Strategy] = &[
    Strategy::CollectionKey,
    Strategy::DataCollectionKey,
    Strategy::SingularKey,
    Strategy::EntityField,
    Strategy::DataSingularKey,
    Strategy::DataEntityField,
    Strategy::Array,
    Strategy::Bare,
];

const RECORD_STRATEGIES: &[Strategy] = &[
    Strategy::SingularKey,
    Strategy::EntityField,
    Strategy::DataSingularKey,
    Strategy::DataEntityField,
    Strategy::Array,
    Strategy::Bare,
];

/// Classifies raw gateway events.
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    profiles: Vec<FamilyProfile>,
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new(vec![FamilyProfile::SURGE, FamilyProfile::BEDSPACE])
    }
}

impl EventNormalizer {
    /// Create a normalizer over the given family profiles.
    #[must_use]
    pub const fn new(profiles: Vec<FamilyProfile>) -> Self {
        Self { profiles }
    }

    /// Resolve a raw name to its kind and family, if it is a known alias.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<(EventKind, EntityFamily)> {
        self.profiles
            .iter()
            .find_map(|profile| profile.resolve(name).map(|kind| (kind, profile.family)))
    }

    /// Classify a raw event.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::NoEntity`] when a known created, updated or
    /// snapshot event carries no extractable record.
    pub fn classify(&self, name: &str, payload: Value) -> Result<NormalizedEvent, NormalizeError> {
        let Some((kind, family)) = self.resolve(name) else {
            let hospital_id = payload_hospital_id(&payload);
            return Ok(NormalizedEvent {
                kind: EventKind::Broadcast,
                family: None,
                entities: Vec::new(),
                hospital_id,
                raw_event_name: name.to_string(),
                payload,
                timestamp: Utc::now(),
            });
        };

        let strategies = if kind == EventKind::Snapshot {
            SNAPSHOT_STRATEGIES
        } else {
            RECORD_STRATEGIES
        };

        let entities = strategies
            .iter()
            .find_map(|strategy| extract(*strategy, family, kind, &payload))
            .ok_or_else(|| NormalizeError::NoEntity {
                event: name.to_string(),
            })?;

        let hospital_id = payload_hospital_id(&payload)
            .or_else(|| entities.first().and_then(Entity::hospital_id));

        Ok(NormalizedEvent {
            kind,
            family: Some(family),
            entities,
            hospital_id,
            raw_event_name: name.to_string(),
            payload,
            timestamp: Utc::now(),
        })
    }
}

fn extract(
    strategy: Strategy,
    family: EntityFamily,
    kind: EventKind,
    payload: &Value,
) -> Option<Vec<Entity>> {
    let snapshot = kind == EventKind::Snapshot;
    match strategy {
        Strategy::CollectionKey => payload
            .get(family.collection_key())
            .and_then(|v| from_array(v, true)),
        Strategy::DataCollectionKey => payload
            .get("data")
            .and_then(|d| d.get(family.collection_key()))
            .and_then(|v| from_array(v, true)),
        Strategy::SingularKey => payload
            .get(family.singular_key())
            .and_then(|v| from_any(v, snapshot)),
        Strategy::EntityField => payload.get("entity").and_then(|v| from_any(v, snapshot)),
        Strategy::DataSingularKey => payload
            .get("data")
            .and_then(|d| d.get(family.singular_key()))
            .and_then(|v| from_any(v, snapshot)),
        Strategy::DataEntityField => payload
            .get("data")
            .and_then(|d| d.get("entity"))
            .and_then(|v| from_any(v, snapshot)),
        Strategy::Array => from_array(payload, snapshot),
        Strategy::Bare => Entity::from_value(payload).map(|e| vec![e]),
    }
}

fn from_any(value: &Value, allow_empty: bool) -> Option<Vec<Entity>> {
    if value.is_array() {
        from_array(value, allow_empty)
    } else {
        Entity::from_value(value).map(|e| vec![e])
    }
}

/// Records from an array, skipping items without identity.
///
/// An empty result only counts when `allow_empty` is set (snapshots).
fn from_array(value: &Value, allow_empty: bool) -> Option<Vec<Entity>> {
    let items = value.as_array()?;
    let entities: Vec<Entity> = items
        .iter()
        .filter_map(|item| {
            let entity = Entity::from_value(item);
            if entity.is_none() {
                tracing::warn!(item = %item, "Skipping array item without identity");
            }
            entity
        })
        .collect();

    if entities.is_empty() && !allow_empty {
        None
    } else {
        Some(entities)
    }
}

fn payload_hospital_id(payload: &Value) -> Option<String> {
    payload
        .get("hospitalId")
        .and_then(scalar_string)
        .or_else(|| {
            payload
                .get("data")
                .and_then(|d| d.get("hospitalId"))
                .and_then(scalar_string)
        })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case("surge_created", EventKind::Created ; "surge_created")]
    #[test_case("new_surge", EventKind::Created ; "new_surge")]
    #[test_case("surge.created", EventKind::Created ; "dotted created")]
    #[test_case("hospital_surge_created", EventKind::Created ; "hospital created")]
    #[test_case("regional_surge_created", EventKind::Created ; "regional created")]
    #[test_case("emergency_surge", EventKind::Created ; "emergency_surge")]
    #[test_case("global_surge_created", EventKind::Created ; "global created")]
    #[test_case("surge_updated", EventKind::Updated ; "surge_updated")]
    #[test_case("surge.updated", EventKind::Updated ; "dotted updated")]
    #[test_case("hospital_surge_updated", EventKind::Updated ; "hospital updated")]
    #[test_case("global_surge_updated", EventKind::Updated ; "global updated")]
    #[test_case("initial_surge_data", EventKind::Snapshot ; "initial data")]
    #[test_case("hospital_surges_initial", EventKind::Snapshot ; "hospital initial")]
    #[test_case("regional_surges_initial", EventKind::Snapshot ; "regional initial")]
    fn surge_aliases(name: &str, expected: EventKind) {
        let normalizer = EventNormalizer::default();
        assert_eq!(
            normalizer.resolve(name),
            Some((expected, EntityFamily::Surge))
        );
    }

    #[test_case("bedspace_created", EventKind::Created ; "snake created")]
    #[test_case("bedSpaceCreated", EventKind::Created ; "camel created")]
    #[test_case("bedspace.created", EventKind::Created ; "dotted created")]
    #[test_case("bedspace_updated", EventKind::Updated ; "snake updated")]
    #[test_case("bedSpaceUpdated", EventKind::Updated ; "camel updated")]
    #[test_case("bedspace.updated", EventKind::Updated ; "dotted updated")]
    #[test_case("hospital_bedspace_updated", EventKind::Updated ; "hospital updated")]
    #[test_case("initial_bedspace_data", EventKind::Snapshot ; "initial data")]
    #[test_case("initialBedspaceData", EventKind::Snapshot ; "camel initial")]
    #[test_case("hospital_bedspaces_initial", EventKind::Snapshot ; "hospital initial")]
    fn bedspace_aliases(name: &str, expected: EventKind) {
        let normalizer = EventNormalizer::default();
        assert_eq!(
            normalizer.resolve(name),
            Some((expected, EntityFamily::Bedspace))
        );
    }

    #[test_case("notification" ; "notification")]
    #[test_case("system_update" ; "system update")]
    #[test_case("hospital_status_changed" ; "status changed")]
    #[test_case("emergencyAlert" ; "emergency alert")]
    #[test_case("welcome" ; "welcome")]
    fn unknown_names_are_broadcast(name: &str) {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify(name, json!({ "hospitalId": "h9", "message": "hi" }))
            .unwrap();
        assert_eq!(event.kind, EventKind::Broadcast);
        assert_eq!(event.family, None);
        assert!(event.entities.is_empty());
        assert_eq!(event.hospital_id.as_deref(), Some("h9"));
        assert_eq!(event.payload["message"], "hi");
    }

    #[test]
    fn dotted_surge_created_with_singular_key() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify(
                "surge.created",
                json!({ "surge": { "_id": "s1", "hospital": "h1" } }),
            )
            .unwrap();

        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(event.entity().unwrap().id(), "s1");
        assert_eq!(event.hospital_id.as_deref(), Some("h1"));
        assert_eq!(event.raw_event_name, "surge.created");
    }

    #[test]
    fn entity_field_strategy() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify("surge_updated", json!({ "entity": { "_id": "s2" } }))
            .unwrap();
        assert_eq!(event.entity().unwrap().id(), "s2");
    }

    #[test]
    fn data_entity_strategy() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify(
                "surge_updated",
                json!({ "data": { "entity": { "id": "s3" }, "hospitalId": "h4" } }),
            )
            .unwrap();
        assert_eq!(event.entity().unwrap().id(), "s3");
        assert_eq!(event.hospital_id.as_deref(), Some("h4"));
    }

    #[test]
    fn array_payload_yields_all_records() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify(
                "bedspace_updated",
                json!([{ "_id": "b1" }, { "nope": true }, { "_id": "b2" }]),
            )
            .unwrap();
        let ids: Vec<_> = event.entities.iter().map(Entity::id).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[test]
    fn bare_record_payload() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify(
                "bedSpaceUpdated",
                json!({ "_id": "b1", "availableBeds": 3, "hospitalId": "h1" }),
            )
            .unwrap();
        assert_eq!(event.entity().unwrap().available_beds(), Some(3));
        assert_eq!(event.hospital_id.as_deref(), Some("h1"));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        let normalizer = EventNormalizer::default();
        let err = normalizer
            .classify("surge_created", json!({ "unknownShape": true }))
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::NoEntity {
                event: "surge_created".to_string()
            }
        );
    }

    #[test]
    fn created_with_empty_array_is_rejected() {
        let normalizer = EventNormalizer::default();
        assert!(normalizer.classify("new_surge", json!([])).is_err());
    }

    #[test]
    fn snapshot_from_collection_key() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify(
                "hospital_surges_initial",
                json!({ "hospitalId": "h1", "surges": [{ "_id": "a" }, { "_id": "b" }] }),
            )
            .unwrap();
        assert_eq!(event.kind, EventKind::Snapshot);
        assert_eq!(event.entities.len(), 2);
        assert_eq!(event.hospital_id.as_deref(), Some("h1"));
    }

    #[test]
    fn snapshot_from_nested_collection_key() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify(
                "initialBedspaceData",
                json!({ "data": { "bedspaces": [{ "_id": "b" }] } }),
            )
            .unwrap();
        assert_eq!(event.family, Some(EntityFamily::Bedspace));
        assert_eq!(event.entities.len(), 1);
    }

    #[test]
    fn empty_snapshot_is_valid() {
        let normalizer = EventNormalizer::default();
        let event = normalizer
            .classify("initial_surge_data", json!({ "surges": [] }))
            .unwrap();
        assert_eq!(event.kind, EventKind::Snapshot);
        assert!(event.entities.is_empty());

        let bare = normalizer.classify("initial_surge_data", json!([])).unwrap();
        assert!(bare.entities.is_empty());
    }

    #[test]
    fn snapshot_without_records_is_rejected() {
        let normalizer = EventNormalizer::default();
        assert!(
            normalizer
                .classify("initial_surge_data", json!({ "unknownShape": true }))
                .is_err()
        );
    }
}
