//! Domain Layer - Topics, entities and event normalization.
//!
//! Pure types and rules with no I/O: what can be subscribed to, how records
//! are identified and merged, and how raw gateway events map onto canonical
//! kinds.

/// Entity records and their reconciled collections.
pub mod entity;

/// Canonical events and the alias-driven normalizer.
pub mod events;

/// Subscription topic types.
pub mod subscription;
