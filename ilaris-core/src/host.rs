//! Capabilities the engine needs from its host.
//!
//! The engine never touches storage, randomness, or chat directly. A host
//! adapter implements these traits; [`crate::headless::HeadlessHost`] is a
//! complete in-memory implementation.

use crate::carry::{DeferredPenaltyEffect, EffectId};
use crate::catalog::{CatalogError, ItemRecord};
use crate::combatant::{Combatant, CombatantId};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors reported by a document store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Combatant not found: {0}")]
    CombatantNotFound(CombatantId),

    #[error("Effect {effect} not found on combatant {combatant}")]
    EffectNotFound {
        combatant: CombatantId,
        effect: EffectId,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Persistent documents: stat blocks, per-combatant flags, timed effects,
/// and turn-order values.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CombatantStore: Send + Sync {
    /// Read a combatant's stat snapshot.
    async fn combatant(&self, id: &CombatantId) -> Result<Combatant, StoreError>;

    /// Read a flag scoped to a combatant.
    async fn get_flag(&self, id: &CombatantId, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a flag scoped to a combatant.
    async fn set_flag(&self, id: &CombatantId, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove a flag scoped to a combatant.
    async fn unset_flag(&self, id: &CombatantId, key: &str) -> Result<(), StoreError>;

    /// The deferred penalty effect with this label attached to a combatant.
    /// A still-accumulating carry effect wins over a resolved one.
    async fn deferred_effect(
        &self,
        id: &CombatantId,
        label: &str,
    ) -> Result<Option<DeferredPenaltyEffect>, StoreError>;

    async fn create_effect(&self, effect: DeferredPenaltyEffect) -> Result<(), StoreError>;

    async fn update_effect(&self, effect: DeferredPenaltyEffect) -> Result<(), StoreError>;

    async fn delete_effect(&self, id: &CombatantId, effect: EffectId) -> Result<(), StoreError>;

    /// Submit a combatant's turn-order value.
    async fn set_turn_order(&self, id: &CombatantId, value: f64) -> Result<(), StoreError>;
}

/// Source of initiative dice.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiceRoller: Send + Sync {
    /// A uniformly distributed value in 1..=6.
    async fn roll_d6(&self) -> u32;
}

/// Records actions and weapons are drawn from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Records owned by the combatant.
    async fn owned_items(&self, id: &CombatantId) -> Result<Vec<ItemRecord>, CatalogError>;

    /// The shared, read-only action library.
    async fn action_library(&self) -> Result<Vec<ItemRecord>, CatalogError>;
}

/// Where human-readable results are posted. Fire-and-forget.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    async fn announce(&self, speaker: &str, message: &str);
}

/// Everything a negotiation session needs from its host.
pub trait SessionHost: CombatantStore + DiceRoller + CatalogSource + AnnouncementSink {}

impl<T> SessionHost for T where T: CombatantStore + DiceRoller + CatalogSource + AnnouncementSink {}
