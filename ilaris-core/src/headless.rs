//! In-memory host for programmatic use.
//!
//! `HeadlessHost` implements every host capability without a game client:
//! combatants, flags, effects, and turn-order values live in memory, and
//! announcements are collected instead of posted. It is meant for
//! - scripted encounters and tooling
//! - integration tests
//!
//! # Example
//!
//! ```ignore
//! use ilaris_core::headless::HeadlessHost;
//! use ilaris_core::session::{InitiativeSession, SessionLocks};
//! use ilaris_core::{Combatant, NegotiationConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = Arc::new(HeadlessHost::new());
//!     host.add_combatant(Combatant::player("alrik", "Alrik", 8)).await;
//!
//!     let locks = SessionLocks::new();
//!     let mut session =
//!         InitiativeSession::open(host.clone(), &locks, &"alrik".into(), NegotiationConfig::default())
//!             .await?;
//!     session.roll().await?;
//!     let result = session.commit().await?;
//!     println!("{}", result.summary);
//!     Ok(())
//! }
//! ```

use crate::carry::{DeferredPenaltyEffect, EffectId};
use crate::catalog::{CatalogError, ItemRecord};
use crate::combatant::{Combatant, CombatantId};
use crate::dice::ThreadRngDice;
use crate::host::{AnnouncementSink, CatalogSource, CombatantStore, DiceRoller, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// A posted announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub speaker: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct HostData {
    combatants: HashMap<CombatantId, Combatant>,
    flags: HashMap<(CombatantId, String), Value>,
    effects: HashMap<CombatantId, Vec<DeferredPenaltyEffect>>,
    turn_order: HashMap<CombatantId, f64>,
    inventories: HashMap<CombatantId, Vec<ItemRecord>>,
    /// `None` models a missing library pack.
    library: Option<Vec<ItemRecord>>,
    announcements: Vec<Announcement>,
    writes: usize,
}

impl HostData {
    fn require(&self, id: &CombatantId) -> Result<(), StoreError> {
        if self.combatants.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::CombatantNotFound(id.clone()))
        }
    }
}

/// In-memory implementation of every host capability.
#[derive(Debug)]
pub struct HeadlessHost<D = ThreadRngDice> {
    data: Mutex<HostData>,
    dice: D,
}

impl HeadlessHost<ThreadRngDice> {
    /// A host rolling real dice.
    pub fn new() -> Self {
        Self::with_dice(ThreadRngDice)
    }
}

impl Default for HeadlessHost<ThreadRngDice> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: DiceRoller> HeadlessHost<D> {
    /// A host with a custom randomness source.
    pub fn with_dice(dice: D) -> Self {
        Self {
            data: Mutex::new(HostData {
                library: Some(Vec::new()),
                ..Default::default()
            }),
            dice,
        }
    }

    pub async fn add_combatant(&self, combatant: Combatant) {
        let mut data = self.data.lock().await;
        data.combatants.insert(combatant.id.clone(), combatant);
    }

    /// Change a combatant's live initiative stat.
    pub async fn set_current_initiative(&self, id: &CombatantId, value: i32) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let combatant = data
            .combatants
            .get_mut(id)
            .ok_or_else(|| StoreError::CombatantNotFound(id.clone()))?;
        combatant.current_initiative_stat = value;
        Ok(())
    }

    /// Add an inventory record to a combatant.
    pub async fn give_item(&self, id: &CombatantId, item: ItemRecord) {
        let mut data = self.data.lock().await;
        data.inventories.entry(id.clone()).or_default().push(item);
    }

    /// Replace the shared action library.
    pub async fn set_library(&self, items: Vec<ItemRecord>) {
        self.data.lock().await.library = Some(items);
    }

    /// Make the shared action library unavailable.
    pub async fn remove_library(&self) {
        self.data.lock().await.library = None;
    }

    pub async fn effects(&self, id: &CombatantId) -> Vec<DeferredPenaltyEffect> {
        let data = self.data.lock().await;
        data.effects.get(id).cloned().unwrap_or_default()
    }

    pub async fn turn_order(&self, id: &CombatantId) -> Option<f64> {
        self.data.lock().await.turn_order.get(id).copied()
    }

    pub async fn flag(&self, id: &CombatantId, key: &str) -> Option<Value> {
        let data = self.data.lock().await;
        data.flags.get(&(id.clone(), key.to_string())).cloned()
    }

    pub async fn announcements(&self) -> Vec<Announcement> {
        self.data.lock().await.announcements.clone()
    }

    /// Number of document writes issued so far.
    pub async fn write_count(&self) -> usize {
        self.data.lock().await.writes
    }

    /// End a combat round: every effect loses a round, expired effects are
    /// removed and returned.
    pub async fn advance_round(&self) -> Vec<DeferredPenaltyEffect> {
        let mut data = self.data.lock().await;
        let mut expired = Vec::new();
        for effects in data.effects.values_mut() {
            let mut kept = Vec::with_capacity(effects.len());
            for mut effect in effects.drain(..) {
                if effect.tick() {
                    expired.push(effect);
                } else {
                    kept.push(effect);
                }
            }
            *effects = kept;
        }
        debug!(expired = expired.len(), "Advanced round");
        expired
    }
}

#[async_trait]
impl<D: DiceRoller> CombatantStore for HeadlessHost<D> {
    async fn combatant(&self, id: &CombatantId) -> Result<Combatant, StoreError> {
        let data = self.data.lock().await;
        data.combatants
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::CombatantNotFound(id.clone()))
    }

    async fn get_flag(&self, id: &CombatantId, key: &str) -> Result<Option<Value>, StoreError> {
        let data = self.data.lock().await;
        data.require(id)?;
        Ok(data.flags.get(&(id.clone(), key.to_string())).cloned())
    }

    async fn set_flag(&self, id: &CombatantId, key: &str, value: Value) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.require(id)?;
        data.flags.insert((id.clone(), key.to_string()), value);
        data.writes += 1;
        Ok(())
    }

    async fn unset_flag(&self, id: &CombatantId, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.require(id)?;
        data.flags.remove(&(id.clone(), key.to_string()));
        data.writes += 1;
        Ok(())
    }

    async fn deferred_effect(
        &self,
        id: &CombatantId,
        label: &str,
    ) -> Result<Option<DeferredPenaltyEffect>, StoreError> {
        let data = self.data.lock().await;
        data.require(id)?;
        let Some(effects) = data.effects.get(id) else {
            return Ok(None);
        };
        let mut labelled = effects.iter().filter(|e| e.label == label);
        let carried = labelled.clone().find(|e| e.carried);
        Ok(carried.or_else(|| labelled.next()).cloned())
    }

    async fn create_effect(&self, effect: DeferredPenaltyEffect) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.require(&effect.combatant)?;
        data.effects
            .entry(effect.combatant.clone())
            .or_default()
            .push(effect);
        data.writes += 1;
        Ok(())
    }

    async fn update_effect(&self, effect: DeferredPenaltyEffect) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.require(&effect.combatant)?;
        let slot = data
            .effects
            .get_mut(&effect.combatant)
            .and_then(|effects| effects.iter_mut().find(|e| e.id == effect.id))
            .ok_or_else(|| StoreError::EffectNotFound {
                combatant: effect.combatant.clone(),
                effect: effect.id,
            })?;
        *slot = effect;
        data.writes += 1;
        Ok(())
    }

    async fn delete_effect(&self, id: &CombatantId, effect: EffectId) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.require(id)?;
        let effects = data.effects.entry(id.clone()).or_default();
        let before = effects.len();
        effects.retain(|e| e.id != effect);
        if effects.len() == before {
            return Err(StoreError::EffectNotFound {
                combatant: id.clone(),
                effect,
            });
        }
        data.writes += 1;
        Ok(())
    }

    async fn set_turn_order(&self, id: &CombatantId, value: f64) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.require(id)?;
        data.turn_order.insert(id.clone(), value);
        data.writes += 1;
        Ok(())
    }
}

#[async_trait]
impl<D: DiceRoller> DiceRoller for HeadlessHost<D> {
    async fn roll_d6(&self) -> u32 {
        self.dice.roll_d6().await
    }
}

#[async_trait]
impl<D: DiceRoller> CatalogSource for HeadlessHost<D> {
    async fn owned_items(&self, id: &CombatantId) -> Result<Vec<ItemRecord>, CatalogError> {
        let data = self.data.lock().await;
        Ok(data.inventories.get(id).cloned().unwrap_or_default())
    }

    async fn action_library(&self) -> Result<Vec<ItemRecord>, CatalogError> {
        let data = self.data.lock().await;
        data.library
            .clone()
            .ok_or_else(|| CatalogError::LibraryUnavailable("no action library loaded".to_string()))
    }
}

#[async_trait]
impl<D: DiceRoller> AnnouncementSink for HeadlessHost<D> {
    async fn announce(&self, speaker: &str, message: &str) {
        let mut data = self.data.lock().await;
        data.announcements.push(Announcement {
            speaker: speaker.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_effect_crud() {
        let host = HeadlessHost::new();
        let id = CombatantId::from("p");
        host.add_combatant(Combatant::player("p", "Alrik", 8)).await;

        let mut effect = DeferredPenaltyEffect::new(id.clone(), "Moved action", -3, 0, 0, 2);
        host.create_effect(effect.clone()).await.unwrap();
        assert_eq!(
            host.deferred_effect(&id, "Moved action").await.unwrap(),
            Some(effect.clone())
        );

        effect.initiative_delta = -1;
        host.update_effect(effect.clone()).await.unwrap();
        assert_eq!(host.effects(&id).await[0].initiative_delta, -1);

        host.delete_effect(&id, effect.id).await.unwrap();
        assert!(host.effects(&id).await.is_empty());
        assert!(matches!(
            host.delete_effect(&id, effect.id).await,
            Err(StoreError::EffectNotFound { .. })
        ));
        assert_eq!(host.write_count().await, 3);
    }

    #[tokio::test]
    async fn test_deferred_effect_matches_label_and_prefers_carry() {
        let host = HeadlessHost::new();
        let id = CombatantId::from("p");
        host.add_combatant(Combatant::player("p", "Alrik", 8)).await;
        assert_eq!(host.deferred_effect(&id, "Moved action").await.unwrap(), None);

        let foreign = DeferredPenaltyEffect::new(id.clone(), "Blessing", 2, 0, 0, 3);
        let resolved = DeferredPenaltyEffect::new(id.clone(), "Moved action", 1, 0, 0, 1);
        let carry = DeferredPenaltyEffect::new(id.clone(), "Moved action", -5, 0, 0, 2).carrying();
        host.create_effect(foreign).await.unwrap();
        assert_eq!(host.deferred_effect(&id, "Moved action").await.unwrap(), None);

        host.create_effect(resolved.clone()).await.unwrap();
        assert_eq!(
            host.deferred_effect(&id, "Moved action").await.unwrap(),
            Some(resolved)
        );

        host.create_effect(carry.clone()).await.unwrap();
        assert_eq!(host.deferred_effect(&id, "Moved action").await.unwrap(), Some(carry));
    }

    #[tokio::test]
    async fn test_unknown_combatant() {
        let host = HeadlessHost::new();
        let id = CombatantId::from("ghost");
        assert!(matches!(
            host.combatant(&id).await,
            Err(StoreError::CombatantNotFound(_))
        ));
        assert!(host.set_turn_order(&id, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn test_advance_round_expires_effects() {
        let host = HeadlessHost::new();
        let id = CombatantId::from("p");
        host.add_combatant(Combatant::player("p", "Alrik", 8)).await;
        host.create_effect(DeferredPenaltyEffect::new(id.clone(), "short", 1, 0, 0, 1))
            .await
            .unwrap();
        host.create_effect(DeferredPenaltyEffect::new(id.clone(), "long", 1, 0, 0, 2))
            .await
            .unwrap();

        let expired = host.advance_round().await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].label, "short");

        let left = host.effects(&id).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].duration_rounds, 1);
    }

    #[tokio::test]
    async fn test_library_can_be_removed() {
        let host = HeadlessHost::new();
        assert!(host.action_library().await.unwrap().is_empty());
        host.remove_library().await;
        assert!(host.action_library().await.is_err());
    }
}
