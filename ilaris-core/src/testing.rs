//! Testing utilities for initiative negotiation.
//!
//! This module provides tools for integration testing:
//! - `ScriptedDice` for deterministic rolls
//! - `TestHarness` for scripted encounters on a `HeadlessHost`

use crate::catalog::ItemRecord;
use crate::combatant::{Combatant, CombatantId};
use crate::config::NegotiationConfig;
use crate::headless::HeadlessHost;
use crate::host::DiceRoller;
use crate::session::{InitiativeSession, MassInitiativeSession, SessionError, SessionLocks};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Dice that return queued values in order.
///
/// Clones share one queue, so values can be queued after the dice were
/// handed to a host. An empty queue rolls the fallback value.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    queue: Arc<Mutex<VecDeque<u32>>>,
    fallback: u32,
}

impl ScriptedDice {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: Arc::new(Mutex::new(values.into_iter().collect())),
            fallback: 1,
        }
    }

    /// Set the value rolled once the queue runs dry.
    pub fn with_fallback(mut self, value: u32) -> Self {
        self.fallback = value;
        self
    }

    /// Queue more values.
    pub fn push(&self, values: impl IntoIterator<Item = u32>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(values);
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for ScriptedDice {
    fn default() -> Self {
        Self::new([])
    }
}

#[async_trait]
impl DiceRoller for ScriptedDice {
    async fn roll_d6(&self) -> u32 {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

/// Test harness for running negotiation scenarios.
pub struct TestHarness {
    /// The in-memory host.
    pub host: Arc<HeadlessHost<ScriptedDice>>,
    /// Queue handle for the host's dice.
    pub dice: ScriptedDice,
    pub locks: SessionLocks,
    pub config: NegotiationConfig,
}

impl TestHarness {
    /// Create a harness with default rules and no combatants.
    pub fn new() -> Self {
        Self::with_config(NegotiationConfig::default())
    }

    pub fn with_config(config: NegotiationConfig) -> Self {
        let dice = ScriptedDice::default();
        Self {
            host: Arc::new(HeadlessHost::with_dice(dice.clone())),
            dice,
            locks: SessionLocks::new(),
            config,
        }
    }

    /// Add a combatant.
    pub async fn combatant(&self, combatant: Combatant) -> CombatantId {
        let id = combatant.id.clone();
        self.host.add_combatant(combatant).await;
        id
    }

    /// Add an inventory record to a combatant.
    pub async fn give(&self, id: &CombatantId, item: ItemRecord) -> &Self {
        self.host.give_item(id, item).await;
        self
    }

    /// Replace the shared action library.
    pub async fn library(&self, items: Vec<ItemRecord>) -> &Self {
        self.host.set_library(items).await;
        self
    }

    /// Queue dice values for upcoming rolls.
    pub fn expect_dice(&self, values: impl IntoIterator<Item = u32>) -> &Self {
        self.dice.push(values);
        self
    }

    /// Open a single-combatant session.
    pub async fn open(
        &self,
        id: &CombatantId,
    ) -> Result<InitiativeSession<HeadlessHost<ScriptedDice>>, SessionError> {
        InitiativeSession::open(Arc::clone(&self.host), &self.locks, id, self.config.clone()).await
    }

    /// Open a batch session.
    pub async fn open_batch(
        &self,
        ids: &[CombatantId],
    ) -> Result<MassInitiativeSession<HeadlessHost<ScriptedDice>>, SessionError> {
        MassInitiativeSession::open(Arc::clone(&self.host), &self.locks, ids, self.config.clone())
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_dice_order_and_fallback() {
        let dice = ScriptedDice::new([4, 2]).with_fallback(6);
        assert_eq!(dice.roll_d6().await, 4);

        let handle = dice.clone();
        handle.push([5]);
        assert_eq!(dice.remaining(), 2);
        assert_eq!(dice.roll_d6().await, 2);
        assert_eq!(dice.roll_d6().await, 5);
        assert_eq!(dice.roll_d6().await, 6);
    }

    #[tokio::test]
    async fn test_harness_rolls_scripted_values() {
        let harness = TestHarness::new();
        let id = harness.combatant(Combatant::player("p", "Alrik", 8)).await;
        harness.expect_dice([3]);

        let mut session = harness.open(&id).await.unwrap();
        assert_eq!(session.roll().await.unwrap(), vec![3]);
    }
}
