//! Per-combatant negotiation state.
//!
//! `NegotiationState` is the only mutable artifact that survives a session
//! being closed and reopened. Operator input lands here; the aggregator and
//! the carry state machine read it.

use crate::carry::CarryState;
use crate::catalog::parse_int;
use crate::dice::{dice_contribution, DiceCount, DiceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from operator input and commit gating.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("At most {max} actions can be selected")]
    TooManyActions { max: usize },

    #[error("Roll initiative before committing")]
    NotRolled,

    #[error("Initiative already rolled this round")]
    AlreadyRolled,

    #[error("Choose one of the two dice before committing")]
    DiceNotSelected,

    #[error(transparent)]
    Dice(#[from] DiceError),
}

/// Mutable negotiation input for one combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NegotiationState {
    /// Free-form operator modifier.
    pub manual_modifier: i32,
    pub attack_modifier: i32,
    pub defense_modifier: i32,
    /// Declares a combined action, penalizing attack and defense.
    pub combined_action: bool,
    /// Ordered selection of catalog action ids.
    pub selected_action_ids: Vec<String>,
    pub dice_count: DiceCount,
    pub dice_results: Vec<u32>,
    pub selected_dice_index: Option<usize>,
    pub has_rolled: bool,
    /// Player-only weapon pick.
    pub selected_weapon_id: Option<String>,
    /// Set once the combatant's initiative went negative.
    pub moved_action: bool,
    /// Additional rounds the moved action stayed unresolved.
    pub moved_action_rounds: u32,
}

impl NegotiationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse operator text into the manual modifier; garbage becomes 0.
    pub fn set_manual_modifier_text(&mut self, input: &str) {
        self.manual_modifier = parse_int(input);
    }

    pub fn set_manual_modifier(&mut self, value: i32) {
        self.manual_modifier = value;
    }

    pub fn set_attack_modifier(&mut self, value: i32) {
        self.attack_modifier = value;
    }

    pub fn set_defense_modifier(&mut self, value: i32) {
        self.defense_modifier = value;
    }

    pub fn set_combined_action(&mut self, combined: bool) {
        self.combined_action = combined;
    }

    /// Add an action to the selection. Selecting an already selected
    /// action is a no-op.
    pub fn select_action(&mut self, id: impl Into<String>, max: usize) -> Result<(), StateError> {
        let id = id.into();
        if self.selected_action_ids.contains(&id) {
            return Ok(());
        }
        if self.selected_action_ids.len() >= max {
            return Err(StateError::TooManyActions { max });
        }
        self.selected_action_ids.push(id);
        Ok(())
    }

    pub fn deselect_action(&mut self, id: &str) {
        self.selected_action_ids.retain(|a| a != id);
    }

    pub fn select_weapon(&mut self, id: Option<String>) {
        self.selected_weapon_id = id;
    }

    /// Switch between one and two dice. Changing the count discards a
    /// previous roll.
    pub fn set_dice_count(&mut self, count: DiceCount) {
        if self.dice_count != count {
            self.dice_count = count;
            self.clear_roll();
        }
    }

    /// Store freshly rolled dice.
    pub fn record_roll(&mut self, results: Vec<u32>) {
        self.dice_results = results;
        self.selected_dice_index = None;
        self.has_rolled = true;
    }

    /// Pick which of two rolled dice counts.
    pub fn select_die(&mut self, index: usize) -> Result<(), StateError> {
        if !self.has_rolled {
            return Err(DiceError::NotRolled.into());
        }
        let rolled = self.dice_results.len();
        if rolled < 2 {
            return Err(DiceError::NoChoice(rolled).into());
        }
        if index >= rolled {
            return Err(DiceError::IndexOutOfRange { index, rolled }.into());
        }
        self.selected_dice_index = Some(index);
        Ok(())
    }

    /// Value the current roll adds to initiative.
    pub fn dice_contribution(&self) -> i32 {
        if !self.has_rolled {
            return 0;
        }
        dice_contribution(&self.dice_results, self.selected_dice_index)
    }

    /// Check the commit gate: rolled, and a die picked when two were rolled.
    pub fn commit_gate(&self) -> Result<(), StateError> {
        if !self.has_rolled {
            return Err(StateError::NotRolled);
        }
        if self.dice_count.requires_selection() && self.selected_dice_index.is_none() {
            return Err(StateError::DiceNotSelected);
        }
        Ok(())
    }

    pub fn carry_state(&self) -> CarryState {
        CarryState::from_flags(self.moved_action, self.moved_action_rounds)
    }

    pub fn set_carry_state(&mut self, carry: CarryState) {
        let (moved, rounds) = carry.to_flags();
        self.moved_action = moved;
        self.moved_action_rounds = rounds;
    }

    /// Prepare for the next round while an action is still carried:
    /// the manual modifier and the roll go back to neutral.
    pub fn reset_for_next_round(&mut self) {
        self.manual_modifier = 0;
        self.clear_roll();
    }

    /// Forget everything, including carry-over.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Check the structural invariants.
    pub fn is_consistent(&self, max_actions: usize) -> bool {
        let actions_ok = self.selected_action_ids.len() <= max_actions;
        let carry_ok = self.moved_action_rounds == 0 || self.moved_action;
        let dice_ok = self.dice_results.is_empty() || self.dice_results.len() == self.dice_count.count();
        actions_ok && carry_ok && dice_ok
    }

    fn clear_roll(&mut self) {
        self.dice_results.clear();
        self.selected_dice_index = None;
        self.has_rolled = false;
    }
}
