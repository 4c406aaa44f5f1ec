//! Modifier aggregation.
//!
//! Combines the live initiative stat, weapon bonus, operator modifier,
//! selected actions, dice, and carry-over into one signed total:
//!
//! - normal: `stat + weapon + manual + action + dice`
//! - carrying: `stat + weapon + action + base * rounds + dice`
//!
//! The manual modifier is left out while carrying; it already went into the
//! deferred penalty effect on the round it was entered.

use crate::catalog::Catalog;
use crate::combatant::Combatant;
use crate::config::NegotiationConfig;
use crate::state::NegotiationState;
use serde::{Deserialize, Serialize};

/// Every contribution to one initiative total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModifierBreakdown {
    pub stat: i32,
    pub weapon_mod: i32,
    /// Manual modifier as applied; 0 in the carry branch.
    pub manual_modifier: i32,
    pub action_mod: i32,
    /// `base_initiative * moved_action_rounds`, 0 unless carrying.
    pub carry_bonus: i32,
    pub dice: i32,
    pub carrying: bool,
    pub total: i32,
}

impl ModifierBreakdown {
    /// Everything except the stat and dice, as shown to the operator.
    pub fn modifier_sum(&self) -> i32 {
        clamped_sum([self.weapon_mod, self.manual_modifier, self.action_mod, self.carry_bonus])
    }
}

/// Sum exactly, then clamp into the i32 range.
pub(crate) fn clamped_sum(values: impl IntoIterator<Item = i32>) -> i32 {
    let sum: i64 = values.into_iter().map(i64::from).sum();
    sum.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Initiative bonus of the selected weapon, 0 when none resolves.
pub fn weapon_modifier(state: &NegotiationState, catalog: &Catalog) -> i32 {
    state
        .selected_weapon_id
        .as_deref()
        .and_then(|id| catalog.weapon(id))
        .map(|w| w.ini_mod())
        .unwrap_or(0)
}

/// The slowest selected action gates speed: the minimum `ini_mod`, not the
/// sum. 0 with nothing selected.
pub fn action_modifier(state: &NegotiationState, catalog: &Catalog) -> i32 {
    catalog
        .resolve_actions(&state.selected_action_ids)
        .iter()
        .map(|a| a.ini_mod)
        .min()
        .unwrap_or(0)
}

/// Break a total down into its contributions.
pub fn breakdown(entry: &Combatant, state: &NegotiationState, catalog: &Catalog) -> ModifierBreakdown {
    let weapon_mod = weapon_modifier(state, catalog);
    let action_mod = action_modifier(state, catalog);
    let dice = state.dice_contribution();
    let carrying = state.moved_action && state.moved_action_rounds > 0;

    let (manual_modifier, carry_bonus) = if carrying {
        let rounds = i32::try_from(state.moved_action_rounds).unwrap_or(i32::MAX);
        (0, entry.base_initiative.saturating_mul(rounds))
    } else {
        (state.manual_modifier, 0)
    };

    let total = clamped_sum([
        entry.current_initiative_stat,
        weapon_mod,
        manual_modifier,
        action_mod,
        carry_bonus,
        dice,
    ]);

    ModifierBreakdown {
        stat: entry.current_initiative_stat,
        weapon_mod,
        manual_modifier,
        action_mod,
        carry_bonus,
        dice,
        carrying,
        total,
    }
}

/// Total initiative for one combatant.
pub fn compute_total_initiative(entry: &Combatant, state: &NegotiationState, catalog: &Catalog) -> i32 {
    breakdown(entry, state, catalog).total
}

/// Attack and defense deltas of this round: the free modifiers, plus the
/// selected actions, minus the combined action penalty.
pub fn combat_deltas(
    state: &NegotiationState,
    catalog: &Catalog,
    config: &NegotiationConfig,
) -> (i32, i32) {
    let actions = catalog.resolve_actions(&state.selected_action_ids);
    let penalty = if state.combined_action {
        config.combined_action_penalty
    } else {
        0
    };
    let attack = clamped_sum(
        std::iter::once(state.attack_modifier)
            .chain(actions.iter().map(|a| a.attack_mod))
            .chain(std::iter::once(penalty.saturating_neg())),
    );
    let defense = clamped_sum(
        std::iter::once(state.defense_modifier)
            .chain(actions.iter().map(|a| a.defense_mod))
            .chain(std::iter::once(penalty.saturating_neg())),
    );
    (attack, defense)
}
