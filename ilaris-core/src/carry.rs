//! Round carry-over of unresolved actions.
//!
//! A combatant whose initiative total goes negative has not finished its
//! action this round. The action is carried: each further round adds the
//! base initiative once more, and a deferred penalty effect keeps the
//! operator's modifiers alive until the action resolves.
//!
//! Resolution follows an intent/effect split: [`resolve_round`] is pure and
//! describes what should change as [`EffectMutation`]s; the session (or
//! [`apply_mutations`] for in-memory collections) carries them out.

use crate::catalog::Catalog;
use crate::combatant::{Combatant, CombatantId};
use crate::config::NegotiationConfig;
use crate::modifiers::{breakdown, combat_deltas, ModifierBreakdown};
use crate::state::NegotiationState;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Unique identifier for deferred penalty effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(pub Uuid);

impl EffectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Carry state
// ============================================================================

/// Whether a combatant has an action in progress across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CarryState {
    #[default]
    Idle,
    /// Unresolved for this many rounds, always at least 1.
    Carrying(u32),
}

impl CarryState {
    /// Read the persisted flag pair. A zero round count means idle.
    pub fn from_flags(moved_action: bool, rounds: u32) -> Self {
        if moved_action && rounds > 0 {
            CarryState::Carrying(rounds)
        } else {
            CarryState::Idle
        }
    }

    pub fn to_flags(self) -> (bool, u32) {
        match self {
            CarryState::Idle => (false, 0),
            CarryState::Carrying(n) => (true, n),
        }
    }

    /// State after another negative round.
    pub fn advance(self) -> Self {
        match self {
            CarryState::Idle => CarryState::Carrying(1),
            CarryState::Carrying(n) => CarryState::Carrying(n.saturating_add(1)),
        }
    }

    pub fn rounds(self) -> u32 {
        match self {
            CarryState::Idle => 0,
            CarryState::Carrying(n) => n,
        }
    }

    pub fn is_carrying(self) -> bool {
        matches!(self, CarryState::Carrying(_))
    }
}

impl fmt::Display for CarryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarryState::Idle => write!(f, "idle"),
            CarryState::Carrying(n) => write!(f, "carrying ({n} rounds)"),
        }
    }
}

// ============================================================================
// Deferred penalty effect
// ============================================================================

/// A time-boxed modifier attached to a combatant, holding the penalties of
/// a negative-initiative turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredPenaltyEffect {
    pub id: EffectId,
    pub combatant: CombatantId,
    pub label: String,
    pub initiative_delta: i32,
    pub attack_delta: i32,
    pub defense_delta: i32,
    pub duration_rounds: u32,
    /// Created by a negative round and still accumulating. Effects left by
    /// a resolved round are never updated in place.
    #[serde(default)]
    pub carried: bool,
}

impl DeferredPenaltyEffect {
    pub fn new(
        combatant: CombatantId,
        label: impl Into<String>,
        initiative_delta: i32,
        attack_delta: i32,
        defense_delta: i32,
        duration_rounds: u32,
    ) -> Self {
        Self {
            id: EffectId::new(),
            combatant,
            label: label.into(),
            initiative_delta,
            attack_delta,
            defense_delta,
            duration_rounds,
            carried: false,
        }
    }

    /// Mark as the carry effect of an unresolved action.
    pub fn carrying(mut self) -> Self {
        self.carried = true;
        self
    }

    /// Whether any delta is non-zero.
    pub fn has_deltas(&self) -> bool {
        self.initiative_delta != 0 || self.attack_delta != 0 || self.defense_delta != 0
    }

    /// Count down one round. Returns true once expired.
    pub fn tick(&mut self) -> bool {
        self.duration_rounds = self.duration_rounds.saturating_sub(1);
        self.duration_rounds == 0
    }
}

/// A change to a combatant's effect collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectMutation {
    Create(DeferredPenaltyEffect),
    Update(DeferredPenaltyEffect),
    Delete {
        combatant: CombatantId,
        effect: EffectId,
    },
}

impl EffectMutation {
    pub fn combatant(&self) -> &CombatantId {
        match self {
            EffectMutation::Create(e) | EffectMutation::Update(e) => &e.combatant,
            EffectMutation::Delete { combatant, .. } => combatant,
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Everything one commit decides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub breakdown: ModifierBreakdown,
    pub total: i32,
    /// `total` plus the player tie-break.
    pub turn_order_value: f64,
    pub attack_delta: i32,
    pub defense_delta: i32,
    pub previous: CarryState,
    pub carry: CarryState,
    pub mutations: Vec<EffectMutation>,
    /// State to persist for the next round.
    pub next_state: NegotiationState,
}

impl RoundOutcome {
    pub fn is_negative(&self) -> bool {
        self.total < 0
    }
}

/// Turn-order value of a total; players win ties against creatures.
pub fn turn_order_value(entry: &Combatant, total: i32, config: &NegotiationConfig) -> f64 {
    if entry.is_player() {
        total as f64 + config.player_tie_break
    } else {
        total as f64
    }
}

/// Run one commit through the carry state machine.
///
/// `existing` is the combatant's current deferred penalty effect, if any.
pub fn resolve_round(
    entry: &Combatant,
    state: &NegotiationState,
    catalog: &Catalog,
    existing: Option<&DeferredPenaltyEffect>,
    config: &NegotiationConfig,
) -> RoundOutcome {
    let breakdown = breakdown(entry, state, catalog);
    let total = breakdown.total;
    let (attack_delta, defense_delta) = combat_deltas(state, catalog, config);
    let dice = breakdown.dice;
    let previous = state.carry_state();
    let mut mutations = Vec::new();

    let (carry, next_state) = if total < 0 {
        let carry = previous.advance();

        match existing.filter(|e| e.carried) {
            Some(effect) => {
                let mut updated = effect.clone();
                updated.initiative_delta = updated.initiative_delta.saturating_add(dice);
                updated.duration_rounds = config.carry_duration_rounds;
                mutations.push(EffectMutation::Update(updated));
            }
            None => {
                let effect = DeferredPenaltyEffect::new(
                    entry.id.clone(),
                    &config.effect_label,
                    state.manual_modifier.saturating_add(dice),
                    attack_delta,
                    defense_delta,
                    config.carry_duration_rounds,
                )
                .carrying();
                if effect.has_deltas() {
                    mutations.push(EffectMutation::Create(effect));
                }
            }
        }

        let mut next = state.clone();
        next.set_carry_state(carry);
        next.reset_for_next_round();
        (carry, next)
    } else {
        if let Some(effect) = existing {
            mutations.push(EffectMutation::Delete {
                combatant: entry.id.clone(),
                effect: effect.id,
            });
        }

        let effect = DeferredPenaltyEffect::new(
            entry.id.clone(),
            &config.effect_label,
            state.manual_modifier.saturating_add(dice),
            attack_delta,
            defense_delta,
            config.resolved_duration_rounds,
        );
        if effect.has_deltas() {
            mutations.push(EffectMutation::Create(effect));
        }

        (CarryState::Idle, NegotiationState::default())
    };

    debug!(
        combatant = %entry.id,
        total,
        from = %previous,
        to = %carry,
        mutations = mutations.len(),
        "Resolved initiative round"
    );

    RoundOutcome {
        breakdown,
        total,
        turn_order_value: turn_order_value(entry, total, config),
        attack_delta,
        defense_delta,
        previous,
        carry,
        mutations,
        next_state,
    }
}

/// Apply mutations to an in-memory effect collection. Updates and deletes
/// of effects that are no longer present are skipped.
pub fn apply_mutations(effects: &mut Vec<DeferredPenaltyEffect>, mutations: &[EffectMutation]) {
    for mutation in mutations {
        apply_mutation(effects, mutation);
    }
}

/// Apply a single mutation to an in-memory effect collection.
pub fn apply_mutation(effects: &mut Vec<DeferredPenaltyEffect>, mutation: &EffectMutation) {
    match mutation {
        EffectMutation::Create(effect) => effects.push(effect.clone()),
        EffectMutation::Update(effect) => {
            match effects.iter_mut().find(|e| e.id == effect.id) {
                Some(slot) => *slot = effect.clone(),
                None => debug!(effect = %effect.id, "Skipping update of missing effect"),
            }
        }
        EffectMutation::Delete { effect, .. } => effects.retain(|e| e.id != *effect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NegotiationConfig {
        NegotiationConfig::default()
    }

    fn rolled(manual: i32, die: u32) -> NegotiationState {
        let mut state = NegotiationState::new();
        state.set_manual_modifier(manual);
        state.record_roll(vec![die]);
        state
    }

    #[test]
    fn test_carry_state_flags() {
        assert_eq!(CarryState::from_flags(false, 0), CarryState::Idle);
        assert_eq!(CarryState::from_flags(true, 0), CarryState::Idle);
        assert_eq!(CarryState::from_flags(true, 3), CarryState::Carrying(3));
        assert_eq!(CarryState::Carrying(3).to_flags(), (true, 3));
        assert_eq!(CarryState::Idle.advance(), CarryState::Carrying(1));
        assert_eq!(CarryState::Carrying(1).advance(), CarryState::Carrying(2));
    }

    #[test]
    fn test_non_negative_creates_short_effect() {
        let entry = Combatant::player("p", "Alrik", 8).with_current_initiative(10);
        let outcome = resolve_round(&entry, &rolled(-2, 4), &Catalog::new(), None, &config());

        assert_eq!(outcome.total, 12);
        assert_eq!(outcome.carry, CarryState::Idle);
        assert!(!outcome.next_state.moved_action);
        assert_eq!(outcome.next_state, NegotiationState::default());
        assert_eq!(outcome.mutations.len(), 1);
        match &outcome.mutations[0] {
            EffectMutation::Create(e) => {
                assert_eq!(e.initiative_delta, 2);
                assert_eq!(e.duration_rounds, 1);
            }
            other => panic!("unexpected mutation {other:?}"),
        }
        assert!((outcome.turn_order_value - 12.1).abs() < 1e-9);
    }

    #[test]
    fn test_zero_deltas_create_nothing() {
        let entry = Combatant::creature("c", "Wolf", 8);
        let mut state = NegotiationState::new();
        state.record_roll(vec![0]);
        let outcome = resolve_round(&entry, &state, &Catalog::new(), None, &config());
        assert!(outcome.mutations.is_empty());
        assert_eq!(outcome.turn_order_value, 8.0);
    }

    #[test]
    fn test_negative_creates_carry_effect() {
        let entry = Combatant::player("p", "Alrik", 8).with_current_initiative(10);
        let mut state = rolled(-20, 4);
        state.set_combined_action(true);
        let outcome = resolve_round(&entry, &state, &Catalog::new(), None, &config());

        assert_eq!(outcome.total, -6);
        assert_eq!(outcome.carry, CarryState::Carrying(1));
        let next = &outcome.next_state;
        assert!(next.moved_action);
        assert_eq!(next.moved_action_rounds, 1);
        assert_eq!(next.manual_modifier, 0);
        assert!(!next.has_rolled);
        assert!(next.combined_action);

        match &outcome.mutations[..] {
            [EffectMutation::Create(e)] => {
                assert_eq!(e.initiative_delta, -16);
                assert_eq!(e.attack_delta, -4);
                assert_eq!(e.defense_delta, -4);
                assert_eq!(e.duration_rounds, 2);
                assert!(e.carried);
            }
            other => panic!("unexpected mutations {other:?}"),
        }
    }

    #[test]
    fn test_resolved_effect_is_not_accumulated() {
        let entry = Combatant::creature("c", "Wolf", 2).with_current_initiative(-30);
        let leftover = DeferredPenaltyEffect::new(entry.id.clone(), "Moved action", 5, 0, 0, 1);
        let outcome = resolve_round(&entry, &rolled(-1, 3), &Catalog::new(), Some(&leftover), &config());

        assert_eq!(outcome.carry, CarryState::Carrying(1));
        match &outcome.mutations[..] {
            [EffectMutation::Create(e)] => {
                assert_ne!(e.id, leftover.id);
                assert_eq!(e.initiative_delta, 2);
                assert!(e.carried);
            }
            other => panic!("unexpected mutations {other:?}"),
        }
    }

    #[test]
    fn test_extreme_deltas_saturate() {
        let entry = Combatant::creature("c", "Wolf", 2).with_current_initiative(i32::MIN);
        let existing = DeferredPenaltyEffect::new(entry.id.clone(), "Moved action", i32::MAX, 0, 0, 2)
            .carrying();
        let mut state = rolled(0, 6);
        state.set_carry_state(CarryState::Carrying(1));

        let outcome = resolve_round(&entry, &state, &Catalog::new(), Some(&existing), &config());
        match &outcome.mutations[..] {
            [EffectMutation::Update(e)] => assert_eq!(e.initiative_delta, i32::MAX),
            other => panic!("unexpected mutations {other:?}"),
        }

        let state = rolled(i32::MAX, 6);
        let entry = Combatant::creature("c", "Wolf", 2).with_current_initiative(i32::MIN);
        let outcome = resolve_round(&entry, &state, &Catalog::new(), None, &config());
        assert_eq!(outcome.total, i32::MIN + i32::MAX + 6);
        match &outcome.mutations[..] {
            [EffectMutation::Create(e)] => assert_eq!(e.initiative_delta, i32::MAX),
            other => panic!("unexpected mutations {other:?}"),
        }
    }

    #[test]
    fn test_negative_with_existing_effect_updates() {
        let entry = Combatant::creature("c", "Wolf", 2).with_current_initiative(-30);
        let existing =
            DeferredPenaltyEffect::new(entry.id.clone(), "Moved action", -16, 0, 0, 1).carrying();
        let mut state = rolled(0, 3);
        state.set_carry_state(CarryState::Carrying(1));

        let outcome = resolve_round(&entry, &state, &Catalog::new(), Some(&existing), &config());

        assert_eq!(outcome.carry, CarryState::Carrying(2));
        match &outcome.mutations[..] {
            [EffectMutation::Update(e)] => {
                assert_eq!(e.id, existing.id);
                assert_eq!(e.initiative_delta, -13);
                assert_eq!(e.duration_rounds, 2);
            }
            other => panic!("unexpected mutations {other:?}"),
        }
    }

    #[test]
    fn test_resolution_replaces_existing_effect() {
        let entry = Combatant::player("p", "Alrik", 8).with_current_initiative(10);
        let existing = DeferredPenaltyEffect::new(entry.id.clone(), "Moved action", -16, 0, 0, 2);
        let mut state = rolled(0, 3);
        state.set_carry_state(CarryState::Carrying(1));

        let outcome = resolve_round(&entry, &state, &Catalog::new(), Some(&existing), &config());

        assert_eq!(outcome.total, 10 + 8 + 3);
        assert_eq!(outcome.previous, CarryState::Carrying(1));
        assert_eq!(outcome.carry, CarryState::Idle);
        match &outcome.mutations[..] {
            [EffectMutation::Delete { effect, .. }, EffectMutation::Create(e)] => {
                assert_eq!(*effect, existing.id);
                assert_eq!(e.initiative_delta, 3);
                assert_eq!(e.duration_rounds, 1);
            }
            other => panic!("unexpected mutations {other:?}"),
        }
    }

    #[test]
    fn test_apply_mutations() {
        let combatant = CombatantId::from("p");
        let first = DeferredPenaltyEffect::new(combatant.clone(), "x", -3, 0, 0, 2);
        let mut effects = Vec::new();

        apply_mutations(&mut effects, &[EffectMutation::Create(first.clone())]);
        assert_eq!(effects.len(), 1);

        let mut changed = first.clone();
        changed.initiative_delta = -1;
        let ghost = DeferredPenaltyEffect::new(combatant.clone(), "ghost", 1, 0, 0, 1);
        apply_mutations(
            &mut effects,
            &[EffectMutation::Update(changed), EffectMutation::Update(ghost)],
        );
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].initiative_delta, -1);

        apply_mutations(
            &mut effects,
            &[EffectMutation::Delete {
                combatant,
                effect: first.id,
            }],
        );
        assert!(effects.is_empty());
    }

    #[test]
    fn test_effect_tick() {
        let mut effect = DeferredPenaltyEffect::new(CombatantId::from("p"), "x", 1, 0, 0, 2);
        assert!(!effect.tick());
        assert!(effect.tick());
        assert!(effect.tick());
        assert_eq!(effect.duration_rounds, 0);
    }
}
