//! Negotiation sessions - the primary public API.
//!
//! An [`InitiativeSession`] negotiates initiative for one combatant, a
//! [`MassInitiativeSession`] for a batch of them. Both load state through the
//! host, persist every operator change, gate commits on the roll, run the
//! carry state machine, write the resulting documents, and announce the
//! result.

use crate::carry::{resolve_round, EffectMutation, RoundOutcome};
use crate::catalog::{load_catalog, Catalog};
use crate::combatant::{Combatant, CombatantId};
use crate::config::NegotiationConfig;
use crate::dice::{dice_display, roll_pool, DiceCount};
use crate::host::{CombatantStore, SessionHost, StoreError};
use crate::modifiers::{breakdown, ModifierBreakdown};
use crate::persist::{self, PersistError};
use crate::state::{NegotiationState, StateError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Input(#[from] StateError),

    #[error("Combatant {0} already has an open negotiation")]
    CombatantBusy(CombatantId),

    #[error("Combatant {0} is not part of this negotiation")]
    UnknownCombatant(CombatantId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

impl SessionError {
    /// Whether this is a commit gate failure the operator can fix.
    pub fn is_gate(&self) -> bool {
        matches!(
            self,
            SessionError::Input(StateError::NotRolled | StateError::DiceNotSelected)
        )
    }
}

// ============================================================================
// Per-combatant locks
// ============================================================================

/// Registry of combatants with an open session.
///
/// Share one registry between every UI that can open sessions; a combatant
/// can only be held by one session at a time.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    held: Arc<Mutex<HashSet<CombatantId>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for a combatant, released when the guard drops.
    pub fn acquire(&self, id: &CombatantId) -> Result<CombatantLock, SessionError> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(id.clone()) {
            return Err(SessionError::CombatantBusy(id.clone()));
        }
        Ok(CombatantLock {
            id: id.clone(),
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, id: &CombatantId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

/// Guard for one combatant's session lock.
#[derive(Debug)]
pub struct CombatantLock {
    id: CombatantId,
    held: Arc<Mutex<HashSet<CombatantId>>>,
}

impl CombatantLock {
    pub fn combatant(&self) -> &CombatantId {
        &self.id
    }
}

impl Drop for CombatantLock {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

// ============================================================================
// Commit
// ============================================================================

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitResult {
    pub combatant: CombatantId,
    pub outcome: RoundOutcome,
    /// The announcement text that was posted.
    pub summary: String,
}

impl CommitResult {
    pub fn total(&self) -> i32 {
        self.outcome.total
    }
}

/// Format the announcement for a resolved round.
pub fn format_summary(
    combatant: &Combatant,
    state: &NegotiationState,
    catalog: &Catalog,
    outcome: &RoundOutcome,
    config: &NegotiationConfig,
) -> String {
    let b = &outcome.breakdown;
    let mut lines = vec![
        format!("{} rolls initiative: {}", combatant.name, outcome.total),
        format!(
            "Base {}, modifier {:+}, dice {}",
            b.stat,
            b.modifier_sum(),
            dice_display(&state.dice_results, state.selected_dice_index)
        ),
    ];

    let actions: Vec<&str> = catalog
        .resolve_actions(&state.selected_action_ids)
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    if !actions.is_empty() {
        lines.push(format!("Actions: {}", actions.join(", ")));
    }

    let mut combat = Vec::new();
    if outcome.attack_delta != 0 {
        combat.push(format!("{} {:+}", config.attack_label, outcome.attack_delta));
    }
    if outcome.defense_delta != 0 {
        combat.push(format!("{} {:+}", config.defense_label, outcome.defense_delta));
    }
    if !combat.is_empty() {
        lines.push(combat.join(", "));
    }

    if outcome.carry.is_carrying() {
        lines.push(format!(
            "Action moved, carried for {} round(s)",
            outcome.carry.rounds()
        ));
    }

    lines.join("\n")
}

/// A resolved round whose writes have not all landed yet.
///
/// Writes run in a fixed order: the effect mutations, then the saved state,
/// then the turn-order value. `applied` counts the ones already done, so a
/// retry picks up where a store failure stopped instead of resolving the
/// round again.
#[derive(Debug, Clone)]
pub struct PendingCommit {
    outcome: RoundOutcome,
    summary: String,
    applied: usize,
}

impl PendingCommit {
    fn new(outcome: RoundOutcome, summary: String) -> Self {
        Self {
            outcome,
            summary,
            applied: 0,
        }
    }

    pub fn outcome(&self) -> &RoundOutcome {
        &self.outcome
    }

    /// Number of writes already done.
    pub fn applied(&self) -> usize {
        self.applied
    }

    fn steps(&self) -> usize {
        self.outcome.mutations.len() + 2
    }
}

/// Write a resolved round to the host, one awaited step at a time, starting
/// after the steps already applied.
async fn apply_outcome<S: CombatantStore + ?Sized>(
    store: &S,
    combatant: &Combatant,
    pending: &mut PendingCommit,
) -> Result<(), SessionError> {
    let mutations = pending.outcome.mutations.len();

    while pending.applied < pending.steps() {
        let step = pending.applied;
        let outcome = &pending.outcome;

        if step < mutations {
            let result = match &outcome.mutations[step] {
                EffectMutation::Create(effect) => store.create_effect(effect.clone()).await,
                EffectMutation::Update(effect) => store.update_effect(effect.clone()).await,
                EffectMutation::Delete { combatant, effect } => {
                    store.delete_effect(combatant, *effect).await
                }
            };
            match result {
                Ok(()) => {}
                Err(StoreError::EffectNotFound { effect, .. }) => {
                    debug!(combatant = %combatant.id, %effect, "Effect already gone, skipping");
                }
                Err(e) => return Err(e.into()),
            }
        } else if step == mutations {
            if outcome.carry.is_carrying() {
                persist::save_state(store, &combatant.id, &outcome.next_state).await?;
            } else {
                persist::clear_state(store, &combatant.id).await?;
            }
        } else {
            store
                .set_turn_order(&combatant.id, outcome.turn_order_value)
                .await?;
        }

        pending.applied += 1;
    }
    Ok(())
}

/// Gate, resolve, write, and announce one combatant's round.
///
/// An interrupted commit left in `pending` is finished instead of resolving
/// the round again.
async fn commit_one<H: SessionHost + ?Sized>(
    host: &H,
    config: &NegotiationConfig,
    combatant: &Combatant,
    catalog: &Catalog,
    state: &NegotiationState,
    pending: &mut Option<PendingCommit>,
) -> Result<CommitResult, SessionError> {
    let mut current = match pending.take() {
        Some(interrupted) => {
            debug!(
                combatant = %combatant.id,
                applied = interrupted.applied,
                "Resuming interrupted commit"
            );
            interrupted
        }
        None => {
            if let Err(e) = state.commit_gate() {
                warn!(combatant = %combatant.id, reason = %e, "Commit rejected");
                return Err(e.into());
            }

            let existing = host
                .deferred_effect(&combatant.id, &config.effect_label)
                .await?;
            let outcome = resolve_round(combatant, state, catalog, existing.as_ref(), config);
            let summary = format_summary(combatant, state, catalog, &outcome, config);
            PendingCommit::new(outcome, summary)
        }
    };

    if let Err(e) = apply_outcome(host, combatant, &mut current).await {
        warn!(
            combatant = %combatant.id,
            error = %e,
            applied = current.applied,
            "Commit interrupted"
        );
        *pending = Some(current);
        return Err(e);
    }

    host.announce(&combatant.name, &current.summary).await;

    info!(
        combatant = %combatant.id,
        total = current.outcome.total,
        carry = %current.outcome.carry,
        "Initiative committed"
    );

    Ok(CommitResult {
        combatant: combatant.id.clone(),
        outcome: current.outcome,
        summary: current.summary,
    })
}

// ============================================================================
// Single combatant
// ============================================================================

/// Interactive initiative negotiation for one combatant.
pub struct InitiativeSession<H: SessionHost> {
    host: Arc<H>,
    config: NegotiationConfig,
    combatant: Combatant,
    catalog: Catalog,
    state: NegotiationState,
    pending: Option<PendingCommit>,
    _lock: CombatantLock,
}

impl<H: SessionHost> InitiativeSession<H> {
    /// Open a session, restoring any saved state for the combatant.
    pub async fn open(
        host: Arc<H>,
        locks: &SessionLocks,
        id: &CombatantId,
        config: NegotiationConfig,
    ) -> Result<Self, SessionError> {
        let lock = locks.acquire(id)?;
        let combatant = host.combatant(id).await?;
        let state = persist::load_state(&*host, id).await?;
        let catalog = load_catalog(&*host, &combatant, &config).await;

        debug!(combatant = %id, carry = %state.carry_state(), "Opened initiative session");

        Ok(Self {
            host,
            config,
            combatant,
            catalog,
            state,
            pending: None,
            _lock: lock,
        })
    }

    pub fn combatant(&self) -> &Combatant {
        &self.combatant
    }

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// A commit that failed part-way and will be finished by `commit`.
    pub fn pending_commit(&self) -> Option<&PendingCommit> {
        self.pending.as_ref()
    }

    /// Current total and its contributions, without committing.
    pub fn preview(&self) -> ModifierBreakdown {
        breakdown(&self.combatant, &self.state, &self.catalog)
    }

    pub async fn set_manual_modifier_text(&mut self, input: &str) -> Result<(), SessionError> {
        self.state.set_manual_modifier_text(input);
        self.persist().await
    }

    pub async fn set_manual_modifier(&mut self, value: i32) -> Result<(), SessionError> {
        self.state.set_manual_modifier(value);
        self.persist().await
    }

    pub async fn set_attack_modifier(&mut self, value: i32) -> Result<(), SessionError> {
        self.state.set_attack_modifier(value);
        self.persist().await
    }

    pub async fn set_defense_modifier(&mut self, value: i32) -> Result<(), SessionError> {
        self.state.set_defense_modifier(value);
        self.persist().await
    }

    pub async fn set_combined_action(&mut self, combined: bool) -> Result<(), SessionError> {
        self.state.set_combined_action(combined);
        self.persist().await
    }

    pub async fn select_action(&mut self, id: &str) -> Result<(), SessionError> {
        self.state.select_action(id, self.config.max_selected_actions)?;
        self.persist().await
    }

    pub async fn deselect_action(&mut self, id: &str) -> Result<(), SessionError> {
        self.state.deselect_action(id);
        self.persist().await
    }

    /// Pick a weapon. Creatures have no weapon catalog; the pick is ignored.
    pub async fn select_weapon(&mut self, id: Option<&str>) -> Result<(), SessionError> {
        if !self.combatant.is_player() {
            warn!(combatant = %self.combatant.id, "Weapon selection ignored for creature");
            return Ok(());
        }
        self.state.select_weapon(id.map(str::to_string));
        self.persist().await
    }

    pub async fn set_dice_count(&mut self, count: DiceCount) -> Result<(), SessionError> {
        self.state.set_dice_count(count);
        self.persist().await
    }

    /// Roll the configured number of dice.
    pub async fn roll(&mut self) -> Result<Vec<u32>, SessionError> {
        if self.state.has_rolled {
            return Err(StateError::AlreadyRolled.into());
        }
        let results = roll_pool(&*self.host, self.state.dice_count).await;
        debug!(combatant = %self.combatant.id, ?results, "Rolled initiative dice");
        self.state.record_roll(results.clone());
        self.persist().await?;
        Ok(results)
    }

    pub async fn select_die(&mut self, index: usize) -> Result<(), SessionError> {
        self.state.select_die(index)?;
        self.persist().await
    }

    /// Commit the negotiation: resolve the round, write effects and the
    /// turn-order value, and announce the result.
    ///
    /// Gate failures leave state and documents untouched. After a store
    /// failure the next call finishes the interrupted writes; input changed
    /// in between is replaced by the resolved round's next state.
    pub async fn commit(&mut self) -> Result<CommitResult, SessionError> {
        let result = commit_one(
            &*self.host,
            &self.config,
            &self.combatant,
            &self.catalog,
            &self.state,
            &mut self.pending,
        )
        .await?;
        self.state = result.outcome.next_state.clone();
        Ok(result)
    }

    async fn persist(&self) -> Result<(), SessionError> {
        persist::save_state(&*self.host, &self.combatant.id, &self.state).await?;
        Ok(())
    }
}

// ============================================================================
// Batch
// ============================================================================

/// One combatant inside a batch session.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub combatant: Combatant,
    pub catalog: Catalog,
    pub state: NegotiationState,
    /// Turn order already submitted by an earlier `commit_all`.
    pub settled: bool,
    pending: Option<PendingCommit>,
}

/// What happened to one combatant in a batch commit.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Committed(CommitResult),
    /// Never rolled; raw base initiative submitted, no effects touched.
    NotRolled { turn_order_value: f64 },
    /// Two dice rolled but none chosen; nothing written.
    DiceNotSelected,
}

/// Result of a batch commit, in session order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(CombatantId, BatchOutcome)>,
}

impl BatchReport {
    pub fn committed(&self) -> impl Iterator<Item = &CommitResult> {
        self.outcomes.iter().filter_map(|(_, o)| match o {
            BatchOutcome::Committed(r) => Some(r),
            _ => None,
        })
    }

    pub fn outcome(&self, id: &CombatantId) -> Option<&BatchOutcome> {
        self.outcomes.iter().find(|(c, _)| c == id).map(|(_, o)| o)
    }
}

/// Initiative negotiation for several combatants at once.
///
/// Every combatant is negotiated independently; commits run in session
/// order, one fully awaited write sequence at a time.
pub struct MassInitiativeSession<H: SessionHost> {
    host: Arc<H>,
    config: NegotiationConfig,
    entries: Vec<BatchEntry>,
    _locks: Vec<CombatantLock>,
}

impl<H: SessionHost> MassInitiativeSession<H> {
    /// Open a batch session. All locks are taken before anything is loaded.
    pub async fn open(
        host: Arc<H>,
        locks: &SessionLocks,
        ids: &[CombatantId],
        config: NegotiationConfig,
    ) -> Result<Self, SessionError> {
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            if guards.iter().any(|g: &CombatantLock| g.combatant() == id) {
                continue;
            }
            guards.push(locks.acquire(id)?);
        }

        let mut entries = Vec::with_capacity(guards.len());
        for guard in &guards {
            let id = guard.combatant();
            let combatant = host.combatant(id).await?;
            let state = persist::load_state(&*host, id).await?;
            let catalog = load_catalog(&*host, &combatant, &config).await;
            entries.push(BatchEntry {
                combatant,
                catalog,
                state,
                settled: false,
                pending: None,
            });
        }

        debug!(combatants = entries.len(), "Opened batch initiative session");

        Ok(Self {
            host,
            config,
            entries,
            _locks: guards,
        })
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn entry(&self, id: &CombatantId) -> Option<&BatchEntry> {
        self.entries.iter().find(|e| &e.combatant.id == id)
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Current total for one combatant, without committing.
    pub fn preview(&self, id: &CombatantId) -> Option<ModifierBreakdown> {
        self.entry(id)
            .map(|e| breakdown(&e.combatant, &e.state, &e.catalog))
    }

    /// Change one combatant's state and persist it.
    pub async fn edit<F>(&mut self, id: &CombatantId, f: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut NegotiationState, &NegotiationConfig) -> Result<(), StateError>,
    {
        let index = self.index_of(id)?;
        let entry = &mut self.entries[index];
        f(&mut entry.state, &self.config)?;
        persist::save_state(&*self.host, id, &entry.state).await?;
        Ok(())
    }

    pub async fn set_manual_modifier(&mut self, id: &CombatantId, value: i32) -> Result<(), SessionError> {
        self.edit(id, |s, _| {
            s.set_manual_modifier(value);
            Ok(())
        })
        .await
    }

    pub async fn select_action(&mut self, id: &CombatantId, action: &str) -> Result<(), SessionError> {
        self.edit(id, |s, c| s.select_action(action, c.max_selected_actions))
            .await
    }

    pub async fn set_dice_count(&mut self, id: &CombatantId, count: DiceCount) -> Result<(), SessionError> {
        self.edit(id, |s, _| {
            s.set_dice_count(count);
            Ok(())
        })
        .await
    }

    pub async fn select_die(&mut self, id: &CombatantId, index: usize) -> Result<(), SessionError> {
        self.edit(id, |s, _| s.select_die(index)).await
    }

    /// Roll for one combatant.
    pub async fn roll(&mut self, id: &CombatantId) -> Result<Vec<u32>, SessionError> {
        let index = self.index_of(id)?;
        if self.entries[index].state.has_rolled {
            return Err(StateError::AlreadyRolled.into());
        }
        let count = self.entries[index].state.dice_count;
        let results = roll_pool(&*self.host, count).await;
        let entry = &mut self.entries[index];
        entry.state.record_roll(results.clone());
        persist::save_state(&*self.host, id, &entry.state).await?;
        Ok(results)
    }

    /// Roll for every unsettled combatant that has not rolled yet.
    pub async fn roll_all(&mut self) -> Result<(), SessionError> {
        let pending: Vec<CombatantId> = self
            .entries
            .iter()
            .filter(|e| !e.settled && !e.state.has_rolled)
            .map(|e| e.combatant.id.clone())
            .collect();
        for id in &pending {
            self.roll(id).await?;
        }
        Ok(())
    }

    /// Commit every unsettled combatant in order.
    ///
    /// Combatants that never rolled get their raw base initiative; those
    /// still missing a dice choice are skipped. Neither blocks the rest.
    /// Combatants settled by an earlier call are left alone and do not
    /// appear in the report.
    pub async fn commit_all(&mut self) -> Result<BatchReport, SessionError> {
        let mut report = BatchReport::default();

        for entry in &mut self.entries {
            if entry.settled {
                continue;
            }
            let id = entry.combatant.id.clone();

            if !entry.state.has_rolled && entry.pending.is_none() {
                let value = f64::from(entry.combatant.base_initiative);
                self.host.set_turn_order(&id, value).await?;
                entry.settled = true;
                info!(combatant = %id, value, "Not rolled, using base initiative");
                report.outcomes.push((id, BatchOutcome::NotRolled { turn_order_value: value }));
                continue;
            }

            match commit_one(
                &*self.host,
                &self.config,
                &entry.combatant,
                &entry.catalog,
                &entry.state,
                &mut entry.pending,
            )
            .await
            {
                Ok(result) => {
                    entry.state = result.outcome.next_state.clone();
                    entry.settled = true;
                    report.outcomes.push((id, BatchOutcome::Committed(result)));
                }
                Err(SessionError::Input(StateError::DiceNotSelected)) => {
                    warn!(combatant = %id, "No die chosen, skipped");
                    report.outcomes.push((id, BatchOutcome::DiceNotSelected));
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    fn index_of(&self, id: &CombatantId) -> Result<usize, SessionError> {
        self.entries
            .iter()
            .position(|e| &e.combatant.id == id)
            .ok_or_else(|| SessionError::UnknownCombatant(id.clone()))
    }
}
