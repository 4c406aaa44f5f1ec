//! Ilaris initiative negotiation engine.
//!
//! This crate provides:
//! - Modifier aggregation from stats, actions, weapons, and dice
//! - Action and weapon catalogs drawn from inventory and a shared library
//! - Round carry-over of unresolved actions with deferred penalty effects
//! - Single and batch negotiation sessions over a pluggable host
//!
//! # Quick Start
//!
//! ```ignore
//! use ilaris_core::{Combatant, HeadlessHost, InitiativeSession, NegotiationConfig, SessionLocks};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = Arc::new(HeadlessHost::new());
//!     host.add_combatant(Combatant::player("alrik", "Alrik", 8)).await;
//!
//!     let locks = SessionLocks::new();
//!     let mut session =
//!         InitiativeSession::open(host, &locks, &"alrik".into(), NegotiationConfig::default())
//!             .await?;
//!
//!     session.set_manual_modifier(-2).await?;
//!     session.roll().await?;
//!     let result = session.commit().await?;
//!     println!("{}", result.summary);
//!     Ok(())
//! }
//! ```

pub mod carry;
pub mod catalog;
pub mod combatant;
pub mod config;
pub mod dice;
pub mod headless;
pub mod host;
pub mod modifiers;
pub mod persist;
pub mod session;
pub mod state;
pub mod testing;

// Primary public API
pub use carry::{resolve_round, CarryState, DeferredPenaltyEffect, EffectId, EffectMutation, RoundOutcome};
pub use catalog::{Catalog, CatalogAction, CatalogWeapon, ItemRecord};
pub use combatant::{Combatant, CombatantId, CombatantKind};
pub use config::NegotiationConfig;
pub use dice::DiceCount;
pub use headless::HeadlessHost;
pub use host::SessionHost;
pub use modifiers::{compute_total_initiative, ModifierBreakdown};
pub use session::{InitiativeSession, MassInitiativeSession, PendingCommit, SessionError, SessionLocks};
pub use state::NegotiationState;
pub use testing::{ScriptedDice, TestHarness};
