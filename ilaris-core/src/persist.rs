//! Negotiation state persistence.
//!
//! Session state is stored as a versioned JSON snapshot, either in a flag on
//! the combatant's document or in a file.

use crate::combatant::CombatantId;
use crate::host::{CombatantStore, StoreError};
use crate::state::NegotiationState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current snapshot version.
const SAVE_VERSION: u32 = 1;

/// Flag key under which the snapshot lives on a combatant.
pub const NEGOTIATION_FLAG: &str = "negotiation";

/// A saved negotiation for one combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedNegotiation {
    /// Snapshot format version for compatibility checking.
    pub version: u32,

    /// When the snapshot was taken, seconds since the epoch.
    pub saved_at: String,

    pub combatant: CombatantId,

    pub state: NegotiationState,
}

impl SavedNegotiation {
    pub fn new(combatant: CombatantId, state: NegotiationState) -> Self {
        Self {
            version: SAVE_VERSION,
            saved_at: now_secs(),
            combatant,
            state,
        }
    }

    /// Encode as a flag value.
    pub fn to_flag(&self) -> Result<Value, PersistError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode a flag value, rejecting other snapshot versions.
    pub fn from_flag(value: Value) -> Result<Self, PersistError> {
        let saved: Self = serde_json::from_value(value)?;
        saved.check_version()?;
        Ok(saved)
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;
        saved.check_version()?;
        Ok(saved)
    }

    fn check_version(&self) -> Result<(), PersistError> {
        if self.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }
}

/// Restore a combatant's state from its flag.
///
/// A missing flag yields a fresh state. An unreadable snapshot is logged and
/// also yields a fresh state; only store failures are errors.
pub async fn load_state<S: CombatantStore + ?Sized>(
    store: &S,
    id: &CombatantId,
) -> Result<NegotiationState, PersistError> {
    let Some(value) = store.get_flag(id, NEGOTIATION_FLAG).await? else {
        debug!(combatant = %id, "No saved negotiation, starting fresh");
        return Ok(NegotiationState::default());
    };

    match SavedNegotiation::from_flag(value) {
        Ok(saved) => Ok(saved.state),
        Err(e) => {
            warn!(combatant = %id, error = %e, "Discarding unreadable negotiation snapshot");
            Ok(NegotiationState::default())
        }
    }
}

/// Write a combatant's state to its flag.
pub async fn save_state<S: CombatantStore + ?Sized>(
    store: &S,
    id: &CombatantId,
    state: &NegotiationState,
) -> Result<(), PersistError> {
    let value = SavedNegotiation::new(id.clone(), state.clone()).to_flag()?;
    store.set_flag(id, NEGOTIATION_FLAG, value).await?;
    Ok(())
}

/// Remove a combatant's saved state.
pub async fn clear_state<S: CombatantStore + ?Sized>(
    store: &S,
    id: &CombatantId,
) -> Result<(), PersistError> {
    store.unset_flag(id, NEGOTIATION_FLAG).await?;
    Ok(())
}

/// Current timestamp as seconds since the epoch.
fn now_secs() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}
