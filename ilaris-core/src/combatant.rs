//! Combatant entries taking part in initiative negotiation.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ID Types
// ============================================================================

/// Opaque identifier of a combatant, unique within one encounter.
///
/// Hosts hand out their own document ids, so this wraps a string rather
/// than minting one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatantId(pub String);

impl CombatantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CombatantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CombatantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Combatant
// ============================================================================

/// Which stat block layout a combatant uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CombatantKind {
    #[default]
    Player,
    Creature,
}

impl CombatantKind {
    pub fn is_player(&self) -> bool {
        matches!(self, CombatantKind::Player)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CombatantKind::Player => "player",
            CombatantKind::Creature => "creature",
        }
    }
}

impl fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One participant in the negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    /// Display name, used as speaker of announcements.
    pub name: String,
    pub kind: CombatantKind,
    /// Snapshot of the stat block's initiative at encounter start.
    pub base_initiative: i32,
    /// Live initiative stat, possibly already modified by active effects.
    pub current_initiative_stat: i32,
}

impl Combatant {
    /// Create a combatant whose live stat equals its base.
    pub fn new(
        id: impl Into<CombatantId>,
        name: impl Into<String>,
        kind: CombatantKind,
        base_initiative: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            base_initiative,
            current_initiative_stat: base_initiative,
        }
    }

    pub fn player(id: impl Into<CombatantId>, name: impl Into<String>, base_initiative: i32) -> Self {
        Self::new(id, name, CombatantKind::Player, base_initiative)
    }

    pub fn creature(
        id: impl Into<CombatantId>,
        name: impl Into<String>,
        base_initiative: i32,
    ) -> Self {
        Self::new(id, name, CombatantKind::Creature, base_initiative)
    }

    /// Override the live initiative stat.
    pub fn with_current_initiative(mut self, value: i32) -> Self {
        self.current_initiative_stat = value;
        self
    }

    pub fn is_player(&self) -> bool {
        self.kind.is_player()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_combatant_mirrors_base() {
        let c = Combatant::player("a1", "Alrik", 8);
        assert_eq!(c.current_initiative_stat, 8);
        assert!(c.is_player());

        let c = Combatant::creature("w1", "Wolf", 12).with_current_initiative(9);
        assert_eq!(c.base_initiative, 12);
        assert_eq!(c.current_initiative_stat, 9);
        assert!(!c.is_player());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&CombatantKind::Creature).unwrap();
        assert_eq!(json, "\"creature\"");
    }
}
