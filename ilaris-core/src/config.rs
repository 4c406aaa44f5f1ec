//! Rule constants and lookup keys for initiative negotiation.

use serde::{Deserialize, Serialize};

/// Configuration shared by every negotiation session.
///
/// Defaults follow the Ilaris rules; hosts may ship their own copy as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Subtracted from attack and defense when a combined action is declared.
    pub combined_action_penalty: i32,

    /// Upper bound on simultaneously selected actions.
    pub max_selected_actions: usize,

    /// Duration of a deferred penalty created or refreshed by a negative round.
    pub carry_duration_rounds: u32,

    /// Duration of the penalty left behind once the action resolves.
    pub resolved_duration_rounds: u32,

    /// Added to a player's turn-order value so players win ties.
    pub player_tie_break: f64,

    /// Exact effect-change key of the initiative stat.
    pub initiative_key: String,

    /// Fallback substring for initiative keys when no exact key matches.
    pub initiative_key_fragment: String,

    /// Effect-change key of the attack modifier.
    pub attack_key: String,

    /// Effect-change key of the defense modifier.
    pub defense_key: String,

    /// Label given to deferred penalty effects.
    pub effect_label: String,

    /// Announcement labels for the attack and defense deltas.
    pub attack_label: String,
    pub defense_label: String,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            combined_action_penalty: 4,
            max_selected_actions: 2,
            carry_duration_rounds: 2,
            resolved_duration_rounds: 1,
            player_tie_break: 0.1,
            initiative_key: "system.abgeleitete.ini".to_string(),
            initiative_key_fragment: "ini".to_string(),
            attack_key: "system.modifikatoren.at".to_string(),
            defense_key: "system.modifikatoren.vt".to_string(),
            effect_label: "Moved action".to_string(),
            attack_label: "Attack".to_string(),
            defense_label: "Defense".to_string(),
        }
    }
}

impl NegotiationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the combined action penalty.
    pub fn with_combined_action_penalty(mut self, penalty: i32) -> Self {
        self.combined_action_penalty = penalty;
        self
    }

    /// Set the maximum number of selected actions.
    pub fn with_max_selected_actions(mut self, max: usize) -> Self {
        self.max_selected_actions = max;
        self
    }

    /// Set carry and resolved effect durations.
    pub fn with_durations(mut self, carry: u32, resolved: u32) -> Self {
        self.carry_duration_rounds = carry;
        self.resolved_duration_rounds = resolved;
        self
    }

    /// Set the player tie-break fraction.
    pub fn with_player_tie_break(mut self, fraction: f64) -> Self {
        self.player_tie_break = fraction;
        self
    }

    /// Set the exact initiative key and its substring fallback.
    pub fn with_initiative_key(
        mut self,
        key: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        self.initiative_key = key.into();
        self.initiative_key_fragment = fragment.into();
        self
    }

    /// Set the attack and defense keys.
    pub fn with_combat_keys(mut self, attack: impl Into<String>, defense: impl Into<String>) -> Self {
        self.attack_key = attack.into();
        self.defense_key = defense.into();
        self
    }

    /// Set the deferred penalty effect label.
    pub fn with_effect_label(mut self, label: impl Into<String>) -> Self {
        self.effect_label = label.into();
        self
    }

    /// Set the announcement labels for attack and defense.
    pub fn with_combat_labels(mut self, attack: impl Into<String>, defense: impl Into<String>) -> Self {
        self.attack_label = attack.into();
        self.defense_label = defense.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = NegotiationConfig::new()
            .with_combined_action_penalty(2)
            .with_durations(3, 1)
            .with_effect_label("Verschobene Aktion")
            .with_combat_labels("AT", "VT");

        assert_eq!(config.combined_action_penalty, 2);
        assert_eq!(config.carry_duration_rounds, 3);
        assert_eq!(config.max_selected_actions, 2);
        assert_eq!(config.effect_label, "Verschobene Aktion");
        assert_eq!(config.attack_label, "AT");
        assert_eq!(config.defense_label, "VT");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: NegotiationConfig =
            serde_json::from_str(r#"{"player_tie_break": 0.5}"#).unwrap();
        assert_eq!(config.player_tie_break, 0.5);
        assert_eq!(config.combined_action_penalty, 4);
        assert_eq!(config.initiative_key, "system.abgeleitete.ini");
        assert_eq!(config.attack_label, "Attack");
    }
}
