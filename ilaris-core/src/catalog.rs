//! Action and weapon catalogs.
//!
//! Actions come from the combatant's own inventory and from a shared,
//! read-only library; weapons come from the inventory only and only for
//! players. Every entry is normalized into the shape the aggregator reads.

use crate::combatant::{Combatant, CombatantKind};
use crate::config::NegotiationConfig;
use crate::host::CatalogSource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from catalog sources.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Action library unavailable: {0}")]
    LibraryUnavailable(String),

    #[error("Inventory unavailable: {0}")]
    InventoryUnavailable(String),
}

// ============================================================================
// Raw records
// ============================================================================

/// Kind of an inventory or library record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Effect-bearing action.
    Action,
    MeleeWeapon,
    RangedWeapon,
    #[default]
    #[serde(other)]
    Other,
}

impl ItemKind {
    pub fn is_weapon(&self) -> bool {
        matches!(self, ItemKind::MeleeWeapon | ItemKind::RangedWeapon)
    }
}

/// One key/value change carried by an effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectChange {
    pub key: String,
    /// Raw value as stored by the host; parsed leniently.
    pub value: String,
}

impl EffectChange {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An effect attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ItemEffect {
    pub label: String,
    pub changes: Vec<EffectChange>,
}

/// What a weapon modifier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierScope {
    Actor,
    Item,
}

/// How a weapon modifier combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModifierMode {
    ActionAugment,
    ActionNegAugment,
    #[serde(other)]
    Other,
}

/// A modifier entry on a weapon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponModifier {
    pub scope: ModifierScope,
    /// Stat the modifier targets, `"ini"` for initiative.
    pub property: String,
    pub mode: ModifierMode,
    pub value: i32,
}

/// Weapon-specific fields of an inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeaponData {
    pub primary: bool,
    pub secondary: bool,
    pub modifiers: Vec<WeaponModifier>,
}

/// An inventory or library record as the host delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub effects: Vec<ItemEffect>,
    #[serde(default)]
    pub weapon: Option<WeaponData>,
}

impl ItemRecord {
    /// An action record carrying the given effect changes.
    pub fn action(
        id: impl Into<String>,
        name: impl Into<String>,
        changes: Vec<EffectChange>,
    ) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            kind: ItemKind::Action,
            description: String::new(),
            effects: vec![ItemEffect {
                label: name.clone(),
                changes,
            }],
            weapon: None,
            name,
        }
    }

    /// A melee weapon record.
    pub fn melee_weapon(id: impl Into<String>, name: impl Into<String>, weapon: WeaponData) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ItemKind::MeleeWeapon,
            description: String::new(),
            effects: Vec::new(),
            weapon: Some(weapon),
        }
    }

    fn changes(&self) -> impl Iterator<Item = &EffectChange> + Clone {
        self.effects.iter().flat_map(|e| e.changes.iter())
    }
}

// ============================================================================
// Lookup helpers
// ============================================================================

/// Parse an integer the way form fields are read: optional sign, leading
/// digits, anything after ignored. Unparseable or out-of-range input
/// yields 0.
pub fn parse_int(input: &str) -> i32 {
    let s = input.trim();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1i64, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .ok()
        .and_then(|v| i32::try_from(sign * v).ok())
        .unwrap_or(0)
}

/// Two-tier key lookup: the first change whose key equals `exact`, else the
/// first change whose key contains `fragment`.
pub fn find_change<'a, I>(changes: I, exact: &str, fragment: Option<&str>) -> Option<&'a EffectChange>
where
    I: IntoIterator<Item = &'a EffectChange>,
    I::IntoIter: Clone,
{
    let changes = changes.into_iter();
    changes.clone().find(|c| c.key == exact).or_else(|| {
        let fragment = fragment.filter(|f| !f.is_empty())?;
        changes.clone().find(|c| c.key.contains(fragment))
    })
}

fn sum_exact<'a>(changes: impl Iterator<Item = &'a EffectChange>, key: &str) -> i32 {
    changes
        .filter(|c| c.key == key)
        .map(|c| parse_int(&c.value))
        .sum()
}

// ============================================================================
// Catalog entries
// ============================================================================

/// Where a catalog action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSource {
    Inventory,
    Library,
}

/// A selectable action, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogAction {
    pub id: String,
    pub name: String,
    pub description: String,
    pub ini_mod: i32,
    pub attack_mod: i32,
    pub defense_mod: i32,
    pub source: ActionSource,
}

impl CatalogAction {
    /// Normalize a record using the configured keys.
    pub fn from_record(record: &ItemRecord, source: ActionSource, config: &NegotiationConfig) -> Self {
        let ini_mod = find_change(
            record.changes(),
            &config.initiative_key,
            Some(&config.initiative_key_fragment),
        )
        .map(|c| parse_int(&c.value))
        .unwrap_or(0);

        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            ini_mod,
            attack_mod: sum_exact(record.changes(), &config.attack_key),
            defense_mod: sum_exact(record.changes(), &config.defense_key),
            source,
        }
    }
}

/// A primary or secondary weapon a player may pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogWeapon {
    pub id: String,
    pub name: String,
    pub primary: bool,
    pub secondary: bool,
    pub modifiers: Vec<WeaponModifier>,
}

impl CatalogWeapon {
    /// Initiative bonus of this weapon.
    ///
    /// Only the first actor-scoped `ini` modifier counts; `actionNegAugment`
    /// flips its sign, other modes contribute nothing.
    pub fn ini_mod(&self) -> i32 {
        self.modifiers
            .iter()
            .find(|m| m.scope == ModifierScope::Actor && m.property == "ini")
            .map(|m| match m.mode {
                ModifierMode::ActionAugment => m.value,
                ModifierMode::ActionNegAugment => -m.value,
                ModifierMode::Other => 0,
            })
            .unwrap_or(0)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Actions and weapons available to one combatant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub actions: Vec<CatalogAction>,
    pub weapons: Vec<CatalogWeapon>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw records. Weapons are only collected for players.
    pub fn from_records(
        owned: &[ItemRecord],
        library: &[ItemRecord],
        kind: CombatantKind,
        config: &NegotiationConfig,
    ) -> Self {
        let mut actions: Vec<CatalogAction> = owned
            .iter()
            .filter(|r| r.kind == ItemKind::Action)
            .map(|r| CatalogAction::from_record(r, ActionSource::Inventory, config))
            .collect();
        actions.extend(
            library
                .iter()
                .map(|r| CatalogAction::from_record(r, ActionSource::Library, config)),
        );

        let weapons = if kind.is_player() {
            owned
                .iter()
                .filter(|r| r.kind.is_weapon())
                .filter_map(|r| {
                    let w = r.weapon.as_ref()?;
                    (w.primary || w.secondary).then(|| CatalogWeapon {
                        id: r.id.clone(),
                        name: r.name.clone(),
                        primary: w.primary,
                        secondary: w.secondary,
                        modifiers: w.modifiers.clone(),
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        Self { actions, weapons }
    }

    pub fn with_action(mut self, action: CatalogAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_weapon(mut self, weapon: CatalogWeapon) -> Self {
        self.weapons.push(weapon);
        self
    }

    /// Look up an action; inventory entries shadow library entries.
    pub fn action(&self, id: &str) -> Option<&CatalogAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn weapon(&self, id: &str) -> Option<&CatalogWeapon> {
        self.weapons.iter().find(|w| w.id == id)
    }

    /// Resolve selected ids in order, skipping ids that no longer exist.
    pub fn resolve_actions<'a>(&'a self, ids: &'a [String]) -> Vec<&'a CatalogAction> {
        ids.iter()
            .filter_map(|id| {
                let action = self.action(id);
                if action.is_none() {
                    debug!(action = %id, "Selected action no longer in catalog");
                }
                action
            })
            .collect()
    }
}

/// Load the catalog for a combatant from the host.
///
/// An unavailable library degrades to inventory-only actions; an
/// unavailable inventory degrades to library-only.
pub async fn load_catalog<S: CatalogSource + ?Sized>(
    source: &S,
    combatant: &Combatant,
    config: &NegotiationConfig,
) -> Catalog {
    let owned = match source.owned_items(&combatant.id).await {
        Ok(items) => items,
        Err(e) => {
            warn!(combatant = %combatant.id, error = %e, "Inventory unavailable, using library only");
            Vec::new()
        }
    };
    let library = match source.action_library().await {
        Ok(items) => items,
        Err(e) => {
            warn!(combatant = %combatant.id, error = %e, "Action library unavailable, using inventory only");
            Vec::new()
        }
    };

    let catalog = Catalog::from_records(&owned, &library, combatant.kind, config);
    debug!(
        combatant = %combatant.id,
        actions = catalog.actions.len(),
        weapons = catalog.weapons.len(),
        "Loaded catalog"
    );
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockCatalogSource;

    fn ini_modifier(mode: ModifierMode, value: i32) -> WeaponModifier {
        WeaponModifier {
            scope: ModifierScope::Actor,
            property: "ini".to_string(),
            mode,
            value,
        }
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("-2"), -2);
        assert_eq!(parse_int("+3"), 3);
        assert_eq!(parse_int("4abc"), 4);
        assert_eq!(parse_int(" 12 "), 12);
        assert_eq!(parse_int(""), 0);
        assert_eq!(parse_int("-"), 0);
        assert_eq!(parse_int("x5"), 0);
        assert_eq!(parse_int("1.5"), 1);
        assert_eq!(parse_int("-2147483648"), i32::MIN);
        assert_eq!(parse_int("99999999999"), 0);
        assert_eq!(parse_int("-99999999999999999999999"), 0);
    }

    #[test]
    fn test_two_tier_lookup_prefers_exact() {
        let changes = vec![
            EffectChange::new("system.initiative.bonus", "5"),
            EffectChange::new("system.abgeleitete.ini", "-2"),
        ];
        let found = find_change(&changes, "system.abgeleitete.ini", Some("ini")).unwrap();
        assert_eq!(found.value, "-2");

        let changes = vec![EffectChange::new("system.kampfwerte.ini", "3")];
        let found = find_change(&changes, "system.abgeleitete.ini", Some("ini")).unwrap();
        assert_eq!(found.value, "3");

        assert!(find_change(&changes, "system.abgeleitete.ini", None).is_none());
        assert!(find_change(&changes, "system.abgeleitete.ini", Some("")).is_none());
    }

    #[test]
    fn test_action_normalization() {
        let config = NegotiationConfig::default();
        let record = ItemRecord::action(
            "aim",
            "Aim",
            vec![
                EffectChange::new("system.abgeleitete.ini", "-4"),
                EffectChange::new("system.modifikatoren.at", "2"),
                EffectChange::new("system.modifikatoren.vt", "oops"),
            ],
        );
        let action = CatalogAction::from_record(&record, ActionSource::Inventory, &config);
        assert_eq!(action.ini_mod, -4);
        assert_eq!(action.attack_mod, 2);
        assert_eq!(action.defense_mod, 0);

        let plain = ItemRecord::action("wait", "Wait", vec![]);
        let action = CatalogAction::from_record(&plain, ActionSource::Library, &config);
        assert_eq!(action.ini_mod, 0);
    }

    #[test]
    fn test_weapon_ini_mod() {
        let mut weapon = CatalogWeapon {
            id: "sword".to_string(),
            name: "Sword".to_string(),
            primary: true,
            secondary: false,
            modifiers: vec![ini_modifier(ModifierMode::ActionAugment, 2)],
        };
        assert_eq!(weapon.ini_mod(), 2);

        weapon.modifiers = vec![ini_modifier(ModifierMode::ActionNegAugment, 3)];
        assert_eq!(weapon.ini_mod(), -3);

        // first match wins
        weapon.modifiers = vec![
            ini_modifier(ModifierMode::ActionAugment, 1),
            ini_modifier(ModifierMode::ActionAugment, 5),
        ];
        assert_eq!(weapon.ini_mod(), 1);

        weapon.modifiers = vec![WeaponModifier {
            scope: ModifierScope::Item,
            property: "ini".to_string(),
            mode: ModifierMode::ActionAugment,
            value: 4,
        }];
        assert_eq!(weapon.ini_mod(), 0);
    }

    #[test]
    fn test_from_records_filters_weapons() {
        let config = NegotiationConfig::default();
        let owned = vec![
            ItemRecord::action("own", "Own action", vec![]),
            ItemRecord::melee_weapon(
                "sword",
                "Sword",
                WeaponData {
                    primary: true,
                    ..Default::default()
                },
            ),
            ItemRecord::melee_weapon("spare", "Spare dagger", WeaponData::default()),
        ];
        let library = vec![ItemRecord::action("lib", "Library action", vec![])];

        let catalog = Catalog::from_records(&owned, &library, CombatantKind::Player, &config);
        assert_eq!(catalog.actions.len(), 2);
        assert_eq!(catalog.action("lib").unwrap().source, ActionSource::Library);
        assert_eq!(catalog.weapons.len(), 1);
        assert!(catalog.weapon("spare").is_none());

        let catalog = Catalog::from_records(&owned, &library, CombatantKind::Creature, &config);
        assert!(catalog.weapons.is_empty());
    }

    #[test]
    fn test_resolve_actions_skips_missing() {
        let config = NegotiationConfig::default();
        let catalog = Catalog::from_records(
            &[ItemRecord::action("a", "A", vec![])],
            &[],
            CombatantKind::Player,
            &config,
        );
        let ids = vec!["gone".to_string(), "a".to_string()];
        let resolved = catalog.resolve_actions(&ids);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, "a");
    }

    #[tokio::test]
    async fn test_library_failure_degrades_to_inventory() {
        let mut source = MockCatalogSource::new();
        source
            .expect_owned_items()
            .returning(|_| Ok(vec![ItemRecord::action("own", "Own", vec![])]));
        source
            .expect_action_library()
            .returning(|| Err(CatalogError::LibraryUnavailable("pack missing".to_string())));

        let combatant = Combatant::player("p1", "Alrik", 8);
        let catalog = load_catalog(&source, &combatant, &NegotiationConfig::default()).await;
        assert_eq!(catalog.actions.len(), 1);
        assert_eq!(catalog.actions[0].id, "own");
    }
}
