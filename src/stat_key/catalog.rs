//! StatCatalog - Statistic Taxonomy
//!
//! The game owns the authoritative list of statistics, materials and
//! entity types. The catalog is a serializable copy of it so keys can be
//! validated without a live server. [`StatCatalog::vanilla`] ships a
//! built-in subset; a full export can be loaded from JSON.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::StatKind;
use crate::error::ConfigError;

// =============================================================================
// Types
// =============================================================================

/// What a material can be used as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialInfo {
    /// Placeable block
    #[serde(default)]
    pub block: bool,
    /// Inventory item
    #[serde(default)]
    pub item: bool,
}

/// Entity type flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    /// Living entities are the only valid ENTITY qualifiers
    #[serde(default = "default_alive")]
    pub alive: bool,
}

fn default_alive() -> bool {
    true
}

/// Known statistics, materials and entity types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatCatalog {
    /// Statistic name -> declared kind
    #[serde(default)]
    statistics: BTreeMap<String, StatKind>,
    /// Material name -> usage flags
    #[serde(default)]
    materials: BTreeMap<String, MaterialInfo>,
    /// Entity type name -> flags
    #[serde(default)]
    entities: BTreeMap<String, EntityInfo>,
}

// =============================================================================
// Built-in Catalog
// =============================================================================

const VANILLA_STATISTICS: &[(&str, StatKind)] = &[
    ("ANIMALS_BRED", StatKind::Untyped),
    ("DAMAGE_DEALT", StatKind::Untyped),
    ("DAMAGE_TAKEN", StatKind::Untyped),
    ("DEATHS", StatKind::Untyped),
    ("FISH_CAUGHT", StatKind::Untyped),
    ("JUMP", StatKind::Untyped),
    ("LEAVE_GAME", StatKind::Untyped),
    ("MOB_KILLS", StatKind::Untyped),
    ("PLAYER_KILLS", StatKind::Untyped),
    ("PLAY_ONE_MINUTE", StatKind::Untyped),
    ("SPRINT_ONE_CM", StatKind::Untyped),
    ("WALK_ONE_CM", StatKind::Untyped),
    ("MINE_BLOCK", StatKind::Block),
    ("BREAK_ITEM", StatKind::Item),
    ("CRAFT_ITEM", StatKind::Item),
    ("DROP", StatKind::Item),
    ("PICKUP", StatKind::Item),
    ("USE_ITEM", StatKind::Item),
    ("ENTITY_KILLED_BY", StatKind::Entity),
    ("KILL_ENTITY", StatKind::Entity),
];

/// (name, block, item)
const VANILLA_MATERIALS: &[(&str, bool, bool)] = &[
    ("ANCIENT_DEBRIS", true, true),
    ("BOW", false, true),
    ("BREAD", false, true),
    ("COAL_ORE", true, true),
    ("COBBLESTONE", true, true),
    ("DIAMOND_ORE", true, true),
    ("DIAMOND_PICKAXE", false, true),
    ("DIAMOND_SWORD", false, true),
    ("DIRT", true, true),
    ("IRON_ORE", true, true),
    ("LAVA", true, false),
    ("OAK_LOG", true, true),
    ("OBSIDIAN", true, true),
    ("STONE", true, true),
    ("TORCH", true, true),
    ("WATER", true, false),
];

/// (name, alive)
const VANILLA_ENTITIES: &[(&str, bool)] = &[
    ("ARROW", false),
    ("BLAZE", true),
    ("COW", true),
    ("CREEPER", true),
    ("ENDERMAN", true),
    ("ENDER_DRAGON", true),
    ("ITEM_FRAME", false),
    ("PIG", true),
    ("PLAYER", true),
    ("SKELETON", true),
    ("SPIDER", true),
    ("WITHER", true),
    ("ZOMBIE", true),
];

static VANILLA: Lazy<StatCatalog> = Lazy::new(|| {
    let mut catalog = StatCatalog::default();
    for (name, kind) in VANILLA_STATISTICS {
        catalog = catalog.with_statistic(name, *kind);
    }
    for (name, block, item) in VANILLA_MATERIALS {
        catalog = catalog.with_material(
            name,
            MaterialInfo {
                block: *block,
                item: *item,
            },
        );
    }
    for (name, alive) in VANILLA_ENTITIES {
        catalog = catalog.with_entity(name, EntityInfo { alive: *alive });
    }
    catalog
});

// =============================================================================
// StatCatalog
// =============================================================================

impl StatCatalog {
    /// Built-in catalog covering common vanilla statistics.
    #[must_use]
    pub fn vanilla() -> &'static StatCatalog {
        &VANILLA
    }

    /// Load a catalog exported as JSON.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Add or replace a statistic.
    #[must_use]
    pub fn with_statistic(mut self, name: &str, kind: StatKind) -> Self {
        self.statistics.insert(name.to_string(), kind);
        self
    }

    /// Add or replace a material.
    #[must_use]
    pub fn with_material(mut self, name: &str, info: MaterialInfo) -> Self {
        self.materials.insert(name.to_string(), info);
        self
    }

    /// Add or replace an entity type.
    #[must_use]
    pub fn with_entity(mut self, name: &str, info: EntityInfo) -> Self {
        self.entities.insert(name.to_string(), info);
        self
    }

    /// Declared kind of a statistic.
    #[must_use]
    pub fn stat_kind(&self, stat: &str) -> Option<StatKind> {
        self.statistics.get(stat).copied()
    }

    /// Whether `name` is an acceptable qualifier for `kind`.
    #[must_use]
    pub fn accepts_qualifier(&self, kind: StatKind, name: &str) -> bool {
        match kind {
            StatKind::Untyped => false,
            StatKind::Block => self.materials.get(name).is_some_and(|m| m.block),
            StatKind::Item => self.materials.get(name).is_some_and(|m| m.item),
            StatKind::Entity => self.entities.get(name).is_some_and(|e| e.alive),
        }
    }

    /// Statistics in name order.
    pub fn statistics(&self) -> impl Iterator<Item = (&str, StatKind)> + '_ {
        self.statistics.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Acceptable qualifiers for `kind` in name order.
    pub fn qualifiers(&self, kind: StatKind) -> Box<dyn Iterator<Item = &str> + '_> {
        match kind {
            StatKind::Untyped => Box::new(std::iter::empty()),
            StatKind::Entity => Box::new(
                self.entities
                    .iter()
                    .filter(|(_, e)| e.alive)
                    .map(|(name, _)| name.as_str()),
            ),
            StatKind::Block | StatKind::Item => Box::new(
                self.materials
                    .iter()
                    .filter(move |(name, _)| self.accepts_qualifier(kind, name))
                    .map(|(name, _)| name.as_str()),
            ),
        }
    }

    /// Number of known statistics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statistics.len()
    }

    /// Whether the catalog knows no statistics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
    }
}
