//! Stat Keys - Encoding, Validation, Enumeration
//!
//! TigerStyle: Explicit grammar, no partial acceptance.
//!
//! # Grammar
//!
//! ```text
//! UNTYPED:<STAT>
//! BLOCK:<STAT>:<MATERIAL>
//! ITEM:<STAT>:<MATERIAL>
//! ENTITY:<STAT>:<ENTITY_TYPE>
//! ```
//!
//! A key is valid when it survives parse → encode unchanged and the
//! statistic/qualifier pair exists in the [`StatCatalog`]. Rejection is
//! always a plain `false`: callers skip invalid keys, they never fail on them.

mod catalog;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use catalog::{EntityInfo, MaterialInfo, StatCatalog};

use crate::constants::{STAT_KEY_LENGTH_MAX, STAT_KEY_SEPARATOR};

// =============================================================================
// StatKind
// =============================================================================

/// The kind of a statistic, which fixes the arity of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatKind {
    /// Plain counter, no qualifier.
    Untyped,
    /// Qualified by a block material.
    Block,
    /// Qualified by an item material.
    Item,
    /// Qualified by an entity type.
    Entity,
}

impl StatKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untyped => "UNTYPED",
            Self::Block => "BLOCK",
            Self::Item => "ITEM",
            Self::Entity => "ENTITY",
        }
    }

    /// Parse from the exact upper-case token.
    #[must_use]
    pub fn from_token(s: &str) -> Option<Self> {
        match s {
            "UNTYPED" => Some(Self::Untyped),
            "BLOCK" => Some(Self::Block),
            "ITEM" => Some(Self::Item),
            "ENTITY" => Some(Self::Entity),
            _ => None,
        }
    }

    /// Whether keys of this kind carry a qualifier.
    #[must_use]
    pub fn requires_qualifier(&self) -> bool {
        !matches!(self, Self::Untyped)
    }

    /// Get all kinds in order.
    #[must_use]
    pub fn all() -> &'static [StatKind] {
        &[Self::Untyped, Self::Block, Self::Item, Self::Entity]
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// StatKey
// =============================================================================

/// Parsed form of a stat key.
///
/// Parsing is purely syntactic; use [`is_valid`] to check the pair against
/// a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatKey {
    /// Kind token
    pub kind: StatKind,
    /// Statistic name
    pub stat: String,
    /// Material or entity name, present for every kind but UNTYPED
    pub qualifier: Option<String>,
}

impl StatKey {
    /// Key for an untyped statistic.
    pub fn untyped(stat: impl Into<String>) -> Self {
        Self {
            kind: StatKind::Untyped,
            stat: stat.into(),
            qualifier: None,
        }
    }

    /// Key for a typed statistic.
    ///
    /// # Panics
    /// Panics if `kind` is UNTYPED.
    pub fn qualified(kind: StatKind, stat: impl Into<String>, qualifier: impl Into<String>) -> Self {
        assert!(kind.requires_qualifier(), "{kind} keys take no qualifier");
        Self {
            kind,
            stat: stat.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// Split a key into its parts, checking arity only.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        if key.len() > STAT_KEY_LENGTH_MAX {
            return None;
        }

        let parts: Vec<&str> = key.split(STAT_KEY_SEPARATOR).collect();
        let kind = StatKind::from_token(parts.first()?)?;
        let arity = if kind.requires_qualifier() { 3 } else { 2 };
        if parts.len() != arity || parts[1..].iter().any(|p| p.is_empty()) {
            return None;
        }

        Some(Self {
            kind,
            stat: parts[1].to_string(),
            qualifier: parts.get(2).map(|q| (*q).to_string()),
        })
    }

    /// Encode back to the string form.
    #[must_use]
    pub fn encode(&self) -> String {
        encode(self.kind, &self.stat, self.qualifier.as_deref())
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Join kind, statistic and qualifier with `:`.
///
/// The qualifier is dropped for UNTYPED keys.
#[must_use]
pub fn encode(kind: StatKind, stat: &str, qualifier: Option<&str>) -> String {
    let mut key = String::with_capacity(kind.as_str().len() + stat.len() + 24);
    key.push_str(kind.as_str());
    key.push(STAT_KEY_SEPARATOR);
    key.push_str(stat);
    if kind.requires_qualifier() {
        key.push(STAT_KEY_SEPARATOR);
        key.push_str(qualifier.unwrap_or_default());
    }
    key
}

/// Check a key against the grammar and the catalog.
#[must_use]
pub fn is_valid(key: &str, catalog: &StatCatalog) -> bool {
    let Some(parsed) = StatKey::parse(key) else {
        return false;
    };
    if parsed.encode() != key {
        return false;
    }
    if catalog.stat_kind(&parsed.stat) != Some(parsed.kind) {
        return false;
    }
    match parsed.qualifier.as_deref() {
        Some(qualifier) => catalog.accepts_qualifier(parsed.kind, qualifier),
        None => !parsed.kind.requires_qualifier(),
    }
}

/// Every valid key the catalog allows, in catalog order.
///
/// Computed eagerly; each element satisfies [`is_valid`] and none repeats.
#[must_use]
pub fn enumerate_all(catalog: &StatCatalog) -> Vec<String> {
    let mut keys = Vec::new();
    for (stat, kind) in catalog.statistics() {
        if kind.requires_qualifier() {
            for qualifier in catalog.qualifiers(kind) {
                let key = encode(kind, stat, Some(qualifier));
                if key.len() <= STAT_KEY_LENGTH_MAX {
                    keys.push(key);
                }
            }
        } else {
            let key = encode(kind, stat, None);
            if key.len() <= STAT_KEY_LENGTH_MAX {
                keys.push(key);
            }
        }
    }
    keys
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn catalog() -> &'static StatCatalog {
        StatCatalog::vanilla()
    }

    #[test]
    fn test_encode_untyped_drops_qualifier() {
        assert_eq!(encode(StatKind::Untyped, "JUMP", Some("STONE")), "UNTYPED:JUMP");
        assert_eq!(encode(StatKind::Untyped, "JUMP", None), "UNTYPED:JUMP");
    }

    #[test]
    fn test_encode_typed() {
        assert_eq!(
            encode(StatKind::Block, "MINE_BLOCK", Some("STONE")),
            "BLOCK:MINE_BLOCK:STONE"
        );
        assert_eq!(
            StatKey::qualified(StatKind::Entity, "KILL_ENTITY", "ZOMBIE").to_string(),
            "ENTITY:KILL_ENTITY:ZOMBIE"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let key = StatKey::parse("ITEM:USE_ITEM:BOW").unwrap();
        assert_eq!(key.kind, StatKind::Item);
        assert_eq!(key.stat, "USE_ITEM");
        assert_eq!(key.qualifier.as_deref(), Some("BOW"));
        assert_eq!(key.encode(), "ITEM:USE_ITEM:BOW");
    }

    #[test]
    fn test_valid_keys() {
        for key in [
            "UNTYPED:JUMP",
            "BLOCK:MINE_BLOCK:STONE",
            "ITEM:USE_ITEM:DIAMOND_SWORD",
            "ENTITY:KILL_ENTITY:ZOMBIE",
        ] {
            assert!(is_valid(key, catalog()), "{key} should be valid");
        }
    }

    #[test]
    fn test_wrong_arity_rejected() {
        for key in [
            "UNTYPED",
            "UNTYPED:JUMP:STONE",
            "BLOCK:MINE_BLOCK",
            "ENTITY:KILL_ENTITY:ZOMBIE:EXTRA",
            "UNTYPED:JUMP:",
            "",
            ":",
        ] {
            assert!(!is_valid(key, catalog()), "{key:?} should be rejected");
        }
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(!is_valid("SPECIAL:JUMP", catalog()));
        assert!(!is_valid("UNTYPED:NOT_A_STAT", catalog()));
        assert!(!is_valid("BLOCK:MINE_BLOCK:UNOBTAINIUM", catalog()));
        assert!(!is_valid("untyped:JUMP", catalog()));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        // MINE_BLOCK is a BLOCK statistic
        assert!(!is_valid("ITEM:MINE_BLOCK:STONE", catalog()));
        // JUMP is UNTYPED
        assert!(!is_valid("BLOCK:JUMP:STONE", catalog()));
        // DIAMOND_SWORD is not a block
        assert!(!is_valid("BLOCK:MINE_BLOCK:DIAMOND_SWORD", catalog()));
        // WATER is not an item
        assert!(!is_valid("ITEM:USE_ITEM:WATER", catalog()));
    }

    #[test]
    fn test_non_alive_entity_rejected() {
        assert!(!is_valid("ENTITY:KILL_ENTITY:ARROW", catalog()));
    }

    #[test]
    fn test_overlong_key_rejected() {
        let long_stat = "A".repeat(STAT_KEY_LENGTH_MAX);
        let custom = StatCatalog::default().with_statistic(&long_stat, StatKind::Untyped);
        let key = encode(StatKind::Untyped, &long_stat, None);
        assert!(key.len() > STAT_KEY_LENGTH_MAX);
        assert!(!is_valid(&key, &custom));
        assert!(enumerate_all(&custom).is_empty());
    }

    #[test]
    fn test_encode_then_valid_for_every_triple() {
        let cat = catalog();
        for (stat, kind) in cat.statistics() {
            if kind.requires_qualifier() {
                for q in cat.qualifiers(kind) {
                    assert!(is_valid(&encode(kind, stat, Some(q)), cat));
                }
            } else {
                assert!(is_valid(&encode(kind, stat, None), cat));
            }
        }
    }

    #[test]
    fn test_enumerate_all_unique_and_valid() {
        let keys = enumerate_all(catalog());
        assert!(!keys.is_empty());

        let unique: HashSet<&String> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len(), "no duplicates");

        for key in &keys {
            assert!(is_valid(key, catalog()), "{key} must be valid");
        }
        assert!(keys.contains(&"UNTYPED:DEATHS".to_string()));
        assert!(keys.contains(&"ENTITY:KILL_ENTITY:CREEPER".to_string()));
        assert!(!keys.contains(&"ENTITY:KILL_ENTITY:ARROW".to_string()));
    }

    #[test]
    fn test_enumerate_is_deterministic() {
        assert_eq!(enumerate_all(catalog()), enumerate_all(catalog()));
    }
}
