//! Ruleset and character data definitions.
//!
//! Everything here is plain data with serde derives: the content layer loads
//! it from TOML, hosts persist [`CharacterRecord`]s as JSON, and the engine
//! consumes it read-only through an `Arc<Ruleset>`. The only behavior that
//! lives here is behavior intrinsic to the data: cost-table lookups, grant
//! declaration flattening, and catalogue validation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ExprParseError};
use crate::expr::{PropExpr, Requirement};

/// Rank cap for a feature: a fixed cap or "unlimited".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranks {
    Unlimited,
    #[serde(untagged)]
    Capped(u32),
}

impl Default for Ranks {
    fn default() -> Self {
        Ranks::Capped(1)
    }
}

impl Ranks {
    /// Effective cap. "Unlimited" features still need a finite bound for the
    /// decreasing affordability search; 101 exceeds any reachable budget in
    /// practice.
    pub fn cap(self) -> u32 {
        match self {
            Ranks::Unlimited => 101,
            Ranks::Capped(n) => n,
        }
    }
}

/// Tiered cost table: per-rank cost keyed by "rank at or above".
///
/// `{1 = 1, 3 = 2, 5 = 3}` prices ranks 1-2 at 1, ranks 3-4 at 2, and rank 5
/// and beyond at 3. Keys arrive as strings from TOML/JSON and are parsed on
/// the way in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, i64>", into = "BTreeMap<String, i64>")]
pub struct CostByRank(pub BTreeMap<u32, i64>);

impl TryFrom<BTreeMap<String, i64>> for CostByRank {
    type Error = String;

    fn try_from(raw: BTreeMap<String, i64>) -> Result<Self, Self::Error> {
        let mut table = BTreeMap::new();
        for (key, cost) in raw {
            let rank: u32 = key
                .parse()
                .map_err(|_| format!("cost table key {key:?} is not a rank"))?;
            table.insert(rank, cost);
        }
        Ok(CostByRank(table))
    }
}

impl From<CostByRank> for BTreeMap<String, i64> {
    fn from(table: CostByRank) -> Self {
        table.0.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

impl CostByRank {
    /// Undiscounted cost of one specific rank: the value at the greatest key
    /// at or below `rank`, falling back to the lowest entry for ranks below
    /// the first key.
    pub fn rank_cost(&self, rank: u32) -> i64 {
        self.0
            .range(..=rank)
            .next_back()
            .map(|(_, cost)| *cost)
            .or_else(|| self.0.values().next().copied())
            .unwrap_or(0)
    }
}

/// How a feature is priced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CostDef {
    Flat(i64),
    ByRank(CostByRank),
}

impl Default for CostDef {
    fn default() -> Self {
        CostDef::Flat(1)
    }
}

impl CostDef {
    /// Discounted cost of one rank. Discounts never reduce a rank below 1.
    pub fn rank_cost(&self, rank: u32, discount: i64) -> i64 {
        let base = match self {
            CostDef::Flat(cost) => *cost,
            CostDef::ByRank(table) => table.rank_cost(rank),
        };
        (base - discount).max(1)
    }

    /// Total cost to go from `current` ranks to `current + ranks`.
    pub fn cost_for(&self, current: u32, ranks: u32, discount: i64) -> i64 {
        (current + 1..=current + ranks)
            .map(|rank| self.rank_cost(rank, discount))
            .sum()
    }
}

/// Whether (and how often) an optioned feature may be taken with distinct
/// option values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Multiple {
    Flag(bool),
    Limit(u32),
}

impl Default for Multiple {
    fn default() -> Self {
        Multiple::Flag(false)
    }
}

impl Multiple {
    /// Maximum number of distinct option instances, `None` for unlimited.
    pub fn cap(self) -> Option<u32> {
        match self {
            Multiple::Flag(false) => Some(1),
            Multiple::Flag(true) => None,
            Multiple::Limit(n) => Some(n),
        }
    }
}

/// Option specification for features that take a player-chosen option.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionDef {
    /// Any text is a legal option value.
    pub freeform: bool,
    /// Fixed legal values. Entries starting with `$` expand to the values of
    /// the named character flag at evaluation time.
    pub values: BTreeSet<String>,
    /// Per-option-value requirements, on top of the feature's own `requires`.
    pub requires: BTreeMap<String, Requirement>,
    /// Inherit legal values from the options already taken on this feature.
    pub inherit: Option<String>,
    pub multiple: Multiple,
}

/// Grant / discount declaration mini-language: a bare `id[:value]` string, a
/// list of declarations, or a mapping from id to value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Grantable {
    Id(String),
    List(Vec<Grantable>),
    Map(BTreeMap<String, i64>),
}

impl Grantable {
    /// Flatten to `(full_id, value)` pairs. A bare id or an explicit `:0`
    /// means one rank.
    pub fn entries(&self) -> Result<Vec<(String, i64)>, ExprParseError> {
        let mut out = Vec::new();
        self.collect(&mut out)?;
        Ok(out)
    }

    fn collect(&self, out: &mut Vec<(String, i64)>) -> Result<(), ExprParseError> {
        match self {
            Grantable::Id(text) => {
                let expr = PropExpr::parse(text)?;
                let value = match expr.value {
                    Some(0) | None => 1,
                    Some(v) => v,
                };
                out.push((expr.full_id(), value));
            }
            Grantable::List(items) => {
                for item in items {
                    item.collect(out)?;
                }
            }
            Grantable::Map(map) => {
                for (id, value) in map {
                    let expr = PropExpr::parse(id)?;
                    out.push((expr.full_id(), *value));
                }
            }
        }
        Ok(())
    }

    /// Base property names referenced, for catalogue validation.
    pub fn identifiers(&self) -> Result<BTreeSet<String>, ExprParseError> {
        let mut ids = BTreeSet::new();
        for (full_id, _) in self.entries()? {
            ids.extend(PropExpr::parse(&full_id)?.identifiers());
        }
        Ok(ids)
    }
}

/// One purchasable feature in the catalogue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureDef {
    /// Populated from the table key by the loader.
    #[serde(skip)]
    pub id: String,
    pub name: String,
    /// Ruleset-defined category tag ("skill", "class", "perk").
    #[serde(rename = "type")]
    pub kind: String,
    pub ranks: Ranks,
    pub requires: Requirement,
    pub option: Option<OptionDef>,
    pub grants: Option<Grantable>,
    pub discounts: Option<Grantable>,
    pub cost: Option<CostDef>,
    /// Currency attribute this feature spends; defaults to the ruleset's
    /// `default_currency` when priced.
    pub currency: Option<String>,
    /// Tag attributes this feature's ranks roll up into.
    pub tags: BTreeSet<String>,
    /// A child feature can only be purchased directly while its parent is
    /// active.
    pub parent: Option<String>,
    pub description: Option<String>,
}

impl FeatureDef {
    pub fn max_ranks(&self) -> u32 {
        self.ranks.cap()
    }

    pub fn has_option(&self) -> bool {
        self.option.is_some()
    }
}

fn default_min() -> Option<i64> {
    Some(0)
}

/// A named attribute: a non-purchasable aggregated quantity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeDef {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub default_value: i64,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    /// Roll-up of every feature tagged with this attribute's id.
    pub is_tag: bool,
    /// Resolvable under scope prefixes (`artisan.utilities`).
    pub scoped: bool,
    /// This attribute is a spendable currency pool.
    pub currency: bool,
    pub hidden: bool,
}

impl Default for AttributeDef {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            default_value: 0,
            min_value: default_min(),
            max_value: None,
            is_tag: false,
            scoped: false,
            currency: false,
            hidden: false,
        }
    }
}

/// When grant propagation fires.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GrantPolicy {
    /// Grants fire only when a feature crosses the zero-rank boundary.
    #[default]
    Boundary,
    /// Grants scale with every effective-rank change.
    PerRank,
}

/// Free-form character flag value, used to extend option legality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Number(i64),
    Text(String),
    List(Vec<String>),
}

impl FlagValue {
    /// The flag's values as option strings.
    pub fn as_values(&self) -> Vec<String> {
        match self {
            FlagValue::Bool(_) | FlagValue::Number(_) => Vec::new(),
            FlagValue::Text(text) => vec![text.clone()],
            FlagValue::List(list) => list.clone(),
        }
    }
}

/// The complete rules catalogue an engine instance serves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ruleset {
    pub id: String,
    pub name: String,
    pub version: String,
    pub features: BTreeMap<String, FeatureDef>,
    pub attributes: BTreeMap<String, AttributeDef>,
    /// Flags applied to every new character, overridable per character.
    pub default_flags: BTreeMap<String, FlagValue>,
    pub grant_policy: GrantPolicy,
    /// Whether characters may currently sell ranks back.
    pub respend: bool,
    /// Currency attribute priced features spend by default.
    pub default_currency: Option<String>,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            version: String::new(),
            features: BTreeMap::new(),
            attributes: BTreeMap::new(),
            default_flags: BTreeMap::new(),
            grant_policy: GrantPolicy::default(),
            respend: true,
            default_currency: None,
        }
    }
}

impl Ruleset {
    pub fn feature(&self, id: &str) -> Option<&FeatureDef> {
        self.features.get(id)
    }

    pub fn attribute(&self, id: &str) -> Option<&AttributeDef> {
        self.attributes.get(id)
    }

    pub fn identifier_defined(&self, id: &str) -> bool {
        self.features.contains_key(id) || self.attributes.contains_key(id)
    }

    /// Static catalogue validation: every identifier referenced by a
    /// requirement, grant, discount, parent, inherit or currency declaration
    /// must be defined, and cost tables must not be empty.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (id, feature) in &self.features {
            let check = |referenced: &str| -> Result<(), EngineError> {
                if self.identifier_defined(referenced) {
                    Ok(())
                } else {
                    Err(EngineError::UnknownIdentifier {
                        id: referenced.to_string(),
                        referrer: id.clone(),
                    })
                }
            };
            for referenced in feature.requires.identifiers() {
                check(&referenced)?;
            }
            for grantable in [&feature.grants, &feature.discounts].into_iter().flatten() {
                for referenced in grantable.identifiers()? {
                    check(&referenced)?;
                }
            }
            if let Some(parent) = &feature.parent {
                check(parent)?;
            }
            if let Some(option) = &feature.option {
                if let Some(inherit) = &option.inherit {
                    check(inherit)?;
                }
                for requirement in option.requires.values() {
                    for referenced in requirement.identifiers() {
                        check(&referenced)?;
                    }
                }
            }
            if let Some(currency) = &feature.currency {
                if !self.attributes.get(currency).is_some_and(|attr| attr.currency) {
                    return Err(EngineError::InvalidDefinition {
                        id: id.clone(),
                        reason: format!("{currency:?} is not a currency attribute"),
                    });
                }
            }
            if let Some(CostDef::ByRank(table)) = &feature.cost {
                if table.0.is_empty() {
                    return Err(EngineError::InvalidDefinition {
                        id: id.clone(),
                        reason: "empty cost table".to_string(),
                    });
                }
            }
        }
        if let Some(currency) = &self.default_currency {
            if !self.attributes.get(currency).is_some_and(|attr| attr.currency) {
                return Err(EngineError::InvalidDefinition {
                    id: self.id.clone(),
                    reason: format!("default currency {currency:?} is not a currency attribute"),
                });
            }
        }
        Ok(())
    }
}

/// Per-character bookkeeping outside the purchase map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterMetadata {
    /// Currency awards, keyed by currency attribute id.
    pub awards: BTreeMap<String, i64>,
    /// Free-form flags; option specs can reference them with `$flag`.
    pub flags: BTreeMap<String, FlagValue>,
    /// Plot-granted feature expressions, replayed on load.
    pub grants: Vec<String>,
}

/// The persisted form of a character: purchased ranks plus metadata.
/// Everything else (granted ranks, discounts, aggregates) is recomputed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterRecord {
    pub id: String,
    pub name: String,
    pub ruleset_id: String,
    pub ruleset_version: String,
    /// Purchased ranks keyed by full feature id (option suffix included).
    pub purchases: BTreeMap<String, u32>,
    pub metadata: CharacterMetadata,
}
