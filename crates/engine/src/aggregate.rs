//! Property aggregator: totals, clamps and tag roll-ups.
//!
//! Every numeric question the requirement language can ask bottoms out here.
//! Properties are defined once from the ruleset catalogue, then modified by
//! purchases and grants. A *tag* property stores no modifiers of its own; its
//! value is the union of the modifiers of every property tagged with its id,
//! which is how "total levels" emerges from individually purchased classes.
//!
//! Modifier values are kept as `f64` so scaling formulas can contribute
//! fractions; the public `get`/`get_max` surface is integer, rounded by the
//! property's [`Rounding`] policy (default: floor).

use std::cell::Cell;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::AggregatorError;

/// What a property represents, for introspection and listing.
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
pub enum PropertyKind {
    Feature,
    #[default]
    Attribute,
}

/// Per-property rounding policy for fractional totals.
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
pub enum Rounding {
    #[default]
    Floor,
    Ceil,
    Nearest,
}

impl Rounding {
    pub fn apply(self, value: f64) -> i64 {
        match self {
            Rounding::Floor => value.floor() as i64,
            Rounding::Ceil => value.ceil() as i64,
            Rounding::Nearest => value.round() as i64,
        }
    }
}

/// One contribution to a property's total.
#[derive(Clone, Debug, PartialEq)]
pub struct Modifier {
    /// Where the contribution came from, usually a full feature id. Coalesced
    /// properties merge modifiers sharing a source so that a rank bought in
    /// five separate events still reads as one contributor for `$` queries.
    pub source: String,
    pub value: f64,
}

/// Static shape of a property, built from the ruleset catalogue.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertySpec {
    pub id: String,
    pub kind: PropertyKind,
    pub base: f64,
    /// Lower clamp. Most game quantities never go negative, so this defaults
    /// to `Some(0.0)`; use [`PropertySpec::unclamped`] to switch it off.
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Clamp after every modifier instead of once after the sum.
    pub min_max_each: bool,
    /// Merge modifiers sharing a source key.
    pub coalesce: bool,
    /// This property is a roll-up of everything tagged with its id.
    /// Mutually exclusive with having `tags` of its own.
    pub is_tag: bool,
    /// Tag ids this property contributes to.
    pub tags: BTreeSet<String>,
    pub rounding: Rounding,
}

impl PropertySpec {
    fn base_spec(id: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            id: id.into(),
            kind,
            base: 0.0,
            min_value: Some(0.0),
            max_value: None,
            min_max_each: false,
            coalesce: true,
            is_tag: false,
            tags: BTreeSet::new(),
            rounding: Rounding::default(),
        }
    }

    pub fn feature(id: impl Into<String>) -> Self {
        Self::base_spec(id, PropertyKind::Feature)
    }

    pub fn attribute(id: impl Into<String>) -> Self {
        Self::base_spec(id, PropertyKind::Attribute)
    }

    /// An attribute whose value rolls up every property tagged with `id`.
    pub fn tag(id: impl Into<String>) -> Self {
        Self {
            is_tag: true,
            ..Self::base_spec(id, PropertyKind::Attribute)
        }
    }

    pub fn with_base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min_value = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }

    pub fn unclamped(mut self) -> Self {
        self.min_value = None;
        self.max_value = None;
        self
    }

    pub fn clamp_each(mut self) -> Self {
        self.min_max_each = true;
        self
    }

    pub fn uncoalesced(mut self) -> Self {
        self.coalesce = false;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = rounding;
        self
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut value = value;
        if let Some(min) = self.min_value {
            value = value.max(min);
        }
        if let Some(max) = self.max_value {
            value = value.min(max);
        }
        value
    }
}

#[derive(Clone, Copy)]
struct Cached {
    revision: u64,
    value: i64,
}

struct PropertyState {
    spec: PropertySpec,
    modifiers: Vec<Modifier>,
    value_cache: Cell<Option<Cached>>,
    max_cache: Cell<Option<Cached>>,
}

impl PropertyState {
    fn new(spec: PropertySpec) -> Self {
        Self {
            spec,
            modifiers: Vec::new(),
            value_cache: Cell::new(None),
            max_cache: Cell::new(None),
        }
    }
}

/// Owns all property state for one character.
///
/// Cache invalidation is deliberately coarse: any write bumps a global
/// revision, and a cached value is valid only for the revision it was
/// computed at. Tag properties can depend on any other property, so per-id
/// invalidation would have to chase the tag graph; invalidating everything is
/// the simplest implementation that is never stale.
#[derive(Default)]
pub struct Aggregator {
    properties: BTreeMap<String, PropertyState>,
    revision: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property. Definitions are built once from the catalogue;
    /// redefining an id is an authoring error, not a merge.
    pub fn define_property(&mut self, spec: PropertySpec) -> Result<(), AggregatorError> {
        if spec.is_tag && !spec.tags.is_empty() {
            return Err(AggregatorError::TagConflict(spec.id));
        }
        if self.properties.contains_key(&spec.id) {
            return Err(AggregatorError::AlreadyDefined(spec.id));
        }
        self.properties
            .insert(spec.id.clone(), PropertyState::new(spec));
        self.revision += 1;
        Ok(())
    }

    pub fn has_property(&self, id: &str) -> bool {
        self.properties.contains_key(id)
    }

    pub fn kind(&self, id: &str) -> Option<PropertyKind> {
        self.properties.get(id).map(|state| state.spec.kind)
    }

    /// Add a modifier attributed to `source`, summing into an existing
    /// modifier from the same source when the property coalesces.
    pub fn apply_mod(
        &mut self,
        id: &str,
        value: f64,
        source: &str,
    ) -> Result<(), AggregatorError> {
        let state = self
            .properties
            .get_mut(id)
            .ok_or_else(|| AggregatorError::Undefined(id.to_string()))?;
        if state.spec.is_tag {
            // Tag properties aggregate others; writes go to the contributors.
            return Err(AggregatorError::Undefined(id.to_string()));
        }
        if state.spec.coalesce {
            if let Some(existing) = state.modifiers.iter_mut().find(|m| m.source == source) {
                existing.value += value;
                self.revision += 1;
                return Ok(());
            }
        }
        state.modifiers.push(Modifier {
            source: source.to_string(),
            value,
        });
        self.revision += 1;
        Ok(())
    }

    /// Rounded, clamped total. `None` when the id is not defined.
    pub fn get(&self, id: &str) -> Option<i64> {
        let state = self.properties.get(id)?;
        if let Some(cached) = state.value_cache.get() {
            if cached.revision == self.revision {
                return Some(cached.value);
            }
        }
        let spec = &state.spec;
        let mut total = spec.base;
        for modifier in self.contributors(state) {
            total += modifier.value;
            if spec.min_max_each {
                total = spec.clamp(total);
            }
        }
        let value = spec.rounding.apply(spec.clamp(total));
        state.value_cache.set(Some(Cached {
            revision: self.revision,
            value,
        }));
        Some(value)
    }

    /// Rounded, clamped total of the single largest contributing source.
    /// Falls back to the base value when nothing has contributed.
    pub fn get_max(&self, id: &str) -> Option<i64> {
        let state = self.properties.get(id)?;
        if let Some(cached) = state.max_cache.get() {
            if cached.revision == self.revision {
                return Some(cached.value);
            }
        }
        let spec = &state.spec;
        let mut per_source: BTreeMap<&str, f64> = BTreeMap::new();
        for modifier in self.contributors(state) {
            *per_source.entry(modifier.source.as_str()).or_insert(0.0) += modifier.value;
        }
        let best = per_source
            .values()
            .map(|sum| spec.base + sum)
            .reduce(f64::max)
            .unwrap_or(spec.base);
        let value = spec.rounding.apply(spec.clamp(best));
        state.max_cache.set(Some(Cached {
            revision: self.revision,
            value,
        }));
        Some(value)
    }

    /// Modifiers feeding a property: its own list, or for a tag property the
    /// union of the lists of every property tagged with its id.
    fn contributors<'a>(&'a self, state: &'a PropertyState) -> Vec<&'a Modifier> {
        if !state.spec.is_tag {
            return state.modifiers.iter().collect();
        }
        self.properties
            .values()
            .filter(|other| other.spec.tags.contains(&state.spec.id))
            .flat_map(|other| other.modifiers.iter())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg() -> Aggregator {
        Aggregator::new()
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        let mut a = agg();
        a.define_property(PropertySpec::attribute("level")).unwrap();
        assert_eq!(
            a.define_property(PropertySpec::attribute("level")),
            Err(AggregatorError::AlreadyDefined("level".into()))
        );
    }

    #[test]
    fn is_tag_and_tags_are_mutually_exclusive() {
        let mut a = agg();
        let bad = PropertySpec::tag("level").with_tags(["other"]);
        assert_eq!(
            a.define_property(bad),
            Err(AggregatorError::TagConflict("level".into()))
        );
    }

    #[test]
    fn coalescing_merges_same_source() {
        let mut a = agg();
        a.define_property(PropertySpec::feature("fighter")).unwrap();
        for _ in 0..5 {
            a.apply_mod("fighter", 1.0, "fighter").unwrap();
        }
        assert_eq!(a.get("fighter"), Some(5));
        // One logical contributor, so the largest single source is also 5.
        assert_eq!(a.get_max("fighter"), Some(5));
    }

    #[test]
    fn tag_property_rolls_up_tagged_contributors() {
        let mut a = agg();
        a.define_property(PropertySpec::tag("level")).unwrap();
        a.define_property(PropertySpec::feature("fighter").with_tags(["level"]))
            .unwrap();
        a.define_property(PropertySpec::feature("wizard").with_tags(["level"]))
            .unwrap();
        a.apply_mod("fighter", 3.0, "fighter").unwrap();
        a.apply_mod("wizard", 5.0, "wizard").unwrap();
        assert_eq!(a.get("level"), Some(8));
        assert_eq!(a.get_max("level"), Some(5));
        assert_eq!(a.get("fighter"), Some(3));
    }

    #[test]
    fn get_max_reports_negative_sources() {
        let mut a = agg();
        let mut spec = PropertySpec::attribute("morale").with_base(2.0);
        spec.min_value = None;
        a.define_property(spec).unwrap();
        a.apply_mod("morale", -3.0, "curse").unwrap();
        // The only source totals base - 3, not base.
        assert_eq!(a.get("morale"), Some(-1));
        assert_eq!(a.get_max("morale"), Some(-1));

        // With no sources at all the base stands.
        a.define_property(PropertySpec::attribute("resolve").with_base(2.0))
            .unwrap();
        assert_eq!(a.get_max("resolve"), Some(2));
    }

    #[test]
    fn writes_to_tag_properties_are_rejected() {
        let mut a = agg();
        a.define_property(PropertySpec::tag("level")).unwrap();
        assert_eq!(
            a.apply_mod("level", 1.0, "x"),
            Err(AggregatorError::Undefined("level".into()))
        );
    }

    #[test]
    fn clamp_at_end_versus_each_step() {
        let mut end = agg();
        end.define_property(PropertySpec::attribute("pool")).unwrap();
        let mut each = agg();
        each.define_property(PropertySpec::attribute("pool").clamp_each())
            .unwrap();
        for a in [&mut end, &mut each] {
            for i in 0..4 {
                a.apply_mod("pool", -1.0, &format!("drain-{i}")).unwrap();
            }
            a.apply_mod("pool", 5.0, "boost").unwrap();
        }
        // Summed then clamped: -4 + 5 = 1. Clamped per step: 0 + 5 = 5.
        assert_eq!(end.get("pool"), Some(1));
        assert_eq!(each.get("pool"), Some(5));
    }

    #[test]
    fn cache_tracks_writes() {
        let mut a = agg();
        a.define_property(PropertySpec::feature("skill")).unwrap();
        assert_eq!(a.get("skill"), Some(0));
        a.apply_mod("skill", 2.0, "skill").unwrap();
        assert_eq!(a.get("skill"), Some(2));
        a.apply_mod("skill", 1.0, "grant").unwrap();
        assert_eq!(a.get("skill"), Some(3));
        assert_eq!(a.get_max("skill"), Some(2));
    }

    #[test]
    fn rounding_policies() {
        for (rounding, expect) in [
            (Rounding::Floor, 2),
            (Rounding::Ceil, 3),
            (Rounding::Nearest, 3),
        ] {
            let mut a = agg();
            a.define_property(PropertySpec::attribute("half").with_rounding(rounding))
                .unwrap();
            a.apply_mod("half", 2.5, "formula").unwrap();
            assert_eq!(a.get("half"), Some(expect), "{rounding}");
        }
    }

    #[test]
    fn min_clamp_defaults_to_zero() {
        let mut a = agg();
        a.define_property(PropertySpec::attribute("cp")).unwrap();
        a.apply_mod("cp", -3.0, "spend").unwrap();
        assert_eq!(a.get("cp"), Some(0));

        let mut a = agg();
        a.define_property(PropertySpec::attribute("delta").unclamped())
            .unwrap();
        a.apply_mod("delta", -3.0, "spend").unwrap();
        assert_eq!(a.get("delta"), Some(-3));
    }

    #[test]
    fn undefined_property_reads_none() {
        let a = agg();
        assert_eq!(a.get("nope"), None);
        assert_eq!(a.get_max("nope"), None);
    }

    #[test]
    fn base_feeds_both_totals() {
        let mut a = agg();
        a.define_property(PropertySpec::attribute("might").with_base(2.0))
            .unwrap();
        assert_eq!(a.get("might"), Some(2));
        assert_eq!(a.get_max("might"), Some(2));
        a.apply_mod("might", 1.0, "belt").unwrap();
        assert_eq!(a.get("might"), Some(3));
        assert_eq!(a.get_max("might"), Some(3));
    }
}
