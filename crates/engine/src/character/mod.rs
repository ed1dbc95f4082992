//! Character controller: the single mutation surface over a character.
//!
//! The controller owns the arena of per-feature controllers and the property
//! aggregator, resolves requirement expressions against them, and drives the
//! grant-propagation cascade. Hosts never mutate feature or aggregator state
//! directly; everything goes through `purchase`/`grant` here so that the
//! persisted [`CharacterRecord`] and the derived state can never drift.

mod entry;
mod feature;

pub use entry::{FeatureEntry, FeatureFilter, FeatureMatcher};
pub use feature::{FeatureController, Priced, PropagationData};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::aggregate::{Aggregator, PropertySpec};
use crate::decision::Decision;
use crate::defs::{CharacterRecord, FlagValue, Ruleset};
use crate::error::EngineError;
use crate::expr::{PropExpr, PropertyLookup, Requirement};

/// Shared, validated ruleset handle; the factory for characters.
pub struct Engine {
    ruleset: Arc<Ruleset>,
}

impl Engine {
    /// Validate and adopt a ruleset. Definition ids are normalized from
    /// their catalogue keys first, so loaders don't have to set them.
    pub fn new(mut ruleset: Ruleset) -> Result<Self, EngineError> {
        for (id, feature) in &mut ruleset.features {
            feature.id = id.clone();
        }
        for (id, attribute) in &mut ruleset.attributes {
            attribute.id = id.clone();
        }
        ruleset.validate()?;
        Ok(Self {
            ruleset: Arc::new(ruleset),
        })
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    /// A fresh character with the ruleset's default flags.
    pub fn new_character(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<CharacterController, EngineError> {
        let record = CharacterRecord {
            id: id.into(),
            name: name.into(),
            ruleset_id: self.ruleset.id.clone(),
            ruleset_version: self.ruleset.version.clone(),
            ..CharacterRecord::default()
        };
        CharacterController::build(Arc::clone(&self.ruleset), record)
    }

    /// Rehydrate a persisted record: purchased ranks and metadata grants are
    /// replayed, and all derived state (granted ranks, discounts, aggregates)
    /// is recomputed from scratch.
    pub fn load_character(
        &self,
        record: CharacterRecord,
    ) -> Result<CharacterController, EngineError> {
        if record.ruleset_id != self.ruleset.id {
            return Err(EngineError::RulesetMismatch {
                record: record.ruleset_id,
                engine: self.ruleset.id.clone(),
            });
        }
        CharacterController::build(Arc::clone(&self.ruleset), record)
    }
}

/// Live state for one character.
pub struct CharacterController {
    ruleset: Arc<Ruleset>,
    record: CharacterRecord,
    features: BTreeMap<String, FeatureController>,
    aggregator: Aggregator,
}

impl CharacterController {
    fn build(ruleset: Arc<Ruleset>, mut record: CharacterRecord) -> Result<Self, EngineError> {
        for (flag, value) in &ruleset.default_flags {
            record
                .metadata
                .flags
                .entry(flag.clone())
                .or_insert_with(|| value.clone());
        }
        let mut controller = Self {
            aggregator: seed_aggregator(&ruleset)?,
            ruleset,
            record,
            features: BTreeMap::new(),
        };
        let purchases: Vec<(String, u32)> = controller
            .record
            .purchases
            .iter()
            .map(|(id, ranks)| (id.clone(), *ranks))
            .collect();
        for (full_id, ranks) in &purchases {
            controller.ensure_controller(full_id)?.set_purchased(*ranks);
        }
        for (full_id, _) in &purchases {
            let mut path = Vec::new();
            controller.reconcile_feature(full_id, &mut path)?;
        }
        let grants = controller.record.metadata.grants.clone();
        for text in grants {
            controller.apply_recorded_grant(&text)?;
        }
        controller.sync_aggregates()?;
        Ok(controller)
    }

    pub fn record(&self) -> &CharacterRecord {
        &self.record
    }

    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    pub fn feature_controller(&self, full_id: &str) -> Option<&FeatureController> {
        self.features.get(full_id)
    }

    /// Value of a property expression given as text.
    pub fn get(&self, text: &str) -> Result<i64, EngineError> {
        let expr = PropExpr::parse(text)?;
        Ok(PropertyLookup::get(self, &expr))
    }

    /// Largest single-source value of a property expression given as text.
    pub fn get_max(&self, text: &str) -> Result<i64, EngineError> {
        let expr = PropExpr::parse(text)?;
        Ok(PropertyLookup::get_max(self, &expr))
    }

    pub fn meets_requirements(&self, requirement: &Requirement) -> Decision {
        requirement.evaluate(self)
    }

    /// Guard form of [`CharacterController::purchase`]: same checks, no
    /// mutation. The expression's `:value` is the requested rank delta
    /// (default 1); a negative delta probes a sell-back.
    pub fn can_purchase(&self, text: &str) -> Result<Decision, EngineError> {
        let expr = PropExpr::parse(text)?;
        let amount = expr.value.unwrap_or(1);
        if amount >= 0 {
            Ok(self.can_increase(&expr, amount))
        } else {
            // i64::MIN has no positive counterpart.
            match amount.checked_neg() {
                Some(positive) => Ok(self.can_decrease(&expr, positive)),
                None => Ok(Decision::deny("Value must be positive.")),
            }
        }
    }

    /// Apply a purchase (or, with a negative `:value`, a sell-back). The
    /// guard re-runs first; on success purchased ranks are written, the grant
    /// cascade reconciled and the aggregates synced.
    pub fn purchase(&mut self, text: &str) -> Result<Decision, EngineError> {
        let expr = PropExpr::parse(text)?;
        let amount = expr.value.unwrap_or(1);
        if amount >= 0 {
            self.increase(&expr, amount)
        } else {
            match amount.checked_neg() {
                Some(positive) => self.decrease(&expr, positive),
                None => Ok(Decision::deny("Value must be positive.")),
            }
        }
    }

    /// Record and apply a plot-level grant expression (`lore#Geography:2`).
    pub fn grant(&mut self, text: &str) -> Result<(), EngineError> {
        self.apply_recorded_grant(text)?;
        self.record.metadata.grants.push(text.to_string());
        self.sync_aggregates()?;
        Ok(())
    }

    pub fn award(&mut self, currency: &str, amount: i64) {
        *self
            .record
            .metadata
            .awards
            .entry(currency.to_string())
            .or_insert(0) += amount;
        tracing::debug!(currency, amount, "award applied");
    }

    pub fn set_flag(&mut self, name: &str, value: FlagValue) {
        self.record.metadata.flags.insert(name.to_string(), value);
    }

    /// Spendable balance of a currency attribute: aggregated value (base plus
    /// grants) plus awards, minus everything spent on priced features.
    pub fn currency_available(&self, currency: &str) -> i64 {
        let base = self.aggregator.get(currency).unwrap_or(0);
        let awards = self
            .record
            .metadata
            .awards
            .get(currency)
            .copied()
            .unwrap_or(0);
        let spent: i64 = self
            .features
            .values()
            .filter_map(|fc| {
                let priced = fc.priced()?;
                let feature_currency = priced
                    .currency()
                    .or(self.ruleset.default_currency.as_deref())?;
                (feature_currency == currency).then(|| priced.spent())
            })
            .sum();
        base + awards - spent
    }

    /// Option values currently purchasable on `id`: fixed values plus
    /// `$flag` expansions (or values inherited from another feature's taken
    /// options), minus options failing their own requirements and, when
    /// `exclude_taken` is set, options already held.
    pub fn options_values_for_feature(&self, id: &str, exclude_taken: bool) -> BTreeSet<String> {
        let Some(def) = self.ruleset.feature(id) else {
            return BTreeSet::new();
        };
        let Some(option) = &def.option else {
            return BTreeSet::new();
        };
        let mut values: BTreeSet<String> = BTreeSet::new();
        if let Some(inherit) = &option.inherit {
            values = self.taken_options(inherit);
        } else {
            for value in &option.values {
                if !value.starts_with('$') {
                    values.insert(value.clone());
                }
            }
            // Flag expansions run after the fixed values so `-removals`
            // see the complete set regardless of sort order.
            for flag in option.values.iter().filter_map(|v| v.strip_prefix('$')) {
                let Some(flag_value) = self.record.metadata.flags.get(flag) else {
                    continue;
                };
                for entry in flag_value.as_values() {
                    match entry.strip_prefix('-') {
                        Some(removal) => {
                            values.remove(removal);
                        }
                        None => {
                            values.insert(entry);
                        }
                    }
                }
            }
        }
        values.retain(|value| {
            option
                .requires
                .get(value)
                .is_none_or(|req| self.meets_requirements(req).is_ok())
        });
        if exclude_taken {
            for taken in self.taken_options(id) {
                values.remove(&taken);
            }
        }
        values
    }

    /// Option values the character holds active instances of on `id`.
    pub fn taken_options(&self, id: &str) -> BTreeSet<String> {
        self.features
            .values()
            .filter(|fc| fc.base_id() == id && fc.is_active())
            .filter_map(|fc| fc.option().map(String::from))
            .collect()
    }

    /// Catalogue listing as this character sees it: taken instances plus
    /// untaken features, filtered by `filter`.
    pub fn list_features(&self, filter: &FeatureFilter) -> Vec<FeatureEntry> {
        let mut entries = Vec::new();
        let mut seen_bare: BTreeSet<&str> = BTreeSet::new();
        for fc in self.features.values() {
            let Some(def) = fc.definition() else {
                continue;
            };
            seen_bare.insert(fc.base_id());
            entries.push(self.entry_for(fc.full_id(), def.name.clone(), def.kind.clone()));
        }
        for (id, def) in &self.ruleset.features {
            if self.features.contains_key(id.as_str()) || seen_bare.contains(id.as_str()) {
                continue;
            }
            entries.push(self.entry_for(id, def.name.clone(), def.kind.clone()));
        }
        entries.retain(|entry| {
            if let Some(wanted) = filter.taken {
                if (entry.ranks > 0) != wanted {
                    return false;
                }
            }
            if let Some(wanted) = filter.available {
                if entry.available != wanted {
                    return false;
                }
            }
            if let Some(matcher) = &filter.matcher {
                let base = match PropExpr::parse(&entry.full_id) {
                    Ok(expr) => expr.prop,
                    Err(_) => return false,
                };
                match self.ruleset.feature(&base) {
                    Some(def) => {
                        if !matcher.matches(def) {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            true
        });
        entries
    }

    fn entry_for(&self, full_id: &str, name: String, kind: String) -> FeatureEntry {
        let fc = self.features.get(full_id);
        let ranks = fc.map_or(0, FeatureController::effective_ranks);
        let purchased = fc.map_or(0, FeatureController::purchased_ranks);
        let max_ranks = fc.map_or_else(
            || {
                PropExpr::parse(full_id)
                    .ok()
                    .and_then(|expr| self.ruleset.feature(&expr.prop))
                    .map_or(0, |def| def.max_ranks())
            },
            FeatureController::max_ranks,
        );
        let option = fc.and_then(|fc| fc.option().map(String::from));
        let available = PropExpr::parse(full_id)
            .map(|expr| {
                let probe = self.can_increase(&expr, 1);
                probe.is_ok() || probe.needs_option
            })
            .unwrap_or(false);
        FeatureEntry {
            full_id: full_id.to_string(),
            name,
            kind,
            option,
            ranks,
            purchased,
            max_ranks,
            active: ranks > 0,
            available,
        }
    }

    fn can_increase(&self, expr: &PropExpr, amount: i64) -> Decision {
        if let Some(denied) = feature::positive_amount(amount) {
            return denied;
        }
        let Some(def) = self.ruleset.feature(&expr.prop) else {
            return Decision::deny(format!("Feature {} not defined", expr.prop));
        };
        let full = expr.full_id();
        let (purchased, granted, discount) = match self.features.get(&full) {
            Some(fc) => (fc.purchased_ranks(), fc.granted_ranks(), fc.discount()),
            None => (0, 0, 0),
        };

        let headroom =
            i64::from(def.max_ranks()) - (i64::from(purchased) + granted.max(0));
        if amount > headroom {
            return Decision::deny_amount(
                format!("Feature {} is at maximum ranks", expr.prop),
                headroom.max(0),
            );
        }

        if let Some(parent) = &def.parent {
            if self.value_of(parent) <= 0 {
                return Decision::deny(format!(
                    "Feature {} requires {parent} to be active",
                    expr.prop
                ));
            }
        }

        let requirement = self.meets_requirements(&def.requires);
        if !requirement.is_ok() {
            return requirement;
        }

        match (&def.option, &expr.option) {
            (None, Some(_)) => {
                return Decision::deny(format!(
                    "Feature {} does not accept options.",
                    expr.prop
                ));
            }
            (Some(_), None) => return Decision::needs_option(),
            (Some(option), Some(value)) if purchased == 0 => {
                if let Some(cap) = option.multiple.cap() {
                    if self.taken_options(&expr.prop).len() as u32 >= cap {
                        return Decision::deny(format!(
                            "Feature {} cannot be taken with additional options",
                            expr.prop
                        ));
                    }
                }
                if !option.freeform
                    && !self
                        .options_values_for_feature(&expr.prop, true)
                        .contains(value)
                {
                    return Decision::deny(format!(
                        "'{value}' not a valid option for {}",
                        expr.prop
                    ));
                }
                if let Some(req) = option.requires.get(value) {
                    let decision = self.meets_requirements(req);
                    if !decision.is_ok() {
                        return decision;
                    }
                }
            }
            _ => {}
        }

        if let Some(cost) = &def.cost {
            if let Some(currency) = def
                .currency
                .as_deref()
                .or(self.ruleset.default_currency.as_deref())
            {
                let available = self.currency_available(currency);
                let delta = cost.cost_for(purchased, amount as u32, discount);
                if delta > available {
                    let mut affordable = def.max_ranks().saturating_sub(purchased);
                    while affordable > 0
                        && cost.cost_for(purchased, affordable, discount) > available
                    {
                        affordable -= 1;
                    }
                    return Decision::deny_amount(
                        format!(
                            "Need {delta} {} to purchase, but only have {available}",
                            currency.to_uppercase()
                        ),
                        i64::from(affordable),
                    );
                }
            }
        }

        Decision::ok()
    }

    fn can_decrease(&self, expr: &PropExpr, amount: i64) -> Decision {
        if let Some(denied) = feature::positive_amount(amount) {
            return denied;
        }
        if !self.ruleset.respend {
            return Decision::deny("Respend not currently available.");
        }
        if self.ruleset.feature(&expr.prop).is_none() {
            return Decision::deny(format!("Feature {} not defined", expr.prop));
        }
        let purchased = self
            .features
            .get(&expr.full_id())
            .map_or(0, FeatureController::purchased_ranks);
        if amount > i64::from(purchased) {
            return Decision::deny_amount(
                format!(
                    "Cannot remove {amount} ranks of {}, only {purchased} purchased",
                    expr.prop
                ),
                i64::from(purchased),
            );
        }
        Decision::ok()
    }

    fn increase(&mut self, expr: &PropExpr, amount: i64) -> Result<Decision, EngineError> {
        let guard = self.can_increase(expr, amount);
        if !guard.is_ok() {
            return Ok(guard);
        }
        let full = expr.full_id();
        let ranks = {
            let fc = self.ensure_controller(&full)?;
            let ranks = fc.purchased_ranks() + amount as u32;
            fc.set_purchased(ranks);
            ranks
        };
        self.record.purchases.insert(full.clone(), ranks);
        if let Some(denied) = self.cascade(&full)? {
            return Ok(denied);
        }
        tracing::debug!(feature = %full, ranks, "purchase applied");
        Ok(Decision::ok_amount(amount))
    }

    fn decrease(&mut self, expr: &PropExpr, amount: i64) -> Result<Decision, EngineError> {
        let guard = self.can_decrease(expr, amount);
        if !guard.is_ok() {
            return Ok(guard);
        }
        let full = expr.full_id();
        let ranks = {
            let fc = self.ensure_controller(&full)?;
            let ranks = fc.purchased_ranks().saturating_sub(amount as u32);
            fc.set_purchased(ranks);
            ranks
        };
        if ranks == 0 {
            self.record.purchases.remove(&full);
        } else {
            self.record.purchases.insert(full.clone(), ranks);
        }
        if let Some(denied) = self.cascade(&full)? {
            return Ok(denied);
        }
        tracing::debug!(feature = %full, ranks, "sell-back applied");
        Ok(Decision::ok_amount(amount))
    }

    /// Reconcile a feature and sync aggregates, turning a grant cycle into a
    /// failed decision instead of an error.
    fn cascade(&mut self, full_id: &str) -> Result<Option<Decision>, EngineError> {
        let mut path = Vec::new();
        match self.reconcile_feature(full_id, &mut path) {
            Ok(()) => {}
            Err(cycle @ EngineError::GrantCycle { .. }) => {
                tracing::warn!(feature = full_id, %cycle, "grant cycle");
                return Ok(Some(Decision::deny(cycle.to_string())));
            }
            Err(other) => return Err(other),
        }
        self.sync_aggregates()?;
        Ok(None)
    }

    fn ensure_controller(&mut self, full_id: &str) -> Result<&mut FeatureController, EngineError> {
        let expr = PropExpr::parse(full_id)?;
        let definition = self.ruleset.feature(&expr.prop).cloned();
        if definition.is_none() && !self.features.contains_key(full_id) {
            tracing::debug!(feature = full_id, "creating controller for undefined feature");
        }
        let controller = FeatureController::new(full_id, definition)?;
        Ok(self
            .features
            .entry(full_id.to_string())
            .or_insert(controller))
    }

    fn reconcile_feature(
        &mut self,
        full_id: &str,
        path: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        if path.iter().any(|step| step == full_id) {
            return Err(EngineError::GrantCycle {
                id: full_id.to_string(),
                path: path.join(" -> "),
            });
        }
        let policy = self.ruleset.grant_policy;
        let deltas = match self.features.get_mut(full_id) {
            Some(fc) => fc.reconcile(policy)?,
            None => return Ok(()),
        };
        if deltas.is_empty() {
            return Ok(());
        }
        path.push(full_id.to_string());
        for (target, data) in deltas {
            self.apply_propagation(full_id, &target, data, path)?;
        }
        path.pop();
        Ok(())
    }

    fn apply_propagation(
        &mut self,
        granter: &str,
        target: &str,
        data: PropagationData,
        path: &mut Vec<String>,
    ) -> Result<(), EngineError> {
        if data.is_empty() {
            return Ok(());
        }
        let expr = PropExpr::parse(target)?;
        let is_feature =
            self.ruleset.feature(&expr.prop).is_some() || self.features.contains_key(target);
        if !is_feature && (self.ruleset.attribute(&expr.prop).is_some()) {
            if !expr.prefixes.is_empty()
                && !self
                    .ruleset
                    .attribute(&expr.prop)
                    .is_some_and(|attr| attr.scoped)
            {
                tracing::warn!(granter, target, "attribute is not scoped; grant ignored");
                return Ok(());
            }
            if data.discount != 0 {
                tracing::warn!(
                    granter,
                    target,
                    "discount sent to an attribute has no effect"
                );
            }
            if data.grants != 0 {
                let key = expr.full_id();
                self.ensure_attribute_property(&expr)?;
                self.aggregator
                    .apply_mod(&key, data.grants as f64, granter)?;
            }
            return Ok(());
        }
        // Feature target: defined features participate fully; undefined ones
        // get an inert controller so the grant stays visible.
        let full = expr.full_id();
        self.ensure_controller(&full)?.propagate(data);
        self.reconcile_feature(&full, path)
    }

    /// Scoped attributes (`artisan.utilities`) materialize aggregator
    /// properties on demand, keyed by the full rendered id.
    fn ensure_attribute_property(&mut self, expr: &PropExpr) -> Result<(), EngineError> {
        let key = expr.full_id();
        if self.aggregator.has_property(&key) {
            return Ok(());
        }
        let mut spec = PropertySpec::attribute(&key);
        if let Some(attr) = self.ruleset.attribute(&expr.prop) {
            spec = spec.with_base(attr.default_value as f64);
            if let Some(min) = attr.min_value {
                spec.min_value = Some(min as f64);
            }
            if let Some(max) = attr.max_value {
                spec.max_value = Some(max as f64);
            }
        }
        self.aggregator.define_property(spec)?;
        Ok(())
    }

    /// Push effective-rank changes into the aggregator so tag roll-ups and
    /// multi-option aggregates see them.
    fn sync_aggregates(&mut self) -> Result<(), EngineError> {
        let mut writes = Vec::new();
        for fc in self.features.values_mut() {
            let delta = fc.take_sync_delta();
            if delta != 0 && fc.definition().is_some() {
                writes.push((fc.base_id().to_string(), fc.full_id().to_string(), delta));
            }
        }
        for (prop, source, delta) in writes {
            self.aggregator.apply_mod(&prop, delta as f64, &source)?;
        }
        Ok(())
    }

    fn apply_recorded_grant(&mut self, text: &str) -> Result<(), EngineError> {
        let expr = PropExpr::parse(text)?;
        let value = match expr.value {
            Some(0) | None => 1,
            Some(v) => v,
        };
        let mut path = Vec::new();
        self.apply_propagation(
            "metadata",
            &expr.full_id(),
            PropagationData {
                grants: value,
                discount: 0,
            },
            &mut path,
        )
    }

    fn value_of(&self, id: &str) -> i64 {
        PropExpr::parse(id)
            .map(|expr| PropertyLookup::get(self, &expr))
            .unwrap_or(0)
    }

    fn resolve(&self, expr: &PropExpr, max: bool) -> i64 {
        let full = expr.full_id();
        if let Some(fc) = self.features.get(&full) {
            return fc.value();
        }
        if expr.prefixes.is_empty() && self.ruleset.feature(&expr.prop).is_some() {
            if expr.option.is_some() || expr.slot.is_some() {
                // Defined feature, but this instance was never taken.
                return 0;
            }
            // Aggregate view across option instances: the aggregator property
            // carries one coalesced modifier per full id, so the total is the
            // sum and the per-source max is the biggest single instance.
            let value = if max {
                self.aggregator.get_max(&expr.prop)
            } else {
                self.aggregator.get(&expr.prop)
            };
            return value.unwrap_or(0);
        }
        let value = if max {
            self.aggregator.get_max(&full)
        } else {
            self.aggregator.get(&full)
        };
        value.unwrap_or(0)
    }
}

impl PropertyLookup for CharacterController {
    fn get(&self, expr: &PropExpr) -> i64 {
        self.resolve(expr, false)
    }

    fn get_max(&self, expr: &PropExpr) -> i64 {
        self.resolve(expr, true)
    }
}

fn seed_aggregator(ruleset: &Ruleset) -> Result<Aggregator, EngineError> {
    let mut aggregator = Aggregator::new();
    for (id, attribute) in &ruleset.attributes {
        let mut spec = if attribute.is_tag {
            PropertySpec::tag(id.clone())
        } else {
            PropertySpec::attribute(id.clone())
        };
        spec = spec.with_base(attribute.default_value as f64);
        if let Some(min) = attribute.min_value {
            spec.min_value = Some(min as f64);
        }
        if let Some(max) = attribute.max_value {
            spec.max_value = Some(max as f64);
        }
        aggregator.define_property(spec)?;
    }
    for (id, feature) in &ruleset.features {
        aggregator
            .define_property(PropertySpec::feature(id.clone()).with_tags(feature.tags.clone()))?;
    }
    Ok(aggregator)
}
