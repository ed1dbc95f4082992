//! Per-feature state: purchased ranks, grant bookkeeping, cost math.
//!
//! A controller exists for every *full* feature id a character has touched
//! (base id plus option suffix, e.g. `lore#Undead_Lore`). The only persisted
//! quantity is `purchased`; granted ranks and discounts are rebuilt from
//! propagation every load.

use crate::decision::Decision;
use crate::defs::{CostDef, FeatureDef, GrantPolicy};
use crate::error::ExprParseError;
use crate::expr::PropExpr;

/// Delta sent from one controller to another when grants fire.
/// Deactivation sends the exact inverse of activation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropagationData {
    pub grants: i64,
    pub discount: i64,
}

impl PropagationData {
    pub fn is_empty(&self) -> bool {
        self.grants == 0 && self.discount == 0
    }

    fn scaled(self, factor: i64) -> Self {
        Self {
            grants: self.grants * factor,
            discount: self.discount * factor,
        }
    }
}

/// State machine per feature: inactive (`effective_ranks == 0`) or active.
/// Transitions happen through writes to `purchased`/`granted` followed by
/// [`FeatureController::reconcile`].
#[derive(Clone, Debug)]
pub struct FeatureController {
    full_id: String,
    expr: PropExpr,
    /// `None` for features a ruleset grants but never defines; these stay
    /// inert (not purchasable, no propagation) but remain visible.
    definition: Option<FeatureDef>,
    purchased: u32,
    granted: i64,
    discount: i64,
    /// `None` until the first reconcile.
    effective: Option<u32>,
    /// Last value pushed into the aggregator, for delta syncing.
    applied: i64,
}

impl FeatureController {
    pub fn new(
        full_id: impl Into<String>,
        definition: Option<FeatureDef>,
    ) -> Result<Self, ExprParseError> {
        let full_id = full_id.into();
        let expr = PropExpr::parse(&full_id)?;
        Ok(Self {
            full_id,
            expr,
            definition,
            purchased: 0,
            granted: 0,
            discount: 0,
            effective: None,
            applied: 0,
        })
    }

    pub fn full_id(&self) -> &str {
        &self.full_id
    }

    /// Base feature id, without any option suffix.
    pub fn base_id(&self) -> &str {
        &self.expr.prop
    }

    pub fn option(&self) -> Option<&str> {
        self.expr.option.as_deref()
    }

    pub fn definition(&self) -> Option<&FeatureDef> {
        self.definition.as_ref()
    }

    pub fn purchased_ranks(&self) -> u32 {
        self.purchased
    }

    pub fn granted_ranks(&self) -> i64 {
        self.granted
    }

    pub fn discount(&self) -> i64 {
        self.discount
    }

    pub fn max_ranks(&self) -> u32 {
        self.definition
            .as_ref()
            .map_or(u32::MAX, FeatureDef::max_ranks)
    }

    fn compute_effective(&self) -> u32 {
        let raw = i64::from(self.purchased) + self.granted;
        raw.clamp(0, i64::from(self.max_ranks())) as u32
    }

    /// Effective ranks as of the last reconcile (computed fresh if none has
    /// happened yet).
    pub fn effective_ranks(&self) -> u32 {
        self.effective.unwrap_or_else(|| self.compute_effective())
    }

    pub fn is_active(&self) -> bool {
        self.effective_ranks() > 0
    }

    pub fn value(&self) -> i64 {
        i64::from(self.effective_ranks())
    }

    /// Ranks the player is actually paying for. When grants push the total
    /// over the cap, purchased ranks beyond the cap are treated as refunded.
    pub fn paid_ranks(&self) -> u32 {
        let total = i64::from(self.purchased) + self.granted.max(0);
        if total <= i64::from(self.max_ranks()) {
            return self.purchased;
        }
        (i64::from(self.max_ranks()) - self.granted.max(0)).max(0) as u32
    }

    pub fn set_purchased(&mut self, ranks: u32) {
        self.purchased = ranks;
    }

    /// Apply an incoming grant delta. The owner must reconcile afterwards.
    pub fn propagate(&mut self, data: PropagationData) {
        self.granted += data.grants;
        self.discount += data.discount;
    }

    /// Recompute effective ranks and return the propagation deltas this
    /// change produces. Under [`GrantPolicy::Boundary`] only zero-boundary
    /// crossings propagate; under [`GrantPolicy::PerRank`] the declarations
    /// scale with the effective-rank delta.
    pub fn reconcile(
        &mut self,
        policy: GrantPolicy,
    ) -> Result<Vec<(String, PropagationData)>, ExprParseError> {
        let previous = i64::from(self.effective.unwrap_or(0));
        let current = self.compute_effective();
        self.effective = Some(current);
        let current = i64::from(current);

        let factor = match policy {
            GrantPolicy::Boundary => match (previous > 0, current > 0) {
                (false, true) => 1,
                (true, false) => -1,
                _ => 0,
            },
            GrantPolicy::PerRank => current - previous,
        };
        if factor == 0 {
            return Ok(Vec::new());
        }
        self.gather(factor)
    }

    fn gather(&self, factor: i64) -> Result<Vec<(String, PropagationData)>, ExprParseError> {
        let Some(def) = &self.definition else {
            return Ok(Vec::new());
        };
        let mut out: Vec<(String, PropagationData)> = Vec::new();
        if let Some(grants) = &def.grants {
            for (target, value) in grants.entries()? {
                out.push((
                    target,
                    PropagationData {
                        grants: value,
                        discount: 0,
                    }
                    .scaled(factor),
                ));
            }
        }
        if let Some(discounts) = &def.discounts {
            for (target, value) in discounts.entries()? {
                out.push((
                    target,
                    PropagationData {
                        grants: 0,
                        discount: value,
                    }
                    .scaled(factor),
                ));
            }
        }
        Ok(out)
    }

    /// Change in effective value since the last aggregator sync.
    pub fn take_sync_delta(&mut self) -> i64 {
        let value = self.value();
        let delta = value - self.applied;
        self.applied = value;
        delta
    }

    /// Cost view; `None` for unpriced or undefined features.
    pub fn priced(&self) -> Option<Priced<'_>> {
        let def = self.definition.as_ref()?;
        let cost = def.cost.as_ref()?;
        Some(Priced {
            cost,
            currency: def.currency.as_deref(),
            purchased: self.purchased,
            paid: self.paid_ranks(),
            max_ranks: self.max_ranks(),
            discount: self.discount,
        })
    }
}

/// Capability view over a priced feature: all cost math lives here.
pub struct Priced<'a> {
    cost: &'a CostDef,
    currency: Option<&'a str>,
    purchased: u32,
    paid: u32,
    max_ranks: u32,
    discount: i64,
}

impl Priced<'_> {
    /// Feature-specific currency id, if the definition names one.
    pub fn currency(&self) -> Option<&str> {
        self.currency
    }

    /// Currency spent on the ranks currently paid for.
    pub fn spent(&self) -> i64 {
        self.cost.cost_for(0, self.paid, self.discount)
    }

    /// Incremental cost of the next `ranks` ranks.
    pub fn cost_to_increase(&self, ranks: u32) -> i64 {
        self.cost.cost_for(self.purchased, ranks, self.discount)
    }

    /// Currency returned when selling back the top `ranks` ranks.
    pub fn refund_for(&self, ranks: u32) -> i64 {
        let ranks = ranks.min(self.paid);
        self.cost.cost_for(self.paid - ranks, ranks, self.discount)
    }

    /// Largest rank increase whose incremental cost fits in `budget`.
    /// Decreasing linear search: step tables and discounts make the cost
    /// function non-linear, so there is no closed form.
    pub fn max_rank_increase(&self, budget: i64) -> u32 {
        let mut ranks = self.max_ranks.saturating_sub(self.purchased);
        while ranks > 0 {
            if self.cost_to_increase(ranks) <= budget {
                return ranks;
            }
            ranks -= 1;
        }
        0
    }
}

/// Guard shared by the purchase paths: a rank change must be positive.
pub fn positive_amount(value: i64) -> Option<Decision> {
    if value <= 0 {
        return Some(Decision::deny("Value must be positive."));
    }
    None
}
