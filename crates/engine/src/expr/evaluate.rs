//! Requirement evaluation against character state.

use super::{PropExpr, Requirement};
use crate::decision::Decision;

/// Read-only view of character state for requirement evaluation.
///
/// Implementors resolve the full expression (prefixes, slot, option
/// included), not just the base property name. Unknown properties resolve to
/// zero rather than erroring, so requirements on undefined identifiers simply
/// fail.
pub trait PropertyLookup {
    /// Total value of the property the expression names.
    fn get(&self, expr: &PropExpr) -> i64;

    /// Largest value contributed by any single source, for `$` comparisons.
    fn get_max(&self, expr: &PropExpr) -> i64;
}

impl PropExpr {
    /// Evaluate this expression's comparison against the lookup.
    ///
    /// Precedence: `less_than` wins over `single`, which wins over `value`.
    /// Failure reasons cite the expression and the observed-versus-required
    /// values so callers can surface them verbatim.
    pub fn check(&self, lookup: &dyn PropertyLookup) -> Decision {
        let ranks = lookup.get(self);
        if let Some(less_than) = self.less_than {
            if ranks >= less_than {
                return Decision::deny(format!("{self} [{ranks} >= {less_than}]"));
            }
            return Decision::ok();
        }
        if let Some(single) = self.single {
            let best = lookup.get_max(self);
            if best < single {
                return Decision::deny(format!("{self} [{best} < {single}]"));
            }
            return Decision::ok();
        }
        let threshold = self.threshold();
        if ranks < threshold {
            return Decision::deny(format!("{self} [{ranks} < {threshold}]"));
        }
        Decision::ok()
    }
}

impl Requirement {
    /// Evaluate the requirement tree. `AllOf` and `NoneOf` short-circuit;
    /// `AnyOf` tries every branch and aggregates the failure reasons.
    pub fn evaluate(&self, lookup: &dyn PropertyLookup) -> Decision {
        match self {
            Requirement::Always => Decision::ok(),
            Requirement::AllOf(list) => {
                for req in list {
                    let decision = req.evaluate(lookup);
                    if !decision.is_ok() {
                        return decision;
                    }
                }
                Decision::ok()
            }
            Requirement::AnyOf(list) => {
                let mut reasons = Vec::with_capacity(list.len());
                for req in list {
                    let decision = req.evaluate(lookup);
                    if decision.is_ok() {
                        return decision;
                    }
                    reasons.push(decision.reason_or_unspecified().to_string());
                }
                Decision::deny(format!("AnyOf({})", reasons.join("; ")))
            }
            Requirement::NoneOf(list) => {
                for req in list {
                    if req.evaluate(lookup).is_ok() {
                        return Decision::deny(format!("Not({req})"));
                    }
                }
                Decision::ok()
            }
            Requirement::Prop(expr) => expr.check(lookup),
        }
    }
}
