//! Error types for the engine.
//!
//! Hard errors here are reserved for problems with the *ruleset or request
//! text itself* (parse failures, duplicate definitions, cyclic grant graphs).
//! Expected rule outcomes — "you can't afford this", "requirement not met" —
//! are [`crate::Decision`] values, never `Err`.

/// Failure to parse a property expression or requirement string.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ExprParseError {
    #[error("requirement parse failure for {0:?}")]
    Invalid(String),

    #[error("duplicate {suffix:?} suffix in {text:?}")]
    DuplicateSuffix { suffix: char, text: String },

    #[error("expected integer after {suffix:?} in {text:?}")]
    BadNumber { suffix: char, text: String },
}

/// Failure in the property aggregator.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AggregatorError {
    #[error("property {0} already defined")]
    AlreadyDefined(String),

    #[error("property {0} not defined")]
    Undefined(String),

    #[error("property definition {0} invalid, is_tag and tags are mutually exclusive")]
    TagConflict(String),
}

/// Failure at the engine / character-controller surface.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ExprParseError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    /// Grant propagation revisited a feature already on the cascade path.
    /// Rulesets must not author cyclic grant graphs; this reports the cycle
    /// instead of recursing without bound.
    #[error("grant cycle detected at {id} (path: {path})")]
    GrantCycle { id: String, path: String },

    #[error("identifier {id:?} referenced by {referrer:?} not found in ruleset")]
    UnknownIdentifier { id: String, referrer: String },

    #[error("definition {id} invalid: {reason}")]
    InvalidDefinition { id: String, reason: String },

    #[error("character record uses ruleset {record}, engine is {engine}")]
    RulesetMismatch { record: String, engine: String },
}
