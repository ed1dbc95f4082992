//! Rules-evaluation engine for declarative character-build systems.
//!
//! `chargen-engine` defines the canonical evaluation machinery (requirement
//! expressions, property aggregation, feature reconciliation) and exposes the
//! character controller as the single mutation surface. Ruleset content is
//! data consumed through the types in [`defs`]; loading that data from text
//! lives in the companion `chargen-content` crate.
pub mod aggregate;
pub mod character;
pub mod decision;
pub mod defs;
pub mod error;
pub mod expr;

pub use aggregate::{Aggregator, Modifier, PropertyKind, PropertySpec, Rounding};
pub use character::{
    CharacterController, Engine, FeatureEntry, FeatureFilter, FeatureMatcher, PropagationData,
};
pub use decision::Decision;
pub use defs::{
    AttributeDef, CharacterMetadata, CharacterRecord, CostByRank, CostDef, FeatureDef, FlagValue,
    GrantPolicy, Grantable, Multiple, OptionDef, Ranks, Ruleset,
};
pub use error::{AggregatorError, EngineError, ExprParseError};
pub use expr::{PropExpr, PropertyLookup, Requirement, RequirementSpec, Slot};
