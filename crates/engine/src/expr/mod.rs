//! Requirement expression language.
//!
//! Rulesets describe prerequisites, grants and lookups with a compact textual
//! grammar:
//!
//! ```text
//! prop['.'prefix chain]['@'slot]['+'|'#'option][':'value]['$'single]['<'less_than]
//! ```
//!
//! `lore#Undead_Lore` is the Lore feature taken with the "Undead Lore" option,
//! `caster:5` is "at least 5 levels of casting classes", `caster$5` is "at
//! least 5 levels in a *single* casting class", and `lore<2` is "fewer than 2
//! total ranks of Lore". A leading `!` or `-` negates a whole requirement.
//!
//! Parsing is total for any string matching the grammar and a hard error
//! otherwise; evaluation never mutates character state, it only reads through
//! the [`PropertyLookup`] capability.

mod evaluate;
mod parse;

pub use evaluate::PropertyLookup;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExprParseError;

/// Slot / tier designator (`spell@4`, `choice@primary`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    Index(i64),
    Name(String),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Index(i) => write!(f, "{i}"),
            Slot::Name(name) => f.write_str(name),
        }
    }
}

/// Which sigil introduced the option suffix in the source text.
///
/// Both are accepted on input; the original sigil is kept so that rendering
/// round-trips exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptionSigil {
    #[default]
    Plus,
    Hash,
}

impl OptionSigil {
    pub fn as_char(self) -> char {
        match self {
            OptionSigil::Plus => '+',
            OptionSigil::Hash => '#',
        }
    }
}

/// A parsed property expression: *what* is being asked about, plus at most
/// one comparison mode.
///
/// Evaluation precedence when several comparison suffixes are present is
/// `less_than` > `single` > `value`; the prefix chain, slot and option only
/// affect which property is looked up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropExpr {
    /// Base property name. Often a feature ID.
    pub prop: String,
    /// Dotted scope-prefix chain, outermost first (`artisan.utilities`).
    pub prefixes: Vec<String>,
    /// Slot or tier, for tiered properties like spell slots.
    pub slot: Option<Slot>,
    /// Player-chosen option value, stored with spaces (`Undead Lore`).
    pub option: Option<String>,
    /// "At least this many ranks". Defaults to 1 when absent.
    pub value: Option<i64>,
    /// "At least this many ranks from the single largest source."
    pub single: Option<i64>,
    /// "Strictly fewer than this many ranks."
    pub less_than: Option<i64>,
    /// Sigil used for the option suffix in the source text.
    pub option_sigil: OptionSigil,
}

impl PropExpr {
    pub fn new(prop: impl Into<String>) -> Self {
        Self {
            prop: prop.into(),
            prefixes: Vec::new(),
            slot: None,
            option: None,
            value: None,
            single: None,
            less_than: None,
            option_sigil: OptionSigil::default(),
        }
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.option = Some(option.into());
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_single(mut self, single: i64) -> Self {
        self.single = Some(single);
        self
    }

    pub fn with_less_than(mut self, less_than: i64) -> Self {
        self.less_than = Some(less_than);
        self
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn with_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// The rank threshold for the default comparison mode.
    pub fn threshold(&self) -> i64 {
        self.value.unwrap_or(1)
    }

    /// The identifying portion of the expression: prefixes, prop, slot and
    /// option, without any comparison suffixes. The option sigil is
    /// canonicalized to `+`, so `lore+History` and `lore#History` name the
    /// same instance.
    pub fn full_id(&self) -> String {
        self.render_id(OptionSigil::Plus)
    }

    fn render_id(&self, sigil: OptionSigil) -> String {
        let mut out = String::new();
        for prefix in &self.prefixes {
            out.push_str(prefix);
            out.push('.');
        }
        out.push_str(&self.prop);
        if let Some(slot) = &self.slot {
            out.push('@');
            out.push_str(&slot.to_string());
        }
        if let Some(option) = &self.option {
            out.push(sigil.as_char());
            out.push_str(&option.replace(' ', "_"));
        }
        out
    }

    /// Base property names referenced by this expression.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut ids: BTreeSet<String> = self.prefixes.iter().cloned().collect();
        ids.insert(self.prop.clone());
        ids
    }

    /// Splits off the first prefix layer. Returns `None` and an unchanged
    /// copy when there are no prefixes left.
    pub fn pop_prefix(&self) -> (Option<String>, PropExpr) {
        if self.prefixes.is_empty() {
            return (None, self.clone());
        }
        let mut rest = self.clone();
        let first = rest.prefixes.remove(0);
        (Some(first), rest)
    }
}

impl fmt::Display for PropExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_id(self.option_sigil))?;
        if let Some(value) = self.value {
            write!(f, ":{value}")?;
        }
        if let Some(single) = self.single {
            write!(f, "${single}")?;
        }
        if let Some(less_than) = self.less_than {
            write!(f, "<{less_than}")?;
        }
        Ok(())
    }
}

/// Requirement AST.
///
/// `AnyOf`/`AllOf` short-circuit; `AnyOf` collects the failure reason of
/// every branch it tried before reporting final failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RequirementSpec", into = "RequirementSpec")]
pub enum Requirement {
    /// Trivially true.
    Always,
    AnyOf(Vec<Requirement>),
    AllOf(Vec<Requirement>),
    NoneOf(Vec<Requirement>),
    Prop(PropExpr),
}

impl Default for Requirement {
    fn default() -> Self {
        Requirement::Always
    }
}

impl Requirement {
    /// Parse a single requirement string. A leading `!` or `-` negates it.
    pub fn parse(text: &str) -> Result<Self, ExprParseError> {
        if let Some(rest) = text.strip_prefix('!').or_else(|| text.strip_prefix('-')) {
            return Ok(Requirement::NoneOf(vec![Requirement::Prop(
                PropExpr::parse(rest)?,
            )]));
        }
        Ok(Requirement::Prop(PropExpr::parse(text)?))
    }

    /// Set of base property names this requirement references, used for
    /// static validation against the ruleset's identifier space.
    pub fn identifiers(&self) -> BTreeSet<String> {
        match self {
            Requirement::Always => BTreeSet::new(),
            Requirement::AnyOf(list)
            | Requirement::AllOf(list)
            | Requirement::NoneOf(list) => {
                list.iter().flat_map(Requirement::identifiers).collect()
            }
            Requirement::Prop(expr) => expr.identifiers(),
        }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Requirement::Always)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, name: &str, list: &[Requirement]) -> fmt::Result {
            write!(f, "{name}(")?;
            for (i, req) in list.iter().enumerate() {
                if i > 0 {
                    f.write_str("; ")?;
                }
                write!(f, "{req}")?;
            }
            f.write_str(")")
        }
        match self {
            Requirement::Always => f.write_str("Always"),
            Requirement::AnyOf(list) => join(f, "AnyOf", list),
            Requirement::AllOf(list) => join(f, "AllOf", list),
            Requirement::NoneOf(list) => join(f, "NoneOf", list),
            Requirement::Prop(expr) => write!(f, "{expr}"),
        }
    }
}

/// Structured (pre-parse) form of a requirement, as it appears in ruleset
/// definition data: a bare string, a list (implicit all-of), or an
/// `all`/`any`/`none` mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementSpec {
    Text(String),
    List(Vec<RequirementSpec>),
    All { all: Vec<RequirementSpec> },
    Any { any: Vec<RequirementSpec> },
    None { none: Vec<RequirementSpec> },
}

impl TryFrom<RequirementSpec> for Requirement {
    type Error = ExprParseError;

    fn try_from(spec: RequirementSpec) -> Result<Self, Self::Error> {
        fn compile_all(specs: Vec<RequirementSpec>) -> Result<Vec<Requirement>, ExprParseError> {
            specs.into_iter().map(Requirement::try_from).collect()
        }
        Ok(match spec {
            RequirementSpec::Text(text) if text.is_empty() => Requirement::Always,
            RequirementSpec::Text(text) => Requirement::parse(&text)?,
            RequirementSpec::List(list) => Requirement::AllOf(compile_all(list)?),
            RequirementSpec::All { all } => Requirement::AllOf(compile_all(all)?),
            RequirementSpec::Any { any } => Requirement::AnyOf(compile_all(any)?),
            RequirementSpec::None { none } => Requirement::NoneOf(compile_all(none)?),
        })
    }
}

impl From<Requirement> for RequirementSpec {
    fn from(req: Requirement) -> Self {
        fn specs(list: Vec<Requirement>) -> Vec<RequirementSpec> {
            list.into_iter().map(RequirementSpec::from).collect()
        }
        match req {
            // Empty text parses back to Always, keeping round-trips exact.
            Requirement::Always => RequirementSpec::Text(String::new()),
            Requirement::AnyOf(list) => RequirementSpec::Any { any: specs(list) },
            Requirement::AllOf(list) => RequirementSpec::All { all: specs(list) },
            Requirement::NoneOf(list) => RequirementSpec::None { none: specs(list) },
            Requirement::Prop(expr) => RequirementSpec::Text(expr.to_string()),
        }
    }
}
