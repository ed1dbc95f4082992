//! Text scanner for property expressions.
//!
//! Suffixes are accepted in any order (`x:2+Opt` and `x+Opt:2` are the same
//! expression); rendering always emits the canonical order `@`, option, `:`,
//! `$`, `<`. Underscores in option text stand for spaces and are translated
//! on the way in and back out.

use std::str::FromStr;

use super::{OptionSigil, PropExpr, Requirement, Slot};
use crate::error::ExprParseError;

const SUFFIXES: &[char] = &['@', '+', '#', ':', '$', '<'];

fn is_ident(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Splits `rest` at the next suffix sigil, returning `(token, remainder)`
/// where the remainder still starts with the sigil.
fn token(rest: &str) -> (&str, &str) {
    match rest.find(SUFFIXES) {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    }
}

impl PropExpr {
    /// Parse a property expression. Fails on anything outside the grammar:
    /// empty segments, whitespace, duplicate suffixes, non-numeric values.
    pub fn parse(text: &str) -> Result<Self, ExprParseError> {
        let invalid = || ExprParseError::Invalid(text.to_string());
        let dup = |suffix| ExprParseError::DuplicateSuffix {
            suffix,
            text: text.to_string(),
        };

        let mut segments: Vec<&str> = text.split('.').collect();
        let tail = segments.pop().ok_or_else(invalid)?;
        for prefix in &segments {
            if !is_ident(prefix) {
                return Err(invalid());
            }
        }

        let (prop, mut rest) = token(tail);
        if !is_ident(prop) {
            return Err(invalid());
        }
        let mut expr =
            PropExpr::new(prop).with_prefixes(segments.iter().map(|s| s.to_string()).collect());

        while !rest.is_empty() {
            let sigil = rest.chars().next().ok_or_else(invalid)?;
            let body = &rest[sigil.len_utf8()..];
            let (tok, next) = token(body);
            match sigil {
                '@' => {
                    if expr.slot.is_some() {
                        return Err(dup('@'));
                    }
                    if tok.is_empty() || tok.chars().any(char::is_whitespace) {
                        return Err(invalid());
                    }
                    expr.slot = Some(match tok.parse::<i64>() {
                        Ok(index) => Slot::Index(index),
                        Err(_) => Slot::Name(tok.to_string()),
                    });
                }
                '+' | '#' => {
                    if expr.option.is_some() {
                        return Err(dup(sigil));
                    }
                    if tok.is_empty() || tok.chars().any(char::is_whitespace) {
                        return Err(invalid());
                    }
                    expr.option = Some(tok.replace('_', " "));
                    expr.option_sigil = if sigil == '#' {
                        OptionSigil::Hash
                    } else {
                        OptionSigil::Plus
                    };
                }
                ':' | '$' | '<' => {
                    let field = match sigil {
                        ':' => &mut expr.value,
                        '$' => &mut expr.single,
                        _ => &mut expr.less_than,
                    };
                    if field.is_some() {
                        return Err(dup(sigil));
                    }
                    let number = tok.parse::<i64>().map_err(|_| ExprParseError::BadNumber {
                        suffix: sigil,
                        text: text.to_string(),
                    })?;
                    *field = Some(number);
                }
                _ => return Err(invalid()),
            }
            rest = next;
        }
        Ok(expr)
    }
}

impl FromStr for PropExpr {
    type Err = ExprParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        PropExpr::parse(text)
    }
}

impl FromStr for Requirement {
    type Err = ExprParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Requirement::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(text: &str) -> PropExpr {
        let expr = PropExpr::parse(text).unwrap();
        assert_eq!(expr.to_string(), text, "round-trip of {text:?}");
        expr
    }

    #[test]
    fn bare_property() {
        let expr = roundtrip("feature-id");
        assert_eq!(expr.prop, "feature-id");
        assert_eq!(expr.threshold(), 1);
        assert!(expr.prefixes.is_empty());
    }

    #[test]
    fn value_suffix() {
        let expr = roundtrip("feature-id:5");
        assert_eq!(expr.value, Some(5));
        // :1 is semantically the default but must still round-trip verbatim.
        let expr = roundtrip("feature-id:1");
        assert_eq!(expr.value, Some(1));
        let expr = roundtrip("feature-id:-2");
        assert_eq!(expr.value, Some(-2));
    }

    #[test]
    fn option_suffix_translates_underscores() {
        let expr = roundtrip("feature-id+Option_Text");
        assert_eq!(expr.option.as_deref(), Some("Option Text"));
        assert_eq!(expr.option_sigil, OptionSigil::Plus);

        let expr = roundtrip("lore#Undead_Lore");
        assert_eq!(expr.option.as_deref(), Some("Undead Lore"));
        assert_eq!(expr.option_sigil, OptionSigil::Hash);
    }

    #[test]
    fn slot_suffix() {
        assert_eq!(roundtrip("spell@4").slot, Some(Slot::Index(4)));
        assert_eq!(
            roundtrip("choice@primary").slot,
            Some(Slot::Name("primary".into()))
        );
        assert_eq!(roundtrip("spell@-1").slot, Some(Slot::Index(-1)));
    }

    #[test]
    fn comparison_suffixes() {
        assert_eq!(roundtrip("caster$5").single, Some(5));
        assert_eq!(roundtrip("lore<2").less_than, Some(2));
        assert_eq!(roundtrip("caster$0").single, Some(0));
    }

    #[test]
    fn prefix_chain() {
        let expr = roundtrip("one.two.three@1+My_Option:2$3<4");
        assert_eq!(expr.prefixes, ["one", "two"]);
        assert_eq!(expr.prop, "three");
        assert_eq!(expr.slot, Some(Slot::Index(1)));
        assert_eq!(expr.option.as_deref(), Some("My Option"));
        assert_eq!(expr.value, Some(2));
        assert_eq!(expr.single, Some(3));
        assert_eq!(expr.less_than, Some(4));
    }

    #[test]
    fn suffix_order_is_irrelevant_on_input() {
        let canonical = PropExpr::parse("x@2+Opt:3").unwrap();
        assert_eq!(PropExpr::parse("x:3+Opt@2").unwrap(), canonical);
        assert_eq!(PropExpr::parse("x+Opt@2:3").unwrap(), canonical);
        // Rendering normalizes to canonical order.
        assert_eq!(PropExpr::parse("x:3+Opt@2").unwrap().to_string(), "x@2+Opt:3");
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["", ".", "a..b", ".a", "a b", "x@", "x+", "x@a b"] {
            assert!(
                matches!(PropExpr::parse(bad), Err(ExprParseError::Invalid(_))),
                "{bad:?} should be invalid"
            );
        }
        assert_eq!(
            PropExpr::parse("x:2:3"),
            Err(ExprParseError::DuplicateSuffix {
                suffix: ':',
                text: "x:2:3".into()
            })
        );
        assert_eq!(
            PropExpr::parse("x+A#B"),
            Err(ExprParseError::DuplicateSuffix {
                suffix: '#',
                text: "x+A#B".into()
            })
        );
        assert_eq!(
            PropExpr::parse("x:abc"),
            Err(ExprParseError::BadNumber {
                suffix: ':',
                text: "x:abc".into()
            })
        );
        assert_eq!(
            PropExpr::parse("x<"),
            Err(ExprParseError::BadNumber {
                suffix: '<',
                text: "x<".into()
            })
        );
    }

    #[test]
    fn negation_builds_none_of() {
        let req = Requirement::parse("!fighter:3").unwrap();
        assert_eq!(
            req,
            Requirement::NoneOf(vec![Requirement::Prop(
                PropExpr::new("fighter").with_value(3)
            )])
        );
        assert_eq!(Requirement::parse("-basic"), Requirement::parse("!basic"));
    }
}
