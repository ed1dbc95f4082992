//! Feature listing: entries, matchers and filters for host UIs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::defs::FeatureDef;

/// One row in a feature listing: a catalogue feature as this character
/// currently sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    pub full_id: String,
    pub name: String,
    /// Ruleset-defined category tag ("skill", "class", ...).
    pub kind: String,
    pub option: Option<String>,
    pub ranks: u32,
    pub purchased: u32,
    pub max_ranks: u32,
    pub active: bool,
    /// Whether the character could purchase another rank right now.
    pub available: bool,
}

/// Static predicate over catalogue definitions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureMatcher {
    /// Restrict to these ids. Empty means any id.
    pub ids: BTreeSet<String>,
    pub kind: Option<String>,
    /// Every listed tag must be present.
    pub with_tags: BTreeSet<String>,
    /// None of these tags may be present.
    pub without_tags: BTreeSet<String>,
    pub parent: Option<String>,
}

impl FeatureMatcher {
    pub fn matches(&self, def: &FeatureDef) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&def.id) {
            return false;
        }
        if let Some(kind) = &self.kind {
            if &def.kind != kind {
                return false;
            }
        }
        if !self.with_tags.iter().all(|tag| def.tags.contains(tag)) {
            return false;
        }
        if self.without_tags.iter().any(|tag| def.tags.contains(tag)) {
            return false;
        }
        if let Some(parent) = &self.parent {
            if def.parent.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Dynamic filter for feature listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFilter {
    /// `Some(true)`: only features the character holds ranks in;
    /// `Some(false)`: only features they do not.
    pub taken: Option<bool>,
    /// `Some(true)`: only features purchasable right now.
    pub available: Option<bool>,
    pub matcher: Option<FeatureMatcher>,
}

impl FeatureFilter {
    pub fn taken() -> Self {
        Self {
            taken: Some(true),
            ..Self::default()
        }
    }

    pub fn available() -> Self {
        Self {
            available: Some(true),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defs::Ranks;

    fn def(id: &str, kind: &str, tags: &[&str], parent: Option<&str>) -> FeatureDef {
        FeatureDef {
            id: id.into(),
            kind: kind.into(),
            ranks: Ranks::Capped(1),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            parent: parent.map(String::from),
            ..FeatureDef::default()
        }
    }

    #[test]
    fn matcher_dimensions() {
        let fighter = def("fighter", "class", &["level", "martial"], None);
        let stance = def("stance", "skill", &["martial"], Some("fighter"));

        let by_kind = FeatureMatcher {
            kind: Some("class".into()),
            ..FeatureMatcher::default()
        };
        assert!(by_kind.matches(&fighter));
        assert!(!by_kind.matches(&stance));

        let by_tags = FeatureMatcher {
            with_tags: ["martial".to_string()].into(),
            without_tags: ["level".to_string()].into(),
            ..FeatureMatcher::default()
        };
        assert!(!by_tags.matches(&fighter));
        assert!(by_tags.matches(&stance));

        let by_parent = FeatureMatcher {
            parent: Some("fighter".into()),
            ..FeatureMatcher::default()
        };
        assert!(by_parent.matches(&stance));
        assert!(!by_parent.matches(&fighter));

        let by_id = FeatureMatcher {
            ids: ["fighter".to_string()].into(),
            ..FeatureMatcher::default()
        };
        assert!(by_id.matches(&fighter));
        assert!(!by_id.matches(&stance));
    }
}
