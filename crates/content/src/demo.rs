//! A small built-in ruleset exercising every engine mechanism: tagged
//! classes, tiered costs, grants, discounts, options and parent gating.

use std::collections::BTreeMap;

use chargen_engine::{
    AttributeDef, CostByRank, CostDef, FeatureDef, Grantable, Multiple, OptionDef, Ranks,
    Requirement, Ruleset,
};

fn attribute(name: &str) -> AttributeDef {
    AttributeDef {
        name: name.to_string(),
        ..AttributeDef::default()
    }
}

fn tag_attribute(name: &str) -> AttributeDef {
    AttributeDef {
        is_tag: true,
        ..attribute(name)
    }
}

fn class(name: &str, tags: &[&str]) -> FeatureDef {
    FeatureDef {
        name: name.to_string(),
        kind: "class".to_string(),
        ranks: Ranks::Capped(20),
        cost: Some(CostDef::Flat(2)),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..FeatureDef::default()
    }
}

fn skill(name: &str, cost: i64, ranks: u32) -> FeatureDef {
    FeatureDef {
        name: name.to_string(),
        kind: "skill".to_string(),
        ranks: Ranks::Capped(ranks),
        cost: Some(CostDef::Flat(cost)),
        ..FeatureDef::default()
    }
}

fn req(text: &str) -> Requirement {
    // Demo requirement strings are fixed and known-good.
    Requirement::parse(text).unwrap_or(Requirement::Always)
}

/// Build the demo catalogue.
pub fn demo_ruleset() -> Ruleset {
    let mut features = BTreeMap::new();

    features.insert("fighter".to_string(), class("Fighter", &["level", "martial"]));
    features.insert(
        "wizard".to_string(),
        class("Wizard", &["level", "arcane", "caster"]),
    );
    features.insert("druid".to_string(), class("Druid", &["level", "caster"]));

    features.insert("basic-skill".to_string(), skill("Basic Skill", 1, 1));

    features.insert(
        "costly-skill".to_string(),
        FeatureDef {
            cost: Some(CostDef::ByRank(CostByRank(
                [(1, 1), (3, 2), (5, 3)].into_iter().collect(),
            ))),
            ranks: Ranks::Capped(5),
            ..skill("Costly Skill", 1, 5)
        },
    );

    features.insert(
        "patron".to_string(),
        FeatureDef {
            grants: Some(Grantable::List(vec![
                Grantable::Id("basic-skill".to_string()),
                Grantable::Map([("cp".to_string(), 2)].into_iter().collect()),
            ])),
            ..skill("Patron", 3, 1)
        },
    );

    features.insert(
        "guild-membership".to_string(),
        FeatureDef {
            discounts: Some(Grantable::Map(
                [("costly-skill".to_string(), 1)].into_iter().collect(),
            )),
            ..skill("Guild Membership", 2, 1)
        },
    );

    features.insert(
        "weapon-specialization".to_string(),
        FeatureDef {
            parent: Some("fighter".to_string()),
            requires: req("martial:2"),
            ..skill("Weapon Specialization", 2, 3)
        },
    );

    features.insert(
        "lore".to_string(),
        FeatureDef {
            option: Some(OptionDef {
                values: ["History", "Geography", "Religion", "$extra_lores"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
                requires: [("Religion".to_string(), req("wizard"))].into_iter().collect(),
                multiple: Multiple::Flag(true),
                ..OptionDef::default()
            }),
            ranks: Ranks::Capped(3),
            ..skill("Lore", 1, 3)
        },
    );

    features.insert(
        "lore-mastery".to_string(),
        FeatureDef {
            option: Some(OptionDef {
                inherit: Some("lore".to_string()),
                multiple: Multiple::Flag(true),
                ..OptionDef::default()
            }),
            ..skill("Lore Mastery", 2, 1)
        },
    );

    features.insert(
        "hobby".to_string(),
        FeatureDef {
            option: Some(OptionDef {
                freeform: true,
                multiple: Multiple::Limit(2),
                ..OptionDef::default()
            }),
            ..skill("Hobby", 1, 1)
        },
    );

    let mut attributes = BTreeMap::new();
    attributes.insert(
        "cp".to_string(),
        AttributeDef {
            currency: true,
            ..attribute("Character Points")
        },
    );
    attributes.insert("level".to_string(), tag_attribute("Level"));
    attributes.insert("martial".to_string(), tag_attribute("Martial Levels"));
    attributes.insert("arcane".to_string(), tag_attribute("Arcane Levels"));
    attributes.insert("caster".to_string(), tag_attribute("Caster Levels"));

    Ruleset {
        id: "demo".to_string(),
        name: "Demo Ruleset".to_string(),
        version: "1.0".to_string(),
        features,
        attributes,
        default_currency: Some("cp".to_string()),
        ..Ruleset::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chargen_engine::Engine;

    #[test]
    fn demo_catalogue_validates() {
        Engine::new(demo_ruleset()).unwrap();
    }
}
