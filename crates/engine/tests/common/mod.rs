#![allow(dead_code)]

//! Shared catalogue fixture for the integration tests.

use std::collections::BTreeMap;

use chargen_engine::{
    AttributeDef, CharacterController, CostByRank, CostDef, Engine, FeatureDef, Grantable,
    Multiple, OptionDef, Ranks, Requirement, Ruleset,
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

pub fn ruleset() -> Ruleset {
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
        "scholar-patron".to_string(),
        FeatureDef {
            grants: Some(Grantable::Id("costly-skill:2".to_string())),
            ..skill("Scholar Patron", 2, 1)
        },
    );

    features.insert(
        "conscription".to_string(),
        FeatureDef {
            grants: Some(Grantable::Id("fighter:2".to_string())),
            ..skill("Conscription", 1, 1)
        },
    );

    features.insert(
        "sponsor".to_string(),
        FeatureDef {
            grants: Some(Grantable::Map([("cp".to_string(), 2)].into_iter().collect())),
            ..skill("Sponsor", 1, 3)
        },
    );

    features.insert(
        "weapon-specialization".to_string(),
        FeatureDef {
            parent: Some("fighter".to_string()),
            requires: Requirement::parse("martial:2").unwrap(),
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
                requires: [(
                    "Religion".to_string(),
                    Requirement::parse("wizard").unwrap(),
                )]
                .into_iter()
                .collect(),
                multiple: Multiple::Flag(true),
                ..OptionDef::default()
            }),
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

    features.insert(
        "artisan".to_string(),
        FeatureDef {
            grants: Some(Grantable::Id("artisan.utilities:2".to_string())),
            ..skill("Artisan", 2, 1)
        },
    );

    // A deliberate authoring error, used to exercise the cycle guard.
    features.insert(
        "ouroboros-a".to_string(),
        FeatureDef {
            grants: Some(Grantable::Id("ouroboros-b".to_string())),
            ..skill("Ouroboros A", 1, 1)
        },
    );
    features.insert(
        "ouroboros-b".to_string(),
        FeatureDef {
            grants: Some(Grantable::Id("ouroboros-a".to_string())),
            ..skill("Ouroboros B", 1, 1)
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
    attributes.insert(
        "utilities".to_string(),
        AttributeDef {
            scoped: true,
            ..attribute("Utilities")
        },
    );
    attributes.insert("level".to_string(), tag_attribute("Level"));
    attributes.insert("martial".to_string(), tag_attribute("Martial Levels"));
    attributes.insert("arcane".to_string(), tag_attribute("Arcane Levels"));
    attributes.insert("caster".to_string(), tag_attribute("Caster Levels"));

    Ruleset {
        id: "fixture".to_string(),
        name: "Fixture Ruleset".to_string(),
        version: "1.0".to_string(),
        features,
        attributes,
        default_currency: Some("cp".to_string()),
        ..Ruleset::default()
    }
}

pub fn engine() -> Engine {
    Engine::new(ruleset()).unwrap()
}

/// A fresh character with `cp` awarded.
pub fn funded_character(engine: &Engine, cp: i64) -> CharacterController {
    let mut character = engine.new_character("pc-1", "Tester").unwrap();
    character.award("cp", cp);
    character
}

/// Assert a requirement string evaluates as expected against a character.
pub fn assert_req(character: &CharacterController, text: &str, expected: bool) {
    let requirement = Requirement::parse(text).unwrap();
    let decision = character.meets_requirements(&requirement);
    assert_eq!(
        decision.is_ok(),
        expected,
        "{text}: {:?}",
        decision.reason
    );
}
