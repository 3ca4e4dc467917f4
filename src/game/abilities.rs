use serde::{Deserialize, Serialize};

/// What an ability does when used. Beyond HP/MP/SP arithmetic the server
/// only arbitrates cost and ownership; cosmetic effects are named events
/// the client renders.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AbilityEffect {
    /// Heals the caster by a fixed amount.
    Heal(u32),
    /// Client-side handicap/cosmetic event; no server-enforced mutation
    /// beyond the mana cost.
    Cosmetic,
}

/// One catalog entry.
#[derive(Clone, Copy, Debug)]
pub struct Ability {
    pub id: &'static str,
    pub sp_cost: u32,
    pub mp_cost: u32,
    pub effect: AbilityEffect,
}

/// Static ability catalog.
pub const CATALOG: &[Ability] = &[
    Ability {
        id: "healio",
        sp_cost: 4,
        mp_cost: 5,
        effect: AbilityEffect::Heal(20),
    },
    Ability {
        id: "deletio",
        sp_cost: 6,
        mp_cost: 6,
        effect: AbilityEffect::Cosmetic,
    },
    Ability {
        id: "syntaxio",
        sp_cost: 5,
        mp_cost: 4,
        effect: AbilityEffect::Cosmetic,
    },
    Ability {
        id: "lightio",
        sp_cost: 3,
        mp_cost: 3,
        effect: AbilityEffect::Cosmetic,
    },
    Ability {
        id: "hugio",
        sp_cost: 3,
        mp_cost: 3,
        effect: AbilityEffect::Cosmetic,
    },
    Ability {
        id: "smallio",
        sp_cost: 3,
        mp_cost: 3,
        effect: AbilityEffect::Cosmetic,
    },
];

pub fn find(id: &str) -> Option<&'static Ability> {
    CATALOG.iter().find(|ability| ability.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<&str> = CATALOG.iter().map(|a| a.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn healio_heals() {
        let healio = find("healio").unwrap();
        assert_eq!(healio.effect, AbilityEffect::Heal(20));
    }

    #[test]
    fn unknown_ability_is_none() {
        assert!(find("cheatio").is_none());
    }
}
