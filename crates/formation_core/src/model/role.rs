use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::FormationError;

/// Tactical role label of a slot (and an entity's natural role).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    GK,
    LB,
    CB,
    RB,
    LWB,
    RWB,
    CDM,
    CM,
    CAM,
    LM,
    RM,
    LW,
    RW,
    CF,
    ST,
}

/// Role families. Declaration order is the slot-priority ordering used for
/// deterministic tie-breaks (goalkeeper, then defense, midfield, attack).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RoleGroup {
    Goalkeeper,
    Defense,
    Midfield,
    Attack,
}

impl Role {
    pub const ALL: [Role; 15] = [
        Role::GK,
        Role::LB,
        Role::CB,
        Role::RB,
        Role::LWB,
        Role::RWB,
        Role::CDM,
        Role::CM,
        Role::CAM,
        Role::LM,
        Role::RM,
        Role::LW,
        Role::RW,
        Role::CF,
        Role::ST,
    ];

    pub fn group(&self) -> RoleGroup {
        match self {
            Role::GK => RoleGroup::Goalkeeper,
            Role::LB | Role::CB | Role::RB | Role::LWB | Role::RWB => RoleGroup::Defense,
            Role::CDM | Role::CM | Role::CAM | Role::LM | Role::RM => RoleGroup::Midfield,
            Role::LW | Role::RW | Role::CF | Role::ST => RoleGroup::Attack,
        }
    }

    /// Depth line: 0 = goalkeeper ... 5 = striker line
    pub fn line(&self) -> i8 {
        match self {
            Role::GK => 0,
            Role::LB | Role::CB | Role::RB => 1,
            Role::LWB | Role::RWB | Role::CDM => 2,
            Role::CM | Role::LM | Role::RM => 3,
            Role::CAM | Role::LW | Role::RW => 4,
            Role::CF | Role::ST => 5,
        }
    }

    /// Lateral lane: -1 = left, 0 = central, 1 = right
    pub fn lane(&self) -> i8 {
        match self {
            Role::LB | Role::LWB | Role::LM | Role::LW => -1,
            Role::RB | Role::RWB | Role::RM | Role::RW => 1,
            _ => 0,
        }
    }

    /// Whether an entity whose natural role is `self` can reasonably play `target`.
    pub fn is_compatible(&self, target: Role) -> bool {
        match (self, target) {
            (a, b) if *a == b => true,

            // GK conversions are never compatible
            (Role::GK, _) | (_, Role::GK) => false,

            (Role::CB, Role::CDM) | (Role::CDM, Role::CB) => true,
            (Role::LB, Role::LWB) | (Role::LWB, Role::LB) => true,
            (Role::RB, Role::RWB) | (Role::RWB, Role::RB) => true,
            (Role::LB, Role::LM) | (Role::LM, Role::LB) => true,
            (Role::RB, Role::RM) | (Role::RM, Role::RB) => true,
            (Role::LWB, Role::LW) | (Role::LW, Role::LWB) => true,
            (Role::RWB, Role::RW) | (Role::RW, Role::RWB) => true,

            (Role::CDM, Role::CM) | (Role::CM, Role::CDM) => true,
            (Role::CM, Role::CAM) | (Role::CAM, Role::CM) => true,
            (Role::CAM, Role::CF) | (Role::CF, Role::CAM) => true,
            (Role::LM, Role::LW) | (Role::LW, Role::LM) => true,
            (Role::RM, Role::RW) | (Role::RW, Role::RM) => true,

            (Role::CF, Role::ST) | (Role::ST, Role::CF) => true,

            _ => false,
        }
    }

    /// Multiplier applied to raw attribute fit when an entity plays `target`.
    pub fn familiarity(&self, target: Role) -> f32 {
        if *self == target {
            1.0
        } else if self.is_compatible(target) {
            0.85
        } else if *self == Role::GK || target == Role::GK {
            // 필드 플레이어 ↔ GK 전환은 사실상 불가
            0.05
        } else if self.group() == target.group() {
            0.7
        } else {
            0.45
        }
    }

    /// Attribute weights in [`crate::model::EntityAttributes::SKILLS`] order:
    /// pace, passing, stamina, defending, finishing, technique, physical, goalkeeping.
    pub fn attribute_weights(&self) -> [f32; 8] {
        match self {
            Role::GK => [0.5, 1.0, 0.5, 0.5, 0.0, 0.5, 1.0, 6.0],
            Role::CB => [1.5, 1.5, 1.5, 3.0, 0.3, 1.0, 3.0, 0.0],
            Role::LB | Role::RB => [2.5, 2.0, 2.0, 2.5, 0.5, 1.5, 1.5, 0.0],
            Role::LWB | Role::RWB => [3.0, 2.0, 3.0, 2.0, 0.5, 2.0, 1.0, 0.0],
            Role::CDM => [1.5, 2.5, 2.5, 3.0, 0.5, 2.0, 2.5, 0.0],
            Role::CM => [1.5, 3.0, 2.5, 2.0, 1.0, 3.0, 1.5, 0.0],
            Role::CAM => [2.0, 3.0, 1.5, 0.5, 2.0, 3.0, 1.0, 0.0],
            Role::LM | Role::RM => [2.5, 2.5, 2.5, 1.0, 1.0, 2.5, 1.0, 0.0],
            Role::LW | Role::RW => [3.0, 2.0, 1.5, 0.5, 2.0, 3.0, 1.0, 0.0],
            Role::CF => [2.0, 2.5, 1.5, 0.3, 3.0, 3.0, 1.5, 0.0],
            Role::ST => [2.5, 1.0, 1.5, 0.3, 3.0, 2.0, 2.5, 0.0],
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Role::GK => "GK",
            Role::LB => "LB",
            Role::CB => "CB",
            Role::RB => "RB",
            Role::LWB => "LWB",
            Role::RWB => "RWB",
            Role::CDM => "CDM",
            Role::CM => "CM",
            Role::CAM => "CAM",
            Role::LM => "LM",
            Role::RM => "RM",
            Role::LW => "LW",
            Role::RW => "RW",
            Role::CF => "CF",
            Role::ST => "ST",
        }
    }
}

impl FromStr for Role {
    type Err = FormationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.code() == upper)
            .ok_or_else(|| FormationError::validation(format!("unknown role '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_priority_order() {
        assert!(RoleGroup::Goalkeeper < RoleGroup::Defense);
        assert!(RoleGroup::Defense < RoleGroup::Midfield);
        assert!(RoleGroup::Midfield < RoleGroup::Attack);
        assert_eq!(Role::CDM.group(), RoleGroup::Midfield);
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        for a in Role::ALL {
            for b in Role::ALL {
                assert_eq!(a.is_compatible(b), b.is_compatible(a), "{:?} vs {:?}", a, b);
            }
        }
        assert!(!Role::GK.is_compatible(Role::CB));
        assert!(Role::CF.is_compatible(Role::ST));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("cam".parse::<Role>().unwrap(), Role::CAM);
        assert!("sweeper".parse::<Role>().is_err());
    }
}
