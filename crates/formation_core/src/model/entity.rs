use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ids::EntityId;
use super::role::Role;

/// Fixed-size attribute vector of an entity. All values are 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityAttributes {
    pub pace: u8,
    pub passing: u8,
    pub stamina: u8,
    pub defending: u8,
    pub finishing: u8,
    pub technique: u8,
    pub physical: u8,
    pub goalkeeping: u8,
    /// Recent form (50 = neutral)
    pub form: u8,
}

impl EntityAttributes {
    pub const SKILLS: [&'static str; 8] = [
        "pace",
        "passing",
        "stamina",
        "defending",
        "finishing",
        "technique",
        "physical",
        "goalkeeping",
    ];

    /// Every attribute set to `value` (form included).
    pub fn uniform(value: u8) -> Self {
        Self {
            pace: value,
            passing: value,
            stamina: value,
            defending: value,
            finishing: value,
            technique: value,
            physical: value,
            goalkeeping: value,
            form: value,
        }
    }

    /// Skill attributes in [`Self::SKILLS`] order (form excluded).
    pub fn skills(&self) -> [f32; 8] {
        [
            self.pace as f32,
            self.passing as f32,
            self.stamina as f32,
            self.defending as f32,
            self.finishing as f32,
            self.technique as f32,
            self.physical as f32,
            self.goalkeeping as f32,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.skills().iter().all(|v| *v <= 100.0) && self.form <= 100
    }
}

impl Default for EntityAttributes {
    fn default() -> Self {
        Self::uniform(50)
    }
}

/// Selection availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Available,
    /// Carrying a knock; selectable with a discount
    Doubtful,
    Injured,
    Suspended,
}

impl Availability {
    pub fn is_selectable(&self) -> bool {
        matches!(self, Availability::Available | Availability::Doubtful)
    }
}

/// Roster record of an entity (player). Read-only to the editing core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub natural_role: Role,
    #[serde(default)]
    pub attributes: EntityAttributes,
    #[serde(default = "default_age")]
    pub age: u8,
    #[serde(default)]
    pub nationality: String,
    #[serde(default)]
    pub club: String,
    /// Months spent at the current club
    #[serde(default)]
    pub months_at_club: u16,
    /// Morale level 1..=5 (3 = neutral)
    #[serde(default = "default_morale")]
    pub morale: u8,
    #[serde(default)]
    pub availability: Availability,
}

fn default_age() -> u8 {
    25
}

fn default_morale() -> u8 {
    3
}

impl Entity {
    pub fn new(id: u32, name: impl Into<String>, natural_role: Role) -> Self {
        Self {
            id: EntityId(id),
            name: name.into(),
            natural_role,
            attributes: EntityAttributes::default(),
            age: default_age(),
            nationality: String::new(),
            club: String::new(),
            months_at_club: 0,
            morale: default_morale(),
            availability: Availability::Available,
        }
    }

    pub fn with_attributes(mut self, attributes: EntityAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_age(mut self, age: u8) -> Self {
        self.age = age;
        self
    }

    pub fn with_nationality(mut self, nationality: impl Into<String>) -> Self {
        self.nationality = nationality.into();
        self
    }

    pub fn with_club(mut self, club: impl Into<String>, months_at_club: u16) -> Self {
        self.club = club.into();
        self.months_at_club = months_at_club;
        self
    }

    pub fn with_morale(mut self, morale: u8) -> Self {
        self.morale = morale.clamp(1, 5);
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Overall rating in the natural role (0..=100). Used as the assignment tie-break.
    pub fn rating(&self) -> f32 {
        raw_role_fit(&self.attributes, self.natural_role)
    }
}

/// Weighted attribute fit for a role, before familiarity and availability (0..=100).
pub fn raw_role_fit(attributes: &EntityAttributes, role: Role) -> f32 {
    let weights = role.attribute_weights();
    let skills = attributes.skills();
    let total_weight: f32 = weights.iter().sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = weights.iter().zip(skills.iter()).map(|(w, s)| w * s).sum();
    weighted / total_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goalkeeper_rating_driven_by_goalkeeping() {
        let mut attrs = EntityAttributes::uniform(40);
        attrs.goalkeeping = 90;
        let gk = Entity::new(1, "Keeper", Role::GK).with_attributes(attrs);
        let st = Entity::new(2, "Striker", Role::ST).with_attributes(attrs);
        assert!(gk.rating() > st.rating());
    }

    #[test]
    fn test_entity_defaults_from_json() {
        let e: Entity =
            serde_json::from_str(r#"{"id": 4, "name": "Kim", "natural_role": "CM"}"#).unwrap();
        assert_eq!(e.morale, 3);
        assert_eq!(e.availability, Availability::Available);
        assert_eq!(e.attributes, EntityAttributes::uniform(50));
    }

    #[test]
    fn test_availability_selectable() {
        assert!(Availability::Doubtful.is_selectable());
        assert!(!Availability::Injured.is_selectable());
        assert!(!Availability::Suspended.is_selectable());
    }
}
