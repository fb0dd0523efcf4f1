//! Formation templates
//!
//! Anchor positions for the supported shapes, on the normalised pitch:
//! - X: 0 = left touchline, 100 = right touchline
//! - Y: 0 = own goal line, 100 = opponent goal line

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::geometry::{FieldBounds, Position};
use super::ids::SlotId;
use super::role::Role;
use crate::error::FormationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum FormationTemplate {
    #[serde(rename = "4-4-2")]
    F442,
    #[serde(rename = "4-3-3")]
    F433,
    #[serde(rename = "4-2-3-1")]
    F4231,
    #[serde(rename = "3-5-2")]
    F352,
    #[serde(rename = "5-3-2")]
    F532,
    #[serde(rename = "3-4-3")]
    F343,
    #[serde(rename = "4-1-4-1")]
    F4141,
}

/// Goalkeeper may not leave the penalty area.
const GK_REGION: FieldBounds = FieldBounds { x_min: 20.0, x_max: 80.0, y_min: 0.0, y_max: 17.0 };

impl FormationTemplate {
    pub const ALL: [FormationTemplate; 7] = [
        FormationTemplate::F442,
        FormationTemplate::F433,
        FormationTemplate::F4231,
        FormationTemplate::F352,
        FormationTemplate::F532,
        FormationTemplate::F343,
        FormationTemplate::F4141,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            FormationTemplate::F442 => "4-4-2",
            FormationTemplate::F433 => "4-3-3",
            FormationTemplate::F4231 => "4-2-3-1",
            FormationTemplate::F352 => "3-5-2",
            FormationTemplate::F532 => "5-3-2",
            FormationTemplate::F343 => "3-4-3",
            FormationTemplate::F4141 => "4-1-4-1",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let compact: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
        FormationTemplate::ALL
            .iter()
            .copied()
            .find(|t| t.code().chars().filter(|c| c.is_ascii_digit()).collect::<String>() == compact)
    }

    /// Role and anchor for each slot, goalkeeper first.
    pub fn anchors(&self) -> Vec<(Role, Position)> {
        let p = Position::new;
        match self {
            FormationTemplate::F442 => vec![
                (Role::GK, p(50.0, 4.0)),
                (Role::LB, p(15.0, 25.0)),
                (Role::CB, p(35.0, 20.0)),
                (Role::CB, p(65.0, 20.0)),
                (Role::RB, p(85.0, 25.0)),
                (Role::LM, p(15.0, 50.0)),
                (Role::CM, p(35.0, 45.0)),
                (Role::CM, p(65.0, 45.0)),
                (Role::RM, p(85.0, 50.0)),
                (Role::ST, p(35.0, 78.0)),
                (Role::ST, p(65.0, 78.0)),
            ],
            FormationTemplate::F433 => vec![
                (Role::GK, p(50.0, 4.0)),
                (Role::LB, p(15.0, 25.0)),
                (Role::CB, p(35.0, 20.0)),
                (Role::CB, p(65.0, 20.0)),
                (Role::RB, p(85.0, 25.0)),
                (Role::CM, p(30.0, 45.0)),
                (Role::CM, p(50.0, 42.0)),
                (Role::CM, p(70.0, 45.0)),
                (Role::LW, p(12.0, 75.0)),
                (Role::ST, p(50.0, 82.0)),
                (Role::RW, p(88.0, 75.0)),
            ],
            FormationTemplate::F4231 => vec![
                (Role::GK, p(50.0, 4.0)),
                (Role::LB, p(15.0, 25.0)),
                (Role::CB, p(35.0, 20.0)),
                (Role::CB, p(65.0, 20.0)),
                (Role::RB, p(85.0, 25.0)),
                (Role::CDM, p(35.0, 38.0)),
                (Role::CDM, p(65.0, 38.0)),
                (Role::LM, p(20.0, 62.0)),
                (Role::CAM, p(50.0, 60.0)),
                (Role::RM, p(80.0, 62.0)),
                (Role::ST, p(50.0, 82.0)),
            ],
            FormationTemplate::F352 => vec![
                (Role::GK, p(50.0, 4.0)),
                (Role::CB, p(25.0, 20.0)),
                (Role::CB, p(50.0, 18.0)),
                (Role::CB, p(75.0, 20.0)),
                (Role::LWB, p(10.0, 45.0)),
                (Role::CM, p(30.0, 42.0)),
                (Role::CM, p(50.0, 40.0)),
                (Role::CM, p(70.0, 42.0)),
                (Role::RWB, p(90.0, 45.0)),
                (Role::ST, p(35.0, 78.0)),
                (Role::ST, p(65.0, 78.0)),
            ],
            FormationTemplate::F532 => vec![
                (Role::GK, p(50.0, 4.0)),
                (Role::LWB, p(10.0, 30.0)),
                (Role::CB, p(28.0, 20.0)),
                (Role::CB, p(50.0, 18.0)),
                (Role::CB, p(72.0, 20.0)),
                (Role::RWB, p(90.0, 30.0)),
                (Role::CM, p(30.0, 45.0)),
                (Role::CM, p(50.0, 42.0)),
                (Role::CM, p(70.0, 45.0)),
                (Role::ST, p(35.0, 78.0)),
                (Role::ST, p(65.0, 78.0)),
            ],
            FormationTemplate::F343 => vec![
                (Role::GK, p(50.0, 4.0)),
                (Role::CB, p(25.0, 20.0)),
                (Role::CB, p(50.0, 18.0)),
                (Role::CB, p(75.0, 20.0)),
                (Role::LM, p(15.0, 48.0)),
                (Role::CM, p(35.0, 45.0)),
                (Role::CM, p(65.0, 45.0)),
                (Role::RM, p(85.0, 48.0)),
                (Role::LW, p(15.0, 75.0)),
                (Role::ST, p(50.0, 82.0)),
                (Role::RW, p(85.0, 75.0)),
            ],
            FormationTemplate::F4141 => vec![
                (Role::GK, p(50.0, 4.0)),
                (Role::LB, p(15.0, 25.0)),
                (Role::CB, p(35.0, 20.0)),
                (Role::CB, p(65.0, 20.0)),
                (Role::RB, p(85.0, 25.0)),
                (Role::CDM, p(50.0, 35.0)),
                (Role::LM, p(15.0, 55.0)),
                (Role::CM, p(35.0, 52.0)),
                (Role::CM, p(65.0, 52.0)),
                (Role::RM, p(85.0, 55.0)),
                (Role::ST, p(50.0, 82.0)),
            ],
        }
    }

    /// Slots for this template, ids numbered from 0 in anchor order.
    pub fn slots(&self) -> Vec<super::formation::Slot> {
        self.anchors()
            .into_iter()
            .enumerate()
            .map(|(idx, (role, anchor))| {
                let mut slot = super::formation::Slot::new(SlotId(idx as u32), role, anchor);
                if role == Role::GK {
                    slot.constraint = Some(GK_REGION);
                }
                slot
            })
            .collect()
    }
}

impl FromStr for FormationTemplate {
    type Err = FormationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormationTemplate::from_code(s)
            .ok_or_else(|| FormationError::validation(format!("unsupported formation '{}'", s)))
    }
}
