//! Roster CSV → Roster pipeline
//!
//! Expected columns (header row required):
//! `id,name,role,pace,passing,stamina,defending,finishing,technique,physical,goalkeeping`
//! plus optional `form,age,nationality,club,months_at_club,morale,availability`.
//!
//! Rows that fail to parse are counted and skipped, never fatal.

use anyhow::{Context, Result};
use formation_core::model::{Availability, Entity, EntityAttributes, EntityId, Role, Roster};
use formation_core::{FormationError, RosterProvider};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime index for roster lookup by entity id
#[derive(Debug, Clone, Default)]
pub struct RosterIndex {
    pub entities: FxHashMap<u32, Entity>,
}

impl RosterIndex {
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.id.0, entity)
    }

    pub fn get(&self, id: u32) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Sorted by id so the roster order is stable across runs.
    pub fn into_roster(self) -> formation_core::Result<Roster> {
        let mut entities: Vec<Entity> = self.entities.into_values().collect();
        entities.sort_by_key(|e| e.id);
        Roster::new(entities)
    }
}

/// CSV parsing statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub total_rows: u32,
    pub parsed: u32,
    pub failed: u32,
    /// Later rows replaced an earlier row with the same id
    pub duplicates: u32,
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    id: u32,
    name: String,
    role: String,
    pace: u8,
    passing: u8,
    stamina: u8,
    defending: u8,
    finishing: u8,
    technique: u8,
    physical: u8,
    goalkeeping: u8,
    #[serde(default)]
    form: Option<u8>,
    #[serde(default)]
    age: Option<u8>,
    #[serde(default)]
    nationality: Option<String>,
    #[serde(default)]
    club: Option<String>,
    #[serde(default)]
    months_at_club: Option<u16>,
    #[serde(default)]
    morale: Option<u8>,
    #[serde(default)]
    availability: Option<String>,
}

impl RosterRow {
    fn into_entity(self) -> std::result::Result<Entity, String> {
        let role: Role = self.role.parse().map_err(|e: FormationError| e.to_string())?;
        let attributes = EntityAttributes {
            pace: self.pace,
            passing: self.passing,
            stamina: self.stamina,
            defending: self.defending,
            finishing: self.finishing,
            technique: self.technique,
            physical: self.physical,
            goalkeeping: self.goalkeeping,
            form: self.form.unwrap_or(50),
        };
        if !attributes.is_valid() {
            return Err("attribute above 100".to_string());
        }
        let availability = match self.availability.as_deref().map(str::trim) {
            None | Some("") | Some("available") => Availability::Available,
            Some("doubtful") => Availability::Doubtful,
            Some("injured") => Availability::Injured,
            Some("suspended") => Availability::Suspended,
            Some(other) => return Err(format!("unknown availability '{}'", other)),
        };

        let mut entity = Entity::new(self.id, self.name.trim(), role)
            .with_attributes(attributes)
            .with_availability(availability);
        if let Some(age) = self.age {
            entity = entity.with_age(age);
        }
        if let Some(nationality) = self.nationality.filter(|n| !n.trim().is_empty()) {
            entity = entity.with_nationality(nationality.trim());
        }
        if let Some(club) = self.club.filter(|c| !c.trim().is_empty()) {
            entity = entity.with_club(club.trim(), self.months_at_club.unwrap_or(0));
        }
        if let Some(morale) = self.morale {
            entity = entity.with_morale(morale);
        }
        Ok(entity)
    }
}

/// Parse a roster CSV into an index.
pub fn parse_roster_csv(csv_path: &Path) -> Result<(RosterIndex, ParseStats)> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;
    parse_rows(reader)
}

/// Parse roster CSV text (same format as [`parse_roster_csv`]).
pub fn parse_roster_str(text: &str) -> Result<(RosterIndex, ParseStats)> {
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    parse_rows(reader)
}

fn parse_rows<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<(RosterIndex, ParseStats)> {
    let mut index = RosterIndex::default();
    let mut stats = ParseStats::default();

    for (row, record) in reader.deserialize::<RosterRow>().enumerate() {
        stats.total_rows += 1;
        // 헤더 = 1행
        let line = row + 2;
        let entity = match record {
            Ok(r) => match r.into_entity() {
                Ok(e) => e,
                Err(msg) => {
                    stats.failed += 1;
                    eprintln!("Warning: Line {} - {}", line, msg);
                    continue;
                }
            },
            Err(e) => {
                stats.failed += 1;
                eprintln!("Warning: Line {} - {}", line, e);
                continue;
            }
        };
        if index.insert(entity).is_some() {
            stats.duplicates += 1;
        }
        stats.parsed += 1;
    }

    Ok((index, stats))
}

/// Roster provider that reads a CSV file on every load.
#[derive(Debug, Clone)]
pub struct CsvRosterProvider {
    path: PathBuf,
}

impl CsvRosterProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RosterProvider for CsvRosterProvider {
    fn load_roster(&self) -> formation_core::Result<Roster> {
        let (index, stats) =
            parse_roster_csv(&self.path).map_err(|e| FormationError::Storage(format!("{:#}", e)))?;
        if index.is_empty() {
            return Err(FormationError::Validation(format!(
                "roster {} has no valid rows ({} failed)",
                self.path.display(),
                stats.failed
            )));
        }
        index.into_roster()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "id,name,role,pace,passing,stamina,defending,finishing,technique,physical,goalkeeping,form,age,nationality,club,months_at_club,morale,availability";

    #[test]
    fn test_parse_full_and_minimal_rows() -> Result<()> {
        let text = format!(
            "{}\n1,Keeper,GK,40,50,60,30,10,40,60,85,55,31,KR,Seoul,24,4,\n2,Back,cb,60,55,70,80,20,45,75,5\n",
            HEADER
        );
        let (index, stats) = parse_roster_str(&text)?;
        assert_eq!(stats, ParseStats { total_rows: 2, parsed: 2, failed: 0, duplicates: 0 });

        let gk = index.get(1).unwrap();
        assert_eq!(gk.natural_role, Role::GK);
        assert_eq!(gk.club, "Seoul");
        assert_eq!(gk.months_at_club, 24);
        assert_eq!(gk.morale, 4);

        let cb = index.get(2).unwrap();
        assert_eq!(cb.natural_role, Role::CB);
        assert_eq!(cb.attributes.form, 50);
        Ok(())
    }

    #[test]
    fn test_bad_rows_are_counted() -> Result<()> {
        let text = format!(
            "{}\n1,A,XX,1,1,1,1,1,1,1,1\n2,B,CM,101,1,1,1,1,1,1,1\n3,C,CM,abc,1,1,1,1,1,1,1\n4,D,CM,50,50,50,50,50,50,50,50,50,25,,,,3,injured\n4,E,ST,50,50,50,50,50,50,50,50\n",
            HEADER
        );
        let (index, stats) = parse_roster_str(&text)?;
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.parsed, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(index.get(4).unwrap().name, "E");
        Ok(())
    }

    #[test]
    fn test_provider_loads_sorted_roster() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", HEADER)?;
        writeln!(file, "9,Nine,ST,70,60,60,30,80,70,65,5")?;
        writeln!(file, "3,Three,CM,60,75,70,55,50,70,60,5")?;
        let roster = CsvRosterProvider::new(file.path()).load_roster()?;
        assert_eq!(roster.ids(), vec![EntityId(3), EntityId(9)]);
        Ok(())
    }

    #[test]
    fn test_provider_rejects_empty_roster() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", HEADER)?;
        let err = CsvRosterProvider::new(file.path()).load_roster().unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        Ok(())
    }
}
