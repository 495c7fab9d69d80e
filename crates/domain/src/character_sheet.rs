//! Static character sheets.
//!
//! A sheet is loaded from the relational catalog when a character enters
//! play and cached in the KV layer. During a session it is immutable except
//! for the NPC `status` / `current_goal` write-through performed by the
//! reactor loop.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeKey, AttributeSection};
use crate::ids::{CharacterId, MapId};

/// Basic identity block of a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterInfo {
    pub id: CharacterId,
    pub name: String,
    #[serde(default)]
    pub if_npc: bool,
    #[serde(default)]
    pub profession: String,
    #[serde(default)]
    pub description: String,
    /// Current observable condition, mutated by the NPC reactor loop.
    #[serde(default)]
    pub status: String,
    /// What the character is trying to do right now.
    #[serde(default)]
    pub current_goal: String,
    #[serde(default)]
    pub current_location_id: Option<MapId>,
    #[serde(default)]
    pub current_vehicle_id: Option<i64>,
}

/// The nine core characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    pub strength: i64,
    pub constitution: i64,
    pub size: i64,
    pub dexterity: i64,
    pub appearance: i64,
    pub intelligence: i64,
    pub power: i64,
    pub education: i64,
    pub luck: i64,
}

/// Values calculated from the core characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedAttributes {
    pub sanity: i64,
    pub magic_points: i64,
    pub interest_points: i64,
    pub hit_points: i64,
    pub move_rate: i64,
    pub damage_bonus: i64,
    pub build: i64,
    pub professional_points: i64,
}

/// Percentile skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Skills {
    pub fighting: i64,
    pub firearms: i64,
    pub dodge: i64,
    pub mechanics: i64,
    pub drive: i64,
    pub stealth: i64,
    pub investigate: i64,
    pub sleight_of_hand: i64,
    pub electronics: i64,
    pub history: i64,
    pub science: i64,
    pub medicine: i64,
    pub occult: i64,
    pub library_use: i64,
    pub art: i64,
    pub persuade: i64,
    pub psychology: i64,
}

/// Complete static sheet for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub info: CharacterInfo,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub derived_attributes: DerivedAttributes,
    #[serde(default)]
    pub skills: Skills,
    #[serde(default)]
    pub backgrounds: HashMap<String, String>,
}

impl CharacterSheet {
    pub fn id(&self) -> &CharacterId {
        &self.info.id
    }

    /// Look up any attribute, derived attribute or skill value.
    ///
    /// A key the sheet does not carry reads as 0, matching the check
    /// resolver's "absent skill always fails" convention.
    pub fn value_of(&self, key: AttributeKey) -> i64 {
        match key.section() {
            AttributeSection::Core => self.core_value(key),
            AttributeSection::Derived => self.derived_value(key),
            AttributeSection::Skill => self.skill_value(key),
        }
    }

    fn core_value(&self, key: AttributeKey) -> i64 {
        let a = &self.attributes;
        match key {
            AttributeKey::Strength => a.strength,
            AttributeKey::Constitution => a.constitution,
            AttributeKey::Size => a.size,
            AttributeKey::Dexterity => a.dexterity,
            AttributeKey::Appearance => a.appearance,
            AttributeKey::Intelligence => a.intelligence,
            AttributeKey::Power => a.power,
            AttributeKey::Education => a.education,
            AttributeKey::Luck => a.luck,
            _ => 0,
        }
    }

    fn derived_value(&self, key: AttributeKey) -> i64 {
        let d = &self.derived_attributes;
        match key {
            AttributeKey::Sanity => d.sanity,
            AttributeKey::MagicPoints => d.magic_points,
            AttributeKey::InterestPoints => d.interest_points,
            AttributeKey::HitPoints => d.hit_points,
            AttributeKey::MoveRate => d.move_rate,
            AttributeKey::DamageBonus => d.damage_bonus,
            AttributeKey::Build => d.build,
            AttributeKey::ProfessionalPoints => d.professional_points,
            _ => 0,
        }
    }

    fn skill_value(&self, key: AttributeKey) -> i64 {
        let s = &self.skills;
        match key {
            AttributeKey::Fighting => s.fighting,
            AttributeKey::Firearms => s.firearms,
            AttributeKey::Dodge => s.dodge,
            AttributeKey::Mechanics => s.mechanics,
            AttributeKey::Drive => s.drive,
            AttributeKey::Stealth => s.stealth,
            AttributeKey::Investigate => s.investigate,
            AttributeKey::SleightOfHand => s.sleight_of_hand,
            AttributeKey::Electronics => s.electronics,
            AttributeKey::History => s.history,
            AttributeKey::Science => s.science,
            AttributeKey::Medicine => s.medicine,
            AttributeKey::Occult => s.occult,
            AttributeKey::LibraryUse => s.library_use,
            AttributeKey::Art => s.art,
            AttributeKey::Persuade => s.persuade,
            AttributeKey::Psychology => s.psychology,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> CharacterSheet {
        CharacterSheet {
            info: CharacterInfo {
                id: CharacterId::new("investigator"),
                name: "Test Investigator".to_string(),
                if_npc: false,
                profession: "Journalist".to_string(),
                description: String::new(),
                status: String::new(),
                current_goal: String::new(),
                current_location_id: Some(MapId::new(1)),
                current_vehicle_id: Some(101),
            },
            attributes: Attributes {
                dexterity: 60,
                intelligence: 70,
                ..Attributes::default()
            },
            derived_attributes: DerivedAttributes {
                hit_points: 12,
                sanity: 65,
                magic_points: 14,
                ..DerivedAttributes::default()
            },
            skills: Skills {
                drive: 60,
                investigate: 45,
                ..Skills::default()
            },
            backgrounds: HashMap::new(),
        }
    }

    #[test]
    fn value_lookup_spans_all_sections() {
        let sheet = sheet();
        assert_eq!(sheet.value_of(AttributeKey::Dexterity), 60);
        assert_eq!(sheet.value_of(AttributeKey::Sanity), 65);
        assert_eq!(sheet.value_of(AttributeKey::Drive), 60);
    }

    #[test]
    fn absent_values_read_as_zero() {
        let sheet = sheet();
        assert_eq!(sheet.value_of(AttributeKey::Occult), 0);
        assert_eq!(sheet.value_of(AttributeKey::Strength), 0);
    }

    #[test]
    fn sheet_round_trips_through_json() {
        let sheet = sheet();
        let json = serde_json::to_string(&sheet).expect("serialize");
        let back: CharacterSheet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, sheet);
    }

    #[test]
    fn partial_blobs_fill_defaults() {
        let json = r#"{"info": {"id": "old_joe", "name": "Old Joe", "if_npc": true}}"#;
        let sheet: CharacterSheet = serde_json::from_str(json).expect("deserialize");
        assert!(sheet.info.if_npc);
        assert_eq!(sheet.skills.investigate, 0);
    }
}
