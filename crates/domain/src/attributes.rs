//! The fixed attribute table.
//!
//! Event effect payloads and skill-check gates refer to attributes, derived
//! attributes and skills by a fixed numeric encoding 1..34. The encoding is
//! part of the catalog contract and must never be reordered.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Numeric attribute encoding used in effect payloads and `test_required_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeId(i64);

impl AttributeId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub fn key(self) -> Result<AttributeKey, DomainError> {
        AttributeKey::from_id(self)
    }
}

impl From<i64> for AttributeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for AttributeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which section of the character sheet an attribute lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeSection {
    /// Core characteristics (ids 1-9)
    Core,
    /// Derived attributes (ids 10-17); sanity/mp/hp flow into session state
    Derived,
    /// Skills (ids 18-34)
    Skill,
}

macro_rules! attribute_table {
    ($(($id:expr, $variant:ident, $name:expr)),+ $(,)?) => {
        /// A concrete attribute, derived attribute or skill.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AttributeKey {
            $($variant),+
        }

        impl AttributeKey {
            /// Resolve a numeric id from the fixed table.
            pub fn from_id(id: AttributeId) -> Result<Self, DomainError> {
                match id.value() {
                    $($id => Ok(Self::$variant),)+
                    other => Err(DomainError::UnknownAttribute(other)),
                }
            }

            /// Resolve a snake_case attribute name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn id(self) -> AttributeId {
                match self {
                    $(Self::$variant => AttributeId::new($id),)+
                }
            }

            /// The snake_case name used across catalog blobs and prompts.
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }
    };
}

attribute_table! {
    (1, Strength, "strength"),
    (2, Constitution, "constitution"),
    (3, Size, "size"),
    (4, Dexterity, "dexterity"),
    (5, Appearance, "appearance"),
    (6, Intelligence, "intelligence"),
    (7, Power, "power"),
    (8, Education, "education"),
    (9, Luck, "luck"),
    (10, Sanity, "sanity"),
    (11, MagicPoints, "magic_points"),
    (12, InterestPoints, "interest_points"),
    (13, HitPoints, "hit_points"),
    (14, MoveRate, "move_rate"),
    (15, DamageBonus, "damage_bonus"),
    (16, Build, "build"),
    (17, ProfessionalPoints, "professional_points"),
    (18, Fighting, "fighting"),
    (19, Firearms, "firearms"),
    (20, Dodge, "dodge"),
    (21, Mechanics, "mechanics"),
    (22, Drive, "drive"),
    (23, Stealth, "stealth"),
    (24, Investigate, "investigate"),
    (25, SleightOfHand, "sleight_of_hand"),
    (26, Electronics, "electronics"),
    (27, History, "history"),
    (28, Science, "science"),
    (29, Medicine, "medicine"),
    (30, Occult, "occult"),
    (31, LibraryUse, "library_use"),
    (32, Art, "art"),
    (33, Persuade, "persuade"),
    (34, Psychology, "psychology"),
}

impl AttributeKey {
    pub fn section(self) -> AttributeSection {
        match self.id().value() {
            1..=9 => AttributeSection::Core,
            10..=17 => AttributeSection::Derived,
            _ => AttributeSection::Skill,
        }
    }

    /// Session-state field updated by a numeric delta on this attribute.
    ///
    /// Only sanity (10), magic points (11) and hit points (13) flow into
    /// session state; every other id addresses the static sheet.
    pub fn session_field(self) -> Option<&'static str> {
        match self {
            Self::Sanity => Some("sanity"),
            Self::MagicPoints => Some("mp"),
            Self::HitPoints => Some("hp"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_total_over_1_to_34() {
        for raw in 1..=34 {
            let key = AttributeKey::from_id(AttributeId::new(raw)).expect("id in table");
            assert_eq!(key.id().value(), raw);
            assert_eq!(AttributeKey::from_name(key.name()), Some(key));
        }
    }

    #[test]
    fn ids_outside_the_table_are_rejected() {
        assert!(AttributeKey::from_id(AttributeId::new(0)).is_err());
        assert!(AttributeKey::from_id(AttributeId::new(35)).is_err());
    }

    #[test]
    fn sections_follow_the_id_ranges() {
        assert_eq!(AttributeKey::Luck.section(), AttributeSection::Core);
        assert_eq!(AttributeKey::Sanity.section(), AttributeSection::Derived);
        assert_eq!(AttributeKey::Drive.section(), AttributeSection::Skill);
    }

    #[test]
    fn only_sanity_mp_hp_touch_session_state() {
        let session_backed: Vec<_> = (1..=34)
            .filter_map(|raw| {
                let key = AttributeKey::from_id(AttributeId::new(raw)).expect("id in table");
                key.session_field().map(|field| (raw, field))
            })
            .collect();
        assert_eq!(
            session_backed,
            vec![(10, "sanity"), (11, "mp"), (13, "hp")]
        );
    }
}
