//! SQLite relational catalog.
//!
//! The catalog is the read-mostly source of truth for sheets, maps,
//! interactable objects, scripted events and the world-state seed. The only
//! writes are the NPC status/goal write-through and the player's location
//! after a validated move.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use keeper_domain::{
    AttributeId, Attributes, CharacterId, CharacterInfo, CharacterSheet, DerivedAttributes,
    Difficulty, EventEffects, EventId, KeeperEvent, MapId, ObjectId, Skills,
};

use crate::infrastructure::ports::{CatalogError, CatalogObject, CatalogPort, MapInfo};

/// sqlx-backed catalog.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub async fn connect(database_url: &str) -> Result<Self, CatalogError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| CatalogError::database("connect", e))?;
        let catalog = Self { pool };
        catalog.initialize_schema().await?;
        tracing::info!(database_url, "Connected to catalog");
        Ok(catalog)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_schema(&self) -> Result<(), CatalogError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                if_npc INTEGER NOT NULL DEFAULT 0,
                profession TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT '',
                current_goal TEXT NOT NULL DEFAULT '',
                current_location_id INTEGER,
                current_vehicle_id INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS attributes (
                character_id TEXT PRIMARY KEY,
                strength INTEGER NOT NULL DEFAULT 0,
                constitution INTEGER NOT NULL DEFAULT 0,
                size INTEGER NOT NULL DEFAULT 0,
                dexterity INTEGER NOT NULL DEFAULT 0,
                appearance INTEGER NOT NULL DEFAULT 0,
                intelligence INTEGER NOT NULL DEFAULT 0,
                power INTEGER NOT NULL DEFAULT 0,
                education INTEGER NOT NULL DEFAULT 0,
                luck INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS derived_attributes (
                character_id TEXT PRIMARY KEY,
                sanity INTEGER NOT NULL DEFAULT 0,
                magic_points INTEGER NOT NULL DEFAULT 0,
                interest_points INTEGER NOT NULL DEFAULT 0,
                hit_points INTEGER NOT NULL DEFAULT 0,
                move_rate INTEGER NOT NULL DEFAULT 0,
                damage_bonus INTEGER NOT NULL DEFAULT 0,
                build INTEGER NOT NULL DEFAULT 0,
                professional_points INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS skills (
                character_id TEXT PRIMARY KEY,
                fighting INTEGER NOT NULL DEFAULT 0,
                firearms INTEGER NOT NULL DEFAULT 0,
                dodge INTEGER NOT NULL DEFAULT 0,
                mechanics INTEGER NOT NULL DEFAULT 0,
                drive INTEGER NOT NULL DEFAULT 0,
                stealth INTEGER NOT NULL DEFAULT 0,
                investigate INTEGER NOT NULL DEFAULT 0,
                sleight_of_hand INTEGER NOT NULL DEFAULT 0,
                electronics INTEGER NOT NULL DEFAULT 0,
                history INTEGER NOT NULL DEFAULT 0,
                science INTEGER NOT NULL DEFAULT 0,
                medicine INTEGER NOT NULL DEFAULT 0,
                occult INTEGER NOT NULL DEFAULT 0,
                library_use INTEGER NOT NULL DEFAULT 0,
                art INTEGER NOT NULL DEFAULT 0,
                persuade INTEGER NOT NULL DEFAULT 0,
                psychology INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS backgrounds (
                character_id TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (character_id, title)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS maps (
                id INTEGER PRIMARY KEY,
                map_name TEXT NOT NULL,
                map_info TEXT NOT NULL DEFAULT '',
                accessible_locations TEXT NOT NULL DEFAULT '[]'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS interactable_objects (
                object_id INTEGER PRIMARY KEY,
                map_id INTEGER NOT NULL,
                object_name TEXT NOT NULL,
                current_state TEXT NOT NULL DEFAULT '{}'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id INTEGER PRIMARY KEY,
                map_id INTEGER NOT NULL,
                event_info TEXT NOT NULL DEFAULT '',
                preconditions TEXT NOT NULL DEFAULT '{}',
                pre_event_ids TEXT NOT NULL DEFAULT '[]',
                if_unique INTEGER NOT NULL DEFAULT 0,
                effects TEXT NOT NULL DEFAULT '{}',
                test_required_id INTEGER NOT NULL DEFAULT -1,
                hard_level INTEGER NOT NULL DEFAULT 1,
                success_result_info TEXT NOT NULL DEFAULT '',
                fail_result_info TEXT NOT NULL DEFAULT '',
                happened_result INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS world_state (
                state_key TEXT PRIMARY KEY,
                state_value TEXT NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| CatalogError::database("initialize_schema", e))?;
        }
        Ok(())
    }

    fn parse_json_column(
        column: &'static str,
        raw: &str,
    ) -> Result<serde_json::Value, CatalogError> {
        serde_json::from_str(raw)
            .map_err(|e| CatalogError::Malformed(format!("{column}: {e}")))
    }
}

fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<KeeperEvent, CatalogError> {
    let preconditions = SqliteCatalog::parse_json_column(
        "events.preconditions",
        &row.try_get::<String, _>("preconditions")
            .map_err(|e| CatalogError::database("events", e))?,
    )?;
    let pre_event_ids: Vec<EventId> = serde_json::from_value(SqliteCatalog::parse_json_column(
        "events.pre_event_ids",
        &row.try_get::<String, _>("pre_event_ids")
            .map_err(|e| CatalogError::database("events", e))?,
    )?)
    .map_err(|e| CatalogError::Malformed(format!("events.pre_event_ids: {e}")))?;
    let effects: EventEffects = serde_json::from_value(SqliteCatalog::parse_json_column(
        "events.effects",
        &row.try_get::<String, _>("effects")
            .map_err(|e| CatalogError::database("events", e))?,
    )?)
    .map_err(|e| CatalogError::Malformed(format!("events.effects: {e}")))?;

    let test_required_id: i64 = row
        .try_get("test_required_id")
        .map_err(|e| CatalogError::database("events", e))?;

    Ok(KeeperEvent {
        event_id: EventId::new(
            row.try_get("event_id")
                .map_err(|e| CatalogError::database("events", e))?,
        ),
        map_id: MapId::new(
            row.try_get("map_id")
                .map_err(|e| CatalogError::database("events", e))?,
        ),
        event_info: row
            .try_get("event_info")
            .map_err(|e| CatalogError::database("events", e))?,
        preconditions,
        pre_event_ids,
        if_unique: row
            .try_get::<i64, _>("if_unique")
            .map_err(|e| CatalogError::database("events", e))?
            != 0,
        effects,
        test_required_id: (test_required_id != -1).then(|| AttributeId::new(test_required_id)),
        hard_level: Difficulty::from_level(
            row.try_get("hard_level")
                .map_err(|e| CatalogError::database("events", e))?,
        ),
        success_result_info: row
            .try_get("success_result_info")
            .map_err(|e| CatalogError::database("events", e))?,
        fail_result_info: row
            .try_get("fail_result_info")
            .map_err(|e| CatalogError::database("events", e))?,
    })
}

#[async_trait]
impl CatalogPort for SqliteCatalog {
    async fn character_sheet(
        &self,
        id: &CharacterId,
    ) -> Result<Option<CharacterSheet>, CatalogError> {
        let Some(row) = sqlx::query(
            "SELECT id, name, if_npc, profession, description, status, current_goal, \
             current_location_id, current_vehicle_id FROM characters WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::database("character_sheet", e))?
        else {
            return Ok(None);
        };

        let info = CharacterInfo {
            id: CharacterId::new(
                row.try_get::<String, _>("id")
                    .map_err(|e| CatalogError::database("character_sheet", e))?,
            ),
            name: row
                .try_get("name")
                .map_err(|e| CatalogError::database("character_sheet", e))?,
            if_npc: row
                .try_get::<i64, _>("if_npc")
                .map_err(|e| CatalogError::database("character_sheet", e))?
                != 0,
            profession: row
                .try_get("profession")
                .map_err(|e| CatalogError::database("character_sheet", e))?,
            description: row
                .try_get("description")
                .map_err(|e| CatalogError::database("character_sheet", e))?,
            status: row
                .try_get("status")
                .map_err(|e| CatalogError::database("character_sheet", e))?,
            current_goal: row
                .try_get("current_goal")
                .map_err(|e| CatalogError::database("character_sheet", e))?,
            current_location_id: row
                .try_get::<Option<i64>, _>("current_location_id")
                .map_err(|e| CatalogError::database("character_sheet", e))?
                .map(MapId::new),
            current_vehicle_id: row
                .try_get("current_vehicle_id")
                .map_err(|e| CatalogError::database("character_sheet", e))?,
        };

        let attributes = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64, i64, i64)>(
            "SELECT strength, constitution, size, dexterity, appearance, intelligence, power, \
             education, luck FROM attributes WHERE character_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::database("character_sheet", e))?
        .map(
            |(strength, constitution, size, dexterity, appearance, intelligence, power, education, luck)| {
                Attributes {
                    strength,
                    constitution,
                    size,
                    dexterity,
                    appearance,
                    intelligence,
                    power,
                    education,
                    luck,
                }
            },
        )
        .unwrap_or_default();

        let derived_attributes = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64, i64, i64)>(
            "SELECT sanity, magic_points, interest_points, hit_points, move_rate, damage_bonus, \
             build, professional_points FROM derived_attributes WHERE character_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::database("character_sheet", e))?
        .map(
            |(sanity, magic_points, interest_points, hit_points, move_rate, damage_bonus, build, professional_points)| {
                DerivedAttributes {
                    sanity,
                    magic_points,
                    interest_points,
                    hit_points,
                    move_rate,
                    damage_bonus,
                    build,
                    professional_points,
                }
            },
        )
        .unwrap_or_default();

        let skills = sqlx::query(
            "SELECT fighting, firearms, dodge, mechanics, drive, stealth, investigate, \
             sleight_of_hand, electronics, history, science, medicine, occult, library_use, \
             art, persuade, psychology FROM skills WHERE character_id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::database("character_sheet", e))?
        .map(|row| -> Result<Skills, CatalogError> {
            let get = |column: &str| -> Result<i64, CatalogError> {
                row.try_get(column)
                    .map_err(|e| CatalogError::database("character_sheet", e))
            };
            Ok(Skills {
                fighting: get("fighting")?,
                firearms: get("firearms")?,
                dodge: get("dodge")?,
                mechanics: get("mechanics")?,
                drive: get("drive")?,
                stealth: get("stealth")?,
                investigate: get("investigate")?,
                sleight_of_hand: get("sleight_of_hand")?,
                electronics: get("electronics")?,
                history: get("history")?,
                science: get("science")?,
                medicine: get("medicine")?,
                occult: get("occult")?,
                library_use: get("library_use")?,
                art: get("art")?,
                persuade: get("persuade")?,
                psychology: get("psychology")?,
            })
        })
        .transpose()?
        .unwrap_or_default();

        let backgrounds = sqlx::query_as::<_, (String, String)>(
            "SELECT title, content FROM backgrounds WHERE character_id = ?",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CatalogError::database("character_sheet", e))?
        .into_iter()
        .collect::<HashMap<_, _>>();

        Ok(Some(CharacterSheet {
            info,
            attributes,
            derived_attributes,
            skills,
            backgrounds,
        }))
    }

    async fn npcs_on_map(&self, map_id: MapId) -> Result<Vec<CharacterId>, CatalogError> {
        let ids = sqlx::query_as::<_, (String,)>(
            "SELECT id FROM characters WHERE if_npc = 1 AND current_location_id = ?",
        )
        .bind(map_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CatalogError::database("npcs_on_map", e))?;
        Ok(ids.into_iter().map(|(id,)| CharacterId::new(id)).collect())
    }

    async fn objects_on_map(&self, map_id: MapId) -> Result<Vec<CatalogObject>, CatalogError> {
        let rows = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT object_id, object_name, current_state FROM interactable_objects \
             WHERE map_id = ?",
        )
        .bind(map_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CatalogError::database("objects_on_map", e))?;

        rows.into_iter()
            .map(|(object_id, name, current_state)| {
                Ok(CatalogObject {
                    object_id: ObjectId::new(object_id),
                    name,
                    current_state: Self::parse_json_column(
                        "interactable_objects.current_state",
                        &current_state,
                    )?,
                })
            })
            .collect()
    }

    async fn map_info(&self, map_id: MapId) -> Result<Option<MapInfo>, CatalogError> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT id, map_name, map_info FROM maps WHERE id = ?",
        )
        .bind(map_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::database("map_info", e))?;
        Ok(row.map(|(id, name, info)| MapInfo {
            id: MapId::new(id),
            name,
            info,
        }))
    }

    async fn accessible_maps(&self, map_id: MapId) -> Result<Vec<MapId>, CatalogError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT accessible_locations FROM maps WHERE id = ?",
        )
        .bind(map_id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::database("accessible_maps", e))?;
        let Some((raw,)) = row else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw)
            .map_err(|e| CatalogError::Malformed(format!("maps.accessible_locations: {e}")))
    }

    async fn events_for_map(&self, map_id: MapId) -> Result<Vec<KeeperEvent>, CatalogError> {
        let rows = sqlx::query(
            "SELECT event_id, map_id, event_info, preconditions, pre_event_ids, if_unique, \
             effects, test_required_id, hard_level, success_result_info, fail_result_info \
             FROM events WHERE map_id = ? ORDER BY event_id ASC",
        )
        .bind(map_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CatalogError::database("events_for_map", e))?;
        rows.iter().map(event_from_row).collect()
    }

    async fn event(&self, id: EventId) -> Result<Option<KeeperEvent>, CatalogError> {
        let row = sqlx::query(
            "SELECT event_id, map_id, event_info, preconditions, pre_event_ids, if_unique, \
             effects, test_required_id, hard_level, success_result_info, fail_result_info \
             FROM events WHERE event_id = ?",
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::database("event", e))?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn world_seed(&self) -> Result<HashMap<String, serde_json::Value>, CatalogError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT state_key, state_value FROM world_state",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CatalogError::database("world_seed", e))?;
        rows.into_iter()
            .map(|(key, value)| {
                Ok((
                    key,
                    Self::parse_json_column("world_state.state_value", &value)?,
                ))
            })
            .collect()
    }

    async fn update_npc_state(
        &self,
        id: &CharacterId,
        status: &str,
        goal: &str,
    ) -> Result<(), CatalogError> {
        sqlx::query("UPDATE characters SET status = ?, current_goal = ? WHERE id = ?")
            .bind(status)
            .bind(goal)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CatalogError::database("update_npc_state", e))?;
        Ok(())
    }

    async fn update_character_location(
        &self,
        id: &CharacterId,
        map_id: MapId,
        vehicle_id: Option<i64>,
    ) -> Result<(), CatalogError> {
        sqlx::query(
            "UPDATE characters SET current_location_id = ?, current_vehicle_id = ? WHERE id = ?",
        )
        .bind(map_id.value())
        .bind(vehicle_id)
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| CatalogError::database("update_character_location", e))?;
        Ok(())
    }
}
