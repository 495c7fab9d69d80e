//! Intent parsing: free text in, closed-vocabulary action out.

use std::sync::Arc;

use keeper_domain::PlayerAction;

use crate::infrastructure::ports::{OraclePort, OracleRequest};

/// Catalog entries shown to the parser so it can ground targets.
#[derive(Debug, Clone, Default)]
pub struct VisibleCatalog {
    /// (id, display name) of every NPC on the current map.
    pub npcs: Vec<(String, String)>,
    /// (id, display name) of every interactable object on the current map.
    pub objects: Vec<(String, String)>,
    /// (map id, display name) of every reachable map.
    pub locations: Vec<(i64, String)>,
}

/// Oracle-backed action parser.
///
/// Pure modulo the oracle call: the same input, catalog and oracle reply
/// always produce the same action. Any failure degrades to `unknown` and
/// the turn continues.
pub struct IntentParser {
    oracle: Arc<dyn OraclePort>,
}

impl IntentParser {
    pub fn new(oracle: Arc<dyn OraclePort>) -> Self {
        Self { oracle }
    }

    #[tracing::instrument(skip_all, fields(input_len = input.len()))]
    pub async fn parse(&self, input: &str, catalog: &VisibleCatalog) -> PlayerAction {
        let request = OracleRequest::new(system_prompt(catalog), input).with_temperature(0.0);
        let reply = match self.oracle.generate(request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(%err, "Intent oracle failed, degrading to unknown");
                return PlayerAction::unknown(input);
            }
        };
        match serde_json::from_value::<PlayerAction>(reply) {
            Ok(action) => {
                tracing::debug!(intent = ?action.intent, target = ?action.target, "Parsed action");
                action
            }
            Err(err) => {
                tracing::warn!(%err, "Intent reply malformed, degrading to unknown");
                PlayerAction::unknown(input)
            }
        }
    }
}

fn system_prompt(catalog: &VisibleCatalog) -> String {
    let npc_list = catalog
        .npcs
        .iter()
        .map(|(id, name)| format!("'{name}' (id: {id})"))
        .collect::<Vec<_>>()
        .join(", ");
    let object_list = catalog
        .objects
        .iter()
        .map(|(id, name)| format!("'{name}' (id: {id})"))
        .collect::<Vec<_>>()
        .join(", ");
    let location_list = catalog
        .locations
        .iter()
        .map(|(id, name)| format!("'{name}' (map id: {id})"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are the command parser of a Call of Cthulhu tabletop session.
Read the player's input and answer one strict JSON object describing the intent.

Allowed "intent" values (anything else is invalid):
- inspect: look at, examine, search
- talk: speak to someone
- take: pick something up
- use: use an object
- use_skill: deliberately attempt something with an ability; list the abilities in "skill_check_request"
- move: travel to another map; set "target_location_id" to the map id
- help_woman: (scenario hook) get out and help the woman on the road
- leave_woman: (scenario hook) drive away and abandon her
- take_amelia_in_car: (scenario hook) let her into the car
- unknown: none of the above

Available NPC targets: [{npc_list}]
Available object targets: [{object_list}]
Reachable locations: [{location_list}]

Reply with JSON only, shaped as:
{{"intent": "...", "target": "...", "topic": "...", "target_location_id": 0, "skill_check_request": ["..."]}}
Omit fields that do not apply. "target" must be one of the listed ids.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use keeper_domain::{Intent, MapId};

    use crate::infrastructure::ports::MockOraclePort;

    fn parser_with_reply(
        reply: Result<serde_json::Value, crate::infrastructure::ports::OracleError>,
    ) -> IntentParser {
        let mut oracle = MockOraclePort::new();
        oracle.expect_generate().return_once(move |_| reply);
        IntentParser::new(Arc::new(oracle))
    }

    #[tokio::test]
    async fn well_formed_replies_become_actions() {
        let parser = parser_with_reply(Ok(serde_json::json!({
            "intent": "move", "target": "阿卡姆", "target_location_id": 3
        })));
        let action = parser.parse("我要回阿卡姆", &VisibleCatalog::default()).await;
        assert_eq!(action.intent, Intent::Move);
        assert_eq!(action.target_location_id, Some(MapId::new(3)));
    }

    #[tokio::test]
    async fn oracle_failures_degrade_to_unknown() {
        let parser = parser_with_reply(Err(
            crate::infrastructure::ports::OracleError::Deadline,
        ));
        let action = parser.parse("我踩下油门", &VisibleCatalog::default()).await;
        assert_eq!(action.intent, Intent::Unknown);
        assert_eq!(action.raw_text.as_deref(), Some("我踩下油门"));
    }

    #[tokio::test]
    async fn out_of_enum_intents_degrade_to_unknown() {
        let parser = parser_with_reply(Ok(serde_json::json!({"intent": "fly"})));
        let action = parser.parse("我起飞", &VisibleCatalog::default()).await;
        assert_eq!(action.intent, Intent::Unknown);
    }

    #[test]
    fn prompt_lists_the_visible_catalog() {
        let catalog = VisibleCatalog {
            npcs: vec![("amelia_weber".to_string(), "湿透的女人".to_string())],
            objects: vec![("301".to_string(), "油泵".to_string())],
            locations: vec![(2, "加油站咖啡馆".to_string())],
        };
        let prompt = system_prompt(&catalog);
        assert!(prompt.contains("amelia_weber"));
        assert!(prompt.contains("油泵"));
        assert!(prompt.contains("map id: 2"));
    }
}
