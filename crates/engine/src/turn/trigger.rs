//! Trigger evaluation: at most one event fires per turn.
//!
//! Hard gating is deterministic over the turn snapshot; the soft semantic
//! fallback asks the oracle a closed-form question and is bounded by a
//! confidence floor. Tests stub the oracle.

use std::sync::Arc;

use serde::Deserialize;

use keeper_domain::{EventId, KeeperEvent, MapId, PlayerAction, SessionState};

use crate::infrastructure::ports::{CatalogPort, OraclePort, OracleRequest};
use crate::stores::{Stores, TurnWrites};
use crate::turn::TurnError;

/// What the evaluator decided for this turn.
#[derive(Debug, Clone)]
pub enum TriggerDecision {
    /// A check from a prior turn is outstanding; resolve it first.
    ResolveFirst(KeeperEvent),
    /// The selected event is gated by a check: emit suspense and stop.
    Suspend(KeeperEvent),
    /// The selected event fires this turn.
    Fire(KeeperEvent),
    /// Nothing triggers.
    None,
}

/// Soft-matcher confidence levels. Events are admitted at medium or above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// The confidence floor for soft admissions.
pub const CONFIDENCE_FLOOR: Confidence = Confidence::Medium;

pub fn meets_floor(confidence: Confidence, floor: Confidence) -> bool {
    confidence >= floor
}

#[derive(Debug, Deserialize)]
struct SoftJudgment {
    should_trigger: bool,
    #[serde(default)]
    event_id: Option<EventId>,
    confidence: Confidence,
}

pub struct TriggerEvaluator {
    oracle: Arc<dyn OraclePort>,
}

impl TriggerEvaluator {
    pub fn new(oracle: Arc<dyn OraclePort>) -> Self {
        Self { oracle }
    }

    #[tracing::instrument(skip_all, fields(map_id = %map_id))]
    pub async fn decide(
        &self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        player_session: &SessionState,
        action: &PlayerAction,
        completed: &[EventId],
        map_id: MapId,
    ) -> Result<TriggerDecision, TurnError> {
        // An outstanding check preempts all new triggers.
        if let Some(pending_id) = player_session.pending_check_event_id {
            return match catalog.event(pending_id).await? {
                Some(event) => Ok(TriggerDecision::ResolveFirst(event)),
                None => {
                    // A dangling marker would wedge the session; drop it.
                    tracing::warn!(%pending_id, "Pending check references a missing event, clearing");
                    let player_id = writes.player_id().clone();
                    if writes.ensure_session(stores, catalog, &player_id).await? {
                        if let Some(session) = writes.sessions.get_mut(&player_id) {
                            session.pending_check_event_id = None;
                            writes.player_state_touched = true;
                        }
                    }
                    Ok(TriggerDecision::None)
                }
            };
        }

        let events = catalog.events_for_map(map_id).await?;
        if events.is_empty() {
            return Ok(TriggerDecision::None);
        }

        // Hard gating, catalog order (event_id ascending).
        for event in &events {
            if !event.uniqueness_ok(completed) || !event.prerequisites_met(completed) {
                continue;
            }
            if self
                .preconditions_hold(stores, catalog, writes, player_session, action, event)
                .await?
            {
                tracing::info!(event_id = %event.event_id, "Hard trigger matched");
                return Ok(gate(event.clone()));
            }
        }

        // Soft fallback over the still-available events.
        let available: Vec<&KeeperEvent> = events
            .iter()
            .filter(|event| event.uniqueness_ok(completed) && event.prerequisites_met(completed))
            .collect();
        if available.is_empty() {
            return Ok(TriggerDecision::None);
        }

        match self.soft_match(player_session, action, &available).await {
            Some(event_id) => {
                let Some(event) = available.iter().find(|event| event.event_id == event_id) else {
                    tracing::warn!(%event_id, "Soft matcher picked an unavailable event");
                    return Ok(TriggerDecision::None);
                };
                tracing::info!(%event_id, "Soft trigger admitted");
                Ok(gate((*event).clone()))
            }
            None => Ok(TriggerDecision::None),
        }
    }

    async fn preconditions_hold(
        &self,
        stores: &Stores,
        catalog: &dyn CatalogPort,
        writes: &mut TurnWrites,
        player_session: &SessionState,
        action: &PlayerAction,
        event: &KeeperEvent,
    ) -> Result<bool, TurnError> {
        let preconditions = event.preconditions();
        if preconditions.is_empty() {
            return Ok(false);
        }
        if !preconditions.action_satisfied(action) {
            return Ok(false);
        }
        if preconditions.agent_state.is_empty() {
            return Ok(true);
        }
        match &preconditions.agent_id {
            None => Ok(preconditions.session_satisfied(player_session)),
            Some(agent_id) => {
                if !writes.ensure_session(stores, catalog, agent_id).await? {
                    tracing::warn!(agent = %agent_id, "Precondition agent has no sheet");
                    return Ok(false);
                }
                let session = writes
                    .sessions
                    .get(agent_id)
                    .ok_or_else(|| TurnError::internal("agent session vanished"))?;
                Ok(preconditions.session_satisfied(session))
            }
        }
    }

    async fn soft_match(
        &self,
        player_session: &SessionState,
        action: &PlayerAction,
        available: &[&KeeperEvent],
    ) -> Option<EventId> {
        let listing = available
            .iter()
            .map(|event| format!("- event_id {}: {}", event.event_id, event.event_info))
            .collect::<Vec<_>>()
            .join("\n");
        let action_json = serde_json::to_string(action).unwrap_or_else(|_| "{}".to_string());
        let user_prompt = format!(
            "Player action: {action_json}\n\
             Player status: hp {hp}, sanity {sanity}, map {map}\n\
             Candidate events:\n{listing}",
            hp = player_session.hp,
            sanity = player_session.sanity,
            map = player_session.current_map_id,
        );
        let request = OracleRequest::new(SOFT_MATCH_PROMPT, user_prompt).with_temperature(0.0);

        let reply = match self.oracle.generate(request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(%err, "Soft matcher oracle failed, no trigger");
                return None;
            }
        };
        let judgment: SoftJudgment = match serde_json::from_value(reply) {
            Ok(judgment) => judgment,
            Err(err) => {
                tracing::warn!(%err, "Soft matcher reply malformed, no trigger");
                return None;
            }
        };
        if !judgment.should_trigger || !meets_floor(judgment.confidence, CONFIDENCE_FLOOR) {
            tracing::debug!(
                should_trigger = judgment.should_trigger,
                confidence = ?judgment.confidence,
                "Soft matcher declined"
            );
            return None;
        }
        judgment.event_id
    }
}

fn gate(event: KeeperEvent) -> TriggerDecision {
    if event.check_gate().is_some() {
        TriggerDecision::Suspend(event)
    } else {
        TriggerDecision::Fire(event)
    }
}

const SOFT_MATCH_PROMPT: &str = r#"You judge whether a scripted scenario event
should trigger for the player's latest action. Only pick an event whose moment
has clearly come; when in doubt, do not trigger. Reply with strict JSON only:
{"should_trigger": true|false, "event_id": <id or null>, "confidence": "high"|"medium"|"low"}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_floor_orders_levels() {
        assert!(meets_floor(Confidence::High, CONFIDENCE_FLOOR));
        assert!(meets_floor(Confidence::Medium, CONFIDENCE_FLOOR));
        assert!(!meets_floor(Confidence::Low, CONFIDENCE_FLOOR));
        // An event admitted at medium would not pass a stricter floor.
        assert!(!meets_floor(Confidence::Medium, Confidence::High));
    }

    #[test]
    fn confidence_parses_lowercase() {
        let judgment: SoftJudgment = serde_json::from_value(serde_json::json!({
            "should_trigger": true, "event_id": 5, "confidence": "medium"
        }))
        .expect("judgment");
        assert_eq!(judgment.confidence, Confidence::Medium);
        assert_eq!(judgment.event_id, Some(EventId::new(5)));
    }
}
