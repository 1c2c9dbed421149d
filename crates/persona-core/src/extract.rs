//! Post-run extraction of execution summary from an agent history.

use crate::history::AgentHistory;
use crate::persona::PersonaDefinition;
use crate::phase::{phase_keywords, PhaseTracker};

/// Widget component names recognised in actions and page content.
pub const WIDGET_TYPES: &[&str] = &[
    "datepicker",
    "daterangepicker",
    "travelersselector",
    "triptypeconfirm",
    "preferencestyle",
    "preferenceinterests",
    "destinationsuggestions",
    "budgetrangeslider",
    "cityselector",
    "airportconfirmation",
];

/// Phases reached, in script order.
///
/// A phase counts when the tracker got at least that far, or when the
/// history shows evidence of it: any activity for `greeting`, a widget
/// named by the goal, a success-indicator word, or a phase keyword in the
/// extracted content.
pub fn phases_reached(
    history: &AgentHistory,
    persona: &PersonaDefinition,
    tracker: Option<&PhaseTracker>,
) -> Vec<String> {
    let actions = history.actions_text();
    let content = history.content_text();
    let any_activity = history.num_actions() > 0 || !content.is_empty();
    let tracked_up_to = tracker
        .filter(|t| t.has_activity())
        .map(PhaseTracker::current_phase_index);

    persona
        .conversation_goals
        .iter()
        .enumerate()
        .filter(|(index, goal)| {
            if tracked_up_to.is_some_and(|up_to| *index <= up_to) {
                return true;
            }
            if goal.phase == "greeting" {
                return any_activity;
            }
            if goal
                .widget_types()
                .iter()
                .any(|w| actions.contains(w.as_str()) || content.contains(w.as_str()))
            {
                return true;
            }
            if let Some(indicator) = &goal.success_indicator {
                let indicator = indicator.to_lowercase();
                if indicator
                    .split_whitespace()
                    .filter(|w| w.chars().count() > 3)
                    .any(|w| content.contains(w))
                {
                    return true;
                }
            }
            phase_keywords(&goal.phase)
                .iter()
                .any(|k| content.contains(k))
        })
        .map(|(_, goal)| goal.phase.clone())
        .collect()
}

/// Last reached phase, or `none`.
pub fn phase_furthest(phases_reached: &[String]) -> String {
    phases_reached
        .last()
        .cloned()
        .unwrap_or_else(|| "none".to_string())
}

/// Approximate messages exchanged: non-empty extracted content entries.
pub fn count_messages(history: &AgentHistory) -> u32 {
    history
        .extracted_content
        .iter()
        .flatten()
        .filter(|c| !c.is_empty())
        .count() as u32
}

pub fn detect_widgets(history: &AgentHistory) -> Vec<String> {
    let combined = format!("{} {}", history.actions_text(), history.content_text());
    WIDGET_TYPES
        .iter()
        .filter(|w| combined.contains(*w))
        .map(|w| (*w).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ModelAction;
    use crate::persona::ConversationGoal;
    use crate::types::Language;

    fn persona() -> PersonaDefinition {
        let mut persona = PersonaDefinition::with_phases(
            "p",
            Language::Fr,
            &["greeting", "destination", "dates", "completion", "send_logs"],
        );
        persona.conversation_goals[2].widget_interactions = vec!["datePicker: July".to_string()];
        persona.conversation_goals[3] = ConversationGoal {
            success_indicator: Some("Le planner affiche un itinéraire".to_string()),
            ..ConversationGoal::new("completion")
        };
        persona
    }

    #[test]
    fn empty_history_reaches_nothing() {
        let reached = phases_reached(&AgentHistory::default(), &persona(), None);
        assert!(reached.is_empty());
        assert_eq!(phase_furthest(&reached), "none");
    }

    #[test]
    fn heuristics_detect_phases_in_order() {
        let history = AgentHistory {
            model_actions: vec![ModelAction::new("click_datepicker")],
            extracted_content: vec![Some("Voici votre itinéraire".to_string())],
            ..Default::default()
        };
        let reached = phases_reached(&history, &persona(), None);
        assert_eq!(reached, vec!["greeting", "dates", "completion"]);
        assert_eq!(phase_furthest(&reached), "completion");
    }

    #[test]
    fn tracker_index_counts_as_reached() {
        let mut tracker = PhaseTracker::new(5);
        tracker.push_action("click");
        tracker.advance_to(4);
        let reached = phases_reached(&AgentHistory::default(), &persona(), Some(&tracker));
        assert_eq!(reached.len(), 5);
        assert_eq!(phase_furthest(&reached), "send_logs");
    }

    #[test]
    fn idle_tracker_contributes_nothing() {
        let tracker = PhaseTracker::new(5);
        let reached = phases_reached(&AgentHistory::default(), &persona(), Some(&tracker));
        assert!(reached.is_empty());
    }

    #[test]
    fn messages_and_widgets() {
        let history = AgentHistory {
            model_actions: vec![ModelAction::new("open_TravelersSelector")],
            extracted_content: vec![
                Some("a".into()),
                None,
                Some(String::new()),
                Some("budgetRangeSlider".into()),
            ],
            ..Default::default()
        };
        assert_eq!(count_messages(&history), 2);
        assert_eq!(detect_widgets(&history), vec!["travelersselector", "budgetrangeslider"]);
    }
}
