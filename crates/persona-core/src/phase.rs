//! Conversation phase progress tracking.
//!
//! The tracker estimates how far the agent has progressed through the
//! persona's scripted phases by keyword-matching step telemetry. It is a
//! heuristic: keywords are kept in a plain table so they can be tested and
//! replaced without touching the session control flow.

use std::collections::VecDeque;

use crate::persona::ConversationGoal;

const RECENT_ACTIONS_CAP: usize = 6;
const STUCK_TAIL: usize = 3;

/// Keywords per well-known phase name. Matched against a lowercase haystack.
const PHASE_KEYWORDS: &[(&str, &[&str])] = &[
    ("greeting", &["bonjour", "hello", "salut"]),
    (
        "preferences",
        &[
            "preferencestyle",
            "preferenceinterests",
            "préférence",
            "preference",
            "intérêt",
            "interest",
        ],
    ),
    (
        "destination",
        &["destination", "ville", "city", "pays", "country", "cityselector"],
    ),
    (
        "dates",
        &["datepicker", "daterangepicker", "calendar", "calendrier", "dates"],
    ),
    (
        "travelers",
        &[
            "travelersselector",
            "voyageur",
            "traveler",
            "adulte",
            "adult",
            "enfant",
            "child",
        ],
    ),
    (
        "logistics",
        &[
            "aéroport",
            "aeroport",
            "airport",
            "airportconfirmation",
            "flight",
            "aller-retour",
            "triptypeconfirm",
        ],
    ),
    (
        "accommodation",
        &["hôtel", "hotel", "hébergement", "accommodation", "budgetrangeslider"],
    ),
    ("deep_conversation", &[]),
    ("completion", &["récapitulatif", "recapitulatif", "recap"]),
    ("send_logs", &["nous aider", "feedback", "send logs"]),
];

const FEEDBACK_KEYWORDS: &[&str] = &["nous aider", "feedback"];
const INTERACTION_VERBS: &[&str] = &[
    "click", "clique", "type", "input", "submit", "soumet", "envoie",
];

/// Keyword set for a phase name. Unknown names yield an empty slice.
pub fn phase_keywords(phase: &str) -> &'static [&'static str] {
    PHASE_KEYWORDS
        .iter()
        .find(|(name, _)| *name == phase)
        .map_or(&[], |(_, keywords)| *keywords)
}

/// Monotonic progress state for one persona run.
///
/// Survives model failover: a backup model continues from the phase the
/// previous one reached.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    total_phases: usize,
    current_phase_index: usize,
    feedback_submitted: bool,
    recent_actions: VecDeque<String>,
    stuck_action_count: u32,
    actions_seen: usize,
}

impl PhaseTracker {
    pub fn new(total_phases: usize) -> Self {
        Self {
            total_phases,
            current_phase_index: 0,
            feedback_submitted: false,
            recent_actions: VecDeque::with_capacity(RECENT_ACTIONS_CAP),
            stuck_action_count: 0,
            actions_seen: 0,
        }
    }

    pub fn total_phases(&self) -> usize {
        self.total_phases
    }

    pub fn current_phase_index(&self) -> usize {
        self.current_phase_index
    }

    /// The last scripted phase is always feedback submission.
    pub fn feedback_phase_index(&self) -> usize {
        self.total_phases.saturating_sub(1)
    }

    pub fn is_feedback_reached(&self) -> bool {
        self.current_phase_index >= self.feedback_phase_index()
    }

    pub fn phases_remaining(&self) -> usize {
        self.total_phases.saturating_sub(self.current_phase_index)
    }

    pub fn feedback_submitted(&self) -> bool {
        self.feedback_submitted
    }

    pub fn stuck_action_count(&self) -> u32 {
        self.stuck_action_count
    }

    /// True once any action has been observed in this run.
    pub fn has_activity(&self) -> bool {
        self.actions_seen > 0
    }

    pub fn recent_actions(&self) -> impl Iterator<Item = &str> {
        self.recent_actions.iter().map(String::as_str)
    }

    pub fn push_action(&mut self, name: impl Into<String>) {
        self.recent_actions.push_back(name.into());
        while self.recent_actions.len() > RECENT_ACTIONS_CAP {
            self.recent_actions.pop_front();
        }
        self.actions_seen += 1;
    }

    /// The last three recorded actions are identical.
    pub fn is_stuck_in_loop(&self) -> bool {
        if self.recent_actions.len() < STUCK_TAIL {
            return false;
        }
        let mut tail = self.recent_actions.iter().rev().take(STUCK_TAIL);
        let first = tail.next();
        tail.all(|a| Some(a) == first)
    }

    /// Move forward to `index`. Lower indices are ignored.
    pub fn advance_to(&mut self, index: usize) {
        if index > self.current_phase_index {
            self.current_phase_index = index;
        }
    }

    pub fn mark_feedback_submitted(&mut self) {
        self.feedback_submitted = true;
    }

    /// Count one more stuck step and return the new count.
    pub fn record_stuck(&mut self) -> u32 {
        self.stuck_action_count += 1;
        self.stuck_action_count
    }

    pub fn reset_stuck(&mut self) {
        self.stuck_action_count = 0;
    }
}

/// Update the tracker from one step's telemetry.
///
/// Only phases after the current one are scanned, so the index can jump
/// forward several phases but never moves back.
pub fn update(
    tracker: &mut PhaseTracker,
    goals: &[ConversationGoal],
    thinking: Option<&str>,
    action_names: &[String],
) {
    for name in action_names {
        tracker.push_action(name.clone());
    }

    let mut haystack = action_names.join(" ").to_lowercase();
    if let Some(thinking) = thinking {
        haystack.push(' ');
        haystack.push_str(&thinking.to_lowercase());
    }

    let start = tracker.current_phase_index() + 1;
    for (index, goal) in goals.iter().enumerate().skip(start) {
        if goal_matches(goal, &haystack) {
            tracker.advance_to(index);
        }
    }

    let mentions_feedback = FEEDBACK_KEYWORDS.iter().any(|k| haystack.contains(k));
    let interacts = INTERACTION_VERBS.iter().any(|v| haystack.contains(v));
    if mentions_feedback && interacts {
        tracker.mark_feedback_submitted();
    }
}

fn goal_matches(goal: &ConversationGoal, haystack: &str) -> bool {
    if phase_keywords(&goal.phase)
        .iter()
        .any(|k| haystack.contains(k))
    {
        return true;
    }
    goal.widget_types()
        .iter()
        .any(|w| haystack.contains(w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHASES: [&str; 9] = [
        "greeting",
        "preferences",
        "destination",
        "dates",
        "travelers",
        "logistics",
        "deep_conversation",
        "completion",
        "send_logs",
    ];

    fn goals() -> Vec<ConversationGoal> {
        PHASES.iter().map(|p| ConversationGoal::new(*p)).collect()
    }

    fn tracker() -> PhaseTracker {
        PhaseTracker::new(PHASES.len())
    }

    fn actions(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn initial_state() {
        let pt = tracker();
        assert_eq!(pt.current_phase_index(), 0);
        assert_eq!(pt.feedback_phase_index(), 8);
        assert_eq!(pt.phases_remaining(), 9);
        assert!(!pt.is_feedback_reached());
        assert!(!pt.feedback_submitted());
        assert!(!pt.has_activity());
    }

    #[test]
    fn feedback_phase_is_always_last() {
        for total in 1..20 {
            assert_eq!(PhaseTracker::new(total).feedback_phase_index(), total - 1);
        }
    }

    #[test]
    fn phases_remaining_saturates() {
        let mut pt = tracker();
        pt.advance_to(8);
        assert!(pt.is_feedback_reached());
        assert_eq!(pt.phases_remaining(), 1);
        pt.advance_to(9);
        assert_eq!(pt.phases_remaining(), 0);
    }

    #[test]
    fn destination_keyword_advances() {
        let mut pt = tracker();
        update(&mut pt, &goals(), Some("Looking at destination suggestions"), &actions(&["click"]));
        assert!(pt.current_phase_index() >= 2);
    }

    #[test]
    fn action_name_alone_advances() {
        let mut pt = tracker();
        update(&mut pt, &goals(), None, &actions(&["datepicker"]));
        assert!(pt.current_phase_index() >= 3);
    }

    #[test]
    fn never_moves_backwards() {
        let mut pt = tracker();
        pt.advance_to(5);
        update(&mut pt, &goals(), Some("greeting bonjour destination"), &actions(&["type"]));
        assert_eq!(pt.current_phase_index(), 5);
    }

    #[test]
    fn airport_advances_to_logistics() {
        let mut pt = tracker();
        update(&mut pt, &goals(), Some("selecting aéroport CDG"), &actions(&["click"]));
        assert!(pt.current_phase_index() >= 5);
    }

    #[test]
    fn recap_advances_to_completion() {
        let mut pt = tracker();
        pt.advance_to(6);
        update(
            &mut pt,
            &goals(),
            Some("je vois le récapitulatif du voyage"),
            &actions(&["scroll"]),
        );
        assert!(pt.current_phase_index() >= 7);
    }

    #[test]
    fn successive_steps_progress() {
        let mut pt = tracker();
        update(&mut pt, &goals(), Some("bonjour je cherche un voyage"), &actions(&["type"]));
        let after_greeting = pt.current_phase_index();
        update(&mut pt, &goals(), Some("Looking at destination cards"), &actions(&["click"]));
        assert!(pt.current_phase_index() > after_greeting);
    }

    #[test]
    fn feedback_click_marks_submitted() {
        let mut pt = tracker();
        update(&mut pt, &goals(), Some("clicking on nous aider link"), &actions(&["click"]));
        assert!(pt.feedback_submitted());

        let mut pt = tracker();
        update(&mut pt, &goals(), Some("submitted the popup feedback form"), &actions(&["click"]));
        assert!(pt.feedback_submitted());
    }

    #[test]
    fn cookie_popup_click_is_not_feedback() {
        let mut pt = tracker();
        update(
            &mut pt,
            &goals(),
            Some("Accept the cookie consent popup first"),
            &actions(&["click_element"]),
        );
        assert!(!pt.feedback_submitted());
    }

    #[test]
    fn feedback_without_interaction_is_not_submitted() {
        let mut pt = tracker();
        update(&mut pt, &goals(), Some("I see the feedback link"), &actions(&["scroll"]));
        assert!(!pt.feedback_submitted());
    }

    #[test]
    fn feedback_submitted_is_one_way() {
        let mut pt = tracker();
        update(&mut pt, &goals(), Some("nous aider"), &actions(&["click"]));
        update(&mut pt, &goals(), Some("nothing to see"), &actions(&["scroll"]));
        assert!(pt.feedback_submitted());
    }

    #[test]
    fn widget_interactions_extend_keywords() {
        let mut custom = ConversationGoal::new("budget");
        custom.widget_interactions = vec!["budgetSlider: slide to 3000".to_string()];
        let goals = vec![
            ConversationGoal::new("greeting"),
            custom,
            ConversationGoal::new("send_logs"),
        ];

        let mut pt = PhaseTracker::new(3);
        update(&mut pt, &goals, Some("dragging the BudgetSlider"), &actions(&["drag"]));
        assert_eq!(pt.current_phase_index(), 1);
    }

    #[test]
    fn stuck_on_three_identical_actions() {
        let mut pt = tracker();
        for name in ["click", "type", "click", "click"] {
            pt.push_action(name);
        }
        assert!(!pt.is_stuck_in_loop());
        pt.push_action("click");
        assert!(pt.is_stuck_in_loop());
        pt.push_action("scroll");
        assert!(!pt.is_stuck_in_loop());
    }

    #[test]
    fn recent_actions_ring_is_bounded() {
        let mut pt = tracker();
        for i in 0..10 {
            pt.push_action(format!("a{i}"));
        }
        let recent: Vec<&str> = pt.recent_actions().collect();
        assert_eq!(recent, vec!["a4", "a5", "a6", "a7", "a8", "a9"]);
        assert!(pt.has_activity());
    }

    #[test]
    fn stuck_counter_resets() {
        let mut pt = tracker();
        assert_eq!(pt.record_stuck(), 1);
        assert_eq!(pt.record_stuck(), 2);
        pt.reset_stuck();
        assert_eq!(pt.stuck_action_count(), 0);
    }
}
