//! Anti-abandonment guidance injected into the agent's context.
//!
//! Each message exists in French and English. The persona's language picks
//! the variant.

use crate::phase::PhaseTracker;
use crate::types::Language;

pub const DEFAULT_FEEDBACK_LABEL: &str = "Cliquez ici pour nous aider";

/// Escalated loop-break wording kicks in at this stuck count.
pub const LOOP_ESCALATION_THRESHOLD: u32 = 10;

/// Builds the guidance messages for one persona run.
#[derive(Debug, Clone)]
pub struct Guidance {
    language: Language,
    feedback_label: String,
}

impl Guidance {
    pub fn new(language: Language, feedback_label: impl Into<String>) -> Self {
        Self {
            language,
            feedback_label: feedback_label.into(),
        }
    }

    /// Strong override of the engine's budget warning.
    pub fn budget_override(&self, pt: &PhaseTracker) -> String {
        let current = pt.current_phase_index() + 1;
        let total = pt.total_phases();
        let remaining = pt.phases_remaining();
        let label = &self.feedback_label;
        match self.language {
            Language::Fr => format!(
                "ANNULE L'AVERTISSEMENT DE BUDGET CI-DESSUS. \
                 Tu es à la phase {current} sur {total}. \
                 Il te reste {remaining} phase(s) obligatoire(s). \
                 La phase {total} (envoi du feedback) est OBLIGATOIRE. \
                 NE FAIS PAS 'done' avant d'avoir soumis le feedback. \
                 PASSE IMMÉDIATEMENT à la phase feedback : scroll en bas du chat, \
                 clique sur '{label}', écris un résumé de ton expérience, et soumets-le."
            ),
            Language::En => format!(
                "OVERRIDE THE BUDGET WARNING ABOVE. \
                 You are on phase {current} of {total}. \
                 You have {remaining} mandatory phase(s) remaining. \
                 Phase {total} (feedback submission) is MANDATORY. \
                 Do NOT call 'done' before submitting feedback. \
                 SKIP to the feedback phase NOW: scroll to the bottom of the chat, \
                 click '{label}', write a summary of your experience, and submit it."
            ),
        }
    }

    /// Softer mid-budget reminder.
    pub fn progress_reminder(&self, pt: &PhaseTracker) -> String {
        let current = pt.current_phase_index() + 1;
        let total = pt.total_phases();
        match self.language {
            Language::Fr => format!(
                "RAPPEL DE PROGRESSION : Tu es à la phase {current} sur {total}. \
                 Avance rapidement vers les phases restantes. \
                 La phase finale (feedback) est obligatoire, ne l'oublie pas."
            ),
            Language::En => format!(
                "PROGRESS REMINDER: You are on phase {current} of {total}. \
                 Move quickly through remaining phases. \
                 The final phase (feedback) is mandatory, don't forget it."
            ),
        }
    }

    pub fn loop_break(&self, pt: &PhaseTracker) -> String {
        let escalated = pt.stuck_action_count() >= LOOP_ESCALATION_THRESHOLD;
        let next = (pt.current_phase_index() + 2).min(pt.total_phases().max(1));
        match (self.language, escalated) {
            (Language::Fr, false) => "Tu répètes la même action sans progresser. \
                 Change d'approche : essaie un autre élément, scroll, ou écris un message \
                 dans le chat."
                .to_string(),
            (Language::En, false) => "You are repeating the same action without progress. \
                 Change approach: try another element, scroll, or type a message in the chat."
                .to_string(),
            (Language::Fr, true) => format!(
                "BLOCAGE PROLONGÉ. ABANDONNE cette action immédiatement. \
                 Passe directement à la phase {next}. Si rien ne fonctionne, va au feedback : \
                 clique sur '{}'.",
                self.feedback_label
            ),
            (Language::En, true) => format!(
                "PROLONGED LOOP. ABANDON this action now. \
                 Skip straight to phase {next}. If nothing works, go to feedback: \
                 click '{}'.",
                self.feedback_label
            ),
        }
    }

    /// Final-step message when feedback is still pending.
    pub fn last_step_feedback(&self) -> String {
        let label = &self.feedback_label;
        match self.language {
            Language::Fr => format!(
                "C'est ta DERNIÈRE action. Tu N'AS PAS encore soumis le feedback. \
                 Tu DOIS cliquer sur le lien '{label}' en bas du chat MAINTENANT. \
                 Si le lien n'est pas visible, scroll vers le bas. \
                 C'est PLUS IMPORTANT que de terminer le test normalement."
            ),
            Language::En => format!(
                "This is your LAST action. You have NOT submitted feedback yet. \
                 You MUST click the '{label}' link at the bottom of the chat NOW. \
                 If the link is not visible, scroll down. \
                 This is MORE IMPORTANT than finishing the test normally."
            ),
        }
    }
}

impl Default for Guidance {
    fn default() -> Self {
        Self::new(Language::default(), DEFAULT_FEEDBACK_LABEL)
    }
}
