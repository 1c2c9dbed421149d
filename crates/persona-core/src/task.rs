//! Task prompt handed to the browser agent at the start of a run.
//!
//! The prompt has three layers: a site preamble describing the target UI,
//! the persona's character sheet, and the ordered conversation flow. A
//! closing block repeats the mandatory feedback step so it is the last thing
//! the model reads.

use std::fmt::Write as _;

use crate::persona::{ConversationStyle, PersonaDefinition};
use crate::prompt::DEFAULT_FEEDBACK_LABEL;
use crate::types::Language;

/// Placeholder replaced with the planner URL inside a site preamble.
pub const PLANNER_URL_PLACEHOLDER: &str = "{planner_url}";

const SITE_PREAMBLE_FR: &str = "\n=== CONNAISSANCE DU SITE ===\n\n\
Tu vas interagir avec un site de planification de voyage doté d'un chatbot IA.\n\n\
NAVIGATION:\n\
- L'URL de départ est : {planner_url}\n\
- Le panneau gauche contient le CHAT. Le panneau droit contient une CARTE.\n\
- Concentre-toi UNIQUEMENT sur le panneau de chat. Ignore la carte et ses erreurs.\n\n\
INTERFACE DE CHAT:\n\
- Écris dans le champ \"Envoyer un message...\" puis clique \"Envoyer\".\n\
- Quand l'assistant réfléchit, un indicateur de frappe apparaît. ATTENDS qu'il disparaisse.\n\
- Si un message d'erreur apparaît, clique sur \"Réessayer\".\n\n\
WIDGETS INTERACTIFS:\n\
- CALENDRIER (datePicker / dateRangePicker) : clique les dates puis \"Confirmer\".\n\
- SÉLECTEUR DE VOYAGEURS (travelersSelector) : ajuste les compteurs +/- puis \"Confirmer\".\n\
- BUDGET (budgetRangeSlider) : ajuste le curseur puis \"Confirmer\".\n\
- Quand un widget apparaît, INTERAGIS AVEC LUI au lieu de taper par-dessus.\n";

const SITE_PREAMBLE_EN: &str = "\n=== SITE KNOWLEDGE ===\n\n\
You will interact with a travel planning website with an AI chatbot.\n\n\
NAVIGATION:\n\
- Starting URL: {planner_url}\n\
- The left panel contains the CHAT. The right panel contains a MAP.\n\
- Focus ONLY on the chat panel. Ignore the map and any error it shows.\n\n\
CHAT INTERFACE:\n\
- Type in the \"Send a message...\" input, then click \"Send\".\n\
- When the assistant is thinking, a typing indicator appears. WAIT for it to disappear.\n\
- If an error message appears, click \"Retry\".\n\n\
INTERACTIVE WIDGETS:\n\
- CALENDAR (datePicker / dateRangePicker): click the dates, then \"Confirm\".\n\
- TRAVELER SELECTOR (travelersSelector): adjust the +/- counters, then \"Confirm\".\n\
- BUDGET (budgetRangeSlider): adjust the slider, then \"Confirm\".\n\
- When a widget appears, INTERACT WITH IT instead of typing over it.\n";

/// Assembles the task prompt for one persona.
#[derive(Debug, Clone)]
pub struct TaskBuilder<'a> {
    persona: &'a PersonaDefinition,
    planner_url: &'a str,
    feedback_label: &'a str,
    site_preamble: Option<&'a str>,
}

impl<'a> TaskBuilder<'a> {
    pub fn new(persona: &'a PersonaDefinition, planner_url: &'a str) -> Self {
        Self {
            persona,
            planner_url,
            feedback_label: DEFAULT_FEEDBACK_LABEL,
            site_preamble: None,
        }
    }

    /// Replace the built-in site description. `{planner_url}` is substituted.
    pub fn with_site_preamble(mut self, preamble: &'a str) -> Self {
        self.site_preamble = Some(preamble);
        self
    }

    pub fn with_feedback_label(mut self, label: &'a str) -> Self {
        self.feedback_label = label;
        self
    }

    pub fn build(&self) -> String {
        let mut out = self.site_section();
        self.persona_section(&mut out);
        self.flow_section(&mut out);
        self.first_action(&mut out);
        self.final_reminder(&mut out);
        out
    }

    fn fr(&self) -> bool {
        self.persona.language == Language::Fr
    }

    fn site_section(&self) -> String {
        let template = self.site_preamble.unwrap_or(if self.fr() {
            SITE_PREAMBLE_FR
        } else {
            SITE_PREAMBLE_EN
        });
        template.replace(PLANNER_URL_PLACEHOLDER, self.planner_url)
    }

    fn persona_section(&self, out: &mut String) {
        let p = self.persona;
        let profile = &p.travel_profile;
        let fr = self.fr();
        let age = p.age.map_or_else(|| "?".to_string(), |a| a.to_string());
        let traits = join_or(&p.personality_traits, if fr { "neutre" } else { "neutral" });
        let travelers = travelers(p);
        let preferred = join_or(
            &profile.preferred_destinations,
            if fr { "pas de préférence" } else { "no preference" },
        );
        let avoided = join_or(
            &profile.avoided,
            if fr { "rien en particulier" } else { "nothing in particular" },
        );
        let flexible = "flexible";
        let trip_type = profile.trip_type.as_deref().unwrap_or(flexible);
        let month = profile.preferred_month.as_deref().unwrap_or(flexible);
        let duration = profile.trip_duration.as_deref().unwrap_or(flexible);
        let style = style_line(&p.conversation_style, p.language);
        let [questions, frustration, mind] = behaviour_lines(&p.conversation_style, p.language);
        let language = p.language.display_name();

        if fr {
            let _ = write!(
                out,
                "\n=== TON PERSONNAGE ===\n\n\
                 Tu es {name}, {age} ans.\n{role}\n\n\
                 Personnalité : {traits}\n\
                 Style de communication : {style}\n\
                 {questions}\n{frustration}\n{mind}\n\n\
                 LANGUE : Parle UNIQUEMENT en {language}. \
                 Toutes tes réponses doivent être en {language}.\n\n\
                 PROFIL DE VOYAGE :\n\
                 - Groupe : {group} ({travelers})\n\
                 - Budget : {budget}\n\
                 - Destinations souhaitées : {preferred}\n\
                 - À éviter : {avoided}\n\
                 - Type de voyage : {trip_type}\n\
                 - Période : {month}\n\
                 - Durée : {duration}\n",
                name = p.name,
                role = p.role,
                group = profile.group_type,
                budget = profile.budget_range,
            );
        } else {
            let _ = write!(
                out,
                "\n=== YOUR CHARACTER ===\n\n\
                 You are {name}, {age} years old.\n{role}\n\n\
                 Personality: {traits}\n\
                 Communication style: {style}\n\
                 {questions}\n{frustration}\n{mind}\n\n\
                 LANGUAGE: Speak ONLY in {language}. \
                 All your responses must be in {language}.\n\n\
                 TRAVEL PROFILE:\n\
                 - Group: {group} ({travelers})\n\
                 - Budget: {budget}\n\
                 - Preferred destinations: {preferred}\n\
                 - Avoiding: {avoided}\n\
                 - Trip type: {trip_type}\n\
                 - When: {month}\n\
                 - Duration: {duration}\n",
                name = p.name,
                role = p.role,
                group = profile.group_type,
                budget = profile.budget_range,
            );
        }
    }

    fn flow_section(&self, out: &mut String) {
        let fr = self.fr();
        out.push_str(if fr {
            "\n=== DÉROULEMENT DE LA CONVERSATION ===\n\n\
             Suis ces phases dans l'ordre. Reste dans ton personnage à chaque instant.\n"
        } else {
            "\n=== CONVERSATION FLOW ===\n\n\
             Follow these phases in order. Stay in character at all times.\n"
        });

        for (index, goal) in self.persona.conversation_goals.iter().enumerate() {
            let _ = writeln!(out, "\nPhase {} - {}:", index + 1, goal.phase.to_uppercase());
            let _ = writeln!(out, "  {}: {}", if fr { "Objectif" } else { "Goal" }, goal.goal);
            if let Some(message) = &goal.example_message {
                let label = if fr { "Message de départ" } else { "Starting message" };
                let _ = writeln!(out, "  {label}: \"{message}\"");
            }
            if !goal.widget_interactions.is_empty() {
                out.push_str(if fr {
                    "  Interactions widgets:\n"
                } else {
                    "  Widget interactions:\n"
                });
                for widget in &goal.widget_interactions {
                    let _ = writeln!(out, "    - {widget}");
                }
            }
            if let Some(min) = goal.min_messages.filter(|m| *m > 0) {
                if fr {
                    let _ = writeln!(out, "  Envoie au moins {min} messages dans cette phase.");
                } else {
                    let _ = writeln!(out, "  Send at least {min} messages in this phase.");
                }
            }
            if let Some(indicator) = &goal.success_indicator {
                let label = if fr { "Indicateur de succès" } else { "Success indicator" };
                let _ = writeln!(out, "  {label}: {indicator}");
            }
        }

        if fr {
            out.push_str(
                "\nRÈGLES DE RYTHME:\n\
                 - Attends que l'indicateur de frappe disparaisse avant d'envoyer.\n\
                 - Quand un widget apparaît, interagis avec lui AVANT de taper un message.\n\
                 - Envoie des messages naturels, pas des commandes robotiques.\n\
                 - Si l'assistant demande quelque chose, réponds dans ton personnage.\n",
            );
        } else {
            out.push_str(
                "\nPACING RULES:\n\
                 - Wait for the typing indicator to disappear before sending.\n\
                 - When a widget appears, interact with it BEFORE typing a message.\n\
                 - Send natural messages, not robotic commands.\n\
                 - If the assistant asks something, answer in character.\n",
            );
        }
    }

    fn first_action(&self, out: &mut String) {
        let url = self.planner_url;
        let opening = self
            .persona
            .conversation_goals
            .first()
            .and_then(|g| g.example_message.as_deref());
        if self.fr() {
            let _ = writeln!(out, "\nPREMIÈRE ACTION: Navigue vers {url}");
            if let Some(message) = opening {
                let _ = writeln!(
                    out,
                    "Ensuite, tape le message suivant dans le champ de texte \
                     et envoie-le:\n\"{message}\""
                );
            }
        } else {
            let _ = writeln!(out, "\nFIRST ACTION: Navigate to {url}");
            if let Some(message) = opening {
                let _ = writeln!(
                    out,
                    "Then type the following message in the text input and send it:\n\"{message}\""
                );
            }
        }
    }

    fn final_reminder(&self, out: &mut String) {
        let name = &self.persona.name;
        let label = self.feedback_label;
        if self.fr() {
            let _ = write!(
                out,
                "\n# RAPPEL FINAL - ACTION OBLIGATOIRE\n\n\
                 AVANT de terminer, tu DOIS accomplir cette dernière action :\n\
                 1. Scroll tout en bas du panneau de chat.\n\
                 2. Trouve le lien \"{label}\" situé SOUS le champ de texte.\n\
                 3. CLIQUE sur ce lien. Une fenêtre va s'ouvrir.\n\
                 4. Écris un résumé de ton expérience en tant que {name} : \
                 ce qui t'a plu, ce qui t'a frustré, une note sur 10.\n\
                 5. Envoie le formulaire.\n\n\
                 Si tu ne fais pas cette action, le test est considéré comme ÉCHOUÉ.\n"
            );
        } else {
            let _ = write!(
                out,
                "\n# FINAL REMINDER - MANDATORY ACTION\n\n\
                 BEFORE finishing, you MUST complete this final action:\n\
                 1. Scroll to the very bottom of the chat panel.\n\
                 2. Find the link \"{label}\" located BELOW the text input.\n\
                 3. CLICK this link. A dialog will open.\n\
                 4. Write a summary of your experience as {name}: \
                 what you liked, what frustrated you, a rating out of 10.\n\
                 5. Submit the form.\n\n\
                 If you do NOT complete this action, the test is considered FAILED.\n"
            );
        }
    }
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

fn travelers(persona: &PersonaDefinition) -> String {
    let parts: Vec<String> = persona
        .travel_profile
        .travelers
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(kind, count)| format!("{count} {kind}"))
        .collect();
    if parts.is_empty() {
        "solo".to_string()
    } else {
        parts.join(", ")
    }
}

fn style_line(style: &ConversationStyle, language: Language) -> String {
    let fr = language == Language::Fr;
    let verbosity = match style.verbosity.as_str() {
        "low" if fr => "concis, phrases courtes",
        "low" => "concise, short sentences",
        "medium" if fr => "normal, ni trop long ni trop court",
        "medium" => "normal, balanced length",
        "high" if fr => "bavard, détaillé",
        "high" => "talkative, detailed",
        other => other,
    };
    let formality = match style.formality.as_str() {
        "formal" if fr => "vouvoiement, ton professionnel",
        "formal" => "formal, professional tone",
        "casual" if fr => "tutoiement amical, décontracté",
        "casual" => "friendly, relaxed tone",
        "mixed" if fr => "mélange de formel et informel",
        "mixed" => "mix of formal and informal",
        other => other,
    };
    format!("{verbosity}; {formality}")
}

fn behaviour_lines(style: &ConversationStyle, language: Language) -> [&'static str; 3] {
    match language {
        Language::Fr => [
            if style.asks_questions {
                "Tu poses des questions de suivi."
            } else {
                "Tu réponds directement sans poser de questions."
            },
            if style.expresses_frustration {
                "Tu peux exprimer de la frustration si l'expérience est lente ou confuse."
            } else {
                "Tu restes patient(e) même si c'est lent."
            },
            if style.changes_mind {
                "Tu peux changer d'avis en cours de conversation."
            } else {
                "Tu restes cohérent(e) dans tes choix."
            },
        ],
        Language::En => [
            if style.asks_questions {
                "You ask follow-up questions."
            } else {
                "You respond directly without asking questions."
            },
            if style.expresses_frustration {
                "You may express frustration if the experience is slow or confusing."
            } else {
                "You stay patient even if things are slow."
            },
            if style.changes_mind {
                "You may change your mind during the conversation."
            } else {
                "You stay consistent in your choices."
            },
        ],
    }
}
