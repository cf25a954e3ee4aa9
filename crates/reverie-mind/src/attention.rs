//! Attention system - input triage and module selection
//!
//! A pure function of the input text and the carried-over affective
//! state. Classification is lexical and therefore approximate; failures
//! upstream degrade to the default module set, never to an empty one.

use crate::persona::Module;
use reverie_core::config::{AttentionSettings, PersonaSettings};
use reverie_core::ReverieConfig;
use reverie_memory::AffectiveState;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    Task,
    EmotionalSupport,
    Creative,
    Decision,
    Other,
}

/// Derived once per turn; only its effects persist.
#[derive(Clone, Debug)]
pub struct AttentionAnalysis {
    pub intent: Intent,
    /// Ordinal 1..=5.
    pub complexity: u8,
    /// Bounded 0..=1.
    pub intensity: f32,
    /// Never empty.
    pub required_modules: Vec<Module>,
}

const EMOTIONAL_CUES: [&str; 16] = [
    "i feel",
    "i'm feeling",
    "im feeling",
    "sad",
    "depressed",
    "anxious",
    "worried",
    "stressed",
    "lonely",
    "alone",
    "overwhelmed",
    "scared",
    "hurting",
    "can't take",
    "cant take",
    "crying",
];

const DECISION_CUES: [&str; 7] = [
    "should i",
    "decide",
    "decision",
    "choose",
    "which one",
    "pros and cons",
    "or should",
];

const TASK_CUES: [&str; 12] = [
    "write",
    "create",
    "make me",
    "build",
    "plan",
    "organize",
    "implement",
    "calculate",
    "generate",
    "draft",
    "help me",
    "summarize",
];

const CREATIVE_CUES: [&str; 8] = [
    "imagine",
    "story",
    "poem",
    "creative",
    "invent",
    "brainstorm",
    "compose",
    "metaphor",
];

const QUESTION_STARTERS: [&str; 10] = [
    "what", "how", "why", "who", "when", "where", "which", "is ", "are ", "can ",
];

const HIGH_INTENSITY_CUES: [&str; 9] = [
    "extremely",
    "desperate",
    "hate",
    "love",
    "terrible",
    "urgent",
    "anymore",
    "never",
    "always",
];

const MULTI_STEP_CUES: [&str; 8] = [
    "step", "then", "first", "second", "compare", "analyze", "detailed", "multiple",
];

pub struct AttentionSystem {
    settings: AttentionSettings,
    precedence: Vec<Module>,
    max_modules: usize,
}

impl AttentionSystem {
    pub fn new(settings: AttentionSettings, personas: &PersonaSettings) -> Self {
        Self {
            settings,
            precedence: crate::persona::parse_precedence(&personas.precedence),
            max_modules: personas.max_active_modules.max(1),
        }
    }

    pub fn from_config(config: &ReverieConfig) -> Self {
        Self::new(config.attention.clone(), &config.personas)
    }

    pub fn analyze(&self, input: &str, affective: &AffectiveState) -> AttentionAnalysis {
        let lower = input.to_lowercase();

        let intent = classify_intent(&lower);
        let complexity = assess_complexity(&lower);
        let intensity = self.assess_intensity(input, &lower, affective);
        let required_modules = self.select_modules(intent, complexity, intensity);

        debug!(
            ?intent,
            complexity,
            intensity,
            modules = ?required_modules,
            "attention analysis"
        );
        AttentionAnalysis {
            intent,
            complexity,
            intensity,
            required_modules,
        }
    }

    fn assess_intensity(&self, raw: &str, lower: &str, affective: &AffectiveState) -> f32 {
        let mut score = 0.0f32;

        let high_hits = HIGH_INTENSITY_CUES
            .iter()
            .filter(|c| lower.contains(**c))
            .count() as f32;
        score += high_hits * 0.3;

        let distress_hits = EMOTIONAL_CUES
            .iter()
            .filter(|c| lower.contains(**c))
            .count() as f32;
        score += (distress_hits * 0.15).min(0.45);

        let exclamations = raw.matches('!').count() as f32;
        score += (exclamations * 0.1).min(0.3);

        let letters = raw.chars().filter(|c| c.is_alphabetic()).count();
        if letters > 0 {
            let caps = raw.chars().filter(|c| c.is_uppercase()).count();
            score += ((caps as f32 / letters as f32) * 0.5).min(0.2);
        }

        score += (repeated_char_runs(raw) as f32 * 0.1).min(0.2);

        // A user already flagged as distressed raises the floor for
        // subsequent turns.
        let floor = affective.dims.distress() * self.settings.carry_over;
        score.max(floor).min(1.0)
    }

    /// Fixed decision table from (intent, complexity, intensity) to the
    /// module set. The reflective module is reserved for the background
    /// pass and never selected here.
    fn select_modules(&self, intent: Intent, complexity: u8, intensity: f32) -> Vec<Module> {
        let mut selected: Vec<Module> = match intent {
            Intent::EmotionalSupport => vec![Module::Empathetic],
            Intent::Task => vec![Module::Executive],
            Intent::Decision => vec![Module::Executive, Module::Analytical],
            Intent::Creative => vec![Module::Creative],
            Intent::Question => vec![Module::Analytical],
            Intent::Other => Vec::new(),
        };

        if complexity >= self.settings.complexity_threshold
            && !selected.contains(&Module::Analytical)
        {
            selected.push(Module::Analytical);
        }
        if intensity >= self.settings.intensity_threshold
            && !selected.contains(&Module::Empathetic)
        {
            selected.push(Module::Empathetic);
        }

        // No rule fired: fall back to the general conversational module
        // rather than an empty set.
        if selected.is_empty() {
            selected.push(Module::Empathetic);
        }

        selected.retain(|m| *m != Module::Reflective);
        let rank = |m: &Module| {
            self.precedence
                .iter()
                .position(|p| p == m)
                .unwrap_or(usize::MAX)
        };
        selected.sort_by_key(rank);
        selected.truncate(self.max_modules);
        selected
    }
}

fn classify_intent(lower: &str) -> Intent {
    let count = |cues: &[&str]| cues.iter().filter(|c| lower.contains(**c)).count() as u32;

    let emotional = count(&EMOTIONAL_CUES);
    let decision = count(&DECISION_CUES);
    let task = count(&TASK_CUES);
    let creative = count(&CREATIVE_CUES);
    let mut question = if lower.contains('?') { 2 } else { 0 };
    if QUESTION_STARTERS.iter().any(|s| lower.starts_with(s)) {
        question += 1;
    }
    if lower.contains("explain") || lower.contains("tell me") {
        question += 1;
    }

    // Listed most-urgent first; ties resolve toward the earlier entry.
    let ranked = [
        (emotional, Intent::EmotionalSupport),
        (decision, Intent::Decision),
        (task, Intent::Task),
        (creative, Intent::Creative),
        (question, Intent::Question),
    ];
    let mut best = (0u32, Intent::Other);
    for (score, intent) in ranked {
        if score > best.0 {
            best = (score, intent);
        }
    }
    best.1
}

fn assess_complexity(lower: &str) -> u8 {
    let mut score: i32 = 2;

    let words = lower.split_whitespace().count();
    if words > 50 {
        score += 1;
    } else if words < 10 {
        score -= 1;
    }

    if lower.matches('?').count() > 1 {
        score += 1;
    }

    let steps = MULTI_STEP_CUES
        .iter()
        .filter(|c| lower.contains(**c))
        .count() as i32;
    score += steps.min(2);

    score.clamp(1, 5) as u8
}

/// Runs of three or more identical characters ("soooo") read as emphasis.
fn repeated_char_runs(s: &str) -> usize {
    let chars: Vec<char> = s.chars().collect();
    let mut runs = 0;
    let mut i = 0;
    while i < chars.len() {
        let mut j = i + 1;
        while j < chars.len() && chars[j] == chars[i] {
            j += 1;
        }
        if j - i >= 3 && chars[i].is_alphabetic() {
            runs += 1;
        }
        i = j;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> AttentionSystem {
        AttentionSystem::new(AttentionSettings::default(), &PersonaSettings::default())
    }

    #[test]
    fn factual_question_classifies_as_question() {
        assert_eq!(classify_intent("what is the capital of france?"), Intent::Question);
    }

    #[test]
    fn distress_language_classifies_as_emotional_support() {
        assert_eq!(
            classify_intent("i feel so alone and overwhelmed"),
            Intent::EmotionalSupport
        );
    }

    #[test]
    fn greeting_classifies_as_other() {
        assert_eq!(classify_intent("good morning"), Intent::Other);
    }

    #[test]
    fn short_input_has_low_complexity() {
        assert!(assess_complexity("what time is it?") <= 2);
    }

    #[test]
    fn multi_step_prose_raises_complexity() {
        let text = "first analyze the dataset, then compare the results across multiple \
                    detailed scenarios and summarize each step for me in order please \
                    because i need a thorough breakdown of everything involved here";
        assert!(assess_complexity(text) >= 4);
    }

    #[test]
    fn modules_never_empty() {
        let sys = system();
        let analysis = sys.analyze("hmm", &AffectiveState::neutral());
        assert!(!analysis.required_modules.is_empty());
    }

    #[test]
    fn reflective_never_selected_synchronously() {
        let sys = system();
        for input in ["reflect on this", "what is love?", "i feel sad", "plan my week"] {
            let analysis = sys.analyze(input, &AffectiveState::neutral());
            assert!(!analysis.required_modules.contains(&Module::Reflective));
        }
    }

    #[test]
    fn carried_distress_raises_intensity_floor() {
        let sys = system();
        let mut distressed = AffectiveState::neutral();
        distressed.dims.sadness = 0.9;
        let neutral_read = sys.analyze("okay then", &AffectiveState::neutral());
        let distressed_read = sys.analyze("okay then", &distressed);
        assert!(distressed_read.intensity > neutral_read.intensity);
    }

    #[test]
    fn repeated_characters_count_as_emphasis() {
        assert_eq!(repeated_char_runs("i am sooooo tired"), 1);
        assert_eq!(repeated_char_runs("fine"), 0);
    }
}
