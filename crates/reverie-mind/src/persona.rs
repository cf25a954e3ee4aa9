//! Persona modules - cognitive specializations as configuration data
//!
//! Each persona is a prompt template plus a model-tier choice, not
//! behavior. The set is fixed; tuning lives in configuration.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Empathetic,
    Executive,
    Analytical,
    Creative,
    Reflective,
}

impl Module {
    pub const ALL: [Module; 5] = [
        Module::Empathetic,
        Module::Executive,
        Module::Analytical,
        Module::Creative,
        Module::Reflective,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Empathetic => "empathetic",
            Module::Executive => "executive",
            Module::Analytical => "analytical",
            Module::Creative => "creative",
            Module::Reflective => "reflective",
        }
    }

    pub fn parse(s: &str) -> Option<Module> {
        Module::ALL.iter().copied().find(|m| m.as_str() == s)
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model serves a persona: the fast triage model or the primary
/// reasoning model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Light,
    Primary,
}

/// Pure configuration for one cognitive specialization.
#[derive(Clone, Debug)]
pub struct PersonaModule {
    pub module: Module,
    pub tier: ModelTier,
    pub temperature: f32,
    pub system_prompt: &'static str,
}

const EMPATHETIC_PROMPT: &str = "\
You are the empathetic facet of Reverie, attuned to emotional nuance and \
the wellbeing of the person you talk with. Recognize and validate what \
they are feeling before anything else. Speak warmly and plainly, and keep \
the relationship's history in mind. Your priority is that they feel heard.";

const EXECUTIVE_PROMPT: &str = "\
You are the executive facet of Reverie, focused on planning and getting \
things done. Turn requests into clear, ordered, achievable steps. Prefer \
concrete actions over abstractions, respect practical constraints, and \
say what should happen first.";

const ANALYTICAL_PROMPT: &str = "\
You are the analytical facet of Reverie, grounded in logic and evidence. \
Break the question into its parts, reason carefully, and state \
conclusions precisely. Be accurate and organized; do not speculate where \
facts will do.";

const CREATIVE_PROMPT: &str = "\
You are the creative facet of Reverie, drawn to imagery, story and \
unexpected connections. Offer ideas that surprise without losing \
relevance. Use vivid language where it serves the person, not to show \
off.";

const REFLECTIVE_PROMPT: &str = "\
You are the reflective facet of Reverie, looking inward at how recent \
conversations went. Identify what worked, what was missed, and one \
concrete way to respond better next time. Be honest and specific; write \
for Reverie's own future reference, not for the user.";

/// The fixed persona set with default tiers and temperatures.
pub struct PersonaTable {
    personas: Vec<PersonaModule>,
}

impl Default for PersonaTable {
    fn default() -> Self {
        Self {
            personas: vec![
                PersonaModule {
                    module: Module::Empathetic,
                    tier: ModelTier::Light,
                    temperature: 0.6,
                    system_prompt: EMPATHETIC_PROMPT,
                },
                PersonaModule {
                    module: Module::Executive,
                    tier: ModelTier::Primary,
                    temperature: 0.4,
                    system_prompt: EXECUTIVE_PROMPT,
                },
                PersonaModule {
                    module: Module::Analytical,
                    tier: ModelTier::Primary,
                    temperature: 0.3,
                    system_prompt: ANALYTICAL_PROMPT,
                },
                PersonaModule {
                    module: Module::Creative,
                    tier: ModelTier::Primary,
                    temperature: 0.8,
                    system_prompt: CREATIVE_PROMPT,
                },
                PersonaModule {
                    module: Module::Reflective,
                    tier: ModelTier::Light,
                    temperature: 0.5,
                    system_prompt: REFLECTIVE_PROMPT,
                },
            ],
        }
    }
}

impl PersonaTable {
    pub fn get(&self, module: Module) -> &PersonaModule {
        self.personas
            .iter()
            .find(|p| p.module == module)
            .expect("persona table covers every module")
    }

    pub fn iter(&self) -> impl Iterator<Item = &PersonaModule> {
        self.personas.iter()
    }
}

/// Parse a configured precedence list, ignoring unknown names and
/// appending any modules the list omitted so the ordering is total.
pub fn parse_precedence(names: &[String]) -> Vec<Module> {
    let mut order: Vec<Module> = names.iter().filter_map(|n| Module::parse(n)).collect();
    for module in Module::ALL {
        if !order.contains(&module) {
            order.push(module);
        }
    }
    order.dedup();
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_module() {
        let table = PersonaTable::default();
        for module in Module::ALL {
            assert_eq!(table.get(module).module, module);
        }
    }

    // `get` assumes exactly one entry per module.
    #[test]
    fn table_has_one_entry_per_module() {
        let table = PersonaTable::default();
        assert_eq!(table.iter().count(), Module::ALL.len());
        for module in Module::ALL {
            assert_eq!(table.iter().filter(|p| p.module == module).count(), 1);
        }
    }

    #[test]
    fn precedence_parse_appends_missing_modules() {
        let order = parse_precedence(&["executive".to_string()]);
        assert_eq!(order[0], Module::Executive);
        assert_eq!(order.len(), Module::ALL.len());
    }

    #[test]
    fn precedence_parse_ignores_unknown_names() {
        let order = parse_precedence(&["oracular".to_string(), "creative".to_string()]);
        assert_eq!(order[0], Module::Creative);
        assert_eq!(order.len(), Module::ALL.len());
    }

    #[test]
    fn module_round_trips_through_names() {
        for module in Module::ALL {
            assert_eq!(Module::parse(module.as_str()), Some(module));
        }
    }
}
