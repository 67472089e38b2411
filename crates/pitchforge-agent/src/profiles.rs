use pitchforge_core::AgentKind;
use serde::{Deserialize, Serialize};

/// System prompt and completion parameters for one agent kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Agent the profile applies to.
    pub kind: AgentKind,
    /// System prompt sent with every call.
    pub system_prompt: String,
    /// Overrides the model's default temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Overrides the model's default length limit.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl AgentProfile {
    /// Profile with the model's default sampling.
    pub fn new(kind: AgentKind, system_prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system_prompt: system_prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature override.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the length limit override.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Built-in profile for each LLM-backed agent kind.
pub fn default_profile(kind: AgentKind) -> AgentProfile {
    match kind {
        AgentKind::Research => AgentProfile::new(
            kind,
            "You are a market research specialist. Analyze customer information and \
             provide insights about their business, industry trends, pain points and \
             potential opportunities. Answer with JSON only.",
        )
        .with_temperature(0.4),
        AgentKind::Generator => AgentProfile::new(
            kind,
            "You are an expert marketing copywriter specializing in B2B sales pitches. \
             Create compelling, personalized pitches that resonate with the target audience.",
        )
        .with_temperature(0.8),
        AgentKind::Scorer => AgentProfile::new(
            kind,
            "You are a marketing pitch evaluation expert. Score pitches on specific \
             dimensions and provide constructive feedback. Be critical but fair. \
             Answer with JSON only.",
        )
        .with_temperature(0.0)
        .with_max_tokens(1000),
        AgentKind::Refiner => AgentProfile::new(
            kind,
            "You are a marketing pitch refinement specialist. Improve pitches based on \
             feedback while maintaining the core message and tone.",
        )
        .with_temperature(0.7),
        AgentKind::Strategist => AgentProfile::new(
            kind,
            "You are a marketing campaign strategist. Develop focused outreach \
             strategies based on the target customer and their context. Answer with JSON only.",
        )
        .with_temperature(0.5),
        AgentKind::Client | AgentKind::Orchestrator => AgentProfile::new(kind, ""),
    }
}

/// Profiles for every agent kind, with per-kind overrides applied on top of
/// the defaults. The last override for a kind wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentProfiles {
    overrides: Vec<AgentProfile>,
}

impl AgentProfiles {
    /// Replace the profile for `profile.kind`.
    pub fn with_override(mut self, profile: AgentProfile) -> Self {
        self.overrides.push(profile);
        self
    }

    /// Profile for `kind`: the last override, or the built-in default.
    pub fn get(&self, kind: AgentKind) -> AgentProfile {
        self.overrides
            .iter()
            .rev()
            .find(|p| p.kind == kind)
            .cloned()
            .unwrap_or_else(|| default_profile(kind))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_exist_for_every_llm_agent() {
        for kind in [
            AgentKind::Research,
            AgentKind::Generator,
            AgentKind::Scorer,
            AgentKind::Refiner,
            AgentKind::Strategist,
        ] {
            let profile = default_profile(kind);
            assert_eq!(profile.kind, kind);
            assert!(!profile.system_prompt.is_empty(), "{kind} has no prompt");
        }
    }

    #[test]
    fn test_scorer_is_deterministic_by_default() {
        assert_eq!(default_profile(AgentKind::Scorer).temperature, Some(0.0));
    }

    #[test]
    fn test_override_replaces_default() {
        let profiles = AgentProfiles::default()
            .with_override(AgentProfile::new(AgentKind::Generator, "Write haiku pitches."));
        assert_eq!(profiles.get(AgentKind::Generator).system_prompt, "Write haiku pitches.");
        assert_eq!(profiles.get(AgentKind::Refiner), default_profile(AgentKind::Refiner));
    }

    #[test]
    fn test_profiles_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            profiles: AgentProfiles,
        }
        let toml_str = r#"
            [[profiles]]
            kind = "scorer"
            system_prompt = "Be harsh."
            temperature = 0.1
        "#;
        let wrapper: Wrapper = toml::from_str(toml_str).unwrap();
        let scorer = wrapper.profiles.get(AgentKind::Scorer);
        assert_eq!(scorer.system_prompt, "Be harsh.");
        assert_eq!(scorer.max_tokens, None);
    }
}
