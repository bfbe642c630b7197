use std::time::Duration;

use storegen_contracts::models::{Capability, ModelRegistry, ModelSelector};

use crate::invoke::FallbackPolicy;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_FALLBACK_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_STRATEGY_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_PRODUCT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_HANDOFF_DELAY: Duration = Duration::from_millis(1500);

/// Models and limits for one synthesis run.
///
/// A text fallback left unset is taken from the registry entry of the text
/// model (`gemini-2.5-flash` falls back to `gemini-flash-lite-latest`). Image
/// calls get a single attempt unless an image fallback is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisConfig {
    pub text_model: String,
    pub text_fallback_model: Option<String>,
    pub image_model: String,
    pub image_fallback_model: Option<String>,
    pub fallback_backoff: Duration,
    pub strategy_max_tokens: u32,
    pub product_max_tokens: u32,
    pub handoff_delay: Duration,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            text_fallback_model: None,
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            image_fallback_model: None,
            fallback_backoff: DEFAULT_FALLBACK_BACKOFF,
            strategy_max_tokens: DEFAULT_STRATEGY_MAX_TOKENS,
            product_max_tokens: DEFAULT_PRODUCT_MAX_TOKENS,
            handoff_delay: DEFAULT_HANDOFF_DELAY,
        }
    }
}

impl SynthesisConfig {
    /// Offline models served by the dryrun transport.
    pub fn dryrun() -> Self {
        Self {
            text_model: "dryrun-text-1".to_string(),
            image_model: "dryrun-image-1".to_string(),
            fallback_backoff: Duration::ZERO,
            handoff_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies `STOREGEN_*` overrides read through `lookup` on top of the
    /// defaults. Blank values and unparsable numbers are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();
        if let Some(model) = read("STOREGEN_TEXT_MODEL") {
            config.text_model = model;
        }
        config.text_fallback_model = read("STOREGEN_TEXT_FALLBACK_MODEL");
        if let Some(model) = read("STOREGEN_IMAGE_MODEL") {
            config.image_model = model;
        }
        config.image_fallback_model = read("STOREGEN_IMAGE_FALLBACK_MODEL");
        if let Some(millis) = read("STOREGEN_FALLBACK_BACKOFF_MS").and_then(|raw| raw.parse().ok())
        {
            config.fallback_backoff = Duration::from_millis(millis);
        }
        config
    }

    /// Replaces models the registry knows cannot serve their capability.
    /// Returns one warning per substitution.
    pub fn resolve(&mut self, selector: &ModelSelector) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();
        for (slot, capability) in [
            (&mut self.text_model, Capability::Text),
            (&mut self.image_model, Capability::Image),
        ] {
            let selection = selector.select(Some(slot.as_str()), capability)?;
            if let Some(reason) = selection.fallback_reason {
                warnings.push(format!("{reason} Using {}.", selection.model.name));
                *slot = selection.model.name;
            }
        }
        Ok(warnings)
    }

    pub fn text_policy(&self, registry: &ModelRegistry) -> FallbackPolicy {
        let fallback = self.text_fallback_model.clone().or_else(|| {
            registry
                .get(&self.text_model)
                .and_then(|spec| spec.fallback.clone())
        });
        FallbackPolicy::new(self.text_model.clone(), fallback, self.fallback_backoff)
    }

    pub fn image_policy(&self) -> FallbackPolicy {
        FallbackPolicy::new(
            self.image_model.clone(),
            self.image_fallback_model.clone(),
            self.fallback_backoff,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_use_flash_with_lite_fallback() {
        let config = SynthesisConfig::default();
        let policy = config.text_policy(&ModelRegistry::default());
        assert_eq!(policy.primary, "gemini-2.5-flash");
        assert_eq!(policy.fallback.as_deref(), Some("gemini-flash-lite-latest"));
        assert_eq!(policy.backoff, Duration::from_secs(1));

        let image = config.image_policy();
        assert_eq!(image.primary, "gemini-2.5-flash-image");
        assert_eq!(image.fallback, None);
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("STOREGEN_TEXT_MODEL", "gemini-2.5-pro"),
            ("STOREGEN_TEXT_FALLBACK_MODEL", "gemini-2.5-flash"),
            ("STOREGEN_IMAGE_MODEL", "  "),
            ("STOREGEN_FALLBACK_BACKOFF_MS", "soon"),
        ]
        .into_iter()
        .collect();
        let config =
            SynthesisConfig::from_lookup(|key| vars.get(key).map(|value| value.to_string()));
        assert_eq!(config.text_model, "gemini-2.5-pro");
        assert_eq!(config.text_fallback_model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.fallback_backoff, DEFAULT_FALLBACK_BACKOFF);

        let config = SynthesisConfig::from_lookup(|key| {
            (key == "STOREGEN_FALLBACK_BACKOFF_MS").then(|| "250".to_string())
        });
        assert_eq!(config.fallback_backoff, Duration::from_millis(250));
    }

    #[test]
    fn resolve_swaps_models_lacking_capability() -> Result<(), String> {
        let mut config = SynthesisConfig {
            image_model: "gemini-2.5-flash".to_string(),
            ..SynthesisConfig::default()
        };
        let warnings = config.resolve(&ModelSelector::new(None))?;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("gemini-2.5-flash"));
        assert_eq!(config.image_model, "gemini-2.5-flash-image");
        assert_eq!(config.text_model, DEFAULT_TEXT_MODEL);
        Ok(())
    }

    #[test]
    fn dryrun_policy_falls_back_to_lite_dryrun_model() {
        let policy = SynthesisConfig::dryrun().text_policy(&ModelRegistry::default());
        assert_eq!(policy.primary, "dryrun-text-1");
        assert_eq!(policy.fallback.as_deref(), Some("dryrun-text-lite"));
        assert!(policy.backoff.is_zero());
    }
}
