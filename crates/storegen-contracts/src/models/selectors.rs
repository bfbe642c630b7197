use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    /// Resolves `requested` for `capability`.
    ///
    /// Unregistered names pass through untouched so new upstream models can
    /// be used without a registry change; registered names that lack the
    /// capability fall back to the first capable model.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let fallback_reason = match requested.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => {
                if let Some(model) = self.registry.ensure(name, capability) {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                if self.registry.get(name).is_none() {
                    return Ok(ModelSelection {
                        model: ModelSpec {
                            name: name.to_string(),
                            provider: self.registry.provider_for(name),
                            capabilities: vec![capability],
                            fallback: None,
                        },
                        requested: Some(name.to_string()),
                        fallback_reason: None,
                    });
                }
                Some(format!(
                    "Requested model '{name}' unavailable for capability '{capability}'."
                ))
            }
            None => Some("No model specified; using default.".to_string()),
        };

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested.map(str::to_string),
            fallback_reason,
        })
    }
}
