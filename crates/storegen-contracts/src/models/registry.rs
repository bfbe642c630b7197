use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Text,
    Vision,
    Image,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Vision => "vision",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub name: String,
    /// Transport that serves this model.
    pub provider: String,
    pub capabilities: Vec<Capability>,
    /// Lighter sibling to retry on when this model is overloaded.
    pub fallback: Option<String>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }

    /// Provider for `name`, inferred from the name when it is not registered.
    pub fn provider_for(&self, name: &str) -> String {
        if let Some(spec) = self.get(name) {
            return spec.provider.clone();
        }
        if name.starts_with("dryrun-") {
            "dryrun".to_string()
        } else {
            "gemini".to_string()
        }
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    use Capability::{Image, Text, Vision};

    let mut map = IndexMap::new();
    let mut insert =
        |name: &str, provider: &str, capabilities: &[Capability], fallback: Option<&str>| {
            map.insert(
                name.to_string(),
                ModelSpec {
                    name: name.to_string(),
                    provider: provider.to_string(),
                    capabilities: capabilities.to_vec(),
                    fallback: fallback.map(str::to_string),
                },
            );
        };

    insert(
        "gemini-2.5-flash",
        "gemini",
        &[Text, Vision],
        Some("gemini-flash-lite-latest"),
    );
    insert("gemini-flash-lite-latest", "gemini", &[Text, Vision], None);
    insert("gemini-2.5-pro", "gemini", &[Text, Vision], Some("gemini-2.5-flash"));
    insert("gemini-2.5-flash-image", "gemini", &[Image], None);
    insert(
        "gemini-3-pro-image-preview",
        "gemini",
        &[Image],
        Some("gemini-2.5-flash-image"),
    );
    insert("dryrun-text-1", "dryrun", &[Text, Vision], Some("dryrun-text-lite"));
    insert("dryrun-text-lite", "dryrun", &[Text, Vision], None);
    insert("dryrun-image-1", "dryrun", &[Image], None);

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_each_capability() {
        let registry = ModelRegistry::default();
        for capability in [Capability::Text, Capability::Vision, Capability::Image] {
            assert!(!registry.by_capability(capability).is_empty());
        }
        assert_eq!(
            registry
                .get("gemini-2.5-flash")
                .and_then(|spec| spec.fallback.as_deref()),
            Some("gemini-flash-lite-latest")
        );
    }

    #[test]
    fn ensure_checks_capability() {
        let registry = ModelRegistry::default();
        assert!(registry
            .ensure("gemini-2.5-flash-image", Capability::Image)
            .is_some());
        assert!(registry
            .ensure("gemini-2.5-flash-image", Capability::Text)
            .is_none());
        assert!(registry.ensure("missing", Capability::Text).is_none());
    }

    #[test]
    fn provider_is_inferred_for_unknown_models() {
        let registry = ModelRegistry::default();
        assert_eq!(registry.provider_for("dryrun-image-1"), "dryrun");
        assert_eq!(registry.provider_for("dryrun-custom"), "dryrun");
        assert_eq!(registry.provider_for("gemini-exp-1206"), "gemini");
    }
}
