use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use storegen_contracts::catalog::{ImageRef, ReferenceImage};
use storegen_contracts::errors::UpstreamError;
use storegen_contracts::models::ModelRegistry;

/// Logical operation a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    BrandStrategy,
    ProductDetails,
    Logo,
    Banner,
    ImageVariation,
    AssistantAction,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BrandStrategy => "brand_strategy",
            Self::ProductDetails => "product_details",
            Self::Logo => "logo",
            Self::Banner => "banner",
            Self::ImageVariation => "image_variation",
            Self::AssistantAction => "assistant_action",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn to_image_ref(&self) -> ImageRef {
        ImageRef::data_url(&self.mime_type, &self.to_base64())
    }
}

impl From<&ReferenceImage> for InlineImage {
    fn from(image: &ReferenceImage) -> Self {
        Self {
            mime_type: image.mime_type.clone(),
            data: image.bytes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPart {
    Text(String),
    Image(InlineImage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub operation: Operation,
    pub model: String,
    pub parts: Vec<PromptPart>,
    pub response_format: ResponseFormat,
    pub max_output_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(operation: Operation, model: impl Into<String>) -> Self {
        Self {
            operation,
            model: model.into(),
            parts: Vec::new(),
            response_format: ResponseFormat::Text,
            max_output_tokens: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(PromptPart::Text(text.into()));
        self
    }

    pub fn image(mut self, image: InlineImage) -> Self {
        self.parts.push(PromptPart::Image(image));
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    /// All text parts joined, used by transports that key off the prompt.
    pub fn prompt_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::Image(_) => None,
            })
            .collect::<Vec<&str>>()
            .join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|part| matches!(part, PromptPart::Image(_)))
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelResponse {
    pub text: String,
    pub images: Vec<InlineImage>,
}

impl ModelResponse {
    pub fn first_image(self) -> Option<InlineImage> {
        self.images.into_iter().next()
    }
}

/// Transport to a generative model service.
pub trait ModelService: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, UpstreamError>;
}

/// Dispatches each request to the transport serving its model.
pub struct ServiceRouter {
    registry: ModelRegistry,
    services: BTreeMap<String, Box<dyn ModelService>>,
}

impl ServiceRouter {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            services: BTreeMap::new(),
        }
    }

    /// Router with the Gemini and dryrun transports registered.
    pub fn with_default_services(registry: ModelRegistry) -> Self {
        let mut router = Self::new(registry);
        router.register(crate::dryrun::DryrunService::new());
        router.register(crate::gemini::GeminiService::from_env());
        router
    }

    pub fn register<S: ModelService + 'static>(&mut self, service: S) {
        self.services
            .insert(service.name().to_string(), Box::new(service));
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }
}

impl ModelService for ServiceRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, UpstreamError> {
        let provider = self.registry.provider_for(&request.model);
        let Some(service) = self.services.get(&provider) else {
            return Err(UpstreamError::fatal(
                &request.model,
                format!("no transport registered for provider '{provider}'"),
            ));
        };
        tracing::debug!(
            operation = %request.operation,
            model = %request.model,
            provider = %provider,
            images = request.image_count(),
            "routing model request"
        );
        service.generate(request)
    }
}

#[cfg(test)]
mod tests {
    use storegen_contracts::models::ModelRegistry;

    use super::*;
    use crate::test_support::{Reply, ScriptedService};

    #[test]
    fn request_builder_collects_parts() {
        let request = ModelRequest::new(Operation::ProductDetails, "gemini-2.5-flash")
            .text("Describe this")
            .image(InlineImage {
                mime_type: "image/jpeg".to_string(),
                data: vec![1, 2, 3],
            })
            .text("Return JSON")
            .format(ResponseFormat::Json)
            .max_output_tokens(4000);
        assert_eq!(request.prompt_text(), "Describe this\nReturn JSON");
        assert_eq!(request.image_count(), 1);
        assert_eq!(request.max_output_tokens, Some(4000));
    }

    #[test]
    fn inline_image_becomes_data_url() {
        let image = InlineImage {
            mime_type: "image/png".to_string(),
            data: b"png".to_vec(),
        };
        assert_eq!(image.to_image_ref().as_str(), "data:image/png;base64,cG5n");
    }

    #[test]
    fn router_dispatches_by_provider() {
        let mut router = ServiceRouter::new(ModelRegistry::default());
        let scripted = ScriptedService::named("dryrun");
        scripted.always(Operation::Logo, Reply::text("{}"));
        let calls = scripted.calls_handle();
        router.register(scripted);

        let response = router
            .generate(&ModelRequest::new(Operation::Logo, "dryrun-image-1"))
            .unwrap();
        assert_eq!(response.text, "{}");
        assert_eq!(calls.lock().unwrap().len(), 1);

        let err = router
            .generate(&ModelRequest::new(Operation::Logo, "gemini-2.5-flash-image"))
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("gemini"));
    }
}
