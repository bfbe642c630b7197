use std::sync::Arc;

use storegen_contracts::assistant::ActionEnvelope;
use storegen_contracts::catalog::Catalog;
use storegen_contracts::decode::decode;
use storegen_contracts::errors::SynthesisError;

use crate::invoke::FallbackPolicy;
use crate::prompts;
use crate::service::{InlineImage, ModelRequest, ModelService, Operation, ResponseFormat};

/// Turns a dashboard instruction into an [`ActionEnvelope`]. Applying the
/// envelope is left to the caller
/// ([`storegen_contracts::assistant::apply_action`]).
pub struct AssistantInterpreter {
    service: Arc<dyn ModelService>,
    policy: FallbackPolicy,
}

impl AssistantInterpreter {
    pub fn new(service: Arc<dyn ModelService>, policy: FallbackPolicy) -> Self {
        Self { service, policy }
    }

    pub fn interpret(
        &self,
        instruction: &str,
        catalog: &Catalog,
        image: Option<&InlineImage>,
    ) -> Result<ActionEnvelope, SynthesisError> {
        let prompt = prompts::assistant(instruction, catalog, image.is_some());
        self.policy.invoke(|model| {
            let mut request = ModelRequest::new(Operation::AssistantAction, model)
                .text(prompt.as_str())
                .format(ResponseFormat::Json);
            if let Some(image) = image {
                request = request.image(image.clone());
            }
            let response = self.service.generate(&request)?;
            Ok(ActionEnvelope::from_fields(decode(&response.text)?)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use storegen_contracts::assistant::AssistantAction;
    use storegen_contracts::session::demo_catalog;

    use super::*;
    use crate::test_support::{Reply, ScriptedService};

    fn interpreter(service: &Arc<ScriptedService>) -> AssistantInterpreter {
        let shared: Arc<dyn ModelService> = service.clone();
        AssistantInterpreter::new(
            shared,
            FallbackPolicy::new(
                "gemini-2.5-flash",
                Some("gemini-flash-lite-latest".to_string()),
                Duration::ZERO,
            ),
        )
    }

    #[test]
    fn fenced_reply_decodes_into_envelope_without_touching_catalog() -> anyhow::Result<()> {
        let service = Arc::new(ScriptedService::new());
        service.push(
            Operation::AssistantAction,
            Reply::text(format!(
                "Sure!\n```json\n{}\n```",
                json!({"action": "update_theme", "reply": "Going red.", "data": {"color": "#ff0000"}})
            )),
        );
        let catalog = demo_catalog();
        let before = catalog.clone();

        let envelope = interpreter(&service).interpret("make it red", &catalog, None)?;
        assert_eq!(envelope.action, AssistantAction::UpdateTheme);
        assert_eq!(envelope.reply, "Going red.");
        assert_eq!(envelope.data["color"], json!("#ff0000"));
        assert_eq!(catalog, before);

        let calls = service.calls_for(Operation::AssistantAction);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].prompt.contains("Melaniverse Concept Store"));
        assert_eq!(calls[0].images, 0);
        Ok(())
    }

    #[test]
    fn image_is_attached_and_noted() -> anyhow::Result<()> {
        let service = Arc::new(ScriptedService::new());
        service.push(
            Operation::AssistantAction,
            Reply::text(r#"{"action":"add_product","reply":"Added.","data":{"name":"Scarf"}}"#),
        );
        let image = InlineImage {
            mime_type: "image/jpeg".to_string(),
            data: vec![0xff, 0xd8],
        };

        let envelope = interpreter(&service).interpret("add this", &demo_catalog(), Some(&image))?;
        assert_eq!(envelope.action, AssistantAction::AddProduct);
        let calls = service.calls_for(Operation::AssistantAction);
        assert_eq!(calls[0].images, 1);
        assert!(calls[0].prompt.contains("uploaded an image"));
        Ok(())
    }

    #[test]
    fn overload_falls_back_and_unknown_actions_are_rejected() {
        let service = Arc::new(ScriptedService::new());
        service.push(Operation::AssistantAction, Reply::Overloaded);
        service.push(
            Operation::AssistantAction,
            Reply::text(r#"{"action":"delete_everything","reply":"ok"}"#),
        );

        let err = interpreter(&service)
            .interpret("wipe it", &demo_catalog(), None)
            .unwrap_err();
        assert!(matches!(err, SynthesisError::Schema(_)));
        let models: Vec<String> = service
            .calls_for(Operation::AssistantAction)
            .into_iter()
            .map(|call| call.model)
            .collect();
        assert_eq!(models, vec!["gemini-2.5-flash", "gemini-flash-lite-latest"]);
    }
}
