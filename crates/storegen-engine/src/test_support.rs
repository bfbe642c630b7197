use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use storegen_contracts::errors::UpstreamError;

use crate::service::{InlineImage, ModelRequest, ModelResponse, ModelService, Operation};

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    Image,
    NoImage,
    Overloaded,
    Fatal(String),
}

impl Reply {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub operation: Operation,
    pub model: String,
    pub prompt: String,
    pub images: usize,
}

/// In-memory transport that answers from a per-operation script and
/// records every call.
pub(crate) struct ScriptedService {
    name: String,
    queued: Mutex<HashMap<Operation, VecDeque<Reply>>>,
    standing: Mutex<HashMap<Operation, Reply>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedService {
    pub(crate) fn new() -> Self {
        Self::named("scripted")
    }

    pub(crate) fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queued: Mutex::new(HashMap::new()),
            standing: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers the next call for `operation` with `reply`.
    pub(crate) fn push(&self, operation: Operation, reply: Reply) {
        self.queued
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(reply);
    }

    /// Answers every call for `operation` once its queue is drained.
    pub(crate) fn always(&self, operation: Operation, reply: Reply) {
        self.standing.lock().unwrap().insert(operation, reply);
    }

    pub(crate) fn calls_handle(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn calls_for(&self, operation: Operation) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    fn next_reply(&self, operation: Operation) -> Option<Reply> {
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        queued.or_else(|| self.standing.lock().unwrap().get(&operation).cloned())
    }
}

impl ModelService for ScriptedService {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, request: &ModelRequest) -> Result<ModelResponse, UpstreamError> {
        self.calls.lock().unwrap().push(RecordedCall {
            operation: request.operation,
            model: request.model.clone(),
            prompt: request.prompt_text(),
            images: request.image_count(),
        });
        match self.next_reply(request.operation) {
            Some(Reply::Text(text)) => Ok(ModelResponse {
                text,
                images: Vec::new(),
            }),
            Some(Reply::Image) => Ok(ModelResponse {
                text: String::new(),
                images: vec![InlineImage {
                    mime_type: "image/png".to_string(),
                    data: request.operation.as_str().as_bytes().to_vec(),
                }],
            }),
            Some(Reply::NoImage) => Ok(ModelResponse::default()),
            Some(Reply::Overloaded) => Err(UpstreamError::classified(
                &request.model,
                Some(429),
                "RESOURCE_EXHAUSTED: quota exceeded",
            )),
            Some(Reply::Fatal(message)) => Err(UpstreamError::classified(
                &request.model,
                Some(400),
                message,
            )),
            None => Err(UpstreamError::fatal(
                &request.model,
                format!("no scripted reply for {}", request.operation),
            )),
        }
    }
}

/// Strategy payload for "Volt" with one suggested product.
pub(crate) fn volt_strategy_json() -> String {
    serde_json::json!({
        "storeName": "Volt",
        "productName": "Volt Runner",
        "price": 120,
        "slogan": "Charge every stride.",
        "aboutUs": "Minimalist sneakers.",
        "themeColor": "#ffcc00",
        "logoPrompt": "lightning bolt mark",
        "bannerPrompt": "electric yellow gradient",
        "productDescription": "A featherweight runner.",
        "productFeatures": ["Knit upper", "Foam sole"],
        "suggestedProducts": [
            {"name": "Volt Cap", "description": "Running cap.", "price": 35, "features": ["Light"]}
        ]
    })
    .to_string()
}
