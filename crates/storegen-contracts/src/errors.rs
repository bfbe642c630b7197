use thiserror::Error;

/// Failure to locate a JSON object inside a model response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("no JSON found in response")]
    NotFound,
    #[error("JSON parsing failed after all attempts: {reason}")]
    Malformed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rate limiting, quota exhaustion or service overload.
    Transient,
    Fatal,
}

/// Failure reported by the model service for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("model {model} overloaded ({}): {message}", status_label(.status))]
    Transient {
        model: String,
        status: Option<u16>,
        message: String,
    },
    #[error("model {model} failed ({}): {message}", status_label(.status))]
    Fatal {
        model: String,
        status: Option<u16>,
        message: String,
    },
}

impl UpstreamError {
    /// Builds an error whose variant follows [`classify_failure`].
    pub fn classified(
        model: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let message = message.into();
        match classify_failure(status, &message) {
            FailureKind::Transient => Self::Transient {
                model,
                status,
                message,
            },
            FailureKind::Fatal => Self::Fatal {
                model,
                status,
                message,
            },
        }
    }

    pub fn fatal(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fatal {
            model: model.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transient { .. } => FailureKind::Transient,
            Self::Fatal { .. } => FailureKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Transient { model, .. } | Self::Fatal { model, .. } => model,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Fatal { status, .. } => *status,
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|code| code.to_string())
        .unwrap_or_else(|| "no status".to_string())
}

const TRANSIENT_STATUS_CODES: [u16; 2] = [429, 503];

const TRANSIENT_MARKERS: [&str; 6] = [
    "429",
    "503",
    "quota",
    "resource exhausted",
    "resource_exhausted",
    "unavailable",
];

/// Classifies an upstream failure from its status code and message text.
pub fn classify_failure(status: Option<u16>, message: &str) -> FailureKind {
    if status
        .map(|code| TRANSIENT_STATUS_CODES.contains(&code))
        .unwrap_or(false)
    {
        return FailureKind::Transient;
    }
    let lowered = message.to_ascii_lowercase();
    if TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
    {
        return FailureKind::Transient;
    }
    FailureKind::Fatal
}

/// A decoded object that does not satisfy the schema of its call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context} response rejected: {message}")]
pub struct SchemaError {
    pub context: &'static str,
    pub message: String,
}

impl SchemaError {
    pub fn new(context: &'static str, message: impl Into<String>) -> Self {
        Self {
            context,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("run cancelled")]
    Cancelled,
    #[error("illegal phase transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl SynthesisError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream(err) if err.is_transient())
    }

    /// Message shown to the user when a run stops in the error phase.
    pub fn user_message(&self) -> String {
        match self {
            Self::Cancelled => "Generation cancelled.".to_string(),
            err if err.is_transient() => {
                "Free quota reached (rate limit). Please wait about 60 seconds before retrying."
                    .to_string()
            }
            _ => "Generation failed. Check your connection and try again.".to_string(),
        }
    }
}
