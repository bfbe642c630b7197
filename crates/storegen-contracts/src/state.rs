use serde::{Deserialize, Serialize};

use crate::errors::SynthesisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Idle,
    Analyzing,
    TextGen,
    AssetsGen,
    ImageVariation,
    Completed,
    Error,
}

impl GenerationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::TextGen => "text_gen",
            Self::AssetsGen => "assets_gen",
            Self::ImageVariation => "image_variation",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Phases reachable from `self`. Staying in a phase is always allowed
    /// so progress can advance within it.
    pub fn allowed_transitions(self) -> &'static [GenerationPhase] {
        use GenerationPhase::*;
        match self {
            Idle => &[Analyzing, Error],
            Analyzing => &[TextGen, Error],
            TextGen => &[AssetsGen, Error],
            AssetsGen => &[ImageVariation, Error],
            ImageVariation => &[Completed, Error],
            Completed => &[],
            Error => &[Idle],
        }
    }

    pub fn can_transition_to(self, next: GenerationPhase) -> bool {
        self == next || self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for GenerationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live view of one synthesis run, read by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationState {
    phase: GenerationPhase,
    progress_percent: u8,
    current_action_label: String,
    retry_count: u32,
}

impl Default for GenerationState {
    fn default() -> Self {
        Self {
            phase: GenerationPhase::Idle,
            progress_percent: 0,
            current_action_label: String::new(),
            retry_count: 0,
        }
    }
}

impl GenerationState {
    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn current_action_label(&self) -> &str {
        &self.current_action_label
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Moves to `phase` with a new label. Progress never goes backwards
    /// and is capped at 100.
    pub fn advance(
        &mut self,
        phase: GenerationPhase,
        label: impl Into<String>,
        progress: u8,
    ) -> Result<(), SynthesisError> {
        self.transition(phase)?;
        self.current_action_label = label.into();
        self.progress_percent = self.progress_percent.max(progress.min(100));
        Ok(())
    }

    /// Enters the error phase; progress stays where the run stopped.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.phase = GenerationPhase::Error;
        self.current_action_label = message.into();
    }

    /// `Error -> Idle` for a user-triggered retry.
    pub fn restart(&mut self) -> Result<(), SynthesisError> {
        if self.phase != GenerationPhase::Error {
            return Err(SynthesisError::InvalidTransition {
                from: self.phase.to_string(),
                to: GenerationPhase::Idle.to_string(),
            });
        }
        self.phase = GenerationPhase::Idle;
        self.progress_percent = 0;
        self.current_action_label = "Retrying...".to_string();
        self.retry_count += 1;
        Ok(())
    }

    fn transition(&mut self, next: GenerationPhase) -> Result<(), SynthesisError> {
        if !self.phase.can_transition_to(next) {
            return Err(SynthesisError::InvalidTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        Ok(())
    }
}
