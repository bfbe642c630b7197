use std::thread;
use std::time::Duration;

use storegen_contracts::errors::SynthesisError;

/// Which model to call for one operation and where to go when it is
/// overloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPolicy {
    pub primary: String,
    pub fallback: Option<String>,
    pub backoff: Duration,
}

impl FallbackPolicy {
    pub fn new(primary: impl Into<String>, fallback: Option<String>, backoff: Duration) -> Self {
        Self {
            primary: primary.into(),
            fallback,
            backoff,
        }
    }

    /// Single attempt, no fallback.
    pub fn single(model: impl Into<String>) -> Self {
        Self::new(model, None, Duration::ZERO)
    }

    /// Runs `attempt` against the primary model. A transient failure waits
    /// out the backoff and re-runs it once against the fallback; anything
    /// else is returned as is. When both attempts fail the fallback's error
    /// is the one reported.
    pub fn invoke<T, F>(&self, mut attempt: F) -> Result<T, SynthesisError>
    where
        F: FnMut(&str) -> Result<T, SynthesisError>,
    {
        let err = match attempt(&self.primary) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(fallback) = self.fallback.as_deref() else {
            return Err(err);
        };
        if !err.is_transient() {
            return Err(err);
        }
        tracing::warn!(
            primary = %self.primary,
            fallback,
            backoff_ms = self.backoff.as_millis() as u64,
            "primary model overloaded; switching to fallback: {err}"
        );
        if !self.backoff.is_zero() {
            thread::sleep(self.backoff);
        }
        attempt(fallback)
    }
}
