use thiserror::Error;

/// Failures raised while a session is decoding.
///
/// These never escape the producer thread as panics: the engine converts them
/// into a single terminal `Error` sentinel on the event stream.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The scorer failed during a decode step.
    #[error("scorer failed during decode step: {0}")]
    ScoringFailure(anyhow::Error),
}

impl From<anyhow::Error> for GenerationError {
    fn from(error: anyhow::Error) -> Self {
        Self::ScoringFailure(error)
    }
}
