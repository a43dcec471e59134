use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::GenerationConfig;
use crate::error::GenerationError;
use crate::sampler::Sampler;
use crate::scorer::ModelScorer;
use crate::stream::{self, CancelHandle, FinishReason, StreamSender, TokenEvent, TokenStream};

/// Lifecycle of one generation session. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Mutable state scoped to a single user turn: the token sequence, the
/// decode position and the cancellation flag. Created per turn and discarded
/// once its terminal sentinel has been observed.
#[derive(Debug)]
pub struct GenerationSession {
    tokens: Vec<usize>,
    prompt_len: usize,
    position: usize,
    state: SessionState,
    cancel: Arc<AtomicBool>,
}

impl GenerationSession {
    pub fn new(prompt_tokens: Vec<usize>) -> Self {
        let prompt_len = prompt_tokens.len();
        Self {
            tokens: prompt_tokens,
            prompt_len,
            position: 0,
            state: SessionState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Prompt plus everything generated so far, in order.
    pub fn tokens(&self) -> &[usize] {
        &self.tokens
    }

    /// Token ids generated this turn.
    pub fn generated(&self) -> &[usize] {
        &self.tokens[self.prompt_len..]
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.cancel))
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn advance(&mut self, token: usize) {
        self.tokens.push(token);
        self.position += 1;
    }

    fn finish(&mut self, state: SessionState) {
        debug_assert!(state.is_terminal(), "finish requires a terminal state");
        self.state = state;
    }
}

/// Drives the autoregressive decode loop and publishes its token events.
///
/// The scorer is read-only, so one engine can run sessions for independent
/// conversations concurrently; the surrounding application keeps at most one
/// active session per conversation.
pub struct SamplingEngine {
    scorer: Arc<dyn ModelScorer>,
    config: GenerationConfig,
}

impl SamplingEngine {
    pub fn new(scorer: Arc<dyn ModelScorer>, config: GenerationConfig) -> Self {
        Self { scorer, config }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Starts one generation turn on a dedicated decode thread.
    ///
    /// Returns the consumer half of the event stream and a handle for
    /// cooperative cancellation. The consumer must drain the stream to its
    /// terminal sentinel.
    pub fn start(&self, prompt_tokens: Vec<usize>) -> (TokenStream, CancelHandle) {
        let session = GenerationSession::new(prompt_tokens);
        let cancel = session.cancel_handle();

        let (sender, receiver) = stream::channel();
        let scorer = Arc::clone(&self.scorer);
        let config = self.config.clone();
        let sampler = Sampler::new(
            scorer.vocab_size(),
            config.temperature,
            config.top_p,
            config.top_k,
            config.seed,
        );

        let producer = thread::spawn(move || {
            run_session(scorer.as_ref(), &config, sampler, session, &sender);
        });

        (TokenStream::new(receiver, producer), cancel)
    }
}

/// The blocking decode loop for one session.
///
/// Cancellation is observed only between steps; an in-flight scoring call
/// always finishes first. Scorer failures are captured into the `Failed`
/// state and surface as exactly one `Error` sentinel, never as a panic on a
/// thread no consumer is watching.
fn run_session(
    scorer: &dyn ModelScorer,
    config: &GenerationConfig,
    mut sampler: Sampler,
    mut session: GenerationSession,
    events: &StreamSender,
) {
    session.state = SessionState::Running;

    while session.position() < config.max_new_tokens {
        if session.cancel_requested() {
            session.finish(SessionState::Cancelled);
            events.send(TokenEvent::Done(FinishReason::Cancelled));
            return;
        }

        let token = match decode_step(scorer, &mut sampler, &session) {
            Ok(token) => token,
            Err(error) => {
                debug!("session failed at position {}: {error}", session.position());
                session.finish(SessionState::Failed);
                events.send(TokenEvent::Done(FinishReason::Error(error.to_string())));
                return;
            }
        };

        let text = scorer.decode(token);
        let delivered = events.send(TokenEvent::Fragment {
            position: session.position(),
            text,
        });
        session.advance(token);

        if !delivered {
            // Consumer is gone; end the session without a sentinel.
            session.finish(SessionState::Cancelled);
            return;
        }

        if token == config.eos_token_id {
            break;
        }
    }

    session.finish(SessionState::Completed);
    events.send(TokenEvent::Done(FinishReason::Success));
}

/// One decode step: score the sequence, then sample from the filtered
/// distribution.
fn decode_step(
    scorer: &dyn ModelScorer,
    sampler: &mut Sampler,
    session: &GenerationSession,
) -> Result<usize, GenerationError> {
    let mut logits = scorer.score(session.tokens())?;
    Ok(sampler.sample(&mut logits))
}
