//! Bridges a blocking decode thread to an asynchronous consumer.
//!
//! The producer runs scoring calls that are unsuitable for a cooperative
//! scheduler, so it lives on its own thread and pushes [`TokenEvent`]s into a
//! bounded channel: content fragments in strict position order, then exactly
//! one terminal sentinel. The consumer polls with a short timeout and yields
//! between empty polls so the surrounding interactive loop stays responsive.

use log::warn;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// How long one consumer poll waits before yielding control.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Number of buffered events before the producer blocks.
pub(crate) const EVENT_BUFFER: usize = 128;

/// Event emitted during streaming generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    /// One decoded text fragment and its position in the generated sequence.
    Fragment { position: usize, text: String },
    /// Terminal sentinel; nothing follows it.
    Done(FinishReason),
}

/// Why a generation session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// End-of-sequence was sampled or `max_new_tokens` was reached.
    Success,
    /// Cancellation was requested and honored between steps.
    Cancelled,
    /// The scorer failed; the message describes the step failure.
    Error(String),
}

/// Producer half: used from the blocking decode thread.
#[derive(Debug, Clone)]
pub(crate) struct StreamSender {
    tx: mpsc::Sender<TokenEvent>,
}

impl StreamSender {
    /// Pushes one event, blocking if the buffer is full. Returns false when
    /// the consumer has gone away, which tells the producer to stop.
    pub fn send(&self, event: TokenEvent) -> bool {
        if self.tx.blocking_send(event).is_err() {
            warn!("token stream consumer dropped before the sentinel was delivered");
            return false;
        }
        true
    }
}

/// Requests cooperative cancellation of one session.
///
/// The decode loop observes the flag between steps, so cancellation latency
/// is bounded by a single scoring step.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Consumer half: an ordered stream of [`TokenEvent`]s for one session.
#[derive(Debug)]
pub struct TokenStream {
    rx: mpsc::Receiver<TokenEvent>,
    producer: Option<JoinHandle<()>>,
    finished: bool,
}

/// Creates the bounded event channel for one session.
pub(crate) fn channel() -> (StreamSender, mpsc::Receiver<TokenEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    (StreamSender { tx }, rx)
}

impl TokenStream {
    pub(crate) fn new(rx: mpsc::Receiver<TokenEvent>, producer: JoinHandle<()>) -> Self {
        Self {
            rx,
            producer: Some(producer),
            finished: false,
        }
    }

    /// Receives the next event, or `None` once the stream is exhausted.
    ///
    /// Waits at most [`POLL_TIMEOUT`] per poll and yields to the scheduler
    /// between empty polls. After the terminal sentinel is observed the
    /// producer thread is joined, so when this returns the sentinel the
    /// session has fully released its resources.
    pub async fn next_event(&mut self) -> Option<TokenEvent> {
        if self.finished {
            return None;
        }

        loop {
            match timeout(POLL_TIMEOUT, self.rx.recv()).await {
                Ok(Some(event)) => {
                    if matches!(event, TokenEvent::Done(_)) {
                        self.finished = true;
                        self.join_producer().await;
                    }
                    return Some(event);
                }
                Ok(None) => {
                    // Producer dropped without a sentinel; treat as exhausted.
                    self.finished = true;
                    self.join_producer().await;
                    return None;
                }
                Err(_elapsed) => {
                    tokio::task::yield_now().await;
                }
            }
        }
    }

    async fn join_producer(&mut self) {
        if let Some(handle) = self.producer.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                warn!("decode thread did not shut down cleanly");
            }
        }
    }
}
