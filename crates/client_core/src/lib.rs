//! Client-side poll-state engine.
//!
//! Keeps a local, optimistic view of the active question and the checked
//! answers in sync with a server that can only be polled. User intents, two
//! periodic refresh pollers and effect completions all feed one serialized
//! event queue; a pure transition function ([`state::transform`]) maps each
//! event to the next model and the effects to resolve, and every resulting
//! model is published under a monotonically increasing revision.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use futures::{future, Stream, StreamExt};
use shared::domain::{Answer, Poll, Question};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time,
};
use tokio_stream::wrappers::WatchStream;
use tracing::{info, warn};

pub mod http_api;
pub mod state;

pub use http_api::HttpPollApi;
pub use state::{
    merge_answers, transform, vote_allowed, Effect, Event, FetchedAnswer, PollModel,
    QuestionAnswers, Rejection, GRACE_DELAY_MS,
};

/// Cadence of the two periodic refresh pollers. The smaller the delay, the
/// more real-time-ish the app.
pub const FRESH_DELAY: Duration = Duration::from_millis(1_000);

/// Outcome of a remote operation, as far as the core cares: the token was
/// rejected, the server answered with some other non-success status, or no
/// response was obtained at all.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server rejected the session token (HTTP 403).
    #[error("session token rejected by the server")]
    Unauthorized,
    /// Any other non-success response.
    #[error("server answered with status {0}")]
    Status(u16),
    /// The request never produced a server response.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// The remote operations the engine depends on. Implemented over HTTP by
/// [`HttpPollApi`]; tests substitute in-memory fakes.
#[async_trait]
pub trait PollApi: Send + Sync {
    async fn fetch_questions(&self, poll: &Poll, token: &str)
        -> Result<Vec<Question>, FetchError>;
    async fn fetch_answers(
        &self,
        question: &Question,
        token: &str,
    ) -> Result<Vec<Answer>, FetchError>;
    async fn submit_vote(&self, answer: &Answer, token: &str) -> Result<(), FetchError>;
}

/// A published state tagged with a monotonically increasing revision, so
/// otherwise-equal states remain distinguishable and missed updates are
/// detectable.
#[derive(Debug, Clone, PartialEq)]
pub struct Revisioned<T> {
    pub revision: u64,
    pub value: T,
}

/// The running event loop around [`state::transform`].
///
/// All producers (the two pollers, user intents, effect completions) push
/// onto one queue; a single consumer task reduces events strictly one at a
/// time, publishes the new model and schedules the returned effects for
/// asynchronous resolution. Dropping the session cancels the loop and the
/// pollers; results of still-in-flight fetches then land on a closed queue
/// and are discarded.
pub struct PollSession {
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<Revisioned<PollModel>>,
    loop_task: JoinHandle<()>,
    pollers: Vec<JoinHandle<()>>,
}

impl PollSession {
    /// Starts the session for `poll`, displaying `question` first. Must be
    /// called from within a tokio runtime.
    pub fn spawn(
        api: Arc<dyn PollApi>,
        poll: Poll,
        question: Question,
        token: impl Into<String>,
    ) -> Self {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();
        info!(
            id_moderator = poll.id_moderator.0,
            id_poll = poll.id_poll.0,
            "poll session started"
        );

        let model = PollModel::new(poll, question, token);
        let (state_tx, state_rx) = watch::channel(Revisioned {
            revision: 0,
            value: model.clone(),
        });

        let effect_events = events_tx.clone();
        let loop_task = tokio::spawn(async move {
            let mut revision = 0u64;
            let mut model = model;
            while let Some(event) = events_rx.recv().await {
                let (next, effects) = transform(model, event, Utc::now().timestamp_millis());
                model = next;
                revision += 1;
                state_tx.send_replace(Revisioned {
                    revision,
                    value: model.clone(),
                });
                for effect in effects {
                    tokio::spawn(resolve_effect(
                        Arc::clone(&api),
                        model.poll.clone(),
                        model.token.clone(),
                        effect,
                        effect_events.clone(),
                    ));
                }
            }
        });

        let pollers = vec![
            tokio::spawn(refresh_periodically(
                events_tx.clone(),
                Event::RefreshQuestions,
            )),
            tokio::spawn(refresh_periodically(
                events_tx.clone(),
                Event::RefreshCurrentAnswers,
            )),
        ];

        Self {
            events: events_tx,
            state: state_rx,
            loop_task,
            pollers,
        }
    }

    pub fn move_next(&self) {
        let _ = self.events.send(Event::MoveToNext);
    }

    pub fn move_previous(&self) {
        let _ = self.events.send(Event::MoveToPrevious);
    }

    pub fn vote(&self, answer: Answer) {
        let _ = self.events.send(Event::SetVote(answer));
    }

    /// Watch handle on the revisioned model.
    pub fn subscribe(&self) -> watch::Receiver<Revisioned<PollModel>> {
        self.state.clone()
    }

    /// The revisioned model as a stream, starting from the latest value.
    pub fn states(&self) -> WatchStream<Revisioned<PollModel>> {
        WatchStream::new(self.state.clone())
    }

    /// `Some(answer_min)` while the current question has some, but too few,
    /// checked answers.
    pub fn min_checked_answers(&self) -> impl Stream<Item = Option<u32>> {
        self.states()
            .map(|revisioned| revisioned.value.min_checked_answers_warning())
    }

    /// Emits the current question's `answer_max` each time a vote is
    /// refused, including consecutive refusals.
    pub fn too_many_answers(&self) -> impl Stream<Item = u32> {
        self.states()
            .scan(0u64, |last_seq, revisioned| {
                let model = revisioned.value;
                let fresh = model.rejected.rejected && model.rejected.seq != *last_seq;
                if fresh {
                    *last_seq = model.rejected.seq;
                }
                future::ready(Some(fresh.then_some(model.current.answer_max)))
            })
            .filter_map(future::ready)
    }

    pub fn previous_button_visible(&self) -> impl Stream<Item = bool> {
        self.states()
            .map(|revisioned| revisioned.value.previous_button_visible())
    }

    pub fn next_button_visible(&self) -> impl Stream<Item = bool> {
        self.states()
            .map(|revisioned| revisioned.value.next_button_visible())
    }

    /// Tears the session down. Equivalent to dropping it.
    pub fn shutdown(self) {}
}

impl Drop for PollSession {
    fn drop(&mut self) {
        self.loop_task.abort();
        for poller in &self.pollers {
            poller.abort();
        }
    }
}

async fn refresh_periodically(events: mpsc::UnboundedSender<Event>, event: Event) {
    let mut ticker = time::interval(FRESH_DELAY);
    loop {
        ticker.tick().await;
        if events.send(event.clone()).is_err() {
            break;
        }
    }
}

/// Resolves one effect to at most one follow-up event and pushes it back
/// onto the queue. Authorization denials become [`Event::GotInvalidToken`],
/// other non-success outcomes reset the question list, and transport
/// failures are swallowed; the next poller tick retries.
async fn resolve_effect(
    api: Arc<dyn PollApi>,
    poll: Poll,
    token: String,
    effect: Effect,
    events: mpsc::UnboundedSender<Event>,
) {
    let event = match effect {
        Effect::Emit(event) => Some(event),
        Effect::FetchQuestions => match api.fetch_questions(&poll, &token).await {
            Ok(questions) => Some(Event::GotQuestions(questions)),
            Err(FetchError::Unauthorized) => Some(Event::GotInvalidToken),
            Err(FetchError::Status(status)) => {
                warn!(status, "question refresh answered with a non-success status");
                Some(Event::GotQuestions(Vec::new()))
            }
            Err(FetchError::Transport(err)) => {
                warn!("question refresh failed: {err}");
                None
            }
        },
        Effect::FetchAnswers(question) => {
            let fetched_at = Utc::now().timestamp_millis();
            match api.fetch_answers(&question, &token).await {
                Ok(answers) => Some(Event::GotAnswers(
                    question,
                    answers
                        .into_iter()
                        .map(|answer| FetchedAnswer {
                            timestamp: fetched_at,
                            answer,
                        })
                        .collect(),
                )),
                Err(FetchError::Unauthorized) => Some(Event::GotInvalidToken),
                Err(FetchError::Status(status)) => {
                    warn!(status, "answer refresh answered with a non-success status");
                    Some(Event::GotQuestions(Vec::new()))
                }
                Err(FetchError::Transport(err)) => {
                    warn!("answer refresh failed: {err}");
                    None
                }
            }
        }
        Effect::SubmitVote(answer) => {
            // Fire and forget: the local toggle already happened, and a
            // later fetch outside the grace window corrects any divergence.
            if let Err(err) = api.submit_vote(&answer, &token).await {
                warn!("vote submission failed: {err}");
            }
            Some(Event::NoOp)
        }
    };

    if let Some(event) = event {
        let _ = events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
