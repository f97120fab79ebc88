//! Pure poll-state machine: the model, the event taxonomy and the transition
//! function. All I/O requested by a transition is described as an [`Effect`]
//! and resolved by the session loop in `lib.rs`; nothing in this module
//! suspends or touches the network.

use std::collections::HashMap;

use shared::domain::{Answer, Poll, Question, QuestionId};

/// How long a local vote is considered more relevant than the server value,
/// in milliseconds.
pub const GRACE_DELAY_MS: i64 = 7_500;

/// An [`Answer`] together with a freshness stamp marking when the value was
/// obtained, either from a server fetch or synthesized locally at vote time.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedAnswer {
    pub timestamp: i64,
    pub answer: Answer,
}

/// Marker for refused votes. The sequence number changes on every refusal so
/// that two consecutive refusals remain distinguishable to observers that
/// re-trigger a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rejection {
    pub rejected: bool,
    pub seq: u64,
}

/// A known question and the answers last fetched for it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionAnswers {
    pub question: Question,
    pub answers: Vec<FetchedAnswer>,
}

/// Single source of truth for the displayed poll. Every transition produces
/// a new value; the session publishes each one under a fresh revision so
/// observers never see a torn intermediate state.
#[derive(Debug, Clone, PartialEq)]
pub struct PollModel {
    pub poll: Poll,
    pub current: Question,
    pub token: String,
    pub answers: HashMap<QuestionId, QuestionAnswers>,
    pub rejected: Rejection,
    pub invalid_token: bool,
}

impl PollModel {
    pub fn new(poll: Poll, current: Question, token: impl Into<String>) -> Self {
        Self {
            poll,
            current,
            token: token.into(),
            answers: HashMap::new(),
            rejected: Rejection::default(),
            invalid_token: false,
        }
    }

    /// Answers currently known for the displayed question.
    pub fn current_answers(&self) -> &[FetchedAnswer] {
        self.answers
            .get(&self.current.id_question)
            .map(|entry| entry.answers.as_slice())
            .unwrap_or(&[])
    }

    /// `Some(answer_min)` while at least one answer is checked but fewer
    /// than the question's minimum.
    pub fn min_checked_answers_warning(&self) -> Option<u32> {
        let actual = self
            .current_answers()
            .iter()
            .filter(|fetched| fetched.answer.checked)
            .count() as u32;
        if actual == 0 || actual >= self.current.answer_min {
            None
        } else {
            Some(self.current.answer_min)
        }
    }

    /// Whether any known question precedes the current one.
    pub fn previous_button_visible(&self) -> bool {
        self.answers
            .values()
            .any(|entry| entry.question.index_in_poll < self.current.index_in_poll)
    }

    /// Whether any known question follows the current one.
    pub fn next_button_visible(&self) -> bool {
        self.answers
            .values()
            .any(|entry| entry.question.index_in_poll > self.current.index_in_poll)
    }
}

/// The closed set of events driving the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Explicit null event, used to complete effect chains without semantic
    /// impact.
    NoOp,

    // User events.
    MoveToNext,
    MoveToPrevious,
    SetVote(Answer),

    // Data events.
    GotInvalidToken,
    GotQuestions(Vec<Question>),
    GotAnswers(Question, Vec<FetchedAnswer>),

    // Refresh events.
    RefreshQuestions,
    RefreshCurrentAnswers,
    RejectVote,
}

/// Deferred action requested by [`transform`]. The session resolves each
/// effect asynchronously and feeds the resulting event back into the queue,
/// so effects never bypass the serialized reduction point.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Re-enqueue an event as-is.
    Emit(Event),
    /// Fetch the question list for the poll.
    FetchQuestions,
    /// Fetch the answers of the given question, stamping each result with
    /// the fetch time.
    FetchAnswers(Question),
    /// Submit the toggled answer. The outcome is always mapped to
    /// [`Event::NoOp`]; local state stays authoritative until a later fetch
    /// outside the grace window overrides it.
    SubmitVote(Answer),
}

/// Whether toggling an answer is admissible: the maximum is unset, the vote
/// is a toggle-off, or there is margin for one more positive vote.
pub fn vote_allowed(question: &Question, currently_checked: bool, positive: u32) -> bool {
    question.answer_max == 0 || currently_checked || positive + 1 <= question.answer_max
}

/// Merges a locally-held answer list with a freshly fetched one. A local
/// record survives as long as its grace window has not elapsed relative to
/// the fetch stamp; remote records win afterwards. Local-derived entries
/// keep their order, newly appeared remote entries are appended, and local
/// records absent from the fetch are dropped.
pub fn merge_answers(local: &[FetchedAnswer], remote: &[FetchedAnswer]) -> Vec<FetchedAnswer> {
    let mut merged = Vec::with_capacity(remote.len());
    for local_entry in local {
        let Some(remote_entry) = remote
            .iter()
            .find(|entry| entry.answer.id_answer == local_entry.answer.id_answer)
        else {
            continue;
        };
        if remote_entry.timestamp - GRACE_DELAY_MS >= local_entry.timestamp {
            merged.push(remote_entry.clone());
        } else {
            merged.push(local_entry.clone());
        }
    }
    for remote_entry in remote {
        if !merged
            .iter()
            .any(|entry| entry.answer.id_answer == remote_entry.answer.id_answer)
        {
            merged.push(remote_entry.clone());
        }
    }
    merged
}

/// Applies one event to the model and returns the next model plus the
/// effects to resolve. Pure and synchronous; `now_ms` is the only ambient
/// input and is supplied by the caller.
pub fn transform(mut data: PollModel, event: Event, now_ms: i64) -> (PollModel, Vec<Effect>) {
    match event {
        Event::NoOp => (data, Vec::new()),

        // The token was rejected: we have been disconnected from the poll.
        // The flag is never cleared again.
        Event::GotInvalidToken => {
            data.invalid_token = true;
            (data, Vec::new())
        }

        Event::RejectVote => {
            data.rejected = Rejection {
                rejected: true,
                seq: data.rejected.seq + 1,
            };
            (data, Vec::new())
        }

        // Move to the neighbor with the closest strictly greater index, or
        // stay put. Either way the answers of the (possibly new) current
        // question are refreshed immediately.
        Event::MoveToNext => {
            let next = data
                .answers
                .values()
                .map(|entry| &entry.question)
                .filter(|question| question.index_in_poll > data.current.index_in_poll)
                .min_by(|a, b| a.index_in_poll.total_cmp(&b.index_in_poll))
                .cloned();
            if let Some(next) = next {
                data.current = next;
            }
            data.rejected = Rejection::default();
            (data, vec![Effect::Emit(Event::RefreshCurrentAnswers)])
        }

        Event::MoveToPrevious => {
            let previous = data
                .answers
                .values()
                .map(|entry| &entry.question)
                .filter(|question| question.index_in_poll < data.current.index_in_poll)
                .max_by(|a, b| a.index_in_poll.total_cmp(&b.index_in_poll))
                .cloned();
            if let Some(previous) = previous {
                data.current = previous;
            }
            data.rejected = Rejection::default();
            (data, vec![Effect::Emit(Event::RefreshCurrentAnswers)])
        }

        // Toggle an answer locally, restart its grace window and submit the
        // vote, or refuse when the maximum would be exceeded.
        Event::SetVote(answer) => {
            let positive = data
                .current_answers()
                .iter()
                .filter(|fetched| fetched.answer.checked)
                .count() as u32;
            let fetched = data
                .answers
                .get_mut(&data.current.id_question)
                .and_then(|entry| {
                    entry
                        .answers
                        .iter_mut()
                        .find(|fetched| fetched.answer.id_answer == answer.id_answer)
                });
            let currently_checked = fetched
                .as_ref()
                .map(|fetched| fetched.answer.checked)
                .unwrap_or(false);
            if vote_allowed(&data.current, currently_checked, positive) {
                // An unknown answer id still takes the approved path, there
                // is just nothing to toggle or submit.
                let effects = match fetched {
                    Some(fetched) => {
                        fetched.answer.toggle();
                        fetched.timestamp = now_ms;
                        vec![Effect::SubmitVote(fetched.answer.clone())]
                    }
                    None => Vec::new(),
                };
                (data, effects)
            } else {
                (data, vec![Effect::Emit(Event::RejectVote)])
            }
        }

        // Re-key the known answers onto the refreshed question objects,
        // dropping questions that no longer exist and starting empty lists
        // for new ones.
        Event::GotQuestions(questions) => {
            let mut updated = HashMap::with_capacity(questions.len());
            for entry in std::mem::take(&mut data.answers).into_values() {
                if let Some(replacement) = questions
                    .iter()
                    .find(|question| question.id_question == entry.question.id_question)
                {
                    updated.insert(
                        replacement.id_question,
                        QuestionAnswers {
                            question: replacement.clone(),
                            answers: entry.answers,
                        },
                    );
                }
            }
            for question in &questions {
                updated
                    .entry(question.id_question)
                    .or_insert_with(|| QuestionAnswers {
                        question: question.clone(),
                        answers: Vec::new(),
                    });
            }
            data.answers = updated;
            // Re-point the current question at its replacement, if any. A
            // vanished current question is kept, stale.
            if let Some(replacement) = questions
                .iter()
                .find(|question| question.id_question == data.current.id_question)
            {
                data.current = replacement.clone();
            }
            (data, Vec::new())
        }

        // Merge the fetched answers into the question's list. An unknown
        // question is ignored rather than inserted.
        Event::GotAnswers(question, answers) => {
            if let Some(entry) = data.answers.get_mut(&question.id_question) {
                entry.answers = merge_answers(&entry.answers, &answers);
            }
            (data, Vec::new())
        }

        Event::RefreshQuestions => (data, vec![Effect::FetchQuestions]),

        Event::RefreshCurrentAnswers => {
            let current = data.current.clone();
            (data, vec![Effect::FetchAnswers(current)])
        }
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
