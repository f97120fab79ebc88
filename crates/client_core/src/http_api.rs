//! HTTP implementation of the [`PollApi`] seam against the poll backend
//! REST routes, plus the session-bootstrap calls the viewer needs before a
//! session exists.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Answer, ModeratorId, Poll, PollId, Question},
    protocol::{Session, SessionCode, Token},
};

use crate::{FetchError, PollApi};

pub struct HttpPollApi {
    http: Client,
    server_url: String,
}

impl HttpPollApi {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url = server_url.into();
        Self {
            http: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    /// Exchanges a session code for a token. Used once when joining a poll;
    /// the state engine itself only ever sees the resulting token.
    pub async fn connect(&self, code: &str) -> Result<Token, FetchError> {
        let response = self
            .http
            .post(format!("{}/connect", self.server_url))
            .json(&SessionCode {
                code: code.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        body(response).await
    }

    /// Resolves the session behind a token, yielding the moderator and poll
    /// identifiers to display.
    pub async fn session(&self, token: &str) -> Result<Session, FetchError> {
        let response = self
            .http
            .get(format!("{}/session", self.server_url))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(transport)?;
        body(response).await
    }

    pub async fn fetch_poll(
        &self,
        id_moderator: ModeratorId,
        id_poll: PollId,
        token: &str,
    ) -> Result<Poll, FetchError> {
        let response = self
            .http
            .get(format!(
                "{}/mod/{}/poll/{}",
                self.server_url, id_moderator.0, id_poll.0
            ))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(transport)?;
        body(response).await
    }
}

#[async_trait]
impl PollApi for HttpPollApi {
    async fn fetch_questions(
        &self,
        poll: &Poll,
        token: &str,
    ) -> Result<Vec<Question>, FetchError> {
        let response = self
            .http
            .get(format!(
                "{}/mod/{}/poll/{}/question",
                self.server_url, poll.id_moderator.0, poll.id_poll.0
            ))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(transport)?;
        body(response).await
    }

    async fn fetch_answers(
        &self,
        question: &Question,
        token: &str,
    ) -> Result<Vec<Answer>, FetchError> {
        let response = self
            .http
            .get(format!(
                "{}/mod/{}/poll/{}/question/{}/answer",
                self.server_url,
                question.id_moderator.0,
                question.id_poll.0,
                question.id_question.0
            ))
            .query(&[("token", token)])
            .send()
            .await
            .map_err(transport)?;
        body(response).await
    }

    async fn submit_vote(&self, answer: &Answer, token: &str) -> Result<(), FetchError> {
        let response = self
            .http
            .put(format!(
                "{}/mod/{}/poll/{}/question/{}/answer/{}",
                self.server_url,
                answer.id_moderator.0,
                answer.id_poll.0,
                answer.id_question.0,
                answer.id_answer.0
            ))
            .query(&[("token", token)])
            .json(answer)
            .send()
            .await
            .map_err(transport)?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::FORBIDDEN => Err(FetchError::Unauthorized),
            status => Err(FetchError::Status(status.as_u16())),
        }
    }
}

async fn body<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
    match response.status() {
        status if status.is_success() => response.json().await.map_err(transport),
        StatusCode::FORBIDDEN => Err(FetchError::Unauthorized),
        status => Err(FetchError::Status(status.as_u16())),
    }
}

fn transport(err: reqwest::Error) -> FetchError {
    FetchError::Transport(err.to_string())
}

#[cfg(test)]
#[path = "tests/http_api_tests.rs"]
mod tests;
