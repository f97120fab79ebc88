use std::{collections::HashMap, sync::Arc};

use super::*;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, Mutex},
};

fn poll() -> Poll {
    Poll {
        id_moderator: ModeratorId(1),
        id_poll: PollId(7),
        title: "Rust quiz".to_string(),
    }
}

fn question(id: i64, index: f64) -> Question {
    Question {
        id_moderator: ModeratorId(1),
        id_poll: PollId(7),
        id_question: shared::domain::QuestionId(id),
        title: format!("question {id}"),
        details: None,
        index_in_poll: index,
        answer_min: 0,
        answer_max: 2,
    }
}

fn answer(id: i64, question: &Question, checked: bool) -> Answer {
    Answer {
        id_moderator: question.id_moderator,
        id_poll: question.id_poll,
        id_question: question.id_question,
        id_answer: shared::domain::AnswerId(id),
        title: format!("answer {id}"),
        description: None,
        checked,
    }
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn fetch_questions_hits_the_expected_route() {
    let router = Router::new().route(
        "/mod/:id_moderator/poll/:id_poll/question",
        get(
            |Path((id_moderator, id_poll)): Path<(i64, i64)>,
             Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!((id_moderator, id_poll), (1, 7));
                assert_eq!(params.get("token").map(String::as_str), Some("secret"));
                Json(vec![question(4, 0.0)])
            },
        ),
    );
    let api = HttpPollApi::new(serve(router).await);

    let questions = api.fetch_questions(&poll(), "secret").await.expect("fetch");

    assert_eq!(questions, vec![question(4, 0.0)]);
}

#[tokio::test]
async fn fetch_answers_hits_the_question_subresource() {
    let q4 = question(4, 0.0);
    let expected = vec![answer(9, &q4, true)];
    let body = expected.clone();
    let router = Router::new().route(
        "/mod/:id_moderator/poll/:id_poll/question/:id_question/answer",
        get(move |Path(path): Path<(i64, i64, i64)>| async move {
            assert_eq!(path, (1, 7, 4));
            Json(body)
        }),
    );
    let api = HttpPollApi::new(serve(router).await);

    let answers = api.fetch_answers(&q4, "secret").await.expect("fetch");

    assert_eq!(answers, expected);
}

#[tokio::test]
async fn submit_vote_puts_the_toggled_answer() {
    #[derive(Clone)]
    struct VoteState {
        tx: Arc<Mutex<Option<oneshot::Sender<Answer>>>>,
    }

    let (tx, rx) = oneshot::channel();
    let state = VoteState {
        tx: Arc::new(Mutex::new(Some(tx))),
    };
    let router = Router::new()
        .route(
            "/mod/:id_moderator/poll/:id_poll/question/:id_question/answer/:id_answer",
            put(
                |State(state): State<VoteState>,
                 Path(path): Path<(i64, i64, i64, i64)>,
                 Json(answer): Json<Answer>| async move {
                    assert_eq!(path, (1, 7, 4, 9));
                    if let Some(tx) = state.tx.lock().await.take() {
                        let _ = tx.send(answer);
                    }
                    StatusCode::OK
                },
            ),
        )
        .with_state(state);
    let api = HttpPollApi::new(serve(router).await);

    let mut voted = answer(9, &question(4, 0.0), false);
    voted.toggle();
    api.submit_vote(&voted, "secret").await.expect("submit");

    let received = rx.await.expect("vote body");
    assert!(received.checked);
    assert_eq!(received.id_answer, voted.id_answer);
}

#[tokio::test]
async fn forbidden_responses_map_to_unauthorized() {
    let router = Router::new().route(
        "/mod/:id_moderator/poll/:id_poll/question",
        get(|| async { StatusCode::FORBIDDEN }),
    );
    let api = HttpPollApi::new(serve(router).await);

    let err = api
        .fetch_questions(&poll(), "revoked")
        .await
        .expect_err("must fail");

    assert!(matches!(err, FetchError::Unauthorized));
}

#[tokio::test]
async fn other_failures_map_to_their_status() {
    let router = Router::new().route(
        "/mod/:id_moderator/poll/:id_poll/question",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let api = HttpPollApi::new(serve(router).await);

    let err = api
        .fetch_questions(&poll(), "secret")
        .await
        .expect_err("must fail");

    assert!(matches!(err, FetchError::Status(500)));
}

#[tokio::test]
async fn unreachable_servers_map_to_transport_failures() {
    let api = HttpPollApi::new("http://127.0.0.1:1");

    let err = api
        .fetch_questions(&poll(), "secret")
        .await
        .expect_err("must fail");

    assert!(matches!(err, FetchError::Transport(_)));
}

#[tokio::test]
async fn connect_exchanges_a_session_code_for_a_token() {
    let router = Router::new().route(
        "/connect",
        post(|Json(code): Json<SessionCode>| async move {
            assert_eq!(code.code, "0x1234");
            Json(Token {
                token: "issued-token".to_string(),
            })
        }),
    );
    let api = HttpPollApi::new(serve(router).await);

    let token = api.connect("0x1234").await.expect("connect");

    assert_eq!(token.token, "issued-token");
}

#[tokio::test]
async fn session_resolves_the_poll_identifiers() {
    let router = Router::new().route(
        "/session",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            assert_eq!(params.get("token").map(String::as_str), Some("issued-token"));
            Json(Session {
                id_moderator: "1".to_string(),
                id_poll: "7".to_string(),
                id_session: "12".to_string(),
                code: "0x1234".to_string(),
                status: "open".to_string(),
            })
        }),
    );
    let api = HttpPollApi::new(serve(router).await);

    let session = api.session("issued-token").await.expect("session");

    assert_eq!(session.id_poll, "7");
    assert_eq!(session.id_moderator, "1");
}

#[tokio::test]
async fn fetch_poll_returns_the_poll_summary() {
    let router = Router::new().route(
        "/mod/:id_moderator/poll/:id_poll",
        get(|Path(path): Path<(i64, i64)>| async move {
            assert_eq!(path, (1, 7));
            Json(poll())
        }),
    );
    let api = HttpPollApi::new(serve(router).await);

    let fetched = api
        .fetch_poll(ModeratorId(1), PollId(7), "secret")
        .await
        .expect("fetch poll");

    assert_eq!(fetched, poll());
}
