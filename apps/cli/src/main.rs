use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use client_core::{HttpPollApi, PollApi, PollModel, PollSession, Revisioned};
use shared::domain::{ModeratorId, PollId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the poll backend. Overrides the settings file.
    #[arg(long)]
    server_url: Option<String>,
    /// Session code printed by the moderator view.
    #[arg(long)]
    code: Option<String>,
    /// An already-issued session token.
    #[arg(long, conflicts_with = "code")]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }

    let api = Arc::new(HttpPollApi::new(settings.server_url.clone()));
    let token = match (args.token, args.code) {
        (Some(token), _) => token,
        (None, Some(code)) => {
            api.connect(&code)
                .await
                .context("failed to redeem the session code")?
                .token
        }
        (None, None) => return Err(anyhow!("either --token or --code is required")),
    };

    let session_info = api
        .session(&token)
        .await
        .context("failed to resolve the session")?;
    let id_moderator = ModeratorId(
        session_info
            .id_moderator
            .parse()
            .context("session carries a non-numeric moderator id")?,
    );
    let id_poll = PollId(
        session_info
            .id_poll
            .parse()
            .context("session carries a non-numeric poll id")?,
    );

    let poll = api
        .fetch_poll(id_moderator, id_poll, &token)
        .await
        .context("failed to fetch the poll")?;
    let questions = api
        .fetch_questions(&poll, &token)
        .await
        .context("failed to fetch the poll questions")?;
    let first = questions
        .into_iter()
        .min_by(|a, b| a.index_in_poll.total_cmp(&b.index_in_poll))
        .ok_or_else(|| anyhow!("the poll has no questions yet"))?;

    info!(id_poll = poll.id_poll.0, title = %poll.title, "joined poll");
    println!("{} — commands: n (next), p (previous), <answer number> (toggle vote), q (quit)", poll.title);

    let session = PollSession::spawn(api, poll, first, token);

    let printer = {
        let mut states = session.subscribe();
        tokio::spawn(async move {
            let mut last: Option<PollModel> = None;
            loop {
                {
                    let current = states.borrow_and_update();
                    if last.as_ref() != Some(&current.value) {
                        render(&current);
                        last = Some(current.value.clone());
                    }
                }
                if states.changed().await.is_err() {
                    break;
                }
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut watcher = session.subscribe();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let line = line.trim().to_string();
                if line == "q" {
                    break;
                }
                handle_command(&line, &session);
            }
            changed = watcher.changed() => {
                if changed.is_err() {
                    break;
                }
                if watcher.borrow().value.invalid_token {
                    eprintln!("The session token was rejected; leaving the poll.");
                    break;
                }
            }
        }
    }

    session.shutdown();
    printer.abort();
    Ok(())
}

fn handle_command(line: &str, session: &PollSession) {
    match line {
        "" => {}
        "n" => session.move_next(),
        "p" => session.move_previous(),
        _ => match line.parse::<usize>() {
            Ok(position) if position >= 1 => {
                let model = session.subscribe().borrow().value.clone();
                match model.current_answers().get(position - 1) {
                    Some(fetched) => session.vote(fetched.answer.clone()),
                    None => eprintln!("No answer at position {position}."),
                }
            }
            _ => eprintln!("Commands: n (next), p (previous), <answer number> (toggle vote), q (quit)."),
        },
    }
}

fn render(revisioned: &Revisioned<PollModel>) {
    let model = &revisioned.value;
    println!();
    println!("{}", model.current.title);
    for (position, fetched) in model.current_answers().iter().enumerate() {
        let mark = if fetched.answer.checked { "x" } else { " " };
        println!("  {}. [{mark}] {}", position + 1, fetched.answer.title);
    }
    if let Some(required) = model.min_checked_answers_warning() {
        println!("  check at least {required} answers");
    }
    if model.rejected.rejected {
        println!(
            "  too many answers checked, at most {} allowed",
            model.current.answer_max
        );
    }
    let mut hints = Vec::new();
    if model.previous_button_visible() {
        hints.push("p: previous");
    }
    if model.next_button_visible() {
        hints.push("n: next");
    }
    hints.push("q: quit");
    println!("  {}", hints.join(" | "));
}
