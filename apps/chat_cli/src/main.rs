use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    load_attachment, ChatSession, CommandDictation, ControllerError, Dictation, DisplayMessage,
    MessageBody, NoDictation, PendingTurn, RestWebhookClient, TransportClient, TurnController,
    VoiceTurnError,
};
use reply_format::{html, ResponseFormatter};
use shared::domain::{SenderId, TurnId};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinSet,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::{load_settings, validate_endpoint, Settings};

#[derive(Parser, Debug)]
#[command(about = "Terminal chat client for a REST webhook chatbot")]
struct Args {
    /// TOML settings file (defaults to ./chat.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    sender: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Speech-to-text command whose stdout is one utterance.
    #[arg(long)]
    dictation_command: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Send(String),
    Attach(PathBuf),
    Cancel,
    Voice,
    History,
    Html,
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(name, arg)| (name, arg.trim()))
        .unwrap_or((rest, ""));
    match name {
        "attach" if !arg.is_empty() => Command::Attach(PathBuf::from(arg)),
        "cancel" => Command::Cancel,
        "voice" => Command::Voice,
        "history" => Command::History,
        "html" => Command::Html,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

const HELP: &str = "commands: /attach <image>, /cancel, /voice, /history, /html, /help, /quit";

fn apply_args(settings: &mut Settings, args: &Args) {
    if let Some(v) = &args.endpoint {
        settings.endpoint_url = v.clone();
    }
    if let Some(v) = &args.sender {
        settings.sender_id = SenderId(v.clone());
    }
    if let Some(v) = args.timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = &args.dictation_command {
        settings.dictation_command = Some(v.clone());
    }
}

fn print_turn_messages<T>(controller: &TurnController<T>, turn_id: TurnId, with_outgoing: bool)
where
    T: TransportClient,
{
    for message in controller
        .session()
        .messages()
        .messages()
        .iter()
        .filter(|message| message.turn_id() == turn_id)
        .filter(|message| with_outgoing || matches!(message, DisplayMessage::Incoming { .. }))
    {
        println!("{}", render::render_message(message));
    }
}

/// Widget markup for every message of the most recent turn.
fn last_turn_html(session: &ChatSession) -> Option<String> {
    let messages = session.messages().messages();
    let turn_id = messages.last()?.turn_id();
    let markup = messages
        .iter()
        .filter(|message| message.turn_id() == turn_id)
        .map(|message| match message {
            DisplayMessage::Outgoing {
                text, attachment, ..
            } => {
                let preview = attachment.as_ref().map(|attachment| attachment.data_uri());
                html::render_outgoing(text, preview.as_deref())
            }
            DisplayMessage::Incoming { body, .. } => match body {
                MessageBody::Thinking => html::render_thinking(),
                MessageBody::Reply(output) => html::render(output),
                MessageBody::Notice(notice) => html::render_error(&notice.message),
            },
        })
        .collect::<Vec<_>>()
        .join("\n");
    Some(markup)
}

enum Step {
    Idle,
    Sent(PendingTurn),
    Quit,
}

async fn handle_line<T>(
    line: &str,
    controller: &mut TurnController<T>,
    dictation: &dyn Dictation,
) -> Step
where
    T: TransportClient,
{
    match parse_command(line) {
        Command::Send(text) => match controller.submit(&text) {
            Ok(pending) => {
                print_turn_messages(controller, pending.turn_id, false);
                return Step::Sent(pending);
            }
            Err(ControllerError::EmptyInput) => {}
            Err(err) => warn!(error = %err, "message not sent"),
        },
        Command::Attach(path) => match load_attachment(&path).await {
            Ok(attachment) => {
                println!(
                    "attached {} ({}, {} bytes)",
                    path.display(),
                    attachment.mime_type,
                    attachment.data.len()
                );
                controller.session_mut().set_attachment(attachment);
            }
            Err(err) => println!("cannot attach: {err}"),
        },
        Command::Cancel => {
            if controller.session_mut().cancel_attachment().is_some() {
                println!("attachment removed");
            }
        }
        Command::Voice => {
            println!("listening...");
            match controller.submit_dictated(dictation).await {
                Ok(Some(pending)) => {
                    print_turn_messages(controller, pending.turn_id, true);
                    return Step::Sent(pending);
                }
                Ok(None) => println!("recording stopped"),
                Err(VoiceTurnError::Dictation(err)) => {
                    warn!(error = %err, "dictation failed");
                    println!("{}", err.notice().message);
                }
                Err(err) => warn!(error = %err, "voice message not sent"),
            }
        }
        Command::History => {
            for turn in controller.session().history().turns() {
                println!("{}", render::render_turn(turn));
            }
        }
        Command::Html => match last_turn_html(controller.session()) {
            Some(markup) => println!("{markup}"),
            None => println!("no messages yet"),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => return Step::Quit,
        Command::Unknown(raw) => println!("unknown command '{raw}'; {HELP}"),
    }
    Step::Idle
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(args.config.as_deref())?;
    apply_args(&mut settings, &args);
    let endpoint = validate_endpoint(&settings.endpoint_url)?;

    let transport = RestWebhookClient::new(
        endpoint.as_str(),
        Duration::from_secs(settings.request_timeout_secs),
    )
    .context("failed to create webhook client")?;
    let dictation: Arc<dyn Dictation> = match settings
        .dictation_command
        .as_deref()
        .and_then(CommandDictation::from_command_line)
    {
        Some(command) => Arc::new(command),
        None => Arc::new(NoDictation),
    };

    info!(
        endpoint = %endpoint,
        sender = settings.sender_id.as_str(),
        "chat session started"
    );
    let mut controller = TurnController::new(
        transport,
        ResponseFormatter::with_keywords(&settings.fence_keywords),
        ChatSession::new(settings.sender_id.clone()),
    );

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut exchanges = JoinSet::new();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("failed to read stdin")? else {
                    stdin_open = false;
                    continue;
                };
                match handle_line(&line, &mut controller, dictation.as_ref()).await {
                    Step::Sent(pending) => {
                        exchanges.spawn(controller.dispatch(pending));
                    }
                    Step::Idle => {}
                    Step::Quit => break,
                }
            }
            Some(joined) = exchanges.join_next(), if !exchanges.is_empty() => {
                let (turn_id, outcome) = joined.context("webhook exchange task failed")?;
                controller.complete(turn_id, outcome)?;
                print_turn_messages(&controller, turn_id, false);
            }
            else => break,
        }
    }

    if !exchanges.is_empty() {
        warn!(pending = exchanges.len(), "dropping unanswered turns");
    }
    info!(
        turns = controller.session().history().len(),
        "chat session ended"
    );
    Ok(())
}
