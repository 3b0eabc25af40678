use std::{collections::VecDeque, sync::Arc, time::Duration};

use super::*;
use async_trait::async_trait;
use reply_format::TableRow;
use shared::domain::{Attachment, Role, SenderId};
use tokio::{sync::Mutex, task::JoinSet};

type Outcome = Result<Vec<WebhookReply>, TransportError>;

#[derive(Clone, Default)]
struct ScriptedTransport {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    seen: Arc<Mutex<Vec<(usize, WebhookRequest)>>>,
}

impl ScriptedTransport {
    fn with(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl TransportClient for ScriptedTransport {
    async fn exchange(
        &self,
        history: &[ConversationTurn],
        request: &WebhookRequest,
    ) -> Result<Vec<WebhookReply>, TransportError> {
        self.seen
            .lock()
            .await
            .push((history.len(), request.clone()));
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Replies with the request text after a per-message delay.
struct DelayedEcho;

#[async_trait]
impl TransportClient for DelayedEcho {
    async fn exchange(
        &self,
        _history: &[ConversationTurn],
        request: &WebhookRequest,
    ) -> Result<Vec<WebhookReply>, TransportError> {
        let delay = if request.message == "slow" { 200 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(vec![WebhookReply::text(format!("echo {}", request.message))])
    }
}

struct ScriptedDictation(Result<Option<String>, DictationError>);

#[async_trait]
impl Dictation for ScriptedDictation {
    async fn dictate(&self) -> Result<Option<String>, DictationError> {
        self.0.clone()
    }
}

fn controller(transport: ScriptedTransport) -> TurnController<ScriptedTransport> {
    TurnController::new(
        transport,
        ResponseFormatter::new(),
        ChatSession::new(SenderId("user123_frontend".into())),
    )
}

fn server_down() -> TransportError {
    TransportError::Status {
        status: 503,
        body: "unavailable".into(),
    }
}

#[tokio::test]
async fn successful_turn_formats_reply_and_records_history() {
    let transport = ScriptedTransport::with(vec![Ok(vec![WebhookReply::text(
        "Fares < 500 & up",
    )])]);
    let mut controller = controller(transport.clone());

    let body = controller.run_turn("  fares?  ").await.expect("turn");

    assert_eq!(
        body,
        MessageBody::Reply(FormattedOutput::PlainText("Fares &lt; 500 &amp; up".into()))
    );
    let turns = controller.session().history().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!((turns[0].role, turns[0].content.as_str()), (Role::User, "fares?"));
    assert_eq!((turns[1].role, turns[1].content.as_str()), (Role::Model, "Fares < 500 & up"));
    assert_eq!(turns[0].turn_id, turns[1].turn_id);

    let seen = transport.seen.lock().await;
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 1);
    assert_eq!(seen[0].1.message, "fares?");
    assert_eq!(seen[0].1.sender.as_str(), "user123_frontend");
    assert!(controller.session().in_flight().is_empty());
}

#[tokio::test]
async fn table_markdown_payload_becomes_table() {
    let transport = ScriptedTransport::with(vec![Ok(vec![
        WebhookReply::text("Your PNR status:"),
        WebhookReply::table_markdown("PNR|Status\n--|--\n4512|CNF"),
    ])]);
    let mut controller = controller(transport);

    let body = controller.run_turn("pnr 4512").await.expect("turn");

    let MessageBody::Reply(FormattedOutput::Table(table)) = body else {
        panic!("expected table reply, got {body:?}");
    };
    assert_eq!(table.header, vec!["PNR", "Status"]);
    assert_eq!(
        table.rows,
        vec![TableRow::Cells(vec!["4512".into(), "CNF".into()])]
    );
    assert_eq!(table.leading.as_deref(), Some("Your PNR status:"));
}

#[tokio::test]
async fn transport_failure_shows_notice_without_model_turn() {
    let transport = ScriptedTransport::with(vec![Err(server_down())]);
    let mut controller = controller(transport);
    controller
        .session_mut()
        .set_attachment(Attachment::new(vec![1, 2], "image/png"));

    let body = controller.run_turn("status").await.expect("turn");

    assert_eq!(
        body,
        MessageBody::Notice(NoticeCode::BackendUnavailable.into())
    );
    assert_eq!(controller.session().history().len(), 1);
    assert!(controller.session().pending_attachment().is_none());
    assert_eq!(
        controller.session().messages().reply_for(TurnId(1)),
        Some(&body)
    );
}

#[tokio::test]
async fn empty_reply_list_records_apology() {
    let mut controller = controller(ScriptedTransport::with(vec![Ok(Vec::new())]));

    let body = controller.run_turn("hello").await.expect("turn");

    assert_eq!(body, MessageBody::Notice(NoticeCode::NoReplies.into()));
    let last = controller.session().history().last().expect("model turn");
    assert_eq!(last.role, Role::Model);
    assert_eq!(last.content, NoticeCode::NoReplies.default_message());
}

#[tokio::test]
async fn blank_reply_is_not_sure_how_to_respond() {
    let mut controller = controller(ScriptedTransport::with(vec![Ok(vec![
        WebhookReply::text("   "),
        WebhookReply::default(),
    ])]));

    let body = controller.run_turn("hello").await.expect("turn");

    assert_eq!(body, MessageBody::Notice(NoticeCode::BlankReply.into()));
    assert_eq!(
        controller.session().history().last().map(|t| t.content.as_str()),
        Some("I'm not sure how to respond to that.")
    );
}

#[test]
fn empty_submission_is_rejected() {
    let mut controller = controller(ScriptedTransport::default());
    assert!(matches!(
        controller.submit("   "),
        Err(ControllerError::EmptyInput)
    ));
    assert!(controller.session().history().is_empty());
    assert!(controller.session().messages().is_empty());
}

#[tokio::test]
async fn attachment_alone_can_be_submitted() {
    let mut controller = controller(ScriptedTransport::with(vec![Ok(vec![WebhookReply::text(
        "Nice ticket",
    )])]));
    let image = Attachment::new(vec![7; 4], "image/jpeg");
    controller.session_mut().set_attachment(image.clone());

    controller.run_turn("").await.expect("turn");

    let first = &controller.session().history().turns()[0];
    assert_eq!(first.content, "");
    assert_eq!(first.attachment, Some(image));
    assert!(controller.session().pending_attachment().is_none());
}

#[test]
fn completing_unknown_turn_fails() {
    let mut controller = controller(ScriptedTransport::default());
    assert!(matches!(
        controller.complete(TurnId(42), Ok(Vec::new())),
        Err(ControllerError::UnknownTurn(TurnId(42)))
    ));
}

#[tokio::test]
async fn overlapping_turns_resolve_their_own_placeholders() {
    let mut controller = controller(ScriptedTransport::default());

    let first = controller.submit("first").expect("first");
    let second = controller.submit("second").expect("second");
    assert_eq!(controller.session().in_flight(), vec![first.turn_id, second.turn_id]);
    assert_eq!(second.history.len(), 2);

    controller
        .complete(second.turn_id, Ok(vec![WebhookReply::text("reply two")]))
        .expect("second completes");
    controller
        .complete(first.turn_id, Ok(vec![WebhookReply::text("reply one")]))
        .expect("first completes");

    let messages = controller.session().messages();
    assert_eq!(
        messages.reply_for(first.turn_id),
        Some(&MessageBody::Reply(FormattedOutput::PlainText("reply one".into())))
    );
    assert_eq!(
        messages.reply_for(second.turn_id),
        Some(&MessageBody::Reply(FormattedOutput::PlainText("reply two".into())))
    );

    let model_turns: Vec<_> = controller
        .session()
        .history()
        .turns()
        .iter()
        .filter(|turn| turn.role == Role::Model)
        .map(|turn| (turn.turn_id, turn.content.as_str()))
        .collect();
    assert_eq!(
        model_turns,
        vec![(second.turn_id, "reply two"), (first.turn_id, "reply one")]
    );
}

#[tokio::test]
async fn completing_twice_is_rejected() {
    let mut controller = controller(ScriptedTransport::default());
    let pending = controller.submit("once").expect("submit");
    controller
        .complete(pending.turn_id, Ok(vec![WebhookReply::text("ok")]))
        .expect("first completion");
    assert!(matches!(
        controller.complete(pending.turn_id, Ok(vec![WebhookReply::text("late")])),
        Err(ControllerError::UnknownTurn(_))
    ));
    assert_eq!(controller.session().history().len(), 2);
}

#[tokio::test]
async fn dispatched_exchanges_complete_in_arrival_order() {
    let mut controller = TurnController::new(
        DelayedEcho,
        ResponseFormatter::new(),
        ChatSession::new(SenderId("user123_frontend".into())),
    );

    let slow = controller.submit("slow").expect("slow");
    let fast = controller.submit("fast").expect("fast");
    let mut exchanges = JoinSet::new();
    exchanges.spawn(controller.dispatch(slow.clone()));
    exchanges.spawn(controller.dispatch(fast.clone()));

    let mut arrival = Vec::new();
    while let Some(joined) = exchanges.join_next().await {
        let (turn_id, outcome) = joined.expect("exchange task");
        arrival.push(turn_id);
        controller.complete(turn_id, outcome).expect("complete");
    }

    assert_eq!(arrival, vec![fast.turn_id, slow.turn_id]);
    let messages = controller.session().messages();
    assert_eq!(
        messages.reply_for(slow.turn_id),
        Some(&MessageBody::Reply(FormattedOutput::PlainText("echo slow".into())))
    );
    assert_eq!(
        messages.reply_for(fast.turn_id),
        Some(&MessageBody::Reply(FormattedOutput::PlainText("echo fast".into())))
    );
    let model_turns: Vec<_> = controller
        .session()
        .history()
        .turns()
        .iter()
        .filter(|turn| turn.role == Role::Model)
        .map(|turn| turn.turn_id)
        .collect();
    assert_eq!(model_turns, vec![fast.turn_id, slow.turn_id]);
    assert!(controller.session().in_flight().is_empty());
}

#[tokio::test]
async fn dictated_utterance_goes_through_submission() {
    let transport = ScriptedTransport::with(vec![Ok(vec![WebhookReply::text("Searching")])]);
    let mut controller = controller(transport.clone());

    let pending = controller
        .submit_dictated(&ScriptedDictation(Ok(Some("trains to Pune".into()))))
        .await
        .expect("voice turn")
        .expect("utterance");
    assert_eq!(pending.request.message, "trains to Pune");

    let (turn_id, outcome) = controller.dispatch(pending).await;
    let body = controller.complete(turn_id, outcome).expect("complete");

    assert!(matches!(body, MessageBody::Reply(_)));
    assert_eq!(transport.seen.lock().await[0].1.message, "trains to Pune");
}

#[tokio::test]
async fn dictation_failures_do_not_submit() {
    let mut controller = controller(ScriptedTransport::default());

    let err = controller
        .submit_dictated(&ScriptedDictation(Err(DictationError::NoMicrophone)))
        .await
        .expect_err("dictation error");
    assert!(matches!(err, VoiceTurnError::Dictation(DictationError::NoMicrophone)));

    let none = controller
        .submit_dictated(&ScriptedDictation(Ok(None)))
        .await
        .expect("stopped without speech");
    assert!(none.is_none());
    assert!(controller.session().history().is_empty());
    assert!(controller.session().in_flight().is_empty());
}
