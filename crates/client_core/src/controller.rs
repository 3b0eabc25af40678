use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use reply_format::{FormattedOutput, ResponseFormatter};
use shared::{
    domain::{ConversationTurn, TurnId},
    error::{ChatNotice, NoticeCode},
    protocol::{compose_reply_text, WebhookReply, WebhookRequest},
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    dictation::{Dictation, DictationError},
    session::{ChatSession, MessageBody},
    transport::{TransportClient, TransportError},
};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("nothing to send: message and attachment are both empty")]
    EmptyInput,
    #[error("turn {0} is not awaiting a reply")]
    UnknownTurn(TurnId),
}

/// Why a turn ended without a formatted reply.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("webhook returned no replies")]
    NoReplies,
    #[error("webhook reply was blank")]
    BlankReply,
}

impl TurnError {
    pub fn notice(&self) -> ChatNotice {
        let code = match self {
            Self::Transport(err) => err.notice_code(),
            Self::NoReplies => NoticeCode::NoReplies,
            Self::BlankReply => NoticeCode::BlankReply,
        };
        ChatNotice::from(code)
    }
}

#[derive(Debug, Error)]
pub enum VoiceTurnError {
    #[error(transparent)]
    Dictation(#[from] DictationError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// A submitted turn waiting for its exchange to finish.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub turn_id: TurnId,
    pub request: WebhookRequest,
    /// History as it stood when the turn was submitted.
    pub history: Vec<ConversationTurn>,
}

/// Sequences turns: submit, exchange, complete.
///
/// Submissions are never blocked while others are outstanding. Each reply is
/// matched to its placeholder by [`TurnId`]; model turns enter the history in
/// completion order.
pub struct TurnController<T> {
    transport: Arc<T>,
    formatter: ResponseFormatter,
    session: ChatSession,
}

impl<T: TransportClient> TurnController<T> {
    pub fn new(transport: T, formatter: ResponseFormatter, session: ChatSession) -> Self {
        Self {
            transport: Arc::new(transport),
            formatter,
            session,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        &mut self.session
    }

    pub fn submit(&mut self, text: &str) -> Result<PendingTurn, ControllerError> {
        let text = text.trim();
        let attachment = self.session.pending_attachment().cloned();
        if text.is_empty() && attachment.is_none() {
            return Err(ControllerError::EmptyInput);
        }

        let has_attachment = attachment.is_some();
        let turn_id = self.session.begin_turn(text, attachment);
        info!(%turn_id, has_attachment, "submitted turn");

        Ok(PendingTurn {
            turn_id,
            request: WebhookRequest {
                sender: self.session.sender().clone(),
                message: text.to_string(),
            },
            history: self.session.history().turns().to_vec(),
        })
    }

    pub async fn exchange(&self, pending: &PendingTurn) -> Result<Vec<WebhookReply>, TransportError> {
        self.transport
            .exchange(&pending.history, &pending.request)
            .await
    }

    /// Detached exchange for `pending`, so the caller can keep accepting
    /// input while it runs. Feed the result back through [`Self::complete`].
    pub fn dispatch(
        &self,
        pending: PendingTurn,
    ) -> impl Future<Output = (TurnId, Result<Vec<WebhookReply>, TransportError>)> + Send + 'static
    where
        T: 'static,
    {
        let transport = Arc::clone(&self.transport);
        async move {
            let outcome = transport.exchange(&pending.history, &pending.request).await;
            (pending.turn_id, outcome)
        }
    }

    /// Resolves the placeholder for `turn_id` with the exchange outcome.
    pub fn complete(
        &mut self,
        turn_id: TurnId,
        outcome: Result<Vec<WebhookReply>, TransportError>,
    ) -> Result<MessageBody, ControllerError> {
        let in_flight = self
            .session
            .take_in_flight(turn_id)
            .ok_or(ControllerError::UnknownTurn(turn_id))?;

        let rendered = outcome
            .map_err(TurnError::from)
            .and_then(|replies| self.render_replies(&replies));

        let (body, model_turn) = match rendered {
            Ok((text, output)) => (
                MessageBody::Reply(output),
                Some(ConversationTurn::model(turn_id, text)),
            ),
            Err(err) => {
                warn!(%turn_id, error = %err, "turn finished without a reply");
                let notice = err.notice();
                let model_turn = notice
                    .code
                    .records_model_turn()
                    .then(|| ConversationTurn::model(turn_id, notice.message.clone()));
                (MessageBody::Notice(notice), model_turn)
            }
        };

        self.session
            .finish_turn(turn_id, in_flight, body.clone(), model_turn);
        Ok(body)
    }

    pub async fn run_turn(&mut self, text: &str) -> Result<MessageBody, ControllerError> {
        let pending = self.submit(text)?;
        let outcome = self.exchange(&pending).await;
        self.complete(pending.turn_id, outcome)
    }

    /// Records one utterance and submits it like typed text. `Ok(None)` when
    /// the recognizer stopped without hearing anything.
    pub async fn submit_dictated<D>(
        &mut self,
        dictation: &D,
    ) -> Result<Option<PendingTurn>, VoiceTurnError>
    where
        D: Dictation + ?Sized,
    {
        let Some(utterance) = dictation.dictate().await? else {
            return Ok(None);
        };
        info!(chars = utterance.len(), "dictated message");
        Ok(Some(self.submit(&utterance)?))
    }

    fn render_replies(&self, replies: &[WebhookReply]) -> Result<(String, FormattedOutput), TurnError> {
        if replies.is_empty() {
            return Err(TurnError::NoReplies);
        }
        let text = compose_reply_text(replies);
        if text.trim().is_empty() {
            return Err(TurnError::BlankReply);
        }

        let formatter = &self.formatter;
        let output = panic::catch_unwind(AssertUnwindSafe(|| formatter.format(&text)))
            .map_err(|_| {
                error!("formatter panicked on reply");
                TurnError::BlankReply
            })?;
        if output.is_empty() {
            return Err(TurnError::BlankReply);
        }
        Ok((text, output))
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
