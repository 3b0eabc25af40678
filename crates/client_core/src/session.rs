use std::{collections::BTreeMap, path::Path};

use reply_format::FormattedOutput;
use shared::{
    domain::{Attachment, ConversationTurn, SenderId, TurnId},
    error::ChatNotice,
};
use thiserror::Error;
use tracing::info;

/// Append-only record of the conversation.
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: Vec<ConversationTurn>,
}

impl History {
    pub(crate) fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }
}

/// The single pending-attachment slot.
///
/// Every change bumps the generation so a completing turn only clears the
/// attachment it actually consumed.
#[derive(Debug, Clone, Default)]
pub struct AttachmentSlot {
    current: Option<Attachment>,
    generation: u64,
}

impl AttachmentSlot {
    pub fn peek(&self) -> Option<&Attachment> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn set(&mut self, attachment: Attachment) {
        self.current = Some(attachment);
        self.generation += 1;
    }

    fn cancel(&mut self) -> Option<Attachment> {
        self.generation += 1;
        self.current.take()
    }

    fn clear_if_generation(&mut self, generation: u64) -> bool {
        if self.generation != generation || self.current.is_none() {
            return false;
        }
        self.current = None;
        self.generation += 1;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Thinking,
    Reply(FormattedOutput),
    Notice(ChatNotice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayMessage {
    Outgoing {
        turn_id: TurnId,
        text: String,
        attachment: Option<Attachment>,
    },
    Incoming {
        turn_id: TurnId,
        body: MessageBody,
    },
}

impl DisplayMessage {
    pub fn turn_id(&self) -> TurnId {
        match self {
            Self::Outgoing { turn_id, .. } | Self::Incoming { turn_id, .. } => *turn_id,
        }
    }
}

/// What the renderer shows, in display order.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    messages: Vec<DisplayMessage>,
}

impl MessageList {
    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Incoming message for `turn_id`, placeholder or resolved.
    pub fn reply_for(&self, turn_id: TurnId) -> Option<&MessageBody> {
        self.messages.iter().find_map(|message| match message {
            DisplayMessage::Incoming { turn_id: id, body } if *id == turn_id => Some(body),
            _ => None,
        })
    }

    fn push(&mut self, message: DisplayMessage) {
        self.messages.push(message);
    }

    fn resolve(&mut self, turn_id: TurnId, resolved: MessageBody) -> bool {
        for message in &mut self.messages {
            if let DisplayMessage::Incoming { turn_id: id, body } = message {
                if *id == turn_id && *body == MessageBody::Thinking {
                    *body = resolved;
                    return true;
                }
            }
        }
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct InFlightTurn {
    pub(crate) attachment_generation: u64,
}

/// Everything one chat conversation owns.
#[derive(Debug)]
pub struct ChatSession {
    sender: SenderId,
    history: History,
    attachment: AttachmentSlot,
    messages: MessageList,
    in_flight: BTreeMap<TurnId, InFlightTurn>,
    next_turn: u64,
}

impl ChatSession {
    pub fn new(sender: SenderId) -> Self {
        Self {
            sender,
            history: History::default(),
            attachment: AttachmentSlot::default(),
            messages: MessageList::default(),
            in_flight: BTreeMap::new(),
            next_turn: 1,
        }
    }

    pub fn sender(&self) -> &SenderId {
        &self.sender
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn messages(&self) -> &MessageList {
        &self.messages
    }

    pub fn pending_attachment(&self) -> Option<&Attachment> {
        self.attachment.peek()
    }

    pub fn set_attachment(&mut self, attachment: Attachment) {
        info!(
            mime_type = attachment.mime_type.as_str(),
            size_bytes = attachment.data.len(),
            "attachment selected"
        );
        self.attachment.set(attachment);
    }

    pub fn cancel_attachment(&mut self) -> Option<Attachment> {
        self.attachment.cancel()
    }

    /// Turns submitted but not yet completed, oldest first.
    pub fn in_flight(&self) -> Vec<TurnId> {
        self.in_flight.keys().copied().collect()
    }

    pub(crate) fn begin_turn(&mut self, text: &str, attachment: Option<Attachment>) -> TurnId {
        let turn_id = TurnId(self.next_turn);
        self.next_turn += 1;

        self.history
            .push(ConversationTurn::user(turn_id, text, attachment.clone()));
        self.messages.push(DisplayMessage::Outgoing {
            turn_id,
            text: text.to_string(),
            attachment,
        });
        self.messages.push(DisplayMessage::Incoming {
            turn_id,
            body: MessageBody::Thinking,
        });
        self.in_flight.insert(
            turn_id,
            InFlightTurn {
                attachment_generation: self.attachment.generation(),
            },
        );
        turn_id
    }

    pub(crate) fn take_in_flight(&mut self, turn_id: TurnId) -> Option<InFlightTurn> {
        self.in_flight.remove(&turn_id)
    }

    pub(crate) fn finish_turn(
        &mut self,
        turn_id: TurnId,
        in_flight: InFlightTurn,
        body: MessageBody,
        model_turn: Option<ConversationTurn>,
    ) {
        self.messages.resolve(turn_id, body);
        if let Some(turn) = model_turn {
            self.history.push(turn);
        }
        if self.attachment.clear_if_generation(in_flight.attachment_generation) {
            info!(%turn_id, "cleared consumed attachment");
        }
    }
}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("failed to read attachment '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("attachment '{path}' is {mime_type}, only images are supported")]
    NotAnImage { path: String, mime_type: String },
}

/// Reads an image from disk, guessing its MIME type from the extension.
pub async fn load_attachment(path: impl AsRef<Path>) -> Result<Attachment, AttachmentError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    if !mime_type.starts_with("image/") {
        return Err(AttachmentError::NotAnImage {
            path: display,
            mime_type,
        });
    }
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| AttachmentError::Read {
            path: display,
            source,
        })?;
    Ok(Attachment::new(data, mime_type))
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
