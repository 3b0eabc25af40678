//! Chat client core: the conversation session, the webhook transport, and
//! the controller that runs one turn at a time over them.

pub mod controller;
pub mod dictation;
pub mod session;
pub mod transport;

pub use controller::{ControllerError, PendingTurn, TurnController, TurnError, VoiceTurnError};
pub use dictation::{CommandDictation, Dictation, DictationError, NoDictation};
pub use session::{
    load_attachment, AttachmentError, ChatSession, DisplayMessage, History, MessageBody,
    MessageList,
};
pub use transport::{RestWebhookClient, TransportClient, TransportError, DEFAULT_REQUEST_TIMEOUT};
