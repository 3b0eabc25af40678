use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeCode {
    BackendUnavailable,
    Unexpected,
    NoReplies,
    BlankReply,
    NoSpeech,
    NoMicrophone,
    MicrophonePermissionDenied,
    DictationUnsupported,
    DictationFailed,
}

impl NoticeCode {
    pub fn default_message(self) -> &'static str {
        match self {
            Self::BackendUnavailable => {
                "Sorry, I'm having trouble connecting to my brain right now. Please try again later."
            }
            Self::Unexpected => "Oops! Something went wrong. Please try again.",
            Self::NoReplies => "I'm sorry, I didn't get a specific response from the server.",
            Self::BlankReply => "I'm not sure how to respond to that.",
            Self::NoSpeech => "No speech was detected. Please try again.",
            Self::NoMicrophone => {
                "No microphone was found. Ensure that a microphone is installed and that microphone settings are configured correctly."
            }
            Self::MicrophonePermissionDenied => {
                "Permission to use microphone was denied. Please enable it in your settings."
            }
            Self::DictationUnsupported => "Speech recognition is not supported here.",
            Self::DictationFailed => "An error occurred during speech recognition.",
        }
    }

    /// Whether the failure leaves a model turn in the history.
    pub fn records_model_turn(self) -> bool {
        matches!(self, Self::NoReplies | Self::BlankReply)
    }
}

/// User-visible message shown in place of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatNotice {
    pub code: NoticeCode,
    pub message: String,
}

impl ChatNotice {
    pub fn new(code: NoticeCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<NoticeCode> for ChatNotice {
    fn from(code: NoticeCode) -> Self {
        Self::new(code, code.default_message())
    }
}
