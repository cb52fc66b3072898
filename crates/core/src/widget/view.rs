use serde::Serialize;
use uuid::Uuid;

use crate::credential::CredentialSource;
use crate::language::Language;

/// Who wrote a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person using the widget.
    User,
    /// The assistant.
    Model,
}

/// An entry of the message log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// A unique id, stable for the lifetime of the message.
    pub id: String,
    /// Who wrote the message.
    pub role: Role,
    /// The text, growing while the reply streams in.
    pub text: String,
    /// Whether the reply is still streaming in.
    pub is_streaming: bool,
}

impl ChatMessage {
    fn new(role: Role, text: String, is_streaming: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text,
            is_streaming,
        }
    }

    pub(crate) fn user(text: String) -> Self {
        Self::new(Role::User, text, false)
    }

    pub(crate) fn model(text: &str) -> Self {
        Self::new(Role::Model, text.to_owned(), false)
    }

    pub(crate) fn placeholder() -> Self {
        Self::new(Role::Model, String::new(), true)
    }
}

/// What the widget is doing.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    /// Ready for input.
    #[default]
    Idle,
    /// A message was submitted without an API key.
    AwaitingKey,
    /// Waiting for the first fragment of a reply.
    Sending,
    /// The reply is streaming in.
    Streaming,
    /// The last send failed. Only passed through on the way to `Idle`.
    Failed,
}

/// The result of submitting a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubmitOutcome {
    /// The message was sent.
    Started,
    /// Another send is still in flight, the message was dropped.
    Busy,
    /// The message was blank and ignored.
    Empty,
    /// There is no API key. The credential prompt has been opened.
    NeedsCredential,
}

/// State of the credential prompt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CredentialPrompt {
    /// Whether the prompt is shown.
    pub open: bool,
    /// An error to show in the prompt, in the widget's language.
    pub error: Option<String>,
}

/// A change the front-end should render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetEvent {
    /// A message was added at the end of the log.
    MessageAppended(ChatMessage),
    /// A message's text or streaming flag changed.
    MessageUpdated(ChatMessage),
    /// The whole log was replaced.
    LogReplaced(Vec<ChatMessage>),
    /// The phase changed.
    PhaseChanged(ChatPhase),
    /// The credential prompt was opened, closed or got a new error.
    PromptChanged(CredentialPrompt),
}

/// A snapshot of everything the widget shows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WidgetView {
    /// The active language.
    pub language: Language,
    /// The current phase.
    pub phase: ChatPhase,
    /// The message log, oldest first.
    pub messages: Vec<ChatMessage>,
    /// A masked hint of the active API key.
    pub credential_hint: Option<String>,
    /// Where the active API key came from.
    pub credential_source: CredentialSource,
    /// The credential prompt.
    pub prompt: CredentialPrompt,
    /// Whether a new message can be sent right now.
    pub submit_enabled: bool,
    /// The placeholder for the input box.
    pub input_placeholder: &'static str,
}

impl WidgetView {
    /// Returns `true` if an API key is configured.
    #[inline]
    pub fn has_credential(&self) -> bool {
        self.credential_hint.is_some()
    }
}
