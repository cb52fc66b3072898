mod builder;
mod state;
mod view;

use lumos_actor::Actor;

use crate::credential::CredentialStore;
use crate::error::WidgetError;
use crate::language::Language;
use crate::session::{Conversation, SessionFactory};
pub use builder::ChatWidgetBuilder;
use state::InFlight;
pub use view::*;

/// The chat widget's state, owned by its actor.
///
/// Every UI event and every stream notification is a message handled one
/// at a time, so a reply streaming in never races a reset or a language
/// change. The stream itself is consumed by a spawned task that posts
/// fragments back to the actor.
pub(crate) struct WidgetState {
    language: Language,
    credentials: CredentialStore,
    factory: SessionFactory,
    conversation: Option<Conversation>,
    messages: Vec<ChatMessage>,
    phase: ChatPhase,
    prompt: CredentialPrompt,
    in_flight: Option<InFlight>,
    next_send_id: u64,

    on_event: Option<Box<dyn Fn(WidgetEvent) + Send + Sync>>,
    on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

/// A chat widget that streams replies from a hosted model into a message
/// log.
///
/// The handle is cheap to clone. The widget stops once every handle is
/// dropped and no reply is streaming in.
#[derive(Clone)]
pub struct ChatWidget {
    handle: Actor<WidgetState>,
}

impl ChatWidget {
    /// Submits a message.
    ///
    /// Returns once the message is in the log. The reply streams in
    /// afterwards and is reported through the `on_event` callback.
    pub async fn submit<S: Into<String>>(
        &self,
        text: S,
    ) -> Result<SubmitOutcome, WidgetError> {
        let text = text.into();
        let outcome = self
            .handle
            .call("submit", move |state, handle| state.submit(text, handle))
            .await?;
        Ok(outcome)
    }

    /// Discards the conversation and shows a fresh greeting.
    ///
    /// Does nothing and returns `false` without an API key.
    pub async fn reset(&self) -> Result<bool, WidgetError> {
        Ok(self.handle.call("reset", |state, _| state.reset()).await?)
    }

    /// Switches the language, discarding the conversation.
    ///
    /// Returns `false` if `language` is already active.
    pub async fn set_language(
        &self,
        language: Language,
    ) -> Result<bool, WidgetError> {
        Ok(self
            .handle
            .call("set language", move |state, _| state.set_language(language))
            .await?)
    }

    /// Validates and stores an API key.
    ///
    /// On success the conversation is discarded, so the next message uses
    /// the new key.
    pub async fn save_credential<S: Into<String>>(
        &self,
        value: S,
    ) -> Result<(), WidgetError> {
        let value = value.into();
        self.handle
            .call("save credential", move |state, _| {
                state.save_credential(&value)
            })
            .await??;
        Ok(())
    }

    /// Opens the credential prompt.
    pub async fn open_credential_prompt(&self) -> Result<(), WidgetError> {
        Ok(self
            .handle
            .call("open prompt", |state, _| state.open_credential_prompt())
            .await?)
    }

    /// Closes the credential prompt.
    pub async fn dismiss_credential_prompt(&self) -> Result<(), WidgetError> {
        Ok(self
            .handle
            .call("dismiss prompt", |state, _| {
                state.dismiss_credential_prompt()
            })
            .await?)
    }

    /// Returns the suggested questions in the active language.
    pub async fn suggestions(
        &self,
    ) -> Result<&'static [&'static str; 4], WidgetError> {
        Ok(self
            .handle
            .call("suggestions", |state, _| state.language.suggestions())
            .await?)
    }

    /// Returns everything the widget currently shows.
    pub async fn snapshot(&self) -> Result<WidgetView, WidgetError> {
        Ok(self.handle.call("snapshot", |state, _| state.snapshot()).await?)
    }
}

impl ChatWidget {
    fn spawn_from_builder(builder: ChatWidgetBuilder) -> Self {
        let ChatWidgetBuilder {
            factory,
            credentials,
            language,
            on_event,
            on_idle,
        } = builder;

        let state = WidgetState {
            language,
            credentials: credentials.unwrap_or_else(CredentialStore::in_memory),
            factory,
            conversation: None,
            messages: vec![ChatMessage::model(language.welcome())],
            phase: Default::default(),
            prompt: Default::default(),
            in_flight: None,
            next_send_id: 1,
            on_event,
            on_idle,
        };
        Self {
            handle: Actor::spawn(state, "chat widget"),
        }
    }
}
