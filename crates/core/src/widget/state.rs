use futures_util::StreamExt;
use lumos_actor::{Actor, Message};
use tracing::Instrument;

use super::{
    ChatMessage, ChatPhase, CredentialPrompt, SubmitOutcome, WidgetEvent,
    WidgetState, WidgetView,
};
use crate::credential::{Credential, CredentialError};
use crate::error::TransportError;
use crate::language::Language;
use crate::streamer::{self, TurnStream};

/// The send currently streaming in.
#[derive(Debug)]
pub(super) struct InFlight {
    send_id: u64,
    conversation_id: u64,
    message_id: String,
    user_text: String,
    reply: String,
}

impl WidgetState {
    pub(super) fn submit(
        &mut self,
        text: String,
        handle: &Actor<Self>,
    ) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Empty;
        }
        if let Some(in_flight) = &self.in_flight {
            debug!("send {} is still in flight, rejecting", in_flight.send_id);
            return SubmitOutcome::Busy;
        }
        if self.credentials.get().is_none() {
            info!("no API key configured, asking for one");
            self.set_phase(ChatPhase::AwaitingKey);
            self.set_prompt(true, None);
            return SubmitOutcome::NeedsCredential;
        }

        // Conversations are created lazily and live until the language or
        // the credential changes.
        let conversation = match self.conversation.take() {
            Some(conversation) => conversation,
            None => match self
                .factory
                .create(self.language, self.credentials.get())
            {
                Ok(conversation) => conversation,
                Err(err) => {
                    warn!("cannot start a conversation: {err}");
                    self.set_phase(ChatPhase::AwaitingKey);
                    self.set_prompt(true, None);
                    return SubmitOutcome::NeedsCredential;
                }
            },
        };
        let stream = streamer::send_message(&conversation, text);
        let conversation_id = conversation.id();
        self.conversation = Some(conversation);

        let user_text = text.to_owned();
        self.append(ChatMessage::user(user_text.clone()));
        let placeholder = ChatMessage::placeholder();
        let message_id = placeholder.id.clone();
        self.append(placeholder);

        let send_id = self.next_send_id;
        self.next_send_id += 1;
        self.in_flight = Some(InFlight {
            send_id,
            conversation_id,
            message_id,
            user_text,
            reply: String::new(),
        });
        self.set_phase(ChatPhase::Sending);

        tokio::spawn(
            consume_stream(stream, send_id, handle.clone())
                .instrument(debug_span!("send", send_id)),
        );
        SubmitOutcome::Started
    }

    pub(super) fn reset(&mut self) -> bool {
        if self.credentials.get().is_none() {
            debug!("ignoring reset without an API key");
            return false;
        }
        self.conversation = None;
        self.replace_log(self.language.reset_greeting());
        true
    }

    pub(super) fn set_language(&mut self, language: Language) -> bool {
        if self.language == language {
            return false;
        }
        info!("switching language to {language}");
        self.language = language;
        self.conversation = None;
        self.replace_log(language.welcome());
        true
    }

    pub(super) fn save_credential(
        &mut self,
        value: &str,
    ) -> Result<(), CredentialError> {
        if let Err(err) = self.credentials.set(value) {
            let text = match &err {
                CredentialError::Validation => self.language.key_empty(),
                CredentialError::Storage(_) => {
                    error!("{err}");
                    self.language.key_not_saved()
                }
            };
            self.set_prompt(true, Some(text));
            return Err(err);
        }

        info!("API key saved");
        if self.conversation.take().is_some() {
            debug!("conversation discarded after the API key changed");
        }
        self.set_prompt(false, None);
        if self.phase == ChatPhase::AwaitingKey {
            self.set_phase(ChatPhase::Idle);
        }
        Ok(())
    }

    pub(super) fn open_credential_prompt(&mut self) {
        self.set_prompt(true, None);
    }

    pub(super) fn dismiss_credential_prompt(&mut self) {
        self.set_prompt(false, None);
        if self.phase == ChatPhase::AwaitingKey {
            self.set_phase(ChatPhase::Idle);
        }
    }

    pub(super) fn snapshot(&self) -> WidgetView {
        let credential = self.credentials.get();
        WidgetView {
            language: self.language,
            phase: self.phase,
            messages: self.messages.clone(),
            credential_hint: credential.map(Credential::masked),
            credential_source: self.credentials.source(),
            prompt: self.prompt.clone(),
            submit_enabled: credential.is_some() && self.in_flight.is_none(),
            input_placeholder: self
                .language
                .input_placeholder(credential.is_some()),
        }
    }

    fn on_fragment(&mut self, send_id: u64, fragment: String) {
        let Some(in_flight) =
            self.in_flight.as_mut().filter(|f| f.send_id == send_id)
        else {
            trace!("dropping a fragment of send {send_id}");
            return;
        };
        in_flight.reply.push_str(&fragment);
        let text = in_flight.reply.clone();
        let message_id = in_flight.message_id.clone();

        // The placeholder is gone if the log was replaced meanwhile.
        if !self.messages.iter().any(|m| m.id == message_id) {
            trace!("send {send_id} is detached from the log");
            return;
        }
        self.set_phase(ChatPhase::Streaming);
        self.update_message(&message_id, text, true);
    }

    fn on_finished(
        &mut self,
        send_id: u64,
        result: Result<(), TransportError>,
    ) {
        let Some(in_flight) =
            self.in_flight.take_if(|f| f.send_id == send_id)
        else {
            warn!("got a finish notification for unknown send {send_id}");
            return;
        };
        let InFlight {
            conversation_id,
            message_id,
            user_text,
            reply,
            ..
        } = in_flight;

        match result {
            Ok(()) => {
                debug!("send {send_id} completed, {} bytes", reply.len());
                match &mut self.conversation {
                    Some(conversation)
                        if conversation.id() == conversation_id
                            && !reply.is_empty() =>
                    {
                        conversation.record_turn(user_text, reply.clone());
                    }
                    _ => {
                        debug!("not recording the turn of send {send_id}");
                    }
                }
                self.update_message(&message_id, reply, false);
                self.set_phase(ChatPhase::Idle);
            }
            Err(err) => {
                let text = if err.is_auth_rejected() {
                    warn!("send {send_id} failed, API key rejected: {err}");
                    let text = self.language.key_rejected();
                    self.set_prompt(true, Some(text));
                    text
                } else {
                    error!("send {send_id} failed: {err}");
                    self.language.connection_apology()
                };
                self.update_message(&message_id, text.to_owned(), false);
                self.set_phase(ChatPhase::Failed);
                self.set_phase(ChatPhase::Idle);
            }
        }

        if let Some(on_idle) = &self.on_idle {
            on_idle();
        }
    }

    #[inline]
    fn emit(&self, event: WidgetEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }

    fn set_phase(&mut self, phase: ChatPhase) {
        if self.phase == phase {
            return;
        }
        trace!("phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.emit(WidgetEvent::PhaseChanged(phase));
    }

    fn set_prompt(&mut self, open: bool, error: Option<&str>) {
        let prompt = CredentialPrompt {
            open,
            error: error.map(ToOwned::to_owned),
        };
        if self.prompt == prompt {
            return;
        }
        self.prompt = prompt.clone();
        self.emit(WidgetEvent::PromptChanged(prompt));
    }

    fn append(&mut self, message: ChatMessage) {
        self.messages.push(message.clone());
        self.emit(WidgetEvent::MessageAppended(message));
    }

    fn replace_log(&mut self, greeting: &str) {
        self.messages = vec![ChatMessage::model(greeting)];
        self.emit(WidgetEvent::LogReplaced(self.messages.clone()));
    }

    fn update_message(&mut self, id: &str, text: String, is_streaming: bool) {
        let Some(message) = self.messages.iter_mut().rev().find(|m| m.id == id)
        else {
            return;
        };
        message.text = text;
        message.is_streaming = is_streaming;
        let message = message.clone();
        self.emit(WidgetEvent::MessageUpdated(message));
    }
}

async fn consume_stream(
    mut stream: TurnStream,
    send_id: u64,
    handle: Actor<WidgetState>,
) {
    let result = loop {
        match stream.next().await {
            Some(Ok(fragment)) => {
                let msg = FragmentReceived { send_id, fragment };
                if handle.send(msg).is_err() {
                    debug!("the widget has stopped, abandoning the reply");
                    return;
                }
            }
            Some(Err(err)) => break Err(err),
            None => break Ok(()),
        }
    };
    handle.send(StreamFinished { send_id, result }).ok();
}

#[derive(Debug)]
struct FragmentReceived {
    send_id: u64,
    fragment: String,
}

impl Message<WidgetState> for FragmentReceived {
    #[inline]
    fn handle(self, state: &mut WidgetState, _handle: &Actor<WidgetState>) {
        state.on_fragment(self.send_id, self.fragment);
    }
}

#[derive(Debug)]
struct StreamFinished {
    send_id: u64,
    result: Result<(), TransportError>,
}

impl Message<WidgetState> for StreamFinished {
    #[inline]
    fn handle(self, state: &mut WidgetState, _handle: &Actor<WidgetState>) {
        state.on_finished(self.send_id, self.result);
    }
}
