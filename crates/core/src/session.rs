//! Conversations and the factory that creates them.

use std::fmt::{self, Debug};
use std::sync::Arc;

use lumos_model::{GenerationConfig, ModelMessage, ModelProvider, ModelRequest};

use crate::credential::Credential;
use crate::error::ChatError;
use crate::language::Language;
use crate::model_client::ModelClient;

/// Sampling parameters used for every conversation.
pub const GENERATION: GenerationConfig = GenerationConfig {
    temperature: 0.7,
    top_k: 40,
    max_output_tokens: 800,
};

type ConnectFn = Arc<dyn Fn(&Credential) -> ModelClient + Send + Sync>;

/// Creates [`Conversation`]s for a language and a credential.
///
/// Creating a conversation never touches the network. The provider
/// constructor is called once per conversation with the credential's key.
#[derive(Clone)]
pub struct SessionFactory {
    connect: ConnectFn,
    next_id: u64,
}

impl SessionFactory {
    /// Creates a factory from a provider constructor.
    pub fn new<P, F>(connect: F) -> Self
    where
        P: ModelProvider + 'static,
        F: Fn(&str) -> P + Send + Sync + 'static,
    {
        Self {
            connect: Arc::new(move |credential: &Credential| {
                ModelClient::new(connect(credential.expose()))
            }),
            next_id: 1,
        }
    }

    /// Creates a conversation primed with the language's system
    /// instruction.
    pub fn create(
        &mut self,
        language: Language,
        credential: Option<&Credential>,
    ) -> Result<Conversation, ChatError> {
        let Some(credential) = credential else {
            return Err(ChatError::AuthConfiguration);
        };
        let id = self.next_id;
        self.next_id += 1;
        debug!("creating conversation {id} ({language})");

        Ok(Conversation {
            id,
            language,
            client: (self.connect)(credential),
            history: vec![],
        })
    }
}

impl Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

/// A chat session bound to one language and one credential.
///
/// It owns the turns exchanged so far, which are sent along with every
/// new message.
#[derive(Clone)]
pub struct Conversation {
    id: u64,
    language: Language,
    client: ModelClient,
    history: Vec<ModelMessage>,
}

impl Conversation {
    /// Returns the id of this conversation, unique per factory.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the language this conversation was created for.
    #[inline]
    pub fn language(&self) -> Language {
        self.language
    }

    /// Returns the number of recorded turns.
    #[inline]
    pub fn turns(&self) -> usize {
        self.history.len() / 2
    }

    /// Records a completed exchange.
    pub fn record_turn(&mut self, user_text: String, reply: String) {
        self.history.push(ModelMessage::User(user_text));
        self.history.push(ModelMessage::Model(reply));
    }

    #[inline]
    pub(crate) fn client(&self) -> &ModelClient {
        &self.client
    }

    pub(crate) fn build_request(&self, user_text: &str) -> ModelRequest {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ModelMessage::System(
            self.language.system_instruction().to_owned(),
        ));
        messages.extend(self.history.iter().cloned());
        messages.push(ModelMessage::User(user_text.to_owned()));
        ModelRequest {
            messages,
            generation: GENERATION,
        }
    }
}

impl Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("language", &self.language)
            .field("turns", &self.turns())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use lumos_test_model::TestModelProvider;

    use super::*;

    #[test]
    fn test_create_requires_credential() {
        let mut factory =
            SessionFactory::new(|_| TestModelProvider::default());
        let err = factory.create(Language::De, None).unwrap_err();
        assert!(matches!(err, ChatError::AuthConfiguration));
    }

    #[test]
    fn test_create_binds_credential_and_language() {
        let keys = Arc::new(Mutex::new(vec![]));
        let mut factory = SessionFactory::new({
            let keys = Arc::clone(&keys);
            move |key: &str| {
                keys.lock().unwrap().push(key.to_owned());
                TestModelProvider::default()
            }
        });

        let credential = Credential::new("key-1").unwrap();
        let first = factory.create(Language::En, Some(&credential)).unwrap();
        let second = factory.create(Language::De, Some(&credential)).unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(first.language(), Language::En);
        assert_eq!(*keys.lock().unwrap(), ["key-1", "key-1"]);

        let req = first.build_request("Hello");
        assert_eq!(req.generation, GENERATION);
        assert_eq!(
            req.messages,
            [
                ModelMessage::System(
                    Language::En.system_instruction().to_owned()
                ),
                ModelMessage::User("Hello".to_owned()),
            ]
        );
    }

    #[test]
    fn test_history() {
        let mut factory =
            SessionFactory::new(|_| TestModelProvider::default());
        let credential = Credential::new("key").unwrap();
        let mut conversation =
            factory.create(Language::De, Some(&credential)).unwrap();
        conversation.record_turn("Hallo".to_owned(), "Guten Tag!".to_owned());
        assert_eq!(conversation.turns(), 1);

        let req = conversation.build_request("Preise?");
        assert_eq!(
            &req.messages[1..],
            [
                ModelMessage::User("Hallo".to_owned()),
                ModelMessage::Model("Guten Tag!".to_owned()),
                ModelMessage::User("Preise?".to_owned()),
            ]
        );
    }
}
