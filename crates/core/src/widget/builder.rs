use lumos_model::ModelProvider;

use super::{ChatWidget, WidgetEvent};
use crate::credential::CredentialStore;
use crate::language::Language;
use crate::session::SessionFactory;

/// [`ChatWidget`] builder.
pub struct ChatWidgetBuilder {
    pub(super) factory: SessionFactory,
    pub(super) credentials: Option<CredentialStore>,
    pub(super) language: Language,
    pub(super) on_event: Option<Box<dyn Fn(WidgetEvent) + Send + Sync>>,
    pub(super) on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

impl ChatWidgetBuilder {
    /// Creates a new builder with a model provider constructor.
    ///
    /// `connect` is called with the API key whenever a new conversation
    /// starts.
    #[inline]
    pub fn with_model_provider<P, F>(connect: F) -> Self
    where
        P: ModelProvider + 'static,
        F: Fn(&str) -> P + Send + Sync + 'static,
    {
        Self {
            factory: SessionFactory::new(connect),
            credentials: None,
            language: Language::default(),
            on_event: None,
            on_idle: None,
        }
    }

    /// Sets the credential store. Defaults to an empty in-memory store.
    #[inline]
    pub fn with_credential_store(mut self, store: CredentialStore) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Sets the start language.
    #[inline]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Attaches a callback to be invoked on every visible change.
    ///
    /// The callback runs on the widget's task and must not block.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(WidgetEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Attaches a callback to be invoked when a send has finished,
    /// successfully or not.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds the widget.
    ///
    /// Must be called from within a Tokio runtime.
    #[inline]
    pub fn build(self) -> ChatWidget {
        ChatWidget::spawn_from_builder(self)
    }
}
