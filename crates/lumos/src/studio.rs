use std::path::PathBuf;

use lumos_core::{
    ChatWidget, ChatWidgetBuilder, CredentialStore, FileBackend, Language,
    MemoryBackend, WidgetEvent,
};
use lumos_gemini_model::{GeminiConfigBuilder, GeminiProvider};
use reqwest::Client;

/// The environment variable holding the deployment-provided API key.
pub const FALLBACK_KEY_VAR: &str = "API_KEY";

/// Returns where the API key is stored by default,
/// `<config dir>/lumos/credentials.json`.
pub fn default_credential_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lumos").join("credentials.json"))
}

/// A builder for a Gemini-backed [`ChatWidget`].
///
/// The API key lives in a JSON file, see [`default_credential_path`].
/// Every conversation gets its own [`GeminiProvider`], all sharing one
/// HTTP connection pool.
pub struct StudioBuilder {
    model: Option<String>,
    base_url: Option<String>,
    credential_file: Option<PathBuf>,
    fallback_key: Option<String>,
    language: Language,
    on_event: Option<Box<dyn Fn(WidgetEvent) + Send + Sync>>,
    on_idle: Option<Box<dyn Fn() + Send + Sync>>,
}

impl Default for StudioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StudioBuilder {
    /// Creates a builder with the default model and storage location.
    pub fn new() -> Self {
        Self {
            model: None,
            base_url: None,
            credential_file: None,
            fallback_key: None,
            language: Language::default(),
            on_event: None,
            on_idle: None,
        }
    }

    /// Sets the Gemini model.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom API base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Stores the API key at `path` instead of the default location.
    #[inline]
    pub fn with_credential_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.credential_file = Some(path.into());
        self
    }

    /// Sets an API key used while none is stored. It is never persisted.
    #[inline]
    pub fn with_fallback_key(mut self, key: Option<String>) -> Self {
        self.fallback_key = key;
        self
    }

    /// Sets the start language.
    #[inline]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Attaches a callback to be invoked on every visible change.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(WidgetEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Attaches a callback to be invoked when a send has finished.
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
    pub fn build(self) -> ChatWidget {
        let Self {
            model,
            base_url,
            credential_file,
            fallback_key,
            language,
            on_event,
            on_idle,
        } = self;

        let client = Client::new();
        let connect = move |api_key: &str| {
            let mut config = GeminiConfigBuilder::with_api_key(api_key);
            if let Some(model) = &model {
                config = config.with_model(model.as_str());
            }
            if let Some(base_url) = &base_url {
                config = config.with_base_url(base_url.as_str());
            }
            GeminiProvider::with_client(client.clone(), config.build())
        };

        let store = match credential_file.or_else(default_credential_path) {
            Some(path) => {
                debug!("credential file: {}", path.display());
                CredentialStore::open(FileBackend::new(path), fallback_key)
            }
            None => {
                warn!("no config directory found, the API key won't be saved");
                CredentialStore::open(MemoryBackend::default(), fallback_key)
            }
        };

        let mut builder = ChatWidgetBuilder::with_model_provider(connect)
            .with_credential_store(store)
            .with_language(language);
        if let Some(on_event) = on_event {
            builder = builder.on_event(on_event);
        }
        if let Some(on_idle) = on_idle {
            builder = builder.on_idle(on_idle);
        }
        builder.build()
    }
}
