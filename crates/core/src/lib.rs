//! Core logic of the Lumos chat widget: the credential store, the
//! conversation factory, the message streamer and the widget that drives
//! them.
//!
//! The widget talks to the model through any [`ModelProvider`], which is
//! created per conversation from the stored API key:
//!
//! ```no_run
//! # async fn run() -> Result<(), lumos_core::WidgetError> {
//! # use lumos_core::{ChatWidgetBuilder, CredentialStore, FileBackend};
//! # fn provider(_key: &str) -> lumos_test_model::TestModelProvider {
//! #     Default::default()
//! # }
//! let widget = ChatWidgetBuilder::with_model_provider(provider)
//!     .with_credential_store(CredentialStore::open(
//!         FileBackend::new("credentials.json"),
//!         None,
//!     ))
//!     .on_event(|event| println!("{event:?}"))
//!     .build();
//! widget.submit("Was ist Dokumenten-Intelligenz?").await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ModelProvider`]: lumos_model::ModelProvider

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod credential;
mod error;
mod language;
mod model_client;
pub mod session;
pub mod streamer;
mod widget;

pub use credential::{
    Credential, CredentialBackend, CredentialError, CredentialSource,
    CredentialStore, FileBackend, MemoryBackend,
};
pub use error::{ChatError, TransportError, TransportErrorKind, WidgetError};
pub use language::{Language, ParseLanguageError};
pub use widget::{
    ChatMessage, ChatPhase, ChatWidget, ChatWidgetBuilder, CredentialPrompt,
    Role, SubmitOutcome, WidgetEvent, WidgetView,
};
