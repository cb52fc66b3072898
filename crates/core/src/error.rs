use std::error::Error as StdError;
use std::fmt::{self, Display};

use lumos_actor::ActorDeadError;
use lumos_model::ModelProviderError;
use thiserror::Error;

use crate::credential::CredentialError;

/// Errors from creating a conversation or sending a message.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A send was attempted without a credential.
    #[error("no API key is configured")]
    AuthConfiguration,
    /// The provider call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Broad category of a [`TransportError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The provider refused the credential.
    AuthRejected,
    /// Anything else: network, quota, malformed replies.
    Other,
}

/// A provider call that could not be completed.
///
/// The kind comes from the provider's structured error classification.
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: Box<dyn ModelProviderError>,
}

impl TransportError {
    pub(crate) fn from_provider(source: Box<dyn ModelProviderError>) -> Self {
        let kind = if source.kind().is_auth_rejected() {
            TransportErrorKind::AuthRejected
        } else {
            TransportErrorKind::Other
        };
        Self { kind, source }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Returns `true` if the provider rejected the credential.
    #[inline]
    pub fn is_auth_rejected(&self) -> bool {
        self.kind == TransportErrorKind::AuthRejected
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model request failed: {}", self.source)
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.source)
    }
}

/// Errors returned by [`ChatWidget`](crate::ChatWidget) operations.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// The widget's event loop is gone.
    #[error("the chat widget has stopped")]
    Closed,
    /// The credential could not be saved.
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl From<ActorDeadError> for WidgetError {
    #[inline]
    fn from(_: ActorDeadError) -> Self {
        WidgetError::Closed
    }
}
