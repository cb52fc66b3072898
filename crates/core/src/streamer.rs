//! Streaming a single turn.

use std::fmt::{self, Debug};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use futures_util::stream::FusedStream;

use crate::error::TransportError;
use crate::model_client::BoxedFragments;
use crate::session::Conversation;

/// Sends `user_text` through `conversation` and returns the reply as a
/// stream of text fragments.
///
/// The request carries the conversation's system instruction and recorded
/// history. The turn is not recorded by this function, see
/// [`Conversation::record_turn`].
pub fn send_message(conversation: &Conversation, user_text: &str) -> TurnStream {
    let req = conversation.build_request(user_text);
    trace!(
        "sending message in conversation {} with {} prior turns",
        conversation.id(),
        conversation.turns()
    );
    TurnStream {
        inner: Some(conversation.client().stream(req)),
    }
}

/// The fragments of one reply, in order.
///
/// Once the stream has ended or yielded an error it only yields `None`.
/// Fragments yielded before an error stay valid.
pub struct TurnStream {
    inner: Option<BoxedFragments>,
}

impl Stream for TurnStream {
    type Item = Result<String, TransportError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = &mut this.inner else {
            return Poll::Ready(None);
        };
        match ready!(inner.as_mut().poll_next(cx)) {
            Some(Ok(fragment)) => Poll::Ready(Some(Ok(fragment))),
            Some(Err(err)) => {
                this.inner = None;
                Poll::Ready(Some(Err(TransportError::from_provider(err))))
            }
            None => {
                this.inner = None;
                Poll::Ready(None)
            }
        }
    }
}

impl FusedStream for TurnStream {
    #[inline]
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl Debug for TurnStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnStream")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use lumos_model::ModelMessage;
    use lumos_test_model::{
        PresetEvent, PresetFailure, PresetResponse, TestModelProvider,
    };

    use super::*;
    use crate::credential::Credential;
    use crate::error::TransportErrorKind;
    use crate::language::Language;
    use crate::session::SessionFactory;

    fn conversation(provider: &TestModelProvider) -> Conversation {
        let provider = provider.clone();
        let mut factory = SessionFactory::new(move |_| provider.clone());
        let credential = Credential::new("key").unwrap();
        factory.create(Language::En, Some(&credential)).unwrap()
    }

    #[tokio::test]
    async fn test_fragments_in_order() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_fragments(["Hi", " there"]));
        let conversation = conversation(&provider);

        let mut stream = send_message(&conversation, "Hello");
        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            reply.push_str(&fragment.unwrap());
        }
        assert_eq!(reply, "Hi there");
        assert!(stream.is_terminated());
        assert!(stream.next().await.is_none());

        let requests = provider.requests();
        assert_eq!(
            requests[0].messages.last(),
            Some(&ModelMessage::User("Hello".to_owned()))
        );
    }

    #[tokio::test]
    async fn test_error_ends_stream() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Partial".to_owned()),
            PresetEvent::Fail(PresetFailure::RateLimitExceeded),
        ]));
        provider.add_response(PresetResponse::rejected(
            PresetFailure::AuthRejected,
        ));
        let conversation = conversation(&provider);

        let mut stream = send_message(&conversation, "Hello");
        assert_eq!(stream.next().await.unwrap().unwrap(), "Partial");
        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::Other);
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());

        let mut stream = send_message(&conversation, "Hello");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.is_auth_rejected());
        assert!(stream.is_terminated());
    }
}
