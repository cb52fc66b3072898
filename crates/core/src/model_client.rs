use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use lumos_model::{
    ModelProvider, ModelProviderError, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tracing::Span;

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub(crate) type FragmentResult = Result<String, Box<dyn ModelProviderError>>;
pub(crate) type BoxedFragments =
    Pin<Box<dyn Stream<Item = FragmentResult> + Send>>;
type HandlerFn = Arc<dyn Fn(ModelRequest) -> BoxedFragments + Send + Sync>;

/// A wrapper around a model provider that provides a type-erased interface
/// for the other modules.
///
/// Sending a request yields the reply as a stream of text fragments.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req| -> BoxedFragments {
            trace!("got a request: {:?}", req);
            let fut = provider.send_request(&req);
            Box::pin(Fragments::<P> {
                state: FragmentsState::Connecting(Box::pin(fut)),
                span: trace_span!("model client req"),
            })
        });
        Self { handler_fn }
    }

    /// Sends a request and returns the reply fragments.
    ///
    /// Nothing is sent before the stream is polled. Dropping the stream
    /// stops receiving further events.
    #[inline]
    pub fn stream(&self, req: ModelRequest) -> BoxedFragments {
        (self.handler_fn)(req)
    }
}

enum FragmentsState<P: ModelProvider> {
    Connecting(BoxedFuture<Result<P::Response, P::Error>>),
    Streaming(Pin<Box<P::Response>>),
    Done,
}

struct Fragments<P: ModelProvider> {
    state: FragmentsState<P>,
    span: Span,
}

impl<P: ModelProvider + 'static> Stream for Fragments<P> {
    type Item = FragmentResult;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let _enter = this.span.enter();
        loop {
            match &mut this.state {
                FragmentsState::Connecting(fut) => {
                    match ready!(fut.as_mut().poll(cx)) {
                        Ok(resp) => {
                            trace!("start receiving events");
                            this.state =
                                FragmentsState::Streaming(Box::pin(resp));
                        }
                        Err(err) => {
                            error!("got an error: {err:?}");
                            this.state = FragmentsState::Done;
                            return Poll::Ready(Some(Err(Box::new(err))));
                        }
                    }
                }
                FragmentsState::Streaming(resp) => {
                    match ready!(resp.as_mut().poll_next_event(cx)) {
                        Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                            if delta.is_empty() {
                                continue;
                            }
                            return Poll::Ready(Some(Ok(delta)));
                        }
                        Ok(Some(ModelResponseEvent::Completed(reason))) => {
                            debug!("model finished: {reason:?}");
                        }
                        Ok(None) => {
                            trace!("finished a request");
                            this.state = FragmentsState::Done;
                            return Poll::Ready(None);
                        }
                        Err(err) => {
                            error!("got an error: {err:?}");
                            this.state = FragmentsState::Done;
                            return Poll::Ready(Some(Err(Box::new(err))));
                        }
                    }
                }
                FragmentsState::Done => return Poll::Ready(None),
            }
        }
    }
}
