//! A local fake model for testing purpose.

#[macro_use]
extern crate tracing;

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use lumos_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<PresetFailure> for Error {
    fn from(failure: PresetFailure) -> Self {
        let (message, kind) = match failure {
            PresetFailure::AuthRejected => {
                ("API key not valid", ErrorKind::AuthRejected)
            }
            PresetFailure::RateLimitExceeded => {
                ("quota exceeded", ErrorKind::RateLimitExceeded)
            }
            PresetFailure::Other => ("connection reset", ErrorKind::Other),
        };
        Self { message, kind }
    }
}

pub struct TestModelResponse {
    events: Vec<PresetEvent>,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;

            let idx = this.event_idx;
            this.event_idx += 1;
            if let Some(event) = this.events.get(idx) {
                return match event {
                    PresetEvent::MessageDelta(msg) => Poll::Ready(Ok(Some(
                        ModelResponseEvent::MessageDelta(msg.clone()),
                    ))),
                    PresetEvent::Fail(failure) => {
                        // Nothing follows a mid-stream failure.
                        this.event_idx = usize::MAX;
                        Poll::Ready(Err((*failure).into()))
                    }
                };
            } else if idx == this.events.len() {
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    ModelFinishReason::Stop,
                ))));
            } else {
                // In case this method is called after completion.
                this.event_idx = usize::MAX;
                return Poll::Ready(Ok(None));
            }
        }
        if this.event_idx == usize::MAX {
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

#[derive(Default)]
struct Inner {
    script: VecDeque<PresetResponse>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Responses are consumed in the order they were added: the n-th request
/// sent through any clone of this provider gets the n-th preset. If the
/// script runs out, the request fails with [`ErrorKind::Other`].
///
/// Every request is recorded and can be inspected with
/// [`TestModelProvider::requests`].
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    inner: Arc<Mutex<Inner>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().script.push_back(preset);
    }

    /// Sets the delay before each event. Defaults to 1ms.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, oldest first.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the script from others.
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let mut inner = self.lock();
        inner.requests.push(req.clone());
        let result = match inner.script.pop_front() {
            None => {
                warn!("test script exhausted");
                Err(Error {
                    message: "no enough steps",
                    kind: ErrorKind::Other,
                })
            }
            Some(PresetResponse {
                rejection: Some(failure),
                ..
            }) => Err(failure.into()),
            Some(PresetResponse { events, .. }) => Ok(TestModelResponse {
                events,
                event_idx: 0,
                delay: self.delay.unwrap_or(Duration::from_millis(1)),
                sleep: None,
            }),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use lumos_model::{GenerationConfig, ModelMessage};

    use super::*;

    fn request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User(text.to_owned())],
            generation: GenerationConfig {
                temperature: 0.7,
                top_k: 40,
                max_output_tokens: 800,
            },
        }
    }

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Result<(), Error>) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        loop {
            match poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await {
                Ok(Some(ModelResponseEvent::MessageDelta(delta))) => {
                    msg.push_str(&delta);
                }
                Ok(Some(ModelResponseEvent::Completed(_))) => {}
                Ok(None) => return (msg, Ok(())),
                Err(err) => return (msg, Err(err)),
            }
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_fragments([
            "Hello, ", "world!",
        ]));
        provider.add_response(PresetResponse::with_fragments([
            "Sure, ",
            "let me take a ",
            "look.",
        ]));

        let resp = provider.send_request(&request("Hi")).await.unwrap();
        let (msg, result) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert!(result.is_ok());

        let resp = provider.send_request(&request("Look")).await.unwrap();
        let (msg, _) = collect_response(resp).await;
        assert_eq!(msg, "Sure, let me take a look.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1], request("Look"));
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::rejected(
            PresetFailure::AuthRejected,
        ));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Partial".to_owned()),
            PresetEvent::Fail(PresetFailure::Other),
        ]));

        let err = provider.send_request(&request("Hi")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AuthRejected);

        let resp = provider.send_request(&request("Hi")).await.unwrap();
        let (msg, result) = collect_response(resp).await;
        assert_eq!(msg, "Partial");
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Other);

        // The script is exhausted now.
        let err = provider.send_request(&request("Hi")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
