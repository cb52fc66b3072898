use serde::{Deserialize, Serialize};

/// The failure categories a preset can simulate.
///
/// This mirrors [`lumos_model::ErrorKind`] so scripts can be loaded from
/// JSON fixtures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailure {
    AuthRejected,
    RateLimitExceeded,
    Other,
}

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    /// Fails the stream after the preceding deltas were delivered.
    #[serde(rename = "fail")]
    Fail(PresetFailure),
}

/// The preset response for one user turn.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request fails before any event is produced.
    #[serde(default)]
    pub rejection: Option<PresetFailure>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejection: None,
        }
    }

    /// Creates a `PresetResponse` streaming the given fragments in order.
    pub fn with_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_events(
            fragments
                .into_iter()
                .map(|s| PresetEvent::MessageDelta(s.into()))
                .collect::<Vec<_>>(),
        )
    }

    /// Creates a `PresetResponse` whose request is refused outright.
    #[inline]
    pub fn rejected(failure: PresetFailure) -> Self {
        Self {
            events: vec![],
            rejection: Some(failure),
        }
    }
}
