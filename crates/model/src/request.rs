/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
    /// Sampling parameters for this request.
    pub generation: GenerationConfig,
}

impl ModelRequest {
    /// Returns the concatenated system instructions, if any.
    pub fn system_instruction(&self) -> Option<String> {
        let mut parts = self.messages.iter().filter_map(|msg| match msg {
            ModelMessage::System(text) => Some(text.as_str()),
            _ => None,
        });
        let first = parts.next()?;
        Some(parts.fold(first.to_owned(), |mut acc, part| {
            acc.push('\n');
            acc.push_str(part);
            acc
        }))
    }
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// A text previously generated by the model.
    Model(String),
}

/// Sampling parameters sent along with every request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Number of highest-probability tokens considered at each step.
    pub top_k: u32,
    /// Upper bound on generated tokens for one reply.
    pub max_output_tokens: u32,
}
