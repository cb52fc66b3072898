use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The language the widget talks in.
///
/// It selects the system instruction sent to the model and every text the
/// widget shows on its own.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// German.
    #[default]
    De,
    /// English.
    En,
}

struct Texts {
    system_instruction: &'static str,
    welcome: &'static str,
    reset_greeting: &'static str,
    connection_apology: &'static str,
    key_rejected: &'static str,
    key_empty: &'static str,
    key_not_saved: &'static str,
    key_prompt: &'static str,
    input_placeholder: &'static str,
    input_placeholder_no_key: &'static str,
    suggestions: [&'static str; 4],
}

const DE: Texts = Texts {
    system_instruction: include_str!("prompts/system_de.md"),
    welcome: "Hallo! Ich bin Lumos AI, Ihr persönlicher Assistent für das \
              Local AI Studio.\n\nIch helfe Ihnen, den vollen \
              Leistungsumfang zu verstehen und führe Sie durch die \
              Installation. Womit möchten Sie beginnen?",
    reset_greeting: "Gerne. Haben Sie weitere Fragen zu unserem Angebot \
                     oder den Preisen?",
    connection_apology: "Entschuldigung, ich konnte die Verbindung nicht \
                         herstellen.",
    key_rejected: "Der API-Schlüssel wurde abgelehnt. Bitte prüfen Sie die \
                   Eingabe.",
    key_empty: "Der Schlüssel darf nicht leer sein.",
    key_not_saved: "Der Schlüssel konnte nicht gespeichert werden.",
    key_prompt: "Bitte geben Sie Ihren Google Gemini API Key ein, um den \
                 Chat zu aktivieren. Der Schlüssel wird lokal auf diesem \
                 Rechner gespeichert.",
    input_placeholder: "Fragen Sie nach dem Kreativ-Studio...",
    input_placeholder_no_key: "Bitte API Key eingeben...",
    suggestions: [
        "Was ist Dokumenten-Intelligenz?",
        "Welche KI-Modelle nutzt ihr?",
        "Wie funktioniert der Sicherheits-Browser?",
        "Angebot anfordern",
    ],
};

const EN: Texts = Texts {
    system_instruction: include_str!("prompts/system_en.md"),
    welcome: "Hi! I'm Lumos AI, your personal assistant for the Local AI \
              Studio.\n\nI can help you understand the full range of \
              features and guide you through the installation. What would \
              you like to start with?",
    reset_greeting: "Certainly. Do you have any further questions about \
                     our offer or pricing?",
    connection_apology: "I apologize, I couldn't establish a connection.",
    key_rejected: "API Key rejected. Please check your input.",
    key_empty: "Key cannot be empty.",
    key_not_saved: "The key could not be saved.",
    key_prompt: "Please enter your Google Gemini API Key to enable the \
                 chat. The key is stored locally on this machine.",
    input_placeholder: "Ask about the Creative Studio...",
    input_placeholder_no_key: "Please set API Key first...",
    suggestions: [
        "What is Document Intelligence?",
        "Which AI models do you use?",
        "How does the Security Browser work?",
        "Request quote",
    ],
};

impl Language {
    /// All supported languages.
    pub const ALL: [Language; 2] = [Language::De, Language::En];

    /// Returns the two-letter language code.
    #[inline]
    pub fn code(self) -> &'static str {
        match self {
            Language::De => "de",
            Language::En => "en",
        }
    }

    /// Returns the other language.
    #[inline]
    pub fn toggled(self) -> Self {
        match self {
            Language::De => Language::En,
            Language::En => Language::De,
        }
    }

    #[inline]
    fn texts(self) -> &'static Texts {
        match self {
            Language::De => &DE,
            Language::En => &EN,
        }
    }

    /// The system instruction a new conversation is primed with.
    #[inline]
    pub fn system_instruction(self) -> &'static str {
        self.texts().system_instruction
    }

    /// The greeting shown when the widget starts or the language changes.
    #[inline]
    pub fn welcome(self) -> &'static str {
        self.texts().welcome
    }

    /// The greeting shown after a reset.
    #[inline]
    pub fn reset_greeting(self) -> &'static str {
        self.texts().reset_greeting
    }

    /// Written into the reply when a send fails for a reason other than a
    /// rejected key.
    #[inline]
    pub fn connection_apology(self) -> &'static str {
        self.texts().connection_apology
    }

    /// Shown when the provider rejected the API key.
    #[inline]
    pub fn key_rejected(self) -> &'static str {
        self.texts().key_rejected
    }

    /// Shown when an empty API key is saved.
    #[inline]
    pub fn key_empty(self) -> &'static str {
        self.texts().key_empty
    }

    /// Shown when the API key could not be written to storage.
    #[inline]
    pub fn key_not_saved(self) -> &'static str {
        self.texts().key_not_saved
    }

    /// The explanation shown in the credential prompt.
    #[inline]
    pub fn key_prompt(self) -> &'static str {
        self.texts().key_prompt
    }

    /// The input placeholder, depending on whether a key is configured.
    #[inline]
    pub fn input_placeholder(self, has_credential: bool) -> &'static str {
        if has_credential {
            self.texts().input_placeholder
        } else {
            self.texts().input_placeholder_no_key
        }
    }

    /// Suggested questions offered below the message log.
    #[inline]
    pub fn suggestions(self) -> &'static [&'static str; 4] {
        &self.texts().suggestions
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error returned when parsing an unknown language code.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unsupported language `{0}`, expected `de` or `en`")]
pub struct ParseLanguageError(String);

impl FromStr for Language {
    type Err = ParseLanguageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("de") {
            Ok(Language::De)
        } else if s.eq_ignore_ascii_case("en") {
            Ok(Language::En)
        } else {
            Err(ParseLanguageError(s.to_owned()))
        }
    }
}
