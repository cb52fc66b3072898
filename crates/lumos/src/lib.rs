//! An out-of-the-box Lumos chat widget talking to Google Gemini.
//!
//! The crate includes a CLI tool for chatting in the terminal. You can also
//! use it as a library to bring the widget into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod studio;

pub use studio::{FALLBACK_KEY_VAR, StudioBuilder, default_credential_path};

/// Re-exports of [`lumos_core`] crate.
pub mod core {
    pub use lumos_core::*;
}
