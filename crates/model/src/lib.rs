//! A provider-neutral protocol for talking to hosted chat models.
//!
//! The chat core only ever sees the types in this crate. A provider crate
//! (Gemini, or the scripted test model) implements [`ModelProvider`] and
//! [`ModelResponse`], and maps its own failures to an [`ErrorKind`] so that
//! callers can react to them without inspecting error text.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
