//! # AI Assistant Module
//!
//! Relays free-form chat text to one of several hosted language models.
//!
//! ## Contained Modules:
//!
//! - **`provider`**: the `Provider` selection and its per-provider defaults
//!   (key variable, model, base URL).
//! - **`relay`**: the `Ask` capability and `Assistant`, which implements it over
//!   the shared `ApiClient`.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// AI backend selection.
pub mod provider;
/// Prompt relay over HTTP.
pub mod relay;

pub use provider::Provider;
pub use relay::{reply_text, Ask, Assistant, AssistantConfig, AssistantError, DEFAULT_ASK_TIMEOUT};
