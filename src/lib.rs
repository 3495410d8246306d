//! Conversational client for OpenAI-compatible chat-completion backends.
//!
//! The crate is organized leaf-first:
//!
//! - [`config`]: persisted backend configuration and its validation.
//! - [`markup`]: the `*strong*` / `_italic_` / `~strike~` renderer.
//! - [`transcript`]: the ordered message log with JSON and HTML export.
//! - [`client`]: single-turn chat-completion requests.
//! - [`convert`]: turning attached files into message text.
//! - [`session`]: the controller that ties the above together per user action.
//!
//! The [`chat`] module holds the pieces of the `palaver-chat` terminal front end.

// Public modules
pub mod chat;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod markup;
pub mod observability;
pub mod session;
pub mod transcript;
pub mod utils;

// Re-exports
pub use client::{ChatClient, CompletionRequest};
pub use config::{Config, ConfigStore, ConfigWarning, Validation};
pub use convert::{Attachment, Converter, TextFileConverter};
pub use error::{ApiError, ConfigError, ConversionError, Error, ImportError, Result};
pub use markup::MarkupFormatter;
pub use observability::register_biometrics;
pub use session::{Completion, RenderedMessage, SendOutcome, SessionController, SessionState};
pub use transcript::{Message, Sender, Transcript};
