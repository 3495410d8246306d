//! Terminal front end for palaver.
//!
//! The pieces the `palaver-chat` binary is assembled from:
//!
//! - [`args`]: CLI argument parsing via `arrrg`
//! - [`commands`]: Slash command parsing
//! - [`render`]: Turning formatter output into terminal text

mod args;
mod commands;
mod render;

pub use args::{ChatArgs, ChatOptions};
pub use commands::{ChatCommand, ConfigField, help_text, parse_command};
pub use render::{PlainTextRenderer, Renderer, to_terminal};
