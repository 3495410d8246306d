//! Slash command parsing for the chat application.
//!
//! Input that starts with `/` controls the session and is never sent to the
//! backend.

use std::fmt;

/// A configuration field that `/set` can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    /// Backend base URL.
    Url,
    /// API credential.
    Key,
    /// Model identifier.
    Model,
    /// System prompt.
    SystemPrompt,
    /// Sampling temperature.
    Temperature,
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigField::Url => write!(f, "url"),
            ConfigField::Key => write!(f, "key"),
            ConfigField::Model => write!(f, "model"),
            ConfigField::SystemPrompt => write!(f, "system"),
            ConfigField::Temperature => write!(f, "temperature"),
        }
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Convert a file and hold it for the next message.
    Attach(String),

    /// Drop the pending attachment.
    Detach,

    /// Show the active configuration.
    ShowConfig,

    /// Change one configuration field and save.
    Set(ConfigField, String),

    /// Write the transcript as HTML.
    Export(String),

    /// Write the transcript as JSON.
    Save(String),

    /// Replace the transcript with one read from a JSON file.
    Load(String),

    /// Start a new conversation.
    Clear,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a regular message.
///
/// # Examples
///
/// ```
/// # use palaver::chat::{parse_command, ChatCommand};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert!(parse_command("/attach notes.txt").is_some());
/// assert!(parse_command("Hello there").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "attach" => require_path(argument, "/attach", ChatCommand::Attach),
        "detach" => ChatCommand::Detach,
        "config" => ChatCommand::ShowConfig,
        "set" => parse_set_command(argument),
        "export" => require_path(argument, "/export", ChatCommand::Export),
        "save" => require_path(argument, "/save", ChatCommand::Save),
        "load" => require_path(argument, "/load", ChatCommand::Load),
        "clear" => ChatCommand::Clear,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn require_path<F>(argument: Option<&str>, name: &str, constructor: F) -> ChatCommand
where
    F: Fn(String) -> ChatCommand,
{
    match argument {
        Some(path) => constructor(path.to_string()),
        None => ChatCommand::Invalid(format!("{} requires a file path", name)),
    }
}

fn parse_set_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid(
            "/set requires a field (url, key, model, system, temperature)".to_string(),
        );
    };

    let mut parts = arg.splitn(2, ' ');
    let field = parts.next().unwrap_or_default().to_lowercase();
    let value = parts.next().map(str::trim).unwrap_or_default();
    let field = match field.as_str() {
        "url" => ConfigField::Url,
        "key" => ConfigField::Key,
        "model" => ConfigField::Model,
        "system" => ConfigField::SystemPrompt,
        "temperature" => ConfigField::Temperature,
        other => return ChatCommand::Invalid(format!("Unknown /set field: {other}")),
    };
    match field {
        // An empty system prompt is how the prompt gets cleared.
        ConfigField::SystemPrompt => {}
        ConfigField::Temperature if value.is_empty() => {
            return ChatCommand::Invalid("/set temperature requires a value".to_string());
        }
        ConfigField::Temperature if value.parse::<f64>().is_err() => {
            return ChatCommand::Invalid("/set temperature expects a number".to_string());
        }
        _ if value.is_empty() => {
            return ChatCommand::Invalid(format!("/set {field} requires a value"));
        }
        _ => {}
    }
    ChatCommand::Set(field, value.to_string())
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /attach <file>         Attach a file to the next message
  /detach                Drop the pending attachment
  /config                Show the current configuration
  /set url <url>         Set the backend base URL
  /set key <key>         Set the API key
  /set model <name>      Set the model
  /set system [prompt]   Set the system prompt (no argument clears it)
  /set temperature <v>   Set the temperature 0.0-2.0
  /export <file>         Export the conversation as HTML
  /save <file>           Save the conversation as JSON
  /load <file>           Load a conversation from JSON
  /clear                 Start a new conversation
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl+C while waiting for a reply to cancel it."#
}
