//! Command-line options for the chat application.

use std::path::PathBuf;

use arrrg_derive::CommandLine;

use crate::config::DEFAULT_CONFIG_PATH;

/// Command-line arguments for the palaver-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Path of the backend configuration file.
    #[arrrg(optional, "Configuration file (default: api_configuration.yaml)", "PATH")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Log debug output to stderr.
    #[arrrg(flag, "Enable debug logging on stderr")]
    pub verbose: bool,
}

/// Resolved options for a chat run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOptions {
    /// Where the backend configuration is loaded from and saved to.
    pub config_path: PathBuf,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Whether debug logging is enabled.
    pub verbose: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            use_color: true,
            verbose: false,
        }
    }
}

impl From<ChatArgs> for ChatOptions {
    fn from(args: ChatArgs) -> Self {
        ChatOptions {
            config_path: args
                .config
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            use_color: !args.no_color,
            verbose: args.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_default_args() {
        let options = ChatOptions::from(ChatArgs::default());
        assert_eq!(options, ChatOptions::default());
        assert_eq!(options.config_path, PathBuf::from("api_configuration.yaml"));
        assert!(options.use_color);
        assert!(!options.verbose);
    }

    #[test]
    fn options_from_custom_args() {
        let args = ChatArgs {
            config: Some("/etc/palaver.yaml".to_string()),
            no_color: true,
            verbose: true,
        };
        let options = ChatOptions::from(args);
        assert_eq!(options.config_path, PathBuf::from("/etc/palaver.yaml"));
        assert!(!options.use_color);
        assert!(options.verbose);
    }
}
