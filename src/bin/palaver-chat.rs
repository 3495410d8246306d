//! Interactive chat with an OpenAI-compatible chat-completion backend.
//!
//! # Usage
//!
//! ```bash
//! # Use ./api_configuration.yaml
//! palaver-chat
//!
//! # Use another configuration file
//! palaver-chat --config ~/.config/palaver.yaml
//!
//! # Disable colors (useful for piping output)
//! palaver-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/set url <url>`, `/set key <key>` - Configure the backend
//! - `/attach <file>` - Attach a file to the next message
//! - `/export <file>` - Export the conversation as HTML
//! - `/quit` - Exit the application
//!
//! The prompt stays live while a reply is pending, so files can be attached
//! and settings changed before the reply arrives.

use std::sync::mpsc as std_mpsc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;

use palaver::chat::{
    ChatArgs, ChatCommand, ChatOptions, ConfigField, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use palaver::{
    Completion, Config, ConfigStore, SendOutcome, SessionController, SessionState, Validation,
};

/// One result of reading the prompt.
enum Input {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

/// What woke the main loop.
enum Event {
    Input(Option<Input>),
    Reply(Option<Completion>),
    Cancel,
}

enum Flow {
    Continue,
    Quit,
}

/// Main entry point for the palaver-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("palaver-chat [OPTIONS]");
    let options = ChatOptions::from(args);
    init_tracing(options.verbose);

    let mut renderer = PlainTextRenderer::with_color(options.use_color);
    let mut session = match SessionController::open(ConfigStore::new(&options.config_path)) {
        Ok(session) => session,
        Err(err) => {
            renderer.print_error(&format!(
                "could not load {}: {err}",
                options.config_path.display()
            ));
            SessionController::new(ConfigStore::new(&options.config_path))
        }
    };
    // Edits made with /set accumulate here until they form a valid configuration.
    let mut draft = session
        .config()
        .map(|config| config.as_ref().clone())
        .unwrap_or_default();

    match (session.state(), session.config()) {
        (SessionState::Ready, Some(config)) => {
            println!("Palaver Chat (model: {})", config.model)
        }
        _ => {
            println!("Palaver Chat (not configured)");
            println!("Use /set url <url> and /set key <key> to connect to a backend.");
        }
    }
    println!("Type /help for commands, /quit to exit\n");

    let (input_tx, mut inputs) = mpsc::unbounded_channel();
    let (resume, resume_rx) = std_mpsc::channel();
    spawn_reader(input_tx, resume_rx);

    loop {
        let event = if session.state() == SessionState::AwaitingResponse {
            tokio::select! {
                completion = session.wait_for_reply() => Event::Reply(completion),
                input = inputs.recv() => Event::Input(input),
                _ = tokio::signal::ctrl_c() => Event::Cancel,
            }
        } else {
            Event::Input(inputs.recv().await)
        };

        match event {
            Event::Reply(completion) => print_completion(&mut renderer, completion),
            Event::Cancel => {
                let completion = session.cancel().await;
                print_completion(&mut renderer, completion);
            }
            Event::Input(Some(Input::Line(line))) => {
                let flow = handle_line(&line, &mut session, &mut draft, &mut renderer);
                if let Flow::Quit = flow {
                    println!("Goodbye!");
                    let _ = resume.send(false);
                    break;
                }
                let _ = resume.send(true);
            }
            Event::Input(Some(Input::Interrupted)) => {
                // Ctrl+C cancels a pending reply, otherwise it is a soft interrupt
                if session.state() == SessionState::AwaitingResponse {
                    let completion = session.cancel().await;
                    print_completion(&mut renderer, completion);
                } else {
                    println!();
                }
                let _ = resume.send(true);
            }
            Event::Input(Some(Input::Eof)) | Event::Input(None) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Event::Input(Some(Input::Failed(err))) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

/// Reads the prompt on a dedicated thread.  After each line the thread waits
/// for `resume` so that it never re-enters raw mode once the loop has quit.
fn spawn_reader(inputs: mpsc::UnboundedSender<Input>, resume: std_mpsc::Receiver<bool>) {
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(err) => {
                let _ = inputs.send(Input::Failed(err.to_string()));
                return;
            }
        };
        loop {
            let input = match rl.readline("You: ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.trim());
                    }
                    Input::Line(line)
                }
                Err(ReadlineError::Interrupted) => Input::Interrupted,
                Err(ReadlineError::Eof) => Input::Eof,
                Err(err) => Input::Failed(err.to_string()),
            };
            let last = matches!(input, Input::Eof | Input::Failed(_));
            if inputs.send(input).is_err() || last {
                return;
            }
            if !matches!(resume.recv(), Ok(true)) {
                return;
            }
        }
    });
}

fn handle_line(
    line: &str,
    session: &mut SessionController,
    draft: &mut Config,
    renderer: &mut PlainTextRenderer,
) -> Flow {
    let line = line.trim();
    if line.is_empty() && session.pending_attachment().is_none() {
        return Flow::Continue;
    }

    let Some(cmd) = parse_command(line) else {
        match session.send_message(line) {
            Ok(SendOutcome::Ignored) => {}
            Ok(SendOutcome::Dispatched(rendered)) => {
                tracing::debug!(
                    timestamp = rendered.message.timestamp(),
                    chars = rendered.message.content().chars().count(),
                    "waiting for reply"
                );
            }
            Err(err) if err.is_busy() => {
                renderer.print_error("a reply is still pending; wait for it or press Ctrl+C")
            }
            Err(err) => renderer.print_error(&err.to_string()),
        }
        return Flow::Continue;
    };

    match cmd {
        ChatCommand::Quit => return Flow::Quit,
        ChatCommand::Clear => {
            session.clear();
            renderer.print_info("Conversation cleared.");
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {}", line);
            }
        }
        ChatCommand::Attach(path) => match session.attach_file(&path) {
            Ok(attachment) => renderer.print_attachment(attachment),
            Err(err) => renderer.print_error(&err.to_string()),
        },
        ChatCommand::Detach => match session.clear_attachment() {
            Some(attachment) => {
                renderer.print_info(&format!("Detached {}.", attachment.filename()))
            }
            None => renderer.print_info("No file attached."),
        },
        ChatCommand::ShowConfig => print_config(session, draft),
        ChatCommand::Set(field, value) => {
            apply_field(draft, field, value);
            match session.reconfigure(draft.clone()) {
                Ok(validation) => {
                    print_warnings(renderer, &validation);
                    renderer.print_info(&format!(
                        "Saved {field} to {}.",
                        session.store().path().display()
                    ));
                }
                Err(err) => renderer.print_error(&err.to_string()),
            }
        }
        ChatCommand::Export(path) => match session.export_html(&path) {
            Ok(()) => renderer.print_info(&format!("Chat exported to {}", path)),
            Err(err) => renderer.print_error(&format!("Failed to export chat: {}", err)),
        },
        ChatCommand::Save(path) => match session.save_transcript(&path) {
            Ok(()) => renderer.print_info(&format!("Transcript saved to {}", path)),
            Err(err) => renderer.print_error(&format!("Failed to save transcript: {}", err)),
        },
        ChatCommand::Load(path) => match session.load_transcript(&path) {
            Ok(()) => renderer.print_info(&format!("Transcript loaded from {}", path)),
            Err(err) => renderer.print_error(&format!("Failed to load transcript: {}", err)),
        },
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
    Flow::Continue
}

fn print_completion(renderer: &mut PlainTextRenderer, completion: Option<Completion>) {
    match completion {
        Some(Completion::Replied(rendered)) => renderer.print_message(&rendered),
        Some(Completion::Failed { rendered, error }) => {
            tracing::debug!(%error, "reply failed");
            renderer.print_message(&rendered);
        }
        Some(Completion::Cancelled) => renderer.print_interrupted(),
        None => {}
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn apply_field(config: &mut Config, field: ConfigField, value: String) {
    match field {
        ConfigField::Url => config.api_url = value,
        ConfigField::Key => config.api_key = value,
        ConfigField::Model => config.model = value,
        ConfigField::SystemPrompt => config.system_prompt = value,
        ConfigField::Temperature => {
            if let Ok(temperature) = value.parse() {
                config.temperature = temperature;
            }
        }
    }
}

fn print_warnings(renderer: &mut PlainTextRenderer, validation: &Validation) {
    for warning in &validation.warnings {
        renderer.print_warning(&warning.to_string());
    }
}

fn print_config(session: &SessionController, draft: &Config) {
    println!("    Configuration ({}):", session.state());
    println!("      File: {}", session.store().path().display());
    let Some(config) = session.config() else {
        println!("      (none saved)");
        if !draft.api_url.is_empty() {
            println!("      Pending URL: {}", draft.api_url);
        }
        return;
    };
    println!("      URL: {}", config.api_url);
    println!("      Key: {}", describe_key(&config.api_key));
    println!("      Model: {}", config.model);
    println!("      Temperature: {:.2}", config.temperature);
    if config.system_prompt.is_empty() {
        println!("      System prompt: (none)");
    } else {
        println!("      System prompt: {}", config.system_prompt);
    }
    println!(
        "      Suggested models: {}",
        config.available_models.join(", ")
    );
    if let Some(attachment) = session.pending_attachment() {
        println!("      Attached: {}", attachment.filename());
    }
}

fn describe_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "(set)".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("****{tail}")
}
