//! The ordered message log of a session and its export formats.
//!
//! JSON transcripts have the shape
//!
//! ```json
//! {"chat_log": [["You", "hello", "2024-01-01 12:00:00"], ["AI", "hi", "2024-01-01 12:00:02"]]}
//! ```
//!
//! HTML exports are standalone documents with one `<div>` per message.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::write_atomically;
use crate::error::{Error, ImportError, Result};
use crate::markup::{MarkupFormatter, escape_html};
use crate::utils::time::now_timestamp;

/// Label written for user messages.
pub const USER_LABEL: &str = "You";
/// Label written for assistant replies.
pub const ASSISTANT_LABEL: &str = "AI";
/// Label written for failed assistant replies.
pub const ERROR_LABEL: &str = "Error";
/// Label written for system notices.
pub const SYSTEM_LABEL: &str = "System";

/// Document title used by [`Transcript::export_html`].
const HTML_TITLE: &str = "Chat Transcript";

const HTML_STYLE: &str = r#"
    body {
        font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
        background-color: #e5ddd5;
        color: #000;
        padding: 20px;
    }
    .message {
        background-color: #dcf8c6;
        border-radius: 10px;
        padding: 10px;
        margin: 5px 0;
        max-width: 70%;
        word-wrap: break-word;
    }
    .user-message {
        background-color: lightgreen;
        text-align: right;
    }
    .ai-message {
        background-color: lightblue;
        text-align: left;
    }
    .error-message {
        background-color: lightcoral;
        text-align: left;
    }
    b { font-weight: bold; }
    i { font-style: italic; }
    s { text-decoration: line-through; }
"#;

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sender {
    /// The person driving the session.
    User,
    /// The chat-completion backend.
    Assistant,
    /// Notices that came from neither party.
    System,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "{USER_LABEL}"),
            Sender::Assistant => write!(f, "{ASSISTANT_LABEL}"),
            Sender::System => write!(f, "{SYSTEM_LABEL}"),
        }
    }
}

/// One entry in the transcript.  Messages are immutable once appended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    sender: Sender,
    content: String,
    timestamp: String,
    error: bool,
}

impl Message {
    /// Creates a message with an explicit timestamp.
    pub fn new(sender: Sender, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            timestamp: timestamp.into(),
            error: false,
        }
    }

    /// A user message stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content, now_timestamp())
    }

    /// An assistant reply stamped with the current time.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content, now_timestamp())
    }

    /// A failed assistant reply stamped with the current time.
    ///
    /// The content is prefixed with `"Error: "`.
    pub fn assistant_error(detail: impl fmt::Display) -> Self {
        Self {
            error: true,
            ..Self::new(Sender::Assistant, format!("Error: {detail}"), now_timestamp())
        }
    }

    /// Marks the message as a failed reply.  Only assistant messages carry
    /// the flag; for any other sender the message is returned unchanged.
    pub fn flagged_as_error(mut self) -> Self {
        self.error = self.sender == Sender::Assistant;
        self
    }

    /// Who authored the message.
    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// The message text, including any folded attachment.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// When the message was appended, formatted `YYYY-MM-DD HH:MM:SS`.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Returns true if this records a failed request.
    pub fn is_error(&self) -> bool {
        self.error
    }

    /// The sender label used in serialized transcripts.
    pub fn label(&self) -> &'static str {
        match (self.sender, self.error) {
            (Sender::User, _) => USER_LABEL,
            (Sender::Assistant, false) => ASSISTANT_LABEL,
            (Sender::Assistant, true) => ERROR_LABEL,
            (Sender::System, _) => SYSTEM_LABEL,
        }
    }

    /// CSS class used in HTML exports.
    pub fn css_class(&self) -> &'static str {
        match (self.sender, self.error) {
            (Sender::User, _) => "user-message",
            (Sender::Assistant, false) => "ai-message",
            _ => "error-message",
        }
    }

    fn from_record(record: Record) -> Self {
        let Record(label, content, timestamp) = record;
        let (sender, error) = match label.as_str() {
            USER_LABEL => (Sender::User, false),
            ASSISTANT_LABEL => (Sender::Assistant, false),
            ERROR_LABEL => (Sender::Assistant, true),
            _ => (Sender::System, false),
        };
        Self {
            sender,
            content,
            timestamp,
            error,
        }
    }

    fn to_record(&self) -> Record {
        Record(
            self.label().to_string(),
            self.content.clone(),
            self.timestamp.clone(),
        )
    }
}

/// `[sender, content, timestamp]`; serde rejects any other arity.
#[derive(Serialize, Deserialize)]
struct Record(String, String, String);

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    chat_log: Vec<Record>,
}

/// Chronological, append-only log of a session's messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the end.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if there are no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Removes every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Serializes the transcript as `{"chat_log": [[sender, content, timestamp], ...]}`.
    pub fn export_json(&self) -> Result<Vec<u8>> {
        let file = TranscriptFile {
            chat_log: self.messages.iter().map(Message::to_record).collect(),
        };
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        file.serialize(&mut serializer)?;
        Ok(out)
    }

    /// Parses a transcript produced by [`Transcript::export_json`].
    ///
    /// A missing `chat_log` key or a record that is not exactly three strings
    /// is [`ImportError::Malformed`].
    pub fn import_json(bytes: &[u8]) -> std::result::Result<Self, ImportError> {
        let file: TranscriptFile =
            serde_json::from_slice(bytes).map_err(|err| ImportError::malformed(err.to_string()))?;
        Ok(Self {
            messages: file.chat_log.into_iter().map(Message::from_record).collect(),
        })
    }

    /// Renders the transcript as a standalone HTML document.
    pub fn export_html(&self, formatter: &MarkupFormatter) -> String {
        let mut body = String::new();
        for message in &self.messages {
            body.push_str(&format!(
                "<div class='message {}'><p>{} <b>{}:</b></p><p>{}</p></div>\n",
                message.css_class(),
                escape_html(message.timestamp()),
                escape_html(message.label()),
                formatter.render(message.content()),
            ));
        }
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
             <title>{HTML_TITLE}</title>\n<style>{HTML_STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n"
        )
    }

    /// Writes [`Transcript::export_json`] output to `path`.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.export_json()?;
        write_atomically(path.as_ref(), &bytes)
            .map_err(|err| Error::io("failed to write transcript file", err))
    }

    /// Reads a JSON transcript from `path`.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes =
            fs::read(path.as_ref()).map_err(|err| Error::io("failed to open transcript file", err))?;
        Ok(Self::import_json(&bytes)?)
    }

    /// Writes [`Transcript::export_html`] output to `path`.
    pub fn save_html<P: AsRef<Path>>(&self, path: P, formatter: &MarkupFormatter) -> Result<()> {
        let html = self.export_html(formatter);
        write_atomically(path.as_ref(), html.as_bytes())
            .map_err(|err| Error::io("failed to write HTML export", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.append(Message::new(Sender::User, "hello *there*", "2024-01-01 12:00:00"));
        transcript.append(Message::new(Sender::Assistant, "hi\nyou", "2024-01-01 12:00:02"));
        transcript.append(
            Message::new(Sender::Assistant, "Error: boom", "2024-01-01 12:00:05")
                .flagged_as_error(),
        );
        transcript.append(Message::new(Sender::System, "note", "2024-01-01 12:00:06"));
        transcript
    }

    #[test]
    fn append_preserves_order() {
        let transcript = sample();
        let senders: Vec<_> = transcript.messages().iter().map(|m| m.sender()).collect();
        assert_eq!(
            senders,
            vec![Sender::User, Sender::Assistant, Sender::Assistant, Sender::System]
        );
        assert_eq!(transcript.len(), 4);
        assert!(transcript.last().unwrap().sender() == Sender::System);
    }

    #[test]
    fn export_shape() {
        let json = sample().export_json().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        let log = value["chat_log"].as_array().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(
            log[0],
            serde_json::json!(["You", "hello *there*", "2024-01-01 12:00:00"])
        );
        assert_eq!(log[1][0], "AI");
        assert_eq!(log[2][0], "Error");
        assert_eq!(log[3][0], "System");
    }

    #[test]
    fn json_round_trip() {
        let transcript = sample();
        let restored = Transcript::import_json(&transcript.export_json().unwrap()).unwrap();
        assert_eq!(restored, transcript);

        let empty = Transcript::new();
        assert_eq!(
            Transcript::import_json(&empty.export_json().unwrap()).unwrap(),
            empty
        );
    }

    #[test]
    fn json_round_trip_every_sender_and_flag() {
        let mut transcript = Transcript::new();
        for sender in [Sender::User, Sender::Assistant, Sender::System] {
            for flagged in [false, true] {
                let content = format!("{sender} {flagged}");
                let message = Message::new(sender, content, "2024-01-01 12:00:00");
                transcript.append(if flagged {
                    message.flagged_as_error()
                } else {
                    message
                });
            }
        }
        let restored = Transcript::import_json(&transcript.export_json().unwrap()).unwrap();
        assert_eq!(restored, transcript);
    }

    #[test]
    fn only_assistant_messages_take_the_error_flag() {
        let user = Message::new(Sender::User, "hi", "t").flagged_as_error();
        let system = Message::new(Sender::System, "note", "t").flagged_as_error();
        let assistant = Message::new(Sender::Assistant, "Error: x", "t").flagged_as_error();
        assert!(!user.is_error());
        assert!(!system.is_error());
        assert!(assistant.is_error());
        assert_eq!(user, Message::new(Sender::User, "hi", "t"));
    }

    #[test]
    fn import_rejects_bad_structure() {
        for doc in [
            r#"{}"#,
            r#"{"messages": []}"#,
            r#"{"chat_log": [["You", "hi"]]}"#,
            r#"{"chat_log": [["You", "hi", "ts", "extra"]]}"#,
            r#"{"chat_log": [["You", 1, "ts"]]}"#,
            r#"not json"#,
        ] {
            let err = Transcript::import_json(doc.as_bytes()).unwrap_err();
            assert!(matches!(err, ImportError::Malformed { .. }), "{doc}");
        }
    }

    #[test]
    fn unknown_labels_import_as_system() {
        let doc = r#"{"chat_log": [["Narrator", "once upon a time", "2024-01-01 00:00:00"]]}"#;
        let transcript = Transcript::import_json(doc.as_bytes()).unwrap();
        let message = &transcript.messages()[0];
        assert_eq!(message.sender(), Sender::System);
        assert_eq!(message.css_class(), "error-message");
    }

    #[test]
    fn html_export_classes_and_markup() {
        let html = sample().export_html(&MarkupFormatter::new());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<style>"));
        assert!(html.contains(
            "<div class='message user-message'><p>2024-01-01 12:00:00 <b>You:</b></p><p>hello <b>there</b></p></div>"
        ));
        assert!(html.contains("<div class='message ai-message'>"));
        assert!(html.contains("<p>hi<br>you</p>"));
        assert_eq!(html.matches("error-message'>").count(), 2);
    }

    #[test]
    fn html_export_escapes_content() {
        let mut transcript = Transcript::new();
        transcript.append(Message::new(Sender::User, "<script>x</script>", "t"));
        let html = transcript.export_html(&MarkupFormatter::new());
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn assistant_error_prefix() {
        let message = Message::assistant_error("API request failed: boom");
        assert!(message.is_error());
        assert_eq!(message.content(), "Error: API request failed: boom");
        assert_eq!(message.label(), ERROR_LABEL);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.json");
        sample().save_json(&path).unwrap();
        assert_eq!(Transcript::load_json(&path).unwrap(), sample());

        let html_path = dir.path().join("chat.html");
        sample()
            .save_html(&html_path, &MarkupFormatter::new())
            .unwrap();
        assert!(fs::read_to_string(&html_path).unwrap().contains("ai-message"));
    }
}
