//! Session orchestration.
//!
//! [`SessionController`] owns the live configuration, the chat client built
//! from it, the transcript, and any pending attachment.  It is driven by a
//! single caller (a UI or CLI) and turns user intents into transcript entries:
//!
//! ```text
//!              save/load ok                 send_message
//! Unconfigured ───────────────▶ Ready ───────────────────────▶ AwaitingResponse
//!                                 ▲                                   │
//!                                 └────────── wait_for_reply ─────────┘
//! ```
//!
//! The backend call runs as a spawned Tokio task so the caller can keep
//! editing the configuration or attaching files while a reply is pending.  At
//! most one completion is in flight; a second send while awaiting a reply is
//! rejected with [`Error::Busy`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinError, JoinHandle};

use crate::client::{ChatClient, CompletionRequest};
use crate::config::{Config, ConfigStore, Validation};
use crate::convert::{Attachment, Converter, TextFileConverter};
use crate::error::{ApiError, Error, Result};
use crate::markup::MarkupFormatter;
use crate::observability::{SESSION_CANCELLED, SESSION_MESSAGES, SESSION_REJECTED_SENDS};
use crate::transcript::{Message, Transcript};

/// Default time allowed for a backend call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Observable state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No configuration has been loaded or saved.
    Unconfigured,
    /// Idle and able to send.
    Ready,
    /// A completion is in flight.
    AwaitingResponse,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unconfigured => write!(f, "unconfigured"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::AwaitingResponse => write!(f, "awaiting response"),
        }
    }
}

/// A transcript entry together with its display rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    /// The entry as stored in the transcript.
    pub message: Message,
    /// Tagged output of the markup formatter.
    pub html: String,
}

/// Result of [`SessionController::send_message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send: no text and no attachment.
    Ignored,
    /// The user message was appended and a completion is in flight.
    Dispatched(RenderedMessage),
}

/// How an in-flight completion ended.
#[derive(Clone, Debug)]
pub enum Completion {
    /// The backend replied; the reply was appended.
    Replied(RenderedMessage),
    /// The request failed; an error entry was appended.
    Failed {
        /// The error entry appended to the transcript.
        rendered: RenderedMessage,
        /// Why the request failed.
        error: ApiError,
    },
    /// The request was cancelled before it finished; nothing was appended.
    Cancelled,
}

impl Completion {
    /// The failure, if the request failed.
    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Completion::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// The appended entry, if any.
    pub fn rendered(&self) -> Option<&RenderedMessage> {
        match self {
            Completion::Replied(rendered) | Completion::Failed { rendered, .. } => Some(rendered),
            Completion::Cancelled => None,
        }
    }
}

/// Drives a single chat session.
pub struct SessionController {
    store: ConfigStore,
    client: ChatClient,
    request_timeout: Duration,
    transcript: Transcript,
    formatter: MarkupFormatter,
    converter: Box<dyn Converter>,
    attachment: Option<Attachment>,
    pending: Option<JoinHandle<std::result::Result<String, ApiError>>>,
}

impl SessionController {
    /// Creates a session around `store` without reading it.  The session is
    /// [`SessionState::Unconfigured`] unless the store already holds an
    /// active configuration.
    pub fn new(store: ConfigStore) -> Self {
        let client = match store.current() {
            Some(config) => ChatClient::with_timeout(config, DEFAULT_REQUEST_TIMEOUT)
                .unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "could not build chat client");
                    ChatClient::unconfigured()
                }),
            None => ChatClient::unconfigured(),
        };
        Self {
            store,
            client,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transcript: Transcript::new(),
            formatter: MarkupFormatter::new(),
            converter: Box::new(TextFileConverter),
            attachment: None,
            pending: None,
        }
    }

    /// Creates a session and loads the persisted configuration, if any.
    pub fn open(store: ConfigStore) -> Result<Self> {
        let mut session = Self::new(store);
        if let Some(config) = session.store.load()? {
            session.client = ChatClient::with_timeout(&config, session.request_timeout)?;
        }
        tracing::info!(state = %session.state(), "session opened");
        Ok(session)
    }

    /// Replaces the attachment converter.
    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }

    /// Sets the timeout applied to backend calls.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.request_timeout = timeout;
        self.client = match self.store.current() {
            Some(config) => ChatClient::with_timeout(config, timeout)?,
            None => ChatClient::unconfigured(),
        };
        Ok(self)
    }

    /// The current state.  A configuration that was loaded but cannot
    /// produce a working client (e.g. an empty key) leaves the session
    /// [`SessionState::Unconfigured`].
    pub fn state(&self) -> SessionState {
        if self.pending.is_some() {
            SessionState::AwaitingResponse
        } else if self.store.current().is_some() && self.client.is_configured() {
            SessionState::Ready
        } else {
            SessionState::Unconfigured
        }
    }

    /// The active configuration.
    pub fn config(&self) -> Option<&Arc<Config>> {
        self.store.current()
    }

    /// The configuration store.
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The chat client built from the active configuration.
    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// The conversation so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The formatter used for display and HTML export.
    pub fn formatter(&self) -> &MarkupFormatter {
        &self.formatter
    }

    /// The attachment that will be folded into the next message.
    pub fn pending_attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Render text for display.
    pub fn render(&self, text: &str) -> String {
        self.formatter.render(text)
    }

    /// Validates and persists `candidate`, then rebuilds the client from it.
    ///
    /// Allowed in every state.  An in-flight request keeps the client it was
    /// started with and is not cancelled.  On error the previous
    /// configuration and client stay in effect.
    pub fn reconfigure(&mut self, candidate: Config) -> Result<Validation> {
        ConfigStore::validate(&candidate)?;
        let client = ChatClient::with_timeout(&candidate, self.request_timeout)?;
        let validation = self.store.save(candidate)?;
        self.client = client;
        tracing::info!(state = %self.state(), "session reconfigured");
        Ok(validation)
    }

    /// Converts the file at `path` and holds it for the next message.
    ///
    /// A conversion failure is returned and leaves the transcript and any
    /// previously pending attachment untouched.
    pub fn attach_file(&mut self, path: impl AsRef<Path>) -> Result<&Attachment> {
        let path = path.as_ref();
        let text = self.converter.convert(path).map_err(|err| {
            tracing::warn!(path = %path.display(), error = %err, "attachment conversion failed");
            err
        })?;
        let attachment = Attachment::new(path, text);
        tracing::info!(
            filename = attachment.filename(),
            chars = attachment.full_text().chars().count(),
            "file attached"
        );
        Ok(&*self.attachment.insert(attachment))
    }

    /// Drops the pending attachment, returning it.
    pub fn clear_attachment(&mut self) -> Option<Attachment> {
        self.attachment.take()
    }

    /// Appends a user message and starts a completion for it.
    ///
    /// Blank text without an attachment is a no-op.  Otherwise the pending
    /// attachment is folded into the message content and cleared, the message
    /// is appended, and the backend call is spawned on the current Tokio
    /// runtime.  Only the typed text is rendered for display.
    ///
    /// Returns [`Error::Busy`] without touching any state while another reply
    /// is pending.  A rejected send does not consume the pending attachment;
    /// it is folded into the next send that goes through.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn send_message(&mut self, text: &str) -> Result<SendOutcome> {
        if self.pending.is_some() {
            SESSION_REJECTED_SENDS.click();
            tracing::debug!("send rejected: reply pending");
            return Err(Error::Busy);
        }
        let attachment = self.attachment.take();
        if text.trim().is_empty() && attachment.is_none() {
            return Ok(SendOutcome::Ignored);
        }

        let mut content = text.to_string();
        if let Some(attachment) = &attachment {
            content.push_str(&attachment.folded_block());
        }
        let message = Message::user(content);
        let html = self.formatter.render(text);
        self.transcript.append(message.clone());
        SESSION_MESSAGES.click();

        let request = match self.store.current() {
            Some(config) => CompletionRequest::from_config(config, message.content()),
            None => CompletionRequest::from_config(&Config::default(), message.content()),
        };
        let client = self.client.clone();
        self.pending = Some(tokio::spawn(async move { client.complete(&request).await }));
        tracing::info!(
            attachment = attachment.as_ref().map(Attachment::filename),
            "message sent"
        );
        Ok(SendOutcome::Dispatched(RenderedMessage { message, html }))
    }

    /// Waits for the in-flight completion and records its outcome.
    ///
    /// Returns `None` when nothing is in flight.  Dropping the returned future
    /// before it resolves leaves the request pending.
    pub async fn wait_for_reply(&mut self) -> Option<Completion> {
        let handle = self.pending.as_mut()?;
        let joined = handle.await;
        self.pending = None;
        let completion = self.record(joined);
        tracing::info!(state = %self.state(), "reply recorded");
        Some(completion)
    }

    /// Sends `text` and waits for the reply.
    pub async fn send_and_wait(&mut self, text: &str) -> Result<Option<Completion>> {
        match self.send_message(text)? {
            SendOutcome::Ignored => Ok(None),
            SendOutcome::Dispatched(_) => Ok(self.wait_for_reply().await),
        }
    }

    /// Handle that aborts the in-flight completion from elsewhere, e.g. a
    /// signal handler.  Follow up with [`SessionController::wait_for_reply`].
    pub fn abort_handle(&self) -> Option<AbortHandle> {
        self.pending.as_ref().map(JoinHandle::abort_handle)
    }

    /// Aborts the in-flight completion.  A request that already finished is
    /// recorded normally.
    pub async fn cancel(&mut self) -> Option<Completion> {
        self.pending.as_ref()?.abort();
        self.wait_for_reply().await
    }

    fn record(
        &mut self,
        joined: std::result::Result<std::result::Result<String, ApiError>, JoinError>,
    ) -> Completion {
        let result = match joined {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => {
                SESSION_CANCELLED.click();
                tracing::info!("completion cancelled");
                return Completion::Cancelled;
            }
            Err(err) => Err(ApiError::transport(
                format!("completion task failed: {err}"),
                false,
                None,
            )),
        };
        match result {
            Ok(reply) => {
                let message = Message::assistant(reply);
                let rendered = self.append_rendered(message);
                Completion::Replied(rendered)
            }
            Err(error) => {
                let message = Message::assistant_error(format!("API request failed: {error}"));
                let rendered = self.append_rendered(message);
                Completion::Failed { rendered, error }
            }
        }
    }

    fn append_rendered(&mut self, message: Message) -> RenderedMessage {
        let html = self.formatter.render(message.content());
        self.transcript.append(message.clone());
        SESSION_MESSAGES.click();
        RenderedMessage { message, html }
    }

    /// Starts a new conversation.  A pending reply is still appended when it
    /// arrives.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Replaces the transcript with an imported one.  On error the current
    /// transcript is kept.
    pub fn import_transcript(&mut self, bytes: &[u8]) -> Result<()> {
        self.transcript = Transcript::import_json(bytes)?;
        Ok(())
    }

    /// Replaces the transcript with one read from `path`.
    pub fn load_transcript<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.transcript = Transcript::load_json(path)?;
        Ok(())
    }

    /// Writes the transcript as JSON to `path`.
    pub fn save_transcript<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.transcript.save_json(path)
    }

    /// Writes the transcript as an HTML document to `path`.
    pub fn export_html<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.transcript.save_html(path, &self.formatter)
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("config", &self.store.current())
            .field("messages", &self.transcript.len())
            .field("attachment", &self.attachment.as_ref().map(Attachment::filename))
            .finish_non_exhaustive()
    }
}
