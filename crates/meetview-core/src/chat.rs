use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::errors::MeetError;
use crate::events::{ChatMessage, EventEmitter, MeetEvent, SessionState};
use crate::tasks::ScheduledTask;

/// Shared message store between the session and every ChatService handle.
pub type MessageStore = Arc<Mutex<Vec<ChatMessage>>>;

/// Sender name shown for messages typed locally.
pub const LOCAL_SENDER: &str = "You";
/// Sender and text of the placeholder peer that talks while chat is open.
pub const SIMULATED_SENDER: &str = "Guest";
pub const SIMULATED_TEXT: &str = "Hi";

/// File chosen in the chat popup but not sent yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
}

impl Attachment {
    /// Images and PDFs only.
    pub fn is_supported(mime_type: &str) -> bool {
        mime_type.starts_with("image/") || mime_type == "application/pdf"
    }
}

pub(crate) struct ChatState {
    messages: MessageStore,
    ticker: std::sync::Mutex<Option<ScheduledTask>>,
    attachment: std::sync::Mutex<Option<Attachment>>,
}

impl ChatState {
    pub(crate) fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            ticker: std::sync::Mutex::new(None),
            attachment: std::sync::Mutex::new(None),
        }
    }

    /// Close the popup and forget the conversation.
    pub(crate) async fn reset(&self) {
        self.ticker.lock().expect("chat lock poisoned").take();
        self.attachment.lock().expect("chat lock poisoned").take();
        self.messages.lock().await.clear();
    }
}

/// The chat popup. Messages stay local; nothing is sent to other participants.
pub struct ChatService {
    state: Arc<ChatState>,
    emitter: EventEmitter,
    session: watch::Receiver<SessionState>,
    interval: Duration,
}

impl ChatService {
    pub(crate) fn new(
        state: Arc<ChatState>,
        emitter: EventEmitter,
        session: watch::Receiver<SessionState>,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            emitter,
            session,
            interval,
        }
    }

    fn ensure_in_session(&self, op: &'static str) -> Result<(), MeetError> {
        match *self.session.borrow() {
            SessionState::InSession => Ok(()),
            state => Err(MeetError::InvalidState { op, state }),
        }
    }

    /// Show the popup and start the simulated peer. Opening twice is a no-op.
    pub fn open(&self) -> Result<(), MeetError> {
        self.ensure_in_session("open chat")?;
        let mut ticker = self.state.ticker.lock().expect("chat lock poisoned");
        if ticker.is_some() {
            return Ok(());
        }

        let messages = self.state.messages.clone();
        let emitter = self.emitter.clone();
        let period = self.interval;
        *ticker = Some(ScheduledTask::spawn("chat-simulation", async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let msg = new_message(SIMULATED_SENDER, SIMULATED_TEXT, false);
                messages.lock().await.push(msg.clone());
                emitter.emit(MeetEvent::ChatMessageReceived(msg));
            }
        }));
        tracing::debug!("chat opened");
        Ok(())
    }

    /// Hide the popup; the simulated peer goes quiet. Messages are kept.
    pub fn close(&self) {
        if self.state.ticker.lock().expect("chat lock poisoned").take().is_some() {
            tracing::debug!("chat closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.ticker.lock().expect("chat lock poisoned").is_some()
    }

    /// Label for the button that shows or hides the popup.
    pub fn toggle_label(&self) -> &'static str {
        if self.is_open() { "Close Chat" } else { "Open Chat" }
    }

    /// Append a locally typed message. Blank input is rejected.
    pub async fn send_message(&self, text: &str) -> Result<ChatMessage, MeetError> {
        self.ensure_in_session("send chat message")?;
        if text.trim().is_empty() {
            return Err(MeetError::Chat("message is empty".into()));
        }
        let msg = new_message(LOCAL_SENDER, text, true);
        self.state.messages.lock().await.push(msg.clone());
        self.emitter.emit(MeetEvent::ChatMessageReceived(msg.clone()));
        Ok(msg)
    }

    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.state.messages.lock().await.clone()
    }

    /// Pick a file to send. Replaces any earlier selection.
    pub fn select_attachment(&self, file_name: &str, mime_type: &str) -> Result<(), MeetError> {
        if !Attachment::is_supported(mime_type) {
            return Err(MeetError::Chat(format!("unsupported attachment type {mime_type}")));
        }
        *self.state.attachment.lock().expect("chat lock poisoned") = Some(Attachment {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
        });
        Ok(())
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.state.attachment.lock().expect("chat lock poisoned").clone()
    }

    /// Hand off the selected file. Uploading is not supported, so the file
    /// is only logged and the selection cleared.
    pub fn send_attachment(&self) -> Option<Attachment> {
        let attachment = self.state.attachment.lock().expect("chat lock poisoned").take()?;
        tracing::info!(
            file = %attachment.file_name,
            mime = %attachment.mime_type,
            "attachment sent"
        );
        Some(attachment)
    }
}

fn new_message(sender: &str, text: &str, is_local: bool) -> ChatMessage {
    ChatMessage {
        id: uuid::Uuid::new_v4().to_string(),
        sender_name: sender.to_string(),
        text: text.to_string(),
        is_local,
        timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
    }
}
