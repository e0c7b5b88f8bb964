use std::sync::Arc;

use crate::sdk::{ParticipantId, StreamKind};

/// Events emitted by the core to UI listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum MeetEvent {
    SessionStateChanged(SessionState),
    MediaStateChanged(MediaState),
    TileAttached { participant_id: ParticipantId, kind: StreamKind },
    TileDetached { participant_id: ParticipantId, kind: StreamKind },
    CaptionReceived(Caption),
    ChatMessageReceived(ChatMessage),
    ElapsedTimeChanged(u64),
    ErrorRaised(UserError),
    NavigateTo(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Joining,
    InSession,
    Leaving,
    Left,
}

/// Who currently owns the single share slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareState {
    Inactive,
    Local,
    Remote(ParticipantId),
}

/// Confirmed media flags. Only updated after the SDK reports success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaState {
    pub camera_muted: bool,
    pub microphone_muted: bool,
    pub share: ShareState,
    pub captioning: bool,
}

impl MediaState {
    pub fn is_sharing(&self) -> bool {
        self.share != ShareState::Inactive
    }

    pub fn is_sharing_locally(&self) -> bool {
        self.share == ShareState::Local
    }
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            camera_muted: true,
            microphone_muted: true,
            share: ShareState::Inactive,
            captioning: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub participant_id: Option<ParticipantId>,
    pub display_name: String,
    pub text: String,
    pub language: Option<String>,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_name: String,
    pub text: String,
    pub is_local: bool,
    pub timestamp_ms: u64,
}

/// A failure the UI should show instead of swallowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserError {
    pub operation: String,
    pub message: String,
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait MeetEventListener: Send + Sync {
    fn on_event(&self, event: MeetEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<std::sync::RwLock<Vec<Arc<dyn MeetEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(std::sync::RwLock::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn MeetEventListener>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    pub fn emit(&self, event: MeetEvent) {
        let listeners = self.listeners.read().expect("listener lock poisoned");
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
