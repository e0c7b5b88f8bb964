//! Meetview core session logic.
//!
//! Drives a hosted video-conferencing SDK: join, render remote streams,
//! local controls, captions and the chat popup. The SDK and the host
//! element tree are injected through traits, so this crate has no
//! platform dependencies. Consumed by native shells via UniFFI bindings.

pub mod captions;
pub mod chat;
pub mod controls;
pub mod errors;
pub mod events;
pub mod host;
pub mod identity;
pub mod participants;
pub mod renderer;
pub mod sdk;
pub mod session;
pub mod settings;
pub mod share;
pub mod tasks;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

pub use chat::{Attachment, ChatService, MessageStore};
pub use controls::{ControlButton, ControlView, MeetingControls};
pub use errors::MeetError;
pub use events::{
    Caption, ChatMessage, EventEmitter, MediaState, MeetEvent, MeetEventListener, SessionState,
    ShareState, UserError,
};
pub use host::{Container, DisplayCapture, ElementKind, Host};
pub use identity::{Credential, DisplayName, JoinDialog, SessionIdentity};
pub use participants::RosterEntry;
pub use renderer::TileKey;
pub use sdk::{
    AttachedElements, CurrentUser, ElementHandle, EventSink, EventTopic, InitOptions,
    LiveTranscription, MediaStream, ParticipantId, SdkError, SdkEvent, StreamAction, StreamEvent,
    StreamKind, SubscriptionId, VideoClient, VideoQuality,
};
pub use session::SessionCoordinator;
pub use settings::{Settings, SettingsStore};
pub use timer::format_elapsed;
