//! Seam to the external video-conferencing SDK.
//!
//! The coordinator only ever talks to the SDK through these traits, so a
//! host binding (or a test fake) is injected at construction.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::Caption;

pub type ParticipantId = u32;

/// Failure reported by an SDK or host call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SdkError(pub String);

impl SdkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoQuality {
    #[serde(rename = "90p")]
    Video90P,
    #[serde(rename = "180p")]
    Video180P,
    #[serde(rename = "360p")]
    Video360P,
    #[serde(rename = "720p")]
    Video720P,
    #[serde(rename = "1080p")]
    Video1080P,
}

/// Opaque handle to a host display element (video player, canvas, div).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// The SDK hands back either one element or several for the same stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachedElements {
    Single(ElementHandle),
    Multiple(Vec<ElementHandle>),
}

impl AttachedElements {
    pub fn into_vec(self) -> Vec<ElementHandle> {
        match self {
            Self::Single(el) => vec![el],
            Self::Multiple(els) => els,
        }
    }
}

impl From<Vec<ElementHandle>> for AttachedElements {
    fn from(mut els: Vec<ElementHandle>) -> Self {
        if els.len() == 1 {
            Self::Single(els.remove(0))
        } else {
            Self::Multiple(els)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Camera,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start,
    Stop,
}

/// A peer's camera or share stream started or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: StreamKind,
    pub action: StreamAction,
    pub participant_id: ParticipantId,
}

/// Events the SDK pushes into a subscription sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
    Stream(StreamEvent),
    CaptionMessage(Caption),
    UsersRemoved(Vec<ParticipantId>),
    AudioEncoderReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    PeerVideoStateChange,
    PeerShareStateChange,
    CaptionMessage,
    UserRemoved,
    MediaSdkChange,
}

impl EventTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerVideoStateChange => "peer-video-state-change",
            Self::PeerShareStateChange => "peer-share-state-change",
            Self::CaptionMessage => "caption-message",
            Self::UserRemoved => "user-removed",
            Self::MediaSdkChange => "media-sdk-change",
        }
    }
}

impl SdkEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Stream(StreamEvent { kind: StreamKind::Camera, .. }) => {
                EventTopic::PeerVideoStateChange
            }
            Self::Stream(StreamEvent { kind: StreamKind::Share, .. }) => {
                EventTopic::PeerShareStateChange
            }
            Self::CaptionMessage(_) => EventTopic::CaptionMessage,
            Self::UsersRemoved(_) => EventTopic::UserRemoved,
            Self::AudioEncoderReady => EventTopic::MediaSdkChange,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub type EventSink = mpsc::UnboundedSender<SdkEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOptions {
    pub patch_js_media: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: ParticipantId,
    pub display_name: String,
}

/// The SDK client handle. One per coordinator lifetime.
#[async_trait]
pub trait VideoClient: Send + Sync {
    async fn init(&self, locale: &str, region: &str, options: InitOptions) -> Result<(), SdkError>;
    async fn join(&self, session: &str, credential: &str, display_name: &str) -> Result<(), SdkError>;
    async fn leave(&self) -> Result<(), SdkError>;

    /// Route events of `topic` into `sink` until unsubscribed.
    fn subscribe(&self, topic: EventTopic, sink: EventSink) -> SubscriptionId;
    fn unsubscribe(&self, id: SubscriptionId);

    fn current_user(&self) -> Option<CurrentUser>;
    fn display_name_of(&self, participant: ParticipantId) -> Option<String>;

    fn media_stream(&self) -> Arc<dyn MediaStream>;
    fn transcription(&self) -> Arc<dyn LiveTranscription>;
}

#[async_trait]
pub trait MediaStream: Send + Sync {
    async fn start_audio(&self) -> Result<(), SdkError>;
    async fn mute_audio(&self) -> Result<(), SdkError>;
    async fn unmute_audio(&self) -> Result<(), SdkError>;
    async fn start_video(&self) -> Result<(), SdkError>;
    async fn stop_video(&self) -> Result<(), SdkError>;

    async fn attach_video(
        &self,
        participant: ParticipantId,
        quality: VideoQuality,
    ) -> Result<AttachedElements, SdkError>;
    async fn detach_video(&self, participant: ParticipantId) -> Result<AttachedElements, SdkError>;

    async fn attach_share_view(
        &self,
        participant: ParticipantId,
        quality: VideoQuality,
    ) -> Result<AttachedElements, SdkError>;
    async fn detach_share_view(&self, participant: ParticipantId) -> Result<AttachedElements, SdkError>;

    /// Publish the local display capture rendered into `target`.
    async fn start_share_screen(&self, target: ElementHandle) -> Result<(), SdkError>;
    async fn stop_share_screen(&self) -> Result<(), SdkError>;
}

#[async_trait]
pub trait LiveTranscription: Send + Sync {
    async fn start_live_transcription(&self) -> Result<(), SdkError>;
    async fn disable_captions(&self, disable: bool) -> Result<(), SdkError>;
}
