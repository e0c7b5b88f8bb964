//! UniFFI bindings for meetview-core.
//!
//! The host page implements `HostSdk` (the video SDK) and `HostDom` (its
//! element tree). `MeetClient` wraps the session coordinator, its controls
//! and its chat behind a blocking, FFI-safe interface, and receives SDK
//! events back through its `on_*` methods.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use meetview_core::{
    AttachedElements, ChatService, Credential, DisplayCapture, ElementHandle, EventSink,
    EventTopic, InitOptions, LiveTranscription, MediaStream, MeetingControls, ParticipantId,
    SdkError, SdkEvent, SessionCoordinator, SessionIdentity, SettingsStore, StreamEvent,
    SubscriptionId, VideoClient,
    events::{
        Caption as CoreCaption, ChatMessage as CoreChatMessage, MediaState as CoreMediaState,
        MeetEvent as CoreMeetEvent, SessionState as CoreSessionState,
        ShareState as CoreShareState, UserError as CoreUserError,
    },
};
use tokio::sync::oneshot;

uniffi::include_scaffolding!("meetview");

// ── Namespace functions ──────────────────────────────────────────────

/// Initialize tracing/logging. Call once from the host before creating a MeetClient.
fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "meetview_core=debug,meetview_ffi=debug".parse().unwrap()),
            )
            .with_ansi(false)
            .init();
    });
}

fn format_elapsed(seconds: u64) -> String {
    meetview_core::format_elapsed(seconds)
}

// ── FFI-safe type conversions ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Joining,
    InSession,
    Leaving,
    Left,
}

impl From<CoreSessionState> for SessionState {
    fn from(s: CoreSessionState) -> Self {
        match s {
            CoreSessionState::Idle => Self::Idle,
            CoreSessionState::Initializing => Self::Initializing,
            CoreSessionState::Joining => Self::Joining,
            CoreSessionState::InSession => Self::InSession,
            CoreSessionState::Leaving => Self::Leaving,
            CoreSessionState::Left => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Camera,
    Share,
}

impl From<meetview_core::StreamKind> for StreamKind {
    fn from(k: meetview_core::StreamKind) -> Self {
        match k {
            meetview_core::StreamKind::Camera => Self::Camera,
            meetview_core::StreamKind::Share => Self::Share,
        }
    }
}

impl From<StreamKind> for meetview_core::StreamKind {
    fn from(k: StreamKind) -> Self {
        match k {
            StreamKind::Camera => Self::Camera,
            StreamKind::Share => Self::Share,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start,
    Stop,
}

impl From<StreamAction> for meetview_core::StreamAction {
    fn from(a: StreamAction) -> Self {
        match a {
            StreamAction::Start => Self::Start,
            StreamAction::Stop => Self::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    Video90P,
    Video180P,
    Video360P,
    Video720P,
    Video1080P,
}

impl From<meetview_core::VideoQuality> for VideoQuality {
    fn from(q: meetview_core::VideoQuality) -> Self {
        match q {
            meetview_core::VideoQuality::Video90P => Self::Video90P,
            meetview_core::VideoQuality::Video180P => Self::Video180P,
            meetview_core::VideoQuality::Video360P => Self::Video360P,
            meetview_core::VideoQuality::Video720P => Self::Video720P,
            meetview_core::VideoQuality::Video1080P => Self::Video1080P,
        }
    }
}

impl From<VideoQuality> for meetview_core::VideoQuality {
    fn from(q: VideoQuality) -> Self {
        match q {
            VideoQuality::Video90P => Self::Video90P,
            VideoQuality::Video180P => Self::Video180P,
            VideoQuality::Video360P => Self::Video360P,
            VideoQuality::Video720P => Self::Video720P,
            VideoQuality::Video1080P => Self::Video1080P,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Video,
    Share,
}

impl From<meetview_core::Container> for Container {
    fn from(c: meetview_core::Container) -> Self {
        match c {
            meetview_core::Container::Video => Self::Video,
            meetview_core::Container::Share => Self::Share,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Tile,
    Label,
    Video,
}

impl From<meetview_core::ElementKind> for ElementKind {
    fn from(k: meetview_core::ElementKind) -> Self {
        match k {
            meetview_core::ElementKind::Tile => Self::Tile,
            meetview_core::ElementKind::Label => Self::Label,
            meetview_core::ElementKind::Video => Self::Video,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareState {
    Inactive,
    Local,
    Remote { participant_id: u32 },
}

impl From<CoreShareState> for ShareState {
    fn from(s: CoreShareState) -> Self {
        match s {
            CoreShareState::Inactive => Self::Inactive,
            CoreShareState::Local => Self::Local,
            CoreShareState::Remote(participant_id) => Self::Remote { participant_id },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaState {
    pub camera_muted: bool,
    pub microphone_muted: bool,
    pub share: ShareState,
    pub captioning: bool,
}

impl From<CoreMediaState> for MediaState {
    fn from(m: CoreMediaState) -> Self {
        Self {
            camera_muted: m.camera_muted,
            microphone_muted: m.microphone_muted,
            share: m.share.into(),
            captioning: m.captioning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub participant_id: Option<u32>,
    pub display_name: String,
    pub text: String,
    pub language: Option<String>,
    pub done: bool,
}

impl From<CoreCaption> for Caption {
    fn from(c: CoreCaption) -> Self {
        Self {
            participant_id: c.participant_id,
            display_name: c.display_name,
            text: c.text,
            language: c.language,
            done: c.done,
        }
    }
}

impl From<Caption> for CoreCaption {
    fn from(c: Caption) -> Self {
        Self {
            participant_id: c.participant_id,
            display_name: c.display_name,
            text: c.text,
            language: c.language,
            done: c.done,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub sender_name: String,
    pub text: String,
    pub is_local: bool,
    pub timestamp_ms: u64,
}

impl From<CoreChatMessage> for ChatMessage {
    fn from(m: CoreChatMessage) -> Self {
        Self {
            id: m.id,
            sender_name: m.sender_name,
            text: m.text,
            is_local: m.is_local,
            timestamp_ms: m.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserError {
    pub operation: String,
    pub message: String,
}

impl From<CoreUserError> for UserError {
    fn from(e: CoreUserError) -> Self {
        Self {
            operation: e.operation,
            message: e.message,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Participant {
    pub participant_id: u32,
    pub has_video: bool,
    pub is_sharing: bool,
}

impl From<meetview_core::RosterEntry> for Participant {
    fn from(e: meetview_core::RosterEntry) -> Self {
        Self {
            participant_id: e.participant_id,
            has_video: e.has_video,
            is_sharing: e.is_sharing,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: u32,
    pub display_name: String,
}

impl From<CurrentUser> for meetview_core::CurrentUser {
    fn from(u: CurrentUser) -> Self {
        Self {
            user_id: u.user_id,
            display_name: u.display_name,
        }
    }
}

impl From<meetview_core::CurrentUser> for CurrentUser {
    fn from(u: meetview_core::CurrentUser) -> Self {
        Self {
            user_id: u.user_id,
            display_name: u.display_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlButton {
    pub label: String,
    pub active: bool,
    pub pending: bool,
}

impl From<meetview_core::ControlButton> for ControlButton {
    fn from(b: meetview_core::ControlButton) -> Self {
        Self {
            label: b.label.to_string(),
            active: b.active,
            pending: b.pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControlView {
    pub camera: ControlButton,
    pub microphone: ControlButton,
    pub screen_share: ControlButton,
    pub captions: ControlButton,
    pub chat_label: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub display_name: Option<String>,
    pub locale: String,
    pub region: String,
    pub video_quality: VideoQuality,
    pub mic_enabled_on_join: bool,
    pub camera_enabled_on_join: bool,
    pub captions_on_join: bool,
    pub exit_url: String,
}

impl From<meetview_core::Settings> for Settings {
    fn from(s: meetview_core::Settings) -> Self {
        Self {
            display_name: s.display_name,
            locale: s.locale,
            region: s.region,
            video_quality: s.video_quality.into(),
            mic_enabled_on_join: s.mic_enabled_on_join,
            camera_enabled_on_join: s.camera_enabled_on_join,
            captions_on_join: s.captions_on_join,
            exit_url: s.exit_url,
        }
    }
}

#[derive(Debug, Clone)]
pub enum MeetEvent {
    SessionStateChanged { state: SessionState },
    MediaStateChanged { media: MediaState },
    TileAttached { participant_id: u32, kind: StreamKind },
    TileDetached { participant_id: u32, kind: StreamKind },
    CaptionReceived { caption: Caption },
    ChatMessageReceived { message: ChatMessage },
    ElapsedTimeChanged { seconds: u64 },
    ErrorRaised { error: UserError },
    NavigateTo { url: String },
}

impl From<CoreMeetEvent> for MeetEvent {
    fn from(e: CoreMeetEvent) -> Self {
        match e {
            CoreMeetEvent::SessionStateChanged(s) => Self::SessionStateChanged { state: s.into() },
            CoreMeetEvent::MediaStateChanged(m) => Self::MediaStateChanged { media: m.into() },
            CoreMeetEvent::TileAttached { participant_id, kind } => {
                Self::TileAttached { participant_id, kind: kind.into() }
            }
            CoreMeetEvent::TileDetached { participant_id, kind } => {
                Self::TileDetached { participant_id, kind: kind.into() }
            }
            CoreMeetEvent::CaptionReceived(c) => Self::CaptionReceived { caption: c.into() },
            CoreMeetEvent::ChatMessageReceived(m) => {
                Self::ChatMessageReceived { message: m.into() }
            }
            CoreMeetEvent::ElapsedTimeChanged(seconds) => Self::ElapsedTimeChanged { seconds },
            CoreMeetEvent::ErrorRaised(e) => Self::ErrorRaised { error: e.into() },
            CoreMeetEvent::NavigateTo(url) => Self::NavigateTo { url },
        }
    }
}

// ── Error conversion ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum MeetError {
    #[error("Invalid name: {msg}")]
    InvalidName { msg: String },
    #[error("Invalid state: {msg}")]
    InvalidState { msg: String },
    #[error("Init error: {msg}")]
    Init { msg: String },
    #[error("Join error: {msg}")]
    Join { msg: String },
    #[error("Media error: {msg}")]
    Media { msg: String },
    #[error("Render error: {msg}")]
    Render { msg: String },
    #[error("Share error: {msg}")]
    Share { msg: String },
    #[error("Caption error: {msg}")]
    Caption { msg: String },
    #[error("Chat error: {msg}")]
    Chat { msg: String },
    #[error("Busy: {msg}")]
    Busy { msg: String },
    #[error("Cancelled: {msg}")]
    Cancelled { msg: String },
    #[error("Host error: {msg}")]
    Host { msg: String },
}

impl From<meetview_core::MeetError> for MeetError {
    fn from(e: meetview_core::MeetError) -> Self {
        use meetview_core::MeetError as Core;
        tracing::error!("MeetError: {e}");
        let msg = e.to_string();
        match e {
            Core::InvalidName(_) => Self::InvalidName { msg },
            Core::InvalidState { .. } => Self::InvalidState { msg },
            Core::Init(_) => Self::Init { msg },
            Core::Join(_) => Self::Join { msg },
            Core::Media(_) => Self::Media { msg },
            Core::Render(_) => Self::Render { msg },
            Core::Share(_) => Self::Share { msg },
            Core::Caption(_) => Self::Caption { msg },
            Core::Chat(_) => Self::Chat { msg },
            Core::Busy(_) => Self::Busy { msg },
            Core::Cancelled => Self::Cancelled { msg },
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for MeetError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::Host { msg: e.reason }
    }
}

// ── Callback interfaces ───────────────────────────────────────────────

pub trait MeetEventListener: Send + Sync {
    fn on_event(&self, event: MeetEvent);
}

pub trait HostSdk: Send + Sync {
    fn init(&self, locale: String, region: String, patch_js_media: bool) -> Result<(), MeetError>;
    fn join(&self, session_name: String, credential: String, display_name: String) -> Result<(), MeetError>;
    fn leave(&self) -> Result<(), MeetError>;
    fn current_user(&self) -> Option<CurrentUser>;
    fn display_name_of(&self, participant_id: u32) -> Option<String>;

    fn start_audio(&self) -> Result<(), MeetError>;
    fn mute_audio(&self) -> Result<(), MeetError>;
    fn unmute_audio(&self) -> Result<(), MeetError>;
    fn start_video(&self) -> Result<(), MeetError>;
    fn stop_video(&self) -> Result<(), MeetError>;
    fn attach_video(&self, participant_id: u32, quality: VideoQuality) -> Result<Vec<u64>, MeetError>;
    fn detach_video(&self, participant_id: u32) -> Result<Vec<u64>, MeetError>;
    fn attach_share_view(&self, participant_id: u32, quality: VideoQuality) -> Result<Vec<u64>, MeetError>;
    fn detach_share_view(&self, participant_id: u32) -> Result<Vec<u64>, MeetError>;
    fn start_share_screen(&self, element: u64) -> Result<(), MeetError>;
    fn stop_share_screen(&self) -> Result<(), MeetError>;

    fn start_live_transcription(&self) -> Result<(), MeetError>;
    fn disable_captions(&self, disable: bool) -> Result<(), MeetError>;
}

pub trait HostDom: Send + Sync {
    fn create_element(&self, kind: ElementKind) -> u64;
    fn append_to_container(&self, container: Container, child: u64);
    fn append_child(&self, parent: u64, child: u64);
    fn set_text(&self, element: u64, text: String);
    fn remove_element(&self, element: u64);
    fn get_display_media(&self) -> Result<u64, MeetError>;
    fn attach_capture(&self, element: u64, stream_id: u64);
    fn stop_capture(&self, stream_id: u64);
    fn needs_audio_workaround(&self) -> bool;
}

// ── Bridge listener: FFI callback → core listener ─────────────────────

struct BridgeListener {
    ffi_listener: Arc<dyn MeetEventListener>,
}

impl meetview_core::MeetEventListener for BridgeListener {
    fn on_event(&self, event: CoreMeetEvent) {
        self.ffi_listener.on_event(event.into());
    }
}

// ── SDK bridge: host callbacks → core SDK traits ──────────────────────

/// Fans SDK events pushed by the host out to the core's subscriptions.
#[derive(Default)]
struct EventRouter {
    sinks: StdMutex<HashMap<SubscriptionId, (EventTopic, EventSink)>>,
    next_id: AtomicU64,
}

impl EventRouter {
    fn add(&self, topic: EventTopic, sink: EventSink) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks
            .lock()
            .expect("router lock poisoned")
            .insert(id, (topic, sink));
        tracing::debug!(topic = topic.as_str(), "subscribed");
        id
    }

    fn remove(&self, id: SubscriptionId) {
        if let Some((topic, _)) = self.sinks.lock().expect("router lock poisoned").remove(&id) {
            tracing::debug!(topic = topic.as_str(), "unsubscribed");
        }
    }

    fn deliver(&self, event: SdkEvent) {
        let topic = event.topic();
        let sinks = self.sinks.lock().expect("router lock poisoned");
        let mut delivered = false;
        for (t, sink) in sinks.values() {
            if *t == topic && sink.send(event.clone()).is_ok() {
                delivered = true;
            }
        }
        if !delivered {
            tracing::debug!(topic = topic.as_str(), "event dropped: no subscriber");
        }
    }
}

/// Pending "capture ended" notifications, keyed by stream id.
#[derive(Default)]
struct CaptureRegistry {
    ends: StdMutex<HashMap<u64, oneshot::Sender<()>>>,
}

impl CaptureRegistry {
    fn register(&self, stream_id: u64) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.ends
            .lock()
            .expect("capture lock poisoned")
            .insert(stream_id, tx);
        rx
    }

    fn end(&self, stream_id: u64) {
        if let Some(tx) = self.ends.lock().expect("capture lock poisoned").remove(&stream_id) {
            let _ = tx.send(());
        }
    }

    fn forget(&self, stream_id: u64) {
        self.ends.lock().expect("capture lock poisoned").remove(&stream_id);
    }
}

/// Run a host callback off the async workers; host calls may block.
async fn host_call<T, F>(call: F) -> Result<T, SdkError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MeetError> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(result) => result.map_err(|e| SdkError::new(e.to_string())),
        Err(e) => Err(SdkError::new(format!("host call aborted: {e}"))),
    }
}

fn elements(handles: Vec<u64>) -> AttachedElements {
    handles
        .into_iter()
        .map(ElementHandle)
        .collect::<Vec<_>>()
        .into()
}

#[derive(Clone)]
struct SdkBridge {
    sdk: Arc<dyn HostSdk>,
    router: Arc<EventRouter>,
}

#[async_trait]
impl VideoClient for SdkBridge {
    async fn init(&self, locale: &str, region: &str, options: InitOptions) -> Result<(), SdkError> {
        let (sdk, locale, region) = (self.sdk.clone(), locale.to_string(), region.to_string());
        host_call(move || sdk.init(locale, region, options.patch_js_media)).await
    }

    async fn join(&self, session: &str, credential: &str, display_name: &str) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        let (session, credential, display_name) =
            (session.to_string(), credential.to_string(), display_name.to_string());
        host_call(move || sdk.join(session, credential, display_name)).await
    }

    async fn leave(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.leave()).await
    }

    fn subscribe(&self, topic: EventTopic, sink: EventSink) -> SubscriptionId {
        self.router.add(topic, sink)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.router.remove(id);
    }

    fn current_user(&self) -> Option<meetview_core::CurrentUser> {
        self.sdk.current_user().map(Into::into)
    }

    fn display_name_of(&self, participant: ParticipantId) -> Option<String> {
        self.sdk.display_name_of(participant)
    }

    fn media_stream(&self) -> Arc<dyn MediaStream> {
        Arc::new(self.clone())
    }

    fn transcription(&self) -> Arc<dyn LiveTranscription> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl MediaStream for SdkBridge {
    async fn start_audio(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.start_audio()).await
    }

    async fn mute_audio(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.mute_audio()).await
    }

    async fn unmute_audio(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.unmute_audio()).await
    }

    async fn start_video(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.start_video()).await
    }

    async fn stop_video(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.stop_video()).await
    }

    async fn attach_video(
        &self,
        participant: ParticipantId,
        quality: meetview_core::VideoQuality,
    ) -> Result<AttachedElements, SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.attach_video(participant, quality.into()))
            .await
            .map(elements)
    }

    async fn detach_video(&self, participant: ParticipantId) -> Result<AttachedElements, SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.detach_video(participant)).await.map(elements)
    }

    async fn attach_share_view(
        &self,
        participant: ParticipantId,
        quality: meetview_core::VideoQuality,
    ) -> Result<AttachedElements, SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.attach_share_view(participant, quality.into()))
            .await
            .map(elements)
    }

    async fn detach_share_view(&self, participant: ParticipantId) -> Result<AttachedElements, SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.detach_share_view(participant))
            .await
            .map(elements)
    }

    async fn start_share_screen(&self, target: ElementHandle) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.start_share_screen(target.0)).await
    }

    async fn stop_share_screen(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.stop_share_screen()).await
    }
}

#[async_trait]
impl LiveTranscription for SdkBridge {
    async fn start_live_transcription(&self) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.start_live_transcription()).await
    }

    async fn disable_captions(&self, disable: bool) -> Result<(), SdkError> {
        let sdk = self.sdk.clone();
        host_call(move || sdk.disable_captions(disable)).await
    }
}

struct DomBridge {
    dom: Arc<dyn HostDom>,
    captures: Arc<CaptureRegistry>,
}

#[async_trait]
impl meetview_core::Host for DomBridge {
    fn create_element(&self, kind: meetview_core::ElementKind) -> ElementHandle {
        ElementHandle(self.dom.create_element(kind.into()))
    }

    fn append_to_container(&self, container: meetview_core::Container, child: ElementHandle) {
        self.dom.append_to_container(container.into(), child.0);
    }

    fn append_child(&self, parent: ElementHandle, child: ElementHandle) {
        self.dom.append_child(parent.0, child.0);
    }

    fn set_text(&self, element: ElementHandle, text: &str) {
        self.dom.set_text(element.0, text.to_string());
    }

    fn remove_element(&self, element: ElementHandle) {
        self.dom.remove_element(element.0);
    }

    async fn get_display_media(&self) -> Result<DisplayCapture, SdkError> {
        let dom = self.dom.clone();
        let stream_id = host_call(move || dom.get_display_media()).await?;
        let ended = self.captures.register(stream_id);
        Ok(DisplayCapture { stream_id, ended })
    }

    fn attach_capture(&self, element: ElementHandle, stream_id: u64) {
        self.dom.attach_capture(element.0, stream_id);
    }

    fn stop_capture(&self, stream_id: u64) {
        self.captures.forget(stream_id);
        self.dom.stop_capture(stream_id);
    }

    fn needs_audio_workaround(&self) -> bool {
        self.dom.needs_audio_workaround()
    }
}

// ── MeetClient: main FFI object ───────────────────────────────────────

pub struct MeetClient {
    session: SessionCoordinator,
    controls: MeetingControls,
    chat: ChatService,
    settings: SettingsStore,
    router: Arc<EventRouter>,
    captures: Arc<CaptureRegistry>,
    rt: tokio::runtime::Runtime,
}

impl MeetClient {
    pub fn new(
        data_dir: String,
        session_name: String,
        credential: String,
        sdk: Box<dyn HostSdk>,
        dom: Box<dyn HostDom>,
    ) -> Self {
        let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
        let settings = SettingsStore::new(&data_dir);
        let router = Arc::new(EventRouter::default());
        let captures = Arc::new(CaptureRegistry::default());

        let client = Arc::new(SdkBridge {
            sdk: Arc::from(sdk),
            router: router.clone(),
        });
        let host = Arc::new(DomBridge {
            dom: Arc::from(dom),
            captures: captures.clone(),
        });
        let session = SessionCoordinator::new(
            SessionIdentity::new(session_name, Credential::new(credential)),
            settings.get(),
            client,
            host,
        );
        tracing::info!(session = %session.session_name(), "meet client created");

        let controls = session.controls();
        let chat = session.chat();
        Self {
            session,
            controls,
            chat,
            settings,
            router,
            captures,
            rt,
        }
    }

    pub fn add_listener(&self, listener: Box<dyn MeetEventListener>) {
        let bridge = Arc::new(BridgeListener {
            ffi_listener: Arc::from(listener),
        });
        self.session.add_listener(bridge);
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state().into()
    }

    pub fn media_state(&self) -> MediaState {
        self.rt.block_on(self.session.media_state()).into()
    }

    pub fn local_user(&self) -> Option<CurrentUser> {
        self.rt.block_on(self.session.local_user()).map(Into::into)
    }

    /// Name to prefill the join dialog with.
    pub fn remembered_name(&self) -> Option<String> {
        self.settings.get().display_name
    }

    pub fn join(&self, display_name: String) -> Result<(), MeetError> {
        self.rt
            .block_on(self.session.request_join(&display_name))
            .map_err(MeetError::from)?;
        self.settings
            .set_display_name(Some(display_name.trim().to_string()));
        Ok(())
    }

    pub fn leave(&self) {
        self.rt.block_on(self.session.leave());
    }

    pub fn toggle_camera(&self) -> Result<bool, MeetError> {
        self.rt
            .block_on(self.controls.toggle_camera())
            .map_err(MeetError::from)
    }

    pub fn toggle_microphone(&self) -> Result<bool, MeetError> {
        self.rt
            .block_on(self.controls.toggle_microphone())
            .map_err(MeetError::from)
    }

    pub fn toggle_screen_share(&self) -> Result<bool, MeetError> {
        self.rt
            .block_on(self.controls.toggle_screen_share())
            .map_err(MeetError::from)
    }

    pub fn toggle_captioning(&self) -> Result<bool, MeetError> {
        self.rt
            .block_on(self.controls.toggle_captioning())
            .map_err(MeetError::from)
    }

    pub fn control_view(&self) -> Option<ControlView> {
        let view = self.rt.block_on(self.controls.view())?;
        Some(ControlView {
            camera: view.camera.into(),
            microphone: view.microphone.into(),
            screen_share: view.screen_share.into(),
            captions: view.captions.into(),
            chat_label: self.chat.toggle_label().to_string(),
        })
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.session.elapsed_seconds()
    }

    pub fn elapsed_label(&self) -> String {
        meetview_core::format_elapsed(self.session.elapsed_seconds())
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.rt
            .block_on(self.session.participants())
            .into_iter()
            .map(Participant::from)
            .collect()
    }

    pub fn captions(&self) -> Vec<Caption> {
        self.rt
            .block_on(self.session.captions())
            .into_iter()
            .map(Caption::from)
            .collect()
    }

    pub fn last_error(&self) -> Option<UserError> {
        self.rt.block_on(self.session.last_error()).map(Into::into)
    }

    pub fn open_chat(&self) -> Result<(), MeetError> {
        let _guard = self.rt.enter();
        self.chat.open().map_err(MeetError::from)
    }

    pub fn close_chat(&self) {
        self.chat.close();
    }

    pub fn is_chat_open(&self) -> bool {
        self.chat.is_open()
    }

    pub fn send_chat_message(&self, text: String) -> Result<ChatMessage, MeetError> {
        self.rt.block_on(async {
            self.chat
                .send_message(&text)
                .await
                .map(ChatMessage::from)
                .map_err(MeetError::from)
        })
    }

    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.rt
            .block_on(self.chat.messages())
            .into_iter()
            .map(ChatMessage::from)
            .collect()
    }

    pub fn select_attachment(&self, file_name: String, mime_type: String) -> Result<(), MeetError> {
        self.chat
            .select_attachment(&file_name, &mime_type)
            .map_err(MeetError::from)
    }

    /// Returns the name of the file handed off, if one was selected.
    pub fn send_attachment(&self) -> Option<String> {
        self.chat.send_attachment().map(|a| a.file_name)
    }

    pub fn get_settings(&self) -> Settings {
        self.settings.get().into()
    }

    pub fn set_display_name(&self, name: Option<String>) {
        self.settings.set_display_name(name);
    }

    pub fn set_video_quality(&self, quality: VideoQuality) {
        self.settings.set_video_quality(quality.into());
    }

    pub fn set_mic_enabled_on_join(&self, enabled: bool) {
        self.settings.set_mic_enabled_on_join(enabled);
    }

    pub fn set_camera_enabled_on_join(&self, enabled: bool) {
        self.settings.set_camera_enabled_on_join(enabled);
    }

    pub fn set_captions_on_join(&self, enabled: bool) {
        self.settings.set_captions_on_join(enabled);
    }

    pub fn on_stream_event(&self, kind: StreamKind, action: StreamAction, participant_id: u32) {
        self.router.deliver(SdkEvent::Stream(StreamEvent {
            kind: kind.into(),
            action: action.into(),
            participant_id,
        }));
    }

    pub fn on_caption(&self, caption: Caption) {
        self.router.deliver(SdkEvent::CaptionMessage(caption.into()));
    }

    pub fn on_users_removed(&self, participant_ids: Vec<u32>) {
        self.router.deliver(SdkEvent::UsersRemoved(participant_ids));
    }

    pub fn on_audio_encoder_ready(&self) {
        self.router.deliver(SdkEvent::AudioEncoderReady);
    }

    /// The user stopped the capture from the browser's own control.
    pub fn on_display_capture_ended(&self, stream_id: u64) {
        self.captures.end(stream_id);
    }
}
