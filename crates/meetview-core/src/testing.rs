//! Recording fakes for the SDK and host seams.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, oneshot};

use crate::events::{MeetEvent, MeetEventListener};
use crate::host::{Container, DisplayCapture, ElementKind, Host};
use crate::identity::{Credential, SessionIdentity};
use crate::session::SessionCoordinator;
use crate::settings::Settings;
use crate::sdk::{
    AttachedElements, CurrentUser, ElementHandle, EventSink, EventTopic, InitOptions,
    LiveTranscription, MediaStream, ParticipantId, SdkError, SdkEvent, SubscriptionId,
    VideoClient, VideoQuality,
};

pub const LOCAL_USER_ID: ParticipantId = 1;

#[derive(Default)]
struct SdkInner {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    subscriptions: Mutex<HashMap<SubscriptionId, (EventTopic, EventSink)>>,
    next_subscription: AtomicU64,
    joined_as: Mutex<Option<String>>,
    names: Mutex<HashMap<ParticipantId, String>>,
}

/// Fake SDK client. Clones share state.
#[derive(Clone, Default)]
pub struct FakeSdk {
    inner: Arc<SdkInner>,
}

impl FakeSdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call to `op` fail.
    pub fn fail_on(&self, op: &'static str) {
        self.inner.failing.lock().unwrap().insert(op);
    }

    pub fn succeed_on(&self, op: &'static str) {
        self.inner.failing.lock().unwrap().remove(op);
    }

    /// Make calls to `op` wait until the returned gate is notified.
    pub fn pause_on(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.inner.gates.lock().unwrap().insert(op, gate.clone());
        gate
    }

    pub fn set_name(&self, id: ParticipantId, name: &str) {
        self.inner.names.lock().unwrap().insert(id, name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.lock().unwrap().len()
    }

    pub fn subscribed_topics(&self) -> Vec<EventTopic> {
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .map(|(topic, _)| *topic)
            .collect()
    }

    /// Deliver an event to every subscriber of its topic.
    pub fn emit(&self, event: SdkEvent) {
        let topic = event.topic();
        let subs = self.inner.subscriptions.lock().unwrap();
        for (t, sink) in subs.values() {
            if *t == topic {
                let _ = sink.send(event.clone());
            }
        }
    }

    async fn step(&self, op: &'static str, call: String) -> Result<(), SdkError> {
        self.inner.calls.lock().unwrap().push(call);
        let gate = self.inner.gates.lock().unwrap().get(op).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.inner.failing.lock().unwrap().contains(op) {
            return Err(SdkError::new(format!("{op} failed")));
        }
        Ok(())
    }
}

pub fn camera_element(id: ParticipantId) -> ElementHandle {
    ElementHandle(10_000 + u64::from(id))
}

pub fn share_elements(id: ParticipantId) -> Vec<ElementHandle> {
    vec![
        ElementHandle(20_000 + u64::from(id)),
        ElementHandle(30_000 + u64::from(id)),
    ]
}

#[async_trait]
impl VideoClient for FakeSdk {
    async fn init(&self, locale: &str, region: &str, _options: InitOptions) -> Result<(), SdkError> {
        self.step("init", format!("init:{locale}:{region}")).await
    }

    async fn join(&self, session: &str, _credential: &str, display_name: &str) -> Result<(), SdkError> {
        self.step("join", format!("join:{session}:{display_name}")).await?;
        *self.inner.joined_as.lock().unwrap() = Some(display_name.to_string());
        Ok(())
    }

    async fn leave(&self) -> Result<(), SdkError> {
        self.step("leave", "leave".into()).await
    }

    fn subscribe(&self, topic: EventTopic, sink: EventSink) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.inner
            .calls
            .lock()
            .unwrap()
            .push(format!("subscribe:{}", topic.as_str()));
        self.inner.subscriptions.lock().unwrap().insert(id, (topic, sink));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Some((topic, _)) = self.inner.subscriptions.lock().unwrap().remove(&id) {
            self.inner
                .calls
                .lock()
                .unwrap()
                .push(format!("unsubscribe:{}", topic.as_str()));
        }
    }

    fn current_user(&self) -> Option<CurrentUser> {
        let name = self.inner.joined_as.lock().unwrap().clone()?;
        Some(CurrentUser {
            user_id: LOCAL_USER_ID,
            display_name: name,
        })
    }

    fn display_name_of(&self, participant: ParticipantId) -> Option<String> {
        if participant == LOCAL_USER_ID {
            return self.inner.joined_as.lock().unwrap().clone();
        }
        self.inner.names.lock().unwrap().get(&participant).cloned()
    }

    fn media_stream(&self) -> Arc<dyn MediaStream> {
        Arc::new(self.clone())
    }

    fn transcription(&self) -> Arc<dyn LiveTranscription> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl MediaStream for FakeSdk {
    async fn start_audio(&self) -> Result<(), SdkError> {
        self.step("start_audio", "start_audio".into()).await
    }

    async fn mute_audio(&self) -> Result<(), SdkError> {
        self.step("mute_audio", "mute_audio".into()).await
    }

    async fn unmute_audio(&self) -> Result<(), SdkError> {
        self.step("unmute_audio", "unmute_audio".into()).await
    }

    async fn start_video(&self) -> Result<(), SdkError> {
        self.step("start_video", "start_video".into()).await
    }

    async fn stop_video(&self) -> Result<(), SdkError> {
        self.step("stop_video", "stop_video".into()).await
    }

    async fn attach_video(
        &self,
        participant: ParticipantId,
        _quality: VideoQuality,
    ) -> Result<AttachedElements, SdkError> {
        self.step("attach_video", format!("attach_video:{participant}")).await?;
        Ok(AttachedElements::Single(camera_element(participant)))
    }

    async fn detach_video(&self, participant: ParticipantId) -> Result<AttachedElements, SdkError> {
        self.step("detach_video", format!("detach_video:{participant}")).await?;
        Ok(AttachedElements::Multiple(vec![camera_element(participant)]))
    }

    async fn attach_share_view(
        &self,
        participant: ParticipantId,
        _quality: VideoQuality,
    ) -> Result<AttachedElements, SdkError> {
        self.step("attach_share_view", format!("attach_share_view:{participant}")).await?;
        Ok(AttachedElements::Multiple(share_elements(participant)))
    }

    async fn detach_share_view(&self, participant: ParticipantId) -> Result<AttachedElements, SdkError> {
        self.step("detach_share_view", format!("detach_share_view:{participant}")).await?;
        Ok(AttachedElements::Multiple(share_elements(participant)))
    }

    async fn start_share_screen(&self, target: ElementHandle) -> Result<(), SdkError> {
        self.step("start_share_screen", format!("start_share_screen:{}", target.0)).await
    }

    async fn stop_share_screen(&self) -> Result<(), SdkError> {
        self.step("stop_share_screen", "stop_share_screen".into()).await
    }
}

#[async_trait]
impl LiveTranscription for FakeSdk {
    async fn start_live_transcription(&self) -> Result<(), SdkError> {
        self.step("start_live_transcription", "start_live_transcription".into()).await
    }

    async fn disable_captions(&self, disable: bool) -> Result<(), SdkError> {
        self.step("disable_captions", format!("disable_captions:{disable}")).await
    }
}

#[derive(Default)]
struct HostInner {
    next_element: u64,
    live: HashSet<ElementHandle>,
    containers: HashMap<Container, Vec<ElementHandle>>,
    labels: HashMap<ElementHandle, String>,
    previews: HashMap<ElementHandle, u64>,
    next_stream: u64,
    capture_ends: HashMap<u64, oneshot::Sender<()>>,
    stopped_captures: Vec<u64>,
    fail_capture: bool,
}

/// Fake element tree and display-capture provider.
#[derive(Default)]
pub struct FakeHost {
    inner: Mutex<HostInner>,
    capture_gate: Mutex<Option<Arc<Notify>>>,
    audio_workaround: bool,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audio_workaround() -> Self {
        Self {
            audio_workaround: true,
            ..Self::default()
        }
    }

    pub fn fail_capture(&self, fail: bool) {
        self.inner.lock().unwrap().fail_capture = fail;
    }

    pub fn pause_capture(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.capture_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Simulate the user stopping the share from the native browser control.
    pub fn end_capture(&self, stream_id: u64) {
        if let Some(tx) = self.inner.lock().unwrap().capture_ends.remove(&stream_id) {
            let _ = tx.send(());
        }
    }

    pub fn is_live(&self, el: ElementHandle) -> bool {
        self.inner.lock().unwrap().live.contains(&el)
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    pub fn container_len(&self, container: Container) -> usize {
        self.inner
            .lock()
            .unwrap()
            .containers
            .get(&container)
            .map_or(0, Vec::len)
    }

    pub fn labels(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let mut labels: Vec<String> = inner
            .labels
            .iter()
            .filter(|(el, _)| inner.live.contains(el))
            .map(|(_, text)| text.clone())
            .collect();
        labels.sort();
        labels
    }

    /// Live preview elements showing a display capture.
    pub fn live_previews(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.previews.keys().filter(|el| inner.live.contains(el)).count()
    }

    pub fn stopped_captures(&self) -> Vec<u64> {
        self.inner.lock().unwrap().stopped_captures.clone()
    }
}

#[async_trait]
impl Host for FakeHost {
    fn create_element(&self, _kind: ElementKind) -> ElementHandle {
        let mut inner = self.inner.lock().unwrap();
        inner.next_element += 1;
        let el = ElementHandle(inner.next_element);
        inner.live.insert(el);
        el
    }

    fn append_to_container(&self, container: Container, child: ElementHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.live.insert(child);
        inner.containers.entry(container).or_default().push(child);
    }

    fn append_child(&self, _parent: ElementHandle, child: ElementHandle) {
        self.inner.lock().unwrap().live.insert(child);
    }

    fn set_text(&self, element: ElementHandle, text: &str) {
        self.inner.lock().unwrap().labels.insert(element, text.to_string());
    }

    fn remove_element(&self, element: ElementHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.live.remove(&element);
        for children in inner.containers.values_mut() {
            children.retain(|el| *el != element);
        }
    }

    async fn get_display_media(&self) -> Result<DisplayCapture, SdkError> {
        let gate = self.capture_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_capture {
            return Err(SdkError::new("permission denied"));
        }
        inner.next_stream += 1;
        let stream_id = inner.next_stream;
        let (tx, ended) = oneshot::channel();
        inner.capture_ends.insert(stream_id, tx);
        Ok(DisplayCapture { stream_id, ended })
    }

    fn attach_capture(&self, element: ElementHandle, stream_id: u64) {
        self.inner.lock().unwrap().previews.insert(element, stream_id);
    }

    fn stop_capture(&self, stream_id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.capture_ends.remove(&stream_id);
        inner.stopped_captures.push(stream_id);
    }

    fn needs_audio_workaround(&self) -> bool {
        self.audio_workaround
    }
}

/// Listener that keeps every event.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<MeetEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<MeetEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl MeetEventListener for EventLog {
    fn on_event(&self, event: MeetEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub struct Fixture {
    pub sdk: FakeSdk,
    pub host: Arc<FakeHost>,
    pub events: Arc<EventLog>,
    pub session: SessionCoordinator,
}

pub fn fixture_with(settings: Settings, host: FakeHost) -> Fixture {
    let sdk = FakeSdk::new();
    let host = Arc::new(host);
    let session = SessionCoordinator::new(
        SessionIdentity::new("room42", Credential::new("signed.jwt.token")),
        settings,
        Arc::new(sdk.clone()),
        host.clone(),
    );
    let events = EventLog::new();
    session.add_listener(events.clone());
    Fixture {
        sdk,
        host,
        events,
        session,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(Settings::default(), FakeHost::new())
}

/// A session already joined as "Alice" in "room42".
pub async fn joined() -> Fixture {
    let f = fixture();
    f.session.request_join("Alice").await.unwrap();
    f
}

/// Let spawned tasks drain whatever is queued.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
