use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, mpsc, watch};

use crate::captions::CaptionFeed;
use crate::chat::{ChatService, ChatState};
use crate::controls::{MeetingControls, OpGuards};
use crate::errors::MeetError;
use crate::events::{
    Caption, EventEmitter, MeetEvent, MeetEventListener, MediaState, SessionState, UserError,
};
use crate::host::Host;
use crate::identity::{DisplayName, SessionIdentity};
use crate::participants::{ParticipantRoster, RosterEntry};
use crate::renderer::{TileKey, TileRenderer};
use crate::sdk::{
    CurrentUser, ElementHandle, EventTopic, InitOptions, ParticipantId, SdkError, SdkEvent,
    StreamAction, StreamEvent, StreamKind, SubscriptionId, VideoClient,
};
use crate::settings::Settings;
use crate::share::LocalShare;
use crate::tasks::ScheduledTask;
use crate::timer::ElapsedTimer;

/// Owns the SDK client and sequences join, render and leave.
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct SessionCoordinator {
    ctx: Arc<SessionContext>,
}

/// Shared state behind the coordinator, its controls and its chat.
pub(crate) struct SessionContext {
    pub(crate) identity: SessionIdentity,
    pub(crate) settings: Settings,
    pub(crate) client: Arc<dyn VideoClient>,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) emitter: EventEmitter,
    pub(crate) renderer: TileRenderer,
    pub(crate) roster: Mutex<ParticipantRoster>,
    pub(crate) media: Mutex<MediaState>,
    pub(crate) local_share: Mutex<Option<LocalShare>>,
    pub(crate) share_generation: AtomicU64,
    pub(crate) captions: Mutex<CaptionFeed>,
    pub(crate) ops: OpGuards,
    pub(crate) chat: Arc<ChatState>,
    pub(crate) elapsed: ElapsedTimer,
    state: watch::Sender<SessionState>,
    audio_ready: watch::Sender<bool>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    dispatcher: Mutex<Option<ScheduledTask>>,
    initialized: AtomicBool,
    sdk_joined: AtomicBool,
    pub(crate) audio_started: AtomicBool,
    local_user: Mutex<Option<CurrentUser>>,
    last_error: Mutex<Option<UserError>>,
}

impl SessionCoordinator {
    pub fn new(
        identity: SessionIdentity,
        settings: Settings,
        client: Arc<dyn VideoClient>,
        host: Arc<dyn Host>,
    ) -> Self {
        let max_captions = settings.max_captions;
        let ctx = SessionContext {
            identity,
            settings,
            client,
            renderer: TileRenderer::new(host.clone()),
            host,
            emitter: EventEmitter::new(),
            roster: Mutex::new(ParticipantRoster::new()),
            media: Mutex::new(MediaState::default()),
            local_share: Mutex::new(None),
            share_generation: AtomicU64::new(0),
            captions: Mutex::new(CaptionFeed::new(max_captions)),
            ops: OpGuards::default(),
            chat: Arc::new(ChatState::new()),
            elapsed: ElapsedTimer::new(),
            state: watch::Sender::new(SessionState::Idle),
            audio_ready: watch::Sender::new(false),
            subscriptions: Mutex::new(Vec::new()),
            dispatcher: Mutex::new(None),
            initialized: AtomicBool::new(false),
            sdk_joined: AtomicBool::new(false),
            audio_started: AtomicBool::new(false),
            local_user: Mutex::new(None),
            last_error: Mutex::new(None),
        };
        Self { ctx: Arc::new(ctx) }
    }

    /// Register a listener for session events.
    pub fn add_listener(&self, listener: Arc<dyn MeetEventListener>) {
        self.ctx.emitter.add_listener(listener);
    }

    /// Create MeetingControls bound to this session.
    pub fn controls(&self) -> MeetingControls {
        MeetingControls::new(self.ctx.clone())
    }

    /// Create a ChatService bound to this session.
    pub fn chat(&self) -> ChatService {
        ChatService::new(
            self.ctx.chat.clone(),
            self.ctx.emitter.clone(),
            self.ctx.state.subscribe(),
            self.ctx.settings.chat_simulation_interval(),
        )
    }

    pub fn session_name(&self) -> &str {
        &self.ctx.identity.session_name
    }

    pub fn settings(&self) -> &Settings {
        &self.ctx.settings
    }

    pub fn state(&self) -> SessionState {
        self.ctx.state()
    }

    /// Watch state transitions without registering a listener.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.ctx.state.subscribe()
    }

    pub async fn media_state(&self) -> MediaState {
        self.ctx.media_snapshot().await
    }

    pub async fn local_user(&self) -> Option<CurrentUser> {
        self.ctx.local_user.lock().await.clone()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.ctx.elapsed.seconds()
    }

    pub fn tile_count(&self) -> usize {
        self.ctx.renderer.tile_count()
    }

    pub fn attached_tiles(&self) -> Vec<TileKey> {
        self.ctx.renderer.attached_keys()
    }

    pub async fn participants(&self) -> Vec<RosterEntry> {
        self.ctx.roster.lock().await.entries().to_vec()
    }

    pub async fn captions(&self) -> Vec<Caption> {
        self.ctx.captions.lock().await.snapshot()
    }

    /// Most recent failure surfaced to the user, if any.
    pub async fn last_error(&self) -> Option<UserError> {
        self.ctx.last_error.lock().await.clone()
    }

    /// Enter the session under `name`.
    ///
    /// Subscribes to peer events before issuing the join so early events are
    /// buffered rather than lost. On failure the coordinator returns to
    /// `Idle` and the error is surfaced; nothing is retried.
    pub async fn request_join(&self, name: &str) -> Result<(), MeetError> {
        let name = DisplayName::parse(name)?;
        self.ctx
            .transition(SessionState::Idle, SessionState::Initializing, "join")?;
        tracing::info!(session = %self.ctx.identity.session_name, "joining session as {name}");

        match self.ctx.run_join(&name).await {
            Ok(()) => Ok(()),
            Err(MeetError::Cancelled) => {
                tracing::info!("join abandoned: session is being left");
                // The SDK join may have landed after leave checked for it.
                if self.ctx.sdk_joined.swap(false, Ordering::SeqCst) {
                    if let Err(e) = self.ctx.client.leave().await {
                        tracing::warn!("SDK leave failed: {e}");
                    }
                }
                Err(MeetError::Cancelled)
            }
            Err(e) => {
                tracing::error!("join failed: {e}");
                self.ctx.unsubscribe_all().await;
                self.ctx.stop_dispatcher().await;
                let state = self.ctx.state();
                if matches!(state, SessionState::Initializing | SessionState::Joining)
                    && self.ctx.transition(state, SessionState::Idle, "join").is_ok()
                {
                    self.ctx.report("join", &e).await;
                }
                Err(e)
            }
        }
    }

    /// Leave the session and navigate away. Safe to call repeatedly.
    pub async fn leave(&self) {
        self.ctx.leave().await;
    }

    /// Handle a camera stream change for `participant_id`.
    pub async fn on_remote_video_event(
        &self,
        action: StreamAction,
        participant_id: ParticipantId,
    ) -> Result<(), MeetError> {
        self.ctx.ensure_in_session("render video")?;
        self.ctx
            .handle_stream_event(StreamEvent {
                kind: StreamKind::Camera,
                action,
                participant_id,
            })
            .await
    }

    /// Handle a screen-share stream change for `participant_id`.
    pub async fn on_remote_share_event(
        &self,
        action: StreamAction,
        participant_id: ParticipantId,
    ) -> Result<(), MeetError> {
        self.ctx.ensure_in_session("render share")?;
        self.ctx
            .handle_stream_event(StreamEvent {
                kind: StreamKind::Share,
                action,
                participant_id,
            })
            .await
    }

    pub async fn toggle_local_screen_share(&self) -> Result<bool, MeetError> {
        self.controls().toggle_screen_share().await
    }

    pub async fn toggle_captioning(&self) -> Result<bool, MeetError> {
        self.controls().toggle_captioning().await
    }
}

impl SessionContext {
    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub(crate) fn is_in_session(&self) -> bool {
        self.state() == SessionState::InSession
    }

    pub(crate) fn ensure_in_session(&self, op: &'static str) -> Result<(), MeetError> {
        match self.state() {
            SessionState::InSession => Ok(()),
            state => Err(MeetError::InvalidState { op, state }),
        }
    }

    /// Move `from` → `to` atomically; fails if the state moved elsewhere.
    pub(crate) fn transition(
        &self,
        from: SessionState,
        to: SessionState,
        op: &'static str,
    ) -> Result<(), MeetError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                outcome = Err(MeetError::InvalidState { op, state: *state });
                false
            }
        });
        if outcome.is_ok() {
            tracing::info!("session state: {from:?} -> {to:?}");
            self.emitter.emit(MeetEvent::SessionStateChanged(to));
        }
        outcome
    }

    pub(crate) async fn media_snapshot(&self) -> MediaState {
        *self.media.lock().await
    }

    pub(crate) async fn update_media(&self, apply: impl FnOnce(&mut MediaState)) {
        let snapshot = {
            let mut media = self.media.lock().await;
            let before = *media;
            apply(&mut media);
            if *media == before {
                return;
            }
            *media
        };
        self.emitter.emit(MeetEvent::MediaStateChanged(snapshot));
    }

    /// Log a failure and make it visible to the UI.
    pub(crate) async fn report(&self, operation: &str, err: &MeetError) {
        tracing::error!(operation, "{err}");
        let user_error = UserError {
            operation: operation.to_string(),
            message: err.to_string(),
        };
        *self.last_error.lock().await = Some(user_error.clone());
        self.emitter.emit(MeetEvent::ErrorRaised(user_error));
    }

    /// Run an SDK call that a concurrent leave may abandon.
    async fn cancellable<T>(
        &self,
        call: impl Future<Output = Result<T, SdkError>>,
        wrap: fn(String) -> MeetError,
    ) -> Result<T, MeetError> {
        let states = self.state.subscribe();
        tokio::select! {
            result = call => result.map_err(|e| wrap(e.to_string())),
            _ = until_leaving(states) => Err(MeetError::Cancelled),
        }
    }

    async fn run_join(self: &Arc<Self>, name: &DisplayName) -> Result<(), MeetError> {
        if !self.initialized.load(Ordering::SeqCst) {
            let options = InitOptions {
                patch_js_media: self.settings.patch_js_media,
            };
            self.cancellable(
                self.client
                    .init(&self.settings.locale, &self.settings.region, options),
                MeetError::Init,
            )
            .await?;
            self.initialized.store(true, Ordering::SeqCst);
        }

        self.subscribe_events().await;
        self.advance(SessionState::Initializing, SessionState::Joining)?;

        self.cancellable(
            self.client.join(
                &self.identity.session_name,
                self.identity.credential.expose(),
                name.as_str(),
            ),
            MeetError::Join,
        )
        .await?;
        self.sdk_joined.store(true, Ordering::SeqCst);

        let Some(user) = self.client.current_user() else {
            self.sdk_joined.store(false, Ordering::SeqCst);
            if let Err(e) = self.client.leave().await {
                tracing::warn!("leave after incomplete join failed: {e}");
            }
            return Err(MeetError::Join("SDK reported no local user".into()));
        };
        self.roster.lock().await.set_local_id(user.user_id);
        *self.local_user.lock().await = Some(user.clone());

        self.advance(SessionState::Joining, SessionState::InSession)?;
        self.elapsed.start(self.emitter.clone());

        self.start_local_media(&user).await;
        if self.settings.captions_on_join && self.is_in_session() {
            if let Err(e) = self.start_captioning().await {
                self.report("start captions", &e).await;
            }
        }
        Ok(())
    }

    /// A join step transition; losing the race to leave means cancellation.
    fn advance(&self, from: SessionState, to: SessionState) -> Result<(), MeetError> {
        self.transition(from, to, "join").map_err(|_| MeetError::Cancelled)
    }

    async fn subscribe_events(self: &Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = vec![
            EventTopic::PeerVideoStateChange,
            EventTopic::PeerShareStateChange,
            EventTopic::CaptionMessage,
            EventTopic::UserRemoved,
        ];
        if self.host.needs_audio_workaround() {
            topics.push(EventTopic::MediaSdkChange);
        }

        let ids: Vec<SubscriptionId> = topics
            .into_iter()
            .map(|topic| self.client.subscribe(topic, tx.clone()))
            .collect();
        self.subscriptions.lock().await.extend(ids);

        let task = ScheduledTask::spawn(
            "sdk-event-dispatcher",
            dispatch_events(Arc::downgrade(self), self.state.subscribe(), rx),
        );
        *self.dispatcher.lock().await = Some(task);
    }

    async fn unsubscribe_all(&self) {
        let ids: Vec<SubscriptionId> = self.subscriptions.lock().await.drain(..).collect();
        for id in ids {
            self.client.unsubscribe(id);
        }
    }

    async fn stop_dispatcher(&self) {
        self.dispatcher.lock().await.take();
    }

    /// Let the dispatcher finish the event in hand, then wait for it to exit.
    /// Only valid once the state is `Leaving`.
    async fn drain_dispatcher(&self) {
        let task = self.dispatcher.lock().await.take();
        if let Some(task) = task {
            task.join().await;
        }
    }

    async fn start_local_media(&self, user: &CurrentUser) {
        let media = self.client.media_stream();

        if self.settings.mic_enabled_on_join {
            match self.start_audio().await {
                Ok(()) => self.update_media(|m| m.microphone_muted = false).await,
                Err(e) => {
                    self.report("start microphone", &MeetError::media("start audio", e))
                        .await
                }
            }
        }

        if !self.settings.camera_enabled_on_join || !self.is_in_session() {
            return;
        }
        match media.start_video().await {
            Ok(()) => {
                self.update_media(|m| m.camera_muted = false).await;
                if let Err(e) = self.attach_own_tile(user.user_id).await {
                    self.report("render own video", &e).await;
                }
            }
            Err(e) => {
                self.report("start camera", &MeetError::media("start video", e))
                    .await
            }
        }
    }

    /// Start audio, waiting for the encoder first on hosts that need it.
    pub(crate) async fn start_audio(&self) -> Result<(), SdkError> {
        if self.host.needs_audio_workaround() {
            let mut ready = self.audio_ready.subscribe();
            let wait = async move {
                loop {
                    if *ready.borrow_and_update() {
                        return;
                    }
                    if ready.changed().await.is_err() {
                        return;
                    }
                }
            };
            if tokio::time::timeout(self.settings.audio_workaround_timeout(), wait)
                .await
                .is_err()
            {
                tracing::warn!("audio encoder never reported ready; starting audio anyway");
            }
        }
        self.client.media_stream().start_audio().await?;
        self.audio_started.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub(crate) async fn attach_own_tile(&self, user_id: ParticipantId) -> Result<(), MeetError> {
        self.ensure_in_session("render own video")?;
        self.attach_tile(TileKey::camera(user_id)).await
    }

    pub(crate) async fn local_user_id(&self) -> Option<ParticipantId> {
        self.roster.lock().await.local_id()
    }

    async fn handle_sdk_event(self: &Arc<Self>, event: SdkEvent) {
        match event {
            SdkEvent::Stream(ev) => {
                if let Err(e) = self.handle_stream_event(ev).await {
                    self.report("render stream", &e).await;
                }
            }
            SdkEvent::CaptionMessage(caption) => self.record_caption(caption).await,
            SdkEvent::UsersRemoved(ids) => {
                for id in ids {
                    self.handle_departure(id).await;
                }
            }
            SdkEvent::AudioEncoderReady => {
                tracing::debug!("audio encoder ready");
                self.audio_ready.send_replace(true);
            }
        }
    }

    pub(crate) async fn handle_stream_event(&self, ev: StreamEvent) -> Result<(), MeetError> {
        tracing::debug!(
            participant_id = ev.participant_id,
            "stream event: {:?} {:?}",
            ev.kind,
            ev.action
        );
        let key = TileKey {
            participant_id: ev.participant_id,
            kind: ev.kind,
        };
        match (ev.kind, ev.action) {
            (StreamKind::Camera, StreamAction::Start) => {
                self.roster.lock().await.set_video(ev.participant_id, true);
                self.attach_tile(key).await
            }
            (StreamKind::Camera, StreamAction::Stop) => {
                self.roster.lock().await.set_video(ev.participant_id, false);
                self.detach_tile(key).await;
                Ok(())
            }
            (StreamKind::Share, StreamAction::Start) => {
                self.remote_share_started(ev.participant_id).await
            }
            (StreamKind::Share, StreamAction::Stop) => {
                self.remote_share_stopped(ev.participant_id).await;
                Ok(())
            }
        }
    }

    async fn handle_departure(&self, participant_id: ParticipantId) {
        tracing::info!(participant_id, "participant left");
        for tile in self.renderer.take_participant(participant_id) {
            let key = tile.key;
            let returned = self.sdk_detach(key).await;
            self.renderer.discard(tile, returned);
            self.emitter.emit(MeetEvent::TileDetached {
                participant_id: key.participant_id,
                kind: key.kind,
            });
        }
        self.roster.lock().await.remove(participant_id);
        self.update_media(|m| {
            if m.share == crate::events::ShareState::Remote(participant_id) {
                m.share = crate::events::ShareState::Inactive;
            }
        })
        .await;
    }

    /// Ask the SDK for the stream element(s) and place them as a tile.
    pub(crate) async fn attach_tile(&self, key: TileKey) -> Result<(), MeetError> {
        let Some(ticket) = self.renderer.begin_attach(key) else {
            tracing::debug!(participant_id = key.participant_id, "{:?} tile already present", key.kind);
            return Ok(());
        };

        let media = self.client.media_stream();
        let quality = self.settings.video_quality;
        let result = match key.kind {
            StreamKind::Camera => media.attach_video(key.participant_id, quality).await,
            StreamKind::Share => media.attach_share_view(key.participant_id, quality).await,
        };
        let attached = match result {
            Ok(attached) => attached,
            Err(e) => {
                self.renderer.abandon(ticket);
                return Err(MeetError::render("attach", e));
            }
        };

        let label = self.client.display_name_of(key.participant_id);
        match self.renderer.commit(ticket, attached, label.as_deref()) {
            Ok(()) => {
                tracing::debug!(participant_id = key.participant_id, "{:?} tile attached", key.kind);
                self.emitter.emit(MeetEvent::TileAttached {
                    participant_id: key.participant_id,
                    kind: key.kind,
                });
            }
            Err(stale) => {
                tracing::debug!(
                    participant_id = key.participant_id,
                    "{:?} stream stopped while attaching, releasing",
                    key.kind
                );
                let returned = self.sdk_detach(key).await;
                self.renderer.discard_elements(&merge(stale, returned));
            }
        }
        Ok(())
    }

    /// Remove the tile for `key`. No SDK call is made when nothing is attached.
    pub(crate) async fn detach_tile(&self, key: TileKey) -> bool {
        let Some(tile) = self.renderer.take(key) else {
            tracing::debug!(participant_id = key.participant_id, "no {:?} tile to detach", key.kind);
            return false;
        };
        let returned = self.sdk_detach(key).await;
        self.renderer.discard(tile, returned);
        self.emitter.emit(MeetEvent::TileDetached {
            participant_id: key.participant_id,
            kind: key.kind,
        });
        true
    }

    async fn sdk_detach(&self, key: TileKey) -> Vec<ElementHandle> {
        let media = self.client.media_stream();
        let result = match key.kind {
            StreamKind::Camera => media.detach_video(key.participant_id).await,
            StreamKind::Share => media.detach_share_view(key.participant_id).await,
        };
        match result {
            Ok(elements) => elements.into_vec(),
            Err(e) => {
                tracing::warn!(participant_id = key.participant_id, "detach failed: {e}");
                Vec::new()
            }
        }
    }

    pub(crate) async fn leave(&self) {
        let previous = self.state();
        if matches!(previous, SessionState::Leaving | SessionState::Left) {
            tracing::debug!("leave ignored: already {previous:?}");
            return;
        }
        if self
            .transition(previous, SessionState::Leaving, "leave")
            .is_err()
        {
            // Lost a race with another transition; whoever won owns teardown.
            tracing::debug!("leave ignored: state changed concurrently");
            return;
        }

        self.unsubscribe_all().await;
        self.drain_dispatcher().await;
        self.elapsed.stop();
        self.chat.reset().await;

        if let Err(e) = self.stop_captioning().await {
            tracing::warn!("stopping captions during leave failed: {e}");
            self.update_media(|m| m.captioning = false).await;
        }
        self.stop_local_share().await;

        for tile in self.renderer.take_all() {
            let key = tile.key;
            let returned = self.sdk_detach(key).await;
            self.renderer.discard(tile, returned);
            self.emitter.emit(MeetEvent::TileDetached {
                participant_id: key.participant_id,
                kind: key.kind,
            });
        }

        if self.sdk_joined.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.client.leave().await {
                tracing::warn!("SDK leave failed: {e}");
            }
        }

        self.roster.lock().await.clear();
        self.audio_started.store(false, Ordering::SeqCst);
        self.update_media(|m| *m = MediaState::default()).await;
        let _ = self.transition(SessionState::Leaving, SessionState::Left, "leave");
        tracing::info!("left session {}", self.identity.session_name);
        self.emitter
            .emit(MeetEvent::NavigateTo(self.settings.exit_url.clone()));
    }
}

fn merge(mut first: Vec<ElementHandle>, second: Vec<ElementHandle>) -> Vec<ElementHandle> {
    for el in second {
        if !first.contains(&el) {
            first.push(el);
        }
    }
    first
}

async fn until_leaving(mut states: watch::Receiver<SessionState>) {
    loop {
        if matches!(
            *states.borrow_and_update(),
            SessionState::Leaving | SessionState::Left
        ) {
            return;
        }
        if states.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Consume SDK events in delivery order.
///
/// Events that arrive while the join is still in flight stay queued until
/// the session is live; a join that ends any other way drops them.
async fn dispatch_events(
    ctx: Weak<SessionContext>,
    mut states: watch::Receiver<SessionState>,
    mut events: mpsc::UnboundedReceiver<SdkEvent>,
) {
    loop {
        match *states.borrow_and_update() {
            SessionState::InSession => break,
            SessionState::Initializing | SessionState::Joining => {}
            _ => return,
        }
        if states.changed().await.is_err() {
            return;
        }
    }

    let leaving = until_leaving(states);
    tokio::pin!(leaving);
    loop {
        // Queued events are dropped once leave starts; the one in hand finishes.
        let event = tokio::select! {
            biased;
            _ = &mut leaving => None,
            event = events.recv() => event,
        };
        let Some(event) = event else { break };
        let Some(ctx) = ctx.upgrade() else { break };
        ctx.handle_sdk_event(event).await;
    }
    tracing::debug!("sdk event dispatcher ended");
}
