//! The single share slot: a local display capture or one remote share.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::errors::MeetError;
use crate::events::ShareState;
use crate::host::{Container, ElementKind};
use crate::renderer::TileKey;
use crate::sdk::{ElementHandle, ParticipantId};
use crate::session::SessionContext;
use crate::tasks::ScheduledTask;

/// Resources held while the local user is sharing.
pub(crate) struct LocalShare {
    generation: u64,
    preview: ElementHandle,
    stream_id: u64,
    watcher: Option<ScheduledTask>,
}

impl SessionContext {
    pub(crate) async fn is_sharing_locally(&self) -> bool {
        self.local_share.lock().await.is_some()
    }

    /// Capture the display, preview it and publish it through the SDK.
    pub(crate) async fn start_local_share(self: &Arc<Self>) -> Result<(), MeetError> {
        if let ShareState::Remote(id) = self.media_snapshot().await.share {
            return Err(MeetError::Share(format!("participant {id} is already sharing")));
        }

        let capture = self
            .host
            .get_display_media()
            .await
            .map_err(|e| MeetError::Share(format!("display capture: {e}")))?;

        let preview = self.host.create_element(ElementKind::Video);
        self.host.attach_capture(preview, capture.stream_id);
        self.host.append_to_container(Container::Share, preview);

        if let Err(e) = self.client.media_stream().start_share_screen(preview).await {
            self.host.stop_capture(capture.stream_id);
            self.host.remove_element(preview);
            return Err(MeetError::Share(format!("start share: {e}")));
        }

        let generation = self.share_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);
        let ended = capture.ended;
        let watcher = ScheduledTask::spawn("share-end-watcher", async move {
            // A dropped sender means the track is gone too.
            let _ = ended.await;
            if let Some(ctx) = weak.upgrade() {
                ctx.local_share_ended(generation).await;
            }
        });
        let share = LocalShare {
            generation,
            preview,
            stream_id: capture.stream_id,
            watcher: Some(watcher),
        };

        let mut slot = self.local_share.lock().await;
        let claimed = matches!(self.media_snapshot().await.share, ShareState::Remote(_));
        if claimed || !self.is_in_session() {
            drop(slot);
            self.teardown_local_share(share).await;
            return Err(MeetError::Share("share slot was taken while starting".into()));
        }
        *slot = Some(share);
        drop(slot);

        tracing::info!(preview = preview.0, "local screen share started");
        self.update_media(|m| m.share = ShareState::Local).await;
        Ok(())
    }

    /// Stop the local share if there is one. Never fails.
    pub(crate) async fn stop_local_share(&self) {
        let share = self.local_share.lock().await.take();
        if let Some(share) = share {
            tracing::info!("local screen share stopped");
            self.teardown_local_share(share).await;
        }
    }

    /// The capture ended outside our control, e.g. the browser's own
    /// "stop sharing" button.
    async fn local_share_ended(&self, generation: u64) {
        let share = {
            let mut slot = self.local_share.lock().await;
            match slot.as_ref() {
                Some(share) if share.generation == generation => slot.take(),
                _ => None,
            }
        };
        let Some(mut share) = share else { return };
        if let Some(watcher) = share.watcher.take() {
            watcher.detach();
        }
        tracing::info!("display capture ended by host");
        self.teardown_local_share(share).await;
    }

    async fn teardown_local_share(&self, share: LocalShare) {
        if let Err(e) = self.client.media_stream().stop_share_screen().await {
            tracing::warn!("stop share failed: {e}");
        }
        self.host.stop_capture(share.stream_id);
        self.host.remove_element(share.preview);
        self.update_media(|m| {
            if m.share == ShareState::Local {
                m.share = ShareState::Inactive;
            }
        })
        .await;
    }

    /// A remote share takes the slot; a local preview yields to it.
    pub(crate) async fn remote_share_started(
        &self,
        participant_id: ParticipantId,
    ) -> Result<(), MeetError> {
        let local = self.local_share.lock().await.take();
        if let Some(local) = local {
            tracing::info!(participant_id, "remote share replaces local share");
            self.teardown_local_share(local).await;
        }
        self.roster.lock().await.set_sharing(participant_id, true);
        self.update_media(|m| m.share = ShareState::Remote(participant_id))
            .await;
        self.attach_tile(TileKey::share(participant_id)).await
    }

    /// Only the current sharer's stop frees the slot.
    pub(crate) async fn remote_share_stopped(&self, participant_id: ParticipantId) {
        self.roster.lock().await.set_sharing(participant_id, false);
        self.detach_tile(TileKey::share(participant_id)).await;
        self.update_media(|m| {
            if m.share == ShareState::Remote(participant_id) {
                m.share = ShareState::Inactive;
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::MeetError;
    use crate::events::ShareState;
    use crate::host::Container;
    use crate::sdk::{SdkEvent, StreamAction, StreamEvent, StreamKind};
    use crate::testing::{joined, settle};

    fn remote_share(action: StreamAction, id: u32) -> SdkEvent {
        SdkEvent::Stream(StreamEvent {
            kind: StreamKind::Share,
            action,
            participant_id: id,
        })
    }

    #[tokio::test]
    async fn toggle_starts_and_stops_preview() {
        let f = joined().await;

        assert!(f.session.toggle_local_screen_share().await.unwrap());
        assert_eq!(f.host.live_previews(), 1);
        assert_eq!(f.host.container_len(Container::Share), 1);
        assert_eq!(f.session.media_state().await.share, ShareState::Local);

        assert!(!f.session.toggle_local_screen_share().await.unwrap());
        assert_eq!(f.host.live_previews(), 0);
        assert_eq!(f.host.stopped_captures(), vec![1]);
        assert_eq!(f.sdk.count("stop_share_screen"), 1);
        assert_eq!(f.session.media_state().await.share, ShareState::Inactive);
    }

    #[tokio::test]
    async fn rapid_toggles_produce_one_preview() {
        let f = joined().await;
        let gate = f.host.pause_capture();

        let session = f.session.clone();
        let first = tokio::spawn(async move { session.toggle_local_screen_share().await });
        settle().await;
        let second = f.session.toggle_local_screen_share().await;
        assert_eq!(second, Err(MeetError::Busy("screen share")));

        gate.notify_one();
        assert!(first.await.unwrap().unwrap());
        assert_eq!(f.host.live_previews(), 1);
        let starts = f
            .sdk
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("start_share_screen:"))
            .count();
        assert_eq!(starts, 1);
    }

    #[tokio::test]
    async fn denied_capture_leaves_flag_off() {
        let f = joined().await;
        f.host.fail_capture(true);

        let err = f.session.toggle_local_screen_share().await.unwrap_err();
        assert!(matches!(err, MeetError::Share(_)));
        assert_eq!(f.session.media_state().await.share, ShareState::Inactive);
        assert_eq!(f.host.live_previews(), 0);
        assert_eq!(f.session.last_error().await.unwrap().operation, "screen share");
    }

    #[tokio::test]
    async fn sdk_share_failure_cleans_up_preview() {
        let f = joined().await;
        f.sdk.fail_on("start_share_screen");

        assert!(f.session.toggle_local_screen_share().await.is_err());
        assert_eq!(f.host.live_previews(), 0);
        assert_eq!(f.host.stopped_captures(), vec![1]);
        assert!(!f.session.media_state().await.is_sharing());
    }

    #[tokio::test]
    async fn native_stop_control_tears_share_down() {
        let f = joined().await;
        f.session.toggle_local_screen_share().await.unwrap();

        f.host.end_capture(1);
        settle().await;

        assert_eq!(f.host.live_previews(), 0);
        assert_eq!(f.sdk.count("stop_share_screen"), 1);
        assert_eq!(f.session.media_state().await.share, ShareState::Inactive);

        // The next toggle starts a fresh share rather than stopping a dead one.
        assert!(f.session.toggle_local_screen_share().await.unwrap());
    }

    #[tokio::test]
    async fn remote_share_replaces_local_preview() {
        let f = joined().await;
        f.session.toggle_local_screen_share().await.unwrap();

        f.sdk.emit(remote_share(StreamAction::Start, 7));
        settle().await;

        assert_eq!(f.host.live_previews(), 0);
        assert_eq!(f.session.media_state().await.share, ShareState::Remote(7));
        assert_eq!(f.sdk.count("attach_share_view:7"), 1);
    }

    #[tokio::test]
    async fn stop_from_earlier_sharer_keeps_current_share() {
        let f = joined().await;
        f.sdk.emit(remote_share(StreamAction::Start, 7));
        f.sdk.emit(remote_share(StreamAction::Start, 8));
        settle().await;
        assert_eq!(f.session.media_state().await.share, ShareState::Remote(8));

        f.sdk.emit(remote_share(StreamAction::Stop, 7));
        settle().await;
        assert_eq!(f.session.media_state().await.share, ShareState::Remote(8));
        assert_eq!(f.host.container_len(Container::Share), 1);

        f.sdk.emit(remote_share(StreamAction::Stop, 8));
        settle().await;
        assert_eq!(f.session.media_state().await.share, ShareState::Inactive);
        assert_eq!(f.host.container_len(Container::Share), 0);
    }

    #[tokio::test]
    async fn local_share_refused_while_peer_shares() {
        let f = joined().await;
        f.sdk.emit(remote_share(StreamAction::Start, 7));
        settle().await;

        let err = f.session.toggle_local_screen_share().await.unwrap_err();
        assert!(matches!(err, MeetError::Share(_)));
        assert_eq!(f.host.live_previews(), 0);
    }

    #[tokio::test]
    async fn leave_stops_active_share() {
        let f = joined().await;
        f.session.toggle_local_screen_share().await.unwrap();

        f.session.leave().await;
        assert_eq!(f.host.live_previews(), 0);
        assert_eq!(f.sdk.count("stop_share_screen"), 1);
        assert_eq!(f.host.live_count(), 0);
    }
}
