use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::Mutex;

use crate::errors::MeetError;
use crate::events::MediaState;
use crate::renderer::TileKey;
use crate::session::SessionContext;

/// One guard per control. Held for the whole toggle so a second press
/// while the first is in flight is refused instead of racing it.
#[derive(Default)]
pub(crate) struct OpGuards {
    camera: Mutex<()>,
    microphone: Mutex<()>,
    share: Mutex<()>,
    captions: Mutex<()>,
}

/// What a control button should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlButton {
    pub label: &'static str,
    pub active: bool,
    /// A toggle is in flight; the button should be disabled.
    pub pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlView {
    pub camera: ControlButton,
    pub microphone: ControlButton,
    pub screen_share: ControlButton,
    pub captions: ControlButton,
}

impl ControlView {
    fn new(media: &MediaState, guards: &OpGuards) -> Self {
        let camera_on = !media.camera_muted;
        let mic_on = !media.microphone_muted;
        let sharing = media.is_sharing_locally();
        Self {
            camera: ControlButton {
                label: if camera_on { "Stop Video" } else { "Start Video" },
                active: camera_on,
                pending: guards.camera.try_lock().is_err(),
            },
            microphone: ControlButton {
                label: if mic_on { "Mute" } else { "Unmute" },
                active: mic_on,
                pending: guards.microphone.try_lock().is_err(),
            },
            screen_share: ControlButton {
                label: if sharing {
                    "Stop Screen Share"
                } else {
                    "Start Screen Share"
                },
                active: sharing,
                pending: guards.share.try_lock().is_err(),
            },
            captions: ControlButton {
                label: if media.captioning {
                    "Stop Transcription"
                } else {
                    "Start Transcription"
                },
                active: media.captioning,
                pending: guards.captions.try_lock().is_err(),
            },
        }
    }
}

/// The in-session control bar. Every action maps to one session operation.
pub struct MeetingControls {
    session: Arc<SessionContext>,
}

impl MeetingControls {
    pub(crate) fn new(session: Arc<SessionContext>) -> Self {
        Self { session }
    }

    /// Buttons to render; `None` outside a live session.
    pub async fn view(&self) -> Option<ControlView> {
        if !self.session.is_in_session() {
            return None;
        }
        let media = self.session.media_snapshot().await;
        Some(ControlView::new(&media, &self.session.ops))
    }

    /// Returns whether the camera is now on.
    pub async fn toggle_camera(&self) -> Result<bool, MeetError> {
        let _pending = self
            .session
            .ops
            .camera
            .try_lock()
            .map_err(|_| MeetError::Busy("camera"))?;
        self.session.ensure_in_session("toggle camera")?;

        let result = if self.session.media_snapshot().await.camera_muted {
            self.camera_on().await.map(|()| true)
        } else {
            self.camera_off().await.map(|()| false)
        };
        self.surface("camera", result).await
    }

    async fn camera_on(&self) -> Result<(), MeetError> {
        self.session
            .client
            .media_stream()
            .start_video()
            .await
            .map_err(|e| MeetError::media("start video", e))?;
        tracing::info!("camera enabled");
        self.session.update_media(|m| m.camera_muted = false).await;
        if let Some(id) = self.session.local_user_id().await {
            self.session.attach_own_tile(id).await?;
        }
        Ok(())
    }

    async fn camera_off(&self) -> Result<(), MeetError> {
        self.session
            .client
            .media_stream()
            .stop_video()
            .await
            .map_err(|e| MeetError::media("stop video", e))?;
        tracing::info!("camera disabled");
        self.session.update_media(|m| m.camera_muted = true).await;
        if let Some(id) = self.session.local_user_id().await {
            self.session.detach_tile(TileKey::camera(id)).await;
        }
        Ok(())
    }

    /// Returns whether the microphone is now live.
    pub async fn toggle_microphone(&self) -> Result<bool, MeetError> {
        let _pending = self
            .session
            .ops
            .microphone
            .try_lock()
            .map_err(|_| MeetError::Busy("microphone"))?;
        self.session.ensure_in_session("toggle microphone")?;

        let media = self.session.client.media_stream();
        let result = if self.session.media_snapshot().await.microphone_muted {
            let started = if self.session.audio_started.load(Ordering::SeqCst) {
                media.unmute_audio().await
            } else {
                self.session.start_audio().await
            };
            match started {
                Ok(()) => {
                    self.session
                        .update_media(|m| m.microphone_muted = false)
                        .await;
                    Ok(true)
                }
                Err(e) => Err(MeetError::media("unmute", e)),
            }
        } else {
            match media.mute_audio().await {
                Ok(()) => {
                    self.session
                        .update_media(|m| m.microphone_muted = true)
                        .await;
                    Ok(false)
                }
                Err(e) => Err(MeetError::media("mute", e)),
            }
        };
        self.surface("microphone", result).await
    }

    /// Returns whether the local user is now sharing.
    pub async fn toggle_screen_share(&self) -> Result<bool, MeetError> {
        let _pending = self
            .session
            .ops
            .share
            .try_lock()
            .map_err(|_| MeetError::Busy("screen share"))?;
        self.session.ensure_in_session("toggle screen share")?;

        let result = if self.session.is_sharing_locally().await {
            self.session.stop_local_share().await;
            Ok(false)
        } else {
            self.session.start_local_share().await.map(|()| true)
        };
        self.surface("screen share", result).await
    }

    /// Returns whether captions are now on.
    pub async fn toggle_captioning(&self) -> Result<bool, MeetError> {
        let _pending = self
            .session
            .ops
            .captions
            .try_lock()
            .map_err(|_| MeetError::Busy("captions"))?;
        self.session.ensure_in_session("toggle captions")?;

        let result = if self.session.media_snapshot().await.captioning {
            self.session.stop_captioning().await.map(|()| false)
        } else {
            self.session.start_captioning().await.map(|()| true)
        };
        self.surface("captions", result).await
    }

    pub async fn leave(&self) {
        self.session.leave().await;
    }

    async fn surface(&self, operation: &str, result: Result<bool, MeetError>) -> Result<bool, MeetError> {
        if let Err(e) = &result {
            self.session.report(operation, e).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionState;
    use crate::settings::Settings;
    use crate::testing::{FakeHost, LOCAL_USER_ID, fixture, fixture_with, joined};

    #[tokio::test]
    async fn labels_follow_media_state() {
        let f = joined().await;
        let controls = f.session.controls();

        let view = controls.view().await.unwrap();
        assert_eq!(view.camera.label, "Stop Video");
        assert_eq!(view.microphone.label, "Mute");
        assert_eq!(view.screen_share.label, "Start Screen Share");
        assert_eq!(view.captions.label, "Start Transcription");

        controls.toggle_camera().await.unwrap();
        controls.toggle_microphone().await.unwrap();
        controls.toggle_screen_share().await.unwrap();
        controls.toggle_captioning().await.unwrap();

        let view = controls.view().await.unwrap();
        assert_eq!(view.camera.label, "Start Video");
        assert_eq!(view.microphone.label, "Unmute");
        assert_eq!(view.screen_share.label, "Stop Screen Share");
        assert_eq!(view.captions.label, "Stop Transcription");
        assert!(!view.camera.pending);
    }

    #[tokio::test]
    async fn no_controls_outside_session() {
        let f = fixture();
        assert!(f.session.controls().view().await.is_none());

        let err = f.session.controls().toggle_camera().await.unwrap_err();
        assert_eq!(
            err,
            MeetError::InvalidState {
                op: "toggle camera",
                state: SessionState::Idle
            }
        );
    }

    #[tokio::test]
    async fn camera_toggle_removes_and_restores_own_tile() {
        let f = joined().await;
        let controls = f.session.controls();

        assert!(!controls.toggle_camera().await.unwrap());
        assert!(f.session.attached_tiles().is_empty());
        assert_eq!(f.sdk.count("stop_video"), 1);

        assert!(controls.toggle_camera().await.unwrap());
        assert_eq!(
            f.session.attached_tiles(),
            vec![TileKey::camera(LOCAL_USER_ID)]
        );
        assert_eq!(f.sdk.count("attach_video:1"), 2);
    }

    #[tokio::test]
    async fn failed_camera_start_keeps_flag() {
        let f = joined().await;
        let controls = f.session.controls();
        controls.toggle_camera().await.unwrap();

        f.sdk.fail_on("start_video");
        assert!(controls.toggle_camera().await.is_err());
        assert!(f.session.media_state().await.camera_muted);
        assert_eq!(f.session.last_error().await.unwrap().operation, "camera");
    }

    #[tokio::test]
    async fn microphone_starts_audio_when_never_started() {
        let settings = Settings {
            mic_enabled_on_join: false,
            ..Settings::default()
        };
        let f = fixture_with(settings, FakeHost::new());
        f.session.request_join("Alice").await.unwrap();
        let controls = f.session.controls();

        assert!(controls.toggle_microphone().await.unwrap());
        assert_eq!(f.sdk.count("start_audio"), 1);
        assert_eq!(f.sdk.count("unmute_audio"), 0);

        assert!(!controls.toggle_microphone().await.unwrap());
        assert!(controls.toggle_microphone().await.unwrap());
        assert_eq!(f.sdk.count("mute_audio"), 1);
        assert_eq!(f.sdk.count("unmute_audio"), 1);
    }

    #[tokio::test]
    async fn pending_toggle_disables_button() {
        let f = joined().await;
        let gate = f.sdk.pause_on("stop_video");
        let controls = Arc::new(f.session.controls());

        let c = controls.clone();
        let toggle = tokio::spawn(async move { c.toggle_camera().await });
        crate::testing::settle().await;

        assert!(controls.view().await.unwrap().camera.pending);
        assert_eq!(controls.toggle_camera().await, Err(MeetError::Busy("camera")));

        gate.notify_one();
        assert!(!toggle.await.unwrap().unwrap());
        assert!(!controls.view().await.unwrap().camera.pending);
    }

    #[tokio::test]
    async fn leave_from_controls_navigates_home() {
        let f = joined().await;
        f.session.controls().leave().await;
        assert_eq!(f.session.state(), SessionState::Left);
        assert!(controls_hidden(&f.session).await);
    }

    async fn controls_hidden(session: &crate::session::SessionCoordinator) -> bool {
        session.controls().view().await.is_none()
    }
}
