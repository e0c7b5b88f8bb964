use std::collections::VecDeque;

use crate::errors::MeetError;
use crate::events::{Caption, MeetEvent};
use crate::session::SessionContext;

/// Most recent captions, oldest first.
#[derive(Debug, Clone)]
pub struct CaptionFeed {
    captions: VecDeque<Caption>,
    capacity: usize,
}

impl CaptionFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            captions: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, caption: Caption) {
        if self.captions.len() == self.capacity {
            self.captions.pop_front();
        }
        self.captions.push_back(caption);
    }

    pub fn snapshot(&self) -> Vec<Caption> {
        self.captions.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.captions.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.captions.is_empty()
    }

    pub fn clear(&mut self) {
        self.captions.clear();
    }
}

impl SessionContext {
    pub(crate) async fn start_captioning(&self) -> Result<(), MeetError> {
        if self.media_snapshot().await.captioning {
            return Ok(());
        }
        self.client
            .transcription()
            .start_live_transcription()
            .await
            .map_err(|e| MeetError::Caption(format!("start transcription: {e}")))?;

        if !self.is_in_session() {
            // Left while the request was in flight.
            if let Err(e) = self.client.transcription().disable_captions(true).await {
                tracing::warn!("disable captions after leave failed: {e}");
            }
            return Err(MeetError::Caption("session ended while starting".into()));
        }
        tracing::info!("live transcription started");
        self.update_media(|m| m.captioning = true).await;
        Ok(())
    }

    /// Disable captions if they are on. The flag stays set when the SDK refuses.
    pub(crate) async fn stop_captioning(&self) -> Result<(), MeetError> {
        if !self.media_snapshot().await.captioning {
            return Ok(());
        }
        self.client
            .transcription()
            .disable_captions(true)
            .await
            .map_err(|e| MeetError::Caption(format!("disable captions: {e}")))?;
        tracing::info!("live transcription stopped");
        self.update_media(|m| m.captioning = false).await;
        self.captions.lock().await.clear();
        Ok(())
    }

    pub(crate) async fn record_caption(&self, caption: Caption) {
        if !self.media_snapshot().await.captioning {
            tracing::debug!("caption dropped: captioning is off");
            return;
        }
        self.captions.lock().await.push(caption.clone());
        self.emitter.emit(MeetEvent::CaptionReceived(caption));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::SdkEvent;
    use crate::testing::{joined, settle};

    fn caption(text: &str) -> Caption {
        Caption {
            participant_id: Some(7),
            display_name: "Bob".into(),
            text: text.into(),
            language: Some("en".into()),
            done: true,
        }
    }

    #[test]
    fn feed_keeps_most_recent() {
        let mut feed = CaptionFeed::new(2);
        feed.push(caption("one"));
        feed.push(caption("two"));
        feed.push(caption("three"));

        let texts: Vec<String> = feed.snapshot().into_iter().map(|c| c.text).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn zero_capacity_still_holds_one() {
        let mut feed = CaptionFeed::new(0);
        feed.push(caption("only"));
        assert_eq!(feed.len(), 1);
    }

    #[tokio::test]
    async fn toggle_on_then_off() {
        let f = joined().await;

        assert!(f.session.toggle_captioning().await.unwrap());
        assert!(f.session.media_state().await.captioning);
        assert_eq!(f.sdk.count("start_live_transcription"), 1);

        assert!(!f.session.toggle_captioning().await.unwrap());
        assert!(!f.session.media_state().await.captioning);
        assert_eq!(f.sdk.count("disable_captions:true"), 1);
    }

    #[tokio::test]
    async fn failed_start_leaves_flag_off() {
        let f = joined().await;
        f.sdk.fail_on("start_live_transcription");

        let err = f.session.toggle_captioning().await.unwrap_err();
        assert!(matches!(err, MeetError::Caption(_)));
        assert!(!f.session.media_state().await.captioning);
        assert_eq!(f.session.last_error().await.unwrap().operation, "captions");
    }

    #[tokio::test]
    async fn captions_are_collected_only_while_on() {
        let f = joined().await;
        f.sdk.emit(SdkEvent::CaptionMessage(caption("ignored")));
        settle().await;
        assert!(f.session.captions().await.is_empty());

        f.session.toggle_captioning().await.unwrap();
        f.sdk.emit(SdkEvent::CaptionMessage(caption("hello")));
        settle().await;

        let captions = f.session.captions().await;
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].text, "hello");
        assert!(f
            .events
            .events()
            .iter()
            .any(|e| matches!(e, MeetEvent::CaptionReceived(c) if c.text == "hello")));
    }

    #[tokio::test]
    async fn leave_stops_active_captions() {
        let f = joined().await;
        f.session.toggle_captioning().await.unwrap();
        f.session.leave().await;

        assert_eq!(f.sdk.count("disable_captions:true"), 1);
        assert!(!f.session.media_state().await.captioning);
    }
}
