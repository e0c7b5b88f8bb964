use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::sdk::{ElementHandle, SdkError};

/// Fixed containers the session view exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Video,
    Share,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Wrapper holding a stream element and its name label.
    Tile,
    Label,
    /// Plain video element used for the local share preview.
    Video,
}

/// A display-capture stream granted by the host.
///
/// `ended` resolves when the underlying track stops, e.g. the user pressed
/// the browser's native "stop sharing" control.
#[derive(Debug)]
pub struct DisplayCapture {
    pub stream_id: u64,
    pub ended: oneshot::Receiver<()>,
}

/// The host environment: element tree plus display capture.
///
/// Element operations are synchronous and must tolerate removing an
/// element twice.
#[async_trait]
pub trait Host: Send + Sync {
    fn create_element(&self, kind: ElementKind) -> ElementHandle;
    fn append_to_container(&self, container: Container, child: ElementHandle);
    fn append_child(&self, parent: ElementHandle, child: ElementHandle);
    fn set_text(&self, element: ElementHandle, text: &str);
    fn remove_element(&self, element: ElementHandle);

    async fn get_display_media(&self) -> Result<DisplayCapture, SdkError>;
    fn attach_capture(&self, element: ElementHandle, stream_id: u64);
    fn stop_capture(&self, stream_id: u64);

    /// True on hosts whose audio encoder must report ready before audio
    /// can start.
    fn needs_audio_workaround(&self) -> bool;
}
