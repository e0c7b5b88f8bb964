use thiserror::Error;

use crate::events::SessionState;
use crate::sdk::SdkError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeetError {
    #[error("invalid display name: {0}")]
    InvalidName(String),
    #[error("cannot {op} while {state:?}")]
    InvalidState { op: &'static str, state: SessionState },
    #[error("initialization failed: {0}")]
    Init(String),
    #[error("join failed: {0}")]
    Join(String),
    #[error("media error: {0}")]
    Media(String),
    #[error("render error: {0}")]
    Render(String),
    #[error("screen share error: {0}")]
    Share(String),
    #[error("captioning error: {0}")]
    Caption(String),
    #[error("chat error: {0}")]
    Chat(String),
    #[error("{0} is already in progress")]
    Busy(&'static str),
    #[error("join cancelled by leave")]
    Cancelled,
}

impl MeetError {
    /// Wrap an SDK failure with the operation that produced it.
    pub(crate) fn media(context: &str, err: SdkError) -> Self {
        Self::Media(format!("{context}: {err}"))
    }

    pub(crate) fn render(context: &str, err: SdkError) -> Self {
        Self::Render(format!("{context}: {err}"))
    }
}
