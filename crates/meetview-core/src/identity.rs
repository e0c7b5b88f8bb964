use std::fmt;

use crate::errors::MeetError;

/// A display name that is non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(input: &str) -> Result<Self, MeetError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MeetError::InvalidName("name must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed join token. Never interpreted, never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Session name and credential, fixed for the coordinator's lifetime.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub session_name: String,
    pub credential: Credential,
}

impl SessionIdentity {
    pub fn new(session_name: impl Into<String>, credential: Credential) -> Self {
        Self {
            session_name: session_name.into(),
            credential,
        }
    }
}

/// State of the "enter your name" dialog shown before joining.
#[derive(Debug, Clone)]
pub struct JoinDialog {
    input: String,
    open: bool,
}

impl JoinDialog {
    /// Opens the dialog, prefilled with a remembered name if any.
    pub fn new(remembered: Option<&str>) -> Self {
        Self {
            input: remembered.unwrap_or_default().to_string(),
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, value: impl Into<String>) {
        self.input = value.into();
    }

    /// Closes the dialog and yields the name when it is valid.
    /// An invalid name keeps the dialog open.
    pub fn submit(&mut self) -> Option<DisplayName> {
        let name = DisplayName::parse(&self.input).ok()?;
        self.open = false;
        Some(name)
    }

    /// Reopen after a failed join so the user can try again.
    pub fn reopen(&mut self) {
        self.open = true;
    }
}
