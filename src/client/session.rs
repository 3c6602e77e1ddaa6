//! Session state - identity, server dialect and lifecycle of one connection

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Which server dialect the remote endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Handshake has not finished yet
    Unclassified,
    /// Purpose-built channel server that negotiates identity and membership
    ChannelServer,
    /// Any other streaming endpoint; the operator sends raw JSON
    GenericEndpoint,
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Classifying,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Classifying)
                | (Connecting, Closed)
                | (Classifying, Active)
                | (Classifying, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session mode already set to {0:?}")]
    AlreadyClassified(SessionMode),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
}

/// Session metadata
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique session identifier, used in logs
    pub id: Uuid,

    /// Server URI
    pub uri: String,
}

/// The single live session of a run
pub struct Session {
    pub info: SessionInfo,
    mode: SessionMode,
    state: SessionState,
}

impl Session {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            info: SessionInfo {
                id: Uuid::new_v4(),
                uri: uri.into(),
            },
            mode: SessionMode::Unclassified,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> Uuid {
        self.info.id
    }

    pub fn uri(&self) -> &str {
        &self.info.uri
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Record the classification result; allowed exactly once
    pub fn set_mode(&mut self, mode: SessionMode) -> Result<(), SessionError> {
        if self.mode != SessionMode::Unclassified {
            return Err(SessionError::AlreadyClassified(self.mode));
        }
        tracing::info!("Session classified as {:?}", mode);
        self.mode = mode;
        Ok(())
    }

    /// Move to the next lifecycle state
    pub fn transition(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }
}
