//! Session stages and the forward-only transition table

use crate::error::SessionError;
use std::fmt;

/// A session stage enum with a fixed transition table
pub trait Stage: Copy + Eq + fmt::Debug + Send {
    /// Stage every session starts in
    const INITIAL: Self;
    /// Terminal stage reachable from anywhere
    const DESTROYED: Self;

    /// Stage name for logs and errors
    fn name(self) -> &'static str;

    /// Whether `self -> next` is a legal forward step
    fn can_advance_to(self, next: Self) -> bool;
}

/// Stages of a SOCKS5-fronted session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalStage {
    /// Waiting for the method-selection greeting
    Init,
    /// Waiting for the CONNECT request
    Addr,
    /// Tunnel being opened, client bytes queued
    Connecting,
    /// Relaying in both directions
    Stream,
    /// Torn down
    Destroyed,
}

impl Stage for LocalStage {
    const INITIAL: Self = LocalStage::Init;
    const DESTROYED: Self = LocalStage::Destroyed;

    fn name(self) -> &'static str {
        match self {
            LocalStage::Init => "INIT",
            LocalStage::Addr => "ADDR",
            LocalStage::Connecting => "CONNECTING",
            LocalStage::Stream => "STREAM",
            LocalStage::Destroyed => "DESTROYED",
        }
    }

    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (LocalStage::Init, LocalStage::Addr)
                | (LocalStage::Addr, LocalStage::Connecting)
                | (LocalStage::Connecting, LocalStage::Stream)
        ) || (next == LocalStage::Destroyed && self != LocalStage::Destroyed)
    }
}

/// Stages of a tunnel-fronted session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStage {
    /// Waiting for the first tunnel frame
    Init,
    /// Destination being dialed, tunnel frames queued
    Connecting,
    /// Relaying in both directions
    Stream,
    /// Torn down
    Destroyed,
}

impl Stage for ServerStage {
    const INITIAL: Self = ServerStage::Init;
    const DESTROYED: Self = ServerStage::Destroyed;

    fn name(self) -> &'static str {
        match self {
            ServerStage::Init => "INIT",
            ServerStage::Connecting => "CONNECTING",
            ServerStage::Stream => "STREAM",
            ServerStage::Destroyed => "DESTROYED",
        }
    }

    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (ServerStage::Init, ServerStage::Connecting)
                | (ServerStage::Connecting, ServerStage::Stream)
        ) || (next == ServerStage::Destroyed && self != ServerStage::Destroyed)
    }
}

/// Current stage of one session
#[derive(Debug, Clone, Copy)]
pub struct StageTracker<S: Stage> {
    current: S,
}

impl<S: Stage> StageTracker<S> {
    /// Start in the initial stage
    pub fn new() -> Self {
        StageTracker {
            current: S::INITIAL,
        }
    }

    /// Current stage
    pub fn current(&self) -> S {
        self.current
    }

    /// Whether the session has been torn down
    pub fn is_destroyed(&self) -> bool {
        self.current == S::DESTROYED
    }

    /// Move to `next`, rejecting steps the table does not allow
    pub fn advance(&mut self, next: S) -> Result<(), SessionError> {
        if !self.current.can_advance_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.current.name(),
                to: next.name(),
            });
        }
        tracing::trace!("Stage {} -> {}", self.current.name(), next.name());
        self.current = next;
        Ok(())
    }

    /// Enter the terminal stage; a no-op if already there
    pub fn destroy(&mut self) {
        self.current = S::DESTROYED;
    }
}

impl<S: Stage> Default for StageTracker<S> {
    fn default() -> Self {
        Self::new()
    }
}
