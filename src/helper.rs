//! Helper utilities for Socksws
//!
//! This module provides common utility functions used throughout the application.

use crate::error::SessionError;
use crate::session::SessionId;
use std::time::Duration;
use tracing::{debug, warn};

/// Default buffer size for IO operations
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Pause after a failed `accept` before trying again
pub const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Parse duration from seconds
pub fn duration_from_secs(secs: u64) -> Duration {
    Duration::from_secs(secs)
}

/// Log how a session ended
///
/// Ordinary peer closes are debug-level; everything else is a warning.
pub fn log_session_end(id: SessionId, result: &Result<(), SessionError>) {
    match result {
        Ok(()) => debug!("Session {} finished", id),
        Err(e) if e.is_graceful() => debug!("Session {} closed: {}", id, e),
        Err(e) => warn!("Session {} terminated: {}", id, e),
    }
}
