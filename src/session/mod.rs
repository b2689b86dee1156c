//! Per-user transcription sessions
//!
//! This module provides:
//! - `SessionRegistry`: which users have an active session; start/stop/query
//! - `Session`: one recognition loop, its transcript and cancellation signal
//! - `TranscriptAccumulator`: the thread-safe transcript buffer
//! - `SessionStats`: point-in-time session status

mod config;
mod registry;
mod session;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use registry::SessionRegistry;
pub use session::{EndedCallback, Session};
pub use state::{SessionState, StateCell};
pub use stats::SessionStats;
pub use transcript::{format_line, TranscriptAccumulator};
