//! HTTP API for transcription sessions
//!
//! All session endpoints take the user as a `userId` query parameter:
//! - POST /start/ - Start transcribing the host microphone
//! - POST /upload/ - Upload an audio file (multipart `file`) and transcribe it
//! - POST /stop/ - Stop and return the final transcript
//! - GET /transcript/ - Transcript accumulated so far
//! - GET /status/ - Session status
//! - POST /save/ - Export the transcript to a file
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{ApiSettings, AppState};
