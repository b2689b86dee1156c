use super::config::SessionConfig;
use super::session::Session;
use super::stats::SessionStats;
use crate::audio::AudioSource;
use crate::broadcast::BroadcastPublisher;
use crate::error::{Result, TranscriptionError};
use crate::recognition::{EndReason, RecognitionEngine};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Which users currently have a transcription session, and their sessions.
///
/// The map lock is only held to look up, insert or remove an entry. Waiting for
/// a loop to drain happens after the entry is out of the map, so one user's
/// stop never stalls another user's requests.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    engine: Arc<dyn RecognitionEngine>,
    publisher: Arc<dyn BroadcastPublisher>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        publisher: Arc<dyn BroadcastPublisher>,
        config: SessionConfig,
    ) -> Self {
        info!(
            "Session registry ready (engine={}, language={})",
            engine.name(),
            config.language
        );

        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                engine,
                publisher,
                config,
            }),
        }
    }

    /// Start transcribing the host's default microphone for `user_id`.
    ///
    /// Any existing session for the user is stopped first.
    pub async fn start_from_microphone(&self, user_id: &str) -> Result<()> {
        self.start(user_id, AudioSource::Microphone).await
    }

    /// Start transcribing a prepared WAV file for `user_id`.
    ///
    /// On success the session owns `path` and deletes it on stop. On error the
    /// file is left for the caller; an existing session is only replaced once
    /// the file has been found.
    pub async fn start_from_file(&self, user_id: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(TranscriptionError::SourceNotFound(path)),
        }

        self.start(user_id, AudioSource::File(path)).await
    }

    async fn start(&self, user_id: &str, source: AudioSource) -> Result<()> {
        // Replace, never merge: the old transcript goes away with the old session
        self.stop(user_id).await;

        let stream = self
            .inner
            .engine
            .start_streaming(&source, &self.inner.config.language)
            .await
            .map_err(|e| TranscriptionError::RecognitionStream(format!("{:#}", e)))?;

        let session = Arc::new(Session::new(user_id, source.file_path().cloned()));
        let session_id = session.id();

        let displaced = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.insert(user_id.to_string(), Arc::clone(&session))
        };

        let registry = self.clone();
        let owner = user_id.to_string();
        session
            .spawn(
                stream,
                Arc::clone(&self.inner.publisher),
                &self.inner.config,
                Box::new(move |reason| {
                    tokio::spawn(async move {
                        registry.retire(&owner, session_id, reason).await;
                    });
                }),
            )
            .await;

        info!("Recording started for user: {}", user_id);

        // A concurrent start for the same user slipped in between our stop and insert
        if let Some(old) = displaced {
            warn!("Replacing session {} for {} started concurrently", old.id(), user_id);
            self.teardown(old).await;
        }

        Ok(())
    }

    /// Stop `user_id`'s session and return its final transcript.
    ///
    /// Waits for the recognition loop to exit, deletes any temporary audio file
    /// and publishes the stopped marker. Returns `None` when the user had no
    /// active session, in which case nothing else happens.
    pub async fn stop(&self, user_id: &str) -> Option<String> {
        let session = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.remove(user_id)
        };

        let session = session?;
        Some(self.teardown(session).await)
    }

    /// Current transcript for `user_id`, empty when no session is active
    pub async fn get_transcript(&self, user_id: &str) -> String {
        self.session(user_id)
            .await
            .map(|s| s.transcript())
            .unwrap_or_default()
    }

    pub async fn status(&self, user_id: &str) -> Option<SessionStats> {
        self.session(user_id).await.map(|s| s.stats())
    }

    pub async fn is_active(&self, user_id: &str) -> bool {
        self.inner.sessions.read().await.contains_key(user_id)
    }

    pub async fn active_users(&self) -> Vec<String> {
        let sessions = self.inner.sessions.read().await;
        let mut users: Vec<String> = sessions.keys().cloned().collect();
        users.sort();
        users
    }

    /// Stop every session, e.g. on shutdown
    pub async fn stop_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut sessions = self.inner.sessions.write().await;
            sessions.drain().map(|(_, s)| s).collect()
        };

        info!("Stopping {} active session(s)", sessions.len());
        let teardowns = sessions.into_iter().map(|s| self.teardown(s));
        futures::future::join_all(teardowns).await;
    }

    /// Write `user_id`'s current transcript to a timestamped file in `dir`.
    ///
    /// Returns `None` when the user has no active session.
    pub async fn save_transcript(&self, user_id: &str, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(session) = self.session(user_id).await else {
            return Ok(None);
        };

        let text = session.transcript();
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = dir.join(format!(
            "transcription_{}_{}.txt",
            file_token(user_id),
            timestamp
        ));

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, text).await?;

        info!("Saved transcript for {} to {}", user_id, path.display());
        Ok(Some(path))
    }

    async fn session(&self, user_id: &str) -> Option<Arc<Session>> {
        self.inner.sessions.read().await.get(user_id).cloned()
    }

    /// Teardown for a session whose stream ended without a stop request.
    ///
    /// Only removes the entry if it still belongs to that session; a newer
    /// session for the same user is left alone.
    async fn retire(&self, user_id: &str, session_id: Uuid, reason: EndReason) {
        let session = {
            let mut sessions = self.inner.sessions.write().await;
            let is_current = sessions
                .get(user_id)
                .map_or(false, |current| current.id() == session_id);
            if is_current {
                sessions.remove(user_id)
            } else {
                None
            }
        };

        if let Some(session) = session {
            info!("Session for {} ended on its own ({:?})", user_id, reason);
            self.teardown(session).await;
        }
    }

    async fn teardown(&self, session: Arc<Session>) -> String {
        let user_id = session.user_id().to_string();
        let transcript = session.shutdown().await;

        if let Err(e) = self
            .inner
            .publisher
            .publish(&user_id, &self.inner.config.stopped_message)
            .await
        {
            warn!("{}", TranscriptionError::Publish(format!("{}: {:#}", user_id, e)));
        }

        info!("Recording stopped for user: {}", user_id);
        transcript
    }
}

/// Reduce an identifier to characters safe in a file name
fn file_token(id: &str) -> String {
    let token: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if token.is_empty() {
        "anonymous".to_string()
    } else {
        token
    }
}
