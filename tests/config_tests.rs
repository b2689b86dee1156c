use live_transcription::Config;
use tempfile::TempDir;

#[test]
fn test_shipped_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/live-transcription");
    let cfg = Config::load(path).unwrap();

    assert_eq!(cfg.service.http.port, 8000);
    assert_eq!(cfg.speech.language, "en-US");
    assert_eq!(cfg.speech.sample_rate, 16000);
    assert_eq!(cfg.nats.transcript_subject, "stt.text.>");
    assert!(!cfg.service.cors.allowed_origins.is_empty());
}

#[test]
fn test_minimal_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("minimal.toml");
    std::fs::write(
        &path,
        r#"
[service]
name = "minimal"

[service.http]
bind = "127.0.0.1"
port = 9000

[speech]
sample_rate = 16000

[nats]
url = "nats://localhost:4222"

[storage]
upload_dir = "/tmp/uploads"
transcript_dir = "~/transcripts"
"#,
    )
    .unwrap();

    let cfg = Config::load(path.to_str().unwrap()).unwrap();

    assert_eq!(cfg.speech.language, "en-US");
    assert_eq!(cfg.speech.buffer_duration_ms, 100);
    assert_eq!(cfg.speech.drain_timeout_ms, 5000);
    assert_eq!(cfg.nats.broadcast_prefix, "transcript.user");
    assert_eq!(cfg.storage.max_upload_mb, 200);
    assert!(cfg.service.cors.allowed_origins.is_empty());
    assert!(!cfg.storage.transcript_path().to_string_lossy().starts_with('~'));
}
