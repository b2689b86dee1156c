use anyhow::{Context, Result};
use clap::Parser;
use live_transcription::{
    create_router, ApiSettings, AppState, AudioBackendConfig, Config, NatsBroadcaster,
    NatsClient, NatsRecognitionEngine, SessionConfig, SessionRegistry, WavConverter,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "live-transcription", about = "Real-time per-user speech transcription service")]
struct Args {
    /// Config file path (extension optional)
    #[arg(long, default_value = "config/live-transcription")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Live Transcription v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    let nats = NatsClient::connect(&cfg.nats.url).await?;

    let engine = NatsRecognitionEngine::new(
        nats.clone(),
        AudioBackendConfig {
            target_sample_rate: cfg.speech.sample_rate,
            target_channels: cfg.speech.channels,
            buffer_duration_ms: cfg.speech.buffer_duration_ms,
        },
        cfg.nats.transcript_subject.clone(),
        Duration::from_millis(cfg.speech.drain_timeout_ms),
    );
    let broadcaster = NatsBroadcaster::new(nats, cfg.nats.broadcast_prefix.clone());

    let registry = SessionRegistry::new(
        Arc::new(engine),
        Arc::new(broadcaster),
        SessionConfig {
            language: cfg.speech.language.clone(),
            ..SessionConfig::default()
        },
    );

    let settings = ApiSettings {
        upload_dir: cfg.storage.upload_path(),
        transcript_dir: cfg.storage.transcript_path(),
        max_upload_bytes: cfg.storage.max_upload_mb * 1024 * 1024,
        sample_rate: cfg.speech.sample_rate,
        allowed_origins: cfg.service.cors.allowed_origins.clone(),
    };
    info!("Uploads stored in {}", settings.upload_dir.display());

    let state = AppState::new(
        registry.clone(),
        Arc::new(WavConverter::new(cfg.speech.sample_rate)),
        settings,
    );
    let app = create_router(state);

    let bind = args.bind.unwrap_or(cfg.service.http.bind);
    let port = args.port.unwrap_or(cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", bind, port))?;

    info!("HTTP server listening on {}:{}", bind, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown requested");
        })
        .await
        .context("HTTP server error")?;

    registry.stop_all().await;
    info!("All sessions stopped");

    Ok(())
}
