use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use onboarding_wizard::config::AppConfig;
use onboarding_wizard::onboarding::routes::{AppState, cors_layer, wizard_routes};
use onboarding_wizard::store::{Database, LibSqlBackend};

/// Stderr logging, plus a daily-rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "onboarding-wizard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    eprintln!("Onboarding wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   API: http://{}/api/wizard/{{device_id}}", config.addr());
    eprintln!("   Admin: http://{}/api/admin/layout", config.addr());

    // ── Database ─────────────────────────────────────────────────────────
    let backend = if config.is_memory_db() {
        LibSqlBackend::new_memory().await
    } else {
        LibSqlBackend::new_local(Path::new(&config.db_path)).await
    }
    .with_context(|| format!("Failed to open database at {}", config.db_path))?;
    let db: Arc<dyn Database> = Arc::new(backend);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let mut app = wizard_routes(AppState::new(db));
    if let Some(origin) = config.cors_origin.as_deref() {
        app = app.layer(cors_layer(origin)?);
        eprintln!("   CORS: {origin}");
    }

    let listener = tokio::net::TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.addr()))?;
    tracing::info!(addr = %config.addr(), "Onboarding wizard server started");
    axum::serve(listener, app).await?;

    Ok(())
}
