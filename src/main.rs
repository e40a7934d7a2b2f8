use std::time::Duration;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use oxtoken::{bootstrap, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "oxtoken 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    // 接続・テーブル作成・起動時の削除
    let service = bootstrap::init(&config).await.map_err(|e| {
        tracing::error!(error = ?e, "初期化に失敗");
        anyhow::anyhow!("Failed to initialize token store: {}", e)
    })?;

    tracing::info!(
        interval_secs = config.purge_interval_secs,
        "期限切れトークンの定期削除を開始"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.purge_interval_secs));
    // 初回 tick は即時に完了するため読み捨てる（起動時の削除は init で実施済み）
    interval.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // 削除失敗は次回に持ち越す
                if let Err(e) = service.purge().await {
                    tracing::error!(error = ?e, "期限切れトークンの削除に失敗");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    tracing::info!("oxtoken 終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,oxtoken=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, shutting down");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, shutting down");
        }
    }
}
