use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::TokenError;
use crate::repositories::{PgTokenRepository, SqliteTokenRepository, TableName, TokenStore};
use crate::services::{Argon2Hasher, TokenService};

const ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// 設定に従ってトークンストアへ接続
///
/// database_url 未設定時は `<runtime_dir>/token-<version>.db` を作成して使う
pub async fn connect(config: &Config) -> Result<Arc<dyn TokenStore>, TokenError> {
    let table = TableName::new(&config.token_table_name)?;

    let store: Arc<dyn TokenStore> = match &config.database_url {
        Some(url) => {
            let url = url.expose_secret();
            if url.starts_with("postgres://") || url.starts_with("postgresql://") {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
                    .connect(url)
                    .await
                    .map_err(|e| connection_error("PostgreSQL", e))?;

                tracing::info!(table = %table, "PostgreSQL 接続完了");
                Arc::new(PgTokenRepository::new(pool, table))
            } else if url.starts_with("sqlite:") {
                // インメモリDBは接続ごとに別DBになるため 1 接続に固定
                let in_memory = url.contains(":memory:") || url.contains("mode=memory");
                let mut options = SqlitePoolOptions::new()
                    .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS));
                options = if in_memory {
                    options
                        .max_connections(1)
                        .idle_timeout(None)
                        .max_lifetime(None)
                } else {
                    options.max_connections(config.max_connections)
                };

                let pool = options
                    .connect(url)
                    .await
                    .map_err(|e| connection_error("SQLite", e))?;

                tracing::info!(table = %table, in_memory = in_memory, "SQLite 接続完了");
                Arc::new(SqliteTokenRepository::new(pool, table))
            } else {
                return Err(TokenError::Configuration(
                    "database_url は postgres:// または sqlite: で指定してください".to_string(),
                ));
            }
        }
        None => {
            let runtime_dir = Path::new(&config.runtime_dir);
            std::fs::create_dir_all(runtime_dir).map_err(|e| {
                tracing::error!(error = ?e, dir = %runtime_dir.display(), "runtime_dir の作成に失敗");
                TokenError::Configuration(format!(
                    "runtime_dir を作成できません: {}",
                    runtime_dir.display()
                ))
            })?;

            let db_file = runtime_dir.join(format!("token-{}.db", TokenService::version()));
            let options = SqliteConnectOptions::new()
                .filename(&db_file)
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
                .connect_with(options)
                .await
                .map_err(|e| connection_error("SQLite", e))?;

            tracing::info!(
                file = %db_file.display(),
                table = %table,
                "database_url 未設定: 組み込み SQLite を使用"
            );
            Arc::new(SqliteTokenRepository::new(pool, table))
        }
    };

    Ok(store)
}

/// TokenService を初期化
///
/// auto_create_token_table = true の場合のみ以下を行う
/// - テーブルの自動作成
/// - 期限切れ・使用回数切れトークンの削除
///
/// false の場合はDBに一切触れない（テーブルは事前に用意しておくこと）
pub async fn init(config: &Config) -> Result<TokenService, TokenError> {
    config.validate()?;

    let store = connect(config).await?;

    let hasher = Argon2Hasher::new(config.argon2_params()?);
    let service = TokenService::new(store.clone(), Arc::new(SystemClock), Arc::new(hasher))
        .with_secret_bytes(config.secret_bytes);

    if config.auto_create_token_table {
        store.ensure_schema().await?;
        tracing::info!(table = %config.token_table_name, "トークンテーブル確認完了");

        service.purge().await?;
    }

    Ok(service)
}

fn connection_error(backend: &str, e: sqlx::Error) -> TokenError {
    tracing::error!(error = ?e, backend = backend, "データベース接続に失敗");
    TokenError::Configuration(format!("{} に接続できません: {}", backend, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        envy::from_iter(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unsupported_url_scheme() {
        let config = config(&[("DATABASE_URL", "mysql://localhost/db")]);
        let result = connect(&config).await;
        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_init_in_memory() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("ARGON2_MEMORY_KIB", "8"),
            ("ARGON2_ITERATIONS", "1"),
        ]);
        let service = init(&config).await.unwrap();

        let plain = service.issue(None, "User", "1", 0).await.unwrap();
        let validation = service
            .check("User", "1", secrecy::ExposeSecret::expose_secret(&plain))
            .await
            .unwrap();
        assert!(validation.is_valid());
    }

    #[tokio::test]
    async fn test_init_skips_table_access_when_auto_create_disabled() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("AUTO_CREATE_TOKEN_TABLE", "false"),
            ("ARGON2_MEMORY_KIB", "8"),
            ("ARGON2_ITERATIONS", "1"),
        ]);
        // テーブルが無くても起動は成功する
        let service = init(&config).await.unwrap();

        // テーブル不在は実際の操作時に検出される
        let result = service.issue(None, "User", "1", 0).await;
        assert!(matches!(result, Err(TokenError::Storage(_))));
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_config() {
        let config = config(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("TOKEN_TABLE_NAME", "bad name"),
        ]);
        let result = init(&config).await;
        assert!(matches!(result, Err(TokenError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_embedded_sqlite_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let runtime_dir = dir.path().join("runtime");
        let runtime_dir = runtime_dir.to_str().unwrap();
        let config = config(&[
            ("RUNTIME_DIR", runtime_dir),
            ("ARGON2_MEMORY_KIB", "8"),
            ("ARGON2_ITERATIONS", "1"),
        ]);

        let service = init(&config).await.unwrap();
        service.issue(None, "User", "1", 1).await.unwrap();

        let db_file = dir
            .path()
            .join("runtime")
            .join(format!("token-{}.db", TokenService::version()));
        assert!(db_file.exists());
    }
}
