use secrecy::SecretBox;
use serde::Deserialize;

use crate::error::TokenError;
use crate::repositories::TableName;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// 接続先 (`postgres://...` または `sqlite:...`)
    ///
    /// 未設定の場合は runtime_dir 配下に SQLite ファイルを自動作成する
    #[serde(default)]
    pub database_url: Option<SecretBox<String>>,
    #[serde(default = "default_runtime_dir")]
    pub runtime_dir: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    // トークンテーブル設定
    #[serde(default = "default_token_table_name")]
    pub token_table_name: String,
    /// 起動時にテーブルを作成する（既存環境では false 推奨）
    #[serde(default = "default_true")]
    pub auto_create_token_table: bool,
    /// 期限切れ・使用済みトークンの削除間隔
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    // シークレット・ハッシュ設定
    #[serde(default = "default_secret_bytes")]
    pub secret_bytes: usize,
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

const DEFAULT_RUNTIME_DIR: &str = "runtime";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TOKEN_TABLE_NAME: &str = "token";
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_SECRET_BYTES: usize = 32;
pub const MIN_SECRET_BYTES: usize = 16;

fn default_runtime_dir() -> String {
    DEFAULT_RUNTIME_DIR.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_token_table_name() -> String {
    DEFAULT_TOKEN_TABLE_NAME.to_string()
}

fn default_true() -> bool {
    true
}

fn default_purge_interval_secs() -> u64 {
    DEFAULT_PURGE_INTERVAL_SECS
}

fn default_secret_bytes() -> usize {
    DEFAULT_SECRET_BYTES
}

fn default_argon2_memory_kib() -> u32 {
    argon2::Params::DEFAULT_M_COST
}

fn default_argon2_iterations() -> u32 {
    argon2::Params::DEFAULT_T_COST
}

fn default_argon2_parallelism() -> u32 {
    argon2::Params::DEFAULT_P_COST
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// 設定値の整合性チェック
    pub fn validate(&self) -> Result<(), TokenError> {
        TableName::new(&self.token_table_name)?;

        if self.max_connections == 0 {
            return Err(TokenError::Configuration(
                "max_connections は 1 以上を指定してください".to_string(),
            ));
        }
        if self.secret_bytes < MIN_SECRET_BYTES {
            return Err(TokenError::Configuration(format!(
                "secret_bytes は {} 以上を指定してください",
                MIN_SECRET_BYTES
            )));
        }
        if self.purge_interval_secs == 0 {
            return Err(TokenError::Configuration(
                "purge_interval_secs は 1 以上を指定してください".to_string(),
            ));
        }
        self.argon2_params()?;

        Ok(())
    }

    /// argon2 パラメータを構築
    pub fn argon2_params(&self) -> Result<argon2::Params, TokenError> {
        argon2::Params::new(
            self.argon2_memory_kib,
            self.argon2_iterations,
            self.argon2_parallelism,
            None,
        )
        .map_err(|e| TokenError::Configuration(format!("argon2 パラメータが不正: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_from(vars: &[(&str, &str)]) -> Config {
        envy::from_iter(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = load_from(&[]);
        assert!(config.database_url.is_none());
        assert_eq!(config.runtime_dir, "runtime");
        assert_eq!(config.token_table_name, "token");
        assert!(config.auto_create_token_table);
        assert_eq!(config.secret_bytes, 32);
        assert_eq!(config.argon2_memory_kib, argon2::Params::DEFAULT_M_COST);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = load_from(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("TOKEN_TABLE_NAME", "auth_token"),
            ("AUTO_CREATE_TOKEN_TABLE", "false"),
            ("SECRET_BYTES", "48"),
        ]);
        assert!(config.database_url.is_some());
        assert_eq!(config.token_table_name, "auth_token");
        assert!(!config.auto_create_token_table);
        assert_eq!(config.secret_bytes, 48);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_table_name() {
        let config = load_from(&[("TOKEN_TABLE_NAME", "token; DROP TABLE users")]);
        assert!(matches!(
            config.validate(),
            Err(TokenError::Configuration(_))
        ));
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = load_from(&[("SECRET_BYTES", "8")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_argon2_params() {
        // memory はパラレリズムの 8 倍以上が必要
        let config = load_from(&[("ARGON2_MEMORY_KIB", "1"), ("ARGON2_PARALLELISM", "4")]);
        assert!(config.validate().is_err());
    }
}
