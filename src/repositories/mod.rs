pub mod postgres;
pub mod sqlite;

use std::fmt;

use async_trait::async_trait;

use crate::error::TokenError;
use crate::models::{NewToken, Token};

pub use postgres::PgTokenRepository;
pub use sqlite::SqliteTokenRepository;

/// トークンテーブルへのアクセス
///
/// 実装は同時に複数のタスクから呼ばれる前提。
/// 排他制御はすべてDB側の条件付き UPDATE/DELETE に任せる。
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// テーブルとインデックスを作成（存在する場合は何もしない）
    async fn ensure_schema(&self) -> Result<(), sqlx::Error>;

    /// トークンを追加し、採番後の行を返す
    async fn insert(&self, token: &NewToken<'_>) -> Result<Token, sqlx::Error>;

    /// モデル参照に対する最新トークンを取得
    ///
    /// created DESC, id DESC の先頭1件
    async fn find_latest(
        &self,
        model_name: &str,
        model_id: &str,
    ) -> Result<Option<Token>, sqlx::Error>;

    /// uses_remaining を 1 減らす
    ///
    /// uses_remaining > 0 の場合のみ更新する。
    /// 更新できた場合は true、残り回数が既に 0 なら false。
    async fn decrement_uses(&self, id: i64) -> Result<bool, sqlx::Error>;

    /// 期限切れ・使用回数切れのトークンを削除
    ///
    /// # Returns
    /// 削除された行数
    async fn delete_expired_or_exhausted(&self, now: i64) -> Result<u64, sqlx::Error>;
}

/// 検証済みのテーブル名
///
/// SQL に埋め込むため英数字とアンダースコアのみ許可する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

const MAX_TABLE_NAME_LEN: usize = 63;

impl TableName {
    pub fn new(name: &str) -> Result<Self, TokenError> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_head || !valid_tail || name.len() > MAX_TABLE_NAME_LEN {
            return Err(TokenError::Configuration(format!(
                "テーブル名が不正です: {:?}",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self("token".to_string())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 列挙順は Token の FromRow と揃える
const TOKEN_COLUMNS: &str =
    "id, model_name, model_id, token, uses_allowed, uses_remaining, expires, created";

/// テーブルごとに組み立てたSQL
///
/// プレースホルダはバックエンドごとに異なるため `p(n)` で生成する
#[derive(Debug, Clone)]
struct Queries {
    create_index: String,
    insert: String,
    find_latest: String,
    decrement_uses: String,
    purge: String,
}

impl Queries {
    fn build(table: &TableName, p: impl Fn(usize) -> String) -> Self {
        Self {
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {table}_model_ref_idx ON {table} (model_name, model_id, created)"
            ),
            insert: format!(
                "INSERT INTO {table} (model_name, model_id, token, uses_allowed, uses_remaining, expires, created) \
                 VALUES ({}, {}, {}, {}, {}, {}, {}) \
                 RETURNING {TOKEN_COLUMNS}",
                p(1),
                p(2),
                p(3),
                p(4),
                p(5),
                p(6),
                p(7),
            ),
            find_latest: format!(
                "SELECT {TOKEN_COLUMNS} FROM {table} \
                 WHERE model_name = {} AND model_id = {} \
                 ORDER BY created DESC, id DESC \
                 LIMIT 1",
                p(1),
                p(2),
            ),
            decrement_uses: format!(
                "UPDATE {table} SET uses_remaining = uses_remaining - 1 \
                 WHERE id = {} AND uses_remaining > 0",
                p(1),
            ),
            purge: format!(
                "DELETE FROM {table} \
                 WHERE (expires > 0 AND expires <= {}) \
                 OR (uses_allowed > 0 AND uses_remaining < 1)",
                p(1),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_accepts_identifiers() {
        assert!(TableName::new("token").is_ok());
        assert!(TableName::new("_auth_token_v2").is_ok());
    }

    #[test]
    fn test_table_name_rejects_injection() {
        assert!(TableName::new("").is_err());
        assert!(TableName::new("1token").is_err());
        assert!(TableName::new("token; DROP TABLE users").is_err());
        assert!(TableName::new("public.token").is_err());
        assert!(TableName::new(&"t".repeat(64)).is_err());
    }

    #[test]
    fn test_decrement_query_is_conditional() {
        let queries = Queries::build(&TableName::default(), |n| format!("${}", n));
        assert!(queries.decrement_uses.contains("uses_remaining > 0"));
        assert!(queries.find_latest.contains("ORDER BY created DESC, id DESC"));
    }
}
