use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// モデルに紐付いた使い捨て/回数制限付きトークン
///
/// token には argon2 ハッシュのみを保存する。
/// 平文シークレットは発行時に呼び出し側へ返すだけで、DBには保存しない。
///
/// expires / created は UNIX 秒。expires = 0 は無期限。
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Token {
    pub id: i64,
    pub model_name: String,
    pub model_id: String,
    #[serde(skip)]
    pub token: String,
    /// 0 は無制限
    pub uses_allowed: i64,
    pub uses_remaining: i64,
    pub expires: i64,
    pub created: i64,
}

impl Token {
    pub fn is_unlimited(&self) -> bool {
        self.uses_allowed <= 0
    }

    /// 使用回数の上限に達しているか
    pub fn is_exhausted(&self) -> bool {
        self.uses_allowed > 0 && self.uses_remaining < 1
    }

    /// `now`（UNIX 秒）時点で期限切れか
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires > 0 && self.expires <= now
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        if self.expires > 0 {
            OffsetDateTime::from_unix_timestamp(self.expires).ok()
        } else {
            None
        }
    }

    pub fn created_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.created).ok()
    }
}

/// INSERT 用のトークン
#[derive(Debug)]
pub struct NewToken<'a> {
    pub model_name: &'a str,
    pub model_id: &'a str,
    pub token_hash: &'a str,
    pub uses_allowed: i64,
    pub expires: i64,
    pub created: i64,
}

impl<'a> NewToken<'a> {
    /// uses_remaining は常に uses_allowed から開始する
    pub fn uses_remaining(&self) -> i64 {
        self.uses_allowed
    }
}
