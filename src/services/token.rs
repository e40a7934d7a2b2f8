use std::sync::Arc;

use secrecy::SecretString;
use time::OffsetDateTime;

use crate::clock::Clock;
use crate::config::DEFAULT_SECRET_BYTES;
use crate::error::{InvalidReason, TokenError};
use crate::models::{NewToken, Token};
use crate::repositories::TokenStore;
use crate::services::hasher::{SecretHasher, generate_secret};

/// トークン検証結果
#[derive(Debug, Clone)]
pub enum Validation {
    Valid(Token),
    Invalid(InvalidReason),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn token(&self) -> Option<&Token> {
        match self {
            Self::Valid(token) => Some(token),
            Self::Invalid(_) => None,
        }
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid(_) => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }
}

/// トークンの発行・検証・消費
///
/// 状態はすべてストレージ側に持つため、Clone して複数タスクから共有できる。
///
/// # Security
/// - 平文シークレットは発行時に一度だけ返す。DBにはハッシュのみ保存
/// - 平文シークレット・ハッシュはログに出力しない
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    hasher: Arc<dyn SecretHasher>,
    secret_bytes: usize,
}

impl TokenService {
    /// 新しい TokenService を作成
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        hasher: Arc<dyn SecretHasher>,
    ) -> Self {
        Self {
            store,
            clock,
            hasher,
            secret_bytes: DEFAULT_SECRET_BYTES,
        }
    }

    /// 生成するシークレットのバイト長を変更
    pub fn with_secret_bytes(mut self, secret_bytes: usize) -> Self {
        self.secret_bytes = secret_bytes;
        self
    }

    /// トークンを発行
    ///
    /// # Arguments
    /// * `expires` - 有効期限（None は無期限）
    /// * `model_name` / `model_id` - 紐付けるモデル
    /// * `uses_allowed` - 使用可能回数（0 は無制限）
    ///
    /// # Returns
    /// 平文シークレット。再取得はできない
    pub async fn issue(
        &self,
        expires: Option<OffsetDateTime>,
        model_name: &str,
        model_id: &str,
        uses_allowed: u32,
    ) -> Result<SecretString, TokenError> {
        let plain = generate_secret(self.secret_bytes);
        let token_hash = self.hasher.hash(&plain)?;

        let new_token = NewToken {
            model_name,
            model_id,
            token_hash: &token_hash,
            uses_allowed: i64::from(uses_allowed),
            // 0 以下は「無期限」と解釈されるため、明示的な期限は 1 以上に丸める
            expires: expires.map_or(0, |at| at.unix_timestamp().max(1)),
            created: self.clock.now().unix_timestamp(),
        };

        let token = self.store.insert(&new_token).await?;

        tracing::info!(
            token_id = token.id,
            model_name = %model_name,
            model_id = %model_id,
            uses_allowed = uses_allowed,
            expires = token.expires,
            "トークン発行"
        );

        Ok(SecretString::from(plain))
    }

    /// トークンを検証（副作用なし）
    ///
    /// 最新トークンに対して以下の順で判定する:
    /// 1. トークンが存在しない → NotFound
    /// 2. シークレット不一致 → BadSecret
    /// 3. 使用回数切れ → Exhausted
    /// 4. 期限切れ → Expired
    ///
    /// シークレットを先に照合するため、誤ったシークレットの保持者には
    /// トークンの状態（期限・残り回数）が伝わらない
    pub async fn check(
        &self,
        model_name: &str,
        model_id: &str,
        plain: &str,
    ) -> Result<Validation, TokenError> {
        let token = match self.store.find_latest(model_name, model_id).await? {
            Some(token) => token,
            None => return Ok(self.reject(model_name, model_id, InvalidReason::NotFound)),
        };

        if !self.hasher.verify(plain, &token.token) {
            return Ok(self.reject(model_name, model_id, InvalidReason::BadSecret));
        }

        if token.is_exhausted() {
            return Ok(self.reject(model_name, model_id, InvalidReason::Exhausted));
        }

        if token.is_expired_at(self.clock.now().unix_timestamp()) {
            return Ok(self.reject(model_name, model_id, InvalidReason::Expired));
        }

        Ok(Validation::Valid(token))
    }

    /// トークンを使用
    ///
    /// 回数制限付きトークンは uses_remaining を条件付き UPDATE で 1 減らす。
    /// 同時に使用された場合、残り回数を超えた分は false になる。
    pub async fn consume(
        &self,
        model_name: &str,
        model_id: &str,
        plain: &str,
    ) -> Result<bool, TokenError> {
        let token = match self.check(model_name, model_id, plain).await? {
            Validation::Valid(token) => token,
            Validation::Invalid(_) => return Ok(false),
        };

        if token.is_unlimited() {
            return Ok(true);
        }

        if !self.store.decrement_uses(token.id).await? {
            tracing::warn!(
                token_id = token.id,
                model_name = %model_name,
                model_id = %model_id,
                reason = InvalidReason::Exhausted.as_str(),
                "トークン使用失敗: 同時使用により残り回数なし"
            );
            return Ok(false);
        }

        tracing::debug!(
            token_id = token.id,
            uses_remaining = token.uses_remaining - 1,
            "トークン使用"
        );

        Ok(true)
    }

    /// 期限切れ・使用回数切れのトークンを削除
    ///
    /// # Returns
    /// 削除された行数
    pub async fn purge(&self) -> Result<u64, TokenError> {
        let now = self.clock.now().unix_timestamp();
        let deleted = self.store.delete_expired_or_exhausted(now).await?;

        tracing::info!(deleted = deleted, "期限切れトークン削除");

        Ok(deleted)
    }

    /// クレートのバージョン
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn reject(&self, model_name: &str, model_id: &str, reason: InvalidReason) -> Validation {
        tracing::warn!(
            model_name = %model_name,
            model_id = %model_id,
            reason = reason.as_str(),
            "トークン検証失敗: {}",
            reason
        );
        Validation::Invalid(reason)
    }
}
